use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tutor_core::{PublicUser, User};
use utoipa::ToSchema;

use crate::{
    error::{AppError, ErrorOutput},
    models::{CreateUser, SigninUser},
    AppState,
};

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct AuthOutput {
    pub token: String,
}

/// Create a student or teacher account.
#[utoipa::path(
    post,
    path = "/api/signup",
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = AuthOutput),
        (status = 400, description = "Missing fields or admin role", body = ErrorOutput),
        (status = 409, description = "Email already exists", body = ErrorOutput),
    )
)]
pub(crate) async fn signup_handler(
    State(state): State<AppState>,
    input: Result<Json<CreateUser>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = input?;
    let user = state.user_svc.create(&input).await?;
    let token = state.ek.sign(user)?;
    Ok((StatusCode::CREATED, Json(AuthOutput { token })))
}

#[utoipa::path(
    post,
    path = "/api/signin",
    request_body = SigninUser,
    responses(
        (status = 200, description = "User signed in", body = AuthOutput),
        (status = 403, description = "Invalid email or password", body = ErrorOutput),
    )
)]
pub(crate) async fn signin_handler(
    State(state): State<AppState>,
    input: Result<Json<SigninUser>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = input?;
    let user = state
        .user_svc
        .verify(&input)
        .await?
        .ok_or(AppError::InvalidCredentials)?;
    let token = state.ek.sign(user)?;
    Ok(Json(AuthOutput { token }))
}

/// Current profile. `impersonatedBy` is set while an admin acts as this user.
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current user", body = User),
    ),
    security(("token" = []))
)]
pub(crate) async fn me_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    let mut me = state
        .user_svc
        .find_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("user id not found".to_string()))?;
    me.impersonated_by = user.impersonated_by;
    Ok(Json(me))
}

/// Public role profile of another user: name and whether they are a
/// student or a teacher.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "Role profile", body = PublicUser),
        (status = 404, description = "Unknown user", body = ErrorOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn profile_handler(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Path(id) = id.map_err(|e| AppError::InvalidInput(e.body_text()))?;
    let profile = state
        .user_svc
        .fetch_public_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("user id not found".to_string()))?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::get_test_state_and_pg;
    use anyhow::Result;
    use axum::response::Response;
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use tutor_core::UserRole;

    async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T> {
        let body = res.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&body)?)
    }

    fn nina(role: UserRole) -> CreateUser {
        CreateUser::new("Nina", "nina@school.dev", "Hunter42", role)
    }

    #[tokio::test]
    async fn signup_should_issue_a_session() -> Result<()> {
        let (state, _tpg) = get_test_state_and_pg().await?;
        let res = signup_handler(State(state.clone()), Ok(Json(nina(UserRole::Student))))
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::CREATED);
        let auth: AuthOutput = read_json(res).await?;
        let user = state.dk.verify(&auth.token)?;
        assert_eq!(user.email, "nina@school.dev");
        assert_eq!(user.role, UserRole::Student);
        Ok(())
    }

    #[tokio::test]
    async fn signup_twice_should_conflict() -> Result<()> {
        let (state, _tpg) = get_test_state_and_pg().await?;
        signup_handler(State(state.clone()), Ok(Json(nina(UserRole::Teacher)))).await?;
        let res = signup_handler(State(state), Ok(Json(nina(UserRole::Student))))
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let out: ErrorOutput = read_json(res).await?;
        assert_eq!(out.error, "email already exists: nina@school.dev");
        Ok(())
    }

    #[tokio::test]
    async fn signin_should_check_password() -> Result<()> {
        let (state, _tpg) = get_test_state_and_pg().await?;
        state.user_svc.create(&nina(UserRole::Student)).await?;

        let good = SigninUser::new("nina@school.dev", "Hunter42");
        let res = signin_handler(State(state.clone()), Ok(Json(good)))
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::OK);
        let auth: AuthOutput = read_json(res).await?;
        assert_eq!(state.dk.verify(&auth.token)?.fullname, "Nina");

        let cases = [
            SigninUser::new("nina@school.dev", "wrong"),
            SigninUser::new("nobody@school.dev", "Hunter42"),
            // fixture accounts carry no password
            SigninUser::new("tom@school.dev", ""),
        ];
        for input in cases {
            let res = signin_handler(State(state.clone()), Ok(Json(input)))
                .await
                .into_response();
            assert_eq!(res.status(), StatusCode::FORBIDDEN);
            let out: ErrorOutput = read_json(res).await?;
            assert_eq!(out.error, "invalid email or password");
        }
        Ok(())
    }

    #[tokio::test]
    async fn signin_with_corrupt_stored_hash_should_500() -> Result<()> {
        let (state, _tpg) = get_test_state_and_pg().await?;
        sqlx::query("UPDATE users SET password_hash = 'not-a-phc-string' WHERE id = 2")
            .execute(&state.pool)
            .await?;
        let input = SigninUser::new("tom@school.dev", "Hunter42");
        let res = signin_handler(State(state), Ok(Json(input)))
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        Ok(())
    }

    #[tokio::test]
    async fn profile_should_expose_role_only() -> Result<()> {
        let (state, _tpg) = get_test_state_and_pg().await?;
        let res = profile_handler(State(state.clone()), Ok(Path(2)))
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::OK);
        let profile: serde_json::Value = read_json(res).await?;
        assert_eq!(profile["fullname"], "Tom Teacher");
        assert_eq!(profile["role"], "teacher");
        assert!(profile.get("email").is_none());

        let res = profile_handler(State(state), Ok(Path(999)))
            .await
            .into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn me_should_carry_impersonation_marker() -> Result<()> {
        let (state, _tpg) = get_test_state_and_pg().await?;
        let mut user = User::new(3, "Sara", "sara@school.dev", UserRole::Student);
        user.impersonated_by = Some(1);
        let res = me_handler(State(state), Extension(user))
            .await
            .into_response();
        let me: serde_json::Value = read_json(res).await?;
        assert_eq!(me["id"], 3);
        assert_eq!(me["impersonatedBy"], 1);
        assert_eq!(me["role"], "student");
        Ok(())
    }
}
