use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Extension, Json,
};
use tutor_core::User;

use crate::{
    error::{AppError, ErrorOutput},
    services::ImpersonateUser,
    AppState,
};

use super::AuthOutput;

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All users", body = Vec<User>),
        (status = 403, description = "Not an admin", body = ErrorOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn list_users_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    let users = state.admin_svc.list_users(&user).await?;
    Ok(Json(users))
}

/// Swap the admin's session for a short-lived session of the target user.
/// The returned token remembers the admin so it can be restored.
#[utoipa::path(
    post,
    path = "/api/admin/impersonate",
    request_body = ImpersonateUser,
    responses(
        (status = 200, description = "Impersonation session", body = AuthOutput),
        (status = 403, description = "Not an admin", body = ErrorOutput),
        (status = 404, description = "Unknown user", body = ErrorOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn impersonate_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    input: Result<Json<ImpersonateUser>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = input?;
    let target = state.admin_svc.start_impersonation(&user, input).await?;
    let token = state.ek.sign_impersonation(target, user.id)?;
    Ok(Json(AuthOutput { token }))
}

/// Trade an impersonation session back for the admin's own session.
#[utoipa::path(
    post,
    path = "/api/admin/stop-impersonating",
    responses(
        (status = 200, description = "Admin session restored", body = AuthOutput),
        (status = 400, description = "Not impersonating", body = ErrorOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn stop_impersonating_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    let admin = state.admin_svc.stop_impersonation(&user).await?;
    let token = state.ek.sign(admin)?;
    Ok(Json(AuthOutput { token }))
}
