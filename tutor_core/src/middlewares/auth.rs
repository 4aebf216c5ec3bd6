use axum::{
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::TokenVerify;

#[derive(Debug, Deserialize)]
pub struct AuthInfo {
    pub token: String,
}

/// Resolve the session from `Authorization: Bearer` or `?token=` and put
/// the `User` into request extensions. Every failure is a 401.
pub async fn verify_token<T>(
    State(state): State<T>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    query: Option<Query<AuthInfo>>,
    mut req: Request,
    next: Next,
) -> Response
where
    T: TokenVerify + Clone + Send + Sync + 'static,
{
    let token = match (&bearer, &query) {
        (Some(TypedHeader(Authorization(bearer))), _) => bearer.token(),
        (_, Some(Query(AuthInfo { ref token }))) => token,
        _ => return unauthenticated("missing session token".to_string()),
    };
    match state.verify_token(token) {
        Ok(user) => {
            req.extensions_mut().insert(user);
        }
        Err(e) => {
            let msg = format!("verify token failed: {:?}", e);
            warn!(msg);
            return unauthenticated(msg);
        }
    }
    next.run(req).await
}

fn unauthenticated(msg: String) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": msg }))).into_response()
}
