use axum::{
    extract::{rejection::PathRejection, Path, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use tutor_core::User;

use crate::{error::AppError, AppState};

/// Only the two participants get through; the loaded conversation is
/// handed to the handler as an extension.
pub(crate) async fn verify_conversation_perm(
    State(state): State<AppState>,
    path: Result<Path<u64>, PathRejection>,
    Extension(user): Extension<User>,
    mut req: Request,
    next: Next,
) -> Response {
    let conversation_id = match path {
        Ok(Path(id)) => id,
        Err(e) => return AppError::InvalidInput(e.body_text()).into_response(),
    };
    match state
        .conv_svc
        .ensure_participant(conversation_id, user.id)
        .await
    {
        Ok(conversation) => {
            req.extensions_mut().insert(conversation);
        }
        Err(e) => return e.into_response(),
    }
    next.run(req).await
}
