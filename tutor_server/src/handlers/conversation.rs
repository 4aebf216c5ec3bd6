use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tutor_core::{Conversation, User};
use utoipa::ToSchema;

use crate::{
    error::{AppError, ErrorOutput},
    services::{ConversationSummary, CreateConversation},
    AppState,
};

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct ConversationsOutput {
    pub success: bool,
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct ConversationOutput {
    pub success: bool,
    pub conversation: Conversation,
}

/// Conversations of the caller, most recent activity first.
#[utoipa::path(
    get,
    path = "/api/messages/conversations",
    responses(
        (status = 200, description = "Caller's conversations", body = ConversationsOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn list_conversation_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, AppError> {
    let conversations = state.conv_svc.fetch_all(user.id).await?;
    Ok(Json(ConversationsOutput {
        success: true,
        conversations,
    }))
}

/// Open the conversation with another user, creating it on first contact.
#[utoipa::path(
    post,
    path = "/api/messages/conversations",
    request_body = CreateConversation,
    responses(
        (status = 201, description = "Conversation created", body = ConversationOutput),
        (status = 200, description = "Conversation already exists", body = ConversationOutput),
        (status = 404, description = "Participant not found", body = ErrorOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn create_conversation_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    input: Result<Json<CreateConversation>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = input?;
    let (conversation, created) = state.conv_svc.get_or_create(input, user.id).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(ConversationOutput {
            success: true,
            conversation,
        }),
    ))
}
