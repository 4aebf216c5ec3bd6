use axum::{
    body::Body,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use tutor_core::{Attachment, Conversation, Message, User};
use utoipa::ToSchema;

use crate::{
    error::{AppError, ErrorOutput},
    models::StoredFile,
    services::{CreateMessage, ListMessageOption, PollOption},
    AppState,
};

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct MessagesOutput {
    pub success: bool,
    pub messages: Vec<Message>,
}

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct MessageOutput {
    pub success: bool,
    pub message: Message,
}

#[derive(Debug, ToSchema, Serialize, Deserialize)]
pub struct SuccessOutput {
    pub success: bool,
}

#[utoipa::path(
    post,
    path = "/api/messages/{conversation_id}",
    params(("conversation_id" = u64, Path, description = "Conversation id")),
    request_body = CreateMessage,
    responses(
        (status = 201, description = "Message sent", body = MessageOutput),
        (status = 400, description = "Invalid message", body = ErrorOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn send_message_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Extension(conversation): Extension<Conversation>,
    input: Result<Json<CreateMessage>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = input?;
    let message = state
        .msg_svc
        .create(input, conversation.id as _, user.id)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageOutput {
            success: true,
            message,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/messages/{conversation_id}",
    params(
        ("conversation_id" = u64, Path, description = "Conversation id"),
        ListMessageOption
    ),
    responses(
        (status = 200, description = "Messages, newest first", body = MessagesOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn list_message_handler(
    State(state): State<AppState>,
    Extension(conversation): Extension<Conversation>,
    input: Result<Query<ListMessageOption>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(input) = input?;
    let messages = state.msg_svc.list(input, conversation.id as _).await?;
    Ok(Json(MessagesOutput {
        success: true,
        messages,
    }))
}

/// New messages from the other participant since `lastMessageId`, oldest
/// first. Returned SENT messages become DELIVERED.
#[utoipa::path(
    get,
    path = "/api/messages/poll",
    params(PollOption),
    responses(
        (status = 200, description = "New messages", body = MessagesOutput),
        (status = 400, description = "Missing conversationId", body = ErrorOutput),
        (status = 403, description = "Not a participant", body = ErrorOutput),
        (status = 404, description = "Unknown conversation or message", body = ErrorOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn poll_message_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    input: Result<Query<PollOption>, QueryRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Query(input) = input?;
    let Some(conversation_id) = input.conversation_id else {
        return Err(AppError::InvalidInput(
            "conversationId is required".to_string(),
        ));
    };
    state
        .conv_svc
        .ensure_participant(conversation_id, user.id)
        .await?;
    let messages = state
        .msg_svc
        .poll(conversation_id, user.id, input.last_message_id)
        .await?;
    Ok(Json(MessagesOutput {
        success: true,
        messages,
    }))
}

/// Mark every message from the other participant as READ.
#[utoipa::path(
    post,
    path = "/api/messages/{conversation_id}/read",
    params(("conversation_id" = u64, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Messages marked read", body = SuccessOutput),
        (status = 403, description = "Not a participant", body = ErrorOutput),
        (status = 404, description = "Unknown conversation", body = ErrorOutput),
    ),
    security(("token" = []))
)]
pub(crate) async fn read_message_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Extension(conversation): Extension<Conversation>,
) -> Result<impl IntoResponse, AppError> {
    state
        .msg_svc
        .mark_read(conversation.id as _, user.id)
        .await?;
    Ok(Json(SuccessOutput { success: true }))
}

/// Stream a stored file to its uploader or to a participant of a
/// conversation it was sent in.
pub(crate) async fn file_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let file: StoredFile = format!("/files/{path}").parse()?;
    if !state.msg_svc.can_access_file(&file.url(), user.id).await? {
        warn!("user {} may not read {}", user.id, file.url());
        return Err(AppError::PermissionDeny);
    }
    let path = file.path(&state.config.server.base_dir);
    if !path.exists() {
        return Err(AppError::NotFound("file doesn't exist".to_string()));
    }
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let filename = format!("{}.{}", file.hash, file.ext);

    let file = fs::File::open(&path).await?;
    let stream = ReaderStream::new(file);
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(mime.as_ref()).map_err(|e| anyhow::anyhow!(e))?,
    );
    headers.insert(
        CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
            .map_err(|e| anyhow::anyhow!(e))?,
    );
    Ok((headers, Body::from_stream(stream)))
}

/// Store uploaded files and describe them as message attachments.
pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let base_dir = &state.config.server.base_dir;
    let mut attachments = vec![];
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("multipart error: {}", e)))?
    {
        let filename = field.file_name().map(|name| name.to_owned());
        let (Some(filename), Ok(data)) = (filename, field.bytes().await) else {
            warn!("failed to read multipart field");
            continue;
        };

        let file = StoredFile::new(&filename, &data);
        let path = file.path(base_dir);
        if path.exists() {
            info!("File {} already exists: {:?}", filename, path);
        } else {
            let Some(parent) = path.parent() else {
                return Err(AppError::AnyError(anyhow::anyhow!("invalid file path")));
            };
            fs::create_dir_all(parent).await?;
            fs::write(&path, &data).await?;
            info!("user {} uploaded {} to {:?}", user.id, filename, path);
        }
        state.msg_svc.record_upload(&file.url(), user.id).await?;
        attachments.push(Attachment {
            file_url: file.url(),
            file_type: mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .to_string(),
            file_name: filename,
            file_size: data.len() as i64,
            thumbnail_url: None,
            duration: None,
        });
    }
    Ok(Json(attachments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{get_router, test_util::get_test_state_and_pg};
    use anyhow::Result;
    use axum::{http::Request, Router};
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;
    use tutor_core::{MessageStatus, UserRole};

    fn token_for(state: &AppState, id: i64, role: UserRole) -> Result<String> {
        let user = User::new(id, "fixture", "fixture@school.dev", role);
        Ok(state.ek.sign(user)?)
    }

    async fn call<T: DeserializeOwned>(
        app: &Router,
        method: &str,
        uri: &str,
        token: &str,
    ) -> Result<(StatusCode, T)> {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())?;
        let res = app.clone().oneshot(req).await?;
        let status = res.status();
        let body = res.into_body().collect().await?.to_bytes();
        Ok((status, serde_json::from_slice(&body)?))
    }

    #[tokio::test]
    async fn poll_handler_should_deliver_then_read_should_work() -> Result<()> {
        let (state, _tdb) = get_test_state_and_pg().await?;
        let sara = token_for(&state, 3, UserRole::Student)?;
        let app = get_router(state).await?;

        let (status, out): (_, MessagesOutput) =
            call(&app, "GET", "/api/messages/poll?conversationId=1", &sara).await?;
        assert_eq!(status, StatusCode::OK);
        assert!(out.success);
        let ids: Vec<i64> = out.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 4]);
        assert!(out
            .messages
            .iter()
            .all(|m| m.status == MessageStatus::Delivered));

        let (status, out): (_, MessagesOutput) = call(
            &app,
            "GET",
            "/api/messages/poll?conversationId=1&lastMessageId=4",
            &sara,
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert!(out.messages.is_empty());

        let (status, out): (_, SuccessOutput) =
            call(&app, "POST", "/api/messages/1/read", &sara).await?;
        assert_eq!(status, StatusCode::OK);
        assert!(out.success);

        // idempotent
        let (status, _): (_, SuccessOutput) =
            call(&app, "POST", "/api/messages/1/read", &sara).await?;
        assert_eq!(status, StatusCode::OK);

        let (_, out): (_, MessagesOutput) =
            call(&app, "GET", "/api/messages/1?limit=10", &sara).await?;
        let statuses: Vec<(i64, MessageStatus)> =
            out.messages.iter().map(|m| (m.id, m.status)).collect();
        assert_eq!(
            statuses,
            vec![
                (5, MessageStatus::Read),
                (4, MessageStatus::Read),
                (3, MessageStatus::Sent),
                (2, MessageStatus::Read),
                (1, MessageStatus::Read),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn non_participant_should_be_forbidden() -> Result<()> {
        let (state, _tdb) = get_test_state_and_pg().await?;
        let sam = token_for(&state, 4, UserRole::Student)?;
        let app = get_router(state).await?;

        let (status, out): (_, ErrorOutput) =
            call(&app, "GET", "/api/messages/poll?conversationId=1", &sam).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(out.error, "permission deny");

        let (status, _): (_, ErrorOutput) =
            call(&app, "POST", "/api/messages/1/read", &sam).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _): (_, ErrorOutput) =
            call(&app, "GET", "/api/messages/1", &sam).await?;
        assert_eq!(status, StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn poll_with_bad_input_should_fail() -> Result<()> {
        let (state, _tdb) = get_test_state_and_pg().await?;
        let sara = token_for(&state, 3, UserRole::Student)?;
        let app = get_router(state).await?;

        let (status, out): (_, ErrorOutput) =
            call(&app, "GET", "/api/messages/poll", &sara).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(out.error, "invalid input: conversationId is required");

        let (status, _): (_, ErrorOutput) =
            call(&app, "GET", "/api/messages/poll?conversationId=abc", &sara).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _): (_, ErrorOutput) =
            call(&app, "GET", "/api/messages/poll?conversationId=999", &sara).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _): (_, ErrorOutput) =
            call(&app, "POST", "/api/messages/999/read", &sara).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn unauthenticated_poll_should_401() -> Result<()> {
        let (state, _tdb) = get_test_state_and_pg().await?;
        let app = get_router(state).await?;
        let (status, out): (_, ErrorOutput) =
            call(&app, "GET", "/api/messages/poll?conversationId=1", "bad-token").await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(out.error.starts_with("verify token failed"));
        Ok(())
    }

    #[tokio::test]
    async fn send_message_handler_should_work() -> Result<()> {
        let (state, _tdb) = get_test_state_and_pg().await?;
        let tom = token_for(&state, 2, UserRole::Teacher)?;
        let app = get_router(state).await?;

        let req = Request::builder()
            .method("POST")
            .uri("/api/messages/2")
            .header("Authorization", format!("Bearer {}", tom))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"content": "homework is due friday"}"#))?;
        let res = app.clone().oneshot(req).await?;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = res.into_body().collect().await?.to_bytes();
        let out: MessageOutput = serde_json::from_slice(&body)?;
        assert_eq!(out.message.conversation_id, 2);
        assert_eq!(out.message.sender_id, 2);
        assert_eq!(out.message.status, MessageStatus::Sent);

        let req = Request::builder()
            .method("POST")
            .uri("/api/messages/2")
            .header("Authorization", format!("Bearer {}", tom))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("not json"))?;
        let res = app.oneshot(req).await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn uploaded_file_should_be_scoped_to_its_conversation() -> Result<()> {
        let (state, _tdb) = get_test_state_and_pg().await?;
        let sara = token_for(&state, 3, UserRole::Student)?;
        let tom = token_for(&state, 2, UserRole::Teacher)?;
        let sam = token_for(&state, 4, UserRole::Student)?;
        let app = get_router(state).await?;

        let boundary = "tutor-boundary";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\nContent-Type: text/plain\r\n\r\nhello world\r\n--{b}--\r\n",
            b = boundary
        );
        let req = Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header("Authorization", format!("Bearer {}", sara))
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))?;
        let res = app.clone().oneshot(req).await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await?.to_bytes();
        let attachments: Vec<Attachment> = serde_json::from_slice(&body)?;
        assert_eq!(attachments.len(), 1);
        let attachment = &attachments[0];
        assert_eq!(attachment.file_name, "notes.txt");
        assert_eq!(attachment.file_type, "text/plain");
        assert_eq!(attachment.file_size, 11);
        assert!(attachment.file_url.starts_with("/files/"));

        let req = Request::builder()
            .uri(format!("/api{}", attachment.file_url))
            .header("Authorization", format!("Bearer {}", sara))
            .body(Body::empty())?;
        let res = app.clone().oneshot(req).await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await?.to_bytes();
        assert_eq!(&body[..], b"hello world");

        // tom cannot read it before it is sent to him
        let download = |token: &str| {
            Request::builder()
                .uri(format!("/api{}", attachment.file_url))
                .header("Authorization", format!("Bearer {}", token))
                .body(Body::empty())
        };
        let res = app.clone().oneshot(download(&tom)?).await?;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        // the uploaded file can now back a FILE message
        let msg = serde_json::json!({
            "messageType": "FILE",
            "attachment": attachment,
        });
        let req = Request::builder()
            .method("POST")
            .uri("/api/messages/1")
            .header("Authorization", format!("Bearer {}", sara))
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(msg.to_string()))?;
        let res = app.clone().oneshot(req).await?;
        assert_eq!(res.status(), StatusCode::CREATED);

        let res = app.clone().oneshot(download(&tom)?).await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await?.to_bytes();
        assert_eq!(&body[..], b"hello world");

        // sam is outside conversation 1
        let res = app.oneshot(download(&sam)?).await?;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        let body = res.into_body().collect().await?.to_bytes();
        let out: ErrorOutput = serde_json::from_slice(&body)?;
        assert_eq!(out.error, "permission deny");
        Ok(())
    }
}
