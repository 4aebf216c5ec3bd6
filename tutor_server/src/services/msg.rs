use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use tutor_core::{Attachment, Message, MessageStatus, MessageType};
use utoipa::{IntoParams, ToSchema};

use crate::{error::AppError, models::StoredFile};

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 100;
const MAX_CONTENT_LEN: usize = 5000;

#[derive(Debug, Clone, ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Clone, Default, IntoParams, Serialize, Deserialize)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct ListMessageOption {
    /// only messages with a smaller id
    pub last_id: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, IntoParams, Serialize, Deserialize)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct PollOption {
    pub conversation_id: Option<u64>,
    /// the newest message the client has already seen
    pub last_message_id: Option<u64>,
}

pub(crate) struct MsgService {
    pool: PgPool,
    base_dir: PathBuf,
}

impl MsgService {
    pub fn new(pool: PgPool, base_dir: impl AsRef<Path>) -> Self {
        Self {
            pool,
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub async fn create(
        &self,
        input: CreateMessage,
        conversation_id: u64,
        sender_id: i64,
    ) -> Result<Message, AppError> {
        if input.content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::InvalidInput("content is too long".to_string()));
        }
        match (&input.message_type, &input.attachment) {
            (MessageType::Text, _) if input.content.trim().is_empty() => {
                return Err(AppError::InvalidInput("content is empty".to_string()));
            }
            (MessageType::Text, _) => {}
            (_, None) => {
                return Err(AppError::InvalidInput(
                    "attachment is required for non-text messages".to_string(),
                ));
            }
            (_, Some(_)) => {}
        }

        if let Some(attachment) = &input.attachment {
            if attachment.file_size < 0 {
                return Err(AppError::InvalidInput("file size is negative".to_string()));
            }
            let file = StoredFile::from_str(&attachment.file_url)?;
            if !file.path(&self.base_dir).exists() {
                return Err(AppError::InvalidInput("file not found".to_string()));
            }
            if !self.can_access_file(&attachment.file_url, sender_id).await? {
                return Err(AppError::PermissionDeny);
            }
        }

        let attachment = input.attachment;
        let message: Message = sqlx::query_as(
            r#"
            INSERT INTO messages (conversation_id, sender_id, content, message_type,
                file_url, file_name, file_type, file_size, thumbnail_url, duration)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, conversation_id, sender_id, content, message_type, status,
                file_url, file_name, file_type, file_size, thumbnail_url, duration,
                created_at, delivered_at, read_at
            "#,
        )
        .bind(conversation_id as i64)
        .bind(sender_id)
        .bind(input.content)
        .bind(input.message_type)
        .bind(attachment.as_ref().map(|a| a.file_url.clone()))
        .bind(attachment.as_ref().map(|a| a.file_name.clone()))
        .bind(attachment.as_ref().map(|a| a.file_type.clone()))
        .bind(attachment.as_ref().map(|a| a.file_size))
        .bind(attachment.as_ref().and_then(|a| a.thumbnail_url.clone()))
        .bind(attachment.as_ref().and_then(|a| a.duration))
        .fetch_one(&self.pool)
        .await?;

        debug!(
            "message {} sent by {} in conversation {}",
            message.id, sender_id, conversation_id
        );
        Ok(message)
    }

    /// Page through a conversation newest-first. No status side effects.
    pub async fn list(
        &self,
        input: ListMessageOption,
        conversation_id: u64,
    ) -> Result<Vec<Message>, AppError> {
        let last_id = input.last_id.unwrap_or(i64::MAX as _);
        let limit = input
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let messages = sqlx::query_as(
            r#"
        SELECT id, conversation_id, sender_id, content, message_type, status,
            file_url, file_name, file_type, file_size, thumbnail_url, duration,
            created_at, delivered_at, read_at
        FROM messages
        WHERE conversation_id = $1
        AND id < $2
        ORDER BY id DESC
        LIMIT $3
        "#,
        )
        .bind(conversation_id as i64)
        .bind(last_id as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Messages from the other participant created strictly after
    /// `last_message_id`, oldest first, ties ordered by id. Messages sharing
    /// the anchor's timestamp are not returned.
    /// Every returned SENT message is promoted to DELIVERED in the same
    /// transaction and returned as such.
    pub async fn poll(
        &self,
        conversation_id: u64,
        user_id: i64,
        last_message_id: Option<u64>,
    ) -> Result<Vec<Message>, AppError> {
        let mut tx = self.pool.begin().await?;

        let after: Option<DateTime<Utc>> = match last_message_id {
            Some(id) => {
                let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
                    "SELECT created_at FROM messages WHERE id = $1 AND conversation_id = $2",
                )
                .bind(id as i64)
                .bind(conversation_id as i64)
                .fetch_optional(&mut *tx)
                .await?;
                match created_at {
                    Some(created_at) => Some(created_at),
                    None => return Err(AppError::NotFound("last message id not found".to_string())),
                }
            }
            None => None,
        };

        // row locks keep the returned statuses exact under concurrent polls
        let mut messages: Vec<Message> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, sender_id, content, message_type, status,
                file_url, file_name, file_type, file_size, thumbnail_url, duration,
                created_at, delivered_at, read_at
            FROM messages
            WHERE conversation_id = $1
            AND sender_id <> $2
            AND ($3::timestamptz IS NULL OR created_at > $3)
            ORDER BY created_at ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(conversation_id as i64)
        .bind(user_id)
        .bind(after)
        .fetch_all(&mut *tx)
        .await?;

        let pending: Vec<i64> = messages
            .iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .map(|m| m.id)
            .collect();

        if !pending.is_empty() {
            let promoted: HashMap<i64, DateTime<Utc>> = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
                r#"
                UPDATE messages
                SET status = 'delivered', delivered_at = now()
                WHERE id = ANY($1) AND status = 'sent'
                RETURNING id, delivered_at
                "#,
            )
            .bind(&pending)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();

            for m in messages.iter_mut() {
                if let Some(at) = promoted.get(&m.id) {
                    m.status = MessageStatus::Delivered;
                    m.delivered_at = Some(*at);
                }
            }
            debug!(
                "poll by {} promoted {} messages in conversation {}",
                user_id,
                promoted.len(),
                conversation_id
            );
        }

        tx.commit().await?;
        Ok(messages)
    }

    pub async fn record_upload(&self, file_url: &str, user_id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO uploads (file_url, user_id)
            VALUES ($1, $2)
            ON CONFLICT (file_url, user_id) DO NOTHING
            "#,
        )
        .bind(file_url)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// A stored file is visible to whoever uploaded it and to both
    /// participants of any conversation it was sent in.
    pub async fn can_access_file(&self, file_url: &str, user_id: i64) -> Result<bool, AppError> {
        let allowed = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM uploads WHERE file_url = $1 AND user_id = $2
            ) OR EXISTS (
                SELECT 1 FROM messages m
                JOIN conversations c ON c.id = m.conversation_id
                WHERE m.file_url = $1
                AND (c.participant1_id = $2 OR c.participant2_id = $2)
            )
            "#,
        )
        .bind(file_url)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(allowed)
    }

    /// Mark everything the other participant sent as READ. Returns how
    /// many messages changed; calling it again changes nothing.
    pub async fn mark_read(&self, conversation_id: u64, user_id: i64) -> Result<u64, AppError> {
        let ret = sqlx::query(
            r#"
            UPDATE messages
            SET status = 'read', read_at = now()
            WHERE conversation_id = $1
            AND sender_id <> $2
            AND status <> 'read'
            "#,
        )
        .bind(conversation_id as i64)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        let count = ret.rows_affected();
        if count > 0 {
            info!(
                "{} messages read by {} in conversation {}",
                count, user_id, conversation_id
            );
        }
        Ok(count)
    }
}

#[cfg(test)]
impl CreateMessage {
    pub fn new(content: &str, message_type: MessageType, attachment: Option<Attachment>) -> Self {
        Self {
            content: content.to_string(),
            message_type,
            attachment,
        }
    }
}

#[cfg(test)]
impl ListMessageOption {
    pub fn new(last_id: Option<u64>, limit: u64) -> Self {
        Self {
            last_id,
            limit: Some(limit),
        }
    }
}
