use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::info;
use tutor_core::{Conversation, PublicUser, UserRole};
use utoipa::ToSchema;

use crate::error::AppError;

use super::UserService;

#[derive(Debug, Clone, ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversation {
    /// the user to talk to
    pub participant_id: i64,
}

/// A conversation as seen from one of its participants.
#[derive(Debug, Clone, ToSchema, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub other_user: PublicUser,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    id: i64,
    participant1_id: i64,
    participant2_id: i64,
    created_at: DateTime<Utc>,
    other_id: i64,
    other_fullname: String,
    other_role: UserRole,
    last_message: Option<String>,
    last_message_at: Option<DateTime<Utc>>,
    unread_count: i64,
}

#[derive(Clone)]
pub(crate) struct ConversationService {
    pool: PgPool,
    user_svc: Arc<UserService>,
}

impl ConversationService {
    pub fn new(pool: PgPool, user_svc: UserService) -> Self {
        Self {
            pool,
            user_svc: Arc::new(user_svc),
        }
    }

    /// Return the conversation between `user_id` and the requested
    /// participant, creating it on first contact. The bool is true when a
    /// new row was inserted.
    pub async fn get_or_create(
        &self,
        input: CreateConversation,
        user_id: i64,
    ) -> Result<(Conversation, bool), AppError> {
        if input.participant_id == user_id {
            return Err(AppError::InvalidInput(
                "cannot start a conversation with yourself".to_string(),
            ));
        }
        if self
            .user_svc
            .fetch_public_by_id(input.participant_id)
            .await?
            .is_none()
        {
            return Err(AppError::NotFound("user id not found".to_string()));
        }

        let (p1, p2) = Conversation::ordered_pair(user_id, input.participant_id);
        let created: Option<Conversation> = sqlx::query_as(
            r#"
            INSERT INTO conversations (participant1_id, participant2_id)
            VALUES ($1, $2)
            ON CONFLICT (participant1_id, participant2_id) DO NOTHING
            RETURNING id, participant1_id, participant2_id, created_at
            "#,
        )
        .bind(p1)
        .bind(p2)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(conv) = created {
            info!("conversation {} created between {} and {}", conv.id, p1, p2);
            return Ok((conv, true));
        }

        let conv = sqlx::query_as(
            r#"
            SELECT id, participant1_id, participant2_id, created_at
            FROM conversations
            WHERE participant1_id = $1 AND participant2_id = $2
            "#,
        )
        .bind(p1)
        .bind(p2)
        .fetch_one(&self.pool)
        .await?;
        Ok((conv, false))
    }

    pub async fn get_by_id(&self, id: u64) -> Result<Option<Conversation>, AppError> {
        let conv = sqlx::query_as(
            r#"
            SELECT id, participant1_id, participant2_id, created_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conv)
    }

    /// Load a conversation the caller takes part in: unknown ids are
    /// NotFound, anyone but the two participants gets PermissionDeny.
    pub async fn ensure_participant(
        &self,
        conversation_id: u64,
        user_id: i64,
    ) -> Result<Conversation, AppError> {
        match self.get_by_id(conversation_id).await? {
            Some(conv) if conv.has_participant(user_id) => Ok(conv),
            Some(_) => Err(AppError::PermissionDeny),
            None => Err(AppError::NotFound("conversation id not found".to_string())),
        }
    }

    /// All conversations of `user_id`, most recent activity first.
    pub async fn fetch_all(&self, user_id: i64) -> Result<Vec<ConversationSummary>, AppError> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT c.id, c.participant1_id, c.participant2_id, c.created_at,
                u.id AS other_id, u.fullname AS other_fullname, u.role AS other_role,
                last.content AS last_message, last.created_at AS last_message_at,
                (SELECT count(*) FROM messages m
                    WHERE m.conversation_id = c.id
                    AND m.sender_id <> $1
                    AND m.status <> 'read') AS unread_count
            FROM conversations c
            JOIN users u ON u.id = CASE WHEN c.participant1_id = $1
                THEN c.participant2_id ELSE c.participant1_id END
            LEFT JOIN LATERAL (
                SELECT content, created_at FROM messages m
                WHERE m.conversation_id = c.id
                ORDER BY m.created_at DESC, m.id DESC
                LIMIT 1
            ) last ON true
            WHERE c.participant1_id = $1 OR c.participant2_id = $1
            ORDER BY COALESCE(last.created_at, c.created_at) DESC, c.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ConversationSummary::from).collect())
    }
}

impl From<SummaryRow> for ConversationSummary {
    fn from(row: SummaryRow) -> Self {
        Self {
            conversation: Conversation {
                id: row.id,
                participant1_id: row.participant1_id,
                participant2_id: row.participant2_id,
                created_at: row.created_at,
            },
            other_user: PublicUser {
                id: row.other_id,
                fullname: row.other_fullname,
                role: row.other_role,
            },
            last_message: row.last_message,
            last_message_at: row.last_message_at,
            unread_count: row.unread_count,
        }
    }
}

#[cfg(test)]
impl CreateConversation {
    pub fn new(participant_id: i64) -> Self {
        Self { participant_id }
    }
}
