pub mod middlewares;
pub mod utils;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, ToSchema, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Teacher,
    Admin,
}

/// A signed-in account. This is also the custom claim set carried by
/// session tokens, so `impersonated_by` is only ever set on a token,
/// never read from the store.
#[derive(Debug, Clone, FromRow, ToSchema, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub fullname: String,
    pub email: String,
    pub role: UserRole,
    #[sqlx(default)]
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[sqlx(default)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impersonated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// What one participant may see of the other.
#[derive(Debug, Clone, FromRow, ToSchema, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub fullname: String,
    pub role: UserRole,
}

#[derive(Debug, Clone, FromRow, ToSchema, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    pub participant1_id: i64,
    pub participant2_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Delivery status of a message. Variants are declared in lifecycle
/// order, so `Ord` follows SENT < DELIVERED < READ.
#[derive(
    Debug, Clone, Copy, ToSchema, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, sqlx::Type,
)]
#[sqlx(type_name = "message_status", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, Copy, Default, ToSchema, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "message_type", rename_all = "snake_case")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Voice,
    Video,
}

#[derive(Debug, Clone, ToSchema, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_url: String,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Playback length in seconds for voice and video messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, ToSchema, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl UserRole {
    pub fn is_admin(self) -> bool {
        self == UserRole::Admin
    }
}

impl User {
    pub fn new(id: i64, fullname: &str, email: &str, role: UserRole) -> Self {
        Self {
            id,
            fullname: fullname.to_string(),
            email: email.to_string(),
            role,
            password_hash: None,
            impersonated_by: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_impersonating(&self) -> bool {
        self.impersonated_by.is_some()
    }
}

impl Conversation {
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.participant1_id == user_id || self.participant2_id == user_id
    }

    /// The participant that is not `user_id`, if `user_id` is one of the two.
    pub fn other_participant(&self, user_id: i64) -> Option<i64> {
        if self.participant1_id == user_id {
            Some(self.participant2_id)
        } else if self.participant2_id == user_id {
            Some(self.participant1_id)
        } else {
            None
        }
    }

    /// Unordered pair in storage order (smaller id first).
    pub fn ordered_pair(a: i64, b: i64) -> (i64, i64) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

impl MessageStatus {
    /// Status only ever moves forward.
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        next > self
    }
}

impl<'r> FromRow<'r, PgRow> for Message {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let file_url: Option<String> = row.try_get("file_url")?;
        let attachment = match file_url {
            Some(file_url) => Some(Attachment {
                file_url,
                file_name: row
                    .try_get::<Option<String>, _>("file_name")?
                    .unwrap_or_default(),
                file_type: row
                    .try_get::<Option<String>, _>("file_type")?
                    .unwrap_or_default(),
                file_size: row.try_get::<Option<i64>, _>("file_size")?.unwrap_or(0),
                thumbnail_url: row.try_get("thumbnail_url")?,
                duration: row.try_get("duration")?,
            }),
            None => None,
        };
        Ok(Self {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            content: row.try_get("content")?,
            message_type: row.try_get("message_type")?,
            status: row.try_get("status")?,
            attachment,
            created_at: row.try_get("created_at")?,
            delivered_at: row.try_get("delivered_at")?,
            read_at: row.try_get("read_at")?,
        })
    }
}
