use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Type;
use ts_rs::TS;
use uuid::Uuid;

use crate::{DEFAULT_PAGE_SIZE, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type, TS)]
#[sqlx(type_name = "sender_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    Agent,
    System,
    AiBot,
}

impl SenderType {
    /// Outbound messages are considered delivered as soon as they are stored.
    pub fn is_outbound(self) -> bool {
        matches!(self, Self::Agent | Self::AiBot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Type, TS)]
#[sqlx(type_name = "content_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    Video,
    Audio,
    File,
    Location,
    Contact,
    Sticker,
}

/// Delivery status. Variants are declared in lifecycle order, so `Ord`
/// gives the monotonic sent < delivered < read progression.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, Type, TS,
)]
#[sqlx(type_name = "message_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        next > self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, TS)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_type: SenderType,
    pub sender_id: Option<Uuid>,
    pub sender_name: Option<String>,
    pub content: String,
    pub content_type: ContentType,
    pub attachments: Value,
    pub platform: Platform,
    pub platform_message_id: Option<String>,
    pub status: MessageStatus,
    pub is_internal_note: bool,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateMessageRequest {
    pub conversation_id: Uuid,
    pub sender_type: SenderType,
    #[serde(default)]
    #[ts(optional)]
    pub sender_id: Option<Uuid>,
    #[serde(default)]
    #[ts(optional)]
    pub sender_name: Option<String>,
    pub content: String,
    #[serde(default)]
    #[ts(optional)]
    pub content_type: Option<ContentType>,
    #[serde(default)]
    #[ts(optional)]
    pub attachments: Option<Vec<Value>>,
    pub platform: Platform,
    #[serde(default)]
    #[ts(optional)]
    pub platform_message_id: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub is_internal_note: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    pub conversation_id: Uuid,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ListMessagesResponse {
    pub messages: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_moves_forward() {
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Delivered));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Read));
        assert!(MessageStatus::Delivered.can_advance_to(MessageStatus::Read));
        assert!(!MessageStatus::Read.can_advance_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Delivered));
    }

    #[test]
    fn list_query_defaults_to_first_page() {
        let query: ListMessagesQuery =
            serde_json::from_value(serde_json::json!({ "conversationId": Uuid::nil() })).unwrap();
        assert_eq!(query.limit, 50);
        assert_eq!(query.offset, 0);
    }
}
