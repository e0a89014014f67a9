use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type, TS)]
#[sqlx(type_name = "notification_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    ConversationAssigned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, TS)]
pub struct Notification {
    pub id: Uuid,
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a notification row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
}

impl NewNotification {
    pub fn conversation_assigned(business_id: Uuid, user_id: Uuid, conversation_id: Uuid) -> Self {
        Self {
            business_id,
            user_id,
            notification_type: NotificationType::ConversationAssigned,
            title: "New conversation assigned".to_string(),
            message: "A new conversation has been assigned to you".to_string(),
            action_url: Some(format!("/conversations/{conversation_id}")),
            action_label: Some("View Conversation".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ListNotificationsResponse {
    pub notifications: Vec<Notification>,
}
