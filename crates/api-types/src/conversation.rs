use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use strum_macros::{AsRefStr, Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use crate::{Customer, MemberRole, Platform, UserProfile, some_if_present};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Type,
    TS,
    Display,
    EnumString,
    AsRefStr,
)]
#[sqlx(type_name = "conversation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
    #[default]
    Open,
    Pending,
    Resolved,
    Closed,
    Archived,
}

impl ConversationStatus {
    /// Statuses that end the conversation and require the close capability.
    pub fn is_closing(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Type,
    TS,
    Display,
    EnumString,
    AsRefStr,
)]
#[sqlx(type_name = "assignment_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssignmentType {
    #[default]
    Unassigned,
    AiBot,
    TeamMember,
    RoundRobin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Type, TS)]
#[sqlx(type_name = "conversation_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, TS)]
pub struct Conversation {
    pub id: Uuid,
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub platform: Platform,
    pub platform_conversation_id: Option<String>,
    pub subject: Option<String>,
    pub priority: ConversationPriority,
    pub status: ConversationStatus,
    pub assigned_to: Option<Uuid>,
    pub assigned_type: AssignmentType,
    pub tags: Vec<String>,
    pub total_messages: i32,
    pub unread_count: i32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Team member a conversation is assigned to, as shown on conversation lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct AssignedMember {
    pub id: Uuid,
    pub role: MemberRole,
    pub user: UserProfile,
}

/// Conversation joined with its customer and assignee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct ConversationWithRelations {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub customer: Option<Customer>,
    pub assigned_member: Option<AssignedMember>,
}

impl ConversationWithRelations {
    pub fn id(&self) -> Uuid {
        self.conversation.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CreateConversationRequest {
    pub customer_id: Uuid,
    pub platform: Platform,
    #[serde(default)]
    #[ts(optional)]
    pub platform_conversation_id: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub subject: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub priority: Option<ConversationPriority>,
    #[serde(default)]
    #[ts(optional)]
    pub assigned_to: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateConversationRequest {
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub platform_conversation_id: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub subject: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<ConversationPriority>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub status: Option<ConversationStatus>,
    #[serde(
        default,
        deserialize_with = "some_if_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct AssignConversationRequest {
    #[serde(default)]
    #[ts(optional)]
    pub team_member_id: Option<Uuid>,
    pub assignment_type: AssignmentType,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct UpdateConversationStatusRequest {
    pub status: ConversationStatus,
}

/// Filters accepted by the conversation list endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unassigned_only: bool,
}

impl ConversationFilters {
    pub fn matches(&self, conversation: &Conversation) -> bool {
        self.status.is_none_or(|status| conversation.status == status)
            && self
                .platform
                .is_none_or(|platform| conversation.platform == platform)
            && self
                .assigned_to
                .is_none_or(|member| conversation.assigned_to == Some(member))
            && (!self.unassigned_only || conversation.assigned_to.is_none())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListConversationsQuery {
    pub business_id: Uuid,
    #[serde(default)]
    pub status: Option<ConversationStatus>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub unassigned_only: bool,
}

impl ListConversationsQuery {
    pub fn filters(&self) -> ConversationFilters {
        ConversationFilters {
            status: self.status,
            platform: self.platform,
            assigned_to: self.assigned_to,
            unassigned_only: self.unassigned_only,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ListConversationsResponse {
    pub conversations: Vec<ConversationWithRelations>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ListConversationsByCustomerResponse {
    pub conversations: Vec<Conversation>,
}
