//! Storage capabilities consumed by the services.
//!
//! Each entity gets its own store trait so a service only sees the tables it
//! touches. [`Gateway`] bundles one implementation of every store and is
//! constructed once at start-up, either over Postgres ([`crate::db::PgGateway`])
//! or fully in memory ([`memory::MemoryGateway`]).

pub mod memory;

use std::sync::Arc;

use api_types::{
    Business, Conversation, ConversationFilters, ConversationPriority, ConversationStatus,
    ConversationWithRelations, CreateBusinessRequest, CreateConversationRequest,
    CreateCustomerRequest, Customer, CustomerFilters, MemberRole, Message, MessageStatus,
    NewNotification, Notification, PermissionMatrix, Platform, PresenceStatus, SenderType,
    AssignmentType, ContentType, TeamMember, TeamMemberWithUser, UpdateBusinessRequest,
    UpdateCustomerRequest, UpdateTeamMemberRequest, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::db::PgGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Insert payload for a team membership.
#[derive(Debug, Clone)]
pub struct NewTeamMember {
    pub business_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub permissions: PermissionMatrix,
    pub department: Option<String>,
    pub title: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// Insert payload for a conversation; assignment is already normalised.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub business_id: Uuid,
    pub customer_id: Uuid,
    pub platform: Platform,
    pub platform_conversation_id: Option<String>,
    pub subject: Option<String>,
    pub priority: ConversationPriority,
    pub assigned_to: Option<Uuid>,
    pub assigned_type: AssignmentType,
}

impl NewConversation {
    pub fn from_request(business_id: Uuid, request: CreateConversationRequest) -> Self {
        let assigned_type = if request.assigned_to.is_some() {
            AssignmentType::TeamMember
        } else {
            AssignmentType::Unassigned
        };
        Self {
            business_id,
            customer_id: request.customer_id,
            platform: request.platform,
            platform_conversation_id: request.platform_conversation_id,
            subject: request.subject,
            priority: request.priority.unwrap_or_default(),
            assigned_to: request.assigned_to,
            assigned_type,
        }
    }
}

/// Partial conversation update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct ConversationChanges {
    pub platform_conversation_id: Option<Option<String>>,
    pub subject: Option<Option<String>>,
    pub priority: Option<ConversationPriority>,
    pub status: Option<ConversationStatus>,
    pub tags: Option<Vec<String>>,
    /// Written only when the row has no resolved stamp yet.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Assignment is written as a pair: target and type together.
    pub assignment: Option<(Option<Uuid>, AssignmentType)>,
    pub unread_count: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_type: SenderType,
    pub sender_id: Option<Uuid>,
    pub sender_name: Option<String>,
    pub content: String,
    pub content_type: ContentType,
    pub attachments: Value,
    pub platform: Platform,
    pub platform_message_id: Option<String>,
    pub is_internal_note: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, GatewayError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, GatewayError>;
    /// Inserts a user that exists only as an invitation target.
    async fn create_placeholder_user(
        &self,
        email: &str,
        full_name: Option<&str>,
    ) -> Result<User, GatewayError>;
    /// Ensures a row exists for an authenticated identity. A placeholder with
    /// the same e-mail is claimed by re-keying it to `id`.
    async fn provision_user(&self, id: Uuid, email: &str) -> Result<User, GatewayError>;
    async fn set_user_status(
        &self,
        id: Uuid,
        status: PresenceStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<User>, GatewayError>;
}

#[async_trait]
pub trait BusinessStore: Send + Sync {
    async fn list_businesses_for_user(&self, user_id: Uuid) -> Result<Vec<Business>, GatewayError>;
    async fn find_business(&self, id: Uuid) -> Result<Option<Business>, GatewayError>;
    /// Creates the business and its owner membership together.
    async fn create_business(
        &self,
        slug: &str,
        request: CreateBusinessRequest,
        owner: NewTeamMember,
    ) -> Result<Business, GatewayError>;
    async fn update_business(
        &self,
        id: Uuid,
        changes: UpdateBusinessRequest,
    ) -> Result<Option<Business>, GatewayError>;
    async fn replace_business_settings(
        &self,
        id: Uuid,
        settings: Value,
    ) -> Result<Option<Business>, GatewayError>;
    async fn soft_delete_business(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, GatewayError>;
}

#[async_trait]
pub trait TeamStore: Send + Sync {
    async fn list_members(&self, business_id: Uuid) -> Result<Vec<TeamMemberWithUser>, GatewayError>;
    async fn find_member(&self, id: Uuid) -> Result<Option<TeamMemberWithUser>, GatewayError>;
    async fn find_membership(
        &self,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<TeamMember>, GatewayError>;
    /// Fails with [`GatewayError::Duplicate`] when the pair already has a membership.
    async fn insert_member(&self, member: NewTeamMember) -> Result<TeamMember, GatewayError>;
    async fn update_member(
        &self,
        id: Uuid,
        changes: UpdateTeamMemberRequest,
    ) -> Result<Option<TeamMember>, GatewayError>;
    async fn delete_member(&self, id: Uuid) -> Result<bool, GatewayError>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn list_customers(
        &self,
        business_id: Uuid,
        filters: &CustomerFilters,
    ) -> Result<Vec<Customer>, GatewayError>;
    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>, GatewayError>;
    async fn find_customer_by_platform(
        &self,
        business_id: Uuid,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Customer>, GatewayError>;
    async fn insert_customer(
        &self,
        business_id: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError>;
    async fn update_customer(
        &self,
        id: Uuid,
        changes: UpdateCustomerRequest,
    ) -> Result<Option<Customer>, GatewayError>;
    async fn soft_delete_customer(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, GatewayError>;
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn list_conversations(
        &self,
        business_id: Uuid,
        filters: &ConversationFilters,
    ) -> Result<Vec<ConversationWithRelations>, GatewayError>;
    async fn list_customer_conversations(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<Conversation>, GatewayError>;
    async fn find_conversation(&self, id: Uuid) -> Result<Option<Conversation>, GatewayError>;
    async fn find_conversation_with_relations(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationWithRelations>, GatewayError>;
    async fn insert_conversation(
        &self,
        conversation: NewConversation,
    ) -> Result<Conversation, GatewayError>;
    /// Applies `changes` to a conversation that is not soft-deleted.
    async fn update_conversation(
        &self,
        id: Uuid,
        changes: ConversationChanges,
    ) -> Result<Option<Conversation>, GatewayError>;
    async fn soft_delete_conversation(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Conversation>, GatewayError>;
    async fn record_conversation_message(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        from_customer: bool,
    ) -> Result<Option<Conversation>, GatewayError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, GatewayError>;
    async fn find_message(&self, id: Uuid) -> Result<Option<Message>, GatewayError>;
    async fn insert_message(&self, message: NewMessage) -> Result<Message, GatewayError>;
    /// Moves the status forward to `status`. Returns `None` when the message
    /// is missing or already at or past `status`.
    async fn advance_message_status(
        &self,
        id: Uuid,
        status: MessageStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Message>, GatewayError>;
    async fn delete_message(&self, id: Uuid) -> Result<bool, GatewayError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> Result<Notification, GatewayError>;
    async fn list_notifications(
        &self,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Notification>, GatewayError>;
    async fn mark_notification_read(
        &self,
        id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Option<Notification>, GatewayError>;
}

/// One handle per store, all backed by the same storage.
#[derive(Clone)]
pub struct Gateway {
    pub users: Arc<dyn UserStore>,
    pub businesses: Arc<dyn BusinessStore>,
    pub team: Arc<dyn TeamStore>,
    pub customers: Arc<dyn CustomerStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub messages: Arc<dyn MessageStore>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Gateway {
    fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserStore
            + BusinessStore
            + TeamStore
            + CustomerStore
            + ConversationStore
            + MessageStore
            + NotificationStore
            + 'static,
    {
        Self {
            users: backend.clone(),
            businesses: backend.clone(),
            team: backend.clone(),
            customers: backend.clone(),
            conversations: backend.clone(),
            messages: backend.clone(),
            notifications: backend,
        }
    }

    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self::from_backend(Arc::new(PgGateway::new(pool)))
    }

    pub fn memory() -> Self {
        Self::from_backend(Arc::new(memory::MemoryGateway::default()))
    }
}
