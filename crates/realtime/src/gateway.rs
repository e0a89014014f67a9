//! Capabilities the projections are built on. Both are passed in explicitly
//! so tests can substitute in-process fakes.

use api_types::{
    ConversationFilters, ConversationWithRelations, Message, PresencePayload, PresenceStatus,
    ServerFrame, Topic, TypingPayload,
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::RealtimeError;

/// Frames delivered for one subscribed topic.
pub type FrameReceiver = mpsc::Receiver<ServerFrame>;

/// Server-authoritative reads used for initial loads and change re-fetches.
#[async_trait]
pub trait ConversationReader: Send + Sync {
    async fn list_conversations(
        &self,
        business_id: Uuid,
        filters: &ConversationFilters,
    ) -> Result<Vec<ConversationWithRelations>, RealtimeError>;

    /// `None` when the conversation no longer exists or is soft-deleted.
    async fn conversation(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationWithRelations>, RealtimeError>;

    /// Messages of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, RealtimeError>;

    /// Persists the caller's presence status.
    async fn set_status(&self, status: PresenceStatus) -> Result<(), RealtimeError>;
}

/// Push side of the realtime connection.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    async fn subscribe(&self, topic: Topic) -> Result<FrameReceiver, RealtimeError>;

    async fn unsubscribe(&self, topic: Topic) -> Result<(), RealtimeError>;

    async fn broadcast_typing(
        &self,
        conversation_id: Uuid,
        payload: TypingPayload,
    ) -> Result<(), RealtimeError>;

    async fn track(&self, topic: Topic, payload: PresencePayload) -> Result<(), RealtimeError>;

    async fn untrack(&self, topic: Topic) -> Result<(), RealtimeError>;
}
