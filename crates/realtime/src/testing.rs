//! In-process fakes of the gateway traits.

use std::{collections::HashMap, sync::Mutex};

use api_types::{
    AssignmentType, ContentType, Conversation, ConversationFilters, ConversationPriority,
    ConversationStatus, ConversationWithRelations, Message, MessageStatus, Platform,
    PresencePayload, PresenceStatus, SenderType, ServerFrame, Topic, TypingPayload,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    RealtimeError,
    gateway::{ChannelGateway, ConversationReader, FrameReceiver},
};

pub fn conversation_row(
    business_id: Uuid,
    last_message_at: Option<DateTime<Utc>>,
) -> ConversationWithRelations {
    let now = Utc::now();
    ConversationWithRelations {
        conversation: Conversation {
            id: Uuid::new_v4(),
            business_id,
            customer_id: Uuid::new_v4(),
            platform: Platform::Whatsapp,
            platform_conversation_id: None,
            subject: None,
            priority: ConversationPriority::default(),
            status: ConversationStatus::Open,
            assigned_to: None,
            assigned_type: AssignmentType::Unassigned,
            tags: Vec::new(),
            total_messages: 0,
            unread_count: 0,
            last_message_at,
            resolved_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        },
        customer: None,
        assigned_member: None,
    }
}

pub fn message_row(conversation_id: Uuid, sender_type: SenderType) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        sender_type,
        sender_id: None,
        sender_name: None,
        content: "Is my order on the way?".to_string(),
        content_type: ContentType::Text,
        attachments: json!([]),
        platform: Platform::Whatsapp,
        platform_message_id: None,
        status: MessageStatus::Sent,
        is_internal_note: false,
        delivered_at: None,
        read_at: None,
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct FakeReader {
    conversations: Mutex<Vec<ConversationWithRelations>>,
    messages: Mutex<HashMap<Uuid, Vec<Message>>>,
    statuses: Mutex<Vec<PresenceStatus>>,
}

impl FakeReader {
    pub fn with_conversations(rows: impl IntoIterator<Item = ConversationWithRelations>) -> Self {
        let reader = Self::default();
        reader.conversations.lock().unwrap().extend(rows);
        reader
    }

    pub fn put_conversation(&self, row: ConversationWithRelations) {
        let mut conversations = self.conversations.lock().unwrap();
        match conversations.iter_mut().find(|existing| existing.id() == row.id()) {
            Some(existing) => *existing = row,
            None => conversations.push(row),
        }
    }

    pub fn remove_conversation(&self, id: Uuid) {
        self.conversations.lock().unwrap().retain(|row| row.id() != id);
    }

    pub fn put_messages(&self, conversation_id: Uuid, messages: Vec<Message>) {
        self.messages.lock().unwrap().insert(conversation_id, messages);
    }

    pub fn statuses(&self) -> Vec<PresenceStatus> {
        self.statuses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationReader for FakeReader {
    async fn list_conversations(
        &self,
        business_id: Uuid,
        filters: &ConversationFilters,
    ) -> Result<Vec<ConversationWithRelations>, RealtimeError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .filter(|row| row.conversation.business_id == business_id)
            .filter(|row| filters.matches(&row.conversation))
            .cloned()
            .collect())
    }

    async fn conversation(
        &self,
        id: Uuid,
    ) -> Result<Option<ConversationWithRelations>, RealtimeError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id() == id)
            .cloned())
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>, RealtimeError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_status(&self, status: PresenceStatus) -> Result<(), RealtimeError> {
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCall {
    Subscribe(Topic),
    Unsubscribe(Topic),
    Typing(Uuid, TypingPayload),
    Track(Topic, PresenceStatus),
    Untrack(Topic),
}

#[derive(Default)]
pub struct FakeChannel {
    calls: Mutex<Vec<ChannelCall>>,
    senders: Mutex<HashMap<Topic, mpsc::Sender<ServerFrame>>>,
}

impl FakeChannel {
    pub fn calls(&self) -> Vec<ChannelCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Delivers a frame to the subscriber of its topic.
    pub async fn push(&self, frame: ServerFrame) {
        let topic = frame.topic().unwrap();
        let sender = self.senders.lock().unwrap().get(&topic).cloned().unwrap();
        sender.send(frame).await.unwrap();
    }

    /// Ends the frame stream of `topic`, as a dropped connection would.
    pub fn disconnect(&self, topic: Topic) {
        self.senders.lock().unwrap().remove(&topic);
    }

    fn record(&self, call: ChannelCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChannelGateway for FakeChannel {
    async fn subscribe(&self, topic: Topic) -> Result<FrameReceiver, RealtimeError> {
        self.record(ChannelCall::Subscribe(topic));
        let (sender, receiver) = mpsc::channel(32);
        self.senders.lock().unwrap().insert(topic, sender);
        Ok(receiver)
    }

    async fn unsubscribe(&self, topic: Topic) -> Result<(), RealtimeError> {
        self.record(ChannelCall::Unsubscribe(topic));
        self.senders.lock().unwrap().remove(&topic);
        Ok(())
    }

    async fn broadcast_typing(
        &self,
        conversation_id: Uuid,
        payload: TypingPayload,
    ) -> Result<(), RealtimeError> {
        self.record(ChannelCall::Typing(conversation_id, payload));
        Ok(())
    }

    async fn track(&self, topic: Topic, payload: PresencePayload) -> Result<(), RealtimeError> {
        self.record(ChannelCall::Track(topic, payload.status));
        Ok(())
    }

    async fn untrack(&self, topic: Topic) -> Result<(), RealtimeError> {
        self.record(ChannelCall::Untrack(topic));
        Ok(())
    }
}
