use api_types::{
    ChangeTable, Conversation, CreateMessageRequest, Message, MessageStatus, SenderType, Topic,
};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::ServiceError;
use crate::{
    gateway::{Gateway, NewMessage},
    realtime::{ChangeSink, publish_delete, publish_insert, publish_update},
};

pub struct MessageService<'a> {
    gateway: &'a Gateway,
    sink: &'a dyn ChangeSink,
}

impl<'a> MessageService<'a> {
    pub fn new(gateway: &'a Gateway, sink: &'a dyn ChangeSink) -> Self {
        Self { gateway, sink }
    }

    /// A page of the conversation's messages, oldest first.
    pub async fn list(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Message>, ServiceError> {
        if limit < 1 || offset < 0 {
            return Err(ServiceError::Validation(
                "limit must be positive and offset non-negative".to_string(),
            ));
        }
        Ok(self
            .gateway
            .messages
            .list_messages(conversation_id, limit, offset)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<Message, ServiceError> {
        self.gateway
            .messages
            .find_message(id)
            .await?
            .ok_or(ServiceError::NotFound("message"))
    }

    /// Stores a message and counts it against its conversation. Messages sent
    /// by an agent or the bot are delivered as soon as they are stored.
    pub async fn create(&self, request: CreateMessageRequest) -> Result<Message, ServiceError> {
        let conversation = self.live_conversation(request.conversation_id).await?;
        let from_customer = request.sender_type == SenderType::Customer;
        let outbound = request.sender_type.is_outbound();

        let mut message = self
            .gateway
            .messages
            .insert_message(NewMessage {
                conversation_id: conversation.id,
                sender_type: request.sender_type,
                sender_id: request.sender_id,
                sender_name: request.sender_name,
                content: request.content,
                content_type: request.content_type.unwrap_or_default(),
                attachments: Value::Array(request.attachments.unwrap_or_default()),
                platform: request.platform,
                platform_message_id: request.platform_message_id,
                is_internal_note: request.is_internal_note.unwrap_or(false),
            })
            .await?;

        if outbound
            && let Some(delivered) = self
                .gateway
                .messages
                .advance_message_status(message.id, MessageStatus::Delivered, Utc::now())
                .await?
        {
            message = delivered;
        }

        publish_insert(
            self.sink,
            Topic::Conversation(conversation.id),
            ChangeTable::Messages,
            &message,
        );

        match self
            .gateway
            .conversations
            .record_conversation_message(conversation.id, message.created_at, from_customer)
            .await?
        {
            Some(updated) => publish_update(
                self.sink,
                Topic::BusinessConversations(updated.business_id),
                ChangeTable::Conversations,
                &updated,
                Some(&conversation),
            ),
            None => tracing::warn!(
                conversation_id = %conversation.id,
                message_id = %message.id,
                "conversation vanished before message was counted"
            ),
        }

        Ok(message)
    }

    pub async fn mark_as_read(&self, id: Uuid) -> Result<Message, ServiceError> {
        self.advance(id, MessageStatus::Read).await
    }

    /// Only a `sent` message becomes `delivered`; anything further along is
    /// returned unchanged.
    pub async fn mark_as_delivered(&self, id: Uuid) -> Result<Message, ServiceError> {
        self.advance(id, MessageStatus::Delivered).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let message = self.get(id).await?;
        if !self.gateway.messages.delete_message(id).await? {
            return Err(ServiceError::NotFound("message"));
        }
        publish_delete(
            self.sink,
            Topic::Conversation(message.conversation_id),
            ChangeTable::Messages,
            &message,
        );
        Ok(())
    }

    async fn advance(&self, id: Uuid, status: MessageStatus) -> Result<Message, ServiceError> {
        let current = self.get(id).await?;
        if !current.status.can_advance_to(status) {
            return Ok(current);
        }

        match self
            .gateway
            .messages
            .advance_message_status(id, status, Utc::now())
            .await?
        {
            Some(message) => {
                publish_update(
                    self.sink,
                    Topic::Conversation(message.conversation_id),
                    ChangeTable::Messages,
                    &message,
                    Some(&current),
                );
                Ok(message)
            }
            // Advanced concurrently; report whatever is stored now.
            None => self.get(id).await,
        }
    }

    async fn live_conversation(&self, id: Uuid) -> Result<Conversation, ServiceError> {
        self.gateway
            .conversations
            .find_conversation(id)
            .await?
            .filter(|conversation| !conversation.is_deleted())
            .ok_or(ServiceError::NotFound("conversation"))
    }
}

#[cfg(test)]
mod tests {
    use api_types::{ChangeEventType, Platform};

    use super::*;
    use crate::services::conversations::tests::Fixture;

    fn request(conversation_id: Uuid, sender_type: SenderType, content: &str) -> CreateMessageRequest {
        CreateMessageRequest {
            conversation_id,
            sender_type,
            sender_id: None,
            sender_name: None,
            content: content.to_string(),
            content_type: None,
            attachments: None,
            platform: Platform::Whatsapp,
            platform_message_id: None,
            is_internal_note: None,
        }
    }

    #[tokio::test]
    async fn customer_message_bumps_unread_and_stays_sent() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let messages = MessageService::new(&fixture.gateway, &fixture.sink);

        let message = messages
            .create(request(conversation.id, SenderType::Customer, "Where is my order?"))
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.attachments, Value::Array(vec![]));

        let updated = fixture.conversations().find(conversation.id).await.unwrap();
        assert_eq!(updated.total_messages, 1);
        assert_eq!(updated.unread_count, 1);
        assert_eq!(updated.last_message_at, Some(message.created_at));
    }

    #[tokio::test]
    async fn agent_message_is_delivered_immediately() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let messages = MessageService::new(&fixture.gateway, &fixture.sink);

        let mut reply = request(conversation.id, SenderType::Agent, "On its way");
        reply.sender_id = Some(fixture.owner_id);
        let message = messages.create(reply).await.unwrap();
        assert_eq!(message.status, MessageStatus::Delivered);
        assert!(message.delivered_at.is_some());

        let updated = fixture.conversations().find(conversation.id).await.unwrap();
        assert_eq!(updated.total_messages, 1);
        assert_eq!(updated.unread_count, 0);
    }

    #[tokio::test]
    async fn status_never_moves_backward() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let messages = MessageService::new(&fixture.gateway, &fixture.sink);
        let message = messages
            .create(request(conversation.id, SenderType::Customer, "hi"))
            .await
            .unwrap();

        let read = messages.mark_as_read(message.id).await.unwrap();
        assert_eq!(read.status, MessageStatus::Read);
        let read_at = read.read_at.expect("read stamp");

        let after = messages.mark_as_delivered(message.id).await.unwrap();
        assert_eq!(after.status, MessageStatus::Read);
        assert_eq!(after.read_at, Some(read_at));
    }

    #[tokio::test]
    async fn messages_list_oldest_first_with_paging() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let messages = MessageService::new(&fixture.gateway, &fixture.sink);
        for content in ["one", "two", "three"] {
            messages
                .create(request(conversation.id, SenderType::Customer, content))
                .await
                .unwrap();
        }

        let page: Vec<String> = messages
            .list(conversation.id, 2, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|message| message.content)
            .collect();
        assert_eq!(page, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn marking_a_message_read_keeps_the_list_order() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let messages = MessageService::new(&fixture.gateway, &fixture.sink);
        let mut created = Vec::new();
        for content in ["one", "two", "three"] {
            let message = messages
                .create(request(conversation.id, SenderType::Customer, content))
                .await
                .unwrap();
            created.push(message.id);
        }

        messages.mark_as_read(created[1]).await.unwrap();

        let listed = messages.list(conversation.id, 50, 0).await.unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|message| message.id).collect();
        assert_eq!(ids, created);
        assert!(listed.windows(2).all(|pair| pair[0].created_at <= pair[1].created_at));
        assert_eq!(listed[1].status, MessageStatus::Read);
        assert_eq!(listed[0].status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn deleted_conversation_rejects_messages() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        fixture.conversations().delete(conversation.id).await.unwrap();

        let error = MessageService::new(&fixture.gateway, &fixture.sink)
            .create(request(conversation.id, SenderType::Customer, "hello?"))
            .await
            .unwrap_err();
        assert!(matches!(error, ServiceError::NotFound("conversation")));
    }

    #[tokio::test]
    async fn delete_is_hard_and_published() {
        let fixture = Fixture::new().await;
        let conversation = fixture.conversation().await;
        let messages = MessageService::new(&fixture.gateway, &fixture.sink);
        let message = messages
            .create(request(conversation.id, SenderType::Customer, "typo"))
            .await
            .unwrap();

        messages.delete(message.id).await.unwrap();
        assert!(matches!(
            messages.get(message.id).await,
            Err(ServiceError::NotFound(_))
        ));

        let message_events: Vec<ChangeEventType> = fixture
            .sink
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|(topic, _)| *topic == Topic::Conversation(conversation.id))
            .map(|(_, event)| event.event_type)
            .collect();
        assert_eq!(
            message_events,
            vec![ChangeEventType::Insert, ChangeEventType::Delete]
        );
    }
}
