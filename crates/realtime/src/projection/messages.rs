use api_types::{ChangeEvent, ChangeEventType, ChangeTable, Message, SenderType, Topic};
use uuid::Uuid;

use super::UiEvent;
use crate::{RealtimeError, gateway::ConversationReader};

/// Messages of the open conversation, oldest first.
#[derive(Debug, Clone)]
pub struct MessageProjection {
    conversation_id: Uuid,
    messages: Vec<Message>,
}

impl MessageProjection {
    pub fn new(conversation_id: Uuid) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        Topic::Conversation(self.conversation_id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub async fn load(&mut self, reader: &dyn ConversationReader) -> Result<(), RealtimeError> {
        self.messages = reader.list_messages(self.conversation_id).await?;
        Ok(())
    }

    /// Message changes carry the full row, so no re-fetch is needed.
    pub fn apply(&mut self, event: &ChangeEvent) -> Result<Option<UiEvent>, RealtimeError> {
        if event.table != ChangeTable::Messages {
            return Ok(None);
        }

        match event.event_type {
            ChangeEventType::Insert => {
                let Some(message) = self.decode(event)? else {
                    return Ok(None);
                };
                if self.messages.iter().any(|existing| existing.id == message.id) {
                    return Ok(None);
                }
                let cue = (message.sender_type == SenderType::Customer)
                    .then(|| UiEvent::incoming(&message));
                self.messages.push(message);
                Ok(cue)
            }
            ChangeEventType::Update => {
                if let Some(message) = self.decode(event)?
                    && let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id)
                {
                    *existing = message;
                }
                Ok(None)
            }
            ChangeEventType::Delete => {
                if let Some(id) = event.record_id() {
                    self.messages.retain(|message| message.id != id);
                }
                Ok(None)
            }
        }
    }

    fn decode(&self, event: &ChangeEvent) -> Result<Option<Message>, RealtimeError> {
        let Some(decoded) = event.decode_new::<Message>() else {
            return Ok(None);
        };
        let message = decoded?;
        Ok((message.conversation_id == self.conversation_id).then_some(message))
    }
}

#[cfg(test)]
mod tests {
    use api_types::MessageStatus;

    use super::*;
    use crate::testing::{FakeReader, message_row};

    fn insert(message: &Message) -> ChangeEvent {
        ChangeEvent::insert(ChangeTable::Messages, serde_json::to_value(message).unwrap())
    }

    #[tokio::test]
    async fn insert_appends_and_cues_customer_messages() {
        let conversation_id = Uuid::new_v4();
        let first = message_row(conversation_id, SenderType::Agent);
        let reader = FakeReader::default();
        reader.put_messages(conversation_id, vec![first.clone()]);

        let mut projection = MessageProjection::new(conversation_id);
        projection.load(&reader).await.unwrap();

        let from_customer = message_row(conversation_id, SenderType::Customer);
        let cue = projection.apply(&insert(&from_customer)).unwrap();
        assert_eq!(cue, Some(UiEvent::incoming(&from_customer)));

        let reply = message_row(conversation_id, SenderType::Agent);
        assert_eq!(projection.apply(&insert(&reply)).unwrap(), None);

        let ids: Vec<Uuid> = projection.messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![first.id, from_customer.id, reply.id]);
    }

    #[test]
    fn duplicate_and_foreign_inserts_are_ignored() {
        let conversation_id = Uuid::new_v4();
        let mut projection = MessageProjection::new(conversation_id);
        let message = message_row(conversation_id, SenderType::Customer);

        projection.apply(&insert(&message)).unwrap();
        assert_eq!(projection.apply(&insert(&message)).unwrap(), None);

        let foreign = message_row(Uuid::new_v4(), SenderType::Customer);
        assert_eq!(projection.apply(&insert(&foreign)).unwrap(), None);
        assert_eq!(projection.messages().len(), 1);
    }

    #[test]
    fn update_replaces_by_id_in_place() {
        let conversation_id = Uuid::new_v4();
        let mut projection = MessageProjection::new(conversation_id);
        let first = message_row(conversation_id, SenderType::Customer);
        let second = message_row(conversation_id, SenderType::Customer);
        projection.apply(&insert(&first)).unwrap();
        projection.apply(&insert(&second)).unwrap();

        let read = Message {
            status: MessageStatus::Read,
            ..first.clone()
        };
        let event = ChangeEvent::update(
            ChangeTable::Messages,
            serde_json::to_value(&read).unwrap(),
            None,
        );
        projection.apply(&event).unwrap();

        assert_eq!(projection.messages()[0].status, MessageStatus::Read);
        assert_eq!(projection.messages()[1].id, second.id);
    }

    #[test]
    fn malformed_rows_surface_as_errors() {
        let mut projection = MessageProjection::new(Uuid::new_v4());
        let event = ChangeEvent::insert(ChangeTable::Messages, serde_json::json!({ "id": 7 }));
        assert!(matches!(
            projection.apply(&event),
            Err(RealtimeError::Serde(_))
        ));
    }
}
