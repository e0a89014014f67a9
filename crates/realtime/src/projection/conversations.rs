use std::cmp::Ordering;

use api_types::{
    ChangeEvent, ChangeEventType, ChangeTable, ConversationFilters, ConversationWithRelations,
    Topic,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::UiEvent;
use crate::{RealtimeError, gateway::ConversationReader};

/// The conversation list of one business, most recent activity first.
///
/// Updates replace rows in place and never re-sort, so a conversation whose
/// last message time moves keeps its slot until the next full load.
#[derive(Debug, Clone)]
pub struct ConversationProjection {
    business_id: Uuid,
    filters: ConversationFilters,
    conversations: Vec<ConversationWithRelations>,
}

impl ConversationProjection {
    pub fn new(business_id: Uuid, filters: ConversationFilters) -> Self {
        Self {
            business_id,
            filters,
            conversations: Vec::new(),
        }
    }

    pub fn topic(&self) -> Topic {
        Topic::BusinessConversations(self.business_id)
    }

    pub fn conversations(&self) -> &[ConversationWithRelations] {
        &self.conversations
    }

    pub async fn load(&mut self, reader: &dyn ConversationReader) -> Result<(), RealtimeError> {
        let mut conversations = reader
            .list_conversations(self.business_id, &self.filters)
            .await?;
        conversations.sort_by(most_recent_first);
        self.conversations = conversations;
        Ok(())
    }

    pub async fn apply(
        &mut self,
        reader: &dyn ConversationReader,
        event: &ChangeEvent,
    ) -> Result<Option<UiEvent>, RealtimeError> {
        if event.table != ChangeTable::Conversations {
            return Ok(None);
        }
        let Some(id) = event.record_id() else {
            warn!(business_id = %self.business_id, "conversation change without id");
            return Ok(None);
        };

        match event.event_type {
            ChangeEventType::Insert => {
                if self.position(id).is_some() {
                    return Ok(None);
                }
                let Some(row) = reader.conversation(id).await? else {
                    debug!(conversation_id = %id, "inserted conversation vanished before fetch");
                    return Ok(None);
                };
                if !self.filters.matches(&row.conversation) {
                    return Ok(None);
                }
                self.conversations.insert(0, row.clone());
                Ok(Some(UiEvent::NewConversation(Box::new(row))))
            }
            ChangeEventType::Update => {
                let Some(index) = self.position(id) else {
                    return Ok(None);
                };
                match reader.conversation(id).await? {
                    Some(row) => self.conversations[index] = row,
                    None => {
                        self.conversations.remove(index);
                    }
                }
                Ok(None)
            }
            ChangeEventType::Delete => {
                self.conversations.retain(|row| row.id() != id);
                Ok(None)
            }
        }
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.conversations.iter().position(|row| row.id() == id)
    }
}

/// Descending by last message time, conversations without messages last.
fn most_recent_first(a: &ConversationWithRelations, b: &ConversationWithRelations) -> Ordering {
    match (
        a.conversation.last_message_at,
        b.conversation.last_message_at,
    ) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use api_types::{ConversationStatus, Platform};
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::*;
    use crate::testing::{FakeReader, conversation_row};

    fn ids(projection: &ConversationProjection) -> Vec<Uuid> {
        projection.conversations().iter().map(|row| row.id()).collect()
    }

    #[tokio::test]
    async fn load_orders_most_recent_first_with_silent_conversations_last() {
        let business_id = Uuid::new_v4();
        let now = Utc::now();
        let silent = conversation_row(business_id, None);
        let older = conversation_row(business_id, Some(now - Duration::hours(2)));
        let newer = conversation_row(business_id, Some(now));
        let reader = FakeReader::with_conversations([silent.clone(), older.clone(), newer.clone()]);

        let mut projection = ConversationProjection::new(business_id, ConversationFilters::default());
        projection.load(&reader).await.unwrap();

        assert_eq!(ids(&projection), vec![newer.id(), older.id(), silent.id()]);
    }

    #[tokio::test]
    async fn insert_prepends_the_fetched_row_once() {
        let business_id = Uuid::new_v4();
        let existing = conversation_row(business_id, Some(Utc::now()));
        let reader = FakeReader::with_conversations([existing.clone()]);
        let mut projection = ConversationProjection::new(business_id, ConversationFilters::default());
        projection.load(&reader).await.unwrap();

        let inserted = conversation_row(business_id, None);
        reader.put_conversation(inserted.clone());
        let event = ChangeEvent::insert(ChangeTable::Conversations, json!({ "id": inserted.id() }));

        let ui = projection.apply(&reader, &event).await.unwrap();
        assert_eq!(ui, Some(UiEvent::NewConversation(Box::new(inserted.clone()))));
        assert_eq!(ids(&projection), vec![inserted.id(), existing.id()]);

        assert_eq!(projection.apply(&reader, &event).await.unwrap(), None);
        assert_eq!(projection.conversations().len(), 2);
    }

    #[tokio::test]
    async fn insert_of_vanished_or_filtered_row_is_ignored() {
        let business_id = Uuid::new_v4();
        let reader = FakeReader::default();
        let filters = ConversationFilters {
            platform: Some(Platform::Instagram),
            ..Default::default()
        };
        let mut projection = ConversationProjection::new(business_id, filters);

        let vanished = ChangeEvent::insert(ChangeTable::Conversations, json!({ "id": Uuid::new_v4() }));
        assert_eq!(projection.apply(&reader, &vanished).await.unwrap(), None);

        let whatsapp = conversation_row(business_id, None);
        reader.put_conversation(whatsapp.clone());
        let event = ChangeEvent::insert(ChangeTable::Conversations, json!({ "id": whatsapp.id() }));
        assert_eq!(projection.apply(&reader, &event).await.unwrap(), None);
        assert!(projection.conversations().is_empty());
    }

    #[tokio::test]
    async fn update_replaces_in_place_without_reordering() {
        let business_id = Uuid::new_v4();
        let now = Utc::now();
        let first = conversation_row(business_id, Some(now));
        let second = conversation_row(business_id, Some(now - Duration::hours(1)));
        let reader = FakeReader::with_conversations([first.clone(), second.clone()]);
        let mut projection = ConversationProjection::new(business_id, ConversationFilters::default());
        projection.load(&reader).await.unwrap();

        let mut bumped = second.clone();
        bumped.conversation.last_message_at = Some(now + Duration::minutes(5));
        bumped.conversation.status = ConversationStatus::Pending;
        reader.put_conversation(bumped.clone());

        let event = ChangeEvent::update(
            ChangeTable::Conversations,
            json!({ "id": second.id() }),
            None,
        );
        projection.apply(&reader, &event).await.unwrap();

        assert_eq!(ids(&projection), vec![first.id(), second.id()]);
        assert_eq!(projection.conversations()[1], bumped);
    }

    #[tokio::test]
    async fn update_of_a_row_no_longer_visible_drops_it() {
        let business_id = Uuid::new_v4();
        let row = conversation_row(business_id, None);
        let reader = FakeReader::with_conversations([row.clone()]);
        let mut projection = ConversationProjection::new(business_id, ConversationFilters::default());
        projection.load(&reader).await.unwrap();

        // Reassigned away from a limited agent: the re-fetch no longer returns it.
        reader.remove_conversation(row.id());
        let event = ChangeEvent::update(
            ChangeTable::Conversations,
            json!({ "id": row.id(), "assigned_to": Uuid::new_v4() }),
            Some(json!({ "id": row.id() })),
        );
        assert_eq!(projection.apply(&reader, &event).await.unwrap(), None);
        assert!(projection.conversations().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_by_id() {
        let business_id = Uuid::new_v4();
        let row = conversation_row(business_id, None);
        let reader = FakeReader::with_conversations([row.clone()]);
        let mut projection = ConversationProjection::new(business_id, ConversationFilters::default());
        projection.load(&reader).await.unwrap();

        let event = ChangeEvent::delete(ChangeTable::Conversations, json!({ "id": row.id() }));
        projection.apply(&reader, &event).await.unwrap();
        assert!(projection.conversations().is_empty());
    }
}
