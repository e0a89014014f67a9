use std::collections::BTreeMap;

use api_types::{ChangeEvent, PresenceEvent, PresenceEventKind, PresencePayload, ServerFrame, Topic};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::ChangeSink;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct TrackedPresence {
    connection_id: Uuid,
    payload: PresencePayload,
}

/// One broadcast channel per topic plus the tracked presences of every
/// presence topic. Per-subscriber visibility is left to the connection.
#[derive(Default)]
pub struct RealtimeHub {
    channels: DashMap<Topic, broadcast::Sender<ServerFrame>>,
    presence: DashMap<Topic, Vec<TrackedPresence>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<ServerFrame> {
        self.channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Whether `topic` currently has a channel.
    pub fn is_open(&self, topic: &Topic) -> bool {
        self.channels.contains_key(topic)
    }

    /// Drops the channel of `topic` once nobody listens on it.
    pub fn release(&self, topic: &Topic) {
        self.channels
            .remove_if(topic, |_, sender| sender.receiver_count() == 0);
    }

    fn send(&self, topic: Topic, frame: ServerFrame) {
        if let Some(sender) = self.channels.get(&topic) {
            // No receivers is not an error: the topic simply has no listeners.
            let _ = sender.send(frame);
        }
    }

    pub fn broadcast(&self, topic: Topic, event: String, payload: Value) {
        self.send(
            topic,
            ServerFrame::Broadcast {
                topic,
                event,
                payload,
            },
        );
    }

    /// Current roster keyed by user id.
    pub fn presence_state(&self, topic: &Topic) -> BTreeMap<String, Vec<PresencePayload>> {
        let mut state: BTreeMap<String, Vec<PresencePayload>> = BTreeMap::new();
        if let Some(entries) = self.presence.get(topic) {
            for entry in entries.iter() {
                state
                    .entry(entry.payload.user_id.to_string())
                    .or_default()
                    .push(entry.payload.clone());
            }
        }
        state
    }

    pub fn presence_sync(&self, topic: Topic) -> ServerFrame {
        ServerFrame::Presence {
            topic,
            payload: PresenceEvent {
                event: PresenceEventKind::Sync,
                state: self.presence_state(&topic),
            },
        }
    }

    fn send_presence_delta(&self, topic: Topic, event: PresenceEventKind, payload: PresencePayload) {
        let state = BTreeMap::from([(payload.user_id.to_string(), vec![payload])]);
        self.send(
            topic,
            ServerFrame::Presence {
                topic,
                payload: PresenceEvent { event, state },
            },
        );
        self.send(topic, self.presence_sync(topic));
    }

    /// Records (or replaces) the presence a connection tracks on `topic`.
    pub fn track(&self, topic: Topic, connection_id: Uuid, payload: PresencePayload) {
        {
            let mut entries = self.presence.entry(topic).or_default();
            entries.retain(|entry| entry.connection_id != connection_id);
            entries.push(TrackedPresence {
                connection_id,
                payload: payload.clone(),
            });
        }
        self.send_presence_delta(topic, PresenceEventKind::Join, payload);
    }

    /// Returns whether the connection had anything tracked on `topic`.
    pub fn untrack(&self, topic: Topic, connection_id: Uuid) -> bool {
        let removed: Vec<TrackedPresence> = {
            let Some(mut entries) = self.presence.get_mut(&topic) else {
                return false;
            };
            let (removed, kept): (Vec<_>, Vec<_>) = entries
                .drain(..)
                .partition(|entry| entry.connection_id == connection_id);
            *entries = kept;
            removed
        };
        self.presence.remove_if(&topic, |_, entries| entries.is_empty());

        for entry in &removed {
            self.send_presence_delta(topic, PresenceEventKind::Leave, entry.payload.clone());
        }
        !removed.is_empty()
    }

    /// Untracks a connection from every presence topic, for disconnects.
    pub fn untrack_all(&self, connection_id: Uuid) {
        let topics: Vec<Topic> = self
            .presence
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .iter()
                    .any(|tracked| tracked.connection_id == connection_id)
            })
            .map(|entry| *entry.key())
            .collect();

        for topic in topics {
            self.untrack(topic, connection_id);
        }
    }
}

impl ChangeSink for RealtimeHub {
    fn publish(&self, topic: Topic, event: ChangeEvent) {
        self.send(
            topic,
            ServerFrame::Change {
                topic,
                payload: event,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use api_types::{ChangeTable, PresenceStatus};
    use chrono::Utc;
    use serde_json::json;

    use super::*;

    fn online(user_id: Uuid) -> PresencePayload {
        PresencePayload {
            user_id,
            status: PresenceStatus::Online,
            online_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn change_events_reach_topic_subscribers_only() {
        let hub = RealtimeHub::new();
        let business = Topic::BusinessConversations(Uuid::new_v4());
        let other = Topic::BusinessConversations(Uuid::new_v4());
        let mut rx = hub.subscribe(business);
        let mut other_rx = hub.subscribe(other);

        hub.publish(
            business,
            ChangeEvent::insert(ChangeTable::Conversations, json!({"id": Uuid::nil()})),
        );

        match rx.recv().await.unwrap() {
            ServerFrame::Change { topic, payload } => {
                assert_eq!(topic, business);
                assert_eq!(payload.record_id(), Some(Uuid::nil()));
            }
            frame => panic!("unexpected frame {frame:?}"),
        }
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn track_sends_join_then_full_sync() {
        let hub = RealtimeHub::new();
        let topic = Topic::Presence(Uuid::new_v4());
        let mut rx = hub.subscribe(topic);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        hub.track(topic, Uuid::new_v4(), online(first));
        hub.track(topic, Uuid::new_v4(), online(second));

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 4);
        match &frames[3] {
            ServerFrame::Presence { payload, .. } => {
                assert_eq!(payload.event, PresenceEventKind::Sync);
                assert_eq!(payload.state.len(), 2);
            }
            frame => panic!("unexpected frame {frame:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_untracks_every_topic() {
        let hub = RealtimeHub::new();
        let connection = Uuid::new_v4();
        let user = Uuid::new_v4();
        let a = Topic::Presence(Uuid::new_v4());
        let b = Topic::Presence(Uuid::new_v4());

        hub.track(a, connection, online(user));
        hub.track(b, connection, online(user));
        hub.untrack_all(connection);

        assert!(hub.presence_state(&a).is_empty());
        assert!(hub.presence_state(&b).is_empty());
        assert!(!hub.untrack(a, connection));
    }

    #[test]
    fn retracking_replaces_the_connection_entry() {
        let hub = RealtimeHub::new();
        let topic = Topic::Presence(Uuid::new_v4());
        let connection = Uuid::new_v4();
        let user = Uuid::new_v4();

        hub.track(topic, connection, online(user));
        let mut away = online(user);
        away.status = PresenceStatus::Away;
        hub.track(topic, connection, away);

        let state = hub.presence_state(&topic);
        let entries = &state[&user.to_string()];
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, PresenceStatus::Away);
    }

    #[test]
    fn released_topic_without_listeners_is_dropped() {
        let hub = RealtimeHub::new();
        let topic = Topic::Conversation(Uuid::new_v4());
        let rx = hub.subscribe(topic);
        hub.release(&topic);
        assert_eq!(hub.channels.len(), 1);
        drop(rx);
        hub.release(&topic);
        assert!(hub.channels.is_empty());
    }
}
