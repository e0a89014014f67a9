//! Wire types for the realtime channel: topics, row-change events, presence
//! and typing payloads, and the JSON frames exchanged over `GET /realtime`.
//!
//! Client -> Server:
//! ```json
//! {"type": "join", "topic": "business:<id>:conversations"}
//! {"type": "broadcast", "topic": "typing:<id>", "event": "typing", "payload": {"userId": "...", "isTyping": true}}
//! {"type": "track", "topic": "presence:<id>", "payload": {"userId": "...", "status": "online", "onlineAt": "..."}}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"type": "joined", "topic": "..."}
//! {"type": "change", "topic": "...", "payload": {"eventType": "INSERT", "table": "conversations", "new": {...}, "old": null}}
//! {"type": "presence", "topic": "...", "payload": {"event": "sync", "state": {"<user id>": [{...}]}}}
//! ```

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use sqlx::Type;
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

/// Event name carried by typing broadcasts.
pub const TYPING_EVENT: &str = "typing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Type, TS)]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Away,
    #[default]
    Offline,
}

/// A realtime channel name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Row changes of every conversation in a business.
    BusinessConversations(Uuid),
    /// Message row changes of one conversation.
    Conversation(Uuid),
    /// Ephemeral typing broadcasts for one conversation.
    Typing(Uuid),
    /// Presence roster of a business.
    Presence(Uuid),
}

/// What a topic is scoped to, for access checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicScope {
    Business(Uuid),
    Conversation(Uuid),
}

impl Topic {
    pub fn scope(&self) -> TopicScope {
        match *self {
            Topic::BusinessConversations(id) | Topic::Presence(id) => TopicScope::Business(id),
            Topic::Conversation(id) | Topic::Typing(id) => TopicScope::Conversation(id),
        }
    }

    pub fn is_presence(&self) -> bool {
        matches!(self, Topic::Presence(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::BusinessConversations(id) => write!(f, "business:{id}:conversations"),
            Topic::Conversation(id) => write!(f, "conversation:{id}"),
            Topic::Typing(id) => write!(f, "typing:{id}"),
            Topic::Presence(id) => write!(f, "presence:{id}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown topic: {0}")]
pub struct TopicParseError(String);

impl FromStr for Topic {
    type Err = TopicParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TopicParseError(s.to_string());
        let parse_id = |raw: &str| Uuid::parse_str(raw).map_err(|_| invalid());

        match s.split(':').collect::<Vec<_>>().as_slice() {
            ["business", id, "conversations"] => Ok(Topic::BusinessConversations(parse_id(id)?)),
            ["conversation", id] => Ok(Topic::Conversation(parse_id(id)?)),
            ["typing", id] => Ok(Topic::Typing(parse_id(id)?)),
            ["presence", id] => Ok(Topic::Presence(parse_id(id)?)),
            _ => Err(invalid()),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEventType {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Conversations,
    Messages,
}

/// A row-level change pushed to subscribers of a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub event_type: ChangeEventType,
    pub table: ChangeTable,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(table: ChangeTable, new: Value) -> Self {
        Self {
            event_type: ChangeEventType::Insert,
            table,
            new: Some(new),
            old: None,
        }
    }

    pub fn update(table: ChangeTable, new: Value, old: Option<Value>) -> Self {
        Self {
            event_type: ChangeEventType::Update,
            table,
            new: Some(new),
            old,
        }
    }

    pub fn delete(table: ChangeTable, old: Value) -> Self {
        Self {
            event_type: ChangeEventType::Delete,
            table,
            new: None,
            old: Some(old),
        }
    }

    /// Id of the changed row, read from `new` and falling back to `old`.
    pub fn record_id(&self) -> Option<Uuid> {
        [self.new.as_ref(), self.old.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|row| row.get("id")?.as_str()?.parse().ok())
    }

    pub fn decode_new<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.new.clone().map(serde_json::from_value)
    }
}

/// State a client tracks on a presence topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct PresencePayload {
    pub user_id: Uuid,
    pub status: PresenceStatus,
    pub online_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEventKind {
    Sync,
    Join,
    Leave,
}

/// Presence update. For `sync` the state is the whole roster; for
/// `join`/`leave` it holds only the affected key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct PresenceEvent {
    pub event: PresenceEventKind,
    pub state: BTreeMap<String, Vec<PresencePayload>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub user_id: Uuid,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join {
        #[ts(type = "string")]
        topic: Topic,
    },
    Leave {
        #[ts(type = "string")]
        topic: Topic,
    },
    Broadcast {
        #[ts(type = "string")]
        topic: Topic,
        event: String,
        payload: Value,
    },
    Track {
        #[ts(type = "string")]
        topic: Topic,
        payload: PresencePayload,
    },
    Untrack {
        #[ts(type = "string")]
        topic: Topic,
    },
}

impl ClientFrame {
    pub fn typing(conversation_id: Uuid, payload: TypingPayload) -> Result<Self, serde_json::Error> {
        Ok(ClientFrame::Broadcast {
            topic: Topic::Typing(conversation_id),
            event: TYPING_EVENT.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Joined {
        #[ts(type = "string")]
        topic: Topic,
    },
    Change {
        #[ts(type = "string")]
        topic: Topic,
        payload: ChangeEvent,
    },
    Presence {
        #[ts(type = "string")]
        topic: Topic,
        payload: PresenceEvent,
    },
    Broadcast {
        #[ts(type = "string")]
        topic: Topic,
        event: String,
        payload: Value,
    },
    Error {
        #[serde(default)]
        #[ts(type = "string | null")]
        topic: Option<Topic>,
        message: String,
    },
}

impl ServerFrame {
    pub fn topic(&self) -> Option<Topic> {
        match self {
            ServerFrame::Joined { topic }
            | ServerFrame::Change { topic, .. }
            | ServerFrame::Presence { topic, .. }
            | ServerFrame::Broadcast { topic, .. } => Some(*topic),
            ServerFrame::Error { topic, .. } => *topic,
        }
    }
}
