use std::collections::HashMap;

use api_types::{ServerFrame, TYPING_EVENT, TypingPayload};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

/// How long a typist stays listed after their last start signal.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// Who is currently typing in one conversation, excluding ourselves.
#[derive(Debug, Clone)]
pub struct TypingIndicator {
    own_user_id: Uuid,
    expiry: Duration,
    typing: HashMap<Uuid, Instant>,
}

impl TypingIndicator {
    pub fn new(own_user_id: Uuid) -> Self {
        Self {
            own_user_id,
            expiry: TYPING_EXPIRY,
            typing: HashMap::new(),
        }
    }

    /// Applies a signal and reports whether the set of typists changed.
    /// A repeated start only pushes the expiry back.
    pub fn apply(&mut self, payload: TypingPayload, now: Instant) -> bool {
        if payload.user_id == self.own_user_id {
            return false;
        }
        if payload.is_typing {
            self.typing
                .insert(payload.user_id, now + self.expiry)
                .is_none()
        } else {
            self.typing.remove(&payload.user_id).is_some()
        }
    }

    /// Drops entries whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.typing.len();
        self.typing.retain(|_, deadline| *deadline > now);
        self.typing.len() != before
    }

    pub fn next_expiry(&self) -> Option<Instant> {
        self.typing.values().min().copied()
    }

    pub fn typing_users(&self) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self.typing.keys().copied().collect();
        users.sort();
        users
    }
}

/// Extracts a typing signal from a broadcast frame.
pub fn typing_payload(frame: &ServerFrame) -> Option<TypingPayload> {
    match frame {
        ServerFrame::Broadcast { event, payload, .. } if event == TYPING_EVENT => {
            serde_json::from_value(payload.clone()).ok()
        }
        _ => None,
    }
}
