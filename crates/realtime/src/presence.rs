use std::{collections::BTreeMap, sync::Arc};

use api_types::{PresenceEvent, PresenceEventKind, PresencePayload, PresenceStatus, Topic};
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    RealtimeError,
    gateway::{ChannelGateway, ConversationReader, FrameReceiver},
};

/// Online status of every tracked user in a business, keyed by presence key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceRoster {
    members: BTreeMap<String, PresencePayload>,
}

impl PresenceRoster {
    /// Applies a presence event; returns true when the roster changed.
    pub fn apply(&mut self, event: &PresenceEvent) -> bool {
        match event.event {
            PresenceEventKind::Sync => {
                let members: BTreeMap<String, PresencePayload> = event
                    .state
                    .iter()
                    .filter_map(|(key, payloads)| Some((key.clone(), payloads.first()?.clone())))
                    .collect();
                let changed = members != self.members;
                self.members = members;
                changed
            }
            PresenceEventKind::Join => {
                debug!(keys = ?event.state.keys().collect::<Vec<_>>(), "presence join");
                false
            }
            PresenceEventKind::Leave => {
                debug!(keys = ?event.state.keys().collect::<Vec<_>>(), "presence leave");
                false
            }
        }
    }

    pub fn members(&self) -> &BTreeMap<String, PresencePayload> {
        &self.members
    }

    pub fn status_of(&self, user_id: Uuid) -> Option<PresenceStatus> {
        self.members
            .values()
            .find(|payload| payload.user_id == user_id)
            .map(|payload| payload.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Our own presence in one business for the lifetime of a dashboard session.
pub struct PresenceSession {
    channel: Arc<dyn ChannelGateway>,
    reader: Arc<dyn ConversationReader>,
    topic: Topic,
    user_id: Uuid,
    active: bool,
}

impl PresenceSession {
    pub fn new(
        channel: Arc<dyn ChannelGateway>,
        reader: Arc<dyn ConversationReader>,
        business_id: Uuid,
        user_id: Uuid,
    ) -> Self {
        Self {
            channel,
            reader,
            topic: Topic::Presence(business_id),
            user_id,
            active: false,
        }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Joins the presence topic, tracks us as online and persists `online`
    /// as our status. The returned receiver carries the roster frames.
    pub async fn start(&mut self) -> Result<FrameReceiver, RealtimeError> {
        let frames = self.channel.subscribe(self.topic).await?;
        self.active = true;
        self.publish(PresenceStatus::Online).await?;
        self.reader.set_status(PresenceStatus::Online).await?;
        Ok(frames)
    }

    /// Hidden tabs show as away. Ignored once the session has shut down.
    pub async fn set_visibility(&mut self, visibility: Visibility) -> Result<(), RealtimeError> {
        if !self.active {
            return Ok(());
        }
        let status = match visibility {
            Visibility::Visible => PresenceStatus::Online,
            Visibility::Hidden => PresenceStatus::Away,
        };
        self.publish(status).await
    }

    /// Stops tracking and persists `offline` as the final status.
    pub async fn shutdown(&mut self) -> Result<(), RealtimeError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        if let Err(error) = self.channel.untrack(self.topic).await {
            warn!(%error, topic = %self.topic, "failed to untrack presence");
        }
        if let Err(error) = self.channel.unsubscribe(self.topic).await {
            warn!(%error, topic = %self.topic, "failed to leave presence topic");
        }
        self.reader.set_status(PresenceStatus::Offline).await
    }

    async fn publish(&self, status: PresenceStatus) -> Result<(), RealtimeError> {
        let payload = PresencePayload {
            user_id: self.user_id,
            status,
            online_at: Utc::now(),
        };
        self.channel.track(self.topic, payload).await
    }
}
