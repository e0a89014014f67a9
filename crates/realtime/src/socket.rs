//! One multiplexed WebSocket to the backend's `/realtime` endpoint.
//!
//! Subscribing to a topic sends a `join` the first time it is requested and
//! routes every server frame for that topic to the subscriber's channel.
//! Frames for a subscriber that is not keeping up are dropped with a warning.

use std::sync::Arc;

use api_types::{ClientFrame, PresencePayload, ServerFrame, Topic, TypingPayload};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    RealtimeError,
    gateway::{ChannelGateway, FrameReceiver},
};

const OUTBOUND_BUFFER: usize = 64;
const SUBSCRIBER_BUFFER: usize = 256;

type Subscribers = Arc<DashMap<Topic, Vec<mpsc::Sender<ServerFrame>>>>;

pub struct SocketGateway {
    outbound: mpsc::Sender<ClientFrame>,
    subscribers: Subscribers,
    _shutdown: DropGuard,
}

impl SocketGateway {
    /// Opens the socket, passing the token as the `access_token` query
    /// parameter.
    pub async fn connect(url: &Url, token: &SecretString) -> Result<Self, RealtimeError> {
        let mut url = url.clone();
        url.query_pairs_mut()
            .append_pair("access_token", token.expose_secret());

        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        debug!("realtime socket connected");

        let (mut sink, mut source) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<ClientFrame>(OUTBOUND_BUFFER);
        let subscribers: Subscribers = Arc::new(DashMap::new());
        let shutdown = CancellationToken::new();

        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = writer_shutdown.cancelled() => break,
                    frame = outbound_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(?error, "failed to encode realtime frame");
                        continue;
                    }
                };
                if let Err(error) = sink.send(Message::text(text)).await {
                    warn!(%error, "realtime socket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_subscribers = Arc::clone(&subscribers);
        let reader_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = reader_shutdown.cancelled() => break,
                    message = source.next() => message,
                };
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(text.as_str()) {
                            Ok(frame) => dispatch(&reader_subscribers, frame),
                            Err(error) => warn!(%error, "invalid realtime frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("realtime socket closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!(%error, "realtime socket error");
                        break;
                    }
                }
            }
            // Dropping every sender ends the subscribers' streams.
            reader_subscribers.clear();
        });

        Ok(Self {
            outbound,
            subscribers,
            _shutdown: shutdown.drop_guard(),
        })
    }

    async fn send(&self, frame: ClientFrame) -> Result<(), RealtimeError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| RealtimeError::Closed)
    }
}

fn dispatch(subscribers: &Subscribers, frame: ServerFrame) {
    let Some(topic) = frame.topic() else {
        if let ServerFrame::Error { message, .. } = &frame {
            warn!(%message, "realtime server error");
        }
        return;
    };
    if let ServerFrame::Error { message, .. } = &frame {
        warn!(%topic, %message, "realtime topic error");
    }

    let Some(mut senders) = subscribers.get_mut(&topic) else {
        return;
    };
    senders.retain(|sender| match sender.try_send(frame.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(%topic, "realtime subscriber lagging, frame dropped");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    });
}

#[async_trait]
impl ChannelGateway for SocketGateway {
    async fn subscribe(&self, topic: Topic) -> Result<FrameReceiver, RealtimeError> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let first = {
            let mut senders = self.subscribers.entry(topic).or_default();
            senders.push(sender);
            senders.len() == 1
        };
        if first {
            self.send(ClientFrame::Join { topic }).await?;
        }
        Ok(receiver)
    }

    async fn unsubscribe(&self, topic: Topic) -> Result<(), RealtimeError> {
        if self.subscribers.remove(&topic).is_some() {
            self.send(ClientFrame::Leave { topic }).await?;
        }
        Ok(())
    }

    async fn broadcast_typing(
        &self,
        conversation_id: Uuid,
        payload: TypingPayload,
    ) -> Result<(), RealtimeError> {
        self.send(ClientFrame::typing(conversation_id, payload)?).await
    }

    async fn track(&self, topic: Topic, payload: PresencePayload) -> Result<(), RealtimeError> {
        self.send(ClientFrame::Track { topic, payload }).await
    }

    async fn untrack(&self, topic: Topic) -> Result<(), RealtimeError> {
        self.send(ClientFrame::Untrack { topic }).await
    }
}

#[cfg(test)]
mod tests {
    use api_types::{ChangeEvent, ChangeTable};
    use serde_json::json;

    use super::*;

    fn change(topic: Topic) -> ServerFrame {
        ServerFrame::Change {
            topic,
            payload: ChangeEvent::insert(ChangeTable::Messages, json!({ "id": Uuid::new_v4() })),
        }
    }

    #[tokio::test]
    async fn frames_reach_only_their_topic() {
        let subscribers: Subscribers = Arc::new(DashMap::new());
        let conversation = Topic::Conversation(Uuid::new_v4());
        let other = Topic::Conversation(Uuid::new_v4());
        let (sender, mut receiver) = mpsc::channel(4);
        subscribers.entry(conversation).or_default().push(sender);

        dispatch(&subscribers, change(other));
        dispatch(&subscribers, change(conversation));

        let frame = receiver.recv().await.unwrap();
        assert_eq!(frame.topic(), Some(conversation));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let subscribers: Subscribers = Arc::new(DashMap::new());
        let topic = Topic::Conversation(Uuid::new_v4());
        let (sender, receiver) = mpsc::channel(4);
        subscribers.entry(topic).or_default().push(sender);
        drop(receiver);

        dispatch(&subscribers, change(topic));
        assert!(subscribers.get(&topic).unwrap().is_empty());
    }
}
