//! `GET /realtime`: one WebSocket per dashboard tab, multiplexing any number
//! of topics. Frames are the JSON [`ClientFrame`]/[`ServerFrame`] enums.

use std::collections::HashMap;

use api_types::{
    ChangeEvent, ClientFrame, PresencePayload, ServerFrame, TYPING_EVENT, Topic, TopicScope,
    User,
};
use axum::{
    Router,
    extract::{
        Extension, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use uuid::Uuid;

use super::{
    access::{conversation_access, ensure_member},
    error::ErrorResponse,
};
use crate::{AppState, auth::RequestContext};

const OUTBOUND_BUFFER: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new().route("/realtime", get(realtime_socket))
}

async fn realtime_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, ctx.user))
}

/// Row changes a subscriber is allowed to receive on a business topic.
/// Members without `view_all` only get conversations assigned to them.
#[derive(Debug, Clone, Copy)]
enum Visibility {
    All,
    AssignedTo(Uuid),
}

impl Visibility {
    fn allows(self, frame: &ServerFrame) -> bool {
        match (self, frame) {
            (Visibility::All, _) => true,
            (Visibility::AssignedTo(member_id), ServerFrame::Change { payload, .. }) => {
                involves_assignee(payload, member_id)
            }
            (Visibility::AssignedTo(_), _) => true,
        }
    }
}

fn involves_assignee(event: &ChangeEvent, member_id: Uuid) -> bool {
    let expected = Value::String(member_id.to_string());
    [event.new.as_ref(), event.old.as_ref()]
        .into_iter()
        .flatten()
        .any(|row| row.get("assigned_to") == Some(&expected))
}

struct Connection {
    id: Uuid,
    user: User,
    state: AppState,
    outbound: mpsc::Sender<ServerFrame>,
    subscriptions: HashMap<Topic, JoinHandle<()>>,
}

impl Connection {
    async fn send(&self, frame: ServerFrame) {
        if self.outbound.send(frame).await.is_err() {
            tracing::debug!(connection_id = %self.id, "realtime connection already closed");
        }
    }

    async fn send_error(&self, topic: Option<Topic>, message: impl Into<String>) {
        self.send(ServerFrame::Error {
            topic,
            message: message.into(),
        })
        .await;
    }

    async fn authorize(&self, topic: Topic) -> Result<Visibility, ErrorResponse> {
        match topic.scope() {
            TopicScope::Business(business_id) => {
                let member = ensure_member(&self.state, self.user.id, business_id).await?;
                let visibility = match topic {
                    Topic::BusinessConversations(_)
                        if !member.permissions.conversations.view_all =>
                    {
                        Visibility::AssignedTo(member.id)
                    }
                    _ => Visibility::All,
                };
                Ok(visibility)
            }
            TopicScope::Conversation(conversation_id) => {
                conversation_access(&self.state, self.user.id, conversation_id).await?;
                Ok(Visibility::All)
            }
        }
    }

    async fn handle(&mut self, frame: ClientFrame) {
        match frame {
            ClientFrame::Join { topic } => self.join(topic).await,
            ClientFrame::Leave { topic } => self.leave(topic).await,
            ClientFrame::Broadcast {
                topic,
                event,
                payload,
            } => self.broadcast(topic, event, payload).await,
            ClientFrame::Track { topic, payload } => self.track(topic, payload).await,
            ClientFrame::Untrack { topic } => {
                self.state.hub().untrack(topic, self.id);
            }
        }
    }

    async fn join(&mut self, topic: Topic) {
        if self.subscriptions.contains_key(&topic) {
            self.send(ServerFrame::Joined { topic }).await;
            return;
        }

        let visibility = match self.authorize(topic).await {
            Ok(visibility) => visibility,
            Err(error) => {
                tracing::info!(%topic, user_id = %self.user.id, "realtime join rejected");
                self.send_error(Some(topic), error.message()).await;
                return;
            }
        };

        let mut receiver = self.state.hub().subscribe(topic);
        let outbound = self.outbound.clone();
        let connection_id = self.id;
        let forwarder = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(frame) => {
                        if !visibility.allows(&frame) {
                            continue;
                        }
                        if outbound.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(%topic, %connection_id, skipped, "realtime subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.subscriptions.insert(topic, forwarder);

        self.send(ServerFrame::Joined { topic }).await;
        if topic.is_presence() {
            self.send(self.state.hub().presence_sync(topic)).await;
        }
    }

    async fn leave(&mut self, topic: Topic) {
        if let Some(forwarder) = self.subscriptions.remove(&topic) {
            stop_forwarder(forwarder).await;
        }
        if topic.is_presence() {
            self.state.hub().untrack(topic, self.id);
        }
        self.state.hub().release(&topic);
    }

    async fn broadcast(&self, topic: Topic, event: String, payload: Value) {
        if !matches!(topic, Topic::Typing(_)) || event != TYPING_EVENT {
            self.send_error(Some(topic), "only typing broadcasts are supported")
                .await;
            return;
        }
        if !self.subscriptions.contains_key(&topic) {
            self.send_error(Some(topic), "join the topic before broadcasting")
                .await;
            return;
        }
        self.state.hub().broadcast(topic, event, payload);
    }

    async fn track(&self, topic: Topic, payload: PresencePayload) {
        if !topic.is_presence() || !self.subscriptions.contains_key(&topic) {
            self.send_error(Some(topic), "join a presence topic before tracking")
                .await;
            return;
        }
        let payload = PresencePayload {
            user_id: self.user.id,
            ..payload
        };
        self.state.hub().track(topic, self.id, payload);
    }

    async fn close(self) {
        for (topic, forwarder) in self.subscriptions {
            stop_forwarder(forwarder).await;
            self.state.hub().release(&topic);
        }
        self.state.hub().untrack_all(self.id);
    }
}

/// Aborts a forwarder and waits until its receiver is dropped, so a
/// following `release` sees the real subscriber count.
async fn stop_forwarder(forwarder: JoinHandle<()>) {
    forwarder.abort();
    if let Err(error) = forwarder.await
        && !error.is_cancelled()
    {
        tracing::warn!(?error, "realtime forwarder failed");
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);

    let mut connection = Connection {
        id: Uuid::new_v4(),
        user,
        state,
        outbound,
        subscriptions: HashMap::new(),
    };
    let connection_id = connection.id;
    tracing::info!(%connection_id, user_id = %connection.user.id, "realtime connection opened");

    let sender_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(?error, "failed to encode realtime frame");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = ws_receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(frame) => connection.handle(frame).await,
                Err(error) => {
                    tracing::warn!(%connection_id, %error, "invalid realtime frame");
                    connection
                        .send_error(None, format!("invalid frame: {error}"))
                        .await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    connection.close().await;
    sender_task.abort();
    tracing::info!(%connection_id, "realtime connection closed");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use api_types::{ChangeTable, CreateBusinessRequest};
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;
    use crate::{
        auth::JwtService,
        config::{AuthConfig, BackendConfig, StorageBackend},
        gateway::Gateway,
    };

    async fn connection() -> (Connection, Uuid, mpsc::Receiver<ServerFrame>) {
        let auth = AuthConfig::new(SecretString::new("s".repeat(32).into())).unwrap();
        let jwt = Arc::new(JwtService::new(auth.jwt_secret()));
        let config = BackendConfig {
            database_url: None,
            listen_addr: "127.0.0.1:0".to_string(),
            storage: StorageBackend::Memory,
            max_connections: 1,
            cors_allowed_origins: Vec::new(),
            auth,
        };
        let state = AppState::new(Gateway::memory(), config, jwt);
        let user = state
            .gateway()
            .users
            .provision_user(Uuid::new_v4(), "owner@acme.com")
            .await
            .unwrap();
        let business = state
            .businesses()
            .create(
                user.id,
                CreateBusinessRequest {
                    name: "Acme".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let (outbound, outbound_rx) = mpsc::channel(16);
        let connection = Connection {
            id: Uuid::new_v4(),
            user,
            state,
            outbound,
            subscriptions: HashMap::new(),
        };
        (connection, business.id, outbound_rx)
    }

    #[tokio::test]
    async fn leaving_the_last_subscription_drops_the_topic_channel() {
        let (mut connection, business_id, mut frames) = connection().await;
        let topic = Topic::BusinessConversations(business_id);

        connection.join(topic).await;
        assert_eq!(frames.recv().await, Some(ServerFrame::Joined { topic }));
        assert!(connection.state.hub().is_open(&topic));

        connection.leave(topic).await;
        assert!(!connection.state.hub().is_open(&topic));
    }

    #[tokio::test]
    async fn closing_a_connection_drops_its_topic_channels() {
        let (mut connection, business_id, _frames) = connection().await;
        let topic = Topic::Presence(business_id);
        connection.join(topic).await;

        let state = connection.state.clone();
        connection.close().await;
        assert!(!state.hub().is_open(&topic));
    }

    #[test]
    fn restricted_visibility_only_passes_own_assignments() {
        let member_id = Uuid::new_v4();
        let topic = Topic::BusinessConversations(Uuid::new_v4());
        let frame = |new: Value, old: Option<Value>| ServerFrame::Change {
            topic,
            payload: ChangeEvent::update(ChangeTable::Conversations, new, old),
        };

        let restricted = Visibility::AssignedTo(member_id);
        assert!(restricted.allows(&frame(json!({ "assigned_to": member_id }), None)));
        assert!(!restricted.allows(&frame(json!({ "assigned_to": null }), None)));
        // Reassignment away from the member still reaches them.
        assert!(restricted.allows(&frame(
            json!({ "assigned_to": Uuid::new_v4() }),
            Some(json!({ "assigned_to": member_id }))
        )));
        assert!(Visibility::All.allows(&frame(json!({}), None)));
    }
}
