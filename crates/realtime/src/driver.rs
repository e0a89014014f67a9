//! Long-running tasks that keep a projection current and publish it.
//!
//! Each driver subscribes first and loads second, so no change between the
//! initial fetch and the subscription is missed. Snapshots go out on a
//! `watch` channel after every applied change; UI events on an mpsc channel.
//! A driver returns `Ok(())` on shutdown and an error when its topic is
//! rejected or the connection drops.

use std::sync::Arc;

use api_types::{ChangeEvent, ConversationWithRelations, Message, ServerFrame, Topic};
use tokio::{
    sync::{mpsc, watch},
    time::{Instant, sleep_until},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    RealtimeError,
    gateway::{ChannelGateway, ConversationReader, FrameReceiver},
    presence::PresenceRoster,
    projection::{ConversationProjection, MessageProjection, UiEvent},
    typing::{TypingIndicator, typing_payload},
};

enum Next {
    Frame(ServerFrame),
    Shutdown,
    Closed,
}

async fn next_frame(frames: &mut FrameReceiver, shutdown: &CancellationToken) -> Next {
    tokio::select! {
        _ = shutdown.cancelled() => Next::Shutdown,
        frame = frames.recv() => frame.map_or(Next::Closed, Next::Frame),
    }
}

/// Turns a topic error into a rejection and passes other frames through.
fn screen(frame: ServerFrame) -> Result<ServerFrame, RealtimeError> {
    match frame {
        ServerFrame::Error { topic, message } => Err(RealtimeError::Rejected {
            topic: topic.map(|topic| topic.to_string()).unwrap_or_default(),
            message,
        }),
        ServerFrame::Joined { topic } => {
            debug!(%topic, "joined realtime topic");
            Ok(ServerFrame::Joined { topic })
        }
        frame => Ok(frame),
    }
}

fn change_of(frame: ServerFrame) -> Result<Option<ChangeEvent>, RealtimeError> {
    match screen(frame)? {
        ServerFrame::Change { payload, .. } => Ok(Some(payload)),
        _ => Ok(None),
    }
}

async fn emit(events: &mpsc::Sender<UiEvent>, event: UiEvent) {
    if events.send(event).await.is_err() {
        debug!("ui event receiver dropped");
    }
}

async fn leave(channel: &dyn ChannelGateway, topic: Topic) {
    if let Err(error) = channel.unsubscribe(topic).await {
        warn!(%error, %topic, "failed to leave realtime topic");
    }
}

pub async fn run_conversation_feed(
    reader: Arc<dyn ConversationReader>,
    channel: Arc<dyn ChannelGateway>,
    mut projection: ConversationProjection,
    snapshots: watch::Sender<Vec<ConversationWithRelations>>,
    events: mpsc::Sender<UiEvent>,
    shutdown: CancellationToken,
) -> Result<(), RealtimeError> {
    let topic = projection.topic();
    let mut frames = channel.subscribe(topic).await?;

    let result: Result<(), RealtimeError> = async {
        projection.load(reader.as_ref()).await?;
        snapshots.send_replace(projection.conversations().to_vec());

        loop {
            let frame = match next_frame(&mut frames, &shutdown).await {
                Next::Frame(frame) => frame,
                Next::Shutdown => return Ok(()),
                Next::Closed => return Err(RealtimeError::Closed),
            };
            let Some(change) = change_of(frame)? else {
                continue;
            };
            match projection.apply(reader.as_ref(), &change).await {
                Ok(event) => {
                    snapshots.send_replace(projection.conversations().to_vec());
                    if let Some(event) = event {
                        emit(&events, event).await;
                    }
                }
                Err(error) => warn!(%error, %topic, "failed to apply conversation change"),
            }
        }
    }
    .await;

    leave(channel.as_ref(), topic).await;
    result
}

pub async fn run_message_feed(
    reader: Arc<dyn ConversationReader>,
    channel: Arc<dyn ChannelGateway>,
    mut projection: MessageProjection,
    snapshots: watch::Sender<Vec<Message>>,
    events: mpsc::Sender<UiEvent>,
    shutdown: CancellationToken,
) -> Result<(), RealtimeError> {
    let topic = projection.topic();
    let mut frames = channel.subscribe(topic).await?;

    let result: Result<(), RealtimeError> = async {
        projection.load(reader.as_ref()).await?;
        snapshots.send_replace(projection.messages().to_vec());

        loop {
            let frame = match next_frame(&mut frames, &shutdown).await {
                Next::Frame(frame) => frame,
                Next::Shutdown => return Ok(()),
                Next::Closed => return Err(RealtimeError::Closed),
            };
            let Some(change) = change_of(frame)? else {
                continue;
            };
            match projection.apply(&change) {
                Ok(event) => {
                    snapshots.send_replace(projection.messages().to_vec());
                    if let Some(event) = event {
                        emit(&events, event).await;
                    }
                }
                Err(error) => warn!(%error, %topic, "failed to apply message change"),
            }
        }
    }
    .await;

    leave(channel.as_ref(), topic).await;
    result
}

/// Publishes the ids of users typing in `conversation_id`, sorted.
pub async fn run_typing(
    channel: Arc<dyn ChannelGateway>,
    conversation_id: Uuid,
    own_user_id: Uuid,
    snapshots: watch::Sender<Vec<Uuid>>,
    shutdown: CancellationToken,
) -> Result<(), RealtimeError> {
    let topic = Topic::Typing(conversation_id);
    let mut frames = channel.subscribe(topic).await?;
    let mut indicator = TypingIndicator::new(own_user_id);

    let result = loop {
        let deadline = indicator.next_expiry();
        tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if indicator.expire(Instant::now()) {
                    snapshots.send_replace(indicator.typing_users());
                }
            }
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break Err(RealtimeError::Closed);
                };
                let frame = match screen(frame) {
                    Ok(frame) => frame,
                    Err(error) => break Err(error),
                };
                if let Some(payload) = typing_payload(&frame)
                    && indicator.apply(payload, Instant::now())
                {
                    snapshots.send_replace(indicator.typing_users());
                }
            }
        }
    };

    leave(channel.as_ref(), topic).await;
    result
}

/// Applies presence frames from a started
/// [`PresenceSession`](crate::presence::PresenceSession) to a roster.
pub async fn run_presence(
    mut frames: FrameReceiver,
    snapshots: watch::Sender<PresenceRoster>,
    shutdown: CancellationToken,
) -> Result<(), RealtimeError> {
    let mut roster = PresenceRoster::default();
    loop {
        let frame = match next_frame(&mut frames, &shutdown).await {
            Next::Frame(frame) => frame,
            Next::Shutdown => return Ok(()),
            Next::Closed => return Err(RealtimeError::Closed),
        };
        if let ServerFrame::Presence { payload, .. } = screen(frame)?
            && roster.apply(&payload)
        {
            snapshots.send_replace(roster.clone());
        }
    }
}
