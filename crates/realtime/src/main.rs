//! `inbox-watch <business id>`: follows a business inbox from the terminal
//! and stays present as online until interrupted.

use std::{env, sync::Arc};

use anyhow::{Context, bail};
use api_types::ConversationFilters;
use realtime::{
    ChannelGateway, ConversationProjection, ConversationReader, HttpReader, PresenceRoster,
    PresenceSession, RealtimeConfig, SocketGateway, UiEvent, driver,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use utils::sentry::{self, SentrySource};
use uuid::Uuid;

fn init_tracing() {
    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry::sentry_layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sentry::init_once(SentrySource::Realtime);
    init_tracing();

    let Some(business_id) = env::args().nth(1) else {
        bail!("usage: inbox-watch <business id>");
    };
    let business_id = Uuid::parse_str(&business_id).context("business id must be a UUID")?;

    let config = RealtimeConfig::from_env().context("failed to load realtime configuration")?;
    let http = HttpReader::new(config.api_url.clone(), config.access_token.clone())?;
    let me = http.me().await.context("failed to resolve the current user")?;
    sentry::configure_user_scope(&me.id.to_string(), Some(&me.email));
    info!(user_id = %me.id, %business_id, "watching inbox");

    let reader: Arc<dyn ConversationReader> = Arc::new(http);
    let channel: Arc<dyn ChannelGateway> =
        Arc::new(SocketGateway::connect(&config.realtime_url, &config.access_token).await?);
    let shutdown = CancellationToken::new();

    let (snapshots, mut snapshot_rx) = watch::channel(Vec::new());
    let (events, mut event_rx) = mpsc::channel(32);
    let feed = tokio::spawn(driver::run_conversation_feed(
        reader.clone(),
        channel.clone(),
        ConversationProjection::new(business_id, ConversationFilters::default()),
        snapshots,
        events,
        shutdown.clone(),
    ));

    let mut session = PresenceSession::new(channel.clone(), reader.clone(), business_id, me.id);
    let frames = session.start().await?;
    let (roster, mut roster_rx) = watch::channel(PresenceRoster::default());
    let presence = tokio::spawn(driver::run_presence(frames, roster, shutdown.clone()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = event_rx.recv() => match event {
                UiEvent::NewConversation(row) => {
                    info!(conversation_id = %row.id(), platform = ?row.conversation.platform, "new conversation");
                }
                UiEvent::IncomingMessageCue { conversation_id, message_id } => {
                    info!(%conversation_id, %message_id, "incoming message");
                }
            },
            Ok(()) = snapshot_rx.changed() => {
                info!(open = snapshot_rx.borrow_and_update().len(), "conversation list updated");
            }
            Ok(()) = roster_rx.changed() => {
                info!(online = roster_rx.borrow_and_update().members().len(), "presence updated");
            }
            else => break,
        }
    }

    shutdown.cancel();
    if let Err(error) = session.shutdown().await {
        warn!(%error, "failed to publish offline status");
    }
    for (name, task) in [("conversations", feed), ("presence", presence)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => error!(%error, task = name, "realtime task failed"),
            Err(error) => error!(%error, task = name, "realtime task panicked"),
        }
    }
    Ok(())
}
