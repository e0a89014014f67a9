mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod gateway;
mod middleware;
pub mod mutation_definition;
pub mod notifier;
pub mod realtime;
pub mod routes;
pub mod services;
mod state;

use std::env;

pub use app::{Server, build_router, shutdown_signal};
pub use state::AppState;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::{Layer as _, SubscriberExt},
    util::SubscriberInitExt,
};
pub use utils::sentry::{SentrySource, init_once as sentry_init_once};

pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let env_filter = env::var("RUST_LOG").unwrap_or_else(|_| "info,sqlx=warn".to_string());
    let fmt_layer = fmt::layer()
        .json()
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE)
        .boxed();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .with(utils::sentry::sentry_layer())
        .init();
}
