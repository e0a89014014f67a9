//! Error reporting for the inbox processes.
//!
//! Sentry stays disabled unless the DSN variable of the running process is
//! set. `tracing` errors become Sentry events; debug through warn become
//! breadcrumbs attached to the next event.

use std::{env, sync::OnceLock};

use sentry::{ClientInitGuard, ClientOptions};
use sentry_tracing::{EventFilter, SentryLayer};
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::registry::LookupSpan;

static CLIENT: OnceLock<ClientInitGuard> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentrySource {
    Backend,
    Realtime,
}

impl SentrySource {
    /// `(scope tag, DSN variable)` for this process.
    const fn settings(self) -> (&'static str, &'static str) {
        match self {
            SentrySource::Backend => ("backend", "SENTRY_DSN_BACKEND"),
            SentrySource::Realtime => ("realtime", "SENTRY_DSN_REALTIME"),
        }
    }
}

/// Starts the Sentry client once per process and tags the scope with the
/// source. Returns false when no DSN is configured.
pub fn init_once(source: SentrySource) -> bool {
    let (tag, dsn_var) = source.settings();
    let Some(dsn) = env::var(dsn_var).ok().filter(|dsn| !dsn.is_empty()) else {
        return false;
    };

    CLIENT.get_or_init(|| {
        sentry::init((
            dsn,
            ClientOptions {
                release: sentry::release_name!(),
                environment: Some(if cfg!(debug_assertions) { "dev" } else { "production" }.into()),
                ..Default::default()
            },
        ))
    });
    sentry::configure_scope(|scope| scope.set_tag("source", tag));
    true
}

/// Attaches the authenticated inbox user to subsequent events.
pub fn configure_user_scope(user_id: &str, email: Option<&str>) {
    let user = sentry::User {
        id: Some(user_id.to_owned()),
        email: email.map(str::to_owned),
        ..Default::default()
    };
    sentry::configure_scope(|scope| scope.set_user(Some(user)));
}

fn event_filter(meta: &Metadata<'_>) -> EventFilter {
    match *meta.level() {
        Level::ERROR => EventFilter::Event,
        Level::TRACE => EventFilter::Ignore,
        _ => EventFilter::Breadcrumb,
    }
}

pub fn sentry_layer<S>() -> SentryLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    SentryLayer::default()
        .span_filter(|meta| *meta.level() != Level::TRACE)
        .event_filter(event_filter)
}
