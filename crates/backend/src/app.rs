use std::sync::Arc;

use anyhow::Context as _;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    AppState,
    auth::{JwtService, require_session},
    config::{BackendConfig, StorageBackend},
    db,
    gateway::Gateway,
    middleware::add_version_headers,
    routes,
};

pub struct Server {
    state: AppState,
}

impl Server {
    /// Connects storage and assembles the shared state.
    pub async fn from_config(config: BackendConfig) -> anyhow::Result<Self> {
        let gateway = match config.storage {
            StorageBackend::Postgres => {
                let database_url = config
                    .database_url
                    .as_deref()
                    .context("postgres storage requires a database url")?;
                let pool = db::connect(database_url, config.max_connections)
                    .await
                    .context("failed to connect to postgres")?;
                tracing::info!(max_connections = config.max_connections, "postgres pool ready");
                Gateway::postgres(pool)
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage; data is lost on restart");
                Gateway::memory()
            }
        };

        let jwt = Arc::new(JwtService::new(config.auth.jwt_secret()));
        Ok(Self {
            state: AppState::new(gateway, config, jwt),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves until `shutdown` fires, then drains background notifications.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let listen_addr = self.state.config().listen_addr.clone();
        let listener = TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("failed to bind {listen_addr}"))?;
        tracing::info!(addr = %listener.local_addr()?, "backend listening");

        let router = build_router(self.state.clone());
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .context("server error")?;

        tracing::info!("draining assignment notifications");
        self.state.notifier().wait_idle().await;
        Ok(())
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = routes::protected_router().route_layer(
        axum_middleware::from_fn_with_state(state.clone(), require_session),
    );

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(axum_middleware::from_fn(add_version_headers))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config().cors_allowed_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(%origin, ?error, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(AllowOrigin::list(allowed))
}

/// Cancels the returned token on SIGINT or SIGTERM.
pub fn shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    }
                }
                Err(error) => {
                    tracing::warn!(?error, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    tracing::info!("received SIGINT, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            tracing::info!("received Ctrl+C, shutting down");
        }

        trigger.cancel();
    });

    token
}
