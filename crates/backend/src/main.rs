use anyhow::Context as _;
use backend::{Server, SentrySource, config::BackendConfig, init_tracing, sentry_init_once};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sentry_init_once(SentrySource::Backend);
    init_tracing();

    let config = BackendConfig::from_env().context("failed to load configuration")?;
    tracing::info!(storage = ?config.storage, addr = %config.listen_addr, "starting backend");

    let server = Server::from_config(config).await?;
    server.run(backend::shutdown_signal()).await
}
