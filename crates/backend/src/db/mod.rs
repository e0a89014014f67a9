//! Postgres implementation of the gateway stores.

mod businesses;
mod conversations;
mod customers;
mod messages;
mod notifications;
mod team_members;
mod users;

use std::time::Duration;

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::gateway::GatewayError;

#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Opens the pool and applies pending migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Maps a unique violation to [`GatewayError::Duplicate`], passing other errors through.
pub(crate) fn duplicate_on_unique(error: sqlx::Error, what: &'static str) -> GatewayError {
    match &error {
        sqlx::Error::Database(db_error) if db_error.is_unique_violation() => {
            GatewayError::Duplicate(what)
        }
        _ => GatewayError::Database(error),
    }
}
