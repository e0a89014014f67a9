use api_types::HealthResponse;
use axum::{Json, Router, routing::get};

use crate::{AppState, mutation_definition::MutationDefinition};

pub(crate) mod access;
pub mod businesses;
pub mod conversations;
pub mod customers;
pub mod error;
pub mod messages;
pub mod realtime;
pub mod team;
pub mod users;

/// Routes reachable without a session.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Routes behind the session guard.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .merge(users::router())
        .merge(businesses::router())
        .merge(team::router())
        .merge(customers::router())
        .merge(conversations::router())
        .merge(messages::router())
        .merge(realtime::router())
}

/// Resource metadata for the generated TypeScript client.
pub fn mutation_definitions() -> Vec<MutationDefinition> {
    vec![
        businesses::mutation().definition(),
        team::mutation().definition(),
        customers::mutation().definition(),
        conversations::mutation().definition(),
        messages::mutation().definition(),
    ]
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
