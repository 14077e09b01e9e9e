pub mod config;
pub mod error;
pub mod state;
pub mod auth;
pub mod db;
pub mod models;
pub mod store;
pub mod enqueue;
pub mod delivery;
pub mod dispatcher;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use sqlx::PgPool;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::{AppState, SharedState};
use crate::store::PgStore;

/// Wire the Postgres-backed stores into a router and its shared state.
pub fn build_app(pool: PgPool, config: Config) -> (Router, SharedState) {
    let store = Arc::new(PgStore::new(pool));
    let state: SharedState = Arc::new(AppState::new(config, store.clone(), store));
    (router(state.clone()), state)
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .merge(routes::event_routes())
        .route("/health", axum::routing::get(health))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
