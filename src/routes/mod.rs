pub mod admin;
pub mod events;

use axum::Router;
use axum::routing::{get, post};

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Admin
        .route(
            "/api/v1/admin/settings",
            get(admin::get_settings).put(admin::update_settings),
        )
        .route("/api/v1/admin/health-check", post(admin::health_check))
        .route("/api/v1/admin/queue", get(admin::list_queue))
        .route("/api/v1/admin/queue/{id}", get(admin::get_record))
        .route("/api/v1/admin/dispatch", post(admin::dispatch))
}

pub fn event_routes() -> Router<SharedState> {
    Router::new().route(
        "/api/v1/events/attempt-graded",
        post(events::attempt_graded),
    )
}
