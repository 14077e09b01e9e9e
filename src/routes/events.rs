use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::enqueue::{self, EnqueueOutcome};
use crate::models::AttemptGradedEvent;
use crate::state::SharedState;

/// Intake for "attempt graded" notifications.
///
/// Always answers 202 so a failure here can never break the platform's own
/// event processing. The outcome tag is informational only.
pub async fn attempt_graded(State(state): State<SharedState>, body: Bytes) -> Response {
    let outcome = match serde_json::from_slice::<AttemptGradedEvent>(&body) {
        Ok(event) => match state.settings.load().await {
            Ok(settings) => enqueue::observe(state.queue.as_ref(), &settings, &event).await,
            Err(e) => {
                tracing::error!("Failed to load settings for event intake: {e}");
                None
            }
        },
        Err(e) => {
            tracing::warn!("Malformed attempt-graded notification: {e}");
            Some(EnqueueOutcome::MissingSnapshot)
        }
    };

    if let Some(EnqueueOutcome::Queued { .. }) = outcome {
        state.trigger.request();
    }

    let tag = outcome.map_or("error", |o| o.as_str());
    (StatusCode::ACCEPTED, Json(json!({ "outcome": tag }))).into_response()
}
