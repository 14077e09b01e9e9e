use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::json;

use crate::auth::extractor::AdminAuth;
use crate::delivery::health::{self, HealthReport};
use crate::error::AppError;
use crate::models::{QueueRecord, Settings, SettingsPatch};
use crate::state::SharedState;

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_settings(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<Settings>, AppError> {
    Ok(Json(state.settings.load().await?))
}

pub async fn update_settings(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>, AppError> {
    let mut settings = state.settings.load().await?;
    patch.apply(&mut settings).map_err(AppError::BadRequest)?;
    state.settings.save(&settings).await?;

    tracing::info!(
        "Settings updated (api_url set: {}, entry_test_id={})",
        settings.api_url.is_some(),
        settings.entry_test_id
    );

    Ok(Json(settings))
}

pub async fn health_check(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Result<Json<HealthReport>, AppError> {
    let settings = state.settings.load().await?;
    let report = health::check(&settings.delivery_config()).await;
    if !report.is_ok() {
        tracing::warn!("API health check failed: {}", report.message);
    }
    Ok(Json(report))
}

pub async fn list_queue(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let offset = params.offset.unwrap_or(0).max(0);

    let records = state.queue.list(limit, offset).await?;
    let counts = state.queue.counts().await?;

    Ok(Json(json!({
        "records": records,
        "counts": counts,
        "limit": limit,
        "offset": offset,
    })))
}

pub async fn get_record(
    _auth: AdminAuth,
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<QueueRecord>, AppError> {
    let record = state
        .queue
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Queue record not found".to_string()))?;
    Ok(Json(record))
}

pub async fn dispatch(
    _auth: AdminAuth,
    State(state): State<SharedState>,
) -> Json<serde_json::Value> {
    state.trigger.request();
    Json(json!({ "message": "Dispatch requested" }))
}
