use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use scoutdesk_common::ScoutSchedule;

use super::ApiError;
use crate::auth::ApiToken;
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    publication_id: Uuid,
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    schedule: ScoutSchedule,
    timezone: String,
}

/// `POST /api/scout/run`: enqueue one publication now.
pub async fn api_run_scout(
    _token: ApiToken,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let message_id = state.scheduler.run_now(body.publication_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "messageId": message_id })),
    ))
}

/// `POST /api/scout/run-all`: enqueue every publication.
pub async fn api_run_all(
    _token: ApiToken,
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let enqueued = state.scheduler.run_all().await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "enqueued": enqueued }))))
}

/// `PUT /api/publications/{id}/schedule`
pub async fn api_update_schedule(
    _token: ApiToken,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ScheduleRequest>,
) -> Result<Json<Value>, ApiError> {
    let next = state
        .scheduler
        .update_schedule(id, body.schedule, &body.timezone, Utc::now())
        .await?;
    Ok(Json(json!({ "nextScoutAt": next })))
}
