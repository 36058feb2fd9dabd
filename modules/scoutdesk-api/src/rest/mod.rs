pub mod scout;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde_json::json;
use tracing::error;

use scoutdesk_common::ScoutError;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/scout/run", post(scout::api_run_scout))
        .route("/api/scout/run-all", post(scout::api_run_all))
        .route(
            "/api/publications/{id}/schedule",
            put(scout::api_update_schedule),
        )
        .with_state(state)
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Maps the engine's error taxonomy onto HTTP statuses.
pub struct ApiError(ScoutError);

impl From<ScoutError> for ApiError {
    fn from(e: ScoutError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ScoutError::NotFound(_) => StatusCode::NOT_FOUND,
            ScoutError::Config(_) | ScoutError::Serialization(_) => StatusCode::BAD_REQUEST,
            ScoutError::UpstreamUnavailable(_)
            | ScoutError::TransientStorage(_)
            | ScoutError::Timeout(_)
            | ScoutError::DraftTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
