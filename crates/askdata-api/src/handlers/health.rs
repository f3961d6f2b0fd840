//! `GET /health`: live check of the schema index and the warehouse.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.pipeline.health().await;
    let status = if health.pipeline_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}
