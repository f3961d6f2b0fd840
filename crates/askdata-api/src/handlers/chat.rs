//! `POST /api/v1/chat`: run one cycle for a question.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use askdata_core::{defaults, ChartRecommendation, ErrorDescriptor, PipelineRequest, Row};
use askdata_pipeline::{CancellationFlag, PipelineResult};

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Edited answer to the previous turn, used as rewrite context.
    #[serde(default)]
    pub previous_answer: Option<String>,
}

impl ChatRequest {
    fn into_pipeline_request(self) -> PipelineRequest {
        let thread_id = self
            .thread_id
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| defaults::DEFAULT_THREAD_ID.to_string());
        PipelineRequest {
            question: self.question,
            thread_id,
            previous_answer: self.previous_answer,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The question the cycle answered, after rewriting.
    pub question: String,
    pub sql_query: String,
    pub data: Vec<Row>,
    pub chart_analysis: ChartRecommendation,
    pub error: Option<ErrorDescriptor>,
    pub record_count: usize,
}

impl From<PipelineResult> for ChatResponse {
    fn from(result: PipelineResult) -> Self {
        let record_count = result.record_count();
        Self {
            question: result.question,
            sql_query: result.sql,
            data: result.rows,
            chart_analysis: result.chart,
            error: result.error,
            record_count,
        }
    }
}

/// Sets the flag when dropped, which happens if the client disconnects
/// before the cycle finishes.
struct CancelOnDrop(CancellationFlag);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = body.into_pipeline_request();
    info!(thread_id = %request.thread_id, "Chat request");

    let cancel = CancellationFlag::new();
    let _guard = CancelOnDrop(cancel.clone());
    let pipeline = state.pipeline.clone();
    let cycle = tokio::spawn(async move { pipeline.run_cycle(&request, &cancel).await });

    let result = cycle
        .await
        .map_err(|e| ApiError::Internal(format!("cycle task failed: {}", e)))??;
    Ok(Json(result.into()))
}
