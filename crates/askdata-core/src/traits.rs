//! Core traits for askdata collaborators.
//!
//! The pipeline depends only on these interfaces, so every external service
//! (model server, schema index, warehouse, history store) can be swapped or
//! mocked.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// INFERENCE BACKEND TRAITS
// =============================================================================

/// Backend for generating embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for multiple texts.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Get the model name.
    fn model_name(&self) -> &str;
}

/// Backend for raw text generation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text from a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with a system prompt.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name.
    fn model_name(&self) -> &str;
}

/// Combined inference backend.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + GenerationBackend {
    /// Check if the backend is available.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// PIPELINE COLLABORATORS
// =============================================================================

/// Everything the generation client needs for one SQL attempt.
#[derive(Debug, Clone, Copy)]
pub struct SqlGenerationRequest<'a> {
    pub question: &'a str,
    pub schema: &'a SchemaContext,
    /// Reasons earlier attempts in this cycle failed, oldest first.
    pub prior_failures: &'a [String],
    pub attempt: u32,
}

/// Model-facing operations used by the pipeline.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Produce a candidate SQL statement (already extracted from the raw
    /// model text). Empty output is [`crate::Error::MalformedOutput`].
    async fn generate_sql(&self, request: SqlGenerationRequest<'_>) -> Result<String>;

    /// Produce a short natural-language explanation of a chart choice.
    async fn generate_chart_reasoning(&self, shape: &ResultShape) -> Result<String>;

    /// Rewrite a follow-up question into a self-contained one.
    async fn rewrite_question(&self, question: &str, turns: &[ConversationTurn])
        -> Result<String>;
}

/// Similarity index over schema descriptions.
#[async_trait]
pub trait SchemaIndex: Send + Sync {
    /// Return up to `k` fragments ordered by descending score.
    ///
    /// An empty result is not an error.
    async fn search(&self, text: &str, k: usize) -> Result<SchemaContext>;

    /// Check that the index is reachable.
    async fn health_check(&self) -> Result<bool>;
}

/// Nearest-neighbor storage under a [`SchemaIndex`].
#[async_trait]
pub trait SchemaVectorStore: Send + Sync {
    /// Return up to `k` fragments nearest to `query` with raw cosine
    /// similarity in `score`.
    async fn nearest(&self, query: &Vector, k: usize) -> Result<Vec<SchemaFragment>>;

    /// Number of indexed fragments.
    async fn count(&self) -> Result<i64>;
}

/// Read-only execution against the warehouse.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute one validated statement.
    async fn run(&self, sql: &str) -> std::result::Result<ResultSet, ExecutionFailure>;

    /// Check that the warehouse is reachable.
    async fn health_check(&self) -> Result<bool>;
}

/// Per-thread bounded conversation history.
#[async_trait]
pub trait TurnHistoryStore: Send + Sync {
    /// Most recent turns, oldest first, at most `limit`.
    async fn recent(&self, thread_id: &str, limit: usize) -> Result<Vec<ConversationTurn>>;

    /// Append a turn, evicting the oldest so at most `max_turns` remain.
    async fn append(&self, thread_id: &str, turn: ConversationTurn, max_turns: usize)
        -> Result<()>;
}
