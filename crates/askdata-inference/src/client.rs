//! [`GenerationClient`] over any raw [`GenerationBackend`].

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use askdata_core::{
    ConversationTurn, Error, GenerationBackend, GenerationClient, Result, ResultShape,
    SqlGenerationRequest,
};

use crate::extract::extract_sql;
use crate::prompts::{self, PromptContext};

/// Configuration for prompt assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    pub dialect: String,
    pub schema_overview: Option<String>,
    pub join_hints: Option<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            dialect: askdata_core::defaults::SQL_DIALECT.to_string(),
            schema_overview: None,
            join_hints: None,
        }
    }
}

impl PromptConfig {
    /// Load from `ASKDATA_SQL_DIALECT`, `ASKDATA_SCHEMA_OVERVIEW_FILE` and
    /// `ASKDATA_JOIN_HINTS_FILE`.
    ///
    /// A configured file that cannot be read is a configuration error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(dialect) = std::env::var("ASKDATA_SQL_DIALECT") {
            if !dialect.trim().is_empty() {
                config.dialect = dialect.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("ASKDATA_SCHEMA_OVERVIEW_FILE") {
            config.schema_overview = Some(read_context_file(&path)?);
        }
        if let Ok(path) = std::env::var("ASKDATA_JOIN_HINTS_FILE") {
            config.join_hints = Some(read_context_file(&path)?);
        }
        Ok(config)
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = dialect.into();
        self
    }

    pub fn with_schema_overview(mut self, overview: impl Into<String>) -> Self {
        self.schema_overview = Some(overview.into());
        self
    }

    pub fn with_join_hints(mut self, hints: impl Into<String>) -> Self {
        self.join_hints = Some(hints.into());
        self
    }

    fn context(&self) -> PromptContext {
        PromptContext {
            dialect: self.dialect.clone(),
            schema_overview: self.schema_overview.clone(),
            join_hints: self.join_hints.clone(),
        }
    }
}

fn read_context_file(path: &str) -> Result<String> {
    std::fs::read_to_string(Path::new(path))
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path, e)))
}

/// Generation client that assembles prompts and cleans model output.
pub struct LlmGenerationClient {
    backend: Arc<dyn GenerationBackend>,
    context: PromptContext,
}

impl LlmGenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self::with_config(backend, PromptConfig::default())
    }

    pub fn with_config(backend: Arc<dyn GenerationBackend>, config: PromptConfig) -> Self {
        Self {
            backend,
            context: config.context(),
        }
    }

    pub fn dialect(&self) -> &str {
        &self.context.dialect
    }
}

#[async_trait]
impl GenerationClient for LlmGenerationClient {
    #[instrument(
        skip(self, request),
        fields(subsystem = "inference", component = "client", op = "generate_sql", attempt = request.attempt)
    )]
    async fn generate_sql(&self, request: SqlGenerationRequest<'_>) -> Result<String> {
        let start = Instant::now();
        let system = prompts::sql_system_prompt(&self.context.dialect);
        let prompt = prompts::sql_user_prompt(&self.context, &request);

        let raw = self.backend.generate_with_system(&system, &prompt).await?;
        let sql = extract_sql(&raw);

        debug!(
            prompt_len = prompt.len(),
            response_len = raw.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            prior_failures = request.prior_failures.len(),
            "SQL candidate generated"
        );

        if sql.is_empty() {
            warn!(response_len = raw.len(), "Model returned no SQL");
            return Err(Error::MalformedOutput(
                "model returned no SQL statement".to_string(),
            ));
        }
        Ok(sql)
    }

    #[instrument(
        skip(self, shape),
        fields(subsystem = "inference", component = "client", op = "chart_reasoning", row_count = shape.row_count)
    )]
    async fn generate_chart_reasoning(&self, shape: &ResultShape) -> Result<String> {
        let prompt = prompts::chart_user_prompt(shape);
        let raw = self
            .backend
            .generate_with_system(prompts::CHART_SYSTEM_PROMPT, &prompt)
            .await?;

        let text = raw.trim();
        if text.is_empty() {
            return Err(Error::MalformedOutput(
                "model returned empty chart reasoning".to_string(),
            ));
        }
        Ok(text.to_string())
    }

    #[instrument(
        skip(self, question, turns),
        fields(subsystem = "inference", component = "client", op = "rewrite", turn_count = turns.len())
    )]
    async fn rewrite_question(
        &self,
        question: &str,
        turns: &[ConversationTurn],
    ) -> Result<String> {
        let prompt = prompts::rewrite_user_prompt(question, turns);
        let raw = self
            .backend
            .generate_with_system(prompts::REWRITE_SYSTEM_PROMPT, &prompt)
            .await?;

        let rewritten = prompts::clean_rewrite(&raw);
        if rewritten.is_empty() {
            return Err(Error::MalformedOutput(
                "model returned an empty question".to_string(),
            ));
        }
        debug!(response_len = rewritten.len(), "Question rewritten");
        Ok(rewritten)
    }
}
