//! Pipeline orchestrator: one cycle from question to result.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use askdata_core::{
    ConversationTurn, Error, ErrorDescriptor, FailureKind, GenerationClient, PipelineRequest,
    PipelineResult, QueryExecutor, Result, SafetyValidator, SchemaContext, SchemaIndex,
    TurnHistoryStore,
};

use crate::attempt::{AttemptLoop, LoopTerminal};
use crate::cancel::CancellationFlag;
use crate::chart::ChartRecommender;
use crate::config::PipelineConfig;
use crate::history::MemoryTurnHistory;
use crate::rewriter::ConversationRewriter;

/// Liveness of the pipeline's external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineHealth {
    pub schema_index: bool,
    pub query_executor: bool,
    pub pipeline_ready: bool,
}

/// Runs cycles. Shared across requests; holds no per-cycle state.
pub struct Pipeline {
    schema_index: Arc<dyn SchemaIndex>,
    executor: Arc<dyn QueryExecutor>,
    client: Arc<dyn GenerationClient>,
    history: Arc<dyn TurnHistoryStore>,
    validator: SafetyValidator,
    rewriter: ConversationRewriter,
    charts: ChartRecommender,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one question end to end.
    ///
    /// Every step failure is folded into the returned [`PipelineResult`].
    /// `Err` is reserved for a blank question, cancellation, and nothing
    /// else: a cancelled cycle leaves the thread history untouched.
    #[instrument(
        skip(self, request, cancel),
        fields(subsystem = "pipeline", component = "orchestrator", op = "run_cycle", thread_id = %request.thread_id)
    )]
    pub async fn run_cycle(
        &self,
        request: &PipelineRequest,
        cancel: &CancellationFlag,
    ) -> Result<PipelineResult> {
        let start = Instant::now();
        if request.question.trim().is_empty() {
            return Err(Error::InvalidInput("question must not be empty".to_string()));
        }

        cancel.check("history lookup")?;
        let turns = match self
            .history
            .recent(&request.thread_id, self.config.history_max_turns)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                warn!(error = %e, "History lookup failed, continuing without context");
                Vec::new()
            }
        };

        cancel.check("rewrite")?;
        let resolution = self.rewriter.resolve(request, turns).await;
        let question = resolution.question;

        cancel.check("schema lookup")?;
        let schema = self.lookup_schema(&question).await;

        let report = AttemptLoop {
            client: self.client.as_ref(),
            validator: &self.validator,
            executor: self.executor.as_ref(),
            config: &self.config,
            cancel,
        }
        .run(&question, &schema)
        .await?;

        let attempt_count = report.attempts.len() as u32;
        let result = match report.terminal {
            LoopTerminal::Succeeded { sql, result } => {
                let (chart, _) = self.charts.recommend(&question, &result, cancel).await?;
                PipelineResult::succeeded(question.clone(), sql, result, chart, report.attempts)
            }
            LoopTerminal::Failed { failure, last_sql } => {
                let error = ErrorDescriptor {
                    kind: failure.kind(),
                    message: format!(
                        "{} (after {} attempt(s))",
                        failure.feedback(self.config.max_error_chars),
                        attempt_count
                    ),
                    attempts: attempt_count,
                    last_sql,
                };
                PipelineResult::failed(question.clone(), error, report.attempts)
            }
        };

        cancel.check("history append")?;
        let turn = ConversationTurn::new(question, result.summary());
        if let Err(e) = self
            .history
            .append(&request.thread_id, turn, self.config.history_max_turns)
            .await
        {
            warn!(error = %e, "History append failed");
        }

        info!(
            success = result.is_success(),
            attempts = attempt_count,
            result_count = result.record_count(),
            rewritten = resolution.rewritten,
            duration_ms = start.elapsed().as_millis() as u64,
            "Cycle completed"
        );
        Ok(result)
    }

    /// Retrieve schema context. Failures and timeouts degrade to an empty
    /// context, which generation handles like "no relevant schema".
    async fn lookup_schema(&self, question: &str) -> SchemaContext {
        let k = self.config.schema_top_k;
        let outcome =
            tokio::time::timeout(self.config.step_timeout, self.schema_index.search(question, k))
                .await;
        match outcome {
            Ok(Ok(context)) if !context.is_empty() => {
                debug!(fragments = context.len(), "Schema context retrieved");
                context
            }
            Ok(Ok(_)) => {
                debug!(failure_kind = %FailureKind::RetrievalEmpty, "No schema fragments matched");
                SchemaContext::default()
            }
            Ok(Err(e)) => {
                warn!(
                    failure_kind = %FailureKind::RetrievalEmpty,
                    error = %e,
                    "Schema lookup failed, continuing without schema context"
                );
                SchemaContext::default()
            }
            Err(_) => {
                warn!(
                    failure_kind = %FailureKind::RetrievalEmpty,
                    timeout_ms = self.config.step_timeout.as_millis() as u64,
                    "Schema lookup timed out, continuing without schema context"
                );
                SchemaContext::default()
            }
        }
    }

    /// Probe the schema index and the warehouse.
    pub async fn health(&self) -> PipelineHealth {
        let (index, warehouse) =
            tokio::join!(self.schema_index.health_check(), self.executor.health_check());
        let schema_index = index.unwrap_or(false);
        let query_executor = warehouse.unwrap_or(false);
        PipelineHealth {
            schema_index,
            query_executor,
            pipeline_ready: schema_index && query_executor,
        }
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    client: Arc<dyn GenerationClient>,
    schema_index: Arc<dyn SchemaIndex>,
    executor: Arc<dyn QueryExecutor>,
    history: Option<Arc<dyn TurnHistoryStore>>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        schema_index: Arc<dyn SchemaIndex>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            client,
            schema_index,
            executor,
            history: None,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a shared history store. Defaults to a fresh [`MemoryTurnHistory`].
    pub fn with_history(mut self, history: Arc<dyn TurnHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn build(self) -> Pipeline {
        let config = self.config;
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(MemoryTurnHistory::new()));
        Pipeline {
            validator: SafetyValidator::new(config.validator.clone()),
            rewriter: ConversationRewriter::new(self.client.clone(), config.step_timeout),
            charts: ChartRecommender::new(
                self.client.clone(),
                config.step_timeout,
                config.chart_sample_rows,
            ),
            schema_index: self.schema_index,
            executor: self.executor,
            client: self.client,
            history,
            config,
        }
    }
}
