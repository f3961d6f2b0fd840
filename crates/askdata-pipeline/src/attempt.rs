//! Bounded generate, validate, execute loop.
//!
//! Each cycle runs an explicit state machine:
//!
//! ```text
//! Generating -> Validating -> Executing -> Succeeded
//!      ^            |             |
//!      |            v             v
//!      +------- RetryPending -----+----> Failed (cap reached)
//! ```
//!
//! A failure at any step becomes data on `RetryPending`. Its feedback is
//! added to the context of every later attempt in the cycle.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use askdata_core::{
    AttemptFailure, AttemptOutcome, ExecutionFailure, ExecutionFailureKind, GenerationClient,
    GenerationFailure, GenerationFailureKind, QueryAttempt, QueryExecutor, Result, ResultSet,
    SafetyValidator, SchemaContext, SqlGenerationRequest, ValidationVerdict,
};

use crate::cancel::CancellationFlag;
use crate::config::PipelineConfig;

/// States of one cycle's attempt loop.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Generating,
    Validating {
        sql: String,
    },
    Executing {
        sql: String,
        verdict: ValidationVerdict,
    },
    RetryPending {
        sql: Option<String>,
        verdict: Option<ValidationVerdict>,
        failure: AttemptFailure,
    },
    Succeeded {
        sql: String,
        result: ResultSet,
    },
    Failed {
        failure: AttemptFailure,
    },
}

impl AttemptState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Validating { .. } => "validating",
            Self::Executing { .. } => "executing",
            Self::RetryPending { .. } => "retry_pending",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Failure reasons fed to later attempts, bounded by a character budget.
///
/// When the budget is exceeded the oldest reasons are dropped first. The
/// newest reason is always kept, truncated if it alone exceeds the budget.
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    reasons: Vec<String>,
    budget: usize,
}

impl FailureLog {
    pub fn new(budget: usize) -> Self {
        Self {
            reasons: Vec::new(),
            budget,
        }
    }

    pub fn push(&mut self, reason: String) {
        self.reasons
            .push(askdata_core::truncate_chars(&reason, self.budget));
        while self.reasons.len() > 1 && self.total_chars() > self.budget {
            self.reasons.remove(0);
        }
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    fn total_chars(&self) -> usize {
        self.reasons.iter().map(|r| r.chars().count()).sum()
    }
}

/// Terminal state of the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopTerminal {
    Succeeded {
        /// The validated statement that ran.
        sql: String,
        result: ResultSet,
    },
    Failed {
        failure: AttemptFailure,
        /// Candidate SQL from the last attempt that produced any.
        last_sql: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopReport {
    pub terminal: LoopTerminal,
    pub attempts: Vec<QueryAttempt>,
}

/// Runs the attempt loop for one cycle.
pub struct AttemptLoop<'a> {
    pub client: &'a dyn GenerationClient,
    pub validator: &'a SafetyValidator,
    pub executor: &'a dyn QueryExecutor,
    pub config: &'a PipelineConfig,
    pub cancel: &'a CancellationFlag,
}

impl<'a> AttemptLoop<'a> {
    /// Drive the machine to a terminal state.
    ///
    /// Only cancellation is an `Err`; every step failure ends in
    /// [`LoopTerminal::Failed`] once the cap is reached.
    #[instrument(
        skip(self, question, schema),
        fields(subsystem = "pipeline", component = "attempt_loop", op = "run", max_attempts = self.config.max_attempts, fragments = schema.len())
    )]
    pub async fn run(&self, question: &str, schema: &SchemaContext) -> Result<LoopReport> {
        let cap = self.config.max_attempts.max(1);
        let mut attempt: u32 = 1;
        let mut failures = FailureLog::new(self.config.failure_context_chars);
        let mut attempts: Vec<QueryAttempt> = Vec::new();
        let mut last_sql: Option<String> = None;
        let mut state = AttemptState::Generating;

        loop {
            debug!(attempt, state = state.name(), "Attempt state");
            state = match state {
                AttemptState::Generating => {
                    self.cancel.check("generation")?;
                    self.generate(question, schema, attempt, failures.reasons())
                        .await
                }
                AttemptState::Validating { sql } => {
                    let verdict = self.validator.check(&sql);
                    match verdict.rejection_reason().map(str::to_string) {
                        None => AttemptState::Executing { sql, verdict },
                        Some(reason) => AttemptState::RetryPending {
                            sql: Some(sql),
                            verdict: Some(verdict),
                            failure: AttemptFailure::Validation { reason },
                        },
                    }
                }
                AttemptState::Executing { sql, verdict } => {
                    self.cancel.check("execution")?;
                    let statement = verdict.accepted_sql().unwrap_or(&sql).to_string();
                    match self.execute(&statement).await {
                        Ok(result) => {
                            attempts.push(QueryAttempt {
                                number: attempt,
                                sql: Some(sql),
                                verdict: Some(verdict),
                                outcome: AttemptOutcome::Succeeded {
                                    row_count: result.row_count(),
                                },
                            });
                            AttemptState::Succeeded {
                                sql: statement,
                                result,
                            }
                        }
                        Err(failure) => AttemptState::RetryPending {
                            sql: Some(sql),
                            verdict: Some(verdict),
                            failure: AttemptFailure::Execution(failure),
                        },
                    }
                }
                AttemptState::RetryPending {
                    sql,
                    verdict,
                    failure,
                } => {
                    if sql.is_some() {
                        last_sql = sql.clone();
                    }
                    attempts.push(QueryAttempt {
                        number: attempt,
                        sql,
                        verdict,
                        outcome: AttemptOutcome::Failed {
                            failure: failure.clone(),
                        },
                    });

                    let feedback = failure.feedback(self.config.max_error_chars);
                    if attempt >= cap {
                        info!(
                            attempt,
                            failure_kind = %failure.kind(),
                            reason = %feedback,
                            "Attempt cap reached"
                        );
                        AttemptState::Failed { failure }
                    } else {
                        warn!(
                            attempt,
                            failure_kind = %failure.kind(),
                            reason = %feedback,
                            "Attempt failed, retrying"
                        );
                        failures.push(feedback);
                        attempt += 1;
                        AttemptState::Generating
                    }
                }
                AttemptState::Succeeded { sql, result } => {
                    return Ok(LoopReport {
                        terminal: LoopTerminal::Succeeded { sql, result },
                        attempts,
                    });
                }
                AttemptState::Failed { failure } => {
                    return Ok(LoopReport {
                        terminal: LoopTerminal::Failed { failure, last_sql },
                        attempts,
                    });
                }
            };
        }
    }

    async fn generate(
        &self,
        question: &str,
        schema: &SchemaContext,
        attempt: u32,
        prior_failures: &[String],
    ) -> AttemptState {
        let request = SqlGenerationRequest {
            question,
            schema,
            prior_failures,
            attempt,
        };
        let step = self.config.step_timeout;

        let failure = match tokio::time::timeout(step, self.client.generate_sql(request)).await {
            Ok(Ok(sql)) if !sql.trim().is_empty() => return AttemptState::Validating { sql },
            Ok(Ok(_)) => GenerationFailure {
                kind: GenerationFailureKind::MalformedOutput,
                message: "model returned no SQL statement".to_string(),
            },
            Ok(Err(e)) => GenerationFailure::from(&e),
            Err(_) => GenerationFailure {
                kind: GenerationFailureKind::Timeout,
                message: format!("generation timed out after {}", fmt_duration(step)),
            },
        };

        AttemptState::RetryPending {
            sql: None,
            verdict: None,
            failure: AttemptFailure::Generation(failure),
        }
    }

    async fn execute(&self, statement: &str) -> std::result::Result<ResultSet, ExecutionFailure> {
        let start = Instant::now();
        let step = self.config.step_timeout;

        let outcome = tokio::time::timeout(step, self.executor.run(statement)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(ExecutionFailure::new(
                ExecutionFailureKind::Timeout,
                format!("query timed out after {}", fmt_duration(step)),
            )),
        };

        if let Ok(set) = &result {
            debug!(
                result_count = set.row_count(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Query executed"
            );
        }
        result
    }
}

fn fmt_duration(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}
