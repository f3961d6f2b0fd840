//! Conversation rewriter: turns a follow-up into a self-contained question.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use askdata_core::{ConversationTurn, FailureKind, GenerationClient, PipelineRequest};

/// Result of resolving a question against its thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// The question every later step works from.
    pub question: String,
    /// Whether the model was consulted.
    pub rewritten: bool,
    /// Set when rewriting failed and the raw question was used.
    pub degraded: Option<FailureKind>,
}

impl Resolution {
    fn passthrough(question: &str) -> Self {
        Self {
            question: question.to_string(),
            rewritten: false,
            degraded: None,
        }
    }
}

/// Build the turns the model sees. `previous_answer` replaces the answer of
/// the latest turn, or stands alone when the thread is empty.
pub fn rewrite_context(
    mut turns: Vec<ConversationTurn>,
    previous_answer: Option<&str>,
) -> Vec<ConversationTurn> {
    if let Some(answer) = previous_answer.filter(|a| !a.trim().is_empty()) {
        match turns.last_mut() {
            Some(last) => last.answer_summary = answer.to_string(),
            None => turns.push(ConversationTurn::new("", answer)),
        }
    }
    turns
}

pub struct ConversationRewriter {
    client: Arc<dyn GenerationClient>,
    timeout: Duration,
}

impl ConversationRewriter {
    pub fn new(client: Arc<dyn GenerationClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Resolve `request.question` against `turns` (oldest first).
    ///
    /// Never fails: with no context the question passes through untouched,
    /// and any model failure or timeout falls back to the raw question.
    #[instrument(
        skip(self, request, turns),
        fields(subsystem = "pipeline", component = "rewriter", op = "resolve", thread_id = %request.thread_id)
    )]
    pub async fn resolve(
        &self,
        request: &PipelineRequest,
        turns: Vec<ConversationTurn>,
    ) -> Resolution {
        let context = rewrite_context(turns, request.previous_answer.as_deref());
        if context.is_empty() {
            debug!("No prior turns, question passes through");
            return Resolution::passthrough(&request.question);
        }

        let start = Instant::now();
        let outcome = tokio::time::timeout(
            self.timeout,
            self.client.rewrite_question(&request.question, &context),
        )
        .await;

        let reason = match outcome {
            Ok(Ok(question)) if !question.trim().is_empty() => {
                debug!(
                    turn_count = context.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Question rewritten"
                );
                return Resolution {
                    question: question.trim().to_string(),
                    rewritten: true,
                    degraded: None,
                };
            }
            Ok(Ok(_)) => "empty rewrite".to_string(),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", self.timeout.as_millis()),
        };

        warn!(
            failure_kind = %FailureKind::RewriteDegraded,
            error = %reason,
            "Rewrite failed, using the raw question"
        );
        Resolution {
            question: request.question.clone(),
            rewritten: false,
            degraded: Some(FailureKind::RewriteDegraded),
        }
    }
}
