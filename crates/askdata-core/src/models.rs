//! Data model for one pipeline cycle and its conversational context.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::safety::ValidationVerdict;

pub use pgvector::Vector;

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// CONVERSATION
// =============================================================================

/// A completed cycle as remembered by its thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Self-contained question the cycle answered.
    pub question: String,
    /// Terse outcome summary (SQL and row count, or the failure reason).
    pub answer_summary: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(question: impl Into<String>, answer_summary: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer_summary: answer_summary.into(),
            created_at: Utc::now(),
        }
    }
}

/// Immutable input to one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub question: String,
    pub thread_id: String,
    /// Replaces the most recent turn's answer summary when rewriting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_answer: Option<String>,
}

impl PipelineRequest {
    pub fn new(question: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            thread_id: thread_id.into(),
            previous_answer: None,
        }
    }

    pub fn with_previous_answer(mut self, answer: impl Into<String>) -> Self {
        self.previous_answer = Some(answer.into());
        self
    }
}

// =============================================================================
// SCHEMA CONTEXT
// =============================================================================

/// A retrieved description of a table and its columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaFragment {
    /// Stable id within the index snapshot (used to break score ties).
    pub id: i64,
    pub table_name: String,
    /// Column descriptions as indexed.
    pub description: String,
    #[serde(default)]
    pub relation_hints: Vec<String>,
    /// Normalized similarity in [0, 1].
    pub score: f32,
}

/// Schema fragments retrieved for one cycle, best match first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaContext {
    pub fragments: Vec<SchemaFragment>,
}

impl SchemaContext {
    pub fn new(fragments: Vec<SchemaFragment>) -> Self {
        Self { fragments }
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Render the fragments as prompt text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            out.push_str(&format!("Table: {}\n", fragment.table_name));
            out.push_str(fragment.description.trim());
            out.push('\n');
            if !fragment.relation_hints.is_empty() {
                out.push_str(&format!(
                    "Relations: {}\n",
                    fragment.relation_hints.join("; ")
                ));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

// =============================================================================
// QUERY RESULTS
// =============================================================================

/// Column name and warehouse type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Tabular result of a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// How a result column behaves for charting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnClass {
    Categorical,
    Numeric,
    Temporal,
}

impl fmt::Display for ColumnClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Categorical => write!(f, "categorical"),
            Self::Numeric => write!(f, "numeric"),
            Self::Temporal => write!(f, "temporal"),
        }
    }
}

/// Classified column, as described to the model for chart reasoning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub class: ColumnClass,
    /// Distinct non-null values within the sample.
    pub distinct: usize,
}

/// Shape of a successful result, the input to chart reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultShape {
    pub question: String,
    pub columns: Vec<ColumnProfile>,
    pub row_count: usize,
    pub sample: Vec<Row>,
    /// Structural chart choice to explain, e.g. "bar chart of total by product".
    pub proposed: String,
}

// =============================================================================
// FAILURES
// =============================================================================

/// Failure taxonomy for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rewriting failed; the raw question is used.
    RewriteDegraded,
    /// No schema fragments matched; generation proceeds without them.
    RetrievalEmpty,
    GenerationFailure,
    ValidationRejected,
    ExecutionFailure,
    /// Chart reasoning failed; the structural recommendation is kept.
    ChartDegraded,
}

impl FailureKind {
    /// Retryable kinds feed the next attempt and surface only after the cap.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailure | Self::ValidationRejected | Self::ExecutionFailure
        )
    }

    /// Kinds that end the cycle once the attempt cap is exhausted. The rest
    /// degrade output and never reach the error descriptor.
    pub fn is_fatal_after_cap(&self) -> bool {
        self.is_retryable()
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RewriteDegraded => "rewrite_degraded",
            Self::RetrievalEmpty => "retrieval_empty",
            Self::GenerationFailure => "generation_failure",
            Self::ValidationRejected => "validation_rejected",
            Self::ExecutionFailure => "execution_failure",
            Self::ChartDegraded => "chart_degraded",
        };
        write!(f, "{}", name)
    }
}

/// Why the generation client produced no usable SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationFailureKind {
    Timeout,
    MalformedOutput,
    Upstream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFailure {
    pub kind: GenerationFailureKind,
    pub message: String,
}

impl From<&Error> for GenerationFailure {
    fn from(err: &Error) -> Self {
        let kind = match err {
            Error::Timeout(_) => GenerationFailureKind::Timeout,
            Error::MalformedOutput(_) => GenerationFailureKind::MalformedOutput,
            _ => GenerationFailureKind::Upstream,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

/// Warehouse-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionFailureKind {
    Syntax,
    MissingRelation,
    TypeMismatch,
    Permission,
    Timeout,
    Connection,
    Other,
}

impl fmt::Display for ExecutionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Syntax => "syntax error",
            Self::MissingRelation => "missing relation",
            Self::TypeMismatch => "type mismatch",
            Self::Permission => "permission denied",
            Self::Timeout => "timeout",
            Self::Connection => "connection failure",
            Self::Other => "execution error",
        };
        write!(f, "{}", name)
    }
}

/// Typed failure reported by the query executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: ExecutionFailureKind,
    /// Upstream error text, untruncated.
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: ExecutionFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Why a single attempt ended without success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum AttemptFailure {
    Generation(GenerationFailure),
    Validation { reason: String },
    Execution(ExecutionFailure),
}

impl AttemptFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Generation(_) => FailureKind::GenerationFailure,
            Self::Validation { .. } => FailureKind::ValidationRejected,
            Self::Execution(_) => FailureKind::ExecutionFailure,
        }
    }

    /// Reason text fed into the next attempt's generation context.
    ///
    /// Warehouse error text is cut to `max_error_chars` characters.
    pub fn feedback(&self, max_error_chars: usize) -> String {
        match self {
            Self::Generation(g) => format!("generation failed: {}", g.message),
            Self::Validation { reason } => reason.clone(),
            Self::Execution(e) => format!(
                "query failed ({}): {}",
                e.kind,
                truncate_chars(&e.message, max_error_chars)
            ),
        }
    }
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

// =============================================================================
// ATTEMPTS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { row_count: usize },
    Failed { failure: AttemptFailure },
}

/// One generate/validate/execute round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAttempt {
    /// 1-based, never above the configured cap.
    pub number: u32,
    /// Candidate SQL as generated; `None` when generation failed.
    pub sql: Option<String>,
    /// `None` when validation never ran.
    pub verdict: Option<ValidationVerdict>,
    pub outcome: AttemptOutcome,
}

impl QueryAttempt {
    pub fn failure(&self) -> Option<&AttemptFailure> {
        match &self.outcome {
            AttemptOutcome::Failed { failure } => Some(failure),
            AttemptOutcome::Succeeded { .. } => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Succeeded { .. })
    }
}

// =============================================================================
// CHART RECOMMENDATION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Area,
    Pie,
    Doughnut,
    Scatter,
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Area => "area",
            Self::Pie => "pie",
            Self::Doughnut => "doughnut",
            Self::Scatter => "scatter",
        };
        write!(f, "{}", name)
    }
}

/// A concrete chart: kind, title, and axis bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub title: String,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub reason: String,
}

/// An alternative chart with a heuristic fit score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSuggestion {
    #[serde(flatten)]
    pub chart: ChartSpec,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRecommendation {
    pub chartable: bool,
    pub reasoning: String,
    #[serde(rename = "auto_chart")]
    pub primary: Option<ChartSpec>,
    #[serde(rename = "suggested_charts")]
    pub secondary: Vec<ChartSuggestion>,
}

impl ChartRecommendation {
    pub fn not_chartable(reasoning: impl Into<String>) -> Self {
        Self {
            chartable: false,
            reasoning: reasoning.into(),
            primary: None,
            secondary: Vec::new(),
        }
    }
}

// =============================================================================
// CYCLE RESULT
// =============================================================================

/// Terminal failure summary for a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: FailureKind,
    pub message: String,
    pub attempts: u32,
    /// SQL from the last attempt that produced any.
    pub last_sql: Option<String>,
}

/// Terminal output of one cycle.
///
/// Exactly one of the success fields or `error` is authoritative: on
/// failure `sql` is empty, `rows` is empty and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Self-contained question the cycle answered.
    pub question: String,
    pub sql: String,
    pub columns: Vec<ColumnMeta>,
    pub rows: Vec<Row>,
    pub chart: ChartRecommendation,
    pub error: Option<ErrorDescriptor>,
    pub attempts: Vec<QueryAttempt>,
}

impl PipelineResult {
    pub fn succeeded(
        question: String,
        sql: String,
        result: ResultSet,
        chart: ChartRecommendation,
        attempts: Vec<QueryAttempt>,
    ) -> Self {
        Self {
            question,
            sql,
            columns: result.columns,
            rows: result.rows,
            chart,
            error: None,
            attempts,
        }
    }

    pub fn failed(question: String, error: ErrorDescriptor, attempts: Vec<QueryAttempt>) -> Self {
        Self {
            question,
            sql: String::new(),
            columns: Vec::new(),
            rows: Vec::new(),
            chart: ChartRecommendation::not_chartable("Query did not complete"),
            error: Some(error),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn record_count(&self) -> usize {
        self.rows.len()
    }

    /// Terse summary stored in the thread history.
    pub fn summary(&self) -> String {
        match &self.error {
            None => {
                let columns: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
                format!(
                    "SQL: {} → {} row(s) [columns: {}]",
                    self.sql,
                    self.rows.len(),
                    columns.join(", ")
                )
            }
            Some(err) => format!(
                "Failed after {} attempt(s): {}",
                err.attempts,
                truncate_chars(&err.message, 200)
            ),
        }
    }
}
