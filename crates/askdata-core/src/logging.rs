//! Structured logging schema and field name constants for askdata.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query every subsystem by the same names.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback or retry applied |
//! | INFO  | Lifecycle events, cycle completions |
//! | DEBUG | Decision points, state transitions, config choices |
//! | TRACE | Per-item data (schema fragments, rows) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated from the HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "pipeline", "search", "db", "inference"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "orchestrator", "rewriter", "executor", "ollama", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "run_cycle", "generate_sql", "search", "run"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Conversation thread id.
pub const THREAD_ID: &str = "thread_id";

/// 1-based attempt number within a cycle.
pub const ATTEMPT: &str = "attempt";

/// State-machine state name.
pub const STATE: &str = "state";

/// Question text (raw or rewritten).
pub const QUESTION: &str = "question";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Byte length of a prompt.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Failure taxonomy kind.
pub const FAILURE_KIND: &str = "failure_kind";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
