//! Centralized default constants for askdata.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic
//! numbers. Every value can be overridden through the owning component's
//! configuration (`from_env()` or builder setters).

// =============================================================================
// PIPELINE
// =============================================================================

/// Total generate/validate/execute attempts per cycle.
pub const MAX_ATTEMPTS: u32 = 3;

/// Number of schema fragments retrieved per cycle.
pub const SCHEMA_TOP_K: usize = 5;

/// Turns kept per conversation thread (oldest evicted first).
pub const HISTORY_MAX_TURNS: usize = 10;

/// Timeout applied to every external step (generation, search, execution).
pub const STEP_TIMEOUT_SECS: u64 = 60;

/// Maximum characters of warehouse error text fed back to the model.
pub const MAX_ERROR_CHARS: usize = 500;

/// Character budget for all accumulated failure reasons in one prompt.
pub const FAILURE_CONTEXT_CHARS: usize = 2000;

/// Rows inspected when classifying columns for chart recommendation.
pub const CHART_SAMPLE_ROWS: usize = 50;

/// SQL dialect named in generation prompts.
pub const SQL_DIALECT: &str = "Redshift";

/// Thread id used when the caller does not supply one.
pub const DEFAULT_THREAD_ID: &str = "default";

// =============================================================================
// SAFETY VALIDATION
// =============================================================================

/// Write/DDL verbs rejected as whole-word tokens.
pub const DENYLIST: &[&str] = &[
    "delete", "drop", "update", "insert", "truncate", "alter", "grant", "revoke", "create", "merge",
];

/// Row limit appended to statements without a trailing LIMIT clause.
pub const ROW_LIMIT: u32 = 1000;

// =============================================================================
// WAREHOUSE
// =============================================================================

/// Maximum pooled warehouse connections.
pub const WAREHOUSE_MAX_CONNECTIONS: u32 = 10;

/// Seconds to wait for a pooled connection before failing the attempt.
pub const WAREHOUSE_ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Server-side statement timeout in seconds.
pub const WAREHOUSE_STATEMENT_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "qwen2.5-coder:14b";

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8000;

/// Default CORS max-age in seconds (1 hour).
pub const CORS_MAX_AGE_SECS: u64 = 3600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_cap_default() {
        assert_eq!(MAX_ATTEMPTS, 3);
    }

    #[test]
    fn test_denylist_is_lowercase() {
        for verb in DENYLIST {
            assert_eq!(*verb, verb.to_lowercase());
        }
    }

    #[test]
    fn test_denylist_covers_write_verbs() {
        for verb in ["delete", "drop", "update", "insert", "truncate", "alter", "grant"] {
            assert!(DENYLIST.contains(&verb), "missing {}", verb);
        }
    }
}
