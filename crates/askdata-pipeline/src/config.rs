//! Pipeline configuration.

use std::time::Duration;

use askdata_core::{defaults, ValidatorConfig};

/// Configuration for one pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Total attempts per cycle, including the first. Always at least 1.
    pub max_attempts: u32,
    /// Fragments retrieved from the schema index.
    pub schema_top_k: usize,
    /// Turns kept per thread.
    pub history_max_turns: usize,
    /// Deadline for each external call.
    pub step_timeout: Duration,
    /// Warehouse error text kept in retry feedback.
    pub max_error_chars: usize,
    /// Budget for all accumulated failure reasons; oldest dropped first.
    pub failure_context_chars: usize,
    /// Rows described to the model for chart reasoning.
    pub chart_sample_rows: usize,
    pub validator: ValidatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            schema_top_k: defaults::SCHEMA_TOP_K,
            history_max_turns: defaults::HISTORY_MAX_TURNS,
            step_timeout: Duration::from_secs(defaults::STEP_TIMEOUT_SECS),
            max_error_chars: defaults::MAX_ERROR_CHARS,
            failure_context_chars: defaults::FAILURE_CONTEXT_CHARS,
            chart_sample_rows: defaults::CHART_SAMPLE_ROWS,
            validator: ValidatorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `ASKDATA_MAX_ATTEMPTS` | `3` | Attempts per cycle (min 1) |
    /// | `ASKDATA_SCHEMA_TOP_K` | `5` | Schema fragments per cycle |
    /// | `ASKDATA_HISTORY_MAX_TURNS` | `10` | Turns kept per thread |
    /// | `ASKDATA_STEP_TIMEOUT_SECS` | `60` | Deadline per external call |
    /// | `ASKDATA_MAX_ERROR_CHARS` | `500` | Warehouse error text in feedback |
    /// | `ASKDATA_FAILURE_CONTEXT_CHARS` | `2000` | Total feedback budget |
    /// | `ASKDATA_CHART_SAMPLE_ROWS` | `50` | Rows sampled for chart reasoning |
    ///
    /// Validator settings come from [`ValidatorConfig::from_env`].
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            max_attempts: env_parse("ASKDATA_MAX_ATTEMPTS", d.max_attempts).max(1),
            schema_top_k: env_parse("ASKDATA_SCHEMA_TOP_K", d.schema_top_k),
            history_max_turns: env_parse("ASKDATA_HISTORY_MAX_TURNS", d.history_max_turns),
            step_timeout: Duration::from_secs(env_parse(
                "ASKDATA_STEP_TIMEOUT_SECS",
                defaults::STEP_TIMEOUT_SECS,
            )),
            max_error_chars: env_parse("ASKDATA_MAX_ERROR_CHARS", d.max_error_chars),
            failure_context_chars: env_parse(
                "ASKDATA_FAILURE_CONTEXT_CHARS",
                d.failure_context_chars,
            ),
            chart_sample_rows: env_parse("ASKDATA_CHART_SAMPLE_ROWS", d.chart_sample_rows),
            validator: ValidatorConfig::from_env(),
        }
    }

    /// Set the attempt cap. Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_schema_top_k(mut self, k: usize) -> Self {
        self.schema_top_k = k;
        self
    }

    pub fn with_history_max_turns(mut self, n: usize) -> Self {
        self.history_max_turns = n;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_max_error_chars(mut self, n: usize) -> Self {
        self.max_error_chars = n;
        self
    }

    pub fn with_failure_context_chars(mut self, n: usize) -> Self {
        self.failure_context_chars = n;
        self
    }

    pub fn with_chart_sample_rows(mut self, n: usize) -> Self {
        self.chart_sample_rows = n;
        self
    }

    pub fn with_validator(mut self, validator: ValidatorConfig) -> Self {
        self.validator = validator;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
