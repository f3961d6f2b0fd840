//! Read-only query execution against the warehouse.
//!
//! Every statement runs inside a `READ ONLY` transaction with a local
//! statement timeout and is rolled back afterwards. Warehouse errors are
//! classified into [`ExecutionFailureKind`] so the retry loop can describe
//! them to the model.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::{Executor, PgPool};
use tracing::{debug, instrument, warn};

use askdata_core::{
    defaults, Error, ExecutionFailure, ExecutionFailureKind, QueryExecutor, Result, ResultSet,
};

use crate::pool::{env_parse, log_pool_metrics};
use crate::rows::{column_meta, row_to_json};

/// Queries slower than this are logged with `slow = true`.
const SLOW_QUERY_MS: u128 = 5_000;

/// Executor configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Server-side `statement_timeout` applied to every query.
    pub statement_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            statement_timeout: Duration::from_secs(defaults::WAREHOUSE_STATEMENT_TIMEOUT_SECS),
        }
    }
}

impl ExecutorConfig {
    /// Load from `WAREHOUSE_STATEMENT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_parse::<u64>("WAREHOUSE_STATEMENT_TIMEOUT_SECS") {
            config.statement_timeout = Duration::from_secs(secs);
        }
        config
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

/// PostgreSQL/Redshift implementation of [`QueryExecutor`].
#[derive(Clone)]
pub struct PgQueryExecutor {
    pool: PgPool,
    config: ExecutorConfig,
}

impl PgQueryExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, ExecutorConfig::default())
    }

    pub fn with_config(pool: PgPool, config: ExecutorConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run_read_only(&self, sql: &str) -> std::result::Result<ResultSet, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;

        // SET does not accept bind parameters; the value is an integer we own.
        let set_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.config.statement_timeout.as_millis()
        );
        sqlx::query(&set_timeout).execute(&mut *tx).await?;

        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;

        let columns = match rows.first() {
            Some(first) => column_meta(sqlx::Row::columns(first)),
            None => {
                let described = (&mut *tx).describe(sql).await?;
                column_meta(described.columns())
            }
        };
        let data = rows.iter().map(row_to_json).collect();

        if let Err(e) = tx.rollback().await {
            warn!(
                subsystem = "db",
                component = "executor",
                error = %e,
                "Rollback of read-only transaction failed"
            );
        }

        Ok(ResultSet::new(columns, data))
    }
}

#[async_trait]
impl QueryExecutor for PgQueryExecutor {
    #[instrument(
        skip(self, sql),
        fields(subsystem = "db", component = "executor", op = "run", sql_len = sql.len())
    )]
    async fn run(&self, sql: &str) -> std::result::Result<ResultSet, ExecutionFailure> {
        let start = Instant::now();

        match self.run_read_only(sql).await {
            Ok(result) => {
                let elapsed = start.elapsed().as_millis();
                debug!(
                    result_count = result.row_count(),
                    duration_ms = elapsed as u64,
                    "Query executed"
                );
                if elapsed > SLOW_QUERY_MS {
                    warn!(duration_ms = elapsed as u64, slow = true, "Slow warehouse query");
                }
                Ok(result)
            }
            Err(e) => {
                let failure = classify_error(&e);
                if failure.kind == ExecutionFailureKind::Connection {
                    log_pool_metrics(&self.pool);
                }
                debug!(
                    failure_kind = %failure.kind,
                    duration_ms = start.elapsed().as_millis() as u64,
                    error = %failure.message,
                    "Query failed"
                );
                Err(failure)
            }
        }
    }

    async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(Error::Database)
    }
}

/// Map a SQLSTATE code to a failure kind.
pub fn classify_sqlstate(code: &str) -> Option<ExecutionFailureKind> {
    let kind = match code {
        "42601" => ExecutionFailureKind::Syntax,
        "42P01" | "42703" | "3F000" | "42704" => ExecutionFailureKind::MissingRelation,
        "42804" | "42883" | "22P02" | "22007" | "22008" | "42846" => {
            ExecutionFailureKind::TypeMismatch
        }
        "42501" => ExecutionFailureKind::Permission,
        "57014" => ExecutionFailureKind::Timeout,
        c if c.starts_with("08") => ExecutionFailureKind::Connection,
        c if c.starts_with("42") => ExecutionFailureKind::Syntax,
        _ => return None,
    };
    Some(kind)
}

/// Fall back to message text when no SQLSTATE is available.
pub fn classify_message(message: &str) -> ExecutionFailureKind {
    let msg = message.to_lowercase();

    if msg.contains("syntax error") {
        return ExecutionFailureKind::Syntax;
    }
    if msg.contains("does not exist") || msg.contains("not found") {
        return ExecutionFailureKind::MissingRelation;
    }
    if msg.contains("permission denied") {
        return ExecutionFailureKind::Permission;
    }
    if msg.contains("statement timeout") || msg.contains("canceling statement") {
        return ExecutionFailureKind::Timeout;
    }
    if msg.contains("invalid input syntax") || msg.contains("operator does not exist") {
        return ExecutionFailureKind::TypeMismatch;
    }
    ExecutionFailureKind::Other
}

/// Classify a sqlx error into an [`ExecutionFailure`].
pub fn classify_error(err: &sqlx::Error) -> ExecutionFailure {
    match err {
        sqlx::Error::Database(db) => {
            let message = db.message().to_string();
            let kind = db
                .code()
                .and_then(|c| classify_sqlstate(&c))
                .unwrap_or_else(|| classify_message(&message));
            ExecutionFailure::new(kind, message)
        }
        sqlx::Error::PoolTimedOut => ExecutionFailure::new(
            ExecutionFailureKind::Connection,
            "timed out waiting for a warehouse connection",
        ),
        sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed => {
            ExecutionFailure::new(ExecutionFailureKind::Connection, err.to_string())
        }
        other => {
            let message = other.to_string();
            ExecutionFailure::new(classify_message(&message), message)
        }
    }
}
