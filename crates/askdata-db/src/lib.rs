//! # askdata-db
//!
//! PostgreSQL/Redshift layer for askdata.
//!
//! This crate provides:
//! - Bounded connection pool management
//! - Read-only query execution with typed failure classification
//! - pgvector storage for schema fragment embeddings
//! - Persisted per-thread conversation history
//!
//! ## Example
//!
//! ```rust,ignore
//! use askdata_db::{Database, QueryExecutor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/warehouse").await?;
//!     let result = db.executor.run("SELECT 1 AS one").await?;
//!     println!("{} row(s)", result.row_count());
//!     Ok(())
//! }
//! ```
pub mod executor;
pub mod history;
pub mod pool;
pub mod rows;
pub mod schema_store;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use askdata_core::*;

pub use executor::{classify_error, ExecutorConfig, PgQueryExecutor};
pub use history::PgTurnHistory;
pub use pool::{
    create_lazy_pool, create_pool, create_pool_with_config, log_pool_metrics, PoolConfig,
};
pub use schema_store::PgSchemaFragmentStore;

/// Combined database context over one pool.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Read-only query executor.
    pub executor: PgQueryExecutor,
    /// Schema fragment embeddings.
    pub schema_fragments: PgSchemaFragmentStore,
    /// Conversation turn history.
    pub history: PgTurnHistory,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            executor: PgQueryExecutor::new(pool.clone()),
            schema_fragments: PgSchemaFragmentStore::new(pool.clone()),
            history: PgTurnHistory::new(pool.clone()),
            pool,
        }
    }

    /// Replace the executor configuration.
    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = PgQueryExecutor::with_config(self.pool.clone(), config);
        self
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Create without connecting; connections open on first use.
    pub fn connect_lazy(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_lazy_pool(url, config)?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
