//! Persisted per-thread conversation history.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, instrument};

use askdata_core::{ConversationTurn, Error, Result, TurnHistoryStore};

/// PostgreSQL implementation of [`TurnHistoryStore`] over `conversation_turn`.
///
/// Appends for one thread are serialized with a transaction-scoped advisory
/// lock keyed by the thread id, so concurrent appends never interleave the
/// insert and eviction steps.
#[derive(Clone)]
pub struct PgTurnHistory {
    pool: Pool<Postgres>,
}

impl PgTurnHistory {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Number of stored turns for a thread.
    pub async fn count(&self, thread_id: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM conversation_turn WHERE thread_id = $1")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("n"))
    }
}

#[async_trait]
impl TurnHistoryStore for PgTurnHistory {
    async fn recent(&self, thread_id: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            "SELECT question, answer_summary, created_at
             FROM conversation_turn
             WHERE thread_id = $1
             ORDER BY id DESC
             LIMIT $2",
        )
        .bind(thread_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut turns: Vec<ConversationTurn> = rows
            .into_iter()
            .map(|row| ConversationTurn {
                question: row.get("question"),
                answer_summary: row.get("answer_summary"),
                created_at: row.get("created_at"),
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }

    #[instrument(
        skip(self, thread_id, turn),
        fields(subsystem = "db", component = "history", op = "append", thread_id = %thread_id)
    )]
    async fn append(&self, thread_id: &str, turn: ConversationTurn, max_turns: usize) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        sqlx::query(
            "INSERT INTO conversation_turn (thread_id, question, answer_summary, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(thread_id)
        .bind(&turn.question)
        .bind(&turn.answer_summary)
        .bind(turn.created_at)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let evicted = sqlx::query(
            "DELETE FROM conversation_turn
             WHERE thread_id = $1
               AND id NOT IN (
                   SELECT id FROM conversation_turn
                   WHERE thread_id = $1
                   ORDER BY id DESC
                   LIMIT $2
               )",
        )
        .bind(thread_id)
        .bind(max_turns as i64)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        tx.commit().await.map_err(Error::Database)?;

        if evicted > 0 {
            debug!(evicted, max_turns, "Evicted oldest turns");
        }
        Ok(())
    }
}
