//! pgvector-backed storage of schema fragment embeddings.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::{instrument, trace};

use askdata_core::{Error, Result, SchemaFragment, SchemaVectorStore};

/// PostgreSQL implementation of [`SchemaVectorStore`] over `schema_fragment`.
#[derive(Clone)]
pub struct PgSchemaFragmentStore {
    pool: Pool<Postgres>,
}

impl PgSchemaFragmentStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Index a fragment. Returns its id.
    pub async fn insert(
        &self,
        table_name: &str,
        description: &str,
        relation_hints: &[String],
        embedding: Vector,
    ) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO schema_fragment (table_name, description, relation_hints, embedding)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(table_name)
        .bind(description)
        .bind(relation_hints)
        .bind(embedding)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("id"))
    }

    /// Remove every indexed fragment for a table.
    pub async fn delete_for_table(&self, table_name: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM schema_fragment WHERE table_name = $1")
            .bind(table_name)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SchemaVectorStore for PgSchemaFragmentStore {
    #[instrument(
        skip(self, query),
        fields(subsystem = "db", component = "schema_store", op = "nearest")
    )]
    async fn nearest(&self, query: &Vector, k: usize) -> Result<Vec<SchemaFragment>> {
        // Ties on distance fall back to id so results are stable per snapshot.
        let rows = sqlx::query(
            "SELECT id, table_name, description, relation_hints,
                    1.0 - (embedding <=> $1::vector) AS score
             FROM schema_fragment
             ORDER BY embedding <=> $1::vector, id
             LIMIT $2",
        )
        .bind(query)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let fragments: Vec<SchemaFragment> = rows
            .into_iter()
            .map(|row| SchemaFragment {
                id: row.get("id"),
                table_name: row.get("table_name"),
                description: row.get("description"),
                relation_hints: row
                    .get::<Option<Vec<String>>, _>("relation_hints")
                    .unwrap_or_default(),
                score: row.get::<f64, _>("score") as f32,
            })
            .collect();

        for f in &fragments {
            trace!(id = f.id, table = %f.table_name, score = f.score, "Schema fragment");
        }

        Ok(fragments)
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM schema_fragment")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("n"))
    }
}
