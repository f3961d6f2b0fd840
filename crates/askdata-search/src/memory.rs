//! In-memory schema vector store.
//!
//! Brute-force cosine similarity over a fixed snapshot of fragments. Used
//! for small schemas, offline snapshots, and tests.

use std::path::Path;

use async_trait::async_trait;
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use askdata_core::{Error, Result, SchemaFragment, SchemaVectorStore};

/// One indexed fragment as stored in a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: i64,
    pub table_name: String,
    pub description: String,
    #[serde(default)]
    pub relation_hints: Vec<String>,
    pub embedding: Vec<f32>,
}

struct Entry {
    fragment: SchemaFragment,
    vector: Vec<f32>,
}

/// [`SchemaVectorStore`] held entirely in memory.
#[derive(Default)]
pub struct MemorySchemaStore {
    entries: RwLock<Vec<Entry>>,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from snapshot entries.
    pub fn from_entries(entries: Vec<SnapshotEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| Entry {
                fragment: SchemaFragment {
                    id: e.id,
                    table_name: e.table_name,
                    description: e.description,
                    relation_hints: e.relation_hints,
                    score: 0.0,
                },
                vector: e.embedding,
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load a JSON array of [`SnapshotEntry`] from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<SnapshotEntry> = serde_json::from_str(&raw)?;
        Ok(Self::from_entries(entries))
    }

    /// Add a fragment with its embedding.
    pub async fn insert(&self, fragment: SchemaFragment, vector: Vector) {
        self.entries.write().await.push(Entry {
            fragment,
            vector: vector.to_vec(),
        });
    }
}

/// Cosine similarity between two vectors of equal dimension.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(Error::InvalidInput(format!(
            "Vector dimension mismatch: {} != {}",
            a.len(),
            b.len()
        )));
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let a_norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let b_norm: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if a_norm == 0.0 || b_norm == 0.0 {
        return Ok(0.0);
    }

    Ok(dot / (a_norm * b_norm))
}

#[async_trait]
impl SchemaVectorStore for MemorySchemaStore {
    async fn nearest(&self, query: &Vector, k: usize) -> Result<Vec<SchemaFragment>> {
        let query = query.as_slice();
        let entries = self.entries.read().await;

        let mut scored = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            let mut fragment = entry.fragment.clone();
            fragment.score = cosine_similarity(query, &entry.vector)?;
            scored.push(fragment);
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.entries.read().await.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, table: &str, embedding: Vec<f32>) -> SnapshotEntry {
        SnapshotEntry {
            id,
            table_name: table.to_string(),
            description: String::new(),
            relation_hints: vec![],
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let sim = cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        assert!(cosine_similarity(&[1.0], &[1.0, 0.0]).is_err());
    }

    #[tokio::test]
    async fn test_nearest_orders_by_score_then_id() {
        let store = MemorySchemaStore::from_entries(vec![
            entry(3, "c", vec![1.0, 0.0]),
            entry(1, "a", vec![0.0, 1.0]),
            entry(2, "b", vec![1.0, 0.0]),
        ]);

        let hits = store.nearest(&Vector::from(vec![1.0, 0.0]), 3).await.unwrap();
        let ids: Vec<i64> = hits.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_nearest_truncates_to_k() {
        let store = MemorySchemaStore::from_entries(vec![
            entry(1, "a", vec![1.0, 0.0]),
            entry(2, "b", vec![0.5, 0.5]),
        ]);
        let hits = store.nearest(&Vector::from(vec![1.0, 0.0]), 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[test]
    fn test_snapshot_entry_deserializes_without_hints() {
        let json = r#"[{"id": 1, "table_name": "t", "description": "d", "embedding": [0.1, 0.2]}]"#;
        let entries: Vec<SnapshotEntry> = serde_json::from_str(json).unwrap();
        assert!(entries[0].relation_hints.is_empty());
    }
}
