//! Schema index lookup: embed the question, fetch nearest fragments,
//! normalize scores.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use askdata_core::{
    EmbeddingBackend, Error, Result, SchemaContext, SchemaFragment, SchemaIndex,
    SchemaVectorStore,
};

/// Prefix placed before the question when embedding it for retrieval.
pub const DEFAULT_QUERY_PREFIX: &str =
    "Which columns in the database are relevant to the following question: ";

/// Retrieval configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// Text prepended to the question before embedding.
    pub query_prefix: String,
    /// Fragments scoring below this are dropped.
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query_prefix: DEFAULT_QUERY_PREFIX.to_string(),
            min_score: 0.0,
        }
    }
}

impl RetrievalConfig {
    pub fn with_query_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.query_prefix = prefix.into();
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score.clamp(0.0, 1.0);
        self
    }
}

/// [`SchemaIndex`] backed by an embedding model and a vector store.
pub struct SchemaRetriever {
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn SchemaVectorStore>,
    config: RetrievalConfig,
}

impl SchemaRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, store: Arc<dyn SchemaVectorStore>) -> Self {
        Self {
            embedder,
            store,
            config: RetrievalConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RetrievalConfig) -> Self {
        self.config = config;
        self
    }

    /// The text actually embedded for a question.
    pub fn framed_query(&self, question: &str) -> String {
        format!("{}{}", self.config.query_prefix, question.trim())
    }
}

/// Clamp raw similarities into [0, 1] and order by score, then id.
pub fn normalize(mut fragments: Vec<SchemaFragment>, k: usize, min_score: f32) -> SchemaContext {
    for f in fragments.iter_mut() {
        f.score = if f.score.is_nan() {
            0.0
        } else {
            f.score.clamp(0.0, 1.0)
        };
    }
    fragments.retain(|f| f.score >= min_score);
    fragments.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    fragments.truncate(k);
    SchemaContext::new(fragments)
}

#[async_trait]
impl SchemaIndex for SchemaRetriever {
    #[instrument(
        skip(self, text),
        fields(subsystem = "search", component = "schema_retriever", op = "search")
    )]
    async fn search(&self, text: &str, k: usize) -> Result<SchemaContext> {
        if k == 0 || text.trim().is_empty() {
            return Ok(SchemaContext::default());
        }

        let start = Instant::now();
        let framed = self.framed_query(text);
        let vectors = self.embedder.embed_texts(&[framed]).await?;
        let query = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("No embedding returned for question".into()))?;

        let raw = self.store.nearest(&query, k).await?;
        let context = normalize(raw, k, self.config.min_score);

        for f in &context.fragments {
            trace!(id = f.id, table = %f.table_name, score = f.score, "Retrieved fragment");
        }
        debug!(
            result_count = context.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Schema search complete"
        );

        Ok(context)
    }

    async fn health_check(&self) -> Result<bool> {
        let count = self.store.count().await?;
        if count == 0 {
            debug!(
                subsystem = "search",
                component = "schema_retriever",
                "Schema index is reachable but empty"
            );
        }
        Ok(true)
    }
}
