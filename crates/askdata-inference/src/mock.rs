//! Mock inference backends for deterministic testing.
//!
//! Provides substitutes for the embedding backend, the raw generation
//! backend, and the full [`GenerationClient`] so pipeline behavior can be
//! tested against scripted model output.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use askdata_inference::mock::{ScriptedGenerationClient, ScriptedReply};
//! use askdata_core::GenerationFailureKind;
//!
//! let client = ScriptedGenerationClient::new()
//!     .with_sql("DELETE FROM logs")
//!     .with_sql_reply(ScriptedReply::Fail(GenerationFailureKind::Timeout))
//!     .with_sql("SELECT 1");
//! assert_eq!(client.remaining_sql_replies(), 3);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use askdata_core::{
    ConversationTurn, EmbeddingBackend, Error, GenerationBackend, GenerationClient,
    GenerationFailureKind, Result, ResultShape, SqlGenerationRequest, Vector,
};

// =============================================================================
// EMBEDDINGS
// =============================================================================

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility. The same text
    /// will always produce the same embedding.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        if dimension == 0 {
            return vec;
        }

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        Self::normalize(&mut vec);
        vec
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }

    /// Calculate cosine similarity between two vectors.
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if mag_a > 0.0 && mag_b > 0.0 {
            dot / (mag_a * mag_b)
        } else {
            0.0
        }
    }
}

/// Embedding backend returning [`MockEmbeddingGenerator`] vectors, with
/// optional pinned vectors for exact inputs.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    pinned: Arc<HashMap<String, Vec<f32>>>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            pinned: Arc::new(HashMap::new()),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Return `vector` whenever exactly `text` is embedded.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.pinned).insert(text.into(), vector);
        self
    }

    /// Every text embedded so far, in call order.
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.inputs.lock().unwrap().extend(texts.iter().cloned());
        Ok(texts
            .iter()
            .map(|t| {
                let v = self
                    .pinned
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| MockEmbeddingGenerator::generate(t, self.dimension));
                Vector::from(v)
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

// =============================================================================
// RAW GENERATION
// =============================================================================

/// Generation backend that replays queued replies and records prompts.
#[derive(Clone, Default)]
pub struct MockGenerationBackend {
    replies: Arc<Mutex<VecDeque<Result<String>>>>,
    prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: Error) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    /// Recorded `(system, prompt)` pairs, in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Inference("no scripted reply left".to_string())))
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

// =============================================================================
// SCRIPTED GENERATION CLIENT
// =============================================================================

/// One scripted outcome of a client call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Text(String),
    Fail(GenerationFailureKind),
    /// Never completes; exercises step timeouts.
    Stall,
}

impl ScriptedReply {
    async fn resolve(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Fail(GenerationFailureKind::Timeout) => {
                Err(Error::Timeout("scripted timeout".to_string()))
            }
            Self::Fail(GenerationFailureKind::MalformedOutput) => {
                Err(Error::MalformedOutput("scripted malformed output".to_string()))
            }
            Self::Fail(GenerationFailureKind::Upstream) => {
                Err(Error::Inference("scripted upstream failure".to_string()))
            }
            Self::Stall => std::future::pending::<Result<String>>().await,
        }
    }
}

/// A recorded `generate_sql` call.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCall {
    pub question: String,
    pub prior_failures: Vec<String>,
    pub schema_tables: Vec<String>,
    pub attempt: u32,
}

/// A recorded `rewrite_question` call.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteCall {
    pub question: String,
    pub turns: Vec<ConversationTurn>,
}

#[derive(Default)]
struct Script {
    sql: VecDeque<ScriptedReply>,
    sql_by_question: HashMap<String, String>,
    rewrite: VecDeque<ScriptedReply>,
    chart: VecDeque<ScriptedReply>,
}

#[derive(Default)]
struct CallLog {
    sql: Vec<SqlCall>,
    rewrite: Vec<RewriteCall>,
    chart: Vec<ResultShape>,
}

/// [`GenerationClient`] that returns scripted replies per call.
///
/// SQL replies are consumed in order; a question-keyed reply takes
/// precedence so concurrent cycles stay deterministic. With no scripted
/// rewrite the question is echoed back, and with no scripted chart reply a
/// fixed reasoning string is returned.
#[derive(Clone, Default)]
pub struct ScriptedGenerationClient {
    script: Arc<Mutex<Script>>,
    calls: Arc<Mutex<CallLog>>,
}

impl ScriptedGenerationClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sql(self, sql: impl Into<String>) -> Self {
        self.with_sql_reply(ScriptedReply::Text(sql.into()))
    }

    pub fn with_sql_reply(self, reply: ScriptedReply) -> Self {
        self.script.lock().unwrap().sql.push_back(reply);
        self
    }

    /// Always answer `question` with `sql`.
    pub fn with_sql_for(self, question: impl Into<String>, sql: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .sql_by_question
            .insert(question.into(), sql.into());
        self
    }

    pub fn with_rewrite(self, question: impl Into<String>) -> Self {
        self.with_rewrite_reply(ScriptedReply::Text(question.into()))
    }

    pub fn with_rewrite_reply(self, reply: ScriptedReply) -> Self {
        self.script.lock().unwrap().rewrite.push_back(reply);
        self
    }

    pub fn with_chart_reasoning(self, text: impl Into<String>) -> Self {
        self.with_chart_reply(ScriptedReply::Text(text.into()))
    }

    pub fn with_chart_reply(self, reply: ScriptedReply) -> Self {
        self.script.lock().unwrap().chart.push_back(reply);
        self
    }

    pub fn remaining_sql_replies(&self) -> usize {
        self.script.lock().unwrap().sql.len()
    }

    pub fn sql_calls(&self) -> Vec<SqlCall> {
        self.calls.lock().unwrap().sql.clone()
    }

    pub fn rewrite_calls(&self) -> Vec<RewriteCall> {
        self.calls.lock().unwrap().rewrite.clone()
    }

    pub fn chart_calls(&self) -> Vec<ResultShape> {
        self.calls.lock().unwrap().chart.clone()
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerationClient {
    async fn generate_sql(&self, request: SqlGenerationRequest<'_>) -> Result<String> {
        self.calls.lock().unwrap().sql.push(SqlCall {
            question: request.question.to_string(),
            prior_failures: request.prior_failures.to_vec(),
            schema_tables: request
                .schema
                .fragments
                .iter()
                .map(|f| f.table_name.clone())
                .collect(),
            attempt: request.attempt,
        });

        let reply = {
            let mut script = self.script.lock().unwrap();
            match script.sql_by_question.get(request.question) {
                Some(sql) => Some(ScriptedReply::Text(sql.clone())),
                None => script.sql.pop_front(),
            }
        };
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(Error::Inference("no scripted SQL left".to_string())),
        }
    }

    async fn generate_chart_reasoning(&self, shape: &ResultShape) -> Result<String> {
        self.calls.lock().unwrap().chart.push(shape.clone());
        let reply = self.script.lock().unwrap().chart.pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(format!("Scripted reasoning for {}", shape.proposed)),
        }
    }

    async fn rewrite_question(
        &self,
        question: &str,
        turns: &[ConversationTurn],
    ) -> Result<String> {
        self.calls.lock().unwrap().rewrite.push(RewriteCall {
            question: question.to_string(),
            turns: turns.to_vec(),
        });
        let reply = self.script.lock().unwrap().rewrite.pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(question.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdata_core::SchemaContext;

    #[test]
    fn test_embedding_generator_deterministic() {
        let e1 = MockEmbeddingGenerator::generate("test", 256);
        let e2 = MockEmbeddingGenerator::generate("test", 256);
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_embedding_generator_normalized() {
        let embedding = MockEmbeddingGenerator::generate("test", 128);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01, "Should be normalized");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((MockEmbeddingGenerator::cosine_similarity(&a, &b) - 1.0).abs() < 0.01);
        assert!((MockEmbeddingGenerator::cosine_similarity(&a, &c)).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_embedding_backend_pins_and_records() {
        let backend = MockEmbeddingBackend::new(3).with_vector("pinned", vec![0.0, 1.0, 0.0]);
        let out = backend
            .embed_texts(&["pinned".to_string(), "other".to_string()])
            .await
            .unwrap();

        assert_eq!(out[0].as_slice(), &[0.0, 1.0, 0.0]);
        assert_eq!(out[1].as_slice().len(), 3);
        assert_eq!(backend.inputs(), vec!["pinned", "other"]);
    }

    #[tokio::test]
    async fn test_generation_backend_replays_in_order() {
        let backend = MockGenerationBackend::new()
            .with_reply("one")
            .with_error(Error::Inference("down".into()));

        assert_eq!(backend.generate("a").await.unwrap(), "one");
        assert!(backend.generate("b").await.is_err());
        assert!(backend.generate("c").await.is_err());
        assert_eq!(backend.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_scripted_client_sql_sequence_and_log() {
        let client = ScriptedGenerationClient::new()
            .with_sql("SELECT 1")
            .with_sql_reply(ScriptedReply::Fail(GenerationFailureKind::MalformedOutput));
        let schema = SchemaContext::default();
        let failures = vec!["bad".to_string()];

        let first = client
            .generate_sql(SqlGenerationRequest {
                question: "q",
                schema: &schema,
                prior_failures: &[],
                attempt: 1,
            })
            .await;
        let second = client
            .generate_sql(SqlGenerationRequest {
                question: "q",
                schema: &schema,
                prior_failures: &failures,
                attempt: 2,
            })
            .await;

        assert_eq!(first.unwrap(), "SELECT 1");
        assert!(matches!(second, Err(Error::MalformedOutput(_))));
        let calls = client.sql_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].prior_failures, vec!["bad"]);
        assert_eq!(calls[1].attempt, 2);
    }

    #[tokio::test]
    async fn test_scripted_client_question_keyed_sql() {
        let client = ScriptedGenerationClient::new().with_sql_for("a", "SELECT 'a'");
        let schema = SchemaContext::default();
        let request = SqlGenerationRequest {
            question: "a",
            schema: &schema,
            prior_failures: &[],
            attempt: 1,
        };
        assert_eq!(client.generate_sql(request).await.unwrap(), "SELECT 'a'");
        assert_eq!(client.generate_sql(request).await.unwrap(), "SELECT 'a'");
    }

    #[tokio::test]
    async fn test_scripted_rewrite_echoes_by_default() {
        let client = ScriptedGenerationClient::new();
        let out = client.rewrite_question("as is", &[]).await.unwrap();
        assert_eq!(out, "as is");
        assert_eq!(client.rewrite_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_never_completes() {
        let client = ScriptedGenerationClient::new().with_rewrite_reply(ScriptedReply::Stall);
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.rewrite_question("q", &[]),
        )
        .await;
        assert!(result.is_err());
    }
}
