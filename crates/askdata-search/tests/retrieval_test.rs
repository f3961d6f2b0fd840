//! Schema retrieval behavior over the in-memory store.
//!
//! This test suite validates:
//! - The question is framed before embedding
//! - Repeated searches against an unchanged index return the same order
//! - An empty index yields an empty context, not an error
//! - Scores are normalized into [0, 1]

use std::sync::Arc;

use askdata_inference::mock::{MockEmbeddingBackend, MockEmbeddingGenerator};
use askdata_search::{
    MemorySchemaStore, SchemaIndex, SchemaRetriever, SnapshotEntry, DEFAULT_QUERY_PREFIX,
};

const DIM: usize = 64;

fn snapshot() -> Vec<SnapshotEntry> {
    let tables = [
        (1, "fl_lms.loan_onboarding", "loanid, loanproductid, fundedamount, fundeddate"),
        (2, "fl_lms.accrual_balances", "loanid, balancedate, principalbalance"),
        (3, "cdp.customer", "customerid, state, createdate"),
        (4, "fl_lms.loan_product", "loanproductid, productname"),
    ];
    tables
        .iter()
        .map(|(id, table, columns)| SnapshotEntry {
            id: *id,
            table_name: table.to_string(),
            description: columns.to_string(),
            relation_hints: vec![],
            embedding: MockEmbeddingGenerator::generate(columns, DIM),
        })
        .collect()
}

fn retriever(embedder: Arc<MockEmbeddingBackend>) -> SchemaRetriever {
    let store = Arc::new(MemorySchemaStore::from_entries(snapshot()));
    SchemaRetriever::new(embedder, store)
}

#[tokio::test]
async fn test_question_is_framed_before_embedding() {
    let embedder = Arc::new(MockEmbeddingBackend::new(DIM));
    let index = retriever(embedder.clone());

    index.search("total funded amount", 2).await.unwrap();

    let inputs = embedder.inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0], format!("{}total funded amount", DEFAULT_QUERY_PREFIX));
}

#[tokio::test]
async fn test_search_is_idempotent() {
    let index = retriever(Arc::new(MockEmbeddingBackend::new(DIM)));

    let first = index.search("funded amount by loan product", 3).await.unwrap();
    let second = index.search("funded amount by loan product", 3).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn test_scores_are_normalized_and_descending() {
    let index = retriever(Arc::new(MockEmbeddingBackend::new(DIM)));

    let ctx = index.search("principal balance by date", 4).await.unwrap();

    for f in &ctx.fragments {
        assert!((0.0..=1.0).contains(&f.score));
    }
    for pair in ctx.fragments.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_pinned_vector_selects_matching_table() {
    let target = MockEmbeddingGenerator::generate("customerid, state, createdate", DIM);
    let question = "customers by state";
    let embedder = Arc::new(
        MockEmbeddingBackend::new(DIM)
            .with_vector(format!("{}{}", DEFAULT_QUERY_PREFIX, question), target),
    );
    let index = retriever(embedder);

    let ctx = index.search(question, 1).await.unwrap();
    assert_eq!(ctx.fragments[0].table_name, "cdp.customer");
    assert!((ctx.fragments[0].score - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn test_empty_index_is_not_an_error() {
    let index = SchemaRetriever::new(
        Arc::new(MockEmbeddingBackend::new(DIM)),
        Arc::new(MemorySchemaStore::new()),
    );

    let ctx = index.search("anything", 5).await.unwrap();
    assert!(ctx.is_empty());
    assert!(index.health_check().await.unwrap());
}

#[tokio::test]
async fn test_zero_k_skips_embedding() {
    let embedder = Arc::new(MockEmbeddingBackend::new(DIM));
    let index = retriever(embedder.clone());

    let ctx = index.search("anything", 0).await.unwrap();
    assert!(ctx.is_empty());
    assert!(embedder.inputs().is_empty());
}
