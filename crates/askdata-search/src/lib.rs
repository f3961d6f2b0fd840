//! # askdata-search
//!
//! Schema index lookup for askdata.
//!
//! This crate provides:
//! - [`SchemaRetriever`], a [`SchemaIndex`] that embeds the framed question
//!   and queries any [`SchemaVectorStore`]
//! - Score normalization into [0, 1] with deterministic tie-breaking
//! - [`MemorySchemaStore`], an in-memory store for snapshots and tests
//!
//! ## Example
//!
//! ```ignore
//! use askdata_search::{SchemaRetriever, SchemaIndex};
//!
//! let retriever = SchemaRetriever::new(embedder, store);
//! let context = retriever.search("total funded amount by loan product", 5).await?;
//! ```

pub mod memory;
pub mod retriever;

// Re-export core types
pub use askdata_core::*;

pub use memory::{cosine_similarity, MemorySchemaStore, SnapshotEntry};
pub use retriever::{normalize, RetrievalConfig, SchemaRetriever, DEFAULT_QUERY_PREFIX};
