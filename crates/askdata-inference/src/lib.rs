//! # askdata-inference
//!
//! Model access for the askdata pipeline.
//!
//! This crate provides:
//! - Ollama implementation of the embedding and generation backends
//! - Prompt assembly for SQL generation, question rewriting and chart reasoning
//! - SQL extraction from raw model output
//! - [`LlmGenerationClient`], the production [`GenerationClient`]
//! - Mock backends and a scripted client (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use askdata_inference::{LlmGenerationClient, OllamaBackend, PromptConfig};
//!
//! let backend = Arc::new(OllamaBackend::from_env());
//! let client = LlmGenerationClient::with_config(backend, PromptConfig::default());
//! assert_eq!(client.dialect(), "Redshift");
//! ```

pub mod client;
pub mod extract;
pub mod ollama;
pub mod prompts;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use askdata_core::*;

pub use client::{LlmGenerationClient, PromptConfig};
pub use extract::extract_sql;
pub use ollama::OllamaBackend;
pub use prompts::PromptContext;
