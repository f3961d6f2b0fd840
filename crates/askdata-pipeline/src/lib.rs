//! # askdata-pipeline
//!
//! Question-to-SQL cycle for askdata.
//!
//! This crate provides:
//! - Conversation rewriting of follow-up questions
//! - The bounded generate, validate, execute state machine
//! - Heuristic chart recommendation with model-written reasoning
//! - The orchestrator that runs one cycle and records thread history
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use askdata_pipeline::{CancellationFlag, PipelineBuilder, PipelineConfig, PipelineRequest};
//!
//! let pipeline = PipelineBuilder::new(client, schema_index, executor)
//!     .with_config(PipelineConfig::from_env())
//!     .with_history(history)
//!     .build();
//!
//! let request = PipelineRequest::new("Show me total funded amount by loan product", "t1");
//! let result = pipeline.run_cycle(&request, &CancellationFlag::new()).await?;
//! println!("{}", result.sql);
//! ```

pub mod attempt;
pub mod cancel;
pub mod chart;
pub mod config;
pub mod history;
pub mod orchestrator;
pub mod rewriter;

// Re-export core types
pub use askdata_core::*;

pub use attempt::{AttemptLoop, AttemptState, FailureLog, LoopReport, LoopTerminal};
pub use cancel::CancellationFlag;
pub use chart::{recommend_structure, ChartRecommender};
pub use config::PipelineConfig;
pub use history::MemoryTurnHistory;
pub use orchestrator::{Pipeline, PipelineBuilder, PipelineHealth};
pub use rewriter::{ConversationRewriter, Resolution};
