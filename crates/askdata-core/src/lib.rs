//! # askdata-core
//!
//! Core types, traits, and abstractions for the askdata query pipeline.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other askdata crates depend on:
//! - The pipeline data model (requests, schema context, attempts, results)
//! - Collaborator traits (generation, schema index, query executor, history)
//! - The static SQL safety validator
//! - Shared defaults and structured logging field names

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod safety;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use safety::{SafetyValidator, ValidationVerdict, ValidatorConfig};
pub use traits::*;
