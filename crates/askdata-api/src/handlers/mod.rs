//! HTTP handlers for askdata-api.

pub mod chat;
pub mod health;

pub use chat::{chat, ChatRequest, ChatResponse};
pub use health::health;
