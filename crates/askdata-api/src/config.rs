//! Server configuration from the environment.

use std::str::FromStr;

use axum::http::HeaderValue;
use tracing::warn;

use askdata_core::{defaults, Error, Result};

/// Where thread history lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBackend {
    /// Per-process, lost on restart.
    Memory,
    /// The `conversation_turn` table.
    Postgres,
}

impl FromStr for HistoryBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(Error::Config(format!(
                "HISTORY_BACKEND must be 'memory' or 'postgres', got '{}'",
                other
            ))),
        }
    }
}

/// HTTP server settings.
///
/// | Variable | Default |
/// |----------|---------|
/// | `HOST` | `0.0.0.0` |
/// | `PORT` | `8000` |
/// | `WAREHOUSE_URL` | `postgres://localhost/warehouse` |
/// | `SCHEMA_INDEX_URL` | value of `WAREHOUSE_URL` |
/// | `HISTORY_BACKEND` | `memory` |
/// | `ALLOWED_ORIGINS` | `http://localhost:3000` |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub warehouse_url: String,
    pub schema_index_url: String,
    pub history_backend: HistoryBackend,
    pub allowed_origins: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: defaults::SERVER_PORT,
            warehouse_url: "postgres://localhost/warehouse".to_string(),
            schema_index_url: "postgres://localhost/warehouse".to_string(),
            history_backend: HistoryBackend::Memory,
            allowed_origins: "http://localhost:3000".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let base = Self::default();
        let warehouse_url = std::env::var("WAREHOUSE_URL").unwrap_or(base.warehouse_url);
        let schema_index_url =
            std::env::var("SCHEMA_INDEX_URL").unwrap_or_else(|_| warehouse_url.clone());
        let history_backend = match std::env::var("HISTORY_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => base.history_backend,
        };
        Ok(Self {
            host: std::env::var("HOST").unwrap_or(base.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.port),
            warehouse_url,
            schema_index_url,
            history_backend,
            allowed_origins: std::env::var("ALLOWED_ORIGINS").unwrap_or(base.allowed_origins),
        })
    }

    /// True when the schema index (migrations, persisted history) lives in
    /// the warehouse database.
    pub fn shares_warehouse(&self) -> bool {
        self.schema_index_url == self.warehouse_url
    }
}

/// Parse a comma-separated origin list. Invalid entries are skipped; an
/// empty list falls back to `http://localhost:3000`.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    let origins: Vec<HeaderValue> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Invalid CORS origin '{}': {}", s, e);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return vec![HeaderValue::from_static("http://localhost:3000")];
    }
    origins
}
