//! askdata-api - HTTP API server for askdata

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use askdata_api::config::{parse_allowed_origins, HistoryBackend, ServerConfig};
use askdata_api::{router, AppState};
use askdata_core::{EmbeddingBackend, GenerationBackend, InferenceBackend, TurnHistoryStore};
use askdata_db::{Database, ExecutorConfig, PoolConfig};
use askdata_inference::{LlmGenerationClient, OllamaBackend, PromptConfig};
use askdata_pipeline::{MemoryTurnHistory, PipelineBuilder, PipelineConfig};
use askdata_search::SchemaRetriever;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "askdata_api=debug,askdata_pipeline=debug,tower_http=debug".into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("askdata-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let server = ServerConfig::from_env()?;
    let pipeline_config = PipelineConfig::from_env();
    info!(
        max_attempts = pipeline_config.max_attempts,
        schema_top_k = pipeline_config.schema_top_k,
        history_max_turns = pipeline_config.history_max_turns,
        step_timeout_secs = pipeline_config.step_timeout.as_secs(),
        history_backend = ?server.history_backend,
        "Pipeline configured"
    );

    // Connects on first use; an unreachable warehouse is reported by /health.
    let warehouse = Database::connect_lazy(&server.warehouse_url, PoolConfig::from_env())?
        .with_executor_config(ExecutorConfig::from_env());
    if server.shares_warehouse() {
        warn!(
            history_backend = ?server.history_backend,
            "SCHEMA_INDEX_URL is not set; migrations and persisted history will use the warehouse"
        );
    }
    info!("Connecting to schema index database...");
    let index_db =
        Database::connect_with_config(&server.schema_index_url, PoolConfig::from_env()).await?;
    index_db.migrate().await?;
    info!("Schema index ready");

    let backend = Arc::new(OllamaBackend::from_env());
    if !backend.health_check().await.unwrap_or(false) {
        warn!(base_url = backend.base_url(), "Inference backend is not reachable yet");
    }
    let embedder: Arc<dyn EmbeddingBackend> = backend.clone();
    let generator: Arc<dyn GenerationBackend> = backend;

    let client = LlmGenerationClient::with_config(generator, PromptConfig::from_env()?);
    let retriever = SchemaRetriever::new(embedder, Arc::new(index_db.schema_fragments.clone()));
    let history: Arc<dyn TurnHistoryStore> = match server.history_backend {
        HistoryBackend::Memory => Arc::new(MemoryTurnHistory::new()),
        HistoryBackend::Postgres => Arc::new(index_db.history.clone()),
    };

    let pipeline = PipelineBuilder::new(
        Arc::new(client),
        Arc::new(retriever),
        Arc::new(warehouse.executor.clone()),
    )
    .with_config(pipeline_config)
    .with_history(history)
    .build();

    let state = AppState {
        pipeline: Arc::new(pipeline),
    };
    let app = router(state, parse_allowed_origins(&server.allowed_origins));

    let addr: SocketAddr = format!("{}:{}", server.host, server.port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
        })
        .await?;

    Ok(())
}
