use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod config;
mod error;
mod extract;
mod pipeline;
mod serialize;
mod service;
mod status;
mod store;
mod ws;

use crate::config::StaticConfig;
use crate::extract::{OllamaExtractor, PdfiumTextExtractor, RemoteOcrClient};
use crate::pipeline::Dispatcher;
use crate::serialize::CsvSerializer;
use crate::service::ExtractionService;
use crate::store::SqliteStore;

// Re-export config crate types to avoid namespace collision
use ::config::{Config as ConfigBuilder, Environment, File};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("Starting ledgerlift service v{}", env!("CARGO_PKG_VERSION"));

    let static_config: StaticConfig = ConfigBuilder::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("LEDGERLIFT")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    info!(
        host = %static_config.server.host,
        port = static_config.server.port,
        "Configuration loaded"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&static_config.storage.data_dir)?;

    // Initialize the durable store
    let db_path = static_config.storage.data_dir.join("ledgerlift.db");
    let store = Arc::new(SqliteStore::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    // Stage adapters
    let text = Arc::new(PdfiumTextExtractor);
    let optical = Arc::new(RemoteOcrClient::new(static_config.ocr.clone())?);
    let semantic = Arc::new(OllamaExtractor::new(static_config.semantic.clone())?);

    if semantic.health_check().await {
        info!(url = %static_config.semantic.base_url, "Model server is available");
    } else {
        warn!(url = %static_config.semantic.base_url, "Model server is not available");
    }

    let worker_count = static_config.pipeline.worker_count;
    let service = Arc::new(ExtractionService::new(
        static_config,
        store,
        text,
        optical,
        semantic,
        Arc::new(CsvSerializer),
    ));

    // Start the pipeline workers
    let dispatcher = Dispatcher::start(service.clone(), worker_count);

    // Build the router
    let app = api::router(service.clone(), dispatcher);

    // Start the server
    let addr = format!(
        "{}:{}",
        service.config.server.host, service.config.server.port
    );
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ledgerlift_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
