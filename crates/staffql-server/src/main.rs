//! staffql server binary
//!
//! Loads the dataset once, then serves the query API until interrupted.
//! Failing to open DuckDB or load the dataset stops startup.

use std::sync::Arc;

use staffql_duck::DuckEngine;
use staffql_server::{logging, router, AppState, Config, OllamaTranslator};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path = std::env::var("STAFFQL_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)?;
    config.apply_logging_env();
    logging::init();

    let engine = DuckEngine::load(&config.dataset.path, &config.engine_options())?;

    let translator = OllamaTranslator::from_config(&config.llm);
    info!(api_url = %translator.api_url(), model = %config.llm.model, "Translator configured");

    let state = AppState::new(Arc::new(engine), Arc::new(translator))?;
    let app = router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("staffql server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
