//! Twinspace Server Binary

use std::sync::Arc;

use twinspace_server::{serve, AppState};

use twinspace_core::TwinspaceConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config_path =
        std::env::var("TWINSPACE_CONFIG").unwrap_or_else(|_| "twinspace.toml".to_string());
    let config = TwinspaceConfig::load(&config_path)?;

    let addr = std::env::var("TWINSPACE_ADDR").unwrap_or_else(|_| config.bind_addr.clone());
    let state = Arc::new(AppState::new(&config)?);

    serve(&addr, state).await
}
