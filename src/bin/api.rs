use hybrid_memory::{
    api::start_server,
    config::AppConfig,
    sessions::{MemoryFactory, SessionRegistry},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables before the filter reads RUST_LOG
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Hybrid Memory - API Server");
    info!("📍 Port: {}", config.port);
    info!(
        "🧠 Buffer: keep {} turns, condense above {}, retrieve top {}",
        config.memory.max_buffer_turns, config.memory.summary_trigger, config.memory.vector_k
    );

    let factory = MemoryFactory::from_config(&config)?;
    let registry = Arc::new(SessionRegistry::new(factory));

    info!("✅ Session registry initialized");
    info!("📡 Starting API server...");

    start_server(registry, config.port).await?;

    Ok(())
}
