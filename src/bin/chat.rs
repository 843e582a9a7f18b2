use hybrid_memory::{
    config::AppConfig,
    models::SessionId,
    sessions::MemoryFactory,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables before the filter reads RUST_LOG
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let factory = MemoryFactory::from_config(&config)?;
    let agent = factory.chat_agent();
    let mut memory = factory.build(SessionId::new());

    info!(session = %memory.session_id(), "Chat session started");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all("\n👤 You: ".as_bytes()).await?;
        stdout.flush().await?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let input = input.trim();
        if input.is_empty() {
            break;
        }

        match agent.respond(&mut memory, input).await {
            Ok(reply) => println!("\n🤖 Assistant: {}", reply.answer),
            Err(e) => eprintln!("\n⚠️  {}", e),
        }
    }

    Ok(())
}
