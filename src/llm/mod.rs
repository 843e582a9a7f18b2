//! Collaborator clients
//!
//! Narrow interfaces over the completion service and the embedding function.
//! Retry/backoff belongs to implementations of these traits, never to the
//! memory manager.

use crate::config::LlmProvider;
use crate::error::MemoryError;
use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

/// Sampling options forwarded to the completion service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

/// Text-completion service
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Embedding function. Deterministic for identical input within one model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Run a collaborator call with a deadline; an elapsed deadline is a transport failure
pub async fn with_timeout<T, F>(limit: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(MemoryError::Transport(format!(
            "{} timed out after {:?}",
            operation, limit
        ))),
    }
}

/// Build the completion client and embedder for a provider.
///
/// Both handles point at the same underlying client.
pub fn build_clients(
    provider: &LlmProvider,
) -> Result<(Arc<dyn CompletionClient>, Arc<dyn Embedder>)> {
    match provider {
        LlmProvider::Ollama {
            base_url,
            model,
            embed_model,
        } => {
            let client = Arc::new(OllamaClient::new(
                base_url.clone(),
                model.clone(),
                embed_model.clone(),
            )?);
            let completion: Arc<dyn CompletionClient> = client.clone();
            let embedder: Arc<dyn Embedder> = client;
            Ok((completion, embedder))
        }
        LlmProvider::Gemini { api_key } => {
            let client = Arc::new(GeminiClient::new(api_key.clone())?);
            let completion: Arc<dyn CompletionClient> = client.clone();
            let embedder: Arc<dyn Embedder> = client;
            Ok((completion, embedder))
        }
    }
}
