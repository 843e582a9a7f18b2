//! Context Summarization
//!
//! Condenses turns evicted from the buffer into a bullet-list fragment using
//! the completion service. One request per trim, no retries.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::MemoryError;
use crate::llm::{with_timeout, CompletionClient, CompletionOptions};
use crate::memory::buffer::render_turns;
use crate::models::Turn;

const INSTRUCTION: &str =
    "Condense the following conversation into a brief bullet-list summary:\n\n";

/// Summarizes overflow turns through the completion collaborator
pub struct Summarizer {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self {
            client,
            options: CompletionOptions::default(),
            timeout,
        }
    }

    /// Produce a new summary fragment for `overflow`.
    ///
    /// The prior summary is accepted for implementations that want it; the
    /// default prompt condenses the overflow on its own.
    pub async fn condense(&self, _prior_summary: &str, overflow: &[Turn]) -> crate::Result<String> {
        if overflow.is_empty() {
            return Err(MemoryError::SummarizationFailed(
                "Cannot summarize empty turn list".to_string(),
            ));
        }

        let prompt = Self::build_prompt(overflow);

        info!(
            model = self.client.model_name(),
            "Condensing {} evicted turns",
            overflow.len()
        );

        match with_timeout(
            self.timeout,
            "summarization",
            self.client.complete(&prompt, &self.options),
        )
        .await
        {
            Ok(fragment) => Ok(fragment),
            Err(e) => {
                warn!("Failed to condense evicted turns: {}", e);
                Err(MemoryError::SummarizationFailed(e.to_string()))
            }
        }
    }

    fn build_prompt(overflow: &[Turn]) -> String {
        format!("{}{}", INSTRUCTION, render_turns(overflow))
    }
}
