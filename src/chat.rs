//! Conversational answer generation
//!
//! Answers a user message with the completion service, using the session's
//! composed memory as context, and records both sides of the exchange.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::MemoryError;
use crate::llm::{with_timeout, CompletionClient, CompletionOptions};
use crate::memory::MemoryManager;
use crate::models::Role;

/// Response for one conversational exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatReply {
    pub answer: String,
    pub model: String,
    /// Whether any memory tier contributed context
    pub context_used: bool,
}

pub struct ChatAgent {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    timeout: Duration,
}

impl ChatAgent {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self {
            client,
            options: CompletionOptions::default(),
            timeout,
        }
    }

    /// Record the user message, answer it from memory, record the answer.
    ///
    /// Memory write failures are logged; only the answer call itself is fatal.
    pub async fn respond(
        &self,
        memory: &mut MemoryManager,
        input: &str,
    ) -> crate::Result<ChatReply> {
        if let Err(error) = memory.record_turn(Role::User, input).await {
            warn!(
                "Recording user turn failed, answering with partial memory: {}",
                error
            );
        }

        let context = memory.compose_context(input).await;
        let prompt = build_prompt(&context, input);

        let answer = with_timeout(
            self.timeout,
            "answer generation",
            self.client.complete(&prompt, &self.options),
        )
        .await
        .map_err(|e| {
            warn!("Answer generation failed: {}", e);
            MemoryError::AnswerGenerationFailed(e.to_string())
        })?;

        info!(
            session = %memory.session_id(),
            model = self.client.model_name(),
            "Answer generated"
        );

        if let Err(error) = memory.record_turn(Role::Assistant, &answer).await {
            warn!(
                "Recording assistant turn failed, answer will still be returned: {}",
                error
            );
        }

        Ok(ChatReply {
            answer,
            model: self.client.model_name().to_string(),
            context_used: !context.is_empty(),
        })
    }
}

fn build_prompt(context: &str, input: &str) -> String {
    format!(
        "{}\n\n### New question:\n{}\n\n### Assistant answer:\n",
        context, input
    )
}
