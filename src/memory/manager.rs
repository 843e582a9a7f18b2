//! Memory Manager
//!
//! Owns one session's tiers and runs the two session-facing operations:
//! `record_turn` fans a turn out to every tier and demotes old turns to the
//! rolling summary; `compose_context` fans the tiers back in to one prompt
//! block.
//!
//! Trimming and the summary merge form one unit: if condensing fails the
//! buffer is left untrimmed and the next turn retries.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::MemoryConfig;
use crate::error::MemoryError;
use crate::llm::{CompletionClient, Embedder};
use crate::memory::buffer::{render_turns, TurnBuffer};
use crate::memory::facts::{FactExtractor, FactStore, PhraseFactExtractor};
use crate::memory::summarizer::Summarizer;
use crate::memory::vector::{VectorBackend, VectorIndex};
use crate::models::{Role, SessionId, Turn};
use crate::Result;

const RECENT_HEADER: &str = "### Recent turns:";
const SUMMARY_HEADER: &str = "### Summary of earlier conversation:";
const FACTS_HEADER: &str = "### Known facts:";
const MEMORIES_HEADER: &str = "### Relevant memories:";

/// What a `record_turn` call did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub buffer_len: usize,
    pub facts_extracted: usize,
    pub summarized: bool,
}

/// Serializable state of a session (the vector index stays with its backend)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub buffer: TurnBuffer,
    pub summary: String,
    pub facts: FactStore,
}

impl SessionSnapshot {
    /// State of a session that has recorded nothing
    pub fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            buffer: TurnBuffer::new(),
            summary: String::new(),
            facts: FactStore::new(),
        }
    }
}

/// Per-session memory. Mutation needs `&mut self`, so one session is always
/// driven from a single lane.
pub struct MemoryManager {
    session_id: SessionId,
    config: MemoryConfig,
    buffer: TurnBuffer,
    summary: String,
    facts: FactStore,
    extractor: Arc<dyn FactExtractor>,
    index: VectorIndex,
    summarizer: Summarizer,
}

impl MemoryManager {
    pub fn new(
        session_id: SessionId,
        config: MemoryConfig,
        completion: Arc<dyn CompletionClient>,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn VectorBackend>,
    ) -> Self {
        let index = VectorIndex::new(
            embedder,
            backend,
            session_id.to_string(),
            config.collaborator_timeout,
        );
        let summarizer = Summarizer::new(completion, config.collaborator_timeout);

        Self {
            session_id,
            config,
            buffer: TurnBuffer::new(),
            summary: String::new(),
            facts: FactStore::new(),
            extractor: Arc::new(PhraseFactExtractor),
            index,
            summarizer,
        }
    }

    /// Swap the fact extractor; stored facts are untouched
    pub fn with_extractor(mut self, extractor: Arc<dyn FactExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn buffer(&self) -> &TurnBuffer {
        &self.buffer
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn facts(&self) -> &FactStore {
        &self.facts
    }

    /// Record one turn across every tier.
    ///
    /// The turn always lands in the buffer. Index and summarization failures
    /// are returned after the remaining steps have run.
    pub async fn record_turn(&mut self, role: Role, content: &str) -> Result<RecordOutcome> {
        let buffer_len = self.buffer.append(Turn::new(role, content));

        let facts_extracted = if role == Role::User {
            self.apply_facts(content).await
        } else {
            0
        };

        let index_result = self.index_turn(role, content).await;
        if let Err(e) = &index_result {
            warn!(session = %self.session_id, "Turn not indexed: {}", e);
        }

        let summary_result = self.maybe_summarize().await;

        index_result?;
        let summarized = summary_result?;

        Ok(RecordOutcome {
            buffer_len: if summarized { self.buffer.len() } else { buffer_len },
            facts_extracted,
            summarized,
        })
    }

    async fn apply_facts(&mut self, content: &str) -> usize {
        match self.extractor.extract(content).await {
            Ok(facts) => {
                let count = facts.len();
                for fact in facts {
                    debug!(session = %self.session_id, key = %fact.key, "Fact upserted");
                    self.facts.upsert(fact.key, fact.value);
                }
                count
            }
            Err(e) => {
                warn!(session = %self.session_id, "Fact extraction failed, skipping: {}", e);
                0
            }
        }
    }

    async fn index_turn(&self, role: Role, content: &str) -> Result<()> {
        let embedding = self.index.embed(content).await?;
        self.index
            .upsert(VectorIndex::new_memory_id(), embedding, content, role)
            .await
    }

    /// Trim and merge as one unit once the buffer exceeds the trigger
    async fn maybe_summarize(&mut self) -> Result<bool> {
        if self.buffer.len() <= self.config.summary_trigger {
            return Ok(false);
        }

        let retain = self.config.max_buffer_turns;
        let pending = self.buffer.overflow(retain);

        info!(
            session = %self.session_id,
            "Buffer at {} turns (trigger {}). Demoting {} to summary",
            self.buffer.len(),
            self.config.summary_trigger,
            pending.len()
        );

        let fragment = match self.summarizer.condense(&self.summary, &pending).await {
            Ok(fragment) => fragment,
            Err(e) => {
                warn!(
                    session = %self.session_id,
                    "Keeping {} turns untrimmed for retry: {}",
                    self.buffer.len(),
                    e
                );
                return Err(e);
            }
        };

        let evicted = self.buffer.trim_to(retain);
        debug_assert_eq!(evicted, pending);

        self.summary.push('\n');
        self.summary.push_str(&fragment);

        Ok(true)
    }

    /// Assemble the prompt context for `query`. Missing tiers are omitted;
    /// a failed retrieval only drops the memories block.
    pub async fn compose_context(&self, query: &str) -> String {
        let mut parts = Vec::with_capacity(4);

        if !self.buffer.is_empty() {
            parts.push(format!("{}\n{}", RECENT_HEADER, render_turns(self.buffer.snapshot())));
        }

        if !self.summary.is_empty() {
            parts.push(format!("{}\n{}", SUMMARY_HEADER, self.summary));
        }

        if !self.facts.is_empty() {
            let lines = self
                .facts
                .snapshot()
                .iter()
                .map(|fact| format!("{}: {}", fact.key, fact.value))
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("{}\n{}", FACTS_HEADER, lines));
        }

        let memories = self.retrieve(query).await;
        if !memories.is_empty() {
            parts.push(format!("{}\n{}", MEMORIES_HEADER, memories.join("\n\n")));
        }

        parts.join("\n\n")
    }

    async fn retrieve(&self, query: &str) -> Vec<String> {
        let result = async {
            let embedding = self.index.embed(query).await?;
            self.index.query(&embedding, self.config.vector_k).await
        }
        .await;

        match result {
            Ok(hits) => hits.into_iter().map(|hit| hit.text).collect(),
            Err(e) => {
                warn!(session = %self.session_id, "Retrieval failed, omitting memories: {}", e);
                Vec::new()
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id,
            buffer: self.buffer.clone(),
            summary: self.summary.clone(),
            facts: self.facts.clone(),
        }
    }

    /// Replace buffer, summary and facts with a previously taken snapshot
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> Result<()> {
        if snapshot.session_id != self.session_id {
            return Err(MemoryError::InvalidInput(format!(
                "Snapshot belongs to session {}, not {}",
                snapshot.session_id, self.session_id
            )));
        }

        self.buffer = snapshot.buffer;
        self.summary = snapshot.summary;
        self.facts = snapshot.facts;
        info!(
            session = %self.session_id,
            "Restored session with {} buffered turns and {} facts",
            self.buffer.len(),
            self.facts.len()
        );
        Ok(())
    }
}
