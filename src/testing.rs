//! Deterministic collaborator doubles for unit tests

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::MemoryError;
use crate::llm::{CompletionClient, CompletionOptions, Embedder};
use crate::memory::vector::{IndexedMemory, RetrievedMemory, VectorBackend};
use crate::Result;

/// Completion client that echoes a fixed reply and records every prompt
pub struct ScriptedCompletion {
    reply: String,
    failing: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            failing: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.failing.load(Ordering::SeqCst) {
            return Err(MemoryError::Transport("connection refused".to_string()));
        }
        Ok(self.reply.clone())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

const DIMENSIONS: usize = 64;

/// Bag-of-words embedder: each lowercase word hashes into one of 64 buckets
pub struct KeywordEmbedder {
    failing: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MemoryError::Transport("embedding service down".to_string()));
        }

        let mut vector = vec![0.0; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            vector[digest[0] as usize % DIMENSIONS] += 1.0;
        }
        Ok(vector)
    }
}

/// Backend that rejects every call
pub struct FailingBackend;

#[async_trait]
impl VectorBackend for FailingBackend {
    fn backend_name(&self) -> &'static str {
        "failing"
    }

    async fn upsert(&self, _record: IndexedMemory) -> Result<()> {
        Err(MemoryError::Transport("vector backend unreachable".to_string()))
    }

    async fn query(
        &self,
        _namespace: &str,
        _embedding: &[f32],
        _k: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        Err(MemoryError::Transport("vector backend unreachable".to_string()))
    }
}

/// Completion client that never answers
pub struct StalledCompletion;

#[async_trait]
impl CompletionClient for StalledCompletion {
    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }

    fn model_name(&self) -> &str {
        "stalled"
    }
}

/// Backend that answers every query with the same canned hits, ignoring `k`
pub struct CannedBackend {
    hits: Vec<RetrievedMemory>,
}

impl CannedBackend {
    pub fn new(hits: &[(&str, f32)]) -> Self {
        Self {
            hits: hits
                .iter()
                .map(|(id, score)| RetrievedMemory {
                    id: id.to_string(),
                    text: format!("memory {}", id),
                    role: None,
                    score: *score,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl VectorBackend for CannedBackend {
    fn backend_name(&self) -> &'static str {
        "canned"
    }

    async fn upsert(&self, _record: IndexedMemory) -> Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        _namespace: &str,
        _embedding: &[f32],
        _k: usize,
    ) -> Result<Vec<RetrievedMemory>> {
        Ok(self.hits.clone())
    }
}
