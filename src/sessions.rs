//! Session registry
//!
//! Each session owns its buffer, summary and facts behind its own mutex, so
//! calls for one session never overlap while distinct sessions run in
//! parallel. The vector backend and collaborator clients are shared.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::chat::{ChatAgent, ChatReply};
use crate::config::{AppConfig, FactExtractorKind, MemoryConfig, VectorBackendConfig};
use crate::llm::{self, CompletionClient, Embedder};
use crate::memory::{
    ChromaVectorBackend, CompletionFactExtractor, FactExtractor, InMemoryVectorBackend,
    MemoryManager, PhraseFactExtractor, RecordOutcome, SessionSnapshot, VectorBackend,
};
use crate::models::{Role, SessionId};
use crate::Result;

/// Builds fresh per-session memory managers over shared collaborators
#[derive(Clone)]
pub struct MemoryFactory {
    config: MemoryConfig,
    completion: Arc<dyn CompletionClient>,
    embedder: Arc<dyn Embedder>,
    backend: Arc<dyn VectorBackend>,
    extractor: Arc<dyn FactExtractor>,
}

impl MemoryFactory {
    pub fn new(
        config: MemoryConfig,
        completion: Arc<dyn CompletionClient>,
        embedder: Arc<dyn Embedder>,
        backend: Arc<dyn VectorBackend>,
    ) -> Self {
        Self {
            config,
            completion,
            embedder,
            backend,
            extractor: Arc::new(PhraseFactExtractor),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FactExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Wire collaborators from application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.memory.validate()?;

        let (completion, embedder) = llm::build_clients(&config.provider)?;

        let backend: Arc<dyn VectorBackend> = match &config.vector_backend {
            VectorBackendConfig::InMemory => Arc::new(InMemoryVectorBackend::new()),
            VectorBackendConfig::Chroma { url, collection } => {
                Arc::new(ChromaVectorBackend::new(url.clone(), collection.clone())?)
            }
        };

        let extractor: Arc<dyn FactExtractor> = match config.fact_extractor {
            FactExtractorKind::Phrase => Arc::new(PhraseFactExtractor),
            FactExtractorKind::Completion => {
                Arc::new(CompletionFactExtractor::new(
                    completion.clone(),
                    config.memory.collaborator_timeout,
                ))
            }
        };

        info!(
            "Memory backend: {}, completion model: {}",
            backend.backend_name(),
            completion.model_name()
        );

        Ok(Self::new(config.memory.clone(), completion, embedder, backend).with_extractor(extractor))
    }

    pub fn build(&self, session_id: SessionId) -> MemoryManager {
        MemoryManager::new(
            session_id,
            self.config.clone(),
            self.completion.clone(),
            self.embedder.clone(),
            self.backend.clone(),
        )
        .with_extractor(self.extractor.clone())
    }

    pub fn chat_agent(&self) -> ChatAgent {
        ChatAgent::new(self.completion.clone(), self.config.collaborator_timeout)
    }
}

/// Live sessions keyed by id, each with an exclusive execution lane
pub struct SessionRegistry {
    factory: MemoryFactory,
    agent: ChatAgent,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<MemoryManager>>>>,
}

impl SessionRegistry {
    pub fn new(factory: MemoryFactory) -> Self {
        let agent = factory.chat_agent();
        Self {
            factory,
            agent,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get or create the lane for a session
    pub async fn session(&self, session_id: SessionId) -> Arc<Mutex<MemoryManager>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(&session_id) {
                return session.clone();
            }
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id)
            .or_insert_with(|| {
                info!(session = %session_id, "Opening memory session");
                Arc::new(Mutex::new(self.factory.build(session_id)))
            })
            .clone()
    }

    /// Lane for a session that is already open
    async fn existing(&self, session_id: SessionId) -> Option<Arc<Mutex<MemoryManager>>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    /// Drop a session's buffer, summary and facts. Returns false if it was not open.
    ///
    /// Indexed memories stay with the vector backend.
    pub async fn close(&self, session_id: SessionId) -> bool {
        let removed = self.sessions.write().await.remove(&session_id).is_some();
        if removed {
            info!(session = %session_id, "Closed memory session");
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn record_turn(
        &self,
        session_id: SessionId,
        role: Role,
        content: &str,
    ) -> Result<RecordOutcome> {
        let session = self.session(session_id).await;
        let mut memory = session.lock().await;
        memory.record_turn(role, content).await
    }

    /// Unknown sessions compose an empty context without being opened
    pub async fn compose_context(&self, session_id: SessionId, query: &str) -> String {
        let Some(session) = self.existing(session_id).await else {
            return String::new();
        };
        let memory = session.lock().await;
        memory.compose_context(query).await
    }

    /// Answer a user message; the lane is held for the whole exchange
    pub async fn respond(&self, session_id: SessionId, input: &str) -> Result<ChatReply> {
        let session = self.session(session_id).await;
        let mut memory = session.lock().await;
        self.agent.respond(&mut memory, input).await
    }

    /// Unknown sessions snapshot as empty without being opened
    pub async fn snapshot(&self, session_id: SessionId) -> SessionSnapshot {
        let Some(session) = self.existing(session_id).await else {
            return SessionSnapshot::empty(session_id);
        };
        let memory = session.lock().await;
        memory.snapshot()
    }

    pub async fn restore(&self, snapshot: SessionSnapshot) -> Result<()> {
        let session = self.session(snapshot.session_id).await;
        let mut memory = session.lock().await;
        memory.restore(snapshot)
    }
}
