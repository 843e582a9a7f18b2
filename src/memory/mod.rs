//! Multi-tier conversation memory
//!
//! Recent-turn buffer, rolling summary, fact store and vector index, composed
//! per session by the memory manager

pub mod buffer;
pub mod facts;
pub mod manager;
pub mod summarizer;
pub mod vector;

pub use buffer::TurnBuffer;
pub use facts::{CompletionFactExtractor, FactExtractor, FactStore, PhraseFactExtractor};
pub use manager::{MemoryManager, RecordOutcome, SessionSnapshot};
pub use summarizer::Summarizer;
pub use vector::{
    ChromaVectorBackend, InMemoryVectorBackend, IndexedMemory, RetrievedMemory, VectorBackend,
    VectorIndex,
};
