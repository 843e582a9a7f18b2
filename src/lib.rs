//! Hybrid Conversation Memory
//!
//! A multi-tier memory manager for conversational agents that:
//! - Keeps a bounded buffer of recent turns
//! - Condenses evicted turns into a rolling summary
//! - Extracts durable key/value facts from user turns
//! - Indexes every turn for semantic recall
//! - Composes all four tiers into one prompt context per query
//!
//! RECORD:  TURN → BUFFER → FACTS → INDEX → TRIM + SUMMARIZE?
//! COMPOSE: RECENT → SUMMARY → FACTS → RELEVANT MEMORIES

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod sessions;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{MemoryError, Result};

// Re-export common types
pub use memory::{MemoryManager, RecordOutcome, SessionSnapshot};
pub use models::*;
pub use sessions::{MemoryFactory, SessionRegistry};
