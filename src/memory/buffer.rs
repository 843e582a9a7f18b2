//! Recent-turn buffer
//!
//! Ordered store of the latest dialogue turns. Grows until the manager trims
//! it; eviction is FIFO from the head and the evicted prefix is handed back to
//! the caller for summarization.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::models::Turn;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TurnBuffer {
    /// Insertion order is conversation order
    turns: VecDeque<Turn>,
}

impl TurnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn at the tail and return the new length
    pub fn append(&mut self, turn: Turn) -> usize {
        self.turns.push_back(turn);
        self.turns.len()
    }

    /// Turns that `trim_to(retain_count)` would evict, without evicting them
    pub fn overflow(&self, retain_count: usize) -> Vec<Turn> {
        let excess = self.turns.len().saturating_sub(retain_count);
        self.turns.iter().take(excess).cloned().collect()
    }

    /// Keep only the last `retain_count` turns and return the removed prefix
    pub fn trim_to(&mut self, retain_count: usize) -> Vec<Turn> {
        let excess = self.turns.len().saturating_sub(retain_count);
        self.turns.drain(..excess).collect()
    }

    /// Iterate over buffered turns in conversation order
    pub fn snapshot(&self) -> impl DoubleEndedIterator<Item = &Turn> + ExactSizeIterator {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl FromIterator<Turn> for TurnBuffer {
    fn from_iter<I: IntoIterator<Item = Turn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}

/// Render turns as `role: content` lines
pub fn render_turns<'a>(turns: impl IntoIterator<Item = &'a Turn>) -> String {
    turns
        .into_iter()
        .map(|turn| turn.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
