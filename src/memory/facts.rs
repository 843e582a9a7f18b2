//! Structured fact memory
//!
//! `FactStore` only stores; deciding what counts as a fact is the job of a
//! `FactExtractor`, which can be swapped without touching storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::llm::{with_timeout, CompletionClient, CompletionOptions};
use crate::models::{Fact, FactKey};
use crate::Result;

/// Key/value facts in first-insertion order, last write wins
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FactStore {
    facts: Vec<Fact>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Overwrites keep the key's original position.
    pub fn upsert(&mut self, key: FactKey, value: String) {
        match self.facts.iter_mut().find(|fact| fact.key == key) {
            Some(existing) => existing.value = value,
            None => self.facts.push(Fact { key, value }),
        }
    }

    pub fn get(&self, key: &FactKey) -> Option<&str> {
        self.facts
            .iter()
            .find(|fact| &fact.key == key)
            .map(|fact| fact.value.as_str())
    }

    pub fn snapshot(&self) -> &[Fact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

impl FromIterator<Fact> for FactStore {
    fn from_iter<I: IntoIterator<Item = Fact>>(iter: I) -> Self {
        let mut store = FactStore::new();
        for fact in iter {
            store.upsert(fact.key, fact.value);
        }
        store
    }
}

/// Capability: find facts in a piece of text.
///
/// Must not touch stored state; an empty result is a normal outcome.
#[async_trait]
pub trait FactExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> Result<Vec<Fact>>;
}

/// Matches "favorite color is <word>" case-insensitively
#[derive(Debug, Clone, Copy, Default)]
pub struct PhraseFactExtractor;

impl PhraseFactExtractor {
    const PHRASE: &'static str = "favorite color is";

    pub fn extract_sync(text: &str) -> Vec<Fact> {
        // ASCII lowercasing keeps byte offsets aligned with `text`
        let lowered = text.to_ascii_lowercase();
        let Some(end) = lowered
            .rmatch_indices(Self::PHRASE)
            .map(|(start, phrase)| start + phrase.len())
            .find(|&end| lowered[end..].chars().next().map_or(true, char::is_whitespace))
        else {
            return Vec::new();
        };

        let value = text[end..]
            .split_whitespace()
            .next()
            .map(|token| token.trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | '?' | ';' | ':')))
            .filter(|token| !token.is_empty());

        match value {
            Some(value) => vec![Fact::new(FactKey::FAVORITE_COLOR, value)],
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl FactExtractor for PhraseFactExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<Fact>> {
        Ok(Self::extract_sync(text))
    }
}

/// Asks the completion service for facts as a flat JSON object
pub struct CompletionFactExtractor {
    client: Arc<dyn CompletionClient>,
    options: CompletionOptions,
    timeout: Duration,
}

impl CompletionFactExtractor {
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self {
            client,
            options: CompletionOptions {
                temperature: 0.0,
                max_tokens: 256,
            },
            timeout,
        }
    }

    fn build_prompt(text: &str) -> String {
        format!(
            r#"Extract durable personal facts stated by the user in the message below.
Reply with a single flat JSON object mapping snake_case fact names to short string values,
for example {{"favorite_color": "blue", "home_city": "Lisbon"}}.
Reply with {{}} if the message states no such facts.

MESSAGE:
---
{}
---

JSON:"#,
            text
        )
    }

    fn parse_reply(reply: &str) -> Vec<Fact> {
        let trimmed = reply.trim();
        let body = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => return Vec::new(),
        };

        let parsed: BTreeMap<String, serde_json::Value> = match serde_json::from_str(body) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Fact extraction reply was not a JSON object: {}", e);
                return Vec::new();
            }
        };

        parsed
            .into_iter()
            .filter_map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                let key = key.trim().to_lowercase().replace([' ', '-'], "_");
                if key.is_empty() || value.trim().is_empty() {
                    return None;
                }
                Some(Fact::new(FactKey::new(key), value.trim()))
            })
            .collect()
    }
}

#[async_trait]
impl FactExtractor for CompletionFactExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<Fact>> {
        let prompt = Self::build_prompt(text);
        let reply = with_timeout(
            self.timeout,
            "fact extraction",
            self.client.complete(&prompt, &self.options),
        )
        .await
        .map_err(|e| {
            warn!("Fact extraction call failed: {}", e);
            e
        })?;

        Ok(Self::parse_reply(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedCompletion, StalledCompletion};

    #[test]
    fn test_phrase_extraction() {
        let facts = PhraseFactExtractor::extract_sync("My favorite color is blue");
        assert_eq!(facts, vec![Fact::new(FactKey::FAVORITE_COLOR, "blue")]);
    }

    #[test]
    fn test_phrase_extraction_is_case_insensitive() {
        let facts = PhraseFactExtractor::extract_sync("Well, MY FAVORITE COLOR IS Green. Really.");
        assert_eq!(facts[0].value, "Green");
    }

    #[test]
    fn test_phrase_extraction_noop() {
        assert!(PhraseFactExtractor::extract_sync("I like turtles").is_empty());
        assert!(PhraseFactExtractor::extract_sync("my favorite color is").is_empty());
    }

    #[test]
    fn test_phrase_extraction_uses_last_mention() {
        let facts = PhraseFactExtractor::extract_sync(
            "My favorite color is red. Actually my favorite color is teal",
        );
        assert_eq!(facts[0].value, "teal");
    }

    #[test]
    fn test_phrase_must_end_at_a_word_boundary() {
        assert!(PhraseFactExtractor::extract_sync("My favorite color isn't red").is_empty());

        let facts = PhraseFactExtractor::extract_sync(
            "My favorite color is violet, though my favorite color isn't obvious",
        );
        assert_eq!(facts, vec![Fact::new(FactKey::FAVORITE_COLOR, "violet")]);
    }

    #[test]
    fn test_upsert_overwrites_in_place() {
        let mut store = FactStore::new();
        store.upsert(FactKey::FAVORITE_COLOR, "blue".to_string());
        store.upsert(FactKey::new("home_city"), "Lisbon".to_string());
        store.upsert(FactKey::FAVORITE_COLOR, "green".to_string());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get(&FactKey::FAVORITE_COLOR), Some("green"));
        assert_eq!(store.snapshot()[0].key, FactKey::FAVORITE_COLOR);
        assert_eq!(store.snapshot()[1].key.as_str(), "home_city");
    }

    #[test]
    fn test_parse_reply_tolerates_code_fences() {
        let reply = "```json\n{\"favorite_color\": \"blue\", \"Home City\": \"Lisbon\", \"age\": 31, \"pets\": []}\n```";
        let facts = CompletionFactExtractor::parse_reply(reply);

        let store: FactStore = facts.into_iter().collect();
        assert_eq!(store.get(&FactKey::FAVORITE_COLOR), Some("blue"));
        assert_eq!(store.get(&FactKey::new("home_city")), Some("Lisbon"));
        assert_eq!(store.get(&FactKey::new("age")), Some("31"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_parse_reply_garbage_is_noop() {
        assert!(CompletionFactExtractor::parse_reply("no facts here").is_empty());
        assert!(CompletionFactExtractor::parse_reply("{not json}").is_empty());
    }

    #[tokio::test]
    async fn test_completion_extractor_uses_client() {
        let client = Arc::new(ScriptedCompletion::new(r#"{"favorite_color": "blue"}"#));
        let extractor = CompletionFactExtractor::new(client.clone(), Duration::from_secs(5));

        let facts = extractor.extract("I really love blue").await.unwrap();
        assert_eq!(facts, vec![Fact::new(FactKey::FAVORITE_COLOR, "blue")]);
        assert!(client.prompts()[0].contains("I really love blue"));
    }

    #[tokio::test]
    async fn test_completion_extractor_times_out() {
        let extractor = CompletionFactExtractor::new(
            Arc::new(StalledCompletion),
            Duration::from_millis(50),
        );

        let result = tokio::time::timeout(Duration::from_secs(2), extractor.extract("hi")).await;
        let err = result.expect("extractor must honour its deadline").unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("fact extraction"));
    }
}
