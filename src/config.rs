//! Environment-driven configuration
//!
//! Values are read from the process environment (optionally seeded from `.env`).
//! Anything unset falls back to the reference configuration.

use crate::error::MemoryError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Tiering constants for one memory session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Turns kept in the buffer after a trim
    pub max_buffer_turns: usize,
    /// Trim fires when the buffer holds strictly more than this many turns
    pub summary_trigger: usize,
    /// Memories retrieved from the vector index per query
    pub vector_k: usize,
    /// Upper bound on any single collaborator call
    pub collaborator_timeout: Duration,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_buffer_turns: 6,
            summary_trigger: 8,
            vector_k: 3,
            collaborator_timeout: Duration::from_secs(60),
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_buffer_turns == 0 {
            return Err(MemoryError::Config(
                "MAX_BUFFER_TURNS must be at least 1".to_string(),
            ));
        }
        if self.summary_trigger < self.max_buffer_turns {
            return Err(MemoryError::Config(format!(
                "SUMMARY_TRIGGER ({}) must not be below MAX_BUFFER_TURNS ({})",
                self.summary_trigger, self.max_buffer_turns
            )));
        }
        if self.vector_k == 0 {
            return Err(MemoryError::Config("VECTOR_K must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Which completion/embedding service to talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    Ollama {
        base_url: String,
        model: String,
        embed_model: String,
    },
    Gemini {
        api_key: String,
    },
}

/// Where turn embeddings are indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorBackendConfig {
    InMemory,
    Chroma { url: String, collection: String },
}

/// How facts are pulled out of user turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FactExtractorKind {
    /// Fixed phrase match
    #[default]
    Phrase,
    /// Ask the completion service
    Completion,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub memory: MemoryConfig,
    pub provider: LlmProvider,
    pub vector_backend: VectorBackendConfig,
    pub fact_extractor: FactExtractorKind,
    pub port: u16,
}

impl AppConfig {
    /// Build configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = MemoryConfig::default();

        let memory = MemoryConfig {
            max_buffer_turns: parse_var("MAX_BUFFER_TURNS", defaults.max_buffer_turns)?,
            summary_trigger: parse_var("SUMMARY_TRIGGER", defaults.summary_trigger)?,
            vector_k: parse_var("VECTOR_K", defaults.vector_k)?,
            collaborator_timeout: Duration::from_secs(parse_var(
                "COLLABORATOR_TIMEOUT_SECS",
                defaults.collaborator_timeout.as_secs(),
            )?),
        };
        memory.validate()?;

        let provider = match var_or("LLM_PROVIDER", "ollama").to_lowercase().as_str() {
            "ollama" => LlmProvider::Ollama {
                base_url: var_or("OLLAMA_URL", "http://localhost:11434"),
                model: var_or("LLAMA_MODEL", "llama3.2:3b"),
                embed_model: var_or("EMBED_MODEL", "all-minilm"),
            },
            "gemini" => {
                let api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
                if api_key.trim().is_empty() {
                    return Err(MemoryError::Config(
                        "GEMINI_API_KEY must be set when LLM_PROVIDER=gemini".to_string(),
                    ));
                }
                LlmProvider::Gemini { api_key }
            }
            other => {
                return Err(MemoryError::Config(format!(
                    "Unsupported LLM_PROVIDER: {}",
                    other
                )))
            }
        };

        let vector_backend = match env::var("CHROMA_URL") {
            Ok(url) if !url.trim().is_empty() => VectorBackendConfig::Chroma {
                url,
                collection: var_or("CHROMA_COLLECTION", "chat_memory"),
            },
            _ => VectorBackendConfig::InMemory,
        };

        let fact_extractor = match var_or("FACT_EXTRACTOR", "phrase").to_lowercase().as_str() {
            "phrase" => FactExtractorKind::Phrase,
            "completion" | "llm" => FactExtractorKind::Completion,
            other => {
                return Err(MemoryError::Config(format!(
                    "Unsupported FACT_EXTRACTOR: {}",
                    other
                )))
            }
        };

        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => raw
                .parse()
                .map_err(|_| MemoryError::Config(format!("Invalid port: {}", raw)))?,
            Err(_) => 8080,
        };

        Ok(Self {
            memory,
            provider,
            vector_backend,
            fact_extractor,
            port,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| MemoryError::Config(format!("Invalid value for {}: {}", name, raw))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_configuration() {
        let config = MemoryConfig::default();
        assert_eq!(config.max_buffer_turns, 6);
        assert_eq!(config.summary_trigger, 8);
        assert_eq!(config.vector_k, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_trigger_below_retain_count_is_rejected() {
        let config = MemoryConfig {
            max_buffer_turns: 6,
            summary_trigger: 4,
            ..MemoryConfig::default()
        };
        assert!(matches!(config.validate(), Err(MemoryError::Config(_))));
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let config = MemoryConfig {
            vector_k: 0,
            ..MemoryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: usize = parse_var("HYBRID_MEMORY_TEST_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}
