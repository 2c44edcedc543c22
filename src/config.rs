//! Configuration types.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_OPENAI_BASE_URL, LlmBackend, LlmConfig};

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model calls per user message before giving up on the turn.
    pub max_tool_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: 8,
        }
    }
}

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct CoachConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub db_path: PathBuf,
    pub agent: AgentConfig,
}

impl CoachConfig {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";
    pub const DEFAULT_DB_PATH: &'static str = "./tmp/coach_sessions.db";

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, so tests need not touch the real
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY")
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let model = get("COACH_MODEL").unwrap_or_else(|| Self::DEFAULT_MODEL.to_string());
        let base_url =
            get("COACH_OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        let db_path = PathBuf::from(
            get("COACH_DB_PATH").unwrap_or_else(|| Self::DEFAULT_DB_PATH.to_string()),
        );

        let mut agent = AgentConfig::default();
        if let Some(raw) = get("COACH_MAX_TOOL_ITERATIONS") {
            agent.max_tool_iterations = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                Ok(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "COACH_MAX_TOOL_ITERATIONS".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: "COACH_MAX_TOOL_ITERATIONS".to_string(),
                        message: e.to_string(),
                    });
                }
            };
        }

        Ok(Self {
            api_key,
            model,
            base_url,
            db_path,
            agent,
        })
    }

    /// LLM provider settings derived from this config.
    pub fn llm(&self) -> LlmConfig {
        LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            base_url: self.base_url.clone(),
        }
    }
}
