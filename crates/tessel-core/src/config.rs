use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesselError};

/// Top-level configuration, loaded from `tessel.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    /// Models tried in order when the primary is exhausted.
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Directory of prompt overrides (`<name>.md`); embedded defaults
    /// are used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_dir: Option<PathBuf>,
    /// Per-role model overrides, keyed by agent role (e.g. "reviewer").
    #[serde(default)]
    pub role_models: std::collections::HashMap<String, ModelConfig>,
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| TesselError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| TesselError::Config(e.to_string()))
    }
}

/// Model endpoint configuration for one provider/model pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Overrides the provider preset base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            retry: None,
        }
    }
}

fn default_provider() -> String {
    "siliconflow".to_string()
}
fn default_model_id() -> String {
    "deepseek-ai/DeepSeek-V3".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.0
}

/// Retry configuration for LLM requests.
///
/// Retry lives in the capability layer; the workflow engine itself never
/// re-invokes a failed agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    30000
}

/// Workflow engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quality gate: reviews scoring at or above this pass (0–100 scale).
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
    /// Revision budget used when the caller does not override it.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
    /// Per-agent model invocation timeout.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pass_threshold: default_pass_threshold(),
            default_max_iterations: default_max_iterations(),
            agent_timeout_secs: default_agent_timeout(),
        }
    }
}

fn default_pass_threshold() -> f64 {
    80.0
}
fn default_max_iterations() -> u32 {
    3
}
fn default_agent_timeout() -> u64 {
    120
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_TESSEL_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_TESSEL_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_TESSEL_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${TESSEL_DOES_NOT_EXIST}\"");
        assert_eq!(result, "key = \"${TESSEL_DOES_NOT_EXIST}\"");
    }

    #[test]
    fn test_model_config_defaults() {
        let config: ModelConfig = toml::from_str("").unwrap();
        assert_eq!(config.provider, "siliconflow");
        assert_eq!(config.model_id, "deepseek-ai/DeepSeek-V3");
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.temperature, 0.0);
        assert!(config.retry.is_none());
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.pass_threshold, 80.0);
        assert_eq!(config.default_max_iterations, 3);
        assert_eq!(config.agent_timeout_secs, 120);
    }

    #[test]
    fn test_retry_config_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.initial_backoff_ms, 1000);
        assert_eq!(retry.max_backoff_ms, 30000);
    }
}
