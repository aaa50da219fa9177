use thiserror::Error;

#[derive(Debug, Error)]
pub enum TesselError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    // Graph build errors (never occur mid-run)
    #[error("Graph config error: {0}")]
    GraphConfig(String),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    // Agent errors
    #[error("Agent input missing: {agent} requires '{field}'")]
    AgentInputMissing { agent: String, field: String },

    #[error("Agent invocation failed: {agent}: {message}")]
    AgentInvocation { agent: String, message: String },

    #[error("Agent timeout after {timeout_secs}s: {agent}")]
    AgentTimeout { agent: String, timeout_secs: u64 },

    // Prompt errors
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    // Checkpoint errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TesselError>;
