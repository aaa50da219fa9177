use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a single workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry in a run's append-only transcript.
///
/// Insertion order is significant; the transcript is the audit trail
/// consumed by streaming callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceMessage {
    /// Node name (or "supervisor") that produced this entry.
    pub source: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TraceMessage {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What a single node execution produced.
///
/// Agents return this; the interpreter (never the agent) applies it to the
/// run state, so agents stay pure functions over a state snapshot plus one
/// model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// The agent's primary output text, written to its declared output field.
    pub content: String,
    /// Whether the step succeeded.
    pub success: bool,
    /// Failure cause when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Secondary writes (e.g. a reviewer's score and feedback), applied to
    /// the fields this node owns.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentOutcome {
    /// Create a successful outcome.
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: true,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Create a failed outcome.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            success: false,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_unique() {
        assert_ne!(RunId::new().0, RunId::new().0);
    }

    #[test]
    fn test_outcome_builders() {
        let ok = AgentOutcome::ok("analysis text").with_meta("tokens", serde_json::json!(42));
        assert!(ok.success);
        assert!(ok.error.is_none());
        assert_eq!(ok.metadata.get("tokens"), Some(&serde_json::json!(42)));

        let fail = AgentOutcome::fail("model timed out");
        assert!(!fail.success);
        assert_eq!(fail.error.as_deref(), Some("model timed out"));
        assert!(fail.content.is_empty());
    }

    #[test]
    fn test_outcome_serialization_roundtrip() {
        let outcome = AgentOutcome::ok("done").with_meta("quality_score", serde_json::json!(85.0));
        let json = serde_json::to_string(&outcome).unwrap();
        let parsed: AgentOutcome = serde_json::from_str(&json).unwrap();
        assert!(parsed.success);
        assert_eq!(
            parsed.metadata.get("quality_score"),
            Some(&serde_json::json!(85.0))
        );
    }
}
