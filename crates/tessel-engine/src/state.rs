use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tessel_core::types::{RunId, TraceMessage};

/// Caller-supplied inputs for one run, keyed by field name.
pub type TaskInputs = HashMap<String, serde_json::Value>;

/// Declares one field of a task type's state shape.
///
/// `owner == None` marks a creation-time input, immutable for the rest of
/// the run. Owned fields may only be written by the named node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub owner: Option<String>,
}

impl FieldSpec {
    /// A field supplied by the caller at state creation.
    pub fn input(name: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            required,
            owner: None,
        }
    }

    /// A field produced by exactly one node.
    pub fn output(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            owner: Some(owner.into()),
        }
    }
}

/// A superseded version of a revisable field, kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// 1-based revision number.
    pub revision: u32,
    pub field: String,
    pub content: String,
    pub quality_score: f64,
    pub timestamp: DateTime<Utc>,
}

/// The single mutable record threaded through every step of a run.
///
/// Exactly one logical thread owns a state at a time, so no locking is
/// needed; concurrent runs each get their own instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub task_type: String,
    pub run_id: RunId,
    /// Append-only transcript, insertion order significant.
    pub messages: Vec<TraceMessage>,
    /// Terminal flag; once true no further nodes run.
    pub completed: bool,
    /// Set by any node on unrecoverable failure; short-circuits the loop.
    pub error: Option<String>,
    /// Revise-and-recheck cycles consumed so far.
    pub iteration: u32,
    /// Hard revision ceiling, fixed at creation.
    pub max_iterations: u32,
    /// Last quality assessment (0–100 scale).
    pub quality_score: f64,
    /// Output of the most recent routing decision.
    pub next_agent: Option<String>,
    /// Every node executed, in order. Routing decisions are not executions.
    pub agent_history: Vec<String>,
    /// Superseded versions of revisable fields.
    pub revisions: Vec<RevisionRecord>,
    /// Bumped on every mutation.
    pub version: u64,
    fields: BTreeMap<String, serde_json::Value>,
}

impl WorkflowState {
    pub fn new(task_type: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            task_type: task_type.into(),
            run_id: RunId::new(),
            messages: Vec::new(),
            completed: false,
            error: None,
            iteration: 0,
            max_iterations: max_iterations.max(1),
            quality_score: 0.0,
            next_agent: None,
            agent_history: Vec::new(),
            revisions: Vec::new(),
            version: 0,
            fields: BTreeMap::new(),
        }
    }

    /// Get a field value.
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    /// Get a field as a string slice, if it is a string.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_str())
    }

    /// Whether a field holds a meaningful value (present, non-null, and
    /// non-empty for strings). Stage routing keys off this.
    pub fn filled(&self, name: &str) -> bool {
        match self.fields.get(name) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    /// All populated field names, in stable order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(|k| k.as_str()).collect()
    }

    pub(crate) fn set_field(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.fields.insert(name.into(), value);
        self.version += 1;
    }

    pub(crate) fn clear_field(&mut self, name: &str) {
        if self.fields.remove(name).is_some() {
            self.version += 1;
        }
    }

    /// Archive the current value of a revisable field before an owner
    /// overwrite.
    pub(crate) fn archive_revision(&mut self, field: &str) {
        if let Some(content) = self.field_str(field).map(str::to_string) {
            let record = RevisionRecord {
                revision: self.revisions.len() as u32 + 1,
                field: field.to_string(),
                content,
                quality_score: self.quality_score,
                timestamp: Utc::now(),
            };
            self.revisions.push(record);
            self.version += 1;
        }
    }

    /// Append a transcript entry.
    pub(crate) fn record(&mut self, source: impl Into<String>, content: impl Into<String>) {
        self.messages.push(TraceMessage::new(source, content));
        self.version += 1;
    }

    /// Mark the run failed. The first failure wins.
    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
            self.next_agent = None;
            self.version += 1;
        }
    }

    /// Whether the run has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.completed || self.error.is_some()
    }
}
