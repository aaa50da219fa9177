use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;

/// Model-invocation capability.
///
/// The single suspension point of every agent step: latency-bearing and
/// fallible. Retry/fallback policy belongs to implementations of this
/// trait, never to the workflow engine.
pub trait LlmClient: Send + Sync + 'static {
    /// Send one completion request and return the full response text.
    fn complete(
        &self,
        config: &ModelConfig,
        system_prompt: &str,
        user_message: &str,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Prompt template source.
///
/// Resolved once per agent construction. A missing prompt must not fail
/// graph building; the agent carries the failure and reports it on its
/// first `process()` call.
pub trait PromptSource: Send + Sync + 'static {
    fn load_prompt(&self, name: &str) -> Result<String>;
}

/// Optional run-state persistence.
///
/// Consumed only when supplied to `build()`; without one, runs are purely
/// in-memory and non-resumable.
pub trait Checkpointer: Send + Sync + 'static {
    /// Persist a serialized state snapshot for a run.
    fn save(&self, thread_id: &str, state_json: &str) -> BoxFuture<'_, Result<()>>;

    /// Load the latest snapshot for a run, if any.
    fn load(&self, thread_id: &str) -> BoxFuture<'_, Result<Option<String>>>;

    /// Stable identity of the backing store, used to key compiled-graph
    /// caches so callers with different stores never share a graph.
    fn identity(&self) -> String;
}
