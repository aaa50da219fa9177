use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use tessel_core::config::ModelConfig;
use tessel_core::error::{Result, TesselError};
use tessel_core::traits::{LlmClient, PromptSource};
use tessel_core::types::AgentOutcome;

use crate::state::WorkflowState;

/// A named, stateless transformation over a state snapshot.
///
/// Agents never mutate state themselves; they return an [`AgentOutcome`]
/// which the interpreter applies. The model call inside `process` is the
/// only suspension point.
pub trait Agent: Send + Sync + 'static {
    /// Unique, case-sensitive node name.
    fn name(&self) -> &str;

    /// The field receiving this agent's primary output.
    fn output_field(&self) -> &str;

    /// Fields that must be populated before this agent can run.
    fn required_fields(&self) -> Vec<String> {
        Vec::new()
    }

    fn process(&self, state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>>;
}

/// The model-invocation half shared by every concrete agent: a client, a
/// model config, a system prompt resolved once at construction, and a
/// per-call timeout.
///
/// Prompt resolution failure is deliberately deferred: a missing prompt
/// must not fail graph building, so the error is carried here and surfaced
/// on the first invocation.
pub struct ModelStep {
    llm: Arc<dyn LlmClient>,
    config: ModelConfig,
    prompt: std::result::Result<String, String>,
    timeout: Duration,
}

impl ModelStep {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        config: ModelConfig,
        prompts: &dyn PromptSource,
        prompt_name: &str,
        timeout_secs: u64,
    ) -> Self {
        let prompt = prompts
            .load_prompt(prompt_name)
            .map_err(|e| format!("prompt '{}' unavailable: {}", prompt_name, e));
        Self {
            llm,
            config,
            prompt,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Invoke the model once. Timeouts and transport failures come back as
    /// errors; the engine never retries here (see the capability layer).
    pub async fn invoke(&self, agent: &str, user_message: &str) -> Result<String> {
        let system = match &self.prompt {
            Ok(p) => p.as_str(),
            Err(cause) => {
                return Err(TesselError::AgentInvocation {
                    agent: agent.to_string(),
                    message: cause.clone(),
                })
            }
        };

        match tokio::time::timeout(
            self.timeout,
            self.llm.complete(&self.config, system, user_message),
        )
        .await
        {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(TesselError::AgentInvocation {
                agent: agent.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(TesselError::AgentTimeout {
                agent: agent.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Invoke the model, folding failure into an unsuccessful outcome.
    pub async fn invoke_outcome(&self, agent: &str, user_message: &str) -> AgentOutcome {
        match self.invoke(agent, user_message).await {
            Ok(text) => AgentOutcome::ok(text),
            Err(e) => AgentOutcome::fail(e.to_string()),
        }
    }
}
