//! Natural language → API-request workflow: a composer that plans one HTTP
//! request as structured JSON, and a reviewing pass. Dispatching the
//! request is the caller's business.

use std::sync::Arc;

use futures::future::BoxFuture;

use tessel_core::config::EngineConfig;
use tessel_core::error::{Result, TesselError};
use tessel_core::traits::{LlmClient, PromptSource};
use tessel_core::types::AgentOutcome;

use super::review::{extract_json, ReviewAgent, REVIEW_FEEDBACK, REVIEW_RESULT};
use super::RoleModels;
use crate::agent::{Agent, ModelStep};
use crate::graph::{hub_edges, Edge, GraphBuilder, GraphNode};
use crate::state::{FieldSpec, TaskInputs, WorkflowState};
use crate::supervisor::{RevisionPolicy, Stage, StagedSupervisor};

pub const TASK_TYPE: &str = "api_request";

const SUPERVISOR: &str = "supervisor";
const COMPOSER: &str = "composer";
const REVIEWER: &str = "reviewer";

/// Composes the request plan: `{method, path, headers, params, body}`.
struct RequestComposer {
    step: ModelStep,
}

impl Agent for RequestComposer {
    fn name(&self) -> &str {
        COMPOSER
    }

    fn output_field(&self) -> &str {
        "request"
    }

    fn required_fields(&self) -> Vec<String> {
        vec!["instruction".to_string()]
    }

    fn process(&self, state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>> {
        let instruction = state.field_str("instruction").unwrap_or_default().to_string();
        let api_doc = state.field_str("api_doc").map(str::to_string);
        let feedback = state.field_str(REVIEW_FEEDBACK).map(str::to_string);
        let previous = state.field_str("request").map(str::to_string);

        Box::pin(async move {
            if instruction.trim().is_empty() {
                return Ok(AgentOutcome::fail("instruction is empty"));
            }
            let mut user = format!("Instruction:\n{}", instruction);
            if let Some(doc) = api_doc {
                user.push_str(&format!("\n\nAPI documentation:\n{}", doc));
            }
            if let Some(feedback) = feedback {
                if let Some(previous) = previous {
                    user.push_str(&format!("\n\nPrevious request:\n{}", previous));
                }
                user.push_str(&format!("\n\nReview feedback to address:\n{}", feedback));
            }

            let text = match self.step.invoke(COMPOSER, &user).await {
                Ok(text) => text,
                Err(e) => return Ok(AgentOutcome::fail(e.to_string())),
            };

            // Strip fences/prose so `request` holds clean JSON when the
            // model cooperated; the reviewer flags it otherwise.
            Ok(AgentOutcome::ok(extract_json(&text)))
        })
    }
}

/// Builder for the natural language → API-request graph.
pub struct ApiRequestGraphBuilder {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptSource>,
    models: RoleModels,
    engine: EngineConfig,
}

impl ApiRequestGraphBuilder {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        prompts: Arc<dyn PromptSource>,
        models: RoleModels,
        engine: EngineConfig,
    ) -> Self {
        Self {
            llm,
            prompts,
            models,
            engine,
        }
    }

    fn step(&self, role: &str, prompt_name: &str) -> ModelStep {
        ModelStep::new(
            Arc::clone(&self.llm),
            self.models.for_role(role),
            self.prompts.as_ref(),
            prompt_name,
            self.engine.agent_timeout_secs,
        )
    }
}

impl GraphBuilder for ApiRequestGraphBuilder {
    fn task_type(&self) -> &str {
        TASK_TYPE
    }

    fn state_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::input("instruction", true),
            FieldSpec::input("api_doc", false),
            FieldSpec::output("request", COMPOSER),
            FieldSpec::output(REVIEW_RESULT, REVIEWER),
            FieldSpec::output(REVIEW_FEEDBACK, REVIEWER),
        ]
    }

    fn nodes(&self) -> Vec<GraphNode> {
        let supervisor = StagedSupervisor::new(
            SUPERVISOR,
            vec![
                Stage::new("request", COMPOSER),
                Stage::new(REVIEW_RESULT, REVIEWER),
            ],
        )
        .with_revision(RevisionPolicy {
            writer: COMPOSER.to_string(),
            review_field: REVIEW_RESULT.to_string(),
            pass_threshold: self.engine.pass_threshold,
        });

        vec![
            GraphNode::Supervisor(Arc::new(supervisor)),
            GraphNode::Agent(Arc::new(RequestComposer {
                step: self.step(COMPOSER, "api_request/composer"),
            })),
            GraphNode::Agent(Arc::new(ReviewAgent::new(
                self.step(REVIEWER, "api_request/reviewer"),
                REVIEWER,
                "request",
                vec!["instruction".to_string(), "api_doc".to_string()],
                self.engine.pass_threshold,
            ))),
        ]
    }

    fn edges(&self) -> Vec<Edge> {
        hub_edges(SUPERVISOR, &[COMPOSER, REVIEWER])
    }

    fn result_field(&self) -> &str {
        "request"
    }

    fn initial_state(&self, inputs: &TaskInputs) -> Result<WorkflowState> {
        let instruction = inputs
            .get("instruction")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TesselError::Config("task 'api_request' requires an 'instruction' input".to_string())
            })?;

        let max_iterations = inputs
            .get("max_iterations")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(self.engine.default_max_iterations);

        let mut state = WorkflowState::new(TASK_TYPE, max_iterations);
        state.set_field("instruction", serde_json::json!(instruction));
        if let Some(doc) = inputs.get("api_doc").and_then(|v| v.as_str()) {
            state.set_field("api_doc", serde_json::json!(doc));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::StaticPrompts;
    use crate::testing::ScriptedClient;

    fn builder_with(llm: ScriptedClient) -> ApiRequestGraphBuilder {
        ApiRequestGraphBuilder::new(
            Arc::new(llm),
            Arc::new(StaticPrompts),
            RoleModels::uniform(Default::default()),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_graph_compiles() {
        let graph = builder_with(ScriptedClient::text(&[])).build(None).unwrap();
        assert_eq!(graph.task_type(), "api_request");
        assert_eq!(graph.node_names().len(), 3);
    }

    #[tokio::test]
    async fn test_composer_strips_code_fences() {
        let response = "Here you go:\n```json\n{\"method\": \"GET\", \"path\": \"/pets\"}\n```";
        let builder = builder_with(ScriptedClient::text(&[response]));
        let nodes = builder.nodes();
        let composer = nodes
            .iter()
            .find_map(|n| match n {
                GraphNode::Agent(a) if a.name() == COMPOSER => Some(Arc::clone(a)),
                _ => None,
            })
            .unwrap();

        let mut state = WorkflowState::new(TASK_TYPE, 1);
        state.set_field("instruction", serde_json::json!("list all pets"));

        let outcome = composer.process(&state).await.unwrap();
        assert!(outcome.success);
        let parsed: serde_json::Value = serde_json::from_str(&outcome.content).unwrap();
        assert_eq!(parsed["method"], "GET");
    }

    #[test]
    fn test_initial_state_requires_instruction() {
        let builder = builder_with(ScriptedClient::text(&[]));
        assert!(builder.initial_state(&TaskInputs::new()).is_err());
    }
}
