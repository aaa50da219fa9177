//! Requirement → test-case workflow: analyzer, designer, writer, reviewer,
//! with one bounded revise-and-recheck cycle between writer and reviewer.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::warn;

use tessel_core::config::EngineConfig;
use tessel_core::error::{Result, TesselError};
use tessel_core::traits::{LlmClient, PromptSource};
use tessel_core::types::AgentOutcome;

use super::review::{ReviewAgent, REVIEW_FEEDBACK, REVIEW_RESULT};
use super::RoleModels;
use crate::agent::{Agent, ModelStep};
use crate::graph::{hub_edges, Edge, GraphBuilder, GraphNode};
use crate::state::{FieldSpec, TaskInputs, WorkflowState};
use crate::supervisor::{RevisionPolicy, Stage, StagedSupervisor};

pub const TASK_TYPE: &str = "testcase";

const SUPERVISOR: &str = "supervisor";
const ANALYZER: &str = "analyzer";
const DESIGNER: &str = "designer";
const WRITER: &str = "writer";
const REVIEWER: &str = "reviewer";

/// Test types the workflow understands; unknown values fall back to API.
pub const TEST_TYPES: [&str; 3] = ["API", "Web", "App"];

/// Turns a raw requirement into a structured analysis.
struct Analyzer {
    step: ModelStep,
}

impl Agent for Analyzer {
    fn name(&self) -> &str {
        ANALYZER
    }

    fn output_field(&self) -> &str {
        "analysis"
    }

    fn required_fields(&self) -> Vec<String> {
        vec!["requirement".to_string()]
    }

    fn process(&self, state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>> {
        let requirement = state.field_str("requirement").unwrap_or_default().to_string();
        let test_type = state.field_str("test_type").unwrap_or("API").to_string();

        Box::pin(async move {
            if requirement.trim().is_empty() {
                return Ok(AgentOutcome::fail("requirement description is empty"));
            }
            let user = format!("Test type: {}\n\nRequirement:\n{}", test_type, requirement);
            Ok(self.step.invoke_outcome(ANALYZER, &user).await)
        })
    }
}

/// Derives test points from the analysis.
struct Designer {
    step: ModelStep,
}

impl Agent for Designer {
    fn name(&self) -> &str {
        DESIGNER
    }

    fn output_field(&self) -> &str {
        "test_points"
    }

    fn required_fields(&self) -> Vec<String> {
        vec!["analysis".to_string()]
    }

    fn process(&self, state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>> {
        if !state.filled("analysis") {
            return missing_input(DESIGNER, "analysis");
        }
        let requirement = state.field_str("requirement").unwrap_or_default().to_string();
        let analysis = state.field_str("analysis").unwrap_or_default().to_string();

        Box::pin(async move {
            let user = format!("Requirement:\n{}\n\nAnalysis:\n{}", requirement, analysis);
            Ok(self.step.invoke_outcome(DESIGNER, &user).await)
        })
    }
}

/// Expands test points into complete test cases. The only node allowed to
/// overwrite its own previous output, which it does on revision passes.
struct Writer {
    step: ModelStep,
}

impl Agent for Writer {
    fn name(&self) -> &str {
        WRITER
    }

    fn output_field(&self) -> &str {
        "test_cases"
    }

    fn required_fields(&self) -> Vec<String> {
        vec!["test_points".to_string()]
    }

    fn process(&self, state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>> {
        if !state.filled("test_points") {
            return missing_input(WRITER, "test_points");
        }
        let requirement = state.field_str("requirement").unwrap_or_default().to_string();
        let test_points = state.field_str("test_points").unwrap_or_default().to_string();
        let feedback = state.field_str(REVIEW_FEEDBACK).map(str::to_string);
        let previous = state.field_str("test_cases").map(str::to_string);

        Box::pin(async move {
            let mut user = format!("Requirement:\n{}\n\nTest points:\n{}", requirement, test_points);
            // Revision pass: the prompt must carry the reviewer's feedback.
            if let Some(feedback) = feedback {
                if let Some(previous) = previous {
                    user.push_str(&format!("\n\nPrevious test cases:\n{}", previous));
                }
                user.push_str(&format!("\n\nReview feedback to address:\n{}", feedback));
            }
            Ok(self.step.invoke_outcome(WRITER, &user).await)
        })
    }
}

fn missing_input(agent: &str, field: &str) -> BoxFuture<'static, Result<AgentOutcome>> {
    let err = TesselError::AgentInputMissing {
        agent: agent.to_string(),
        field: field.to_string(),
    };
    Box::pin(async move { Err(err) })
}

/// Builder for the requirement → test-case graph.
pub struct TestCaseGraphBuilder {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptSource>,
    models: RoleModels,
    engine: EngineConfig,
}

impl TestCaseGraphBuilder {
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

impl GraphBuilder for TestCaseGraphBuilder {
    fn task_type(&self) -> &str {
        TASK_TYPE
    }

    fn state_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::input("requirement", true),
            FieldSpec::input("test_type", false),
            FieldSpec::output("analysis", ANALYZER),
            FieldSpec::output("test_points", DESIGNER),
            FieldSpec::output("test_cases", WRITER),
            FieldSpec::output(REVIEW_RESULT, REVIEWER),
            FieldSpec::output(REVIEW_FEEDBACK, REVIEWER),
        ]
    }

    fn nodes(&self) -> Vec<GraphNode> {
        let supervisor = StagedSupervisor::new(
            SUPERVISOR,
            vec![
                Stage::new("analysis", ANALYZER),
                Stage::new("test_points", DESIGNER),
                Stage::new("test_cases", WRITER),
                Stage::new(REVIEW_RESULT, REVIEWER),
            ],
        )
        .with_revision(RevisionPolicy {
            writer: WRITER.to_string(),
            review_field: REVIEW_RESULT.to_string(),
            pass_threshold: self.engine.pass_threshold,
        });

        vec![
            GraphNode::Supervisor(Arc::new(supervisor)),
            GraphNode::Agent(Arc::new(Analyzer {
                step: self.step(ANALYZER, "testcase/analyzer"),
            })),
            GraphNode::Agent(Arc::new(Designer {
                step: self.step(DESIGNER, "testcase/designer"),
            })),
            GraphNode::Agent(Arc::new(Writer {
                step: self.step(WRITER, "testcase/writer"),
            })),
            GraphNode::Agent(Arc::new(ReviewAgent::new(
                self.step(REVIEWER, "testcase/reviewer"),
                REVIEWER,
                "test_cases",
                vec!["requirement".to_string(), "test_points".to_string()],
                self.engine.pass_threshold,
            ))),
        ]
    }

    fn edges(&self) -> Vec<Edge> {
        hub_edges(SUPERVISOR, &[ANALYZER, DESIGNER, WRITER, REVIEWER])
    }

    fn result_field(&self) -> &str {
        "test_cases"
    }

    fn initial_state(&self, inputs: &TaskInputs) -> Result<WorkflowState> {
        let requirement = inputs
            .get("requirement")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TesselError::Config("task 'testcase' requires a 'requirement' input".to_string())
            })?;

        let mut test_type = inputs
            .get("test_type")
            .and_then(|v| v.as_str())
            .unwrap_or("API");
        if !TEST_TYPES.contains(&test_type) {
            warn!(test_type, "Unknown test type, falling back to API");
            test_type = "API";
        }

        let max_iterations = inputs
            .get("max_iterations")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(self.engine.default_max_iterations);

        let mut state = WorkflowState::new(TASK_TYPE, max_iterations);
        state.set_field("requirement", serde_json::json!(requirement));
        state.set_field("test_type", serde_json::json!(test_type));
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::StaticPrompts;
    use crate::testing::ScriptedClient;

    fn builder_with(llm: ScriptedClient) -> TestCaseGraphBuilder {
        TestCaseGraphBuilder::new(
            Arc::new(llm),
            Arc::new(StaticPrompts),
            RoleModels::uniform(Default::default()),
            EngineConfig::default(),
        )
    }

    fn inputs(requirement: &str) -> TaskInputs {
        let mut map = TaskInputs::new();
        map.insert("requirement".to_string(), serde_json::json!(requirement));
        map
    }

    #[test]
    fn test_initial_state_zeroed() {
        let builder = builder_with(ScriptedClient::text(&[]));
        let state = builder.initial_state(&inputs("user login")).unwrap();

        assert_eq!(state.task_type, "testcase");
        assert_eq!(state.field_str("requirement"), Some("user login"));
        assert_eq!(state.field_str("test_type"), Some("API"));
        assert_eq!(state.iteration, 0);
        assert!(!state.filled("analysis"));
        assert!(!state.filled("test_cases"));
    }

    #[test]
    fn test_initial_state_requires_requirement_key() {
        let builder = builder_with(ScriptedClient::text(&[]));
        let err = builder.initial_state(&TaskInputs::new()).unwrap_err();
        assert!(err.to_string().contains("requirement"));
    }

    #[test]
    fn test_unknown_test_type_falls_back() {
        let builder = builder_with(ScriptedClient::text(&[]));
        let mut map = inputs("user login");
        map.insert("test_type".to_string(), serde_json::json!("Desktop"));
        let state = builder.initial_state(&map).unwrap();
        assert_eq!(state.field_str("test_type"), Some("API"));
    }

    #[test]
    fn test_max_iterations_override() {
        let builder = builder_with(ScriptedClient::text(&[]));
        let mut map = inputs("user login");
        map.insert("max_iterations".to_string(), serde_json::json!(5));
        let state = builder.initial_state(&map).unwrap();
        assert_eq!(state.max_iterations, 5);
    }

    #[test]
    fn test_graph_compiles() {
        let builder = builder_with(ScriptedClient::text(&[]));
        let graph = builder.build(None).unwrap();
        assert_eq!(graph.task_type(), "testcase");
        assert_eq!(graph.node_names().len(), 5);
    }

    #[tokio::test]
    async fn test_analyzer_rejects_empty_requirement() {
        let builder = builder_with(ScriptedClient::text(&["unused"]));
        let nodes = builder.nodes();
        let analyzer = nodes
            .iter()
            .find_map(|n| match n {
                GraphNode::Agent(a) if a.name() == ANALYZER => Some(Arc::clone(a)),
                _ => None,
            })
            .unwrap();

        let mut state = WorkflowState::new(TASK_TYPE, 1);
        state.set_field("requirement", serde_json::json!("   "));

        let outcome = analyzer.process(&state).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("requirement description is empty"));
    }

    #[tokio::test]
    async fn test_designer_requires_analysis() {
        let builder = builder_with(ScriptedClient::text(&["unused"]));
        let nodes = builder.nodes();
        let designer = nodes
            .iter()
            .find_map(|n| match n {
                GraphNode::Agent(a) if a.name() == DESIGNER => Some(Arc::clone(a)),
                _ => None,
            })
            .unwrap();

        let state = WorkflowState::new(TASK_TYPE, 1);
        let err = designer.process(&state).await.unwrap_err();
        assert!(matches!(err, TesselError::AgentInputMissing { .. }));
    }

    #[tokio::test]
    async fn test_writer_revision_prompt_carries_feedback() {
        // The scripted client records nothing, so assert indirectly: a
        // writer with feedback present still succeeds and rewrites.
        let builder = builder_with(ScriptedClient::text(&["revised cases"]));
        let nodes = builder.nodes();
        let writer = nodes
            .iter()
            .find_map(|n| match n {
                GraphNode::Agent(a) if a.name() == WRITER => Some(Arc::clone(a)),
                _ => None,
            })
            .unwrap();

        let mut state = WorkflowState::new(TASK_TYPE, 2);
        state.set_field("requirement", serde_json::json!("login"));
        state.set_field("test_points", serde_json::json!("1. empty password"));
        state.set_field("test_cases", serde_json::json!("v1"));
        state.set_field(REVIEW_FEEDBACK, serde_json::json!("add boundary cases"));

        let outcome = writer.process(&state).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.content, "revised cases");
    }
}
