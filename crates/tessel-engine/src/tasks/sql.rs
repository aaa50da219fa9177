//! Natural language → SQL workflow: query analyzer, SQL generator, and a
//! reviewing pass with the same bounded revision cycle as the test-case
//! workflow.

use std::sync::Arc;

use futures::future::BoxFuture;

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

pub const TASK_TYPE: &str = "sql";

const SUPERVISOR: &str = "supervisor";
const ANALYZER: &str = "analyzer";
const GENERATOR: &str = "generator";
const REVIEWER: &str = "reviewer";

/// Understands the question: intent, entities, joins, filters.
struct QueryAnalyzer {
    step: ModelStep,
}

impl Agent for QueryAnalyzer {
    fn name(&self) -> &str {
        ANALYZER
    }

    fn output_field(&self) -> &str {
        "analysis"
    }

    fn required_fields(&self) -> Vec<String> {
        vec!["question".to_string()]
    }

    fn process(&self, state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>> {
        let question = state.field_str("question").unwrap_or_default().to_string();
        let dialect = state.field_str("dialect").unwrap_or("mysql").to_string();
        let schema = state.field_str("schema").unwrap_or_default().to_string();

        Box::pin(async move {
            if question.trim().is_empty() {
                return Ok(AgentOutcome::fail("question is empty"));
            }
            let mut user = format!("Dialect: {}\n", dialect);
            if !schema.is_empty() {
                user.push_str(&format!("\nSchema:\n{}\n", schema));
            }
            user.push_str(&format!("\nQuestion:\n{}", question));
            Ok(self.step.invoke_outcome(ANALYZER, &user).await)
        })
    }
}

/// Writes the SQL statement; re-runs on a failed quality gate.
struct SqlGenerator {
    step: ModelStep,
}

impl Agent for SqlGenerator {
    fn name(&self) -> &str {
        GENERATOR
    }

    fn output_field(&self) -> &str {
        "sql"
    }

    fn required_fields(&self) -> Vec<String> {
        vec!["analysis".to_string()]
    }

    fn process(&self, state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>> {
        if !state.filled("analysis") {
            let err = TesselError::AgentInputMissing {
                agent: GENERATOR.to_string(),
                field: "analysis".to_string(),
            };
            return Box::pin(async move { Err(err) });
        }
        let question = state.field_str("question").unwrap_or_default().to_string();
        let dialect = state.field_str("dialect").unwrap_or("mysql").to_string();
        let analysis = state.field_str("analysis").unwrap_or_default().to_string();
        let feedback = state.field_str(REVIEW_FEEDBACK).map(str::to_string);
        let previous = state.field_str("sql").map(str::to_string);

        Box::pin(async move {
            let mut user = format!(
                "Dialect: {}\n\nQuestion:\n{}\n\nAnalysis:\n{}",
                dialect, question, analysis
            );
            if let Some(feedback) = feedback {
                if let Some(previous) = previous {
                    user.push_str(&format!("\n\nPrevious SQL:\n{}", previous));
                }
                user.push_str(&format!("\n\nReview feedback to address:\n{}", feedback));
            }
            Ok(self.step.invoke_outcome(GENERATOR, &user).await)
        })
    }
}

/// Builder for the natural language → SQL graph.
pub struct SqlGraphBuilder {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptSource>,
    models: RoleModels,
    engine: EngineConfig,
}

impl SqlGraphBuilder {
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

impl GraphBuilder for SqlGraphBuilder {
    fn task_type(&self) -> &str {
        TASK_TYPE
    }

    fn state_fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::input("question", true),
            FieldSpec::input("dialect", false),
            FieldSpec::input("schema", false),
            FieldSpec::output("analysis", ANALYZER),
            FieldSpec::output("sql", GENERATOR),
            FieldSpec::output(REVIEW_RESULT, REVIEWER),
            FieldSpec::output(REVIEW_FEEDBACK, REVIEWER),
        ]
    }

    fn nodes(&self) -> Vec<GraphNode> {
        let supervisor = StagedSupervisor::new(
            SUPERVISOR,
            vec![
                Stage::new("analysis", ANALYZER),
                Stage::new("sql", GENERATOR),
                Stage::new(REVIEW_RESULT, REVIEWER),
            ],
        )
        .with_revision(RevisionPolicy {
            writer: GENERATOR.to_string(),
            review_field: REVIEW_RESULT.to_string(),
            pass_threshold: self.engine.pass_threshold,
        });

        vec![
            GraphNode::Supervisor(Arc::new(supervisor)),
            GraphNode::Agent(Arc::new(QueryAnalyzer {
                step: self.step(ANALYZER, "sql/analyzer"),
            })),
            GraphNode::Agent(Arc::new(SqlGenerator {
                step: self.step(GENERATOR, "sql/generator"),
            })),
            GraphNode::Agent(Arc::new(ReviewAgent::new(
                self.step(REVIEWER, "sql/reviewer"),
                REVIEWER,
                "sql",
                vec!["question".to_string(), "analysis".to_string()],
                self.engine.pass_threshold,
            ))),
        ]
    }

    fn edges(&self) -> Vec<Edge> {
        hub_edges(SUPERVISOR, &[ANALYZER, GENERATOR, REVIEWER])
    }

    fn result_field(&self) -> &str {
        "sql"
    }

    fn initial_state(&self, inputs: &TaskInputs) -> Result<WorkflowState> {
        let question = inputs
            .get("question")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                TesselError::Config("task 'sql' requires a 'question' input".to_string())
            })?;
        let dialect = inputs
            .get("dialect")
            .and_then(|v| v.as_str())
            .unwrap_or("mysql");
        let schema = inputs.get("schema").and_then(|v| v.as_str()).unwrap_or("");

        let max_iterations = inputs
            .get("max_iterations")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(self.engine.default_max_iterations);

        let mut state = WorkflowState::new(TASK_TYPE, max_iterations);
        state.set_field("question", serde_json::json!(question));
        state.set_field("dialect", serde_json::json!(dialect));
        if !schema.is_empty() {
            state.set_field("schema", serde_json::json!(schema));
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::StaticPrompts;
    use crate::testing::ScriptedClient;

    fn builder_with(llm: ScriptedClient) -> SqlGraphBuilder {
        SqlGraphBuilder::new(
            Arc::new(llm),
            Arc::new(StaticPrompts),
            RoleModels::uniform(Default::default()),
            EngineConfig::default(),
        )
    }

    #[test]
    fn test_graph_compiles() {
        let graph = builder_with(ScriptedClient::text(&[])).build(None).unwrap();
        assert_eq!(graph.task_type(), "sql");
        assert_eq!(graph.node_names().len(), 4);
    }

    #[test]
    fn test_initial_state_defaults() {
        let builder = builder_with(ScriptedClient::text(&[]));
        let mut inputs = TaskInputs::new();
        inputs.insert("question".to_string(), serde_json::json!("top 5 customers"));

        let state = builder.initial_state(&inputs).unwrap();
        assert_eq!(state.field_str("question"), Some("top 5 customers"));
        assert_eq!(state.field_str("dialect"), Some("mysql"));
        assert!(!state.filled("schema"));
    }

    #[test]
    fn test_initial_state_requires_question() {
        let builder = builder_with(ScriptedClient::text(&[]));
        assert!(builder.initial_state(&TaskInputs::new()).is_err());
    }

    #[tokio::test]
    async fn test_analyzer_rejects_empty_question() {
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
        state.set_field("question", serde_json::json!(""));

        let outcome = analyzer.process(&state).await.unwrap();
        assert!(!outcome.success);
    }
}
