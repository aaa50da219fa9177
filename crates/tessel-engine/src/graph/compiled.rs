use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tessel_core::traits::Checkpointer;
use tessel_core::types::AgentOutcome;

use super::edge::Edge;
use crate::agent::Agent;
use crate::state::WorkflowState;
use crate::supervisor::{Decision, Supervisor};

/// Emitted after every node execution and every non-terminal routing
/// decision: the node that acted and a snapshot of the state it left.
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub node: String,
    pub state: WorkflowState,
}

/// The immutable runtime form of one task type's workflow.
///
/// Safe to share across concurrent runs; each run owns its own state and
/// is driven by a strictly sequential supervisor → agent loop.
pub struct CompiledGraph {
    task_type: String,
    agents: HashMap<String, Arc<dyn Agent>>,
    supervisor: Arc<dyn Supervisor>,
    edges: Vec<Edge>,
    /// field name -> owning node
    owners: HashMap<String, String>,
    /// creation-time fields, immutable for the rest of the run
    input_fields: HashSet<String>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl CompiledGraph {
    pub(crate) fn new(
        task_type: String,
        agents: HashMap<String, Arc<dyn Agent>>,
        supervisor: Arc<dyn Supervisor>,
        edges: Vec<Edge>,
        owners: HashMap<String, String>,
        input_fields: HashSet<String>,
        checkpointer: Option<Arc<dyn Checkpointer>>,
    ) -> Self {
        Self {
            task_type,
            agents,
            supervisor,
            edges,
            owners,
            input_fields,
            checkpointer,
        }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    /// The declared edge list, for observability tooling.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.push(self.supervisor.name().to_string());
        names
    }

    /// Drive one step: a routing decision, or the execution of the node the
    /// last decision selected. Returns `None` once the run is terminal.
    pub async fn advance(
        &self,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> Option<StepEvent> {
        // A pending routing decision means an agent is due to execute.
        if let Some(node_name) = state.next_agent.take() {
            // Cooperative cancellation checkpoint between node executions.
            if cancel.is_cancelled() {
                info!(task = %self.task_type, run = %state.run_id, "Run cancelled");
                state.fail("run cancelled");
                return None;
            }

            if !self.execute_node(&node_name, state, cancel).await {
                // Abandoned by cancellation; no execution happened.
                return None;
            }
            self.save_checkpoint(state).await;

            return Some(StepEvent {
                node: node_name,
                state: state.clone(),
            });
        }

        if state.is_terminal() {
            return None;
        }

        // Routing decision.
        match self.supervisor.decide(state) {
            Decision::Route(node) => {
                if !self.agents.contains_key(&node) {
                    // The builder validated route targets, so this is a
                    // supervisor bug, not a user error.
                    error!(task = %self.task_type, node = %node, "Supervisor routed to unknown node");
                    state.fail(format!("supervisor routed to unknown node '{}'", node));
                    return None;
                }
                Some(StepEvent {
                    node: self.supervisor.name().to_string(),
                    state: state.clone(),
                })
            }
            Decision::Finish => None,
        }
    }

    /// Run to completion, consuming the initial state and returning the
    /// final one. Run-level failures live in `state.error`, never in a
    /// return-channel error.
    pub async fn run(&self, mut state: WorkflowState, cancel: &CancellationToken) -> WorkflowState {
        info!(
            task = %self.task_type,
            run = %state.run_id,
            max_iterations = state.max_iterations,
            "Starting workflow run"
        );

        while self.advance(&mut state, cancel).await.is_some() {}

        info!(
            task = %self.task_type,
            run = %state.run_id,
            completed = state.completed,
            iterations = state.iteration,
            quality = state.quality_score,
            error = state.error.as_deref().unwrap_or(""),
            "Workflow run finished"
        );
        state
    }

    /// Step-by-step drive mode. Yields after every node execution and every
    /// non-terminal routing decision; the stream is finite and a fresh call
    /// starts a fresh run.
    pub fn stream(
        self: &Arc<Self>,
        state: WorkflowState,
        cancel: CancellationToken,
    ) -> BoxStream<'static, StepEvent> {
        let graph = Arc::clone(self);
        futures::stream::unfold((graph, state, cancel), |(graph, mut state, cancel)| async move {
            let event = graph.advance(&mut state, &cancel).await;
            event.map(|e| (e, (graph, state, cancel)))
        })
        .boxed()
    }

    /// Returns false when the call was abandoned by cancellation and
    /// nothing was written for this step.
    async fn execute_node(
        &self,
        node_name: &str,
        state: &mut WorkflowState,
        cancel: &CancellationToken,
    ) -> bool {
        let agent = match self.agents.get(node_name) {
            Some(a) => Arc::clone(a),
            None => {
                state.fail(format!("node '{}' not found in graph", node_name));
                return true;
            }
        };

        // Loop guard: a node legally re-runs once per revision cycle; more
        // than that means the router is stuck.
        let visits = state
            .agent_history
            .iter()
            .filter(|n| n.as_str() == node_name)
            .count();
        if visits > state.max_iterations as usize + 1 {
            warn!(
                task = %self.task_type,
                node = node_name,
                visits,
                "Node visit budget exhausted, terminating run"
            );
            state.fail(format!("node '{}' exceeded its visit budget", node_name));
            return true;
        }

        debug!(task = %self.task_type, node = node_name, "Executing node");

        // The agent works on a snapshot; a cancelled call is abandoned
        // without writing anything.
        let snapshot = state.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                info!(task = %self.task_type, node = node_name, "Agent call abandoned by cancellation");
                state.fail("run cancelled");
                return false;
            }
            result = agent.process(&snapshot) => result,
        };

        state.agent_history.push(node_name.to_string());

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => AgentOutcome::fail(e.to_string()),
        };

        if outcome.success {
            self.apply_outcome(&agent, outcome, state);
        } else {
            let message = outcome
                .error
                .unwrap_or_else(|| format!("agent '{}' failed", node_name));
            error!(task = %self.task_type, node = node_name, error = %message, "Node failed");
            state.record(node_name, message.clone());
            state.fail(message);
        }
        true
    }

    /// Apply a successful outcome atomically: primary output, owned
    /// metadata writes, transcript entry.
    fn apply_outcome(&self, agent: &Arc<dyn Agent>, outcome: AgentOutcome, state: &mut WorkflowState) {
        let node = agent.name();
        let output_field = agent.output_field();

        match self.owners.get(output_field) {
            Some(owner) if owner == node => {}
            _ => {
                // Build-time validation makes this unreachable short of a
                // misbehaving Agent impl; treat it as a design violation.
                state.fail(format!("node '{}' attempted to write unowned field '{}'", node, output_field));
                return;
            }
        }

        if state.filled(output_field) {
            state.archive_revision(output_field);
        }
        state.set_field(output_field, serde_json::Value::String(outcome.content.clone()));

        for (key, value) in outcome.metadata {
            if key == "quality_score" {
                if let Some(score) = value.as_f64() {
                    state.quality_score = score;
                }
                continue;
            }
            match self.owners.get(&key) {
                Some(owner) if owner == node => {
                    state.set_field(key, value);
                }
                _ if self.input_fields.contains(&key) => {
                    warn!(node, field = %key, "Agent attempted to overwrite an input field, skipping");
                }
                _ => {
                    debug!(node, field = %key, "Ignoring metadata entry with no owned field");
                }
            }
        }

        state.record(node, outcome.content);
        debug!(task = %self.task_type, node, version = state.version, "Node outcome applied");
    }

    async fn save_checkpoint(&self, state: &WorkflowState) {
        let Some(cp) = &self.checkpointer else {
            return;
        };
        match serde_json::to_string(state) {
            Ok(json) => {
                if let Err(e) = cp.save(&state.run_id.0, &json).await {
                    warn!(run = %state.run_id, error = %e, "Checkpoint save failed");
                }
            }
            Err(e) => warn!(run = %state.run_id, error = %e, "Checkpoint serialization failed"),
        }
    }

    /// Load a previously checkpointed state, if this graph has a store.
    pub async fn load_state(&self, thread_id: &str) -> Option<WorkflowState> {
        let cp = self.checkpointer.as_ref()?;
        match cp.load(thread_id).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(state) => Some(state),
                Err(e) => {
                    warn!(thread_id, error = %e, "Checkpoint deserialization failed");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(thread_id, error = %e, "Checkpoint load failed");
                None
            }
        }
    }
}
