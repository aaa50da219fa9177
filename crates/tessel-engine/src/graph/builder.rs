use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tessel_core::error::{Result, TesselError};
use tessel_core::traits::Checkpointer;

use super::compiled::CompiledGraph;
use super::edge::Edge;
use crate::agent::Agent;
use crate::state::{FieldSpec, TaskInputs, WorkflowState};
use crate::supervisor::{Supervisor, END};

/// One declared node: either a domain agent or the single routing node.
#[derive(Clone)]
pub enum GraphNode {
    Agent(Arc<dyn Agent>),
    Supervisor(Arc<dyn Supervisor>),
}

impl GraphNode {
    pub fn name(&self) -> &str {
        match self {
            GraphNode::Agent(a) => a.name(),
            GraphNode::Supervisor(s) => s.name(),
        }
    }
}

/// Declares the node set, edge list, and state shape for one task type.
pub trait GraphBuilder: Send + Sync + 'static {
    /// Registry key for this workflow shape.
    fn task_type(&self) -> &str;

    /// The full state shape: inputs and per-node outputs.
    fn state_fields(&self) -> Vec<FieldSpec>;

    /// All nodes. Exactly one supervisor entry and at least one agent;
    /// names are unique and case-sensitive.
    fn nodes(&self) -> Vec<GraphNode>;

    /// Static reachability, validated at build time.
    fn edges(&self) -> Vec<Edge>;

    /// The field extracted into `TaskResult::output`.
    fn result_field(&self) -> &str;

    /// Create a zeroed state from caller inputs. Control fields start at
    /// zero and every task output is empty.
    fn initial_state(&self, inputs: &TaskInputs) -> Result<WorkflowState>;

    /// Compile into a reusable, thread-safe graph. Idempotent; callers
    /// normally go through the registry, which caches the result.
    fn build(&self, checkpointer: Option<Arc<dyn Checkpointer>>) -> Result<CompiledGraph> {
        compile(self, checkpointer)
    }
}

/// Validate a builder's declaration and produce the runtime graph.
pub fn compile(
    builder: &(impl GraphBuilder + ?Sized),
    checkpointer: Option<Arc<dyn Checkpointer>>,
) -> Result<CompiledGraph> {
    let task_type = builder.task_type();
    let nodes = builder.nodes();
    let edges = builder.edges();
    let fields = builder.state_fields();

    let mut agents: HashMap<String, Arc<dyn Agent>> = HashMap::new();
    let mut supervisor: Option<Arc<dyn Supervisor>> = None;
    let mut names: HashSet<String> = HashSet::new();

    for node in nodes {
        let name = node.name().to_string();
        if name == END {
            return Err(config_err(task_type, "a node may not be named after the terminal sentinel"));
        }
        if !names.insert(name.clone()) {
            return Err(config_err(task_type, &format!("duplicate node name '{}'", name)));
        }
        match node {
            GraphNode::Agent(agent) => {
                agents.insert(name, agent);
            }
            GraphNode::Supervisor(s) => {
                if supervisor.is_some() {
                    return Err(config_err(task_type, "more than one node claims the supervisor role"));
                }
                supervisor = Some(s);
            }
        }
    }

    let supervisor = supervisor
        .ok_or_else(|| config_err(task_type, "no node claims the supervisor role"))?;
    if agents.is_empty() {
        return Err(config_err(task_type, "at least one domain agent is required"));
    }

    // Every edge endpoint must be a declared node (or the terminal sentinel).
    for edge in &edges {
        for endpoint in [&edge.from, &edge.to] {
            if endpoint != END && !names.contains(endpoint) {
                return Err(config_err(
                    task_type,
                    &format!("edge {} -> {} references unknown node '{}'", edge.from, edge.to, endpoint),
                ));
            }
        }
    }

    // Every domain node must be reachable from the supervisor entry.
    let reachable = reachable_from(supervisor.name(), &edges);
    for name in agents.keys() {
        if !reachable.contains(name.as_str()) {
            return Err(config_err(
                task_type,
                &format!("node '{}' is unreachable from the entry", name),
            ));
        }
    }

    // The supervisor may only route along declared edges.
    let supervisor_targets: HashSet<&str> = edges
        .iter()
        .filter(|e| e.from == supervisor.name())
        .map(|e| e.to.as_str())
        .collect();
    for target in supervisor.route_targets() {
        if !supervisor_targets.contains(target.as_str()) {
            return Err(config_err(
                task_type,
                &format!("supervisor can route to '{}' but no such edge is declared", target),
            ));
        }
    }

    // Field ownership: owners must be declared agents, and each agent's
    // output field must be declared as owned by that agent.
    let mut owners: HashMap<String, String> = HashMap::new();
    let mut input_fields: HashSet<String> = HashSet::new();
    for spec in &fields {
        match &spec.owner {
            Some(owner) => {
                if !agents.contains_key(owner) {
                    return Err(config_err(
                        task_type,
                        &format!("field '{}' is owned by unknown node '{}'", spec.name, owner),
                    ));
                }
                owners.insert(spec.name.clone(), owner.clone());
            }
            None => {
                input_fields.insert(spec.name.clone());
            }
        }
    }
    for agent in agents.values() {
        for field in agent.required_fields() {
            if !owners.contains_key(&field) && !input_fields.contains(&field) {
                return Err(config_err(
                    task_type,
                    &format!("agent '{}' requires undeclared field '{}'", agent.name(), field),
                ));
            }
        }
        let output = agent.output_field();
        match owners.get(output) {
            Some(owner) if owner == agent.name() => {}
            Some(owner) => {
                return Err(config_err(
                    task_type,
                    &format!(
                        "agent '{}' writes '{}' which is owned by '{}'",
                        agent.name(),
                        output,
                        owner
                    ),
                ));
            }
            None => {
                return Err(config_err(
                    task_type,
                    &format!("agent '{}' writes undeclared field '{}'", agent.name(), output),
                ));
            }
        }
    }

    Ok(CompiledGraph::new(
        task_type.to_string(),
        agents,
        supervisor,
        edges,
        owners,
        input_fields,
        checkpointer,
    ))
}

fn config_err(task_type: &str, message: &str) -> TesselError {
    TesselError::GraphConfig(format!("{}: {}", task_type, message))
}

fn reachable_from<'a>(entry: &'a str, edges: &'a [Edge]) -> HashSet<&'a str> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    seen.insert(entry);
    queue.push_back(entry);

    while let Some(current) = queue.pop_front() {
        for edge in edges.iter().filter(|e| e.from == current) {
            if edge.to != END && seen.insert(&edge.to) {
                queue.push_back(&edge.to);
            }
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use tessel_core::types::AgentOutcome;

    use crate::graph::hub_edges;
    use crate::supervisor::{Stage, StagedSupervisor};

    struct EchoAgent {
        name: &'static str,
        output: &'static str,
    }

    impl Agent for EchoAgent {
        fn name(&self) -> &str {
            self.name
        }

        fn output_field(&self) -> &str {
            self.output
        }

        fn process(&self, _state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>> {
            Box::pin(async { Ok(AgentOutcome::ok("echo")) })
        }
    }

    struct TestBuilder {
        nodes: Vec<GraphNode>,
        edges: Vec<Edge>,
        fields: Vec<FieldSpec>,
    }

    impl TestBuilder {
        fn valid() -> Self {
            Self {
                nodes: vec![
                    GraphNode::Supervisor(Arc::new(StagedSupervisor::new(
                        "supervisor",
                        vec![Stage::new("summary", "summarizer")],
                    ))),
                    GraphNode::Agent(Arc::new(EchoAgent {
                        name: "summarizer",
                        output: "summary",
                    })),
                ],
                edges: hub_edges("supervisor", &["summarizer"]),
                fields: vec![
                    FieldSpec::input("topic", true),
                    FieldSpec::output("summary", "summarizer"),
                ],
            }
        }
    }

    impl GraphBuilder for TestBuilder {
        fn task_type(&self) -> &str {
            "summary"
        }

        fn state_fields(&self) -> Vec<FieldSpec> {
            self.fields.clone()
        }

        fn nodes(&self) -> Vec<GraphNode> {
            self.nodes.clone()
        }

        fn edges(&self) -> Vec<Edge> {
            self.edges.clone()
        }

        fn result_field(&self) -> &str {
            "summary"
        }

        fn initial_state(&self, _inputs: &TaskInputs) -> Result<WorkflowState> {
            Ok(WorkflowState::new("summary", 1))
        }
    }

    #[test]
    fn test_valid_builder_compiles() {
        let graph = compile(&TestBuilder::valid(), None).unwrap();
        assert_eq!(graph.task_type(), "summary");
        let mut names = graph.node_names();
        names.sort();
        assert_eq!(names, vec!["summarizer", "supervisor"]);
    }

    #[test]
    fn test_missing_supervisor_rejected() {
        let mut builder = TestBuilder::valid();
        builder.nodes.remove(0);
        let err = compile(&builder, None).unwrap_err();
        assert!(err.to_string().contains("no node claims the supervisor role"));
    }

    #[test]
    fn test_two_supervisors_rejected() {
        let mut builder = TestBuilder::valid();
        builder.nodes.push(GraphNode::Supervisor(Arc::new(
            StagedSupervisor::new("second", vec![Stage::new("summary", "summarizer")]),
        )));
        let err = compile(&builder, None).unwrap_err();
        assert!(err.to_string().contains("more than one node"));
    }

    #[test]
    fn test_unknown_edge_endpoint_rejected() {
        let mut builder = TestBuilder::valid();
        builder.edges.push(Edge::new("supervisor", "phantom"));
        let err = compile(&builder, None).unwrap_err();
        assert!(err.to_string().contains("unknown node 'phantom'"));
    }

    #[test]
    fn test_unreachable_node_rejected() {
        let mut builder = TestBuilder::valid();
        builder.nodes.push(GraphNode::Agent(Arc::new(EchoAgent {
            name: "orphan",
            output: "orphan_out",
        })));
        builder.fields.push(FieldSpec::output("orphan_out", "orphan"));
        let err = compile(&builder, None).unwrap_err();
        assert!(err.to_string().contains("'orphan' is unreachable"));
    }

    #[test]
    fn test_undeclared_route_target_rejected() {
        let mut builder = TestBuilder::valid();
        // Supervisor routes to summarizer, but strip its edge
        builder.edges.retain(|e| e.to != "summarizer");
        let err = compile(&builder, None).unwrap_err();
        assert!(err.to_string().contains("no such edge is declared"));
    }

    #[test]
    fn test_foreign_output_field_rejected() {
        let mut builder = TestBuilder::valid();
        // Re-declare the summarizer's output as owned by someone else
        builder.fields = vec![FieldSpec::output("summary", "supervisor")];
        let err = compile(&builder, None).unwrap_err();
        assert!(err.to_string().contains("owned by"));
    }

    #[test]
    fn test_undeclared_output_field_rejected() {
        let mut builder = TestBuilder::valid();
        builder.fields = vec![FieldSpec::input("topic", true)];
        let err = compile(&builder, None).unwrap_err();
        assert!(err.to_string().contains("undeclared field 'summary'"));
    }
}
