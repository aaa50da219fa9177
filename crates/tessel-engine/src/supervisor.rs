use tracing::debug;

use crate::state::WorkflowState;

/// Terminal sentinel: routing here ends the run.
pub const END: &str = "__end__";

/// A routing decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Execute the named node next.
    Route(String),
    /// The run is over; no further nodes execute.
    Finish,
}

/// The router: inspects state, selects the next node or terminates.
/// Never performs domain work itself, and its decisions do not count as
/// node executions.
pub trait Supervisor: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Every node this supervisor may ever route to, for build-time
    /// validation against the declared edge list.
    fn route_targets(&self) -> Vec<String>;

    /// Select the next node. Exactly one of `completed`, `error`, or a live
    /// `next_agent` holds on the state after this returns.
    fn decide(&self, state: &mut WorkflowState) -> Decision;
}

/// One pipeline stage: a field and the node that produces it.
#[derive(Debug, Clone)]
pub struct Stage {
    pub field: String,
    pub node: String,
}

impl Stage {
    pub fn new(field: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            node: node.into(),
        }
    }
}

/// The bounded revise-and-recheck cycle between a writer and its reviewer.
#[derive(Debug, Clone)]
pub struct RevisionPolicy {
    /// Node re-executed on a failed quality gate.
    pub writer: String,
    /// Review field cleared so the recheck stage re-fires.
    pub review_field: String,
    /// Reviews scoring at or above this pass the gate.
    pub pass_threshold: f64,
}

/// Deterministic decision-table supervisor.
///
/// Routes to the first stage whose field is still empty; once every stage
/// has produced output, applies the quality gate and either spends one
/// revision cycle or finishes. Exhausting the revision budget finishes the
/// run as completed: a best-effort artifact is data, not failure.
pub struct StagedSupervisor {
    name: String,
    stages: Vec<Stage>,
    revision: Option<RevisionPolicy>,
}

impl StagedSupervisor {
    pub fn new(name: impl Into<String>, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            stages,
            revision: None,
        }
    }

    pub fn with_revision(mut self, policy: RevisionPolicy) -> Self {
        self.revision = Some(policy);
        self
    }

    fn route(&self, state: &mut WorkflowState, node: &str, reason: &str) -> Decision {
        state.next_agent = Some(node.to_string());
        state.record(self.name.as_str(), format!("routing to {}: {}", node, reason));
        debug!(supervisor = %self.name, node, reason, "Routing decision");
        Decision::Route(node.to_string())
    }
}

impl Supervisor for StagedSupervisor {
    fn name(&self) -> &str {
        &self.name
    }

    fn route_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.stages.iter().map(|s| s.node.clone()).collect();
        if let Some(rev) = &self.revision {
            if !targets.contains(&rev.writer) {
                targets.push(rev.writer.clone());
            }
        }
        targets
    }

    fn decide(&self, state: &mut WorkflowState) -> Decision {
        // Rule 1: a failed node is terminal; no further domain work.
        if let Some(error) = &state.error {
            let error = error.clone();
            state.next_agent = None;
            state.record(self.name.as_str(), format!("terminating on error: {}", error));
            return Decision::Finish;
        }

        // Rules 2..n: first unfilled stage wins. The ordering guarantees a
        // node's upstream fields exist before it runs.
        for stage in &self.stages {
            if !state.filled(&stage.field) {
                return self.route(state, &stage.node, &format!("'{}' is empty", stage.field));
            }
        }

        // Quality gate: one revision cycle per iteration, bounded.
        if let Some(rev) = &self.revision {
            if state.quality_score < rev.pass_threshold && state.iteration < state.max_iterations {
                state.iteration += 1;
                state.clear_field(&rev.review_field);
                let reason = format!(
                    "quality {:.1} below {:.1}, revision {}/{}",
                    state.quality_score, rev.pass_threshold, state.iteration, state.max_iterations
                );
                return self.route(state, &rev.writer, &reason);
            }
        }

        // Below-threshold output after an exhausted budget still completes
        // with the best available artifact.
        state.completed = true;
        state.next_agent = None;
        state.record(
            self.name.as_str(),
            format!("workflow complete, quality {:.1}", state.quality_score),
        );
        Decision::Finish
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testcase_supervisor() -> StagedSupervisor {
        StagedSupervisor::new(
            "supervisor",
            vec![
                Stage::new("analysis", "analyzer"),
                Stage::new("test_points", "designer"),
                Stage::new("test_cases", "writer"),
                Stage::new("review_result", "reviewer"),
            ],
        )
        .with_revision(RevisionPolicy {
            writer: "writer".to_string(),
            review_field: "review_result".to_string(),
            pass_threshold: 80.0,
        })
    }

    fn filled_state() -> WorkflowState {
        let mut state = WorkflowState::new("testcase", 2);
        state.set_field("analysis", serde_json::json!("a"));
        state.set_field("test_points", serde_json::json!("p"));
        state.set_field("test_cases", serde_json::json!("c"));
        state.set_field("review_result", serde_json::json!("{}"));
        state
    }

    #[test]
    fn test_routes_stages_in_order() {
        let sup = testcase_supervisor();
        let mut state = WorkflowState::new("testcase", 2);

        assert_eq!(sup.decide(&mut state), Decision::Route("analyzer".into()));
        assert_eq!(state.next_agent.as_deref(), Some("analyzer"));

        state.set_field("analysis", serde_json::json!("a"));
        assert_eq!(sup.decide(&mut state), Decision::Route("designer".into()));

        state.set_field("test_points", serde_json::json!("p"));
        assert_eq!(sup.decide(&mut state), Decision::Route("writer".into()));

        state.set_field("test_cases", serde_json::json!("c"));
        assert_eq!(sup.decide(&mut state), Decision::Route("reviewer".into()));
    }

    #[test]
    fn test_error_terminates_immediately() {
        let sup = testcase_supervisor();
        let mut state = WorkflowState::new("testcase", 2);
        state.fail("model exploded");

        assert_eq!(sup.decide(&mut state), Decision::Finish);
        assert!(!state.completed);
        assert!(state.next_agent.is_none());
    }

    #[test]
    fn test_quality_gate_spends_revision() {
        let sup = testcase_supervisor();
        let mut state = filled_state();
        state.quality_score = 55.0;

        assert_eq!(sup.decide(&mut state), Decision::Route("writer".into()));
        assert_eq!(state.iteration, 1);
        // Review cleared so the recheck stage fires again after the rewrite
        assert!(!state.filled("review_result"));
        assert!(!state.completed);
    }

    #[test]
    fn test_passing_score_completes() {
        let sup = testcase_supervisor();
        let mut state = filled_state();
        state.quality_score = 91.0;

        assert_eq!(sup.decide(&mut state), Decision::Finish);
        assert!(state.completed);
        assert_eq!(state.iteration, 0);
        assert!(state.next_agent.is_none());
    }

    #[test]
    fn test_budget_exhaustion_completes_best_effort() {
        let sup = testcase_supervisor();
        let mut state = filled_state();
        state.quality_score = 55.0;
        state.iteration = state.max_iterations;

        assert_eq!(sup.decide(&mut state), Decision::Finish);
        assert!(state.completed);
        // Low score is data, not failure
        assert!(state.error.is_none());
        assert_eq!(state.quality_score, 55.0);
    }

    #[test]
    fn test_exactly_one_terminal_condition_after_decide() {
        let sup = testcase_supervisor();

        for (score, error, iteration) in [(91.0, None, 0), (55.0, None, 2), (0.0, Some("x"), 0)] {
            let mut state = filled_state();
            state.quality_score = score;
            state.iteration = iteration;
            if let Some(e) = error {
                state.fail(e);
            }
            sup.decide(&mut state);

            let live_route = state.next_agent.is_some();
            let conditions =
                [state.completed, state.error.is_some(), live_route].iter().filter(|c| **c).count();
            assert_eq!(conditions, 1);
        }
    }

    #[test]
    fn test_route_targets_cover_stages_and_writer() {
        let sup = testcase_supervisor();
        let targets = sup.route_targets();
        assert_eq!(targets, vec!["analyzer", "designer", "writer", "reviewer"]);
    }
}
