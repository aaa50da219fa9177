use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use tessel_core::error::{Result, TesselError};
use tessel_core::traits::Checkpointer;

use crate::graph::StepEvent;
use crate::registry::TaskRegistry;
use crate::state::{TaskInputs, WorkflowState};

/// What a finished (or failed) run reports to the caller. Serializable for
/// transport; the full state rides along so callers can inspect whatever
/// artifacts were produced before a failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    pub state: WorkflowState,
    /// The task's primary artifact, when produced.
    pub output: Option<String>,
    pub error: Option<String>,
}

impl TaskResult {
    fn from_state(state: WorkflowState, result_field: &str) -> Self {
        let success = state.completed && state.error.is_none();
        let output = state.field_str(result_field).map(str::to_string);
        let error = state.error.clone();
        Self {
            success,
            state,
            output,
            error,
        }
    }
}

/// Aggregate numbers over a batch of runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub average_score: f64,
}

/// Convenience driver: creates initial state, fetches the compiled graph
/// from the registry, and drives it to completion.
pub struct TaskRunner {
    registry: Arc<TaskRegistry>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl TaskRunner {
    pub fn new(registry: Arc<TaskRegistry>) -> Self {
        Self {
            registry,
            checkpointer: None,
        }
    }

    /// Attach a checkpoint store; runs become resumable and every applied
    /// step is persisted.
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Drive one run to completion.
    ///
    /// `UnknownTaskType` and graph-config errors surface here, before any
    /// state exists. Run-level failures come back as an unsuccessful
    /// [`TaskResult`] carrying the partial state.
    pub async fn arun(&self, task_type: &str, inputs: TaskInputs) -> Result<TaskResult> {
        self.arun_with(task_type, inputs, CancellationToken::new()).await
    }

    /// `arun` with caller-controlled cancellation.
    pub async fn arun_with(
        &self,
        task_type: &str,
        inputs: TaskInputs,
        cancel: CancellationToken,
    ) -> Result<TaskResult> {
        let builder = self.registry.builder(task_type)?;
        let graph = self
            .registry
            .get_graph(task_type, self.checkpointer.clone(), true)?;
        let state = builder.initial_state(&inputs)?;

        let final_state = graph.run(state, &cancel).await;
        Ok(TaskResult::from_state(final_state, builder.result_field()))
    }

    /// Blocking convenience over [`arun`] for non-async callers. Returns an
    /// error when called from inside a tokio runtime.
    pub fn run(&self, task_type: &str, inputs: TaskInputs) -> Result<TaskResult> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(TesselError::Config(
                "TaskRunner::run called from inside an async runtime; use arun".to_string(),
            ));
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TesselError::Config(e.to_string()))?;
        runtime.block_on(self.arun(task_type, inputs))
    }

    /// Step-by-step drive mode: yields after every node execution and every
    /// non-terminal routing decision. Finite, bounded by the iteration
    /// budget; a fresh call re-creates initial state.
    pub fn stream(
        &self,
        task_type: &str,
        inputs: TaskInputs,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, StepEvent>> {
        let builder = self.registry.builder(task_type)?;
        let graph = self
            .registry
            .get_graph(task_type, self.checkpointer.clone(), true)?;
        let state = builder.initial_state(&inputs)?;
        Ok(graph.stream(state, cancel))
    }

    /// Run many inputs with bounded concurrency. Per-item failures (e.g. a
    /// missing required input) are reported in place; one bad item never
    /// aborts the batch.
    pub async fn run_batch(
        &self,
        task_type: &str,
        inputs_list: Vec<TaskInputs>,
        max_concurrent: usize,
    ) -> Vec<Result<TaskResult>> {
        let total = inputs_list.len();
        info!(task = task_type, total, max_concurrent, "Starting batch run");

        let results: Vec<Result<TaskResult>> = futures::stream::iter(inputs_list)
            .map(|inputs| self.arun(task_type, inputs))
            .buffered(max_concurrent.max(1))
            .collect()
            .await;

        let succeeded = results
            .iter()
            .filter(|r| r.as_ref().map(|t| t.success).unwrap_or(false))
            .count();
        info!(task = task_type, total, succeeded, "Batch run finished");
        results
    }

    /// Aggregate a batch's outcomes.
    pub fn batch_statistics(results: &[Result<TaskResult>]) -> BatchStatistics {
        let total = results.len();
        let succeeded = results
            .iter()
            .filter(|r| r.as_ref().map(|t| t.success).unwrap_or(false))
            .count();
        let failed = total - succeeded;
        let success_rate = if total > 0 {
            succeeded as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let scores: Vec<f64> = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter(|t| t.success)
            .map(|t| t.state.quality_score)
            .collect();
        let average_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        BatchStatistics {
            total,
            succeeded,
            failed,
            success_rate,
            average_score,
        }
    }
}
