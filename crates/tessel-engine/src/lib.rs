pub mod agent;
pub mod checkpoint;
pub mod graph;
pub mod prompts;
pub mod registry;
pub mod runner;
pub mod state;
pub mod supervisor;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{Agent, ModelStep};
pub use checkpoint::{MemoryCheckpointer, SqliteCheckpointer};
pub use graph::{hub_edges, CompiledGraph, Edge, GraphBuilder, GraphNode, StepEvent};
pub use prompts::{FilePrompts, StaticPrompts};
pub use registry::TaskRegistry;
pub use runner::{BatchStatistics, TaskResult, TaskRunner};
pub use state::{FieldSpec, RevisionRecord, TaskInputs, WorkflowState};
pub use supervisor::{Decision, RevisionPolicy, Stage, StagedSupervisor, Supervisor, END};
pub use tasks::{register_builtin, RoleModels};
