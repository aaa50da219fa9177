use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use tessel_core::error::{Result, TesselError};
use tessel_core::traits::Checkpointer;

use crate::graph::{CompiledGraph, GraphBuilder};

/// Maps task types to graph builders and caches compiled graphs.
///
/// An explicit value constructed once at process start and passed by
/// reference; registration is a plain map insert, with no hidden global
/// state.
pub struct TaskRegistry {
    builders: RwLock<HashMap<String, Arc<dyn GraphBuilder>>>,
    graphs: RwLock<HashMap<String, Arc<CompiledGraph>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            builders: RwLock::new(HashMap::new()),
            graphs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a builder. Re-registration overwrites and warns; it is not
    /// an error (hot-reload replaces builders in place).
    pub fn register(&self, builder: Arc<dyn GraphBuilder>) {
        let task_type = builder.task_type().to_string();
        let mut builders = self.builders.write().unwrap_or_else(|e| e.into_inner());
        if builders.insert(task_type.clone(), builder).is_some() {
            warn!(task = %task_type, "Task type re-registered, previous builder replaced");
        } else {
            debug!(task = %task_type, "Task type registered");
        }
    }

    /// Look up the builder for a task type.
    pub fn builder(&self, task_type: &str) -> Result<Arc<dyn GraphBuilder>> {
        self.builders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(task_type)
            .cloned()
            .ok_or_else(|| TesselError::UnknownTaskType(task_type.to_string()))
    }

    /// Fetch (or compile) the graph for a task type.
    ///
    /// The cache key includes the checkpoint store's identity, so callers
    /// with different persistence backends never share a graph instance.
    pub fn get_graph(
        &self,
        task_type: &str,
        checkpointer: Option<Arc<dyn Checkpointer>>,
        use_cache: bool,
    ) -> Result<Arc<CompiledGraph>> {
        let key = format!(
            "{}::{}",
            task_type,
            checkpointer.as_ref().map_or_else(|| "none".to_string(), |c| c.identity())
        );

        if use_cache {
            let graphs = self.graphs.read().unwrap_or_else(|e| e.into_inner());
            if let Some(graph) = graphs.get(&key) {
                return Ok(Arc::clone(graph));
            }
        }

        let builder = self.builder(task_type)?;
        let graph = Arc::new(builder.build(checkpointer)?);

        if use_cache {
            let mut graphs = self.graphs.write().unwrap_or_else(|e| e.into_inner());
            // A racing caller may have compiled first; keep the existing
            // instance so repeated calls return the same graph.
            let entry = graphs.entry(key).or_insert_with(|| Arc::clone(&graph));
            return Ok(Arc::clone(entry));
        }

        Ok(graph)
    }

    /// Registered task types, sorted for stable discovery output.
    pub fn list_tasks(&self) -> Vec<String> {
        let mut tasks: Vec<String> = self
            .builders
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        tasks.sort();
        tasks
    }

    /// Drop all compiled graphs; the next `get_graph` recompiles (used
    /// after hot-reloading prompts or builders).
    pub fn clear_cache(&self) {
        self.graphs.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}
