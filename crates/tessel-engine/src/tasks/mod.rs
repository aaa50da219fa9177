//! Built-in workflow shapes: requirement → test cases, natural language →
//! SQL, and natural language → API request.

pub mod api_request;
pub mod review;
pub mod sql;
pub mod testcase;

use std::collections::HashMap;
use std::sync::Arc;

use tessel_core::config::{EngineConfig, ModelConfig};
use tessel_core::traits::{LlmClient, PromptSource};

pub use api_request::ApiRequestGraphBuilder;
pub use review::{parse_review, ReviewAgent, ReviewVerdict};
pub use sql::SqlGraphBuilder;
pub use testcase::TestCaseGraphBuilder;

use crate::registry::TaskRegistry;

/// Per-role model routing: one default model, optionally overridden for
/// individual agent roles (e.g. a stronger reviewer model).
#[derive(Clone)]
pub struct RoleModels {
    default: ModelConfig,
    overrides: HashMap<String, ModelConfig>,
}

impl RoleModels {
    /// Use one model for every role.
    pub fn uniform(model: ModelConfig) -> Self {
        Self {
            default: model,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, role: impl Into<String>, model: ModelConfig) -> Self {
        self.overrides.insert(role.into(), model);
        self
    }

    pub fn for_role(&self, role: &str) -> ModelConfig {
        self.overrides.get(role).cloned().unwrap_or_else(|| self.default.clone())
    }
}

/// Register every built-in workflow on a registry.
pub fn register_builtin(
    registry: &TaskRegistry,
    llm: Arc<dyn LlmClient>,
    prompts: Arc<dyn PromptSource>,
    models: RoleModels,
    engine: EngineConfig,
) {
    registry.register(Arc::new(TestCaseGraphBuilder::new(
        Arc::clone(&llm),
        Arc::clone(&prompts),
        models.clone(),
        engine.clone(),
    )));
    registry.register(Arc::new(SqlGraphBuilder::new(
        Arc::clone(&llm),
        Arc::clone(&prompts),
        models.clone(),
        engine.clone(),
    )));
    registry.register(Arc::new(ApiRequestGraphBuilder::new(
        llm, prompts, models, engine,
    )));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_models_override() {
        let mut strong = ModelConfig::default();
        strong.model_id = "deepseek-ai/DeepSeek-R1".to_string();

        let models = RoleModels::uniform(ModelConfig::default()).with_override("reviewer", strong);
        assert_eq!(models.for_role("writer").model_id, "deepseek-ai/DeepSeek-V3");
        assert_eq!(models.for_role("reviewer").model_id, "deepseek-ai/DeepSeek-R1");
    }
}
