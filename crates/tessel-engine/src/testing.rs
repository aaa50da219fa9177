//! Scripted LLM client shared by the engine's test modules.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;

use tessel_core::config::ModelConfig;
use tessel_core::error::{Result, TesselError};
use tessel_core::traits::LlmClient;

pub(crate) enum ScriptStep {
    Text(String),
    Error(String),
    Hang,
}

/// Replays a fixed script of responses, one per `complete` call.
pub(crate) struct ScriptedClient {
    script: Mutex<VecDeque<ScriptStep>>,
}

impl ScriptedClient {
    pub(crate) fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    /// A script of plain text responses.
    pub(crate) fn text(responses: &[&str]) -> Self {
        Self::new(
            responses
                .iter()
                .map(|r| ScriptStep::Text(r.to_string()))
                .collect(),
        )
    }

    /// Fails every call with the given message.
    pub(crate) fn failing(message: &str) -> Self {
        Self::new(vec![ScriptStep::Error(message.to_string())])
    }

    /// Never completes; used for timeout tests.
    pub(crate) fn hanging() -> Self {
        Self::new(vec![ScriptStep::Hang])
    }
}

impl LlmClient for ScriptedClient {
    fn complete(
        &self,
        _config: &ModelConfig,
        _system_prompt: &str,
        _user_message: &str,
    ) -> BoxFuture<'_, Result<String>> {
        let step = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            match step {
                Some(ScriptStep::Text(text)) => Ok(text),
                Some(ScriptStep::Error(message)) => Err(TesselError::LlmRequest(message)),
                Some(ScriptStep::Hang) => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
                None => Err(TesselError::LlmRequest("script exhausted".to_string())),
            }
        })
    }
}
