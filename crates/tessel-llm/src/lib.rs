pub mod providers;
pub mod retry;

use tessel_core::config::ModelConfig;
use tessel_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client for the given model configuration.
///
/// Every supported provider speaks the OpenAI chat-completions dialect;
/// the provider name only selects the preset base URL at request time.
pub fn create_client(_config: &ModelConfig) -> Box<dyn LlmClient> {
    Box::new(OpenAiClient::new())
}

/// Create a client that retries the primary model and falls back to the
/// given alternatives, using the primary's retry settings.
pub fn create_resilient_client(
    primary: &ModelConfig,
    fallbacks: &[ModelConfig],
) -> Box<dyn LlmClient> {
    let retry = primary.retry.clone().unwrap_or_default();
    let fallback_clients = fallbacks
        .iter()
        .map(|c| (c.clone(), create_client(c)))
        .collect();
    Box::new(RetryingClient::new(
        create_client(primary),
        fallback_clients,
        retry,
    ))
}
