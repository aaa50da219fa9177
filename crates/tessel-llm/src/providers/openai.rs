use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use tessel_core::config::ModelConfig;
use tessel_core::error::{Result, TesselError};
use tessel_core::traits::LlmClient;

use super::base_url_for;

/// OpenAI-compatible chat-completions client. Works with OpenAI, DeepSeek,
/// SiliconFlow, Ollama, vLLM, and anything else speaking the same dialect.
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OaiMessage {
    role: String,
    content: String,
}

// Response types
#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmClient for OpenAiClient {
    fn complete(
        &self,
        config: &ModelConfig,
        system_prompt: &str,
        user_message: &str,
    ) -> BoxFuture<'_, Result<String>> {
        let base = config
            .base_url
            .clone()
            .unwrap_or_else(|| base_url_for(&config.provider).to_string());
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));
        let api_key = config.api_key.clone().unwrap_or_default();

        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(OaiMessage {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            });
        }
        messages.push(OaiMessage {
            role: "user".to_string(),
            content: user_message.to_string(),
        });

        let request = ChatRequest {
            model: config.model_id.clone(),
            messages,
            max_tokens: config.max_tokens,
            temperature: Some(config.temperature),
            stream: false,
        };

        Box::pin(async move {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| TesselError::LlmRequest(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(TesselError::LlmRequest(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    body
                )));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| TesselError::LlmParse(e.to_string()))?;

            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| TesselError::LlmParse("response contained no choices".to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "deepseek-ai/DeepSeek-V3".to_string(),
            messages: vec![
                OaiMessage {
                    role: "system".to_string(),
                    content: "You are a test designer.".to_string(),
                },
                OaiMessage {
                    role: "user".to_string(),
                    content: "Login form".to_string(),
                },
            ],
            max_tokens: 4096,
            temperature: Some(0.0),
            stream: false,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "deepseek-ai/DeepSeek-V3");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hello"));
    }

    #[test]
    fn test_response_parsing_empty_choices() {
        let parsed: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.choices.is_empty());
    }
}
