use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{AgentMessage, AgentProvider};
use crate::integrations::IntegrationError;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Client for any OpenAI-compatible chat completions endpoint
#[derive(Clone)]
pub struct OpenAICompatibleClient {
    client: Client,
    endpoint: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAICompatibleClient {
    pub fn new(endpoint: &str, api_key: Option<&str>, model: Option<&str>) -> Result<Self, IntegrationError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        // Only add auth header if API key is provided and not empty
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| IntegrationError::InvalidInput(format!("Invalid API key format: {}", e)))?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| IntegrationError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            model: model.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MODEL).to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    fn build_request<'a>(&'a self, messages: &'a [AgentMessage]) -> OpenAICompletionRequest<'a> {
        OpenAICompletionRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: self.max_tokens,
        }
    }
}

fn parse_completion(response_text: &str) -> Result<String, IntegrationError> {
    let response_data: OpenAICompletionResponse = serde_json::from_str(response_text)
        .map_err(|e| IntegrationError::Decode(format!("Failed to parse completion: {}", e)))?;

    let choice = response_data
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| IntegrationError::Decode("Completion returned no choices".to_string()))?;

    log::info!(
        "[AGENT] Response - content_len: {}, finish_reason: {:?}",
        choice.message.content.as_ref().map(|c| c.len()).unwrap_or(0),
        choice.finish_reason
    );

    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait]
impl AgentProvider for OpenAICompatibleClient {
    async fn complete(&self, messages: Vec<AgentMessage>) -> Result<String, IntegrationError> {
        let request = self.build_request(&messages);

        log::info!(
            "[AGENT] Sending {} messages to {} with model {}",
            request.messages.len(),
            self.endpoint,
            self.model
        );

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<OpenAIErrorResponse>(&error_text) {
                return Err(IntegrationError::Upstream {
                    status: status.as_u16(),
                    body: error_response.error.message,
                });
            }
            return Err(IntegrationError::Upstream {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| IntegrationError::Transport(format!("Failed to read completion: {}", e)))?;

        log::debug!("[AGENT] Raw response:\n{}", response_text);
        parse_completion(&response_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MessageRole;

    #[test]
    fn test_request_serialization() {
        let client = OpenAICompatibleClient::new("http://localhost:1/v1/chat/completions", None, None).unwrap();
        let messages = vec![
            AgentMessage::system("be brief"),
            AgentMessage {
                role: MessageRole::User,
                content: "hi".to_string(),
            },
        ];
        let body = serde_json::to_value(client.build_request(&messages)).unwrap();

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_parse_completion() {
        let text = r#"{"choices":[{"message":{"role":"assistant","content":"Hello!"},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_completion(text).unwrap(), "Hello!");

        assert!(matches!(parse_completion(r#"{"choices":[]}"#), Err(IntegrationError::Decode(_))));
        assert!(parse_completion("not json").is_err());
    }
}
