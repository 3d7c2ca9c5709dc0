// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP repair provider speaking the chat-completions protocol.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::provider::{RepairOutcome, RepairProvider};
use crate::RepairError;

/// Language-model repair client over a chat-completions endpoint.
pub struct HttpRepairProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpRepairProvider {
    /// Build a provider for the given endpoint and model.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

#[async_trait]
impl RepairProvider for HttpRepairProvider {
    async fn repair(&self, broken: &str, schema: &Value) -> Result<RepairOutcome, RepairError> {
        let system = format!(
            "You repair malformed JSON. Return only the corrected JSON object, \
             no commentary. It must satisfy this JSON Schema: {}",
            serde_json::to_string(schema).unwrap_or_else(|_| "{}".into())
        );
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": broken},
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RepairError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RepairError::Protocol(format!(
                "provider returned HTTP {status}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RepairError::Protocol(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RepairError::Protocol("no choices in response".into()))?;

        debug!(tokens = parsed.usage.total_tokens, "repair call completed");
        Ok(RepairOutcome {
            text: choice.message.content,
            tokens: parsed.usage.total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chat_body(content: &str, tokens: u64) -> Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": tokens - 10, "total_tokens": tokens},
        })
    }

    #[tokio::test]
    async fn successful_repair_returns_text_and_actual_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(chat_body(r#"{"amount":1000}"#, 42)),
            )
            .mount(&server)
            .await;

        let provider = HttpRepairProvider::new(
            format!("{}/v1/chat/completions", server.uri()),
            "repair-model",
            "sk-test",
        );
        let out = provider
            .repair("{\"amount\":1000,", &json!({"type": "object"}))
            .await
            .unwrap();
        assert_eq!(out.text, r#"{"amount":1000}"#);
        assert_eq!(out.tokens, 42);
    }

    #[tokio::test]
    async fn provider_error_status_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = HttpRepairProvider::new(server.uri(), "m", "k");
        let err = provider.repair("{", &json!({})).await.unwrap_err();
        assert!(matches!(err, RepairError::Protocol(_)));
    }

    #[tokio::test]
    async fn empty_choices_is_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [],
                "usage": {"total_tokens": 5},
            })))
            .mount(&server)
            .await;

        let provider = HttpRepairProvider::new(server.uri(), "m", "k");
        let err = provider.repair("{", &json!({})).await.unwrap_err();
        assert!(matches!(err, RepairError::Protocol(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        // Port 1 is effectively never listening.
        let provider = HttpRepairProvider::new("http://127.0.0.1:1/v1", "m", "k");
        let err = provider.repair("{", &json!({})).await.unwrap_err();
        assert!(matches!(err, RepairError::Transport(_)));
    }
}
