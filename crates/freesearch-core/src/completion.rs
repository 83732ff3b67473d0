//! External completion capability
//!
//! The summarize tool forwards its rendered prompt to whatever implements
//! [`CompletionProvider`]. The bundled implementation talks to any
//! OpenAI-compatible `/chat/completions` endpoint.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::CompletionSettings;
use crate::error::{CoreError, CoreResult};

const MAX_TOKENS: u32 = 500;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete a single text prompt into plain text
    async fn complete(&self, prompt: &str) -> CoreResult<String>;
}

pub struct ChatCompletionClient {
    client: reqwest::Client,
    settings: CompletionSettings,
}

impl ChatCompletionClient {
    pub fn new(settings: CompletionSettings) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::CompletionFailed(e.to_string()))?;

        Ok(Self { client, settings })
    }
}

#[async_trait]
impl CompletionProvider for ChatCompletionClient {
    async fn complete(&self, prompt: &str) -> CoreResult<String> {
        let url = format!(
            "{}/chat/completions",
            self.settings.api_url.trim_end_matches('/')
        );
        let request_body = serde_json::json!({
            "model": self.settings.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "max_tokens": MAX_TOKENS,
        });

        debug!("Completion request to {}", url);

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request_body);
        if let Some(ref key) = self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CoreError::CompletionFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Completion API error {}: {}", status, body);
            return Err(CoreError::CompletionFailed(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::CompletionFailed(e.to_string()))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                CoreError::CompletionFailed("response had no message content".to_string())
            })?
            .to_string();

        info!("Completion received ({} chars)", text.len());
        Ok(text)
    }
}

impl std::fmt::Debug for ChatCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionClient")
            .field("api_url", &self.settings.api_url)
            .field("model", &self.settings.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(url: String, key: Option<&str>) -> CompletionSettings {
        CompletionSettings {
            api_url: url,
            api_key: key.map(str::to_string),
            model: "test-model".to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({"model": "test-model"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Cats are great."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client =
            ChatCompletionClient::new(settings(format!("{}/v1", server.uri()), Some("secret")))
                .unwrap();
        let text = client.complete("Summarize cats").await.unwrap();
        assert_eq!(text, "Cats are great.");
    }

    #[tokio::test]
    async fn test_error_status_is_completion_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(settings(server.uri(), None)).unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert_eq!(err.kind(), "CompletionFailed");
        assert!(err.to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn test_missing_content_is_completion_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let client = ChatCompletionClient::new(settings(server.uri(), None)).unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert_eq!(err.kind(), "CompletionFailed");
    }
}
