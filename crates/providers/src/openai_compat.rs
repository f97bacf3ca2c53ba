//! OpenAI-compatible chat-completions gateway.
//!
//! Speaks `POST {base_url}/chat/completions` in both plain and SSE streaming
//! form. Works with GLM (`https://open.bigmodel.cn/api/paas/v4`), OpenAI,
//! OpenRouter, Ollama and any other endpoint exposing the same API.

use async_trait::async_trait;
use forgeloop_core::error::GatewayError;
use forgeloop_core::gateway::{FragmentStream, Gateway};
use forgeloop_core::message::{Role, Turn};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::sse::{SseDecoder, SseEvent};

pub struct OpenAiCompatGateway {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatGateway {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: None,
            client: Self::client(Duration::from_secs(60))?,
        })
    }

    /// GLM (Zhipu AI) endpoint.
    pub fn glm(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, GatewayError> {
        Self::new("glm", "https://open.bigmodel.cn/api/paas/v4", api_key, model)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Replace the HTTP client with one using the given request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        if let Ok(client) = Self::client(Duration::from_secs(secs)) {
            self.client = client;
        }
        self
    }

    fn client(timeout: Duration) -> Result<reqwest::Client, GatewayError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::NotConfigured(format!("HTTP client: {e}")))
    }

    fn to_api_messages(turns: &[Turn]) -> Vec<ApiMessage> {
        turns
            .iter()
            .map(|t| ApiMessage {
                role: match t.role {
                    Role::System => "system".into(),
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: t.content.clone(),
            })
            .collect()
    }

    fn request_body(&self, turns: &[Turn], temperature: f32, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(turns),
            "temperature": temperature,
            "stream": stream,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if stream {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(e.to_string())
            } else {
                GatewayError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        match status {
            200 => Ok(response),
            429 => Err(GatewayError::RateLimited { retry_after_secs: 5 }),
            401 | 403 => Err(GatewayError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            )),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Gateway returned error");
                Err(GatewayError::Api {
                    status_code: status,
                    message: error_body,
                })
            }
        }
    }
}

#[async_trait]
impl Gateway for OpenAiCompatGateway {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, turns: &[Turn], temperature: f32) -> Result<String, GatewayError> {
        debug!(
            gateway = %self.name,
            model = %self.model,
            turns = turns.len(),
            "Sending completion request"
        );

        let response = self.post(&self.request_body(turns, temperature, false), false).await?;

        let api_response: ApiResponse = response.json().await.map_err(|e| GatewayError::Api {
            status_code: 200,
            message: format!("Failed to parse response: {e}"),
        })?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Api {
                status_code: 200,
                message: "No choices in response".into(),
            })?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn complete_streaming(
        &self,
        turns: &[Turn],
        temperature: f32,
    ) -> Result<FragmentStream, GatewayError> {
        debug!(
            gateway = %self.name,
            model = %self.model,
            turns = turns.len(),
            "Sending streaming request"
        );

        let response = self.post(&self.request_body(turns, temperature, true), true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(chunk) = byte_stream.next().await {
                let bytes = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(GatewayError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    match event {
                        SseEvent::Delta(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseEvent::Done => return,
                    }
                }
            }

            // Body ended without `[DONE]` or a finish reason
            warn!("Stream closed before completion");
            let _ = tx
                .send(Err(GatewayError::StreamInterrupted(
                    "stream ended before completion".into(),
                )))
                .await;
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
