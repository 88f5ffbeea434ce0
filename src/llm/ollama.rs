use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use super::{ChunkStream, ModelError, ModelGateway};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Sampling options sent with every generate request.
#[derive(Debug, Clone)]
pub struct OllamaOptions {
    /// The model name (e.g., "llama2")
    pub model: String,
    /// Temperature for sampling
    pub temperature: f32,
    /// Top-k sampling
    pub top_k: u32,
    /// Top-p sampling
    pub top_p: f32,
}

impl Default for OllamaOptions {
    fn default() -> Self {
        Self {
            model: "llama2".to_string(),
            temperature: 0.0,
            top_k: 20,
            top_p: 0.3,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
}

/// A model gateway for Ollama's `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    options: OllamaOptions,
}

impl OllamaClient {
    /// Creates a new Ollama client.
    pub fn new(
        base_url: Option<String>,
        options: OllamaOptions,
        timeout: Option<Duration>,
    ) -> Result<Self, ModelError> {
        let mut client_builder = Client::builder();

        if let Some(timeout) = timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder.build()?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            options,
        })
    }

    /// Returns the configured model name.
    pub fn model(&self) -> &str {
        &self.options.model
    }
}

#[async_trait]
impl ModelGateway for OllamaClient {
    async fn submit(&self, prompt: &str) -> Result<ChunkStream, ModelError> {
        let body = GenerateRequest {
            model: &self.options.model,
            prompt,
            stream: true,
            options: GenerateOptions {
                temperature: self.options.temperature,
                top_k: self.options.top_k,
                top_p: self.options.top_p,
            },
        };

        debug!(
            model = %self.options.model,
            prompt_len = prompt.len(),
            "Submitting prompt to Ollama"
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(ModelError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ModelError::NetworkError));

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::collect_text;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::Value;

    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_submit_forwards_prompt_and_streams_frames() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "llama2");
                assert_eq!(body["stream"], true);
                assert_eq!(body["options"]["top_k"], 20);
                let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
                format!(
                    "{{\"response\":\"echo: \",\"done\":false}}\n\
                     {{\"response\":{},\"done\":true}}\n",
                    serde_json::to_string(&prompt).unwrap()
                )
            }),
        );
        let base_url = spawn_backend(router).await;

        let client = OllamaClient::new(Some(base_url), OllamaOptions::default(), None).unwrap();
        let stream = client.submit("What is the weather?").await.unwrap();

        assert_eq!(
            collect_text(stream).await.unwrap(),
            "echo: What is the weather?"
        );
    }

    #[tokio::test]
    async fn test_submit_reports_backend_status() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::NOT_FOUND, "model not found") }),
        );
        let base_url = spawn_backend(router).await;

        let client = OllamaClient::new(Some(base_url), OllamaOptions::default(), None).unwrap();
        let result = client.submit("hi").await;

        match result {
            Err(ModelError::ApiError { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "model not found");
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }
}
