//! The OpenAPI discovery sub-agent.
//!
//! A nested [`Executor`] walks the document with [`JsonListKeysTool`] until the
//! model reports the server URL, path and method of the operation that answers
//! the question.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::explorer::{DEFAULT_LARGE_VALUE_THRESHOLD, JsonListKeysTool, WalkTrace};
use super::result::DiscoveryResult;
use crate::agent::{Executor, ExecutorConfig, FINAL_ANSWER_MARKER};
use crate::error::AgentError;
use crate::llm::{ChunkStream, ModelGateway};
use crate::tool::{DynTool, HttpRequestTool, Tool, ToolError};

/// Marker introducing the discovered connection details.
pub const OPENAPI_OUTPUT_MARKER: &str = "OpenAPI Output:";

const DISCOVERY_DESCRIPTION: &str = "You are an agent designed to answer questions by getting \
    connection details from an OpenAPI JSON document. \
    You should only use the tools below to explore the document, \
    and only use the information returned by them. \
    Walk the document one key at a time with JSON pointers, \
    starting from the empty string for the top level keys. \
    A key that contains '/' must be written with ~1 in the pointer, \
    so the path /Weather is requested as /paths/~1Weather. \
    If a key returns nothing, go back one key and choose another. \
    Always look up the server URL under /servers and the path and method under /paths \
    before giving the output. \
    Do not repeat a request you already made.";

const DISCOVERY_OUTPUT_DIRECTIONS: &str = "When you know the server URL, the path and the request \
    method, reply on a single line with:\n\
    OpenAPI Output: {\"serverUrl\": \"<server url>\", \"path\": \"<path>\", \
    \"requestMethod\": \"<GET or POST>\"}";

/// Settings of the discovery sub-agent.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum number of pointer lookups
    pub max_iterations: usize,
    /// Serialized size above which containers are summarised by their keys
    pub large_value_threshold: usize,
    /// Whether the sub-agent may also issue GET requests
    pub allow_http: bool,
    /// Optional bound on each model and lookup call
    pub call_timeout: Option<Duration>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            large_value_threshold: DEFAULT_LARGE_VALUE_THRESHOLD,
            allow_http: false,
            call_timeout: None,
        }
    }
}

/// Finds connection details in an OpenAPI document held in memory.
pub struct OpenApiDiscovery {
    document: Arc<Value>,
    gateway: Arc<dyn ModelGateway>,
    config: DiscoveryConfig,
}

impl OpenApiDiscovery {
    /// Creates a discovery over an already parsed document.
    pub fn new(document: Value, gateway: Arc<dyn ModelGateway>, config: DiscoveryConfig) -> Self {
        Self {
            document: Arc::new(document),
            gateway,
            config,
        }
    }

    /// Parses `json` as the document.
    pub fn from_json_str(
        json: &str,
        gateway: Arc<dyn ModelGateway>,
        config: DiscoveryConfig,
    ) -> Result<Self, AgentError> {
        Ok(Self::new(serde_json::from_str(json)?, gateway, config))
    }

    /// Returns the document being walked.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Locates the operation that answers `question`.
    ///
    /// An `OpenAPI Output:` answer from the model is taken as is. When the walk
    /// stops early, because a lookup produced nothing new or the iteration
    /// bound was reached, the details inferred from the visited pointers are
    /// returned if they are complete.
    pub async fn discover(&self, question: &str) -> Result<DiscoveryResult, AgentError> {
        self.discover_with_cancel(question, &CancellationToken::new()).await
    }

    /// Same as [`discover`](Self::discover), stopping early when `cancel` fires.
    pub async fn discover_with_cancel(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<DiscoveryResult, AgentError> {
        let trace = Arc::new(Mutex::new(WalkTrace::new()));
        let executor = self.executor(trace.clone())?;

        match executor.run(question, cancel).await {
            Ok(output) => {
                let result = DiscoveryResult::from_output(&output)?;
                info!(url = %result.url(), method = %result.request_method, "Discovered operation");
                Ok(result)
            }
            Err(
                error @ (AgentError::Converged { .. } | AgentError::IterationsExhausted { .. }),
            ) => {
                let trace = trace.lock().await;
                debug!(visited = ?trace.visited().collect::<Vec<_>>(), "Walk stopped early");
                trace.result().ok_or_else(|| {
                    warn!(%error, "Walk stopped before the operation was located");
                    AgentError::Discovery(error.to_string())
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Discovers the operation, calls it and asks the model to answer
    /// `question` from the response.
    pub async fn answer(
        &self,
        question: &str,
        client: &Client,
    ) -> Result<ChunkStream, AgentError> {
        let result = self.discover(question).await?;
        let body = result
            .send(client)
            .await
            .map_err(|source| AgentError::ToolExecution {
                tool: result.url(),
                source,
            })?;
        debug!(body_len = body.len(), "Operation responded");

        Ok(self.gateway.submit(&summary_prompt(question, &body)).await?)
    }

    fn executor(&self, trace: Arc<Mutex<WalkTrace>>) -> Result<Executor, AgentError> {
        let mut tools: Vec<DynTool> = vec![Arc::new(
            JsonListKeysTool::new(self.document.clone(), trace)
                .with_large_value_threshold(self.config.large_value_threshold),
        )];
        if self.config.allow_http {
            tools.push(Arc::new(HttpRequestTool::new()));
        }

        let config = ExecutorConfig {
            output_directions: Some(DISCOVERY_OUTPUT_DIRECTIONS.to_string()),
            max_iterations: self.config.max_iterations,
            final_markers: vec![
                OPENAPI_OUTPUT_MARKER.to_string(),
                FINAL_ANSWER_MARKER.to_string(),
            ],
            call_timeout: self.config.call_timeout,
            ..ExecutorConfig::new(DISCOVERY_DESCRIPTION)
        };

        Executor::new(tools, self.gateway.clone(), config)
    }
}

fn summary_prompt(question: &str, body: &str) -> String {
    format!(
        "<s>[INST] Answer the question using only the API response below. \
         Respond in the simplest manner possible and do not mention the API.\n\
         \n\
         API response: {body}\n\
         \n\
         Question: {question} [/INST]\n"
    )
}

/// Exposes [`OpenApiDiscovery`] to an outer executor as the `open_api` tool.
pub struct OpenApiDiscoveryTool {
    discovery: Arc<OpenApiDiscovery>,
}

impl OpenApiDiscoveryTool {
    /// Wraps `discovery` so the outer executor can call it by name.
    pub fn new(discovery: Arc<OpenApiDiscovery>) -> Self {
        Self { discovery }
    }
}

#[async_trait]
impl Tool for OpenApiDiscoveryTool {
    fn name(&self) -> &str {
        "open_api"
    }

    fn description(&self) -> &str {
        "Useful to find the server URL, path and request method of the API operation \
         that answers a question. \
         The input is the question. Returns JSON with serverUrl, path and requestMethod."
    }

    async fn execute(&self, input: Option<&str>) -> Result<String, ToolError> {
        let question = input
            .map(str::trim)
            .filter(|question| !question.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("a question is required".to_string()))?;

        let result = self
            .discovery
            .discover(question)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        serde_json::to_string(&result).map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}
