use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::agent::{DiscoveryConfig, OpenApiDiscovery, OpenApiDiscoveryTool};
use crate::agent::{Executor, ExecutorConfig};
use crate::error::AgentError;
use crate::llm::ModelGateway;
use crate::tool::{DateTool, DynTool, HttpRequestTool};

/// Placed in the prompt instead of the document when it cannot be loaded.
pub const DOCUMENT_UNAVAILABLE: &str = "Unable to fetch OpenAPI document. \
    Please reply to the user that you cannot answer their question at this time.";

const OPENAPI_DESCRIPTION: &str = "\
    You are an agent designed to answer questions by making web requests to an API given its \
    OpenAPI document.\n\
    \n\
    If the question does not appear to be related to the OpenAPI document, return I don't \
    know. Do not make up an answer.\n\
    If the question involves dates, do not make up dates. Use the current date as the date \
    for today, ignore any time component.\n\
    Do not use any server URL you have existing knowledge of. Only use information provided \
    by the tools to construct your response.\n\
    \n\
    Take the following steps:\n\
    First, decide if the question is related to the OpenAPI document. If it is not, reply \
    with I don't know.\n\
    Second, decide if the question requires knowing the current date. If it does, use the \
    'current_date' tool.\n\
    Third, find the server URL, the path and the request method needed to answer the \
    question. The 'open_api' tool can find them for you.\n\
    Fourth, find the parameters the request needs. Always reference a date in the format \
    'YYYY-mm-DD'.\n\
    Fifth, make the HTTP request needed to answer the question with the 'http_request' tool.\n\
    Sixth, summarize the JSON response based on the user's input without adding information \
    that is not present in it. This is the final answer.\n\
    \n\
    Use the exact parameter names listed in the document. If you get a not found error, \
    ensure that you are using a path that exists in the document.\n\
    Hint: The server url is usually located under the 'servers' json key.\n\
    Do not return answers using a special format (i.e. markdown). Use plain text responses \
    only.\n\
    \n\
    The OpenAPI document is as follows:\n\
    \n";

/// Settings of an executor that answers questions against an OpenAPI document.
#[derive(Debug, Clone)]
pub struct OpenApiExecutorConfig {
    pub max_iterations: usize,
    pub call_timeout: Option<Duration>,
    /// Settings of the nested `open_api` tool
    pub discovery: DiscoveryConfig,
}

impl Default for OpenApiExecutorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            call_timeout: None,
            discovery: DiscoveryConfig::default(),
        }
    }
}

/// Reads an OpenAPI document from an `http(s)` URL or a local file.
pub async fn load_document(client: &Client, location: &str) -> Result<String, AgentError> {
    let unavailable =
        |reason: String| AgentError::Discovery(format!("cannot load `{}`: {}", location, reason));

    if location.starts_with("http://") || location.starts_with("https://") {
        let response = client
            .get(location)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("status {}", status)));
        }
        response.text().await.map_err(|e| unavailable(e.to_string()))
    } else {
        tokio::fs::read_to_string(location)
            .await
            .map_err(|e| unavailable(e.to_string()))
    }
}

/// Loads the document at `location` and builds an executor over it.
///
/// A document that cannot be loaded does not fail construction; the prompt
/// then tells the model to apologise instead.
pub async fn openapi_executor(
    client: &Client,
    location: &str,
    gateway: Arc<dyn ModelGateway>,
    config: OpenApiExecutorConfig,
) -> Result<Executor, AgentError> {
    let document = match load_document(client, location).await {
        Ok(document) => Some(document),
        Err(error) => {
            warn!(%error, "OpenAPI document unavailable");
            None
        }
    };
    openapi_executor_with_document(document.as_deref(), gateway, config)
}

/// Builds an executor whose prompt embeds `document`.
///
/// The `open_api` tool is only offered when the document is valid JSON.
pub fn openapi_executor_with_document(
    document: Option<&str>,
    gateway: Arc<dyn ModelGateway>,
    config: OpenApiExecutorConfig,
) -> Result<Executor, AgentError> {
    let mut tools: Vec<DynTool> = vec![Arc::new(DateTool), Arc::new(HttpRequestTool::new())];

    match document.map(serde_json::from_str::<Value>) {
        Some(Ok(parsed)) => {
            let discovery =
                OpenApiDiscovery::new(parsed, gateway.clone(), config.discovery.clone());
            tools.push(Arc::new(OpenApiDiscoveryTool::new(Arc::new(discovery))));
        }
        Some(Err(error)) => debug!(%error, "Document is not JSON, open_api tool disabled"),
        None => {}
    }

    let description = format!(
        "{}{}\n",
        OPENAPI_DESCRIPTION,
        document.unwrap_or(DOCUMENT_UNAVAILABLE)
    );
    let executor_config = ExecutorConfig {
        max_iterations: config.max_iterations,
        call_timeout: config.call_timeout,
        ..ExecutorConfig::new(description)
    };

    Executor::new(tools, gateway, executor_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModelGateway, collect_text, single_chunk_stream};
    use std::io::Write;

    const DOCUMENT: &str =
        r#"{"servers": [{"url": "http://api.test"}], "paths": {"/Weather": {"get": {}}}}"#;

    fn answering(check: fn(&str) -> bool, answer: &'static str) -> Arc<dyn ModelGateway> {
        let mut gateway = MockModelGateway::new();
        gateway
            .expect_submit()
            .times(1)
            .withf(move |prompt: &str| check(prompt))
            .returning(move |_| Ok(single_chunk_stream(answer)));
        Arc::new(gateway)
    }

    #[tokio::test]
    async fn test_load_document_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOCUMENT.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let document = load_document(&Client::new(), &path).await.unwrap();
        assert_eq!(document, DOCUMENT);
    }

    #[tokio::test]
    async fn test_load_missing_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");

        let result = load_document(&Client::new(), path.to_str().unwrap()).await;
        assert!(matches!(result, Err(AgentError::Discovery(_))));
    }

    #[tokio::test]
    async fn test_prompt_embeds_document_and_tools() {
        let gateway = answering(
            |prompt| {
                prompt.contains("\"/Weather\"")
                    && prompt.contains("should be one of [current_date, http_request, open_api]")
            },
            "Final Answer: I don't know.",
        );
        let executor = openapi_executor_with_document(
            Some(DOCUMENT),
            gateway,
            OpenApiExecutorConfig::default(),
        )
        .unwrap();

        assert_eq!(collect_text(executor.execute("q")).await.unwrap(), "I don't know.");
    }

    #[tokio::test]
    async fn test_unavailable_document_embeds_notice() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("absent.json");
        let gateway = answering(
            |prompt| {
                prompt.contains(DOCUMENT_UNAVAILABLE)
                    && prompt.contains("should be one of [current_date, http_request]")
            },
            "Final Answer: I cannot answer at this time.",
        );

        let executor = openapi_executor(
            &Client::new(),
            location.to_str().unwrap(),
            gateway,
            OpenApiExecutorConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(
            collect_text(executor.execute("q")).await.unwrap(),
            "I cannot answer at this time."
        );
    }
}
