use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use tracing::debug;

use super::{Tool, ToolError};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s'"|\\^~\[\]`<>#%{}]+"#).expect("URL pattern is valid")
});

/// Extracts the first URL from free text.
///
/// Quoting and markdown characters terminate the URL, so inputs such as
/// `"http://x.test/a"` or `` `http://x.test/a` `` yield the bare URL.
pub fn extract_url(input: &str) -> Result<String, ToolError> {
    URL_PATTERN
        .find(input)
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| ToolError::InvalidUrl(input.to_string()))
}

/// Performs HTTP GET requests against a URL found in the tool input.
#[derive(Debug, Clone)]
pub struct HttpRequestTool {
    client: Client,
}

impl HttpRequestTool {
    /// Creates a tool with a default HTTP client.
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Creates a tool sharing an existing HTTP client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpRequestTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "A portal to the internet. Always use this tool when you need to get specific content \
         from a website (i.e. HTTP GET Request). Input should be a url. Here is an example input \
         to this tool: \"http://www.weather.com/forecastdata\". \
         Do not include the HTTP method in the input (i.e. GET or POST); \
         this tool handles GET requests only. \
         Ensure the URL is complete, including the 'http://' or 'https://' prefix. \
         The final answer to the question being asked is the Observation (i.e. output) \
         from this tool."
    }

    async fn execute(&self, input: Option<&str>) -> Result<String, ToolError> {
        let url = extract_url(input.unwrap_or_default())?;
        debug!(%url, "HTTP GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Http {
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}
