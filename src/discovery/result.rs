use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AgentError;
use crate::tool::ToolError;

/// HTTP method of a discovered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestMethod {
    #[serde(alias = "get", alias = "Get")]
    Get,
    #[serde(alias = "post", alias = "Post")]
    Post,
}

impl RequestMethod {
    /// Maps an OpenAPI operation key (`get`, `post`) to a method.
    pub fn from_operation_key(key: &str) -> Option<Self> {
        if key.eq_ignore_ascii_case("get") {
            Some(Self::Get)
        } else if key.eq_ignore_ascii_case("post") {
            Some(Self::Post)
        } else {
            None
        }
    }

    fn as_method(self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Post => Method::POST,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// Connection details located in an OpenAPI document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    pub server_url: String,
    pub path: String,
    pub request_method: RequestMethod,
}

impl DiscoveryResult {
    /// Parses the JSON object carried by an `OpenAPI Output:` answer.
    ///
    /// Everything before the first `{` and after the last `}` is ignored.
    pub fn from_output(output: &str) -> Result<Self, AgentError> {
        let joined = output.lines().collect::<String>();
        let (start, end) = match (joined.find('{'), joined.rfind('}')) {
            (Some(start), Some(end)) if start < end => (start, end),
            _ => {
                return Err(AgentError::Parse(format!(
                    "no JSON object in discovery output: {}",
                    output
                )));
            }
        };

        serde_json::from_str(&joined[start..=end]).map_err(|e| {
            AgentError::Parse(format!(
                "malformed discovery output `{}`: {}",
                &joined[start..=end],
                e
            ))
        })
    }

    /// The full request URL.
    pub fn url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), self.path)
    }

    /// Issues the discovered request and returns the response body.
    pub async fn send(&self, client: &Client) -> Result<String, ToolError> {
        let response = client
            .request(self.request_method.as_method(), self.url())
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::post};

    #[test]
    fn test_output_with_surrounding_text() {
        let result = DiscoveryResult::from_output(
            "'{\"serverUrl\": \"http://api.test\",\n \"path\": \"/Weather\", \
             \"requestMethod\": \"get\"}' [/INST]",
        )
        .unwrap();

        assert_eq!(
            result,
            DiscoveryResult {
                server_url: "http://api.test".to_string(),
                path: "/Weather".to_string(),
                request_method: RequestMethod::Get,
            }
        );
        assert_eq!(result.url(), "http://api.test/Weather");
    }

    #[test]
    fn test_output_without_json_is_parse_error() {
        assert!(matches!(
            DiscoveryResult::from_output("I don't know."),
            Err(AgentError::Parse(_))
        ));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            DiscoveryResult::from_output("{\"serverUrl\": \"http://api.test\", \"path\": }"),
            Err(AgentError::Parse(_))
        ));
        assert!(matches!(
            DiscoveryResult::from_output(
                "{\"serverUrl\": \"http://api.test\", \"path\": \"/x\", \
                 \"requestMethod\": \"DELETE\"}"
            ),
            Err(AgentError::Parse(_))
        ));
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let result = DiscoveryResult {
            server_url: "http://api.test".to_string(),
            path: "/Weather".to_string(),
            request_method: RequestMethod::Post,
        };

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({
                "serverUrl": "http://api.test",
                "path": "/Weather",
                "requestMethod": "POST"
            })
        );
    }

    #[tokio::test]
    async fn test_send_uses_discovered_method() {
        let router = Router::new().route("/Orders", post(|| async { "created" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let result = DiscoveryResult {
            server_url: format!("http://{}/", addr),
            path: "/Orders".to_string(),
            request_method: RequestMethod::Post,
        };

        assert_eq!(result.send(&Client::new()).await.unwrap(), "created");

        let wrong_method = DiscoveryResult {
            request_method: RequestMethod::Get,
            ..result
        };
        assert!(matches!(
            wrong_method.send(&Client::new()).await,
            Err(ToolError::Http { status: 405 })
        ));
    }
}
