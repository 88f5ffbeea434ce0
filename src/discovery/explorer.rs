//! JSON-pointer exploration of an in-memory document.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::result::{DiscoveryResult, RequestMethod};
use crate::tool::{Tool, ToolError};

/// Serialized size above which containers are summarised by their keys.
pub const DEFAULT_LARGE_VALUE_THRESHOLD: usize = 4000;

/// Outcome of recording a resolved value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visit {
    /// The value has not been produced before.
    New,
    /// The value equals the one already produced for `first_pointer`.
    Repeat { first_pointer: String },
}

/// Everything a pointer walk has resolved so far.
///
/// Values are compared structurally, so the same value reached through two
/// different pointers counts as a repeat.
#[derive(Debug, Default)]
pub struct WalkTrace {
    visited: Vec<(String, Value)>,
    server_url: Option<String>,
    path: Option<(String, RequestMethod)>,
}

impl WalkTrace {
    /// Creates an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the value resolved for `pointer`.
    pub fn record(&mut self, pointer: &str, value: &Value) -> Visit {
        if let Some((first_pointer, _)) = self.visited.iter().find(|(_, seen)| seen == value) {
            return Visit::Repeat {
                first_pointer: first_pointer.clone(),
            };
        }

        self.infer(pointer, value);
        self.visited.push((pointer.to_string(), value.clone()));
        Visit::New
    }

    /// Pointers resolved so far, in order.
    pub fn visited(&self) -> impl Iterator<Item = &str> {
        self.visited.iter().map(|(pointer, _)| pointer.as_str())
    }

    /// The connection details implied by the walk, once all are known.
    pub fn result(&self) -> Option<DiscoveryResult> {
        let server_url = self.server_url.clone()?;
        let (path, request_method) = self.path.clone()?;
        Some(DiscoveryResult {
            server_url,
            path,
            request_method,
        })
    }

    fn infer(&mut self, pointer: &str, value: &Value) {
        let segments = decode_pointer(pointer);
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();

        match segments.as_slice() {
            ["servers", rest @ ..] if self.server_url.is_none() => {
                self.server_url = server_url_in(rest.last().copied(), value);
            }
            ["paths", path] => {
                if let Some(method) = operation_method(value) {
                    self.path = Some((path.to_string(), method));
                }
            }
            ["paths", path, operation, ..] => {
                if let Some(method) = RequestMethod::from_operation_key(operation) {
                    self.path = Some((path.to_string(), method));
                }
            }
            _ => {}
        }
    }
}

fn server_url_in(last_segment: Option<&str>, value: &Value) -> Option<String> {
    let url_of = |item: &Value| item.get("url").and_then(Value::as_str).map(str::to_string);
    match value {
        Value::String(url) if last_segment == Some("url") => Some(url.clone()),
        Value::Object(_) => url_of(value),
        Value::Array(items) => items.iter().find_map(url_of),
        _ => None,
    }
}

fn operation_method(value: &Value) -> Option<RequestMethod> {
    let operations = value.as_object()?;
    [RequestMethod::Get, RequestMethod::Post]
        .into_iter()
        .find(|method| {
            operations
                .keys()
                .any(|key| RequestMethod::from_operation_key(key) == Some(*method))
        })
}

/// Splits an RFC 6901 pointer into unescaped reference tokens.
pub fn decode_pointer(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .split('/')
        .skip(1)
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Normalises the pointer text a model supplies.
pub fn normalize_pointer(input: &str) -> String {
    let cleaned = input
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim();

    if cleaned.is_empty()
        || cleaned.eq_ignore_ascii_case("none")
        || cleaned.eq_ignore_ascii_case("empty string")
    {
        String::new()
    } else if cleaned.starts_with('/') {
        cleaned.to_string()
    } else {
        format!("/{}", cleaned)
    }
}

/// Lists keys or returns values of a JSON document addressed by pointer.
pub struct JsonListKeysTool {
    document: Arc<Value>,
    trace: Arc<Mutex<WalkTrace>>,
    large_value_threshold: usize,
}

impl JsonListKeysTool {
    /// Creates a tool over `document` that records every resolved value in `trace`.
    pub fn new(document: Arc<Value>, trace: Arc<Mutex<WalkTrace>>) -> Self {
        Self {
            document,
            trace,
            large_value_threshold: DEFAULT_LARGE_VALUE_THRESHOLD,
        }
    }

    /// Sets the serialized size above which only keys are returned.
    pub fn with_large_value_threshold(mut self, threshold: usize) -> Self {
        self.large_value_threshold = threshold;
        self
    }
}

#[async_trait]
impl Tool for JsonListKeysTool {
    fn name(&self) -> &str {
        "json_list_keys"
    }

    fn description(&self) -> &str {
        "Can be used to list the keys or read the value at a given path \
         in the OpenAPI JSON document. \
         The input is a JSON pointer (e.g. /servers/0/url), \
         escaping '/' inside a key as ~1 and '~' as ~0. \
         Start with an empty string to see the top level keys."
    }

    async fn execute(&self, input: Option<&str>) -> Result<String, ToolError> {
        let pointer = normalize_pointer(input.unwrap_or_default());
        debug!(%pointer, "Resolving JSON pointer");

        let value = match self.document.pointer(&pointer) {
            None | Some(Value::Null) => {
                return Err(ToolError::ExecutionFailed(format!(
                    "No value at `{}`. Go back to the previous key, \
                     look at the available keys and try a different one.",
                    pointer
                )));
            }
            Some(value) => value,
        };

        if let Visit::Repeat { first_pointer } = self.trace.lock().await.record(&pointer, value) {
            debug!(%pointer, %first_pointer, "Value already seen");
            return Err(ToolError::Converged { pointer });
        }

        let serialized = value.to_string();
        let keys: Option<Vec<String>> = match value {
            Value::Object(map) => Some(map.keys().cloned().collect()),
            Value::Array(items) => Some((0..items.len()).map(|i| i.to_string()).collect()),
            _ => None,
        };

        match keys {
            Some(keys) if serialized.len() > self.large_value_threshold => Ok(format!(
                "Value is a large dictionary, should explore its keys directly. Keys: {}",
                keys.join(", ")
            )),
            _ => Ok(serialized),
        }
    }
}
