//! Error types for the executor.

use thiserror::Error;

use crate::llm::ModelError;
use crate::tool::ToolError;

/// Unified error type of an execution.
///
/// [`crate::agent::Executor::execute`] never surfaces these; they are turned
/// into the fallback answer. [`crate::agent::Executor::run`] returns them.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model backend failed or sent malformed framing
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// No action and no final answer could be extracted
    #[error("No action or final answer in response: {0}")]
    Parse(String),

    /// The model asked for a tool that is not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A tool failed under the abort policy
    #[error("Tool `{tool}` failed: {source}")]
    ToolExecution { tool: String, source: ToolError },

    /// A tool reported that it has nothing new to offer
    #[error("Converged at `{pointer}` without new information")]
    Converged { pointer: String },

    /// The iteration bound was reached without a final answer
    #[error("Max iterations exceeded ({iterations})")]
    IterationsExhausted { iterations: usize },

    /// The OpenAPI discovery could not determine its result
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// The executor was constructed with invalid settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The execution was cancelled by its caller
    #[error("Execution cancelled")]
    Cancelled,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
