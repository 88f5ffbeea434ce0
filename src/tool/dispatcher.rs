use std::time::Duration;
use tracing::{debug, warn};

use crate::agent::ParsedStep;
use crate::error::AgentError;
use crate::tool::{ToolError, ToolRegistry};

/// What the loop does when a tool's own execution fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolErrorPolicy {
    /// Record the failure as an explanatory observation and keep looping.
    #[default]
    Continue,
    /// End the execution; the caller receives the fallback apology.
    Abort,
}

/// The textual result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// The tool that produced the observation
    pub tool_name: String,
    /// The output, or a description of the failure
    pub output: String,
    /// Whether the tool failed
    pub is_error: bool,
}

impl Observation {
    fn success(tool_name: &str, output: String) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            output,
            is_error: false,
        }
    }

    fn failure(tool_name: &str, error: &ToolError) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            output: format!("Error: {}", error),
            is_error: true,
        }
    }
}

/// Resolves parsed steps to tools and invokes them.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
    policy: ToolErrorPolicy,
    timeout: Option<Duration>,
}

impl ToolDispatcher {
    /// Creates a new dispatcher over the given registry.
    pub fn new(registry: ToolRegistry, policy: ToolErrorPolicy) -> Self {
        Self {
            registry,
            policy,
            timeout: None,
        }
    }

    /// Bounds every tool call by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes a single parsed step.
    ///
    /// An unknown tool name is always fatal. A failing tool is handled
    /// according to the dispatcher's [`ToolErrorPolicy`], except for
    /// [`ToolError::Converged`], which always ends the loop.
    pub async fn dispatch(&self, step: &ParsedStep) -> Result<Observation, AgentError> {
        let tool = self
            .registry
            .get(&step.tool_name)
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound(step.tool_name.clone()))?;

        let input = (!step.raw_input.is_empty()).then_some(step.raw_input.as_str());
        debug!(tool = %step.tool_name, input = ?input, "Dispatching tool");

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, tool.execute(input))
                .await
                .unwrap_or_else(|_| Err(ToolError::Timeout(limit))),
            None => tool.execute(input).await,
        };

        match result {
            Ok(output) => Ok(Observation::success(&step.tool_name, output)),
            Err(ToolError::Converged { pointer }) => Err(AgentError::Converged { pointer }),
            Err(error) => match self.policy {
                ToolErrorPolicy::Continue => {
                    warn!(tool = %step.tool_name, %error, "Tool failed, continuing");
                    Ok(Observation::failure(&step.tool_name, &error))
                }
                ToolErrorPolicy::Abort => Err(AgentError::ToolExecution {
                    tool: step.tool_name.clone(),
                    source: error,
                }),
            },
        }
    }
}
