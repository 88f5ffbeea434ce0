pub mod date;
pub mod dispatcher;
pub mod http;
pub mod registry;

pub use date::DateTool;
pub use dispatcher::{Observation, ToolDispatcher, ToolErrorPolicy};
pub use http::{HttpRequestTool, extract_url};
pub use registry::ToolRegistry;
pub use tool_trait::{DynTool, Tool};
pub use tool_types::{ToolDefinition, ToolError};

mod tool_types {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    /// Name and description of a tool, as embedded into prompts.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ToolDefinition {
        /// The name of the tool, used verbatim as the action token
        pub name: String,
        /// Text shown next to the name
        pub description: String,
    }

    /// Failures of a single tool invocation.
    #[derive(Debug, thiserror::Error)]
    pub enum ToolError {
        #[error("Invalid arguments: {0}")]
        InvalidArguments(String),
        #[error("Invalid URL: no URL found in `{0}`")]
        InvalidUrl(String),
        #[error("HTTP Request failed with status code {status}")]
        Http { status: u16 },
        #[error("Execution failed: {0}")]
        ExecutionFailed(String),
        #[error("Tool timed out after {0:?}")]
        Timeout(Duration),
        /// The tool has stopped producing new information and asks the loop to end.
        #[error("No new information at `{pointer}`")]
        Converged { pointer: String },
    }
}

mod tool_trait {
    use super::tool_types::{ToolDefinition, ToolError};
    use async_trait::async_trait;
    use std::sync::Arc;

    /// An action the model can request by name.
    #[async_trait]
    pub trait Tool: Send + Sync {
        /// The action token the model writes after `Action:`.
        fn name(&self) -> &str;
        /// Shown next to the name in the prompt's tool list.
        fn description(&self) -> &str;

        /// Executes the tool with the text the model supplied as its input.
        async fn execute(&self, input: Option<&str>) -> Result<String, ToolError>;

        /// The name and description as embedded into prompts.
        fn to_definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
            }
        }
    }

    /// A shared, type-erased tool.
    pub type DynTool = Arc<dyn Tool>;
}
