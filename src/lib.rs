//! # ReAct Executor
//!
//! Drives a streaming text-completion model through the Thought / Action /
//! Observation protocol to answer questions with tools.
//!
//! ## Features
//!
//! - **Executor**: bounded reason-act-observe loop over an append-only transcript
//! - **Tool System**: `http_request`, `current_date` and custom tools via the [`Tool`] trait
//! - **OpenAPI Discovery**: a nested agent that walks an OpenAPI document by JSON pointer
//! - **Ollama Integration**: streaming `/api/generate` gateway
//! - **Chat Service**: `GET /chat?prompt=...` over axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use react_executor::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = ModelClientBuilder::new()
//!         .with_model("llama2")
//!         .build_ollama()?;
//!
//!     let tools: Vec<DynTool> = vec![Arc::new(DateTool), Arc::new(HttpRequestTool::new())];
//!     let executor = Executor::new(
//!         tools,
//!         gateway,
//!         ExecutorConfig::new("You are a helpful assistant."),
//!     )?;
//!
//!     let answer = collect_text(executor.execute("What is today's date?")).await?;
//!     println!("{}", answer);
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cache;
pub mod discovery;
pub mod error;
pub mod llm;
pub mod server;
pub mod tool;

// Re-exports for convenient usage
pub use agent::{
    Executor, ExecutorConfig, FALLBACK_ANSWER, ParsedResponse, ParsedStep, ParsingStrategy,
    ResponseParser,
};
pub use cache::SingleFlight;
pub use discovery::{
    DiscoveryResult, OpenApiDiscovery, OpenApiDiscoveryTool, RequestMethod, load_document,
    openapi_executor,
};
pub use error::AgentError;
pub use llm::{
    ChunkStream, ModelClientBuilder, ModelError, ModelGateway, OllamaClient, StreamChunk,
    collect_text,
};
pub use tool::{
    DateTool, DynTool, HttpRequestTool, Observation, Tool, ToolError, ToolErrorPolicy,
    ToolRegistry,
};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::agent::{Executor, ExecutorConfig};
    pub use crate::error::AgentError;
    pub use crate::llm::{ModelClientBuilder, ModelGateway, collect_text};
    pub use crate::tool::{DateTool, DynTool, HttpRequestTool, Tool, ToolError};
    pub use std::sync::Arc;
}
