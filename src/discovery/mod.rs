//! Locating API operations in OpenAPI documents.

pub mod agent;
pub mod executor;
pub mod explorer;
pub mod result;

pub use agent::{DiscoveryConfig, OPENAPI_OUTPUT_MARKER, OpenApiDiscovery, OpenApiDiscoveryTool};
pub use executor::{
    DOCUMENT_UNAVAILABLE, OpenApiExecutorConfig, load_document, openapi_executor,
    openapi_executor_with_document,
};
pub use explorer::{JsonListKeysTool, Visit, WalkTrace};
pub use result::{DiscoveryResult, RequestMethod};
