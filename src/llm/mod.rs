pub mod client;
pub mod ollama;

pub use client::{
    ChunkStream, ModelClientBuilder, ModelError, ModelGateway, StreamChunk, collect_text,
    single_chunk_stream,
};
pub use ollama::{OllamaClient, OllamaOptions};

#[cfg(test)]
pub use client::MockModelGateway;
