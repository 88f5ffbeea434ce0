use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

use super::ollama::{OllamaClient, OllamaOptions};

/// One frame of the streaming completion format.
///
/// Frames are JSON objects carrying a partial (or full) piece of text and a
/// flag marking the last frame of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// The text carried by this frame
    #[serde(default)]
    pub response: String,
    /// Whether this is the final frame
    #[serde(default)]
    pub done: bool,
}

impl StreamChunk {
    /// Creates the terminating frame for a fully resolved text.
    pub fn done(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            done: true,
        }
    }

    /// Encodes the frame as a newline-free JSON object.
    pub fn encode(&self) -> Bytes {
        Bytes::from(
            serde_json::json!({
                "response": self.response,
                "done": self.done,
            })
            .to_string(),
        )
    }
}

/// A lazy stream of framed byte chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ModelError>> + Send>>;

/// Errors that can occur when communicating with the model backend.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The backend answered with a non-success status
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },
    /// A network error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    /// The stream framing from the backend was invalid
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The backend did not finish in time
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),
}

impl ModelError {
    fn from_codec(error: LinesCodecError) -> Self {
        match error {
            LinesCodecError::MaxLineLengthExceeded => {
                ModelError::InvalidResponse("stream frame exceeds maximum length".to_string())
            }
            LinesCodecError::Io(error) => {
                let kind = error.kind();
                match error.into_inner() {
                    Some(inner) => match inner.downcast::<ModelError>() {
                        Ok(model_error) => *model_error,
                        Err(other) => ModelError::InvalidResponse(other.to_string()),
                    },
                    None => ModelError::InvalidResponse(format!("stream read failed: {kind}")),
                }
            }
        }
    }
}

/// Abstraction over a streaming text-completion backend.
///
/// The gateway only forwards bytes; decoding the frames is the caller's job
/// (see [`collect_text`]).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Submits a prompt and returns the backend's framed token stream.
    async fn submit(&self, prompt: &str) -> Result<ChunkStream, ModelError>;
}

/// Decodes a framed stream and concatenates its text fields.
///
/// Frames are newline-delimited; a frame may be split across byte chunks and
/// a chunk may carry several frames. Decoding stops at the first frame with
/// `done` set.
pub async fn collect_text(stream: ChunkStream) -> Result<String, ModelError> {
    let reader = StreamReader::new(stream.map(|chunk| chunk.map_err(io::Error::other)));
    let mut frames = FramedRead::new(reader, LinesCodec::new());
    let mut text = String::new();

    while let Some(frame) = frames.next().await {
        let frame = frame.map_err(ModelError::from_codec)?;
        let frame = frame.trim();
        if frame.is_empty() {
            continue;
        }

        let chunk: StreamChunk = serde_json::from_str(frame)
            .map_err(|e| ModelError::InvalidResponse(format!("{}: {}", e, frame)))?;
        text.push_str(&chunk.response);

        if chunk.done {
            break;
        }
    }

    Ok(text)
}

/// Wraps a resolved text into a stream of exactly one terminating frame.
pub fn single_chunk_stream(text: impl Into<String>) -> ChunkStream {
    let frame = StreamChunk::done(text).encode();
    Box::pin(stream::once(async move { Ok(frame) }))
}

/// A builder for creating model gateways.
#[derive(Debug, Default)]
pub struct ModelClientBuilder {
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    top_k: Option<u32>,
    top_p: Option<f32>,
    timeout: Option<Duration>,
}

impl ModelClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets top-k sampling.
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Sets top-p sampling.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Sets the timeout of the underlying HTTP client.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates an Ollama client.
    pub fn build_ollama(self) -> Result<Arc<dyn ModelGateway>, ModelError> {
        let defaults = OllamaOptions::default();
        let options = OllamaOptions {
            model: self.model.unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            top_p: self.top_p.unwrap_or(defaults.top_p),
        };

        let base_url = self
            .base_url
            .or_else(|| std::env::var("OLLAMA_BASE_URL").ok());

        Ok(Arc::new(OllamaClient::new(base_url, options, self.timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn byte_stream(chunks: Vec<&'static str>) -> ChunkStream {
        Box::pin(stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        ))
    }

    #[tokio::test]
    async fn test_collect_text_joins_frames_split_across_chunks() {
        let stream = byte_stream(vec![
            "{\"response\":\"Hel",
            "lo\",\"done\":false}\n{\"response\":\" wor\",\"done\":false}\n",
            "{\"response\":\"ld\",\"done\":true}\n",
        ]);

        let text = collect_text(stream).await.unwrap();
        assert_eq!(text, "Hello world");
    }

    #[tokio::test]
    async fn test_collect_text_stops_at_done() {
        let stream = byte_stream(vec![
            "{\"response\":\"a\",\"done\":true}\n",
            "{\"response\":\"ignored\",\"done\":false}\n",
        ]);

        assert_eq!(collect_text(stream).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_collect_text_rejects_malformed_frame() {
        let stream = byte_stream(vec!["not json\n"]);

        let result = collect_text(stream).await;
        assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_collect_text_surfaces_stream_error() {
        let stream: ChunkStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from_static(b"{\"response\":\"a\",")),
            Err(ModelError::InvalidResponse("connection reset".to_string())),
        ]));

        let error = collect_text(stream).await.unwrap_err();
        assert!(error.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_single_chunk_stream_is_one_done_frame() {
        let mut stream = single_chunk_stream("final");
        let frame = stream.next().await.unwrap().unwrap();
        assert!(stream.next().await.is_none());

        let chunk: StreamChunk = serde_json::from_slice(&frame).unwrap();
        assert_eq!(chunk, StreamChunk::done("final"));
        assert!(!frame.contains(&b'\n'));
    }
}
