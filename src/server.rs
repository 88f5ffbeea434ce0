//! HTTP boundary serving `GET /chat?prompt=...`.

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::FALLBACK_ANSWER;
use crate::cache::SingleFlight;
use crate::discovery::{OpenApiExecutorConfig, load_document, openapi_executor_with_document};
use crate::error::AgentError;
use crate::llm::{ModelGateway, collect_text};

/// Body written when an execution was cancelled before it answered.
pub const CANCELLED_NOTICE: &str = "The request was cancelled before an answer was produced.";

/// Failures of the chat service itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("HTTP server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared state of the chat service.
pub struct AppState {
    gateway: Arc<dyn ModelGateway>,
    client: Client,
    openapi_url: String,
    documents: SingleFlight<String, Arc<String>>,
    config: OpenApiExecutorConfig,
}

impl AppState {
    /// Creates the state; the document at `openapi_url` is loaded on first use.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        openapi_url: impl Into<String>,
        config: OpenApiExecutorConfig,
    ) -> Self {
        Self {
            gateway,
            client: Client::new(),
            openapi_url: openapi_url.into(),
            documents: SingleFlight::new(),
            config,
        }
    }

    /// The OpenAPI document, loaded once per process.
    async fn document(&self) -> Option<Arc<String>> {
        let loaded = self
            .documents
            .get_or_init(&self.openapi_url, || async {
                load_document(&self.client, &self.openapi_url).await.map(Arc::new)
            })
            .await;

        match loaded {
            Ok(document) => Some(document),
            Err(error) => {
                warn!(%error, "OpenAPI document unavailable");
                None
            }
        }
    }
}

/// Query string of `GET /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    prompt: Option<String>,
}

/// Builds the chat service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", get(chat_handler))
        .with_state(state)
}

/// Binds `addr` and serves the router until the listener fails.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, "Chat service listening");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Answers `prompt` as a plain-text body.
///
/// A missing or blank prompt is rejected with 400 and an executor that cannot
/// be built with 502. Dropping the body cancels the execution.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChatQuery>,
) -> Response {
    let prompt = match query.prompt.as_deref().map(str::trim) {
        Some(prompt) if !prompt.is_empty() => prompt.to_string(),
        _ => {
            warn!("Rejecting /chat request without a prompt");
            return (StatusCode::BAD_REQUEST, "prompt cannot be empty").into_response();
        }
    };
    info!(prompt_len = prompt.len(), "Received /chat request");

    let document = state.document().await;
    let executor = match openapi_executor_with_document(
        document.as_deref().map(String::as_str),
        state.gateway.clone(),
        state.config.clone(),
    ) {
        Ok(executor) => executor,
        Err(error) => return bad_gateway(error),
    };

    // Dropping the response body cancels the execution.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let answer = collect_text(executor.execute_with_cancel(prompt, cancel)).await;
        let _ = tx.send(answer);
    });

    let body = async_stream::stream! {
        let _guard = guard;
        let text = match rx.await {
            Ok(Ok(answer)) if answer.is_empty() => CANCELLED_NOTICE.to_string(),
            Ok(Ok(answer)) => answer,
            Ok(Err(error)) => {
                warn!(%error, "Answer stream was malformed");
                FALLBACK_ANSWER.to_string()
            }
            Err(_) => FALLBACK_ANSWER.to_string(),
        };
        debug!(answer_len = text.len(), "Writing answer");
        yield Ok::<_, Infallible>(Bytes::from(text));
    };

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

fn bad_gateway(error: AgentError) -> Response {
    error!(%error, "Could not start execution");
    (StatusCode::BAD_GATEWAY, error.to_string()).into_response()
}
