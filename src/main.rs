//! Command line entry point: ask a question, run a discovery, or serve `/chat`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use react_executor::discovery::{DiscoveryConfig, OpenApiDiscovery, OpenApiExecutorConfig};
use react_executor::llm::{ModelClientBuilder, collect_text};
use react_executor::server::{self, AppState};
use react_executor::{load_document, openapi_executor};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "react-executor",
    version,
    about = "Answers questions about an API from its OpenAPI document"
)]
struct Cli {
    /// Ollama base URL
    #[arg(long, env = "OLLAMA_BASE_URL")]
    ollama_url: Option<String>,

    /// Model name
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama2")]
    model: String,

    /// URL or file path of the OpenAPI document
    #[arg(long, env = "OPENAPI_URL")]
    openapi_url: String,

    #[arg(long, env = "MAX_ITERATIONS", default_value_t = 10)]
    max_iterations: usize,

    /// Bound on each model and tool call, in seconds
    #[arg(long)]
    call_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one question and print the answer
    Ask { question: String },
    /// Locate the operation that answers a question
    Discover {
        question: String,
        /// Also call the operation and summarise its response
        #[arg(long)]
        request: bool,
    },
    /// Serve GET /chat
    Serve {
        #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },
}

impl Cli {
    fn executor_config(&self) -> OpenApiExecutorConfig {
        let call_timeout = self.call_timeout.map(Duration::from_secs);
        OpenApiExecutorConfig {
            max_iterations: self.max_iterations,
            call_timeout,
            discovery: DiscoveryConfig {
                call_timeout,
                ..DiscoveryConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut builder = ModelClientBuilder::new().with_model(cli.model.clone());
    if let Some(url) = &cli.ollama_url {
        builder = builder.with_base_url(url.clone());
    }
    let gateway = builder.build_ollama().context("failed to create model client")?;
    info!(model = %cli.model, openapi_url = %cli.openapi_url, "Model client ready");

    let config = cli.executor_config();
    let client = Client::new();

    match cli.command {
        Command::Ask { question } => {
            let executor = openapi_executor(&client, &cli.openapi_url, gateway, config).await?;
            let answer = collect_text(executor.execute(question)).await?;
            println!("{}", answer);
        }
        Command::Discover { question, request } => {
            let document = load_document(&client, &cli.openapi_url).await?;
            let discovery = OpenApiDiscovery::from_json_str(&document, gateway, config.discovery)?;
            if request {
                let answer = collect_text(discovery.answer(&question, &client).await?).await?;
                println!("{}", answer);
            } else {
                let result = discovery.discover(&question).await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
        Command::Serve { bind } => {
            let state = AppState::new(gateway, cli.openapi_url, config);
            server::serve(bind, Arc::new(state)).await?;
        }
    }

    Ok(())
}
