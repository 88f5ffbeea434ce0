use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::agent::parser::{
    FINAL_ANSWER_MARKER, ParsedResponse, ParsedStep, ParsingStrategy, ResponseParser,
};
use crate::agent::prompt::{PromptBuilder, Transcript};
use crate::error::AgentError;
use crate::llm::{ChunkStream, ModelError, ModelGateway, StreamChunk, collect_text};
use crate::tool::{DynTool, ToolDefinition, ToolDispatcher, ToolErrorPolicy, ToolRegistry};

/// Answer returned whenever an execution cannot produce one of its own.
pub const FALLBACK_ANSWER: &str = "Sorry, I am not able to answer the question at this time.";

/// Configuration for one executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Role and task description placed at the top of the prompt
    pub description: String,
    /// Extra directions about the shape of the answer
    pub output_directions: Option<String>,
    /// Maximum number of model turns that end in a dispatch
    pub max_iterations: usize,
    /// How actions are located in model responses
    pub parsing_strategy: ParsingStrategy,
    /// What happens when a tool fails
    pub tool_error_policy: ToolErrorPolicy,
    /// Markers that introduce the final answer
    pub final_markers: Vec<String>,
    /// Optional bound on each model call and each tool call
    pub call_timeout: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            output_directions: None,
            max_iterations: 10,
            parsing_strategy: ParsingStrategy::default(),
            tool_error_policy: ToolErrorPolicy::default(),
            final_markers: vec![FINAL_ANSWER_MARKER.to_string()],
            call_timeout: None,
        }
    }
}

impl ExecutorConfig {
    /// Creates a configuration with the given description and defaults otherwise.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }
}

enum LoopState {
    BuildingPrompt,
    AwaitingModel(String),
    Parsing(String),
    Dispatching(ParsedStep),
}

/// Drives the Thought / Action / Observation protocol for one question at a time.
#[derive(Clone)]
pub struct Executor {
    gateway: Arc<dyn ModelGateway>,
    dispatcher: Arc<ToolDispatcher>,
    parser: ResponseParser,
    prompt: PromptBuilder,
    config: Arc<ExecutorConfig>,
}

impl Executor {
    /// Creates a new executor.
    ///
    /// When two tools share a name the later one is used, both for dispatch
    /// and in the prompt.
    pub fn new(
        tools: Vec<DynTool>,
        gateway: Arc<dyn ModelGateway>,
        config: ExecutorConfig,
    ) -> Result<Self, AgentError> {
        if config.max_iterations == 0 {
            return Err(AgentError::InvalidConfig(
                "max_iterations must be greater than zero".to_string(),
            ));
        }

        let mut definitions: Vec<ToolDefinition> = Vec::with_capacity(tools.len());
        for tool in &tools {
            let definition = tool.to_definition();
            match definitions.iter_mut().find(|d| d.name == definition.name) {
                Some(existing) => *existing = definition,
                None => definitions.push(definition),
            }
        }

        let tool_names = definitions.iter().map(|d| d.name.clone()).collect();
        let parser = ResponseParser::new(config.parsing_strategy, tool_names)
            .with_final_markers(config.final_markers.clone());
        let prompt = PromptBuilder::new(
            config.description.clone(),
            config.output_directions.clone(),
            definitions,
        );
        let dispatcher =
            ToolDispatcher::new(ToolRegistry::from_tools(tools), config.tool_error_policy)
                .with_timeout(config.call_timeout);

        Ok(Self {
            gateway,
            dispatcher: Arc::new(dispatcher),
            parser,
            prompt,
            config: Arc::new(config),
        })
    }

    /// Returns the executor's configuration.
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Answers `question`, surfacing the reason when no answer is produced.
    pub async fn run(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let execution_id = Uuid::new_v4();
        let span = info_span!("execute", %execution_id);

        async {
            info!(max_iterations = self.config.max_iterations, "Starting execution");
            let outcome = self.run_loop(question, cancel).await;
            match &outcome {
                Ok(answer) => info!(answer_len = answer.len(), "Final answer produced"),
                Err(error) => warn!(%error, "Execution ended without an answer"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    /// Answers `question` as a framed stream.
    ///
    /// The stream always carries exactly one terminating frame: the answer,
    /// or [`FALLBACK_ANSWER`] when the execution failed.
    pub fn execute(&self, question: impl Into<String>) -> ChunkStream {
        self.execute_with_cancel(question, CancellationToken::new())
    }

    /// Like [`Executor::execute`], but stops when `cancel` fires.
    ///
    /// A cancelled execution yields a terminating frame with an empty
    /// response; substituting a notice is up to the caller.
    pub fn execute_with_cancel(
        &self,
        question: impl Into<String>,
        cancel: CancellationToken,
    ) -> ChunkStream {
        let executor = self.clone();
        let question = question.into();

        Box::pin(async_stream::stream! {
            let answer = match executor.run(&question, &cancel).await {
                Ok(answer) => answer,
                Err(AgentError::Cancelled) => String::new(),
                Err(_) => FALLBACK_ANSWER.to_string(),
            };
            yield Ok(StreamChunk::done(answer).encode());
        })
    }

    async fn run_loop(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let mut transcript = Transcript::new(self.prompt.render(question));
        // Counts steps consumed over the whole call, not per response.
        let mut tool_index = 0;
        let mut iteration = 0;
        let mut state = LoopState::BuildingPrompt;

        loop {
            state = match state {
                LoopState::BuildingPrompt => {
                    if iteration >= self.config.max_iterations {
                        return Err(AgentError::IterationsExhausted {
                            iterations: iteration,
                        });
                    }
                    LoopState::AwaitingModel(transcript.render())
                }
                LoopState::AwaitingModel(prompt) => {
                    debug!(iteration, prompt_len = prompt.len(), "Calling model");
                    let response = until_cancelled(cancel, self.complete(&prompt)).await??;
                    debug!(response = %response, "Model responded");
                    transcript.push_response(&response);
                    LoopState::Parsing(response)
                }
                LoopState::Parsing(response) => match self.parser.parse(&response)? {
                    ParsedResponse::FinalAnswer(answer) => return Ok(answer),
                    ParsedResponse::Steps(steps) => {
                        let count = steps.len();
                        match steps.into_iter().nth(tool_index) {
                            Some(step) => LoopState::Dispatching(step),
                            None => {
                                debug!(count, tool_index, "Parsed steps already consumed");
                                let answer = self.parser.final_answer(&response);
                                return answer.ok_or_else(|| {
                                    AgentError::Parse(format!(
                                        "no unconsumed step among {} and no final answer",
                                        count
                                    ))
                                });
                            }
                        }
                    }
                },
                LoopState::Dispatching(step) => {
                    let observation =
                        until_cancelled(cancel, self.dispatcher.dispatch(&step)).await??;
                    debug!(
                        tool = %observation.tool_name,
                        is_error = observation.is_error,
                        "Observation recorded"
                    );
                    transcript.push_observation(&observation);
                    tool_index += 1;
                    iteration += 1;
                    LoopState::BuildingPrompt
                }
            };
        }
    }

    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        let call = async {
            let stream = self.gateway.submit(prompt).await?;
            collect_text(stream).await
        };

        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(ModelError::Timeout(limit))),
            None => call.await,
        }
    }
}

async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, AgentError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        output = future => Ok(output),
    }
}
