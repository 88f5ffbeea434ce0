pub mod agent_loop;
pub mod parser;
pub mod prompt;

pub use agent_loop::{Executor, ExecutorConfig, FALLBACK_ANSWER};
pub use parser::{FINAL_ANSWER_MARKER, ParsedResponse, ParsedStep, ParsingStrategy, ResponseParser};
pub use prompt::{Fragment, PromptBuilder, Transcript};
