//! Extraction of actions and final answers from free-text model responses.
//!
//! The protocol is line oriented: `Thought:`, `Action:`, `Action Input:`,
//! `Observation:` and `Final Answer:` prefixes. Two strategies are supported
//! for finding the action, see [`ParsingStrategy`].

use regex::Regex;
use std::cmp::Reverse;
use std::sync::LazyLock;

use crate::error::AgentError;

/// Marker that introduces the final answer in the default protocol.
pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";

const ACTION_INPUT_MARKER: &str = "Action Input:";

/// Instruction delimiters the model tends to echo back.
const DELIMITERS: [&str; 4] = ["[INST]", "[/INST]", "<s>", "</s>"];

static STEP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:Action|Input):[ \t]*(.*)$").expect("step pattern is valid")
});

/// How actions are located in a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParsingStrategy {
    /// Every value after `Action:` or `Input:` in document order; even
    /// positions are tool names, odd positions their inputs.
    #[default]
    AlternatingCapture,
    /// The known tool name occurring first in the response is the action; the
    /// text after `Action Input:` is its input.
    NameSniffing,
}

/// One action the model asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStep {
    /// Name of the requested tool
    pub tool_name: String,
    /// Raw text given as the tool input
    pub raw_input: String,
}

/// The meaning extracted from one model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    /// Actions to dispatch, in the order they appear
    Steps(Vec<ParsedStep>),
    /// The final answer
    FinalAnswer(String),
}

/// Converts complete model responses into steps or a final answer.
#[derive(Debug, Clone)]
pub struct ResponseParser {
    strategy: ParsingStrategy,
    tool_names: Vec<String>,
    final_markers: Vec<String>,
}

impl ResponseParser {
    /// Creates a parser; `tool_names` is consulted by name sniffing only.
    pub fn new(strategy: ParsingStrategy, tool_names: Vec<String>) -> Self {
        Self {
            strategy,
            tool_names,
            final_markers: vec![FINAL_ANSWER_MARKER.to_string()],
        }
    }

    /// Replaces the markers recognised as introducing the final answer.
    pub fn with_final_markers(mut self, markers: Vec<String>) -> Self {
        if !markers.is_empty() {
            self.final_markers = markers;
        }
        self
    }

    /// Parses one complete response.
    ///
    /// Actions take precedence over a final answer in the same response.
    /// A response with neither is a [`AgentError::Parse`].
    pub fn parse(&self, response: &str) -> Result<ParsedResponse, AgentError> {
        let steps = match self.strategy {
            ParsingStrategy::AlternatingCapture => alternating_steps(response),
            ParsingStrategy::NameSniffing => self.sniffed_step(response).into_iter().collect(),
        };

        if !steps.is_empty() {
            return Ok(ParsedResponse::Steps(steps));
        }

        self.final_answer(response)
            .or_else(|| match self.strategy {
                ParsingStrategy::NameSniffing => last_value_after(response, ACTION_INPUT_MARKER),
                ParsingStrategy::AlternatingCapture => None,
            })
            .map(ParsedResponse::FinalAnswer)
            .ok_or_else(|| AgentError::Parse(preview(response)))
    }

    /// Returns the cleaned text after the last final-answer marker.
    pub fn final_answer(&self, response: &str) -> Option<String> {
        let (position, marker) = self.last_final_marker(response)?;
        let answer = strip_delimiters(&response[position + marker.len()..]);
        (!answer.is_empty()).then_some(answer)
    }

    fn last_final_marker(&self, response: &str) -> Option<(usize, &str)> {
        self.final_markers
            .iter()
            .filter_map(|marker| response.rfind(marker.as_str()).map(|pos| (pos, marker.as_str())))
            .max_by_key(|(pos, _)| *pos)
    }

    fn sniffed_step(&self, response: &str) -> Option<ParsedStep> {
        // Tool names mentioned inside the final answer are not actions.
        let region = match self.last_final_marker(response) {
            Some((position, _)) => &response[..position],
            None => response,
        };

        let sanitized: String = region
            .chars()
            .filter(|c| !matches!(c, '\n' | '\r' | '`' | '\\'))
            .collect();

        let tool_name = self
            .tool_names
            .iter()
            .filter_map(|name| sanitized.find(name.as_str()).map(|pos| (pos, name)))
            .min_by_key(|(pos, name)| (*pos, Reverse(name.len())))
            .map(|(_, name)| name.clone())?;

        let raw_input = region
            .find(ACTION_INPUT_MARKER)
            .map(|pos| first_line(&region[pos + ACTION_INPUT_MARKER.len()..]))
            .unwrap_or_default();

        Some(ParsedStep {
            tool_name,
            raw_input,
        })
    }
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(ParsingStrategy::default(), Vec::new())
    }
}

fn alternating_steps(response: &str) -> Vec<ParsedStep> {
    let values: Vec<&str> = STEP_PATTERN
        .captures_iter(response)
        .filter_map(|captures| captures.get(1))
        .map(|value| value.as_str().trim())
        .collect();

    values
        .chunks(2)
        .map(|pair| ParsedStep {
            tool_name: pair[0].trim_matches('`').trim().to_string(),
            raw_input: pair.get(1).map(|input| input.to_string()).unwrap_or_default(),
        })
        .collect()
}

fn last_value_after(response: &str, marker: &str) -> Option<String> {
    let position = response.rfind(marker)?;
    let value = strip_delimiters(&response[position + marker.len()..]);
    (!value.is_empty()).then_some(value)
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().trim().to_string()
}

fn strip_delimiters(text: &str) -> String {
    DELIMITERS
        .iter()
        .fold(text.replace('`', ""), |acc, delimiter| acc.replace(delimiter, ""))
        .trim()
        .to_string()
}

fn preview(response: &str) -> String {
    const LIMIT: usize = 200;
    match response.char_indices().nth(LIMIT) {
        Some((end, _)) => format!("{}...", &response[..end]),
        None => response.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alternating() -> ResponseParser {
        ResponseParser::default()
    }

    fn sniffing() -> ResponseParser {
        ResponseParser::new(
            ParsingStrategy::NameSniffing,
            vec!["http_request".to_string(), "current_date".to_string()],
        )
    }

    fn steps(parsed: ParsedResponse) -> Vec<ParsedStep> {
        match parsed {
            ParsedResponse::Steps(steps) => steps,
            other => panic!("expected steps, got {:?}", other),
        }
    }

    #[test]
    fn test_single_action_with_input() {
        let response = "Thought: I need the date\nAction: current_date\nAction Input: \"\"\n";

        let steps = steps(alternating().parse(response).unwrap());
        assert_eq!(
            steps,
            vec![ParsedStep {
                tool_name: "current_date".to_string(),
                raw_input: "\"\"".to_string(),
            }]
        );
    }

    #[test]
    fn test_alternating_pairs_positions_in_order() {
        let response =
            "Action: a\nAction Input: 1\nObservation: ...\nAction: b\nAction Input: 2\nAction: c";

        let steps = steps(alternating().parse(response).unwrap());
        assert_eq!(steps.len(), 3);
        assert_eq!((steps[0].tool_name.as_str(), steps[0].raw_input.as_str()), ("a", "1"));
        assert_eq!((steps[1].tool_name.as_str(), steps[1].raw_input.as_str()), ("b", "2"));
        assert_eq!((steps[2].tool_name.as_str(), steps[2].raw_input.as_str()), ("c", ""));
    }

    #[test]
    fn test_action_without_input_yields_empty_input() {
        let steps = steps(alternating().parse("Action: `current_date`").unwrap());
        assert_eq!(steps[0].tool_name, "current_date");
        assert_eq!(steps[0].raw_input, "");
    }

    #[test]
    fn test_unknown_tool_is_still_a_step() {
        let steps = steps(alternating().parse("Action: web_search\nAction Input: rust").unwrap());
        assert_eq!(steps[0].tool_name, "web_search");
    }

    #[test]
    fn test_final_answer_strips_delimiters_and_whitespace() {
        let response = "Thought: I now know the final answer\n\
                        Final Answer: It is `12` degrees. [/INST]</s>  \n";

        assert_eq!(
            alternating().parse(response).unwrap(),
            ParsedResponse::FinalAnswer("It is 12 degrees.".to_string())
        );
    }

    #[test]
    fn test_last_final_answer_marker_wins() {
        let response = "Final Answer: draft\nThought: better\nFinal Answer: final";

        assert_eq!(
            alternating().parse(response).unwrap(),
            ParsedResponse::FinalAnswer("final".to_string())
        );
    }

    #[test]
    fn test_steps_take_precedence_over_final_answer() {
        let response = "Action: http_request\nAction Input: http://x.test\n\
                        Observation: made up\nFinal Answer: made up";

        let steps = steps(alternating().parse(response).unwrap());
        assert_eq!(steps[0].tool_name, "http_request");
    }

    #[test]
    fn test_response_without_markers_is_parse_error() {
        let result = alternating().parse("I am not sure what to do.");
        assert!(matches!(result, Err(AgentError::Parse(_))));
    }

    #[test]
    fn test_empty_final_answer_is_parse_error() {
        let result = alternating().parse("Final Answer: [/INST]");
        assert!(matches!(result, Err(AgentError::Parse(_))));
    }

    #[test]
    fn test_custom_final_marker() {
        let parser = alternating().with_final_markers(vec![
            "OpenAPI Output:".to_string(),
            FINAL_ANSWER_MARKER.to_string(),
        ]);

        assert_eq!(
            parser.parse("Thought: done\nOpenAPI Output: {\"path\":\"/x\"}").unwrap(),
            ParsedResponse::FinalAnswer("{\"path\":\"/x\"}".to_string())
        );
    }

    #[test]
    fn test_sniffing_finds_first_known_tool() {
        let response =
            "I should use the `current_date` tool, then http_request.\nAction Input: none";

        let steps = steps(sniffing().parse(response).unwrap());
        assert_eq!(
            steps,
            vec![ParsedStep {
                tool_name: "current_date".to_string(),
                raw_input: "none".to_string(),
            }]
        );
    }

    #[test]
    fn test_sniffing_prefers_longest_name_at_same_position() {
        let parser = ResponseParser::new(
            ParsingStrategy::NameSniffing,
            vec!["http".to_string(), "http_request".to_string()],
        );

        let response = "Action: http_request\nAction Input: http://x.test";

        let steps = steps(parser.parse(response).unwrap());
        assert_eq!(steps[0].tool_name, "http_request");
        assert_eq!(steps[0].raw_input, "http://x.test");
    }

    #[test]
    fn test_sniffing_ignores_names_inside_final_answer() {
        let response = "Final Answer: the http_request tool returned 53F and Freezing";

        assert_eq!(
            sniffing().parse(response).unwrap(),
            ParsedResponse::FinalAnswer(
                "the http_request tool returned 53F and Freezing".to_string()
            )
        );
    }

    #[test]
    fn test_sniffing_falls_back_to_last_action_input() {
        let response = "Action: respond\nAction Input: It will be sunny tomorrow.";

        assert_eq!(
            sniffing().parse(response).unwrap(),
            ParsedResponse::FinalAnswer("It will be sunny tomorrow.".to_string())
        );
    }
}
