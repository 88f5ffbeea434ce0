use crate::tool::{Observation, ToolDefinition};

/// Renders the instruction that opens every transcript.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    description: String,
    output_directions: Option<String>,
    tools: Vec<ToolDefinition>,
}

impl PromptBuilder {
    /// Creates a builder for the given role description and tools.
    pub fn new(
        description: impl Into<String>,
        output_directions: Option<String>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            description: description.into(),
            output_directions,
            tools,
        }
    }

    /// Renders the opening instruction for `question`.
    pub fn render(&self, question: &str) -> String {
        let tool_list = self
            .tools
            .iter()
            .map(|tool| format!("{}: {}", tool.name, tool.description))
            .collect::<Vec<_>>()
            .join("\n");
        let tool_names = self
            .tools
            .iter()
            .map(|tool| tool.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let output_directions = self
            .output_directions
            .as_deref()
            .map(|directions| format!("{}\n", directions))
            .unwrap_or_default();

        format!(
            "<s>[INST] {description}\n\
             Do not make up a Final Answer unless that answer comes from an Observation. \
             If you cannot answer the question or it is not related to the data you have, \
             respond in the simplest manner possible. \
             Do not mention internal processes, \
             but keep the reply in the context of the user's question.\n\
             Work on this problem step by step.\n\
             Answer the following questions as best you can. \
             You have access to the following tools:\n\
             \n\
             {tool_list}\n\
             \n\
             Use the following format in your response:\n\
             \n\
             Question: the input question you must answer\n\
             Thought: you should always think about what to do\n\
             Action: the action to take, should be one of [{tool_names}]\n\
             Action Input: the input to the action (e.g. tool input)\n\
             Observation: the result of the action\n\
             ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
             Thought: I now know the final answer\n\
             Final Answer: the final answer to the original input question\n\
             \n\
             Only use the tool names in your actions exactly how they are written above. \
             Do not include additional characters or words for an Action. \
             Do not include tools that you do not have access to.\n\
             {output_directions}\
             [/INST]</s>\n\
             [INST] Do not modify the question.\n\
             Begin!\n\
             \n\
             Question: {question} [/INST]\n",
            description = self.description,
        )
    }
}

/// One segment of the running transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// The opening instruction
    Instruction(String),
    /// A complete model response
    Response(String),
    /// The output of a tool call
    Observation(String),
}

/// The append-only prompt that grows with every model turn and tool call.
#[derive(Debug, Clone)]
pub struct Transcript {
    fragments: Vec<Fragment>,
}

impl Transcript {
    /// Starts a transcript with its opening instruction.
    pub fn new(instruction: String) -> Self {
        Self {
            fragments: vec![Fragment::Instruction(instruction)],
        }
    }

    /// Appends a model response.
    pub fn push_response(&mut self, response: &str) {
        self.fragments.push(Fragment::Response(response.to_string()));
    }

    /// Appends a tool observation.
    pub fn push_observation(&mut self, observation: &Observation) {
        self.fragments
            .push(Fragment::Observation(observation.output.clone()));
    }

    /// Returns the fragments in order.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Renders the transcript as the next prompt.
    pub fn render(&self) -> String {
        self.fragments
            .iter()
            .map(|fragment| match fragment {
                Fragment::Instruction(text) => text.clone(),
                Fragment::Response(text) => format!("[INST] {} [/INST]\n", text),
                Fragment::Observation(text) => format!("[INST] Observation: {} [/INST]\n", text),
            })
            .collect()
    }
}
