use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One turn in the conversation, in the shape the Ollama chat API expects.
/// `display_content` is local rendering state: what the user sees when it
/// differs from what the model is sent. It never travels over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(skip)]
    pub display_content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            display_content: None,
            tool_calls: Vec::new(),
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new(Role::Assistant, "")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Request body for POST /api/chat.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<ChatOptions>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChatOptions {
    pub num_ctx: i64,
}

/// One newline-delimited increment of a streaming chat response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub message: Message,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub eval_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// A tool invocation requested by the model: a tool name plus a loosely
/// typed argument map. Each handler coerces the fields it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

/// The structured reply shape the system prompt asks the model to emit.
/// Every field is defaulted: the model routinely omits or mangles parts of
/// it, and a partial reply must still deserialize.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmReply {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub thoughts: FlexibleStrings,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// Accepts a JSON string, an array of strings, or anything else (ignored).
/// Models emit `thoughts` in all three shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlexibleStrings(pub Vec<String>);

impl<'de> Deserialize<'de> for FlexibleStrings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let strings = match value {
            Value::String(s) => vec![s],
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        Ok(FlexibleStrings(strings))
    }
}

/// Events produced by the streaming worker and consumed, strictly in order,
/// by the chat session: zero or more `Chunk`s followed by exactly one
/// terminal `Done` or `Failed`.
#[derive(Debug)]
pub enum StreamEvent {
    Chunk(String),
    Done { stats: String, message: Message },
    Failed(anyhow::Error),
}
