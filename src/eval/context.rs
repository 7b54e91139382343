use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Argument keys probed, in order, for a file path.
pub const PATH_KEYS: &[&str] = &["path", "file_path", "filePath", "filename"];

/// One candidate tool invocation from the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Tool name as reported by the host (e.g. "gmail.send", "write").
    pub tool_name: String,
    /// Tool-specific parameters.
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args: Map::new(),
        }
    }

    /// Builder-style helper for attaching a single argument.
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// First string-typed argument among [`PATH_KEYS`].
    pub fn path_arg(&self) -> Option<&str> {
        PATH_KEYS
            .iter()
            .find_map(|key| self.args.get(*key).and_then(Value::as_str))
    }
}

/// Free-text goal accompanying a tool call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub text: String,
}

impl Intent {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
