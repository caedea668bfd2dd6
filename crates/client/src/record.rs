use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind tag of one wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Text,
    ToolCall,
    ToolResult,
    Error,
    Done,
    /// Any tag this client does not understand.
    #[serde(other)]
    Unknown,
}

/// One decoded line of the `/chat` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tool: Option<ToolUpdate>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl StreamRecord {
    pub fn new(kind: RecordKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            tool: None,
            timestamp: None,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(RecordKind::Text, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(RecordKind::Error, content)
    }

    pub fn done() -> Self {
        Self::new(RecordKind::Done, "")
    }

    pub fn tool_call(tool: ToolUpdate) -> Self {
        Self::new(RecordKind::ToolCall, "").with_tool(tool)
    }

    pub fn tool_result(tool: ToolUpdate) -> Self {
        Self::new(RecordKind::ToolResult, "").with_tool(tool)
    }

    pub fn with_tool(mut self, tool: ToolUpdate) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Execution status reported for one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ToolStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// State of one tool invocation, keyed by `id` for the lifetime of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUpdate {
    pub id: String,
    pub name: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolUpdate {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: ToolStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
            result: None,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Human label for the tool, e.g. `image_generator` becomes `Image Generator`.
    pub fn display_name(&self) -> String {
        self.name
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Result payload, exposed only once the invocation has completed.
    pub fn visible_result(&self) -> Option<&Value> {
        match self.status {
            ToolStatus::Completed => self.result.as_ref(),
            ToolStatus::Pending | ToolStatus::Running | ToolStatus::Failed => None,
        }
    }
}
