use parley_client::{RecordKind, StreamRecord, ToolUpdate};

/// Appended to the assistant message when the transport fails mid-turn.
pub const CONNECTION_ERROR_MARKER: &str = "\n[Connection error occurred]";

/// Inline marker for an `error` record reported by the service.
pub fn error_marker(content: &str) -> String {
    format!("\n[Error: {content}]")
}

/// Action a single stream record asks of the in-flight assistant message.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEventPayload {
    TextDelta(String),
    /// Full replacement of the tool entry with the same id.
    ToolUpsert(ToolUpdate),
    ServiceError(String),
    EndOfTurn,
    Ignored,
}

/// Interpreted record: the payload plus the record's timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnEvent {
    pub payload: TurnEventPayload,
    pub timestamp: Option<String>,
}

impl TurnEvent {
    /// Text appended to the accumulator by this event, if any.
    pub fn content_delta(&self) -> Option<String> {
        match &self.payload {
            TurnEventPayload::TextDelta(text) => Some(text.clone()),
            TurnEventPayload::ServiceError(content) => Some(error_marker(content)),
            TurnEventPayload::ToolUpsert(_)
            | TurnEventPayload::EndOfTurn
            | TurnEventPayload::Ignored => None,
        }
    }
}

/// Maps one decoded record to its event. Pure; keeps no state between calls.
pub fn interpret(record: StreamRecord) -> TurnEvent {
    let payload = match record.kind {
        RecordKind::Text => TurnEventPayload::TextDelta(record.content),
        RecordKind::ToolCall | RecordKind::ToolResult => match record.tool {
            Some(tool) => TurnEventPayload::ToolUpsert(tool),
            None => TurnEventPayload::Ignored,
        },
        RecordKind::Error => TurnEventPayload::ServiceError(record.content),
        RecordKind::Done => TurnEventPayload::EndOfTurn,
        RecordKind::Unknown => TurnEventPayload::Ignored,
    };

    TurnEvent {
        payload,
        timestamp: record.timestamp,
    }
}
