use std::fmt;

use parley_client::ToolUpdate;
use serde::Serialize;
use uuid::Uuid;

/// Stable identifier for one message, generated client-side.
///
/// The assistant message id doubles as the identity of the turn that
/// produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Creates a typed message id from a raw uuid.
    pub fn new(raw: Uuid) -> Self {
        Self(raw)
    }

    /// Generates a fresh random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying uuid.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<Uuid> for MessageId {
    fn from(value: Uuid) -> Self {
        Self::new(value)
    }
}

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Streaming,
    Done,
    Error,
}

/// One published message. Values are immutable once placed in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    pub tools: Vec<ToolUpdate>,
    pub status: MessageStatus,
}

impl Message {
    pub fn new(
        id: MessageId,
        role: Role,
        content: impl Into<String>,
        timestamp: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: timestamp.into(),
            tools: Vec::new(),
            status,
        }
    }

    /// Creates a finished user message.
    pub fn user(id: MessageId, content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self::new(id, Role::User, content, timestamp, MessageStatus::Done)
    }

    pub fn is_streaming(&self) -> bool {
        self.status == MessageStatus::Streaming
    }
}

/// Turn lifecycle for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Streaming(MessageId),
    Committed(MessageId),
    Errored {
        message_id: MessageId,
        reason: String,
    },
}

/// State transition input for the turn lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransition {
    Start(MessageId),
    Commit(MessageId),
    Fail {
        message_id: MessageId,
        reason: String,
    },
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransitionRejection {
    AlreadyStreaming {
        active: MessageId,
        attempted: MessageId,
    },
    NoActiveTurn,
    TurnMismatch {
        active: MessageId,
        attempted: MessageId,
    },
}

pub type TurnTransitionResult = Result<TurnState, TurnTransitionRejection>;

impl TurnState {
    /// Returns the streaming turn if and only if state is `Streaming`.
    pub fn active_turn(&self) -> Option<MessageId> {
        match self {
            Self::Streaming(message_id) => Some(*message_id),
            Self::Idle | Self::Committed(_) | Self::Errored { .. } => None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active_turn().is_some()
    }

    /// Returns true when stream data for `message_id` may still mutate history.
    pub fn accepts_record(&self, message_id: MessageId) -> bool {
        matches!(self, Self::Streaming(active) if *active == message_id)
    }

    /// Applies one transition deterministically.
    ///
    /// A new turn may start from any non-streaming state. `Commit` and `Fail`
    /// must name the streaming turn exactly.
    pub fn apply(&self, transition: TurnTransition) -> TurnTransitionResult {
        match transition {
            TurnTransition::Start(message_id) => self.apply_start(message_id),
            TurnTransition::Commit(message_id) => {
                self.ensure_active(message_id)?;
                Ok(Self::Committed(message_id))
            }
            TurnTransition::Fail { message_id, reason } => {
                self.ensure_active(message_id)?;
                Ok(Self::Errored { message_id, reason })
            }
        }
    }

    fn apply_start(&self, message_id: MessageId) -> TurnTransitionResult {
        match self {
            Self::Streaming(active) => Err(TurnTransitionRejection::AlreadyStreaming {
                active: *active,
                attempted: message_id,
            }),
            Self::Idle | Self::Committed(_) | Self::Errored { .. } => {
                Ok(Self::Streaming(message_id))
            }
        }
    }

    fn ensure_active(&self, message_id: MessageId) -> Result<(), TurnTransitionRejection> {
        match self {
            Self::Streaming(active) if *active == message_id => Ok(()),
            Self::Streaming(active) => Err(TurnTransitionRejection::TurnMismatch {
                active: *active,
                attempted: message_id,
            }),
            Self::Idle | Self::Committed(_) | Self::Errored { .. } => {
                Err(TurnTransitionRejection::NoActiveTurn)
            }
        }
    }
}
