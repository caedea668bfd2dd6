/// Conversation reducer and published history snapshots.
pub mod conversation;
/// Stream record interpretation.
pub mod events;
/// Domain entities and deterministic turn state boundaries.
pub mod message;

pub use conversation::{Conversation, HistorySnapshot};
pub use events::{
    CONNECTION_ERROR_MARKER, TurnEvent, TurnEventPayload, error_marker, interpret,
};
pub use message::{
    Message, MessageId, MessageStatus, Role, TurnState, TurnTransition, TurnTransitionRejection,
    TurnTransitionResult,
};
