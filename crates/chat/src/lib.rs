#![deny(unsafe_code)]

/// Streaming chat core.
///
/// Decoded stream records from `parley-client` are interpreted and reduced
/// into an in-memory conversation, which is published to the rendering layer
/// as whole-value snapshots.
pub mod chat;
/// Session context tying the conversation to a transport and tool registry.
pub mod session;

pub use session::{ChatSession, SubmitRejection, TurnOutcome, TurnReport};
