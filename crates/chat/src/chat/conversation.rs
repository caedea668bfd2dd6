//! Conversation state reducer.
//!
//! Owns the published history and the single in-flight assistant message.
//! Every accepted mutation bumps the snapshot revision; callers publish the
//! result of [`Conversation::snapshot`] after each call that returns `Ok`.
//!
//! Settled messages live in a shared map that only changes when a turn
//! starts or ends. Per-record publishes replace the in-flight message alone.

use std::sync::Arc;

use indexmap::IndexMap;
use parley_client::{StreamRecord, ToolUpdate};

use super::events::{CONNECTION_ERROR_MARKER, TurnEvent, TurnEventPayload, interpret};
use super::message::{
    Message, MessageId, MessageStatus, Role, TurnState, TurnTransition, TurnTransitionRejection,
};

type SettledMessages = Arc<IndexMap<MessageId, Arc<Message>>>;

/// Whole-value view of the history handed to the rendering boundary.
#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    /// Incremented on every publish.
    pub revision: u64,
    settled: SettledMessages,
    in_flight: Option<Arc<Message>>,
}

impl HistorySnapshot {
    pub fn len(&self) -> usize {
        self.settled.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages in display order; the streaming assistant message, if any, is last.
    pub fn messages(&self) -> impl Iterator<Item = &Arc<Message>> {
        self.settled.values().chain(self.in_flight.as_ref())
    }

    /// Message at `index` in display order.
    pub fn message_at(&self, index: usize) -> Option<&Arc<Message>> {
        match self.settled.get_index(index) {
            Some((_, message)) => Some(message),
            None if index == self.settled.len() => self.in_flight.as_ref(),
            None => None,
        }
    }

    pub fn get(&self, message_id: MessageId) -> Option<&Arc<Message>> {
        match &self.in_flight {
            Some(message) if message.id == message_id => Some(message),
            _ => self.settled.get(&message_id),
        }
    }

    pub fn last(&self) -> Option<&Arc<Message>> {
        self.in_flight
            .as_ref()
            .or_else(|| self.settled.last().map(|(_, message)| message))
    }
}

/// Mutable assistant message for the streaming turn.
#[derive(Debug)]
struct WorkingMessage {
    id: MessageId,
    content: String,
    timestamp: String,
    tools: IndexMap<String, ToolUpdate>,
}

impl WorkingMessage {
    fn new(id: MessageId, timestamp: &str) -> Self {
        Self {
            id,
            content: String::new(),
            timestamp: timestamp.to_string(),
            tools: IndexMap::new(),
        }
    }

    fn apply(&mut self, event: TurnEvent) {
        if let Some(delta) = event.content_delta() {
            self.content.push_str(&delta);
        }

        match event.payload {
            TurnEventPayload::ToolUpsert(tool) => {
                // Replacing an existing key keeps its first-seen position.
                self.tools.insert(tool.id.clone(), tool);
            }
            TurnEventPayload::TextDelta(_)
            | TurnEventPayload::ServiceError(_)
            | TurnEventPayload::EndOfTurn
            | TurnEventPayload::Ignored => {}
        }

        if let Some(timestamp) = event.timestamp {
            self.timestamp = timestamp;
        }
    }

    fn to_message(&self, status: MessageStatus) -> Message {
        Message {
            id: self.id,
            role: Role::Assistant,
            content: self.content.clone(),
            timestamp: self.timestamp.clone(),
            tools: self.tools.values().cloned().collect(),
            status,
        }
    }
}

/// Conversation history plus the turn currently being streamed into it.
#[derive(Debug, Default)]
pub struct Conversation {
    settled: SettledMessages,
    state: TurnState,
    working: Option<WorkingMessage>,
    in_flight: Option<Arc<Message>>,
    revision: u64,
}

impl Conversation {
    /// Creates an empty, idle conversation.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    /// Looks up a published message, including the one still streaming.
    pub fn message(&self, message_id: MessageId) -> Option<Arc<Message>> {
        match &self.in_flight {
            Some(message) if message.id == message_id => Some(message.clone()),
            _ => self.settled.get(&message_id).cloned(),
        }
    }

    /// Current history as a snapshot. Shares storage with the reducer.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            revision: self.revision,
            settled: self.settled.clone(),
            in_flight: self.in_flight.clone(),
        }
    }

    /// Appends the user message and opens a new assistant turn.
    ///
    /// Returns the id of the (empty) assistant message that identifies the turn.
    pub fn begin_turn(
        &mut self,
        user_text: &str,
        now: &str,
    ) -> Result<MessageId, TurnTransitionRejection> {
        let user_id = MessageId::new_v4();
        let assistant_id = MessageId::new_v4();
        self.state = self.state.apply(TurnTransition::Start(assistant_id))?;

        self.settle(Message::user(user_id, user_text, now));
        let working = WorkingMessage::new(assistant_id, now);
        self.in_flight = Some(Arc::new(working.to_message(MessageStatus::Streaming)));
        self.working = Some(working);
        self.revision += 1;

        Ok(assistant_id)
    }

    /// Interprets one record against the streaming turn.
    pub fn apply_record(
        &mut self,
        message_id: MessageId,
        record: StreamRecord,
    ) -> Result<(), TurnTransitionRejection> {
        let working = self.active_working(message_id)?;
        working.apply(interpret(record));
        let message = working.to_message(MessageStatus::Streaming);

        self.in_flight = Some(Arc::new(message));
        self.revision += 1;
        Ok(())
    }

    /// Finalizes the turn after the byte source is exhausted.
    pub fn commit(&mut self, message_id: MessageId) -> Result<(), TurnTransitionRejection> {
        self.state = self.state.apply(TurnTransition::Commit(message_id))?;
        if let Some(working) = self.working.take() {
            self.in_flight = None;
            self.settle(working.to_message(MessageStatus::Done));
            self.revision += 1;
        }
        Ok(())
    }

    /// Terminates the turn after a transport failure, appending the connection marker.
    pub fn fail(
        &mut self,
        message_id: MessageId,
        reason: impl Into<String>,
    ) -> Result<(), TurnTransitionRejection> {
        self.state = self.state.apply(TurnTransition::Fail {
            message_id,
            reason: reason.into(),
        })?;
        if let Some(mut working) = self.working.take() {
            working.content.push_str(CONNECTION_ERROR_MARKER);
            self.in_flight = None;
            self.settle(working.to_message(MessageStatus::Error));
            self.revision += 1;
        }
        Ok(())
    }

    fn active_working(
        &mut self,
        message_id: MessageId,
    ) -> Result<&mut WorkingMessage, TurnTransitionRejection> {
        match self.state.active_turn() {
            Some(active) if active == message_id => {}
            Some(active) => {
                return Err(TurnTransitionRejection::TurnMismatch {
                    active,
                    attempted: message_id,
                });
            }
            None => return Err(TurnTransitionRejection::NoActiveTurn),
        }

        self.working
            .as_mut()
            .filter(|working| working.id == message_id)
            .ok_or(TurnTransitionRejection::NoActiveTurn)
    }

    // Clones the settled map only while an older snapshot still shares it.
    fn settle(&mut self, message: Message) {
        Arc::make_mut(&mut self.settled).insert(message.id, Arc::new(message));
    }
}
