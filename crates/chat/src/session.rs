use std::pin::pin;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use parley_client::{
    ApiResult, ChatApi, ChatTransport, ClientSettings, RecordKind, StreamRecord, ToolCatalog,
    ToolRegistry, decode_records,
};
use snafu::Snafu;
use tokio::sync::{Mutex, watch};

use crate::chat::{Conversation, HistorySnapshot, MessageId, TurnTransitionRejection};

/// Why a submission never started a turn.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SubmitRejection {
    #[snafu(display("message is empty"))]
    EmptyMessage,
    #[snafu(display("turn {active} is still streaming"))]
    TurnInProgress { active: MessageId },
    #[snafu(display("turn could not start: {rejection:?}"))]
    InvalidTransition { rejection: TurnTransitionRejection },
}

impl From<TurnTransitionRejection> for SubmitRejection {
    fn from(rejection: TurnTransitionRejection) -> Self {
        match rejection {
            TurnTransitionRejection::AlreadyStreaming { active, .. } => {
                Self::TurnInProgress { active }
            }
            rejection => Self::InvalidTransition { rejection },
        }
    }
}

/// How a turn that did start came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Committed,
    /// Transport failure; carries the error text.
    Errored(String),
}

/// Summary of one finished turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub message_id: MessageId,
    pub outcome: TurnOutcome,
    pub records_applied: usize,
}

/// State shared between the session and the task streaming a turn.
struct TurnContext {
    transport: Arc<dyn ChatTransport>,
    conversation: Mutex<Conversation>,
    history_tx: watch::Sender<HistorySnapshot>,
}

impl TurnContext {
    async fn stream_turn(self: Arc<Self>, message_id: MessageId, text: String) -> TurnReport {
        let mut records_applied = 0;

        let body = match self.transport.stream_chat(&text).await {
            Ok(body) => body,
            Err(error) => {
                return self
                    .fail_turn(message_id, error.to_string(), records_applied)
                    .await;
            }
        };
        let mut records = pin!(decode_records::<StreamRecord, _, _, _>(body));

        while let Some(item) = records.next().await {
            let record = match item {
                Ok(record) => record,
                Err(error) => {
                    return self
                        .fail_turn(message_id, error.to_string(), records_applied)
                        .await;
                }
            };

            let is_done = record.kind == RecordKind::Done;
            let mut conversation = self.conversation.lock().await;
            match conversation.apply_record(message_id, record) {
                Ok(()) => {
                    records_applied += 1;
                    self.publish(&conversation);
                    if is_done {
                        tracing::debug!(message_id = %message_id, "service signalled end of turn");
                    }
                }
                Err(rejection) => {
                    tracing::warn!(
                        message_id = %message_id,
                        rejection = ?rejection,
                        "dropping record for inactive turn"
                    );
                }
            }
        }

        let mut conversation = self.conversation.lock().await;
        match conversation.commit(message_id) {
            Ok(()) => self.publish(&conversation),
            Err(rejection) => {
                tracing::warn!(message_id = %message_id, rejection = ?rejection, "turn was not committed");
            }
        }

        TurnReport {
            message_id,
            outcome: TurnOutcome::Committed,
            records_applied,
        }
    }

    async fn fail_turn(
        &self,
        message_id: MessageId,
        reason: String,
        records_applied: usize,
    ) -> TurnReport {
        let mut conversation = self.conversation.lock().await;
        match conversation.fail(message_id, reason.clone()) {
            Ok(()) => self.publish(&conversation),
            Err(rejection) => {
                tracing::warn!(message_id = %message_id, rejection = ?rejection, "turn was not failed");
            }
        }

        TurnReport {
            message_id,
            outcome: TurnOutcome::Errored(reason),
            records_applied,
        }
    }

    fn publish(&self, conversation: &Conversation) {
        self.history_tx.send_replace(conversation.snapshot());
    }
}

/// Session context: one conversation, one transport, one tool registry.
///
/// History and registry are exposed only as whole-value snapshots through
/// `watch` channels.
pub struct ChatSession {
    turns: Arc<TurnContext>,
    registry: ToolRegistry,
    registry_tx: watch::Sender<Option<Arc<ToolCatalog>>>,
}

impl ChatSession {
    /// Creates a session over `transport` with an empty history.
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        let (history_tx, _) = watch::channel(HistorySnapshot::default());
        let (registry_tx, _) = watch::channel(None);

        Self {
            registry: ToolRegistry::new(transport.clone()),
            turns: Arc::new(TurnContext {
                transport,
                conversation: Mutex::new(Conversation::new()),
                history_tx,
            }),
            registry_tx,
        }
    }

    /// Creates a session talking HTTP to the configured endpoint.
    pub fn from_settings(settings: &ClientSettings) -> ApiResult<Self> {
        let api = ChatApi::new(settings)?;
        tracing::info!(endpoint = %api.endpoint(), "chat session configured");
        Ok(Self::new(Arc::new(api)))
    }

    pub fn history(&self) -> watch::Receiver<HistorySnapshot> {
        self.turns.history_tx.subscribe()
    }

    pub fn tool_registry(&self) -> watch::Receiver<Option<Arc<ToolCatalog>>> {
        self.registry_tx.subscribe()
    }

    pub async fn is_streaming(&self) -> bool {
        self.turns.conversation.lock().await.is_streaming()
    }

    /// Fetches the tool registry on first call and publishes it.
    pub async fn load_tools(&self) -> Arc<ToolCatalog> {
        let catalog = self.registry.load().await;
        self.registry_tx.send_replace(Some(catalog.clone()));
        catalog
    }

    /// Runs one user turn to completion.
    ///
    /// Rejected without touching history when the text is blank or another
    /// turn is still streaming. The turn is streamed on its own task, so
    /// dropping the returned future does not leave the turn unfinished.
    pub async fn submit_turn(&self, text: &str) -> Result<TurnReport, SubmitRejection> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitRejection::EmptyMessage);
        }

        let message_id = {
            let mut conversation = self.turns.conversation.lock().await;
            let message_id = conversation.begin_turn(text, &now_timestamp())?;
            self.turns.publish(&conversation);
            message_id
        };
        tracing::info!(message_id = %message_id, "turn started");

        let turn = tokio::spawn(
            self.turns
                .clone()
                .stream_turn(message_id, text.to_string()),
        );
        let report = match turn.await {
            Ok(report) => report,
            Err(error) => {
                tracing::error!(message_id = %message_id, error = %error, "turn task stopped");
                self.turns
                    .fail_turn(message_id, format!("turn task stopped: {error}"), 0)
                    .await
            }
        };

        match &report.outcome {
            TurnOutcome::Committed => tracing::info!(
                message_id = %message_id,
                records = report.records_applied,
                "turn committed"
            ),
            TurnOutcome::Errored(reason) => tracing::warn!(
                message_id = %message_id,
                records = report.records_applied,
                reason = %reason,
                "turn ended with a transport error"
            ),
        }
        Ok(report)
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
