//! Request orchestration
//!
//! Parse, ask the agent, deliver the reply, and record the exchange when the
//! reply was a genuine answer that reached the chat.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::{AgentClient, AgentReply, BedrockAgentRuntime};
use crate::config::{load_aws_config, RelaySettings};
use crate::reply::{ReplyError, ReplySender, TelegramReplySender};
use crate::storage::{ConversationRecorder, DynamoConversationStore, Exchange, StorageError};
use crate::webhook::{self, ParseError};

/// Body returned for rejected webhook data
pub const INVALID_WEBHOOK_DATA: &str = "Invalid webhook data";
/// Body returned when the reply was delivered
pub const PROCESSED: &str = "Message processed successfully";
/// Body returned when the reply was not delivered
pub const SEND_FAILED: &str = "Failed to send reply to Telegram";

/// Errors that abort request processing
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The transport body could not be decoded
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Reply delivery failed before any HTTP response
    #[error(transparent)]
    Reply(#[from] ReplyError),
}

/// Response handed back to the invoking transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerResponse {
    /// HTTP-style status: 200, 400 or 500
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// JSON-encoded string message
    pub body: String,
}

impl HandlerResponse {
    fn with_message(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: Value::String(message.to_string()).to_string(),
        }
    }

    /// 200 with the given message
    #[must_use]
    pub fn ok(message: &str) -> Self {
        Self::with_message(200, message)
    }

    /// 400 with the given message
    #[must_use]
    pub fn bad_request(message: &str) -> Self {
        Self::with_message(400, message)
    }

    /// 500 with the given message
    #[must_use]
    pub fn server_error(message: &str) -> Self {
        Self::with_message(500, message)
    }
}

/// Whether an exchange should be recorded, and why not
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDecision {
    /// Reply delivered and genuine
    Record,
    /// The reply never reached the chat
    SkipUndelivered,
    /// The reply was a fallback, not an agent answer
    SkipFallback,
}

/// Decide whether to record an exchange.
#[must_use]
pub const fn record_decision(delivered: bool, reply: &AgentReply) -> RecordDecision {
    if !delivered {
        RecordDecision::SkipUndelivered
    } else if reply.is_answer() {
        RecordDecision::Record
    } else {
        RecordDecision::SkipFallback
    }
}

/// Long-lived handles shared by every invocation
#[derive(Clone)]
pub struct RelayContext {
    agent: AgentClient,
    sender: Arc<dyn ReplySender>,
    recorder: ConversationRecorder,
}

impl RelayContext {
    /// Assemble a context from its parts
    #[must_use]
    pub fn new(
        agent: AgentClient,
        sender: Arc<dyn ReplySender>,
        recorder: ConversationRecorder,
    ) -> Self {
        Self {
            agent,
            sender,
            recorder,
        }
    }

    /// Build the production context: Bedrock agent, Telegram sender and
    /// DynamoDB recorder, all sharing one AWS SDK config.
    pub async fn from_settings(settings: &RelaySettings) -> Self {
        let sdk_config = load_aws_config(settings).await;

        let runtime = BedrockAgentRuntime::from_settings(settings, &sdk_config);
        let store = DynamoConversationStore::from_settings(settings, &sdk_config);

        Self::new(
            AgentClient::new(Arc::new(runtime)),
            Arc::new(TelegramReplySender::from_settings(settings)),
            ConversationRecorder::new(Arc::new(store)),
        )
    }

    /// Check connection to the conversation store
    ///
    /// # Errors
    ///
    /// Returns the store's error if it cannot be reached.
    pub async fn check_storage(&self) -> Result<(), StorageError> {
        self.recorder.check_connection().await
    }

    /// Handle one invocation payload. Never fails: every outcome is a
    /// [`HandlerResponse`].
    #[instrument(skip_all)]
    pub async fn handle(&self, event: Value) -> HandlerResponse {
        debug!(%event, "Received event");

        match self.process(event).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Error processing webhook");
                HandlerResponse::server_error(&format!("Error processing message: {e}"))
            }
        }
    }

    async fn process(&self, event: Value) -> Result<HandlerResponse, HandlerError> {
        let message = match webhook::parse_event(event) {
            Ok(message) => message,
            Err(e) if e.is_rejection() => {
                warn!(reason = %e, "Rejecting webhook");
                return Ok(HandlerResponse::bad_request(INVALID_WEBHOOK_DATA));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            chat_id = message.chat_id,
            user_id = message.user_id,
            username = %message.username,
            "Message received"
        );

        let session_id = message.session_id();
        let timestamp = Utc::now().to_rfc3339();

        let reply = self.agent.get_reply(&message.text, &session_id).await;
        let delivered = self.sender.send(message.chat_id, reply.text()).await?;

        match record_decision(delivered, &reply) {
            RecordDecision::Record => {
                let exchange = Exchange {
                    session_id: &session_id,
                    user_message: &message.text,
                    agent_response: reply.text(),
                    timestamp: &timestamp,
                    user_name: Some(&message.username),
                    chat_id: Some(message.chat_id),
                };
                self.recorder.record(&exchange).await;
            }
            RecordDecision::SkipUndelivered => {
                warn!("Conversation NOT stored - Telegram send failed");
            }
            RecordDecision::SkipFallback => {
                info!("Conversation NOT stored - fallback response from agent");
            }
        }

        if delivered {
            Ok(HandlerResponse::ok(PROCESSED))
        } else {
            Ok(HandlerResponse::server_error(SEND_FAILED))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, FallbackReason, MockAgentRuntime};
    use crate::reply::MockReplySender;
    use crate::storage::MockConversationStore;
    use crate::testing::{
        mock_agent_chunks, mock_agent_error, mock_sender_status, mock_storage_noop,
    };
    use mockall::predicate::eq;
    use serde_json::json;

    fn update(text: &str) -> Value {
        json!({
            "message": {
                "chat": { "id": 555 },
                "from": { "id": 42, "username": "reno_fan" },
                "text": text
            }
        })
    }

    fn context(
        runtime: MockAgentRuntime,
        sender: MockReplySender,
        store: MockConversationStore,
    ) -> RelayContext {
        RelayContext::new(
            AgentClient::new(Arc::new(runtime)),
            Arc::new(sender),
            ConversationRecorder::new(Arc::new(store)),
        )
    }

    #[test]
    fn test_record_decision_truth_table() {
        let answer = AgentReply::Answer("Hi there".into());
        let fallback = AgentReply::Fallback(FallbackReason::Busy);

        assert_eq!(record_decision(true, &answer), RecordDecision::Record);
        assert_eq!(record_decision(true, &fallback), RecordDecision::SkipFallback);
        assert_eq!(record_decision(false, &answer), RecordDecision::SkipUndelivered);
        assert_eq!(record_decision(false, &fallback), RecordDecision::SkipUndelivered);
    }

    #[test]
    fn test_response_body_is_json_string() {
        let response = HandlerResponse::bad_request(INVALID_WEBHOOK_DATA);
        assert_eq!(response.status_code, 400);
        assert_eq!(response.body, "\"Invalid webhook data\"");
    }

    #[tokio::test]
    async fn test_answer_is_delivered_and_recorded() {
        let mut sender = MockReplySender::new();
        sender
            .expect_send()
            .with(eq(555_i64), eq("Hi there"))
            .times(1)
            .returning(|_, _| Ok(true));

        let mut store = MockConversationStore::new();
        store
            .expect_put_conversation()
            .withf(|record| {
                record.user_message == "hello"
                    && record.agent_response == "Hi there"
                    && record.chat_id.as_deref() == Some("555")
            })
            .times(1)
            .returning(|_| Ok(()));

        let ctx = context(mock_agent_chunks(&["Hi", " there"]), sender, store);
        assert_eq!(ctx.handle(update("hello")).await, HandlerResponse::ok(PROCESSED));
    }

    #[tokio::test]
    async fn test_fallback_is_delivered_but_not_recorded() {
        let mut sender = MockReplySender::new();
        sender
            .expect_send()
            .with(eq(555_i64), eq(FallbackReason::Busy.message()))
            .times(1)
            .returning(|_, _| Ok(true));

        let mut store = MockConversationStore::new();
        store.expect_put_conversation().never();

        let ctx = context(
            mock_agent_error(AgentError::Throttling("slow down".into())),
            sender,
            store,
        );
        assert_eq!(ctx.handle(update("hello")).await.status_code, 200);
    }

    #[tokio::test]
    async fn test_undelivered_reply_is_server_error() {
        let mut store = MockConversationStore::new();
        store.expect_put_conversation().never();

        let ctx = context(mock_agent_chunks(&["Hi"]), mock_sender_status(false), store);
        assert_eq!(
            ctx.handle(update("hello")).await,
            HandlerResponse::server_error(SEND_FAILED)
        );
    }

    #[tokio::test]
    async fn test_missing_message_makes_no_calls() {
        let mut runtime = MockAgentRuntime::new();
        runtime.expect_invoke().never();
        let mut sender = MockReplySender::new();
        sender.expect_send().never();

        let ctx = context(runtime, sender, mock_storage_noop());
        let response = ctx.handle(json!({ "update_id": 1 })).await;

        assert_eq!(response.status_code, 400);
        assert_eq!(response.body, "\"Invalid webhook data\"");
    }

    #[tokio::test]
    async fn test_send_transport_error_is_server_error() {
        let mut sender = MockReplySender::new();
        sender
            .expect_send()
            .returning(|_, _| Err(ReplyError::Network("connection reset".into())));

        let ctx = context(mock_agent_chunks(&["Hi"]), sender, mock_storage_noop());
        let response = ctx.handle(update("hello")).await;

        assert_eq!(response.status_code, 500);
        assert!(response.body.starts_with("\"Error processing message: "));
        assert!(response.body.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_server_error() {
        let mut runtime = MockAgentRuntime::new();
        runtime.expect_invoke().never();

        let ctx = context(runtime, mock_sender_status(true), mock_storage_noop());
        let response = ctx.handle(json!({ "body": "{oops" })).await;

        assert_eq!(response.status_code, 500);
        assert!(response.body.contains("Error processing message"));
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_change_status() {
        let mut store = MockConversationStore::new();
        store
            .expect_put_conversation()
            .times(1)
            .returning(|_| Err(StorageError::DynamoPut("ProvisionedThroughputExceeded".into())));

        let ctx = context(mock_agent_chunks(&["Hi"]), mock_sender_status(true), store);
        assert_eq!(ctx.handle(update("hello")).await.status_code, 200);
    }
}
