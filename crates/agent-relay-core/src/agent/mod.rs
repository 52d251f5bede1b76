//! Agent client
//!
//! Sends chat text to a conversational agent and collects its streamed
//! completion into a single reply. Failures never escape the client: they are
//! turned into a [`FallbackReason`].

mod bedrock;
mod reply;

pub use bedrock::BedrockAgentRuntime;
pub use reply::{AgentReply, FallbackReason, FALLBACK_MARKER};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

/// Errors that can occur while invoking the agent service
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// The caller lacks permission to invoke the agent
    #[error("Access denied: {0}")]
    AccessDenied(String),
    /// The agent service throttled the request
    #[error("Throttled: {0}")]
    Throttling(String),
    /// Any other error reported by the agent service
    #[error("Service error: {0}")]
    Service(String),
    /// Transport failures, malformed output and everything else
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Completion fragments in arrival order. The stream is finite and ends after
/// the last fragment or the first error.
pub type FragmentStream = BoxStream<'static, Result<Bytes, AgentError>>;

/// Interface for agent backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Start an agent turn for `session_id` and return its completion stream
    async fn invoke(
        &self,
        session_id: &str,
        input_text: &str,
    ) -> Result<FragmentStream, AgentError>;
}

/// Agent client shared across invocations
#[derive(Clone)]
pub struct AgentClient {
    runtime: Arc<dyn AgentRuntime>,
}

impl AgentClient {
    /// Create a client over the given runtime
    #[must_use]
    pub fn new(runtime: Arc<dyn AgentRuntime>) -> Self {
        Self { runtime }
    }

    /// Ask the agent for a reply to `text` within `session_id`.
    ///
    /// Drains the whole completion, trims it and classifies failures. An empty
    /// completion becomes [`FallbackReason::EmptyResponse`].
    #[instrument(skip(self, text))]
    pub async fn get_reply(&self, text: &str, session_id: &str) -> AgentReply {
        debug!(message = %text, "Calling agent");

        match self.collect(text, session_id).await {
            Ok(reply) if reply.is_empty() => {
                warn!("Empty response from agent");
                AgentReply::Fallback(FallbackReason::EmptyResponse)
            }
            Ok(reply) => {
                debug!(response = %reply, "Final agent response");
                AgentReply::Answer(reply)
            }
            Err(e) => {
                error!(error = %e, "Error calling agent");
                AgentReply::Fallback(FallbackReason::from(&e))
            }
        }
    }

    async fn collect(&self, text: &str, session_id: &str) -> Result<String, AgentError> {
        let mut fragments = self.runtime.invoke(session_id, text).await?;

        let mut buffer = Vec::new();
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            debug!(bytes = fragment.len(), "Chunk received");
            buffer.extend_from_slice(&fragment);
        }

        let reply = String::from_utf8(buffer)
            .map_err(|e| AgentError::Unexpected(format!("completion is not valid UTF-8: {e}")))?;

        Ok(reply.trim().to_string())
    }
}
