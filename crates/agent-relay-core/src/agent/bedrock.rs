//! Amazon Bedrock Agents runtime.

use std::fmt::Debug;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_bedrockagentruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockagentruntime::operation::invoke_agent::InvokeAgentError;
use aws_sdk_bedrockagentruntime::primitives::Blob;
use aws_sdk_bedrockagentruntime::types::error::ResponseStreamError;
use aws_sdk_bedrockagentruntime::types::ResponseStream;
use aws_sdk_bedrockagentruntime::Client;
use bytes::Bytes;
use futures_util::{future, stream, Stream, StreamExt};
use tracing::debug;

use super::{AgentError, AgentRuntime, FragmentStream};
use crate::config::RelaySettings;

/// Agent runtime backed by Bedrock `InvokeAgent`
pub struct BedrockAgentRuntime {
    client: Client,
    agent_id: String,
    agent_alias_id: String,
}

impl BedrockAgentRuntime {
    /// Create a runtime for the given agent and alias
    #[must_use]
    pub fn new(client: Client, agent_id: String, agent_alias_id: String) -> Self {
        Self {
            client,
            agent_id,
            agent_alias_id,
        }
    }

    /// Create a runtime from relay settings and a loaded SDK config
    #[must_use]
    pub fn from_settings(settings: &RelaySettings, sdk_config: &SdkConfig) -> Self {
        Self::new(
            Client::new(sdk_config),
            settings.agent_id.clone(),
            settings.agent_alias_id.clone(),
        )
    }
}

#[async_trait]
impl AgentRuntime for BedrockAgentRuntime {
    async fn invoke(
        &self,
        session_id: &str,
        input_text: &str,
    ) -> Result<FragmentStream, AgentError> {
        let output = self
            .client
            .invoke_agent()
            .agent_id(&self.agent_id)
            .agent_alias_id(&self.agent_alias_id)
            .session_id(session_id)
            .input_text(input_text)
            .send()
            .await
            .map_err(|e| invoke_error(&e))?;

        let events = stream::unfold(Some(output.completion), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.recv().await {
                Ok(Some(event)) => Some((Ok(event), Some(receiver))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        });

        Ok(completion_fragments(events))
    }
}

/// Turn raw agent events into completion fragments.
///
/// Only chunk events carry completion text; traces and the like are skipped.
/// The stream ends after the first error.
fn completion_fragments<S, R>(events: S) -> FragmentStream
where
    S: Stream<Item = Result<ResponseStream, SdkError<ResponseStreamError, R>>> + Send + 'static,
    R: Debug + Send + 'static,
{
    events
        .filter_map(|event| future::ready(chunk_bytes(event)))
        .scan(false, |failed, fragment| {
            if *failed {
                return future::ready(None);
            }
            *failed = fragment.is_err();
            future::ready(Some(fragment))
        })
        .boxed()
}

fn chunk_bytes<R>(
    event: Result<ResponseStream, SdkError<ResponseStreamError, R>>,
) -> Option<Result<Bytes, AgentError>>
where
    R: Debug,
{
    match event {
        Ok(ResponseStream::Chunk(part)) => {
            let bytes = part.bytes.map(Blob::into_inner).unwrap_or_default();
            Some(Ok(Bytes::from(bytes)))
        }
        Ok(event) => {
            debug!(?event, "Skipping non-chunk agent event");
            None
        }
        Err(e) => Some(Err(stream_error(&e))),
    }
}

fn invoke_error<R: Debug>(err: &SdkError<InvokeAgentError, R>) -> AgentError {
    let detail = DisplayErrorContext(err).to_string();
    match err.as_service_error() {
        Some(service) => classify(
            service.is_access_denied_exception(),
            service.is_throttling_exception(),
            detail,
        ),
        None => AgentError::Unexpected(detail),
    }
}

fn stream_error<R: Debug>(err: &SdkError<ResponseStreamError, R>) -> AgentError {
    let detail = DisplayErrorContext(err).to_string();
    match err.as_service_error() {
        Some(service) => classify(
            service.is_access_denied_exception(),
            service.is_throttling_exception(),
            detail,
        ),
        None => AgentError::Unexpected(detail),
    }
}

fn classify(access_denied: bool, throttled: bool, detail: String) -> AgentError {
    if access_denied {
        AgentError::AccessDenied(detail)
    } else if throttled {
        AgentError::Throttling(detail)
    } else {
        AgentError::Service(detail)
    }
}
