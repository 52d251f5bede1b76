//! Testing helpers and mock utilities.
//!
//! Provides convenient constructors for mocked agent, reply and storage seams.

use bytes::Bytes;
use futures_util::{stream, StreamExt};

use crate::agent::{AgentError, FragmentStream, MockAgentRuntime};
use crate::reply::MockReplySender;
use crate::storage::MockConversationStore;

/// Build a fragment stream that yields `chunks` in order.
#[must_use]
pub fn fragments(chunks: &[&str]) -> FragmentStream {
    let parts: Vec<Result<Bytes, AgentError>> = chunks
        .iter()
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk.as_bytes())))
        .collect();
    stream::iter(parts).boxed()
}

/// Create a mock agent runtime that streams `chunks` for every invocation.
#[must_use]
pub fn mock_agent_chunks(chunks: &[&'static str]) -> MockAgentRuntime {
    let chunks = chunks.to_vec();
    let mut mock = MockAgentRuntime::new();
    mock.expect_invoke()
        .returning(move |_, _| Ok(fragments(&chunks)));
    mock
}

/// Create a mock agent runtime that fails every invocation with `err`.
#[must_use]
pub fn mock_agent_error(err: AgentError) -> MockAgentRuntime {
    let mut mock = MockAgentRuntime::new();
    mock.expect_invoke().returning(move |_, _| Err(err.clone()));
    mock
}

/// Create a mock reply sender whose every send reports `delivered`.
#[must_use]
pub fn mock_sender_status(delivered: bool) -> MockReplySender {
    let mut mock = MockReplySender::new();
    mock.expect_send().returning(move |_, _| Ok(delivered));
    mock
}

/// Create a mock conversation store that accepts everything (noop).
#[must_use]
pub fn mock_storage_noop() -> MockConversationStore {
    let mut mock = MockConversationStore::new();
    mock.expect_put_conversation().returning(|_| Ok(()));
    mock.expect_check_connection().returning(|| Ok(()));
    mock
}
