//! Agent reply model.

use super::AgentError;

/// Prefix shared by every fallback message shown to the chat user
pub const FALLBACK_MARKER: &str = "🤖";

/// Why the agent did not produce a genuine answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The agent finished without any text
    EmptyResponse,
    /// The agent service denied access (usually still being provisioned)
    Configuring,
    /// The agent service throttled the request
    Busy,
    /// Any other error reported by the agent service
    ServiceTrouble,
    /// A failure outside the agent service's error model
    Unexpected,
}

impl FallbackReason {
    /// User-facing message for this reason
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::EmptyResponse => {
                "🤖 I received your message but couldn't generate a response. Please try again!"
            }
            Self::Configuring => {
                "🤖 Bot is currently being configured. Please try again in a few minutes!"
            }
            Self::Busy => "🤖 I'm a bit busy right now. Please try again in a moment!",
            Self::ServiceTrouble => {
                "🤖 Sorry, I'm having trouble processing your request right now. Please try again later!"
            }
            Self::Unexpected => "🤖 Something went wrong. Please try again!",
        }
    }
}

impl From<&AgentError> for FallbackReason {
    fn from(err: &AgentError) -> Self {
        match err {
            AgentError::AccessDenied(_) => Self::Configuring,
            AgentError::Throttling(_) => Self::Busy,
            AgentError::Service(_) => Self::ServiceTrouble,
            AgentError::Unexpected(_) => Self::Unexpected,
        }
    }
}

/// Outcome of asking the agent for a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    /// Trimmed, non-empty text produced by the agent
    Answer(String),
    /// The agent could not answer; the user gets a fixed message instead
    Fallback(FallbackReason),
}

impl AgentReply {
    /// Text to deliver to the chat
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Answer(text) => text,
            Self::Fallback(reason) => reason.message(),
        }
    }

    /// Whether this is a genuine agent answer
    #[must_use]
    pub const fn is_answer(&self) -> bool {
        matches!(self, Self::Answer(_))
    }
}
