//! Error types for the DCOP environment abstraction.

use crate::types::AgentId;
use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Target agent id lies outside `[0, N)`
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// `Route::Previous` used by the first agent in the ordering
    #[error("Agent {0} has no predecessor")]
    NoPredecessor(AgentId),

    /// `Route::Next` used by the last agent in the ordering
    #[error("Agent {0} has no successor")]
    NoSuccessor(AgentId),

    /// Transport channel closed (peer shut down)
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl EnvError {
    /// Creates a channel-closed error.
    pub fn closed(msg: impl Into<String>) -> Self {
        Self::ChannelClosed(msg.into())
    }
}
