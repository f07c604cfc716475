//! Error types for the DCOP core.

use dcop_env::{AgentId, EnvError};
use thiserror::Error;

/// Cryptographic failures.
///
/// Every variant is fatal for the run: a ciphertext that cannot be
/// processed would corrupt cost accounting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Ciphertext was produced under another public key
    #[error("Ciphertext under key {found:#018x} used with key {expected:#018x}")]
    KeyMismatch { expected: u64, found: u64 },

    /// Ciphertext value is not an element of Z_{n^2}
    #[error("Ciphertext out of range for key {0:#018x}")]
    CiphertextOutOfRange(u64),

    /// Decrypted value does not fit the requested integer type
    #[error("Plaintext does not fit in 64 bits")]
    PlaintextOverflow,

    /// One-hot encoding requested for an empty domain
    #[error("Cannot encode an empty domain")]
    EmptyDomain,

    /// Encrypted vector and cost row disagree in length
    #[error("Vector of length {found} where {expected} was expected")]
    LengthMismatch { expected: usize, found: usize },

    /// Key generation failed (bad size, prime search exhausted)
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
}

/// Errors raised by agents while handling messages.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Routing failure
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Cryptographic misuse
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Message not valid in the agent's current state
    #[error("Agent {agent} cannot handle {tag} while {state}")]
    UnexpectedMessage {
        agent: AgentId,
        tag: &'static str,
        state: String,
    },

    /// Peer key needed before it was received
    #[error("Agent {agent} has no public key for {owner}")]
    MissingPublicKey { agent: AgentId, owner: AgentId },

    /// Internal protocol invariant broken
    #[error("Protocol invariant violated at {agent}: {detail}")]
    ProtocolInvariant { agent: AgentId, detail: String },

    /// Invalid configuration or problem shape
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Creates an invariant-violation error.
    pub fn invariant(agent: AgentId, detail: impl Into<String>) -> Self {
        Self::ProtocolInvariant {
            agent,
            detail: detail.into(),
        }
    }

    /// Creates an unexpected-message error.
    pub fn unexpected(agent: AgentId, tag: &'static str, state: impl std::fmt::Debug) -> Self {
        Self::UnexpectedMessage {
            agent,
            tag,
            state: format!("{state:?}"),
        }
    }
}
