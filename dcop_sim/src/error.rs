//! Error types for the simulation harness.

use dcop_core::{CoreError, CryptoError};
use dcop_env::EnvError;
use thiserror::Error;

/// Errors that end a simulated run.
#[derive(Debug, Error)]
pub enum SimError {
    /// Every queue drained before any agent finished
    #[error("Run stalled after {delivered} deliveries without a solution")]
    Stall { delivered: u64 },

    /// Delivery budget used up
    #[error("Delivery budget of {budget} messages exhausted")]
    BudgetExhausted { budget: u64 },

    /// An agent handler failed
    #[error("Agent failure: {0}")]
    Agent(#[from] CoreError),

    /// Key generation failed
    #[error("Key provider: {0}")]
    Crypto(#[from] CryptoError),

    /// Transport failure in the actor runtime
    #[error("Transport: {0}")]
    Transport(#[from] EnvError),

    /// An actor task panicked or was cancelled
    #[error("Actor task failed: {0}")]
    Join(String),

    /// Problem generation parameters cannot produce a valid problem
    #[error("Generator: {0}")]
    Generator(String),

    /// Problem too large for exhaustive search
    #[error("Search space of {0} assignments exceeds the oracle limit")]
    OracleLimit(u128),
}
