//! Network transport abstraction for DCOP agents.

use crate::error::EnvError;
use crate::types::{AgentId, Envelope};
use async_trait::async_trait;

/// Abstraction for message I/O between agents.
///
/// Delivery guarantees are deliberately weak: envelopes on the same
/// (sender, receiver) link arrive in send order, nothing else is promised.
/// Envelopes sent to different agents may be observed in any relative
/// order.
///
/// # Implementations
///
/// - **Simulation**: the event router in `dcop_sim` (no transport at all,
///   agents are driven synchronously)
/// - **Actors**: `ChannelTransport` in `dcop_sim`, one tokio mpsc inbox per agent
///
/// # Message Flow
///
/// ```text
/// Agent A                    Router                     Agent B
///   |                           |                          |
///   |-- send(B, envelope) ----->|                          |
///   |                           |-- [per-link FIFO] ------>|
///   |                           |                          |-- recv() -> envelope
/// ```
#[async_trait]
pub trait NetworkTransport<M: Send + 'static>: Send + Sync + 'static {
    /// Sends an envelope to a concrete agent.
    ///
    /// # Arguments
    /// * `target` - The destination agent (may be the sender itself)
    /// * `envelope` - The message and its sender
    ///
    /// # Returns
    /// * `Ok(())` - Envelope queued for delivery
    /// * `Err(EnvError::UnknownAgent)` - `target` is not part of the run
    /// * `Err(EnvError::ChannelClosed)` - The receiver has shut down
    async fn send(&self, target: AgentId, envelope: Envelope<M>) -> Result<(), EnvError>;

    /// Receives the next envelope addressed to this agent.
    ///
    /// # Returns
    /// * `Some(envelope)` - An envelope was received
    /// * `None` - The channel was closed (shutdown)
    async fn recv(&self) -> Option<Envelope<M>>;

    /// Returns this agent's id.
    fn local_id(&self) -> AgentId;
}
