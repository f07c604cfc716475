//! Production implementation of AgentContext backed by OS entropy.

use crate::context::AgentContext;
use crate::types::AgentId;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Unseeded context: every agent RNG is drawn from OS entropy.
///
/// Runs under this context are not reproducible. Use the simulator's
/// `SimContext` when a failing run has to be replayed.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsContext;

impl OsContext {
    /// Creates a new OsContext.
    pub fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl AgentContext for OsContext {
    fn seed(&self) -> Option<u64> {
        None
    }

    fn agent_rng(&self, _agent: AgentId) -> ChaCha8Rng {
        ChaCha8Rng::from_entropy()
    }
}
