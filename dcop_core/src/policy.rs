//! When P-SyncBB runs its secure prefix sum and bound comparison.

use crate::config::AgentConfig;
use dcop_env::AgentId;
use std::fmt::Debug;

/// What a policy may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyView {
    /// Deciding agent
    pub agent: AgentId,
    /// Number of agents
    pub agents: usize,
    /// True once the prefix cost for the current CPA is known
    pub prefix_known: bool,
}

/// Decides whether the secure sub-protocols run for a forward step.
///
/// The engine only consults the policy for agents that can run them at all
/// (ids 3..N-1; agent 0 answers the comparison, agent 1 relays it and
/// agent 2's prefix would have a single contributor).
pub trait SecureSumPolicy: Send + Sync + Debug {
    /// Run Protocol 3 (prefix sum) before deciding?
    fn should_run_secure_sum(&self, view: &PolicyView) -> bool;

    /// Run Protocol 4 (bound comparison) for the chosen candidate?
    fn should_check_bound(&self, view: &PolicyView) -> bool;
}

/// Runs both sub-protocols for every agent with id >= `min_agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    /// Smallest participating id
    pub min_agent: usize,
}

impl ThresholdPolicy {
    /// Reads the threshold from the run configuration.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            min_agent: config.secure_sum_threshold,
        }
    }

    /// Never runs the sub-protocols (no pruning at all).
    pub fn disabled() -> Self {
        Self {
            min_agent: usize::MAX,
        }
    }
}

impl SecureSumPolicy for ThresholdPolicy {
    fn should_run_secure_sum(&self, view: &PolicyView) -> bool {
        !view.prefix_known && view.agent.0 >= self.min_agent
    }

    fn should_check_bound(&self, view: &PolicyView) -> bool {
        view.prefix_known && view.agent.0 >= self.min_agent
    }
}
