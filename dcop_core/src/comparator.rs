//! Bound comparison seam for PC-SyncBB.
//!
//! PC-SyncBB decides "accumulated CPA cost reached the upper bound" through a
//! secure comparison that runs among all agents on their cost shares. That
//! protocol executes outside this crate, so agents call it through
//! [`BoundComparator`] and the search only depends on the answer.

use dcop_env::{AgentId, Cost};
use std::fmt::Debug;

/// Inputs available to the deciding agent when it asks for a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundQuery {
    /// Deciding agent
    pub agent: AgentId,

    /// Cost of the current partial assignment, including the agent's value
    pub cpa_cost: Cost,

    /// Upper bound as known to the agent
    pub ub: Cost,

    /// Sum of the agent's own cost shares
    pub share_sum: Cost,
}

/// Answers whether the current partial assignment can still improve on
/// the best solution.
///
/// # Implementations
///
/// - **Simulation**: `PlaintextComparator` - plain `cost >= ub` check
/// - **Deployment**: an adapter to an externally executed secure comparison
pub trait BoundComparator: Send + Debug {
    /// Returns true when the CPA cost is at or above the upper bound.
    fn exceeds_upper_bound(&mut self, query: &BoundQuery) -> bool;
}

/// Keeps the search flow of SyncBB by comparing plaintext values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaintextComparator;

impl BoundComparator for PlaintextComparator {
    fn exceeds_upper_bound(&mut self, query: &BoundQuery) -> bool {
        query.cpa_cost >= query.ub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcop_env::UNBOUNDED;

    fn query(cpa_cost: Cost, ub: Cost) -> BoundQuery {
        BoundQuery {
            agent: AgentId(1),
            cpa_cost,
            ub,
            share_sum: 0,
        }
    }

    #[test]
    fn test_plaintext_comparator() {
        let mut cmp = PlaintextComparator;
        assert!(cmp.exceeds_upper_bound(&query(5, 5)));
        assert!(cmp.exceeds_upper_bound(&query(6, 5)));
        assert!(!cmp.exceeds_upper_bound(&query(4, 5)));
        assert!(!cmp.exceeds_upper_bound(&query(1_000_000, UNBOUNDED)));
    }
}
