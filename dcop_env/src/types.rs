//! Common types for the DCOP environment abstraction.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};

/// A value from a variable's finite domain.
pub type Value = i32;

/// Constraint cost. Accumulated costs stay far below `Cost::MAX`.
pub type Cost = i64;

/// Upper bound before any complete assignment has been found.
pub const UNBOUNDED: Cost = Cost::MAX;

/// Identifier of an agent (and of the single variable it owns).
///
/// Ids are dense in `[0, N)` and double as the total order of the search
/// chain: agent 0 is the first agent, agent `N-1` the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub usize);

impl AgentId {
    /// The first agent in the ordering.
    pub const FIRST: AgentId = AgentId(0);

    /// Returns the raw index.
    pub fn index(&self) -> usize {
        self.0
    }

    /// Returns true for the first agent in the ordering.
    pub fn is_first(&self) -> bool {
        self.0 == 0
    }

    /// Returns true for the last agent of an `n`-agent ordering.
    pub fn is_last(&self, n: usize) -> bool {
        self.0 + 1 == n
    }

    /// Returns the last agent of an `n`-agent ordering.
    pub fn last(n: usize) -> AgentId {
        AgentId(n.saturating_sub(1))
    }

    /// Iterates over all ids of an `n`-agent ordering.
    pub fn all(n: usize) -> impl Iterator<Item = AgentId> {
        (0..n).map(AgentId)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a{}", self.0)
    }
}

impl From<usize> for AgentId {
    fn from(index: usize) -> Self {
        AgentId(index)
    }
}

/// Addressing as seen by the sending agent.
///
/// Relative routes are resolved against the sender's position in the
/// ordering, mirroring "send to next/previous/first/last agent".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A specific agent (may be the sender itself)
    To(AgentId),
    /// The successor in the ordering
    Next,
    /// The predecessor in the ordering
    Previous,
    /// Agent 0
    First,
    /// Agent N-1
    Last,
    /// Every agent except the sender
    Broadcast,
}

impl Route {
    /// Resolves this route for `sender` in an ordering of `n` agents.
    ///
    /// # Returns
    /// * `Ok(Recipient)` - Concrete recipient(s)
    /// * `Err(EnvError)` - Route leaves `[0, n)`
    pub fn resolve(self, sender: AgentId, n: usize) -> Result<Recipient, EnvError> {
        let target = match self {
            Route::Broadcast => return Ok(Recipient::Broadcast),
            Route::To(id) => id,
            Route::First => AgentId::FIRST,
            Route::Last => AgentId::last(n),
            Route::Next => {
                if sender.is_last(n) {
                    return Err(EnvError::NoSuccessor(sender));
                }
                AgentId(sender.0 + 1)
            }
            Route::Previous => {
                if sender.is_first() {
                    return Err(EnvError::NoPredecessor(sender));
                }
                AgentId(sender.0 - 1)
            }
        };

        if target.0 >= n {
            return Err(EnvError::UnknownAgent(target));
        }
        Ok(Recipient::Agent(target))
    }
}

/// Resolved destination of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Point-to-point delivery
    Agent(AgentId),
    /// Fan-out to every agent except the sender
    Broadcast,
}

/// A message in flight between agents.
///
/// Bodies are owned values: whatever the sender put in is moved (or cloned
/// for broadcast fan-out), so no two agents ever alias the same payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    /// Sending agent
    pub from: AgentId,

    /// Destination
    pub to: Recipient,

    /// Protocol message
    pub body: M,
}

impl<M> Envelope<M> {
    /// Creates a new envelope.
    pub fn new(from: AgentId, to: Recipient, body: M) -> Self {
        Self { from, to, body }
    }

    /// Expands a broadcast into point-to-point envelopes for `n` agents.
    ///
    /// Point-to-point envelopes are returned unchanged.
    pub fn fan_out(self, n: usize) -> Vec<(AgentId, M)>
    where
        M: Clone,
    {
        match self.to {
            Recipient::Agent(id) => vec![(id, self.body)],
            Recipient::Broadcast => AgentId::all(n)
                .filter(|id| *id != self.from)
                .map(|id| (id, self.body.clone()))
                .collect(),
        }
    }
}
