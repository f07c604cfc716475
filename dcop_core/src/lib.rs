//! DCOP Core - Distributed Branch-and-Bound with Cost and Decision Privacy
//!
//! This library implements three synchronous branch-and-bound searches over a
//! chain of agents, each owning one variable:
//! 1. **SyncBB**: the baseline; the CPA travels along the chain with plain
//!    lower and upper bounds
//! 2. **P-SyncBB**: costs are summed and compared through additive blinding,
//!    and the winning assignment is kept encrypted under each owner's
//!    Paillier key until the end
//! 3. **PC-SyncBB**: costs are held as additive shares built from one-hot
//!    encrypted domain vectors; bound checks go through an injected
//!    comparator
//!
//! Agents are sans-IO state machines ([`DcopAgent`]): a host delivers one
//! message at a time and ships whatever the agent queued in its [`Outbox`].

pub mod agent;
pub mod assignment;
pub mod blinding;
pub mod comparator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod one_hot;
pub mod outbox;
pub mod p_sync_bb;
pub mod paillier;
pub mod pc_sync_bb;
pub mod policy;
pub mod privacy_view;
pub mod shares;
pub mod sync_bb;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use agent::{AgentSetup, DcopAgent};
pub use assignment::Assignment;
pub use comparator::{BoundComparator, BoundQuery, PlaintextComparator};
pub use config::{AgentConfig, Algorithm, MIN_SECURE_SUM_THRESHOLD};
pub use error::{CoreError, CryptoError};
pub use metrics::{CounterMetrics, MetricEvent, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use outbox::{Outbox, Tagged};
pub use p_sync_bb::{PSyncBbAgent, PSyncBbMessage, PSyncBbState};
pub use paillier::{Ciphertext, KeyPair, PublicKey};
pub use pc_sync_bb::{PcSyncBbAgent, PcSyncBbMessage, PcSyncBbState};
pub use policy::{PolicyView, SecureSumPolicy, ThresholdPolicy};
pub use privacy_view::{PrivacyPreservingView, PrivateAgentView};
pub use sync_bb::{SyncBbAgent, SyncBbMessage, SyncBbState};
