//! Metric events pushed by agents.
//!
//! Agents never expose counters for outside reads. They push events into a
//! [`MetricsSink`] handed to them at construction; the harness decides what
//! to aggregate.

use dcop_env::AgentId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One reportable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricEvent {
    /// A message left an agent (`recipients` > 1 for broadcast)
    MessageSent {
        tag: &'static str,
        recipients: usize,
    },
    /// A public key was sent to a peer
    PublicKeyShared,
    /// SyncBB forward step; weighted by the number of assignments carried
    AssignmentsForwarded(u64),
    /// PC-SyncBB bound comparison invoked
    BoundComparison,
    /// Encrypted payloads sent (ciphertexts or blinded values)
    EncryptedPayloads(u64),
    /// A candidate value was pruned by the bound
    Prune,
    /// A secure summation round completed
    SecureSumRound,
}

/// Receiver of metric events. Shared by all agents of a run.
pub trait MetricsSink: Send + Sync {
    /// Records one event emitted by `agent`.
    fn record(&self, agent: AgentId, event: MetricEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _agent: AgentId, _event: MetricEvent) {}
}

/// Serializable view of [`CounterMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Total messages delivered to recipients
    pub messages: u64,
    /// Messages per tag
    pub messages_by_tag: BTreeMap<String, u64>,
    /// Public keys shared
    pub public_keys: u64,
    /// Weighted forward steps (SyncBB)
    pub assignments_forwarded: u64,
    /// Bound comparisons (PC-SyncBB)
    pub bound_comparisons: u64,
    /// Encrypted payloads
    pub encrypted_payloads: u64,
    /// Pruned candidates
    pub prunes: u64,
    /// Completed secure sums
    pub secure_sum_rounds: u64,
}

/// Thread-safe aggregate counters.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    messages: AtomicU64,
    public_keys: AtomicU64,
    assignments_forwarded: AtomicU64,
    bound_comparisons: AtomicU64,
    encrypted_payloads: AtomicU64,
    prunes: AtomicU64,
    secure_sum_rounds: AtomicU64,
    by_tag: Mutex<BTreeMap<&'static str, u64>>,
}

impl CounterMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the current values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let messages_by_tag = match self.by_tag.lock() {
            Ok(map) => map.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            Err(poisoned) => poisoned
                .into_inner()
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        };

        MetricsSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            messages_by_tag,
            public_keys: self.public_keys.load(Ordering::Relaxed),
            assignments_forwarded: self.assignments_forwarded.load(Ordering::Relaxed),
            bound_comparisons: self.bound_comparisons.load(Ordering::Relaxed),
            encrypted_payloads: self.encrypted_payloads.load(Ordering::Relaxed),
            prunes: self.prunes.load(Ordering::Relaxed),
            secure_sum_rounds: self.secure_sum_rounds.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSink for CounterMetrics {
    fn record(&self, _agent: AgentId, event: MetricEvent) {
        match event {
            MetricEvent::MessageSent { tag, recipients } => {
                self.messages.fetch_add(recipients as u64, Ordering::Relaxed);
                let mut map = match self.by_tag.lock() {
                    Ok(map) => map,
                    Err(poisoned) => poisoned.into_inner(),
                };
                *map.entry(tag).or_insert(0) += recipients as u64;
            }
            MetricEvent::PublicKeyShared => {
                self.public_keys.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::AssignmentsForwarded(n) => {
                self.assignments_forwarded.fetch_add(n, Ordering::Relaxed);
            }
            MetricEvent::BoundComparison => {
                self.bound_comparisons.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::EncryptedPayloads(n) => {
                self.encrypted_payloads.fetch_add(n, Ordering::Relaxed);
            }
            MetricEvent::Prune => {
                self.prunes.fetch_add(1, Ordering::Relaxed);
            }
            MetricEvent::SecureSumRound => {
                self.secure_sum_rounds.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
