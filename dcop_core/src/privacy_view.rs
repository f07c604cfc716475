//! Pseudonymous views of an agent's id and domain.
//!
//! A view replaces the agent id with a negative code and every domain value
//! with a random code, so a solution can be reported without exposing which
//! agent picked which raw value. Views are derived from a seed and can be
//! regenerated by whoever holds it.

use dcop_env::{AgentId, Value};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One pseudonymous view of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivateAgentView {
    encoded_id: i64,
    #[serde(skip)]
    decoded_id: AgentId,
    #[serde(skip)]
    encoding: BTreeMap<Value, Value>,
    #[serde(skip)]
    decoding: BTreeMap<Value, Value>,
}

impl PrivateAgentView {
    /// Builds the view of `agent` over `domain` from `seed`.
    pub fn new(agent: AgentId, domain: &[Value], seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let encoded_id = -i64::from(rng.gen_range(1..=i32::MAX));

        let mut encoding = BTreeMap::new();
        let mut decoding = BTreeMap::new();
        for &value in domain {
            if encoding.contains_key(&value) {
                continue;
            }
            // Codes must stay distinct for decoding to be the inverse
            let code = loop {
                let c: Value = rng.gen();
                if !decoding.contains_key(&c) {
                    break c;
                }
            };
            encoding.insert(value, code);
            decoding.insert(code, value);
        }

        Self {
            encoded_id,
            decoded_id: agent,
            encoding,
            decoding,
        }
    }

    /// Pseudonym shown in place of the agent id. Always negative.
    pub fn encoded_id(&self) -> i64 {
        self.encoded_id
    }

    /// The real agent id.
    pub fn decoded_id(&self) -> AgentId {
        self.decoded_id
    }

    /// Code of a domain value (`None` outside the domain).
    pub fn encode(&self, value: Value) -> Option<Value> {
        self.encoding.get(&value).copied()
    }

    /// Domain value behind a code.
    pub fn decode(&self, code: Value) -> Option<Value> {
        self.decoding.get(&code).copied()
    }

    /// Codes of every value in `values` that belongs to the domain.
    pub fn encode_set(&self, values: &BTreeSet<Value>) -> BTreeSet<Value> {
        values.iter().filter_map(|v| self.encode(*v)).collect()
    }

    /// Values behind every known code in `codes`.
    pub fn decode_set(&self, codes: &BTreeSet<Value>) -> BTreeSet<Value> {
        codes.iter().filter_map(|c| self.decode(*c)).collect()
    }
}

/// Generator of views for one agent.
///
/// Seeded by the agent id, so the same agent always produces the same
/// sequence of views.
#[derive(Debug, Clone)]
pub struct PrivacyPreservingView {
    agent: AgentId,
    domain: Vec<Value>,
    rng: ChaCha8Rng,
    views: Vec<PrivateAgentView>,
}

impl PrivacyPreservingView {
    /// Creates the generator for `agent` with the given domain.
    pub fn new(agent: AgentId, domain: &[Value]) -> Self {
        Self {
            agent,
            domain: domain.to_vec(),
            rng: ChaCha8Rng::seed_from_u64(agent.0 as u64),
            views: Vec::new(),
        }
    }

    /// Derives and stores a fresh view.
    pub fn generate_view(&mut self) -> &PrivateAgentView {
        let seed: u64 = self.rng.gen();
        let index = self.views.len();
        self.views
            .push(PrivateAgentView::new(self.agent, &self.domain, seed));
        &self.views[index]
    }

    /// Stored view whose pseudonym is `encoded_id`.
    pub fn get_view(&self, encoded_id: i64) -> Option<&PrivateAgentView> {
        self.views.iter().find(|v| v.encoded_id == encoded_id)
    }

    /// Returns true if a stored view uses `encoded_id`.
    pub fn contains_view(&self, encoded_id: i64) -> bool {
        self.get_view(encoded_id).is_some()
    }

    /// All views generated so far.
    pub fn views(&self) -> impl Iterator<Item = &PrivateAgentView> {
        self.views.iter()
    }
}
