//! Additive blinding for the P-SyncBB secure sums and bound comparison.
//!
//! Secure sums work in `Z_2^64` with wrapping arithmetic. Every participant
//! sends one uniformly random mask to every other participant and reports
//! `cost - Σ sent + Σ received`. Each report on its own is uniformly random;
//! only the sum of all reports equals the sum of the costs.
//!
//! ```text
//!  A1: c1 - m12 - m13 + m21 + m31  ─┐
//!  A2: c2 - m21 - m23 + m12 + m32  ─┼─► Σ = c1 + c2 + c3
//!  A3: c3 - m31 - m32 + m13 + m23  ─┘
//! ```

use dcop_env::{AgentId, Cost};
use rand::Rng;
use std::collections::HashMap;

/// Identifies one summation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Full-assignment sum requested by the first agent (Protocol 2)
    Sum(u64),
    /// Prefix sum requested by the given agent (Protocol 3)
    Prefix(AgentId),
}

#[derive(Debug, Default)]
struct Contribution {
    sent: bool,
    received: usize,
    acc: u64,
}

/// Participant side of all open summation rounds.
///
/// Masks of a round may arrive before the participant learns about the
/// round itself, so rounds are opened by whichever event comes first.
#[derive(Debug, Default)]
pub struct BlindingSessions {
    open: HashMap<SessionKey, Contribution>,
}

impl BlindingSessions {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the participant's own cost and draws one mask per peer.
    ///
    /// # Returns
    /// The `(peer, mask)` pairs to send.
    pub fn contribute<R: Rng + ?Sized>(
        &mut self,
        key: SessionKey,
        own_cost: Cost,
        peers: &[AgentId],
        rng: &mut R,
    ) -> Vec<(AgentId, u64)> {
        let entry = self.open.entry(key).or_default();
        entry.sent = true;
        entry.acc = entry.acc.wrapping_add(own_cost as u64);

        peers
            .iter()
            .map(|peer| {
                let mask: u64 = rng.gen();
                entry.acc = entry.acc.wrapping_sub(mask);
                (*peer, mask)
            })
            .collect()
    }

    /// Absorbs a mask received from a peer.
    pub fn absorb(&mut self, key: SessionKey, mask: u64) {
        let entry = self.open.entry(key).or_default();
        entry.received += 1;
        entry.acc = entry.acc.wrapping_add(mask);
    }

    /// Closes the round once the own masks went out and `expected` peer
    /// masks came in, returning the blinded report.
    pub fn take_ready(&mut self, key: SessionKey, expected: usize) -> Option<u64> {
        let ready = self
            .open
            .get(&key)
            .is_some_and(|c| c.sent && c.received >= expected);
        if ready {
            self.open.remove(&key).map(|c| c.acc)
        } else {
            None
        }
    }

    /// Number of rounds still open.
    pub fn pending(&self) -> usize {
        self.open.len()
    }
}

/// Collector side: adds blinded reports until all have arrived.
#[derive(Debug, Clone)]
pub struct MaskedSum {
    expected: usize,
    received: usize,
    total: u64,
}

impl MaskedSum {
    /// Waits for `expected` reports.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            received: 0,
            total: 0,
        }
    }

    /// Adds one report; returns true when the sum is complete.
    pub fn add(&mut self, report: u64) -> bool {
        self.received += 1;
        self.total = self.total.wrapping_add(report);
        self.is_complete()
    }

    /// Returns true when every report has arrived.
    pub fn is_complete(&self) -> bool {
        self.received >= self.expected
    }

    /// Unblinded total. Meaningful only once complete.
    pub fn value(&self) -> Cost {
        self.total as Cost
    }
}

/// Secret affine mask shared by the deciding agent and the first agent for
/// one Protocol 4 round.
///
/// The relay only ever sees `±(scale·v + offset)` of an odd encoded cost and
/// an even encoded bound, so the two never tie and the relay learns neither
/// value. The sign flip hides which way the comparison went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonMask {
    scale: i128,
    offset: i128,
    flip: bool,
}

impl ComparisonMask {
    /// Draws a fresh mask.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            scale: rng.gen_range(1..=i128::from(u32::MAX)),
            offset: rng.gen_range(0..(1i128 << 64)),
            flip: rng.gen(),
        }
    }

    /// Encodes the deciding agent's accumulated cost.
    pub fn mask_cost(&self, cost: Cost) -> i128 {
        self.apply(2 * i128::from(cost) + 1)
    }

    /// Encodes the first agent's upper bound.
    pub fn mask_bound(&self, bound: Cost) -> i128 {
        self.apply(2 * i128::from(bound))
    }

    /// Turns the relay's `cost > bound` bit on masked values into `cost >= bound`.
    pub fn unmask(&self, masked_greater: bool) -> bool {
        masked_greater ^ self.flip
    }

    fn apply(&self, v: i128) -> i128 {
        let m = self.scale * v + self.offset;
        if self.flip {
            -m
        } else {
            m
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_three_party_sum() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let key = SessionKey::Sum(1);
        let ids = [AgentId(1), AgentId(2), AgentId(3)];
        let costs = [7, 0, 12];
        let mut tables: Vec<BlindingSessions> = (0..3).map(|_| BlindingSessions::new()).collect();

        let mut in_flight = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let peers: Vec<AgentId> = ids.iter().copied().filter(|p| p != id).collect();
            for (peer, mask) in tables[i].contribute(key, costs[i], &peers, &mut rng) {
                in_flight.push((peer, mask));
            }
        }
        for (peer, mask) in in_flight {
            tables[peer.0 - 1].absorb(key, mask);
        }

        let mut sum = MaskedSum::new(3);
        for (i, table) in tables.iter_mut().enumerate() {
            let report = table.take_ready(key, 2).unwrap();
            assert_ne!(report, costs[i] as u64);
            sum.add(report);
        }
        assert!(sum.is_complete());
        assert_eq!(sum.value(), 19);
    }

    #[test]
    fn test_masks_before_round_start() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let key = SessionKey::Prefix(AgentId(4));
        let mut table = BlindingSessions::new();

        table.absorb(key, 10);
        assert_eq!(table.take_ready(key, 1), None);

        let masks = table.contribute(key, 3, &[AgentId(2)], &mut rng);
        let report = table.take_ready(key, 1).unwrap();
        assert_eq!(report, 13u64.wrapping_sub(masks[0].1));
        assert_eq!(table.pending(), 0);
    }

    #[test]
    fn test_single_participant_reports_plain_cost() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let key = SessionKey::Sum(9);
        let mut table = BlindingSessions::new();
        assert!(table.contribute(key, 42, &[], &mut rng).is_empty());
        assert_eq!(table.take_ready(key, 0), Some(42));
    }

    proptest! {
        #[test]
        fn prop_masked_comparison(cost in 0i64..1_000_000, bound in 0i64..1_000_000, seed in any::<u64>()) {
            let mask = ComparisonMask::random(&mut ChaCha8Rng::seed_from_u64(seed));
            let greater = mask.mask_cost(cost) > mask.mask_bound(bound);
            prop_assert_eq!(mask.unmask(greater), cost >= bound);
        }

        #[test]
        fn prop_unbounded_never_exceeded(cost in 0i64..1_000_000_000, seed in any::<u64>()) {
            let mask = ComparisonMask::random(&mut ChaCha8Rng::seed_from_u64(seed));
            let greater = mask.mask_cost(cost) > mask.mask_bound(dcop_env::UNBOUNDED);
            prop_assert!(!mask.unmask(greater));
        }
    }
}
