//! PC-SyncBB: SyncBB over additive cost shares, resilient to coalitions of
//! up to half the agents.
//!
//! Every agent owns a one-hot encrypted vector `Z` over its domain. When an
//! agent picks a value it fetches `Z` from each lower-id neighbor and returns
//! a blinded ciphertext `Y`; the neighbor's decryption of `Y` and the
//! agent's own randomness are additive shares of the constraint cost.
//!
//! Whether the accumulated cost reached the upper bound is decided by a
//! [`BoundComparator`]. The search flow (forward, prune, backtrack, new
//! optimum, complete) is SyncBB's. Final values are reported in the clear
//! to the first agent (`NON_PRIVATE_FINISH`).

use crate::agent::{AgentSetup, DcopAgent};
use crate::assignment::Assignment;
use crate::comparator::{BoundComparator, BoundQuery, PlaintextComparator};
use crate::config::Algorithm;
use crate::error::CoreError;
use crate::metrics::{MetricEvent, MetricsSink};
use crate::one_hot::EncryptedOneHot;
use crate::outbox::{Outbox, Tagged};
use crate::paillier::{Ciphertext, KeyPair, PublicKey};
use crate::shares::{blinded_cost_share, q_infinity, share_bits, ShareTable};
use dcop_env::{AgentId, Cost, Problem, Route, Value, UNBOUNDED};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// PC-SyncBB message vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcSyncBbMessage {
    /// Public key of `owner`, sent to its higher-id neighbors
    PublicKey { owner: AgentId, key: PublicKey },
    /// Forward step with the sender's upper bound
    Cpa { cpa: Assignment, ub: Cost },
    /// Backward step with the sender's upper bound and optimum epoch
    Backtrack { ub: Cost, epoch: u64 },
    /// Ask a lower neighbor for its `Z` vector
    RequestVectorZ,
    /// The sender's `Z` vector
    ReplyVectorZ { z: Vec<Ciphertext> },
    /// Blinded cost share, encrypted under the receiver's key
    YShare { y: Ciphertext },
    /// Drop the share held for the sender's constraint
    ZeroShare,
    /// Last agent found a better complete assignment
    NewOptimumFound { cost: Cost, epoch: u64 },
    /// Search space exhausted
    Complete,
    /// Final value of `owner`
    NonPrivateFinish { owner: AgentId, value: Value },
}

impl Tagged for PcSyncBbMessage {
    fn tag(&self) -> &'static str {
        use PcSyncBbMessage::*;
        match self {
            PublicKey { .. } => "PUBLIC_KEY",
            Cpa { .. } => "CPA",
            Backtrack { .. } => "BACKTRACK",
            RequestVectorZ => "REQUEST_VECTOR_Z",
            ReplyVectorZ { .. } => "REPLY_VECTOR_Z",
            YShare { .. } => "Y_SHARE",
            ZeroShare => "ZERO_SHARE",
            NewOptimumFound { .. } => "NEW_OPTIMUM_FOUND",
            Complete => "COMPLETE",
            NonPrivateFinish { .. } => "NON_PRIVATE_FINISH",
        }
    }
}

/// Control state of one PC-SyncBB agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcSyncBbState {
    /// Not holding the search token
    Idle,
    /// Waiting for `pending` lower neighbors' `Z` vectors
    AwaitingVectors { pending: usize },
    /// Forwarded a CPA
    AwaitingChildResult,
    /// Sent the final value to the first agent
    Reported,
    /// First agent: waiting for every `NON_PRIVATE_FINISH`
    Collecting,
    /// First agent: solution assembled
    Terminated,
}

/// Final reports collected by the first agent.
#[derive(Debug, Default)]
struct Collector {
    solution: Assignment,
    received: usize,
}

/// One PC-SyncBB agent.
pub struct PcSyncBbAgent {
    id: AgentId,
    n: usize,
    problem: Arc<dyn Problem>,
    metrics: Arc<dyn MetricsSink>,
    rng: ChaCha8Rng,
    keys: KeyPair,
    comparator: Box<dyn BoundComparator>,
    state: PcSyncBbState,

    /// Neighbors with a smaller id, ascending
    lower: Vec<AgentId>,
    /// Neighbors with a larger id, ascending
    higher: Vec<AgentId>,
    peer_keys: BTreeMap<AgentId, PublicKey>,

    z: EncryptedOneHot,
    shares: ShareTable,
    share_ub: Cost,
    share_bits: u32,

    cpa: Assignment,
    /// Shuffled domain walked by `cursor`
    order: Vec<Value>,
    cursor: Option<usize>,

    ub: Cost,
    epoch: u64,
    optimal_setting: Option<Value>,
    collector: Option<Collector>,
}

impl PcSyncBbAgent {
    /// Creates an agent owning `keys`.
    pub fn new(mut setup: AgentSetup, keys: KeyPair) -> Result<Self, CoreError> {
        setup.validate()?;
        let n = setup.agents();
        Algorithm::PcSyncBb.check_agents(n)?;

        let id = setup.id;
        let problem = setup.problem;
        let (lower, higher): (Vec<AgentId>, Vec<AgentId>) =
            problem.neighbors(id).iter().partition(|t| **t < id);
        let z = EncryptedOneHot::new(keys.public(), problem.domain(id).len(), &mut setup.rng)?;
        let max_cost = problem.max_cost();

        Ok(Self {
            id,
            n,
            metrics: setup.metrics,
            rng: setup.rng,
            keys,
            comparator: Box::new(PlaintextComparator),
            state: PcSyncBbState::Idle,
            lower,
            higher,
            peer_keys: BTreeMap::new(),
            z,
            shares: ShareTable::new(),
            share_ub: 0,
            share_bits: share_bits(n, max_cost),
            cpa: Assignment::new(),
            order: Vec::new(),
            cursor: None,
            ub: UNBOUNDED,
            epoch: 0,
            optimal_setting: None,
            collector: None,
            problem,
        })
    }

    /// Replaces the bound comparator.
    pub fn with_comparator(mut self, comparator: Box<dyn BoundComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Current control state.
    pub fn state(&self) -> PcSyncBbState {
        self.state
    }

    /// Upper bound as known to this agent.
    pub fn upper_bound(&self) -> Cost {
        self.ub
    }

    /// Own value in the best solution seen so far.
    pub fn optimal_setting(&self) -> Option<Value> {
        self.optimal_setting
    }

    /// Share sum recorded with the latest optimum.
    pub fn share_upper_bound(&self) -> Cost {
        self.share_ub
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    fn own_value(&self) -> Result<Value, CoreError> {
        self.cpa
            .get(self.id)
            .ok_or_else(|| CoreError::invariant(self.id, "own variable not assigned"))
    }

    fn assign_cpa(&mut self, out: &mut Outbox<PcSyncBbMessage>) -> Result<(), CoreError> {
        let next = match self.cursor {
            None => {
                self.order = self.problem.domain(self.id).to_vec();
                self.order.shuffle(&mut self.rng);
                0
            }
            Some(k) => k + 1,
        };
        self.cursor = Some(next);

        let Some(&value) = self.order.get(next) else {
            return self.backtrack(out);
        };
        self.cpa.assign(self.id, value);
        let index = self
            .problem
            .domain_index(self.id, value)
            .ok_or_else(|| CoreError::invariant(self.id, format!("value {value} not in domain")))?;
        self.z.move_to(index);

        trace!(agent = %self.id, value, "requesting Z vectors");
        for &t in &self.lower {
            out.post(Route::To(t), PcSyncBbMessage::RequestVectorZ)?;
        }
        if self.lower.is_empty() {
            return self.shares_complete(out);
        }
        self.state = PcSyncBbState::AwaitingVectors {
            pending: self.lower.len(),
        };
        Ok(())
    }

    fn shares_complete(&mut self, out: &mut Outbox<PcSyncBbMessage>) -> Result<(), CoreError> {
        let query = BoundQuery {
            agent: self.id,
            cpa_cost: self.cpa.total_cost(self.problem.as_ref()),
            ub: self.ub,
            share_sum: self.shares.sum(),
        };
        self.metrics.record(self.id, MetricEvent::BoundComparison);
        let exceeds = self.comparator.exceeds_upper_bound(&query);

        if self.id.is_last(self.n) {
            if !exceeds {
                let epoch = self.epoch + 1;
                info!(agent = %self.id, cost = query.cpa_cost, epoch, "💡 new optimum");
                out.post(
                    Route::Broadcast,
                    PcSyncBbMessage::NewOptimumFound {
                        cost: query.cpa_cost,
                        epoch,
                    },
                )?;
                self.on_new_optimum(query.cpa_cost, epoch)?;
            }
            return self.assign_cpa(out);
        }

        if exceeds {
            self.metrics.record(self.id, MetricEvent::Prune);
            return self.assign_cpa(out);
        }

        let msg = PcSyncBbMessage::Cpa {
            cpa: self.cpa.clone(),
            ub: self.ub,
        };
        out.post(Route::Next, msg)?;
        self.state = PcSyncBbState::AwaitingChildResult;
        Ok(())
    }

    fn backtrack(&mut self, out: &mut Outbox<PcSyncBbMessage>) -> Result<(), CoreError> {
        if self.id.is_first() {
            info!(agent = %self.id, ub = self.ub, "search space exhausted");
            out.post(Route::Broadcast, PcSyncBbMessage::Complete)?;
            return self.on_complete(out);
        }

        for &t in &self.lower {
            self.shares.zero(t);
            out.post(Route::To(t), PcSyncBbMessage::ZeroShare)?;
        }
        self.cpa.unassign(self.id);
        let msg = PcSyncBbMessage::Backtrack {
            ub: self.ub,
            epoch: self.epoch,
        };
        out.post(Route::Previous, msg)?;
        self.state = PcSyncBbState::Idle;
        Ok(())
    }

    /// Records the own value of an optimum this agent has not seen yet.
    ///
    /// The own value cannot change between an optimum and the first message
    /// telling the agent about it, so the current value is the optimal one.
    fn on_new_optimum(&mut self, cost: Cost, epoch: u64) -> Result<(), CoreError> {
        self.ub = self.ub.min(cost);
        if epoch <= self.epoch {
            return Ok(());
        }
        self.epoch = epoch;
        self.optimal_setting = Some(self.own_value()?);
        self.share_ub = self.shares.sum();
        debug!(agent = %self.id, epoch, ub = self.ub, "optimum recorded");
        Ok(())
    }

    // =========================================================================
    // SHARE EXCHANGE
    // =========================================================================

    fn on_reply_vector_z(
        &mut self,
        from: AgentId,
        z: Vec<Ciphertext>,
        out: &mut Outbox<PcSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let PcSyncBbState::AwaitingVectors { pending } = self.state else {
            return Err(CoreError::unexpected(self.id, "REPLY_VECTOR_Z", self.state));
        };
        let key = self.peer_keys.get(&from).ok_or(CoreError::MissingPublicKey {
            agent: self.id,
            owner: from,
        })?;

        let value = self.own_value()?;
        let cost_row: Vec<Cost> = self
            .problem
            .domain(from)
            .iter()
            .map(|vt| self.problem.cost(self.id, value, from, *vt))
            .collect();
        let rho = self.rng.gen_range(0..(1i64 << self.share_bits));
        let y = blinded_cost_share(key, &z, &cost_row, rho, &mut self.rng)?;

        self.metrics.record(self.id, MetricEvent::EncryptedPayloads(1));
        out.post(Route::To(from), PcSyncBbMessage::YShare { y })?;
        self.shares.set(from, rho);

        if pending > 1 {
            self.state = PcSyncBbState::AwaitingVectors {
                pending: pending - 1,
            };
            return Ok(());
        }
        self.shares_complete(out)
    }

    // =========================================================================
    // TERMINATION
    // =========================================================================

    fn on_complete(&mut self, out: &mut Outbox<PcSyncBbMessage>) -> Result<(), CoreError> {
        let value = self
            .optimal_setting
            .ok_or_else(|| CoreError::invariant(self.id, "search completed without an optimum"))?;
        let msg = PcSyncBbMessage::NonPrivateFinish {
            owner: self.id,
            value,
        };
        out.post(Route::First, msg)?;
        self.state = if self.collector.is_some() {
            PcSyncBbState::Collecting
        } else {
            PcSyncBbState::Reported
        };
        Ok(())
    }

    fn on_non_private_finish(
        &mut self,
        owner: AgentId,
        value: Value,
        out: &mut Outbox<PcSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let (id, state, n) = (self.id, self.state, self.n);
        let collector = self
            .collector
            .as_mut()
            .ok_or_else(|| CoreError::unexpected(id, "NON_PRIVATE_FINISH", state))?;
        collector.solution.assign(owner, value);
        collector.received += 1;

        if collector.received == n {
            let solution = std::mem::take(&mut collector.solution);
            info!(agent = %id, "🏁 PC-SyncBB finished");
            self.state = PcSyncBbState::Terminated;
            out.finish(solution)?;
        }
        Ok(())
    }
}

impl DcopAgent for PcSyncBbAgent {
    type Message = PcSyncBbMessage;

    fn id(&self) -> AgentId {
        self.id
    }

    fn start(&mut self, out: &mut Outbox<PcSyncBbMessage>) -> Result<(), CoreError> {
        for &t in &self.higher {
            let msg = PcSyncBbMessage::PublicKey {
                owner: self.id,
                key: self.keys.public().clone(),
            };
            out.post(Route::To(t), msg)?;
            self.metrics.record(self.id, MetricEvent::PublicKeyShared);
        }

        if self.id.is_first() {
            self.collector = Some(Collector::default());
            self.share_ub = q_infinity(self.n, self.problem.max_cost());
            self.cpa = Assignment::new();
            self.cursor = None;
            return self.assign_cpa(out);
        }
        Ok(())
    }

    fn handle(
        &mut self,
        from: AgentId,
        msg: PcSyncBbMessage,
        out: &mut Outbox<PcSyncBbMessage>,
    ) -> Result<(), CoreError> {
        trace!(agent = %self.id, %from, tag = msg.tag(), "recv");
        match msg {
            PcSyncBbMessage::PublicKey { owner, key } => {
                self.peer_keys.insert(owner, key);
                Ok(())
            }
            PcSyncBbMessage::Cpa { cpa, ub } => {
                self.cpa = cpa;
                self.ub = self.ub.min(ub);
                self.cursor = None;
                self.assign_cpa(out)
            }
            PcSyncBbMessage::Backtrack { ub, epoch } => {
                self.on_new_optimum(ub, epoch)?;
                self.assign_cpa(out)
            }
            PcSyncBbMessage::RequestVectorZ => {
                let z = self.z.slots().to_vec();
                self.metrics
                    .record(self.id, MetricEvent::EncryptedPayloads(z.len() as u64));
                out.post(Route::To(from), PcSyncBbMessage::ReplyVectorZ { z })?;
                Ok(())
            }
            PcSyncBbMessage::ReplyVectorZ { z } => self.on_reply_vector_z(from, z, out),
            PcSyncBbMessage::YShare { y } => {
                let share = self.keys.decrypt_i64(&y)?;
                self.shares.set(from, share);
                Ok(())
            }
            PcSyncBbMessage::ZeroShare => {
                self.shares.zero(from);
                Ok(())
            }
            PcSyncBbMessage::NewOptimumFound { cost, epoch } => self.on_new_optimum(cost, epoch),
            PcSyncBbMessage::Complete => self.on_complete(out),
            PcSyncBbMessage::NonPrivateFinish { owner, value } => {
                self.on_non_private_finish(owner, value, out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::test_support::*;
    use dcop_env::TableProblem;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key_for(id: usize) -> KeyPair {
        KeyPair::generate(128, &mut ChaCha8Rng::seed_from_u64(2000 + id as u64)).unwrap()
    }

    fn agent(problem: &Arc<TableProblem>, id: usize, seed: u64) -> PcSyncBbAgent {
        PcSyncBbAgent::new(setup(problem, id, seed), key_for(id)).unwrap()
    }

    fn solve(problem: &TableProblem, seed: u64) -> (Assignment, Harness<PcSyncBbAgent>) {
        let problem = Arc::new(problem.clone());
        let agents = (0..problem.num_variables())
            .map(|i| agent(&problem, i, seed))
            .collect();
        let mut h = Harness::new(agents);
        let solution = h.run(1_000_000).unwrap();
        (solution, h)
    }

    fn outbox(id: usize, n: usize) -> Outbox<PcSyncBbMessage> {
        Outbox::new(AgentId(id), n, Arc::new(NoopMetrics))
    }

    #[test]
    fn test_equality_pair() {
        let problem = equality_pair();
        let (solution, h) = solve(&problem, 1);
        assert_eq!(solution.total_cost(&problem), 0);
        assert_eq!(h.sent("NON_PRIVATE_FINISH"), 2);
        assert_eq!(h.finishes, 1);
    }

    #[test]
    fn test_hard_constraint_avoided() {
        let problem = hard_constraint_chain(1000);
        for seed in 0..3 {
            let (solution, _) = solve(&problem, seed);
            assert_eq!(solution.to_vec(3), Some(vec![1, 1, 0]));
        }
    }

    #[test]
    fn test_matches_brute_force() {
        for seed in 0..4 {
            let problem = random_problem(5, 3, 10, 0.6, seed);
            let (solution, h) = solve(&problem, seed);
            assert_eq!(solution.total_cost(&problem), brute_force(&problem), "seed {seed}");
            assert!(solution.is_complete(5));
            assert!(h.sent("Y_SHARE") > 0);
        }
    }

    #[test]
    fn test_shares_add_up_to_constraint_cost() {
        let mut problem = TableProblem::uniform(2, 3, 20);
        for a in 0..3 {
            for b in 0..3 {
                problem.set_cost(AgentId(0), a, AgentId(1), b, 3 + 4 * a as Cost + b as Cost);
            }
        }
        let problem = Arc::new(problem);
        let (mut a0, mut a1) = (agent(&problem, 0, 9), agent(&problem, 1, 9));
        let (mut o0, mut o1) = (outbox(0, 2), outbox(1, 2));

        a1.start(&mut o1).unwrap();
        a0.start(&mut o0).unwrap();
        for e in o0.drain() {
            a1.handle(AgentId(0), e.body, &mut o1).unwrap();
        }
        // REQUEST_VECTOR_Z -> REPLY_VECTOR_Z
        for e in o1.drain() {
            a0.handle(AgentId(1), e.body, &mut o0).unwrap();
        }
        for e in o0.drain() {
            a1.handle(AgentId(0), e.body, &mut o1).unwrap();
        }

        let sent = o1.drain();
        let y = sent.iter().find_map(|e| match &e.body {
            PcSyncBbMessage::YShare { y } => Some(y.clone()),
            _ => None,
        });
        let cost = sent.iter().find_map(|e| match &e.body {
            PcSyncBbMessage::NewOptimumFound { cost, .. } => Some(*cost),
            _ => None,
        });
        a0.handle(AgentId(1), PcSyncBbMessage::YShare { y: y.unwrap() }, &mut o0)
            .unwrap();

        let total = a0.shares.get(AgentId(1)) + a1.shares.get(AgentId(0));
        assert_eq!(Some(total), cost);

        a0.handle(AgentId(1), PcSyncBbMessage::ZeroShare, &mut o0).unwrap();
        assert_eq!(a0.shares.get(AgentId(1)), 0);
    }

    #[test]
    fn test_backtrack_carries_unseen_optimum() {
        let mut problem = TableProblem::uniform(3, 2, 10);
        problem.set_cost(AgentId(1), 0, AgentId(2), 0, 1);
        let problem = Arc::new(problem);
        let mut a1 = agent(&problem, 1, 4);
        let mut out = outbox(1, 3);
        a1.start(&mut out).unwrap();
        out.drain();

        let cpa: Assignment = [(AgentId(0), 0)].into_iter().collect();
        a1.handle(AgentId(0), PcSyncBbMessage::Cpa { cpa, ub: UNBOUNDED }, &mut out)
            .unwrap();
        let chosen = out.drain().iter().find_map(|e| match &e.body {
            PcSyncBbMessage::Cpa { cpa, .. } => cpa.get(AgentId(1)),
            _ => None,
        });
        assert!(chosen.is_some());

        a1.handle(AgentId(2), PcSyncBbMessage::Backtrack { ub: 3, epoch: 1 }, &mut out)
            .unwrap();
        assert_eq!(a1.optimal_setting(), chosen);
        assert_eq!(a1.upper_bound(), 3);

        // The broadcast of the same optimum arrives after the value moved on
        a1.handle(AgentId(2), PcSyncBbMessage::NewOptimumFound { cost: 3, epoch: 1 }, &mut out)
            .unwrap();
        assert_eq!(a1.optimal_setting(), chosen);
    }

    #[derive(Debug)]
    struct CountingComparator(Arc<AtomicUsize>);

    impl BoundComparator for CountingComparator {
        fn exceeds_upper_bound(&mut self, query: &BoundQuery) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            PlaintextComparator.exceeds_upper_bound(query)
        }
    }

    #[test]
    fn test_injected_comparator_is_consulted() {
        let problem = Arc::new(random_problem(4, 2, 10, 0.8, 11));
        let calls = Arc::new(AtomicUsize::new(0));
        let agents = (0..4)
            .map(|i| {
                agent(&problem, i, 2)
                    .with_comparator(Box::new(CountingComparator(calls.clone())))
            })
            .collect();
        let mut h = Harness::new(agents);
        let solution = h.run(1_000_000).unwrap();

        assert_eq!(solution.total_cost(problem.as_ref()), brute_force(problem.as_ref()));
        assert!(calls.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn test_first_agent_holds_initial_share_bound() {
        let problem = Arc::new(TableProblem::uniform(3, 2, 10));
        let mut a0 = agent(&problem, 0, 1);
        let mut out = outbox(0, 3);
        a0.start(&mut out).unwrap();
        assert_eq!(a0.share_upper_bound(), 31);
    }

    #[test]
    fn test_first_agent_collects_before_terminating() {
        let problem = Arc::new(TableProblem::uniform(2, 1, 10));
        let mut a0 = agent(&problem, 0, 1);
        let mut out = outbox(0, 2);
        a0.start(&mut out).unwrap();
        out.drain();

        a0.handle(AgentId(1), PcSyncBbMessage::Backtrack { ub: 0, epoch: 1 }, &mut out)
            .unwrap();
        assert_eq!(a0.state(), PcSyncBbState::Collecting);
        assert!(!out.is_finished());

        for owner in 0..2 {
            let msg = PcSyncBbMessage::NonPrivateFinish {
                owner: AgentId(owner),
                value: 0,
            };
            a0.handle(AgentId(owner), msg, &mut out).unwrap();
        }
        assert_eq!(a0.state(), PcSyncBbState::Terminated);
        assert!(out.is_finished());
    }

    #[test]
    fn test_other_agents_end_reported() {
        let problem = random_problem(4, 2, 10, 0.6, 3);
        let (_, h) = solve(&problem, 2);
        assert_eq!(h.agent(0).state(), PcSyncBbState::Terminated);
        for i in 1..4 {
            assert_eq!(h.agent(i).state(), PcSyncBbState::Reported);
        }
    }

    #[test]
    fn test_single_agent_rejected() {
        let problem = Arc::new(TableProblem::uniform(1, 2, 5));
        assert!(matches!(
            PcSyncBbAgent::new(setup(&problem, 0, 1), key_for(0)),
            Err(CoreError::Config(_))
        ));
    }
}
