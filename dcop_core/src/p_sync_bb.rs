//! P-SyncBB: SyncBB with secure sums, secure bound comparison and
//! decision privacy.
//!
//! The search skeleton is SyncBB's, but no agent ever sees another agent's
//! cost contribution:
//!
//! - **Protocol 2**: when the last agent completes an assignment it asks the
//!   first agent to check it (`CHECK_SOLUTION`). Agents `1..N-1` send the
//!   first agent blinded reports of their added costs; only the total is
//!   recoverable. Rounds carry a `sum_id` and stale reports are dropped.
//! - **Protocol 3**: an agent `k` learns the cost of its prefix the same way,
//!   from agents `1..k-1`.
//! - **Protocol 4**: agent `k` compares prefix + candidate cost against the
//!   first agent's upper bound through agent 1, which only sees masked values.
//! - **Decision privacy**: the first agent keeps the winning assignment as
//!   ciphertexts under each owner's key and only the owners decrypt them at
//!   the end (`ASSIGNMENT_IN_SOLUTION` → `TERMINATE` to the last agent).

use crate::agent::{AgentSetup, DcopAgent};
use crate::assignment::Assignment;
use crate::blinding::{BlindingSessions, ComparisonMask, MaskedSum, SessionKey};
use crate::config::{Algorithm, MIN_SECURE_SUM_THRESHOLD};
use crate::error::CoreError;
use crate::metrics::{MetricEvent, MetricsSink};
use crate::outbox::{Outbox, Tagged};
use crate::paillier::{Ciphertext, KeyPair, PublicKey};
use crate::policy::{PolicyView, SecureSumPolicy, ThresholdPolicy};
use dcop_env::{AgentId, Cost, Problem, Route, Value, UNBOUNDED};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Agent that relays Protocol 4.
const RELAY: AgentId = AgentId(1);

/// P-SyncBB message vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PSyncBbMessage {
    /// Public key of `owner`, sent once to the first agent
    PublicKey { owner: AgentId, key: PublicKey },
    /// Forward step
    Cpa { cpa: Assignment },
    /// Backward step
    Backtrack,
    /// Last agent completed an assignment
    CheckSolution,
    /// Start of full-assignment sum `sum_id`
    Protocol2 { sum_id: u64 },
    /// Blinding mask between two participants of sum `sum_id`
    Protocol2SendRandom { sum_id: u64, mask: u64 },
    /// Blinded report for sum `sum_id`
    Protocol2Result { sum_id: u64, report: u64 },
    /// Start of the prefix sum requested by the sender
    Protocol3,
    /// Blinding mask for the prefix sum of `initiator`
    Protocol3SendRandom { initiator: AgentId, mask: u64 },
    /// Blinded report for the prefix sum
    Protocol3Result { report: u64 },
    /// Comparison round: mask the bound with `mask`
    Protocol4Init { round: u8, mask: ComparisonMask },
    /// Masked bound, first agent → relay
    Protocol4FromA1 { round: u8, value: i128 },
    /// Masked cost, deciding agent → relay
    Protocol4FromAk { round: u8, value: i128 },
    /// Relay's masked comparison for round 1
    Protocol4Step5Result { greater: bool },
    /// Relay's masked comparison for round 2
    Protocol4Step6Result { greater: bool },
    /// First agent asks for the encrypted current value
    RequestCurrentAssignment,
    /// Current value, encrypted under the owner's key
    CurrentAssignment { owner: AgentId, value: Ciphertext },
    /// Final value, encrypted under the receiver's key
    AssignmentInSolution { value: Ciphertext },
    /// Decrypted final value, sent to the last agent
    Terminate { owner: AgentId, value: Value },
}

impl Tagged for PSyncBbMessage {
    fn tag(&self) -> &'static str {
        use PSyncBbMessage::*;
        match self {
            PublicKey { .. } => "PUBLIC_KEY",
            Cpa { .. } => "CPA",
            Backtrack => "BACKTRACK",
            CheckSolution => "CHECK_SOLUTION",
            Protocol2 { .. } => "PROTOCOL2",
            Protocol2SendRandom { .. } => "PROTOCOL2_SEND_RANDOM",
            Protocol2Result { .. } => "PROTOCOL2_RESULT",
            Protocol3 => "PROTOCOL3",
            Protocol3SendRandom { .. } => "PROTOCOL3_SEND_RANDOM",
            Protocol3Result { .. } => "PROTOCOL3_RESULT",
            Protocol4Init { .. } => "PROTOCOL4_INIT",
            Protocol4FromA1 { .. } => "PROTOCOL4_FROM_A1",
            Protocol4FromAk { .. } => "PROTOCOL4_FROM_AK",
            Protocol4Step5Result { .. } => "PROTOCOL4_STEP5_RESULT",
            Protocol4Step6Result { .. } => "PROTOCOL4_STEP6_RESULT",
            RequestCurrentAssignment => "REQUEST_CURRENT_ASSIGNMENT",
            CurrentAssignment { .. } => "CURRENT_ASSIGNMENT",
            AssignmentInSolution { .. } => "ASSIGNMENT_IN_SOLUTION",
            Terminate { .. } => "TERMINATE",
        }
    }
}

/// Control state of one P-SyncBB agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PSyncBbState {
    /// Not holding the search token
    Idle,
    /// Waiting for Protocol 3 reports
    AwaitingPrefixSum,
    /// Waiting for the relay's comparison bits
    AwaitingComparison,
    /// Forwarded a CPA
    AwaitingChildResult,
    /// Last agent: waiting for the first agent's request after a check
    AwaitingSolutionCheck,
    /// First agent: final values sent out
    Finalizing,
    /// Last agent: solution assembled
    Terminated,
}

/// Deciding agent's side of one Protocol 4 instance.
#[derive(Debug)]
struct Comparison {
    round: u8,
    mask: ComparisonMask,
    first_round: Option<bool>,
}

/// Relay's side: both masked values of the current round.
#[derive(Debug, Default)]
struct Relay {
    from_ak: Option<(AgentId, u8, i128)>,
    from_a1: Option<(u8, i128)>,
}

/// State only the first agent keeps.
#[derive(Debug)]
struct Leader {
    ub: Cost,
    latest_sum: u64,
    sum: Option<MaskedSum>,
    currently_best: bool,
    best_private: Vec<Option<Ciphertext>>,
    keys: Vec<Option<PublicKey>>,
    rca_counter: usize,
    awaiting_last: bool,
    finalize_pending: bool,
}

/// State only the last agent keeps.
#[derive(Debug, Default)]
struct Collector {
    solution: Assignment,
    received: usize,
}

/// One P-SyncBB agent.
pub struct PSyncBbAgent {
    id: AgentId,
    n: usize,
    problem: Arc<dyn Problem>,
    metrics: Arc<dyn MetricsSink>,
    rng: ChaCha8Rng,
    keys: KeyPair,
    policy: Box<dyn SecureSumPolicy>,
    state: PSyncBbState,

    cpa: Assignment,
    current_domain: Vec<Value>,
    candidate: Option<Value>,

    /// Prefix cost from Protocol 3, valid while `computed_prefix`
    computed_prefix: bool,
    prefix_cost: Cost,

    sessions: BlindingSessions,
    prefix_sum: Option<MaskedSum>,
    comparison: Option<Comparison>,
    relay: Relay,
    leader: Option<Leader>,
    collector: Option<Collector>,
}

impl PSyncBbAgent {
    /// Creates an agent owning `keys`.
    pub fn new(setup: AgentSetup, keys: KeyPair) -> Result<Self, CoreError> {
        setup.validate()?;
        setup.config.validate()?;
        let n = setup.agents();
        Algorithm::PSyncBb.check_agents(n)?;

        Ok(Self {
            id: setup.id,
            n,
            policy: Box::new(ThresholdPolicy::from_config(&setup.config)),
            problem: setup.problem,
            metrics: setup.metrics,
            rng: setup.rng,
            keys,
            state: PSyncBbState::Idle,
            cpa: Assignment::new(),
            current_domain: Vec::new(),
            candidate: None,
            computed_prefix: false,
            prefix_cost: 0,
            sessions: BlindingSessions::new(),
            prefix_sum: None,
            comparison: None,
            relay: Relay::default(),
            leader: None,
            collector: None,
        })
    }

    /// Replaces the secure-sum policy.
    pub fn with_policy(mut self, policy: Box<dyn SecureSumPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Current control state.
    pub fn state(&self) -> PSyncBbState {
        self.state
    }

    /// First agent's upper bound (`None` on other agents).
    pub fn upper_bound(&self) -> Option<Cost> {
        self.leader.as_ref().map(|l| l.ub)
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    fn own_value(&self) -> Result<Value, CoreError> {
        self.cpa
            .get(self.id)
            .ok_or_else(|| CoreError::invariant(self.id, "own variable not assigned"))
    }

    fn own_added_cost(&self) -> Result<Cost, CoreError> {
        let value = self.own_value()?;
        Ok(self.cpa.added_cost(self.problem.as_ref(), self.id, value))
    }

    fn choose_next_value(&mut self) -> Option<Value> {
        let value = self
            .cpa
            .min_cost_value(self.problem.as_ref(), self.id, &self.current_domain)?;
        self.current_domain.retain(|v| *v != value);
        Some(value)
    }

    fn policy_view(&self) -> PolicyView {
        PolicyView {
            agent: self.id,
            agents: self.n,
            prefix_known: self.computed_prefix,
        }
    }

    /// Secure sub-protocols need a deciding agent distinct from agents 0 and 1
    /// and at least two prefix contributors to mask each other.
    fn may_run_secure_path(&self) -> bool {
        self.id.0 >= MIN_SECURE_SUM_THRESHOLD && !self.id.is_last(self.n)
    }

    fn assign_cpa(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        self.candidate = self.choose_next_value();
        let Some(value) = self.candidate else {
            return self.backtrack(out);
        };

        if self.id.is_last(self.n) {
            self.cpa.assign(self.id, value);
            out.post(Route::First, PSyncBbMessage::CheckSolution)?;
            self.state = PSyncBbState::AwaitingSolutionCheck;
            return Ok(());
        }

        if !self.computed_prefix
            && self.may_run_secure_path()
            && self.policy.should_run_secure_sum(&self.policy_view())
        {
            self.start_prefix_sum(out)
        } else {
            self.after_prefix_sum(out)
        }
    }

    fn after_prefix_sum(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        if self.computed_prefix
            && self.may_run_secure_path()
            && self.policy.should_check_bound(&self.policy_view())
        {
            self.start_comparison(1, out)
        } else {
            self.after_bound_check(out)
        }
    }

    fn after_bound_check(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let value = self
            .candidate
            .ok_or_else(|| CoreError::invariant(self.id, "no candidate after bound check"))?;
        self.cpa.assign(self.id, value);
        let msg = PSyncBbMessage::Cpa {
            cpa: self.cpa.clone(),
        };
        out.post(Route::Next, msg)?;
        self.state = PSyncBbState::AwaitingChildResult;
        Ok(())
    }

    fn backtrack(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        if self.id.is_first() {
            let id = self.id;
            let leader = self.leader_mut("BACKTRACK")?;
            if leader.awaiting_last {
                debug!(agent = %id, "search over, waiting for last agent's value");
                leader.finalize_pending = true;
                return Ok(());
            }
            return self.finalize(out);
        }
        self.cpa.unassign(self.id);
        out.post(Route::Previous, PSyncBbMessage::Backtrack)?;
        self.state = PSyncBbState::Idle;
        Ok(())
    }

    fn leader_mut(&mut self, tag: &'static str) -> Result<&mut Leader, CoreError> {
        let (id, state) = (self.id, self.state);
        self.leader
            .as_mut()
            .ok_or_else(|| CoreError::unexpected(id, tag, state))
    }

    // =========================================================================
    // PROTOCOL 2: FULL-ASSIGNMENT SUM
    // =========================================================================

    fn on_check_solution(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let n = self.n;
        let leader = self.leader_mut("CHECK_SOLUTION")?;
        leader.latest_sum += 1;
        leader.sum = Some(MaskedSum::new(n - 1));
        let sum_id = leader.latest_sum;

        debug!(agent = %self.id, sum_id, "secure sum requested");
        out.post(Route::Broadcast, PSyncBbMessage::Protocol2 { sum_id })?;
        Ok(())
    }

    fn on_protocol2(&mut self, sum_id: u64, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let cost = self.own_added_cost()?;
        let peers: Vec<AgentId> = (1..self.n).map(AgentId).filter(|p| *p != self.id).collect();
        let masks = self
            .sessions
            .contribute(SessionKey::Sum(sum_id), cost, &peers, &mut self.rng);

        self.metrics
            .record(self.id, MetricEvent::EncryptedPayloads(masks.len() as u64));
        for (peer, mask) in masks {
            out.post(Route::To(peer), PSyncBbMessage::Protocol2SendRandom { sum_id, mask })?;
        }
        self.try_report_sum(sum_id, out)
    }

    fn try_report_sum(&mut self, sum_id: u64, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let expected = self.n - 2;
        if let Some(report) = self.sessions.take_ready(SessionKey::Sum(sum_id), expected) {
            out.post(Route::First, PSyncBbMessage::Protocol2Result { sum_id, report })?;
        }
        Ok(())
    }

    fn on_protocol2_result(
        &mut self,
        sum_id: u64,
        report: u64,
        out: &mut Outbox<PSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let id = self.id;
        let leader = self.leader_mut("PROTOCOL2_RESULT")?;
        let latest = leader.latest_sum;
        let Some(sum) = leader.sum.as_mut().filter(|_| sum_id == latest) else {
            debug!(agent = %id, sum_id, latest, "dropping stale secure-sum report");
            return Ok(());
        };
        if !sum.add(report) {
            return Ok(());
        }

        let total = sum.value();
        leader.sum = None;
        self.metrics.record(id, MetricEvent::SecureSumRound);
        self.on_sum_complete(total, out)
    }

    fn on_sum_complete(&mut self, total: Cost, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let own_value = self.own_value()?;
        let id = self.id;
        let n = self.n;
        let ciphertext = self.keys.public().encrypt(i64::from(own_value), &mut self.rng);

        let leader = self.leader_mut("PROTOCOL2_RESULT")?;
        if total < leader.ub {
            info!(agent = %id, cost = total, "💡 new upper bound");
            leader.ub = total;
            leader.currently_best = true;
            leader.best_private[0] = Some(ciphertext);
        } else {
            leader.currently_best = false;
        }
        leader.rca_counter = 0;

        for i in 1..n - 1 {
            out.post(Route::To(AgentId(i)), PSyncBbMessage::RequestCurrentAssignment)?;
        }
        if n == 2 {
            self.request_last(out)?;
        }
        Ok(())
    }

    fn request_last(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        self.leader_mut("CURRENT_ASSIGNMENT")?.awaiting_last = true;
        out.post(Route::Last, PSyncBbMessage::RequestCurrentAssignment)?;
        Ok(())
    }

    fn on_request_current_assignment(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let value = self.own_value()?;
        let ciphertext = self.keys.public().encrypt(i64::from(value), &mut self.rng);
        self.metrics.record(self.id, MetricEvent::EncryptedPayloads(1));

        let msg = PSyncBbMessage::CurrentAssignment {
            owner: self.id,
            value: ciphertext,
        };
        out.post(Route::First, msg)?;

        if self.id.is_last(self.n) {
            self.backtrack(out)?;
        }
        Ok(())
    }

    fn on_current_assignment(
        &mut self,
        owner: AgentId,
        value: Ciphertext,
        out: &mut Outbox<PSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let n = self.n;
        let leader = self.leader_mut("CURRENT_ASSIGNMENT")?;
        if leader.currently_best {
            leader.best_private[owner.0] = Some(value);
        }

        if owner.is_last(n) {
            leader.awaiting_last = false;
            if leader.finalize_pending {
                return self.finalize(out);
            }
            return Ok(());
        }

        leader.rca_counter += 1;
        if leader.rca_counter == n - 2 {
            self.request_last(out)?;
        }
        Ok(())
    }

    // =========================================================================
    // PROTOCOL 3: PREFIX SUM
    // =========================================================================

    fn start_prefix_sum(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        debug!(agent = %self.id, "prefix sum requested");
        self.prefix_sum = Some(MaskedSum::new(self.id.0 - 1));
        for i in 1..self.id.0 {
            out.post(Route::To(AgentId(i)), PSyncBbMessage::Protocol3)?;
        }
        self.state = PSyncBbState::AwaitingPrefixSum;
        Ok(())
    }

    fn on_protocol3(&mut self, initiator: AgentId, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let cost = self.own_added_cost()?;
        let peers: Vec<AgentId> = (1..initiator.0)
            .map(AgentId)
            .filter(|p| *p != self.id)
            .collect();
        let masks = self
            .sessions
            .contribute(SessionKey::Prefix(initiator), cost, &peers, &mut self.rng);

        self.metrics
            .record(self.id, MetricEvent::EncryptedPayloads(masks.len() as u64));
        for (peer, mask) in masks {
            out.post(
                Route::To(peer),
                PSyncBbMessage::Protocol3SendRandom { initiator, mask },
            )?;
        }
        self.try_report_prefix(initiator, out)
    }

    fn try_report_prefix(
        &mut self,
        initiator: AgentId,
        out: &mut Outbox<PSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let expected = initiator.0.saturating_sub(2);
        if let Some(report) = self.sessions.take_ready(SessionKey::Prefix(initiator), expected) {
            out.post(Route::To(initiator), PSyncBbMessage::Protocol3Result { report })?;
        }
        Ok(())
    }

    fn on_protocol3_result(&mut self, report: u64, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let sum = self
            .prefix_sum
            .as_mut()
            .ok_or_else(|| CoreError::unexpected(self.id, "PROTOCOL3_RESULT", self.state))?;
        if !sum.add(report) {
            return Ok(());
        }

        self.prefix_cost = sum.value();
        self.prefix_sum = None;
        self.computed_prefix = true;
        self.metrics.record(self.id, MetricEvent::SecureSumRound);
        debug!(agent = %self.id, "prefix cost known");
        self.after_prefix_sum(out)
    }

    // =========================================================================
    // PROTOCOL 4: BOUND COMPARISON
    // =========================================================================

    fn start_comparison(&mut self, round: u8, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let value = self
            .candidate
            .ok_or_else(|| CoreError::invariant(self.id, "comparison without candidate"))?;
        let cost = self.prefix_cost + self.cpa.added_cost(self.problem.as_ref(), self.id, value);
        let mask = ComparisonMask::random(&mut self.rng);

        let first_round = match (&self.comparison, round) {
            (Some(c), 2) => c.first_round,
            _ => None,
        };
        self.comparison = Some(Comparison {
            round,
            mask,
            first_round,
        });

        self.metrics.record(self.id, MetricEvent::EncryptedPayloads(2));
        out.post(Route::First, PSyncBbMessage::Protocol4Init { round, mask })?;
        out.post(
            Route::To(RELAY),
            PSyncBbMessage::Protocol4FromAk {
                round,
                value: mask.mask_cost(cost),
            },
        )?;
        self.state = PSyncBbState::AwaitingComparison;
        Ok(())
    }

    fn on_protocol4_init(
        &mut self,
        round: u8,
        mask: ComparisonMask,
        out: &mut Outbox<PSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let ub = self.leader_mut("PROTOCOL4_INIT")?.ub;
        let msg = PSyncBbMessage::Protocol4FromA1 {
            round,
            value: mask.mask_bound(ub),
        };
        out.post(Route::To(RELAY), msg)?;
        Ok(())
    }

    fn relay_if_ready(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let (Some((decider, ak_round, ak)), Some((a1_round, a1))) = (self.relay.from_ak, self.relay.from_a1) else {
            return Ok(());
        };
        if ak_round != a1_round {
            return Err(CoreError::invariant(
                self.id,
                format!("comparison rounds out of step ({ak_round} vs {a1_round})"),
            ));
        }
        self.relay = Relay::default();

        let greater = ak > a1;
        let msg = if ak_round == 1 {
            PSyncBbMessage::Protocol4Step5Result { greater }
        } else {
            PSyncBbMessage::Protocol4Step6Result { greater }
        };
        out.post(Route::To(decider), msg)?;
        Ok(())
    }

    fn on_comparison_result(
        &mut self,
        round: u8,
        greater: bool,
        out: &mut Outbox<PSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let tag = if round == 1 {
            "PROTOCOL4_STEP5_RESULT"
        } else {
            "PROTOCOL4_STEP6_RESULT"
        };
        let comparison = match &self.comparison {
            Some(c) if c.round == round => c,
            _ => return Err(CoreError::unexpected(self.id, tag, self.state)),
        };
        let exceeds = comparison.mask.unmask(greater);

        if round == 1 {
            if let Some(c) = self.comparison.as_mut() {
                c.first_round = Some(exceeds);
            }
            return self.start_comparison(2, out);
        }

        if comparison.first_round != Some(exceeds) {
            return Err(CoreError::invariant(self.id, "comparison rounds disagree"));
        }
        self.comparison = None;

        if exceeds {
            trace!(agent = %self.id, "bound reached, backtracking");
            self.metrics.record(self.id, MetricEvent::Prune);
            self.backtrack(out)
        } else {
            self.after_bound_check(out)
        }
    }

    // =========================================================================
    // DECISION PRIVACY: FINAL DISCLOSURE
    // =========================================================================

    fn finalize(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        let id = self.id;
        let n = self.n;
        let leader = self.leader_mut("BACKTRACK")?;
        let mut ciphertexts = Vec::with_capacity(n);
        for i in 0..n {
            let owner = AgentId(i);
            let slot = leader.best_private[i]
                .as_ref()
                .ok_or_else(|| CoreError::invariant(id, format!("no encrypted value for {owner}")))?;
            let key = leader.keys[i]
                .as_ref()
                .ok_or(CoreError::MissingPublicKey { agent: id, owner })?;
            ciphertexts.push((owner, key.clone(), slot.clone()));
        }
        info!(agent = %id, ub = leader.ub, "search space exhausted, disclosing solution");

        for (owner, key, slot) in ciphertexts {
            let value = key.rerandomize(&slot, &mut self.rng)?;
            out.post(Route::To(owner), PSyncBbMessage::AssignmentInSolution { value })?;
        }
        self.metrics.record(id, MetricEvent::EncryptedPayloads(n as u64));
        self.state = PSyncBbState::Finalizing;
        Ok(())
    }

    fn on_assignment_in_solution(
        &mut self,
        value: Ciphertext,
        out: &mut Outbox<PSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let plain = self.keys.decrypt_i64(&value)?;
        let value = Value::try_from(plain)
            .map_err(|_| CoreError::invariant(self.id, format!("decrypted value {plain} out of range")))?;
        out.post(
            Route::Last,
            PSyncBbMessage::Terminate {
                owner: self.id,
                value,
            },
        )?;
        Ok(())
    }

    fn on_terminate(
        &mut self,
        owner: AgentId,
        value: Value,
        out: &mut Outbox<PSyncBbMessage>,
    ) -> Result<(), CoreError> {
        let (id, state, n) = (self.id, self.state, self.n);
        let collector = self
            .collector
            .as_mut()
            .ok_or_else(|| CoreError::unexpected(id, "TERMINATE", state))?;
        collector.solution.assign(owner, value);
        collector.received += 1;

        if collector.received == n {
            let solution = std::mem::take(&mut collector.solution);
            info!(agent = %id, "🏁 P-SyncBB finished");
            self.state = PSyncBbState::Terminated;
            out.finish(solution)?;
        }
        Ok(())
    }
}

impl DcopAgent for PSyncBbAgent {
    type Message = PSyncBbMessage;

    fn id(&self) -> AgentId {
        self.id
    }

    fn start(&mut self, out: &mut Outbox<PSyncBbMessage>) -> Result<(), CoreError> {
        if self.id.is_last(self.n) {
            self.collector = Some(Collector::default());
        }

        if self.id.is_first() {
            let mut keys = vec![None; self.n];
            keys[0] = Some(self.keys.public().clone());
            self.leader = Some(Leader {
                ub: UNBOUNDED,
                latest_sum: 0,
                sum: None,
                currently_best: false,
                best_private: vec![None; self.n],
                keys,
                rca_counter: 0,
                awaiting_last: false,
                finalize_pending: false,
            });
            self.cpa = Assignment::new();
            self.current_domain = self.problem.domain(self.id).to_vec();
            self.computed_prefix = true;
            return self.assign_cpa(out);
        }

        let msg = PSyncBbMessage::PublicKey {
            owner: self.id,
            key: self.keys.public().clone(),
        };
        out.post(Route::First, msg)?;
        self.metrics.record(self.id, MetricEvent::PublicKeyShared);
        Ok(())
    }

    fn handle(
        &mut self,
        from: AgentId,
        msg: PSyncBbMessage,
        out: &mut Outbox<PSyncBbMessage>,
    ) -> Result<(), CoreError> {
        trace!(agent = %self.id, %from, tag = msg.tag(), "recv");
        match msg {
            PSyncBbMessage::PublicKey { owner, key } => {
                let leader = self.leader_mut("PUBLIC_KEY")?;
                let slot = leader
                    .keys
                    .get_mut(owner.0)
                    .ok_or(CoreError::Env(dcop_env::EnvError::UnknownAgent(owner)))?;
                *slot = Some(key);
                Ok(())
            }
            PSyncBbMessage::Cpa { cpa } => {
                self.cpa = cpa;
                self.current_domain = self.problem.domain(self.id).to_vec();
                self.computed_prefix = false;
                self.assign_cpa(out)
            }
            PSyncBbMessage::Backtrack => {
                self.cpa.unassign(self.id);
                self.assign_cpa(out)
            }
            PSyncBbMessage::CheckSolution => self.on_check_solution(out),
            PSyncBbMessage::Protocol2 { sum_id } => self.on_protocol2(sum_id, out),
            PSyncBbMessage::Protocol2SendRandom { sum_id, mask } => {
                self.sessions.absorb(SessionKey::Sum(sum_id), mask);
                self.try_report_sum(sum_id, out)
            }
            PSyncBbMessage::Protocol2Result { sum_id, report } => {
                self.on_protocol2_result(sum_id, report, out)
            }
            PSyncBbMessage::Protocol3 => self.on_protocol3(from, out),
            PSyncBbMessage::Protocol3SendRandom { initiator, mask } => {
                self.sessions.absorb(SessionKey::Prefix(initiator), mask);
                self.try_report_prefix(initiator, out)
            }
            PSyncBbMessage::Protocol3Result { report } => self.on_protocol3_result(report, out),
            PSyncBbMessage::Protocol4Init { round, mask } => self.on_protocol4_init(round, mask, out),
            PSyncBbMessage::Protocol4FromAk { round, value } => {
                self.relay.from_ak = Some((from, round, value));
                self.relay_if_ready(out)
            }
            PSyncBbMessage::Protocol4FromA1 { round, value } => {
                self.relay.from_a1 = Some((round, value));
                self.relay_if_ready(out)
            }
            PSyncBbMessage::Protocol4Step5Result { greater } => {
                self.on_comparison_result(1, greater, out)
            }
            PSyncBbMessage::Protocol4Step6Result { greater } => {
                self.on_comparison_result(2, greater, out)
            }
            PSyncBbMessage::RequestCurrentAssignment => self.on_request_current_assignment(out),
            PSyncBbMessage::CurrentAssignment { owner, value } => {
                self.on_current_assignment(owner, value, out)
            }
            PSyncBbMessage::AssignmentInSolution { value } => {
                self.on_assignment_in_solution(value, out)
            }
            PSyncBbMessage::Terminate { owner, value } => self.on_terminate(owner, value, out),
        }
    }
}
