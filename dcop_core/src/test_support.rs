//! Global-FIFO delivery loop and fixtures for protocol tests.

use crate::agent::{AgentSetup, DcopAgent};
use crate::assignment::Assignment;
use crate::config::AgentConfig;
use crate::error::CoreError;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::outbox::{Outbox, Tagged};
use dcop_env::{AgentContext, AgentId, Cost, Problem, TableProblem};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

pub(crate) struct SeededContext(pub u64);

impl AgentContext for SeededContext {
    fn seed(&self) -> Option<u64> {
        Some(self.0)
    }
}

pub(crate) fn small_config() -> AgentConfig {
    AgentConfig {
        key_bits: 128,
        ..AgentConfig::default()
    }
}

pub(crate) fn setup(problem: &Arc<TableProblem>, id: usize, seed: u64) -> AgentSetup {
    let problem: Arc<dyn Problem> = problem.clone();
    AgentSetup::new(
        AgentId(id),
        problem,
        &SeededContext(seed),
        Arc::new(NoopMetrics),
        small_config(),
    )
}

/// Delivers messages one at a time in global send order.
pub(crate) struct Harness<A: DcopAgent> {
    agents: Vec<A>,
    outboxes: Vec<Outbox<A::Message>>,
    queue: VecDeque<(AgentId, AgentId, A::Message)>,
    pub sent: BTreeMap<&'static str, usize>,
    pub delivered: Vec<(AgentId, AgentId, A::Message)>,
    pub solution: Option<Assignment>,
    pub finishes: usize,
}

impl<A: DcopAgent> Harness<A> {
    pub fn new(agents: Vec<A>) -> Self {
        Self::with_metrics(agents, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(agents: Vec<A>, metrics: Arc<dyn MetricsSink>) -> Self {
        let n = agents.len();
        let outboxes = agents
            .iter()
            .map(|a| Outbox::new(a.id(), n, metrics.clone()))
            .collect();
        Self {
            agents,
            outboxes,
            queue: VecDeque::new(),
            sent: BTreeMap::new(),
            delivered: Vec::new(),
            solution: None,
            finishes: 0,
        }
    }

    pub fn start(&mut self) -> Result<(), CoreError> {
        for i in 0..self.agents.len() {
            self.agents[i].start(&mut self.outboxes[i])?;
            self.flush(i);
        }
        Ok(())
    }

    pub fn inject(&mut self, from: AgentId, to: AgentId, msg: A::Message) {
        self.queue.push_back((from, to, msg));
    }

    /// Delivers the next message; false when the queue is empty.
    pub fn step(&mut self) -> Result<bool, CoreError> {
        let Some((from, to, msg)) = self.queue.pop_front() else {
            return Ok(false);
        };
        self.delivered.push((from, to, msg.clone()));
        self.agents[to.0].handle(from, msg, &mut self.outboxes[to.0])?;
        self.flush(to.0);
        Ok(true)
    }

    pub fn run(&mut self, budget: usize) -> Result<Assignment, CoreError> {
        self.start()?;
        self.resume(budget)
    }

    pub fn resume(&mut self, budget: usize) -> Result<Assignment, CoreError> {
        for _ in 0..budget {
            if let Some(solution) = self.solution.clone() {
                return Ok(solution);
            }
            if !self.step()? {
                break;
            }
        }
        self.solution
            .clone()
            .ok_or_else(|| CoreError::invariant(AgentId(0), "run ended without a solution"))
    }

    pub fn agent(&self, id: usize) -> &A {
        &self.agents[id]
    }

    pub fn sent(&self, tag: &str) -> usize {
        self.sent.get(tag).copied().unwrap_or(0)
    }

    fn flush(&mut self, index: usize) {
        let n = self.agents.len();
        for envelope in self.outboxes[index].drain() {
            let from = envelope.from;
            for (to, body) in envelope.fan_out(n) {
                *self.sent.entry(body.tag()).or_insert(0) += 1;
                self.queue.push_back((from, to, body));
            }
        }
        if let Some(solution) = self.outboxes[index].take_solution() {
            self.finishes += 1;
            self.solution = Some(solution);
        }
    }
}

/// Random problem with every pair constrained with probability `density`.
pub(crate) fn random_problem(n: usize, d: usize, max_cost: Cost, density: f64, seed: u64) -> TableProblem {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut p = TableProblem::uniform(n, d, max_cost);
    for a in 0..n {
        for b in a + 1..n {
            if rng.gen_bool(density) {
                for va in 0..d as i32 {
                    for vb in 0..d as i32 {
                        let c = rng.gen_range(0..=max_cost);
                        p.set_cost(AgentId(a), va, AgentId(b), vb, c);
                    }
                }
            }
        }
    }
    p
}

/// Exhaustive minimum over all complete assignments.
pub(crate) fn brute_force(problem: &dyn Problem) -> Cost {
    fn go(problem: &dyn Problem, cpa: &mut Assignment, var: usize, acc: Cost, best: &mut Cost) {
        if acc >= *best {
            return;
        }
        if var == problem.num_variables() {
            *best = acc;
            return;
        }
        let id = AgentId(var);
        for &v in problem.domain(id) {
            let added = cpa.added_cost(problem, id, v);
            cpa.assign(id, v);
            go(problem, cpa, var + 1, acc + added, best);
            cpa.unassign(id);
        }
    }

    let mut best = Cost::MAX;
    go(problem, &mut Assignment::new(), 0, 0, &mut best);
    best
}

/// Scenario A: two agents, cost 0 if equal else 5.
pub(crate) fn equality_pair() -> TableProblem {
    let mut p = TableProblem::uniform(2, 2, 5);
    for a in 0..2 {
        for b in 0..2 {
            p.set_cost(AgentId(0), a, AgentId(1), b, if a == b { 0 } else { 5 });
        }
    }
    p
}

/// Scenario B: three-agent chain, hard cost between agents 0 and 2 for (1, 1).
pub(crate) fn hard_constraint_chain(max_cost: Cost) -> TableProblem {
    let mut p = TableProblem::uniform(3, 2, max_cost);
    p.set_cost(AgentId(0), 0, AgentId(1), 0, 3);
    p.set_cost(AgentId(0), 1, AgentId(1), 1, 0);
    p.set_cost(AgentId(0), 0, AgentId(1), 1, 2);
    p.set_cost(AgentId(0), 1, AgentId(1), 0, 4);
    p.set_cost(AgentId(1), 1, AgentId(2), 1, 0);
    p.set_cost(AgentId(1), 1, AgentId(2), 0, 1);
    p.set_cost(AgentId(1), 0, AgentId(2), 0, 2);
    p.set_cost(AgentId(0), 1, AgentId(2), 1, max_cost);
    p
}
