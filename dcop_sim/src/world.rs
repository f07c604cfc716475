//! SimWorld - The simulation harness container.

use crate::actors;
use crate::context::SimContext;
use crate::error::SimError;
use crate::keys::DeterministicKeyProvider;
use crate::network::{DeliveryOrder, LinkRouter};

use dcop_core::{
    AgentConfig, AgentSetup, Algorithm, Assignment, CounterMetrics, DcopAgent, MetricsSink,
    MetricsSnapshot, Outbox, PSyncBbAgent, PcSyncBbAgent, SyncBbAgent,
};
use dcop_env::{AgentContext, AgentId, Cost, OsContext, Problem};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Salt for the key provider seed.
const KEY_SALT: u64 = 1;
/// Salt for the delivery-order seed.
const ROUTER_SALT: u64 = 2;

/// Where agents run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Runtime {
    /// Single-threaded router, fully deterministic
    #[default]
    Sim,
    /// One tokio task per agent
    Actors,
}

impl std::str::FromStr for Runtime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sim" => Ok(Runtime::Sim),
            "actors" | "tokio" => Ok(Runtime::Actors),
            _ => Err(format!("Unknown runtime: {}", s)),
        }
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Search protocol
    pub algorithm: Algorithm,

    /// Cross-link interleaving
    pub delivery: DeliveryOrder,

    /// Where agents run
    pub runtime: Runtime,

    /// Maximum number of deliveries before giving up
    pub budget: u64,

    /// Wall-clock limit for the actor runtime
    pub actor_timeout: Duration,

    /// Agent configuration (key size, secure-sum threshold)
    pub agent: AgentConfig,

    /// Draw agent RNGs from OS entropy instead of the seed (keys and
    /// delivery order stay seeded)
    pub entropy: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            algorithm: Algorithm::SyncBb,
            delivery: DeliveryOrder::Shuffled,
            runtime: Runtime::Sim,
            budget: 5_000_000,
            actor_timeout: Duration::from_secs(120),
            agent: AgentConfig::default(),
            entropy: false,
        }
    }
}

/// Result of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Final complete assignment
    pub solution: Assignment,

    /// Its cost
    pub cost: Cost,

    /// Messages delivered until the first finish
    pub delivered: u64,

    /// Aggregated agent metrics
    pub metrics: MetricsSnapshot,
}

/// The SimWorld - drives a set of agents through the link router.
pub struct SimWorld<A: DcopAgent> {
    /// Configuration
    pub config: SimConfig,

    agents: Vec<A>,
    outboxes: Vec<Outbox<A::Message>>,
    router: LinkRouter<A::Message>,
    rng: ChaCha8Rng,
    delivered: u64,
}

impl<A: DcopAgent> SimWorld<A> {
    /// Creates a world around already constructed agents.
    ///
    /// Agent `i` of the vector must have id `i`.
    pub fn new(agents: Vec<A>, config: SimConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        let n = agents.len();
        let outboxes = agents
            .iter()
            .map(|a| Outbox::new(a.id(), n, Arc::clone(&metrics)))
            .collect();
        let router_seed = SimContext::new(config.seed).derive(ROUTER_SALT);

        Self {
            router: LinkRouter::new(config.delivery),
            rng: ChaCha8Rng::seed_from_u64(router_seed),
            config,
            agents,
            outboxes,
            delivered: 0,
        }
    }

    /// Returns the number of agents.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Messages delivered so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Read access to an agent.
    pub fn agent(&self, id: AgentId) -> Option<&A> {
        self.agents.get(id.0)
    }

    /// Starts every agent, then delivers until one of them finishes.
    ///
    /// # Returns
    /// * `Ok((solution, delivered))` - The first finished solution
    /// * `Err(SimError::Stall)` - Nothing left to deliver and no solution
    /// * `Err(SimError::BudgetExhausted)` - Too many deliveries
    pub fn run(&mut self) -> Result<(Assignment, u64), SimError> {
        for i in 0..self.agents.len() {
            self.agents[i].start(&mut self.outboxes[i])?;
            if let Some(solution) = self.flush(i) {
                return Ok((solution, self.delivered));
            }
        }

        loop {
            if self.delivered >= self.config.budget {
                return Err(SimError::BudgetExhausted {
                    budget: self.config.budget,
                });
            }
            let Some(msg) = self.router.pop(&mut self.rng) else {
                return Err(SimError::Stall {
                    delivered: self.delivered,
                });
            };

            self.delivered += 1;
            let to = msg.to.0;
            self.agents[to].handle(msg.from, msg.body, &mut self.outboxes[to])?;
            if let Some(solution) = self.flush(to) {
                debug!(delivered = self.delivered, pending = self.router.pending(), "first finish");
                return Ok((solution, self.delivered));
            }
        }
    }

    fn flush(&mut self, index: usize) -> Option<Assignment> {
        let n = self.agents.len();
        for envelope in self.outboxes[index].drain() {
            self.router.push_envelope(envelope, n);
        }
        self.outboxes[index].take_solution()
    }
}

// ============================================================================
// RUN DISPATCH
// ============================================================================

/// Builds the agents `config.algorithm` calls for and runs them to completion.
pub fn solve(problem: Arc<dyn Problem>, config: &SimConfig) -> Result<RunOutcome, SimError> {
    let n = problem.num_variables();
    config.algorithm.check_agents(n)?;

    let ctx = SimContext::new(config.seed);
    let os = OsContext::new();
    let agent_ctx: &dyn AgentContext = if config.entropy { &os } else { &ctx };
    let metrics = Arc::new(CounterMetrics::new());
    let sink: Arc<dyn MetricsSink> = metrics.clone();
    let setups: Vec<AgentSetup> = AgentId::all(n)
        .map(|id| AgentSetup::new(id, Arc::clone(&problem), agent_ctx, Arc::clone(&sink), config.agent.clone()))
        .collect();

    info!(
        algorithm = %config.algorithm,
        agents = n,
        seed = config.seed,
        entropy = config.entropy,
        runtime = ?config.runtime,
        "▶ run"
    );

    let (solution, delivered) = match config.algorithm {
        Algorithm::SyncBb => {
            let agents = setups
                .into_iter()
                .map(SyncBbAgent::new)
                .collect::<Result<Vec<_>, _>>()?;
            drive(agents, config, sink)?
        }
        Algorithm::PSyncBb => {
            let mut keys = DeterministicKeyProvider::new(ctx.derive(KEY_SALT), config.agent.key_bits);
            let mut agents = Vec::with_capacity(n);
            for setup in setups {
                let key = keys.agent_key(setup.id)?;
                agents.push(PSyncBbAgent::new(setup, key)?);
            }
            drive(agents, config, sink)?
        }
        Algorithm::PcSyncBb => {
            let mut keys = DeterministicKeyProvider::new(ctx.derive(KEY_SALT), config.agent.key_bits);
            let mut agents = Vec::with_capacity(n);
            for setup in setups {
                let key = keys.agent_key(setup.id)?;
                agents.push(PcSyncBbAgent::new(setup, key)?);
            }
            drive(agents, config, sink)?
        }
    };

    let cost = solution.total_cost(problem.as_ref());
    info!(algorithm = %config.algorithm, cost, delivered, "🏁 run complete");

    Ok(RunOutcome {
        solution,
        cost,
        delivered,
        metrics: metrics.snapshot(),
    })
}

fn drive<A: DcopAgent + 'static>(
    agents: Vec<A>,
    config: &SimConfig,
    metrics: Arc<dyn MetricsSink>,
) -> Result<(Assignment, u64), SimError> {
    match config.runtime {
        Runtime::Sim => SimWorld::new(agents, config.clone(), metrics).run(),
        Runtime::Actors => actors::run_blocking(agents, metrics, config.actor_timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcop_core::NoopMetrics;
    use dcop_env::TableProblem;

    fn config(algorithm: Algorithm, delivery: DeliveryOrder) -> SimConfig {
        SimConfig {
            seed: 3,
            algorithm,
            delivery,
            agent: AgentConfig {
                key_bits: 128,
                ..AgentConfig::default()
            },
            ..SimConfig::default()
        }
    }

    fn chain() -> Arc<dyn Problem> {
        let mut p = TableProblem::uniform(3, 2, 10);
        p.set_cost(AgentId(0), 0, AgentId(1), 0, 4);
        p.set_cost(AgentId(1), 1, AgentId(2), 1, 2);
        p.set_cost(AgentId(0), 1, AgentId(2), 0, 7);
        p.set_cost(AgentId(0), 1, AgentId(1), 1, 1);
        Arc::new(p)
    }

    #[test]
    fn test_sim_world_creation() {
        let problem = chain();
        let ctx = SimContext::new(1);
        let agents: Vec<SyncBbAgent> = AgentId::all(3)
            .map(|id| {
                let setup = AgentSetup::new(id, Arc::clone(&problem), &ctx, Arc::new(NoopMetrics), AgentConfig::default());
                SyncBbAgent::new(setup).unwrap()
            })
            .collect();

        let world = SimWorld::new(agents, SimConfig::default(), Arc::new(NoopMetrics));
        assert_eq!(world.agent_count(), 3);
        assert_eq!(world.delivered(), 0);
        assert!(world.agent(AgentId(2)).is_some());
    }

    #[test]
    fn test_all_algorithms_agree() {
        for delivery in [DeliveryOrder::Fifo, DeliveryOrder::Shuffled] {
            let costs: Vec<Cost> = Algorithm::ALL
                .iter()
                .map(|a| solve(chain(), &config(*a, delivery)).unwrap().cost)
                .collect();
            assert_eq!(costs, vec![0, 0, 0]);
        }
    }

    #[test]
    fn test_run_is_deterministic() {
        let cfg = config(Algorithm::PSyncBb, DeliveryOrder::Shuffled);
        let a = solve(chain(), &cfg).unwrap();
        let b = solve(chain(), &cfg).unwrap();
        assert_eq!(a.solution, b.solution);
        assert_eq!(a.delivered, b.delivered);
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_budget_exhausted() {
        let cfg = SimConfig {
            budget: 3,
            ..config(Algorithm::SyncBb, DeliveryOrder::Fifo)
        };
        assert!(matches!(
            solve(chain(), &cfg),
            Err(SimError::BudgetExhausted { budget: 3 })
        ));
    }

    #[test]
    fn test_too_few_agents_for_private_protocols() {
        let single: Arc<dyn Problem> = Arc::new(TableProblem::uniform(1, 3, 5));
        assert!(solve(Arc::clone(&single), &config(Algorithm::SyncBb, DeliveryOrder::Fifo)).is_ok());
        assert!(matches!(
            solve(single, &config(Algorithm::PcSyncBb, DeliveryOrder::Fifo)),
            Err(SimError::Agent(_))
        ));
    }

    #[test]
    fn test_entropy_agents_still_optimal() {
        let cfg = SimConfig {
            entropy: true,
            ..config(Algorithm::PcSyncBb, DeliveryOrder::Shuffled)
        };
        assert_eq!(solve(chain(), &cfg).unwrap().cost, 0);
    }

    #[test]
    fn test_metrics_are_collected() {
        let outcome = solve(chain(), &config(Algorithm::PcSyncBb, DeliveryOrder::Fifo)).unwrap();
        assert!(outcome.metrics.messages >= outcome.delivered);
        assert!(outcome.metrics.bound_comparisons > 0);
        assert!(outcome.metrics.public_keys > 0);
    }
}
