//! Actor runtime: one tokio task per agent.
//!
//! Each task owns its agent and a [`ChannelTransport`]. Per-link FIFO holds
//! because every link is a single unbounded mpsc channel written by one task.
//! The run ends on the first `finish`, on the first agent error, or when the
//! wall-clock limit expires.

use crate::error::SimError;
use crate::network::ChannelTransport;

use dcop_core::{Assignment, DcopAgent, MetricsSink, Outbox, Tagged};
use dcop_env::NetworkTransport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

type Done = mpsc::UnboundedSender<Result<Assignment, SimError>>;

/// Runs `agents` as concurrent actors until one of them finishes.
///
/// # Returns
/// * `Ok((solution, delivered))` - First finished solution and the number
///   of messages handled up to that point
/// * `Err(SimError::Stall)` - Nothing finished within `limit`
/// * `Err(_)` - An agent failed or its task panicked
pub async fn run_actors<A: DcopAgent + 'static>(
    agents: Vec<A>,
    metrics: Arc<dyn MetricsSink>,
    limit: Duration,
) -> Result<(Assignment, u64), SimError> {
    let n = agents.len();
    let delivered = Arc::new(AtomicU64::new(0));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut tasks = JoinSet::new();

    for (agent, transport) in agents.into_iter().zip(ChannelTransport::mesh(n)) {
        let outbox = Outbox::new(agent.id(), n, Arc::clone(&metrics));
        tasks.spawn(actor(
            agent,
            transport,
            outbox,
            Arc::clone(&delivered),
            done_tx.clone(),
        ));
    }
    drop(done_tx);

    let outcome = tokio::time::timeout(limit, async {
        loop {
            tokio::select! {
                finished = done_rx.recv() => {
                    return finished.unwrap_or(Err(SimError::Stall {
                        delivered: delivered.load(Ordering::Relaxed),
                    }));
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        return Err(SimError::Join(e.to_string()));
                    }
                }
            }
        }
    })
    .await;

    tasks.abort_all();
    let count = delivered.load(Ordering::Relaxed);

    match outcome {
        Ok(result) => result.map(|solution| (solution, count)),
        Err(_) => {
            warn!(delivered = count, ?limit, "actor run timed out");
            Err(SimError::Stall { delivered: count })
        }
    }
}

/// Blocking wrapper that builds its own multi-threaded runtime.
pub fn run_blocking<A: DcopAgent + 'static>(
    agents: Vec<A>,
    metrics: Arc<dyn MetricsSink>,
    limit: Duration,
) -> Result<(Assignment, u64), SimError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| SimError::Join(e.to_string()))?;
    runtime.block_on(run_actors(agents, metrics, limit))
}

async fn actor<A: DcopAgent>(
    mut agent: A,
    transport: ChannelTransport<A::Message>,
    mut outbox: Outbox<A::Message>,
    delivered: Arc<AtomicU64>,
    done: Done,
) {
    let id = agent.id();
    if let Err(e) = actor_loop(&mut agent, &transport, &mut outbox, &delivered, &done).await {
        debug!(agent = %id, error = %e, "actor stopped");
        let _ = done.send(Err(e));
    }
}

async fn actor_loop<A: DcopAgent>(
    agent: &mut A,
    transport: &ChannelTransport<A::Message>,
    outbox: &mut Outbox<A::Message>,
    delivered: &AtomicU64,
    done: &Done,
) -> Result<(), SimError> {
    agent.start(outbox)?;
    ship(transport, outbox, done).await?;

    while let Some(envelope) = transport.recv().await {
        delivered.fetch_add(1, Ordering::Relaxed);
        agent.handle(envelope.from, envelope.body, outbox)?;
        ship(transport, outbox, done).await?;
    }
    Ok(())
}

async fn ship<M: Tagged + Clone + Send + 'static>(
    transport: &ChannelTransport<M>,
    outbox: &mut Outbox<M>,
    done: &Done,
) -> Result<(), SimError> {
    for envelope in outbox.drain() {
        transport.deliver(envelope).await?;
    }
    if let Some(solution) = outbox.take_solution() {
        let _ = done.send(Ok(solution));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use crate::keys::DeterministicKeyProvider;
    use dcop_core::{AgentConfig, AgentSetup, CoreError, NoopMetrics, PcSyncBbAgent, SyncBbAgent};
    use dcop_env::{AgentId, Problem, Route, TableProblem};

    fn problem() -> Arc<dyn Problem> {
        let mut p = TableProblem::uniform(3, 3, 10);
        for v in 0..3 {
            p.set_cost(AgentId(0), v, AgentId(1), v, 8);
            p.set_cost(AgentId(1), v, AgentId(2), v, 8);
        }
        p.set_cost(AgentId(0), 0, AgentId(2), 1, 3);
        Arc::new(p)
    }

    fn setups(problem: &Arc<dyn Problem>, config: AgentConfig) -> Vec<AgentSetup> {
        let ctx = SimContext::new(11);
        AgentId::all(problem.num_variables())
            .map(|id| AgentSetup::new(id, Arc::clone(problem), &ctx, Arc::new(NoopMetrics), config.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_sync_bb_actors_find_optimum() {
        let problem = problem();
        let agents: Vec<SyncBbAgent> = setups(&problem, AgentConfig::default())
            .into_iter()
            .map(|s| SyncBbAgent::new(s).unwrap())
            .collect();

        let (solution, delivered) = run_actors(agents, Arc::new(NoopMetrics), Duration::from_secs(30))
            .await
            .unwrap();
        assert!(solution.is_complete(3));
        assert_eq!(solution.total_cost(problem.as_ref()), 0);
        assert!(delivered > 0);
    }

    #[tokio::test]
    async fn test_pc_sync_bb_actors_find_optimum() {
        let problem = problem();
        let config = AgentConfig {
            key_bits: 128,
            ..AgentConfig::default()
        };
        let mut keys = DeterministicKeyProvider::new(5, 128);
        let agents: Vec<PcSyncBbAgent> = setups(&problem, config)
            .into_iter()
            .map(|s| {
                let key = keys.agent_key(s.id).unwrap();
                PcSyncBbAgent::new(s, key).unwrap()
            })
            .collect();

        let (solution, _) = run_actors(agents, Arc::new(NoopMetrics), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(solution.total_cost(problem.as_ref()), 0);
    }

    #[derive(Debug, Clone)]
    struct Nothing;

    impl Tagged for Nothing {
        fn tag(&self) -> &'static str {
            "NOTHING"
        }
    }

    /// Never sends and never finishes.
    struct Silent(AgentId);

    impl DcopAgent for Silent {
        type Message = Nothing;

        fn id(&self) -> AgentId {
            self.0
        }

        fn start(&mut self, _out: &mut Outbox<Nothing>) -> Result<(), CoreError> {
            Ok(())
        }

        fn handle(&mut self, _from: AgentId, _msg: Nothing, _out: &mut Outbox<Nothing>) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_silent_agents_time_out() {
        let agents = vec![Silent(AgentId(0)), Silent(AgentId(1))];
        let result = run_actors(agents, Arc::new(NoopMetrics), Duration::from_millis(50)).await;
        assert!(matches!(result, Err(SimError::Stall { delivered: 0 })));
    }

    #[tokio::test]
    async fn test_ship_forwards_envelopes_and_solution() {
        let mut mesh = ChannelTransport::<Nothing>::mesh(2);
        let peer = mesh.pop().unwrap();
        let local = mesh.pop().unwrap();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let mut outbox = Outbox::new(AgentId(0), 2, Arc::new(NoopMetrics));
        outbox.post(Route::Next, Nothing).unwrap();
        let mut solution = Assignment::new();
        solution.assign(AgentId(0), 1);
        solution.assign(AgentId(1), 2);
        outbox.finish(solution.clone()).unwrap();

        ship(&local, &mut outbox, &done_tx).await.unwrap();

        let envelope = peer.recv().await.unwrap();
        assert_eq!(envelope.from, AgentId(0));
        assert_eq!(done_rx.recv().await.unwrap().unwrap(), solution);
        assert!(outbox.drain().is_empty());
        assert!(outbox.take_solution().is_none());
    }

    #[test]
    fn test_blocking_wrapper() {
        let problem = problem();
        let agents: Vec<SyncBbAgent> = setups(&problem, AgentConfig::default())
            .into_iter()
            .map(|s| SyncBbAgent::new(s).unwrap())
            .collect();
        let (solution, _) = run_blocking(agents, Arc::new(NoopMetrics), Duration::from_secs(30)).unwrap();
        assert_eq!(solution.total_cost(problem.as_ref()), 0);
    }
}
