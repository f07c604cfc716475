//! Agent state-machine trait and construction inputs.
//!
//! Every search variant is a sans-IO state machine: the harness calls
//! [`DcopAgent::start`] once, then [`DcopAgent::handle`] once per delivered
//! message, and ships whatever the agent left in its [`Outbox`]. Agents never
//! block; "wait for K replies" is expressed as counters inside the state.

use crate::config::AgentConfig;
use crate::error::CoreError;
use crate::metrics::MetricsSink;
use crate::outbox::{Outbox, Tagged};
use dcop_env::{AgentContext, AgentId, Problem};
use rand_chacha::ChaCha8Rng;
use std::fmt::Debug;
use std::sync::Arc;

/// A message-driven DCOP agent owning exactly one variable.
pub trait DcopAgent: Send {
    /// Protocol message vocabulary.
    type Message: Tagged + Clone + Debug + Send + 'static;

    /// The variable (and agent) id.
    fn id(&self) -> AgentId;

    /// Invoked once after seeding, before any message is delivered.
    fn start(&mut self, out: &mut Outbox<Self::Message>) -> Result<(), CoreError>;

    /// Handles one inbound message to completion.
    ///
    /// # Arguments
    /// * `from` - Sending agent (may be `self.id()` for self-sends)
    /// * `msg` - The message, owned
    /// * `out` - Sink for produced messages and the final solution
    fn handle(
        &mut self,
        from: AgentId,
        msg: Self::Message,
        out: &mut Outbox<Self::Message>,
    ) -> Result<(), CoreError>;
}

/// Everything an agent is built from.
#[derive(Clone)]
pub struct AgentSetup {
    /// Agent id
    pub id: AgentId,

    /// Shared read-only problem
    pub problem: Arc<dyn Problem>,

    /// Shared metrics sink
    pub metrics: Arc<dyn MetricsSink>,

    /// Run configuration
    pub config: AgentConfig,

    /// The agent's private randomness
    pub rng: ChaCha8Rng,
}

impl AgentSetup {
    /// Builds the setup for `id`, deriving its RNG from `ctx`.
    pub fn new(
        id: AgentId,
        problem: Arc<dyn Problem>,
        ctx: &dyn AgentContext,
        metrics: Arc<dyn MetricsSink>,
        config: AgentConfig,
    ) -> Self {
        Self {
            id,
            rng: ctx.agent_rng(id),
            problem,
            metrics,
            config,
        }
    }

    /// Number of agents.
    pub fn agents(&self) -> usize {
        self.problem.num_variables()
    }

    /// Checks that the id is valid and the own domain is non-empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        let n = self.agents();
        if self.id.0 >= n {
            return Err(CoreError::Config(format!(
                "agent {} outside a {}-variable problem",
                self.id, n
            )));
        }
        if self.problem.domain(self.id).is_empty() {
            return Err(CoreError::Config(format!("agent {} has an empty domain", self.id)));
        }
        Ok(())
    }
}

impl Debug for AgentSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSetup")
            .field("id", &self.id)
            .field("agents", &self.agents())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
