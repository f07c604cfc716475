//! Per-agent outbox: messages produced by one handler invocation.

use crate::assignment::Assignment;
use crate::error::CoreError;
use crate::metrics::{MetricEvent, MetricsSink};
use dcop_env::{AgentId, EnvError, Envelope, Recipient, Route};
use std::sync::Arc;

/// Message tag used for dispatch, logging and per-tag metrics.
pub trait Tagged {
    /// Wire tag, e.g. `"CPA"`.
    fn tag(&self) -> &'static str;
}

/// Collects outgoing envelopes and the terminal solution of one agent.
///
/// Routes are resolved at post time, so an invalid route (e.g. `Previous`
/// from the first agent) fails inside the handler that produced it.
pub struct Outbox<M> {
    sender: AgentId,
    n: usize,
    metrics: Arc<dyn MetricsSink>,
    queued: Vec<Envelope<M>>,
    solution: Option<Assignment>,
    finished: bool,
}

impl<M: Tagged> Outbox<M> {
    /// Creates an outbox for `sender` in an `n`-agent run.
    pub fn new(sender: AgentId, n: usize, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            sender,
            n,
            metrics,
            queued: Vec::new(),
            solution: None,
            finished: false,
        }
    }

    /// Queues `body` for `route`.
    ///
    /// # Returns
    /// * `Ok(count)` - Number of recipients
    /// * `Err(EnvError)` - The route does not exist for this sender
    pub fn post(&mut self, route: Route, body: M) -> Result<usize, EnvError> {
        let to = route.resolve(self.sender, self.n)?;
        let recipients = match to {
            Recipient::Agent(_) => 1,
            Recipient::Broadcast => self.n.saturating_sub(1),
        };
        let tag = body.tag();

        tracing::trace!(from = %self.sender, ?to, tag, "post");
        self.metrics
            .record(self.sender, MetricEvent::MessageSent { tag, recipients });
        self.queued.push(Envelope::new(self.sender, to, body));
        Ok(recipients)
    }

    /// Records the final complete solution. Allowed once per agent.
    pub fn finish(&mut self, solution: Assignment) -> Result<(), CoreError> {
        if self.finished {
            return Err(CoreError::invariant(self.sender, "finish called twice"));
        }
        tracing::debug!(agent = %self.sender, "finish");
        self.finished = true;
        self.solution = Some(solution);
        Ok(())
    }

    /// Takes all queued envelopes in post order.
    pub fn drain(&mut self) -> Vec<Envelope<M>> {
        std::mem::take(&mut self.queued)
    }

    /// Takes the solution recorded by `finish`, if any.
    pub fn take_solution(&mut self) -> Option<Assignment> {
        self.solution.take()
    }

    /// Returns true once `finish` has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of agents in the run.
    pub fn agents(&self) -> usize {
        self.n
    }
}
