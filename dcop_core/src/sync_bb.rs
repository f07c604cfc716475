//! SyncBB: synchronous branch and bound over the agent chain.
//!
//! The current partial assignment travels forward (`CPA`) and backward
//! (`BACKTRACK`) along the id order. Each agent tries its values cheapest
//! first and prunes as soon as `lb + added >= ub`. The last agent reports
//! every complete assignment to the first agent (`BEST_SOLUTION`), which
//! keeps the incumbent and ends the run when its own domain is exhausted.
//!
//! # State machine
//!
//! ```text
//!            CPA / start
//!   Idle ─────────────────► AwaitingChildResult ──BACKTRACK──┐
//!    ▲                              ▲                        │
//!    └──── domain exhausted ────────┴──── next value ◄───────┘
//!
//!   first agent, exhausted:  ─► AwaitingBestSolution ─► Terminated
//! ```
//!
//! Choosing a value is synchronous, so there is no separate
//! "awaiting domain choice" state: it happens inside the handler.

use crate::agent::{AgentSetup, DcopAgent};
use crate::assignment::Assignment;
use crate::error::CoreError;
use crate::metrics::{MetricEvent, MetricsSink};
use crate::outbox::{Outbox, Tagged};
use dcop_env::{AgentId, Cost, Problem, Route, Value, UNBOUNDED};
use std::sync::Arc;
use tracing::{debug, info};

/// SyncBB message vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncBbMessage {
    /// Forward step: assignment so far, its cost, current bound
    Cpa {
        cpa: Assignment,
        lb: Cost,
        ub: Cost,
    },
    /// Backward step: the sender removed its own entry
    Backtrack { cpa: Assignment, ub: Cost },
    /// Complete assignment found by the last agent
    BestSolution { cpa: Assignment, cost: Cost },
}

impl Tagged for SyncBbMessage {
    fn tag(&self) -> &'static str {
        match self {
            SyncBbMessage::Cpa { .. } => "CPA",
            SyncBbMessage::Backtrack { .. } => "BACKTRACK",
            SyncBbMessage::BestSolution { .. } => "BEST_SOLUTION",
        }
    }
}

/// Control state of one SyncBB agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncBbState {
    /// Not holding the search token
    Idle,
    /// Forwarded a CPA, waiting for the successor to backtrack
    AwaitingChildResult,
    /// First agent only: search is over, the report for `ub` is in flight
    AwaitingBestSolution { ub: Cost },
    /// Run finished
    Terminated,
}

/// One SyncBB agent.
pub struct SyncBbAgent {
    id: AgentId,
    n: usize,
    problem: Arc<dyn Problem>,
    metrics: Arc<dyn MetricsSink>,
    state: SyncBbState,

    /// Cost of the assignment received with the last CPA
    lb: Cost,

    /// Values not yet tried under the current CPA, in domain order
    current_domain: Vec<Value>,

    /// Incumbent and its cost (first agent only)
    best: Option<(Assignment, Cost)>,
}

impl SyncBbAgent {
    /// Creates an agent from its setup.
    pub fn new(setup: AgentSetup) -> Result<Self, CoreError> {
        setup.validate()?;
        Ok(Self {
            id: setup.id,
            n: setup.agents(),
            problem: setup.problem,
            metrics: setup.metrics,
            state: SyncBbState::Idle,
            lb: 0,
            current_domain: Vec::new(),
            best: None,
        })
    }

    /// Current control state.
    pub fn state(&self) -> SyncBbState {
        self.state
    }

    /// The incumbent held by the first agent.
    pub fn incumbent(&self) -> Option<&(Assignment, Cost)> {
        self.best.as_ref()
    }

    /// Cheapest remaining value under `cpa`, without consuming it.
    ///
    /// Calling this twice without touching the remaining domain returns the
    /// same value.
    pub fn next_candidate(&self, cpa: &Assignment) -> Option<Value> {
        cpa.min_cost_value(self.problem.as_ref(), self.id, &self.current_domain)
    }

    /// Consumes the cheapest remaining value and accepts it only if it stays
    /// under `ub`.
    fn choose_next_value(&mut self, cpa: &Assignment, ub: Cost) -> Option<Value> {
        let value = self.next_candidate(cpa)?;
        self.current_domain.retain(|v| *v != value);

        let added = cpa.added_cost(self.problem.as_ref(), self.id, value);
        if self.lb.saturating_add(added) < ub {
            Some(value)
        } else {
            self.metrics.record(self.id, MetricEvent::Prune);
            None
        }
    }

    fn handle_cpa(
        &mut self,
        cpa: Assignment,
        lb: Cost,
        ub: Cost,
        out: &mut Outbox<SyncBbMessage>,
    ) -> Result<(), CoreError> {
        self.current_domain = self.problem.domain(self.id).to_vec();
        self.lb = lb;
        self.process_cpa(cpa, ub, out)
    }

    fn process_cpa(
        &mut self,
        mut cpa: Assignment,
        mut ub: Cost,
        out: &mut Outbox<SyncBbMessage>,
    ) -> Result<(), CoreError> {
        loop {
            let Some(value) = self.choose_next_value(&cpa, ub) else {
                return self.domain_exhausted(cpa, ub, out);
            };

            let added = cpa.added_cost(self.problem.as_ref(), self.id, value);
            cpa.assign(self.id, value);
            self.metrics
                .record(self.id, MetricEvent::AssignmentsForwarded(self.id.0 as u64 + 1));

            if !self.id.is_last(self.n) {
                let msg = SyncBbMessage::Cpa {
                    cpa,
                    lb: self.lb + added,
                    ub,
                };
                out.post(Route::Next, msg)?;
                self.state = SyncBbState::AwaitingChildResult;
                return Ok(());
            }

            // Complete assignment: report it and keep searching under the new bound
            let cost = self.lb + added;
            debug!(agent = %self.id, cost, "complete assignment");
            let msg = SyncBbMessage::BestSolution {
                cpa: cpa.clone(),
                cost,
            };
            out.post(Route::First, msg)?;
            cpa.unassign(self.id);
            ub = cost;
        }
    }

    fn domain_exhausted(
        &mut self,
        mut cpa: Assignment,
        ub: Cost,
        out: &mut Outbox<SyncBbMessage>,
    ) -> Result<(), CoreError> {
        if self.id.is_first() {
            return self.conclude(ub, out);
        }
        cpa.unassign(self.id);
        out.post(Route::Previous, SyncBbMessage::Backtrack { cpa, ub })?;
        self.state = SyncBbState::Idle;
        Ok(())
    }

    /// First agent: the search space is exhausted and `ub` is optimal.
    fn conclude(&mut self, ub: Cost, out: &mut Outbox<SyncBbMessage>) -> Result<(), CoreError> {
        if ub == UNBOUNDED {
            return Err(CoreError::invariant(self.id, "search ended without any complete assignment"));
        }
        match &self.best {
            Some((_, cost)) if *cost == ub => self.finish(out),
            _ => {
                debug!(agent = %self.id, ub, "waiting for best solution report");
                self.state = SyncBbState::AwaitingBestSolution { ub };
                Ok(())
            }
        }
    }

    fn record_solution(
        &mut self,
        cpa: Assignment,
        cost: Cost,
        out: &mut Outbox<SyncBbMessage>,
    ) -> Result<(), CoreError> {
        if !self.id.is_first() {
            return Err(CoreError::unexpected(self.id, "BEST_SOLUTION", self.state));
        }
        if self.best.as_ref().map_or(true, |(_, c)| cost < *c) {
            debug!(agent = %self.id, cost, "new incumbent");
            self.best = Some((cpa, cost));
        }
        match self.state {
            SyncBbState::AwaitingBestSolution { ub } if ub == cost => self.finish(out),
            _ => Ok(()),
        }
    }

    fn finish(&mut self, out: &mut Outbox<SyncBbMessage>) -> Result<(), CoreError> {
        let (solution, cost) = self
            .best
            .clone()
            .ok_or_else(|| CoreError::invariant(self.id, "no incumbent to report"))?;
        info!(agent = %self.id, cost, "🏁 SyncBB finished");
        self.state = SyncBbState::Terminated;
        out.finish(solution)
    }
}

impl DcopAgent for SyncBbAgent {
    type Message = SyncBbMessage;

    fn id(&self) -> AgentId {
        self.id
    }

    fn start(&mut self, out: &mut Outbox<SyncBbMessage>) -> Result<(), CoreError> {
        if self.id.is_first() {
            self.handle_cpa(Assignment::new(), 0, UNBOUNDED, out)?;
        }
        Ok(())
    }

    fn handle(
        &mut self,
        from: AgentId,
        msg: SyncBbMessage,
        out: &mut Outbox<SyncBbMessage>,
    ) -> Result<(), CoreError> {
        tracing::trace!(agent = %self.id, %from, tag = msg.tag(), "recv");
        if self.state == SyncBbState::Terminated {
            return Err(CoreError::unexpected(self.id, msg.tag(), self.state));
        }
        match msg {
            SyncBbMessage::Cpa { cpa, lb, ub } => self.handle_cpa(cpa, lb, ub, out),
            SyncBbMessage::Backtrack { cpa, ub } => self.process_cpa(cpa, ub, out),
            SyncBbMessage::BestSolution { cpa, cost } => self.record_solution(cpa, cost, out),
        }
    }
}
