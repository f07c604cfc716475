//! DCOP Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary that lets the search agents in
//! `dcop_core` run unchanged under the deterministic simulator and under the
//! tokio actor runtime.
//!
//! # Core Concept: Agents Only See Interfaces
//!
//! An agent never touches the world directly. Everything it consumes is
//! abstracted here:
//! - The constraint problem (`Problem`): domains, neighbors, pairwise costs
//! - Message routing (`Route`, `Envelope`): relative addressing along the
//!   agent chain, broadcast, self-delivery
//! - Transport (`NetworkTransport`): how envelopes physically move
//! - Randomness (`AgentContext`): every agent RNG derives from one seed
//!
//! By deriving all entropy from a single 64-bit seed, any failing run is
//! reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use dcop_env::{AgentId, Route, TableProblem};
//!
//! let mut problem = TableProblem::uniform(2, 2, 5);
//! problem.set_cost(AgentId(0), 0, AgentId(1), 1, 5);
//!
//! let to = Route::Next.resolve(AgentId(0), problem.num_variables())?;
//! ```

mod context;
mod error;
mod network;
mod os_impl;
mod problem;
mod types;

pub use context::{agent_seed, AgentContext};
pub use error::EnvError;
pub use network::NetworkTransport;
pub use os_impl::OsContext;
pub use problem::{Problem, TableProblem};
pub use types::{AgentId, Cost, Envelope, Recipient, Route, Value, UNBOUNDED};
