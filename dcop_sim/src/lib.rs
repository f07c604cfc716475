//! DCOP Deterministic Simulation Harness
//!
//! This crate runs SyncBB, P-SyncBB and PC-SyncBB agents from `dcop_core`
//! against generated or hand-built problems and checks every answer against
//! brute force.
//!
//! # Core Principle: One Seed
//!
//! All sources of non-determinism are derived from a single 64-bit seed:
//! - **Agents**: per-agent RNGs (masks, shares, nonces, value shuffles)
//! - **Keys**: one Paillier key pair per agent, cached
//! - **Network**: cross-link interleaving of the link router
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ LinkRouter (per-link FIFO, seeded cross-link order)  │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼────┐              ┌────▼────┐                       │
//! │  │  Agent  │◄────────────►│  Agent  │     ...               │
//! │  │   a0    │    Outbox    │   a1    │                       │
//! │  └─────────┘   Envelopes  └─────────┘                       │
//! │       ▲                        ▲                            │
//! │       │                        │                            │
//! │  ┌────┴────────────────────────┴────┐                       │
//! │  │            Oracle                │                       │
//! │  │  (exhaustive ground-truth cost)  │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The same agents also run as tokio tasks (`Runtime::Actors`), one
//! unbounded inbox each.
//!
//! # Usage
//!
//! ```ignore
//! use dcop_sim::{solve, ScenarioId, SimConfig};
//! use std::sync::Arc;
//!
//! let problem = Arc::new(ScenarioId::HardConstraint.problem(42)?);
//! let outcome = solve(problem, &SimConfig::default())?;
//! println!("cost = {}", outcome.cost);
//! ```

mod actors;
mod context;
mod error;
mod keys;
mod network;
mod oracle;
mod runner;
mod world;
pub mod generators;
pub mod graph;
pub mod scenarios;

pub use actors::{run_actors, run_blocking};
pub use context::SimContext;
pub use error::SimError;
pub use keys::DeterministicKeyProvider;
pub use network::{ChannelTransport, DeliveryOrder, InFlight, LinkRouter};
pub use oracle::{Optimum, Oracle, DEFAULT_ORACLE_LIMIT};
pub use runner::{ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use world::{solve, RunOutcome, Runtime, SimConfig, SimWorld};
