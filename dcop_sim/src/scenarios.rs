//! Named DCOP scenarios.

use crate::error::SimError;
use crate::generators::{self, ScaleFreeParams};
use crate::network::DeliveryOrder;
use crate::world::Runtime;
use dcop_env::{AgentId, Cost, TableProblem};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Hard-constraint cost used by scenario B.
pub const HARD_COST: Cost = 1_000;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// A: two agents, equality constraint
    EqualityPair,

    /// B: three-agent chain with a hard constraint between agents 0 and 2
    HardConstraint,

    /// C: three agents, secure sums against the plain optimum
    SecureSumChain,

    // ═══════════════════════════════════════════════════
    // GENERATED PROBLEMS - shuffled cross-link delivery
    // ═══════════════════════════════════════════════════

    /// Unstructured connected random DCOP
    RandomUnstructured,

    /// Graph colouring with costs
    GraphColouring,

    /// Scale-free topology
    ScaleFree,

    /// Random problem on the tokio actor runtime
    Actors,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::EqualityPair,
            ScenarioId::HardConstraint,
            ScenarioId::SecureSumChain,
            ScenarioId::RandomUnstructured,
            ScenarioId::GraphColouring,
            ScenarioId::ScaleFree,
            ScenarioId::Actors,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::EqualityPair => "equality_pair",
            ScenarioId::HardConstraint => "hard_constraint",
            ScenarioId::SecureSumChain => "secure_sum_chain",
            ScenarioId::RandomUnstructured => "random_unstructured",
            ScenarioId::GraphColouring => "graph_colouring",
            ScenarioId::ScaleFree => "scale_free",
            ScenarioId::Actors => "actors",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::EqualityPair => "2 agents, cost 0 if equal else 5, optimum 0",
            ScenarioId::HardConstraint => "3-agent chain, hard cost between a0 and a2 must be avoided",
            ScenarioId::SecureSumChain => "3 agents, P-SyncBB optimum equals SyncBB optimum",
            ScenarioId::RandomUnstructured => "6 agents, d=3, p1=0.5, shuffled links, checked against brute force",
            ScenarioId::GraphColouring => "7 agents, 3 colours, p1=0.5, shuffled links",
            ScenarioId::ScaleFree => "8 agents, d=2, m0=4 ep=0.75 m=1, shuffled links",
            ScenarioId::Actors => "5 agents, d=3, one tokio task per agent",
        }
    }

    /// Returns true if the problem is generated from the seed.
    pub fn is_generated(&self) -> bool {
        matches!(
            self,
            ScenarioId::RandomUnstructured | ScenarioId::GraphColouring | ScenarioId::ScaleFree | ScenarioId::Actors
        )
    }

    /// Cross-link delivery order the scenario runs under.
    pub fn delivery(&self) -> DeliveryOrder {
        if self.is_generated() {
            DeliveryOrder::Shuffled
        } else {
            DeliveryOrder::Fifo
        }
    }

    /// Runtime the scenario runs on.
    pub fn runtime(&self) -> Runtime {
        match self {
            ScenarioId::Actors => Runtime::Actors,
            _ => Runtime::Sim,
        }
    }

    /// Builds the scenario's problem. Generated problems depend on `seed`.
    pub fn problem(&self, seed: u64) -> Result<TableProblem, SimError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        match self {
            ScenarioId::EqualityPair => {
                let mut p = TableProblem::uniform(2, 2, 5);
                p.set_cost(AgentId(0), 0, AgentId(1), 1, 5);
                p.set_cost(AgentId(0), 1, AgentId(1), 0, 5);
                Ok(p)
            }
            ScenarioId::HardConstraint => {
                let mut p = TableProblem::uniform(3, 2, HARD_COST);
                // Chain links favour a0 = a2 = 0, which is exactly the forbidden pair
                for (a, b) in [(0, 1), (1, 2)] {
                    for va in 0..2 {
                        for vb in 0..2 {
                            let cost = if va == 0 && vb == 0 { 0 } else { 3 };
                            p.set_cost(AgentId(a), va, AgentId(b), vb, cost);
                        }
                    }
                }
                p.set_cost(AgentId(0), 0, AgentId(2), 0, HARD_COST);
                Ok(p)
            }
            ScenarioId::SecureSumChain => {
                let mut p = TableProblem::uniform(3, 3, 9);
                for va in 0..3 {
                    for vb in 0..3 {
                        p.set_cost(AgentId(0), va, AgentId(1), vb, (va * 3 + vb) as Cost % 7 + 1);
                        p.set_cost(AgentId(1), va, AgentId(2), vb, (va + 2 * vb) as Cost % 5);
                        p.set_cost(AgentId(0), va, AgentId(2), vb, if va == vb { 6 } else { 2 });
                    }
                }
                Ok(p)
            }
            ScenarioId::RandomUnstructured => generators::unstructured(6, 3, 10, 0.5, &mut rng),
            ScenarioId::GraphColouring => generators::graph_colouring(7, 3, 0.5, 10, &mut rng),
            ScenarioId::ScaleFree => generators::scale_free(8, 2, ScaleFreeParams::default(), 10, &mut rng),
            ScenarioId::Actors => generators::unstructured(5, 3, 10, 0.6, &mut rng),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "equality_pair" | "equalitypair" | "a" => Ok(ScenarioId::EqualityPair),
            "hard_constraint" | "hardconstraint" | "b" => Ok(ScenarioId::HardConstraint),
            "secure_sum_chain" | "securesumchain" | "c" => Ok(ScenarioId::SecureSumChain),
            "random_unstructured" | "unstructured" | "random" => Ok(ScenarioId::RandomUnstructured),
            "graph_colouring" | "graph_coloring" | "colouring" | "coloring" => Ok(ScenarioId::GraphColouring),
            "scale_free" | "scalefree" => Ok(ScenarioId::ScaleFree),
            "actors" | "tokio" => Ok(ScenarioId::Actors),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcop_env::Problem;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.to_string().parse::<ScenarioId>().unwrap(), id);
        }
        assert_eq!("B".parse::<ScenarioId>().unwrap(), ScenarioId::HardConstraint);
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_fixed_problems_ignore_seed() {
        let a = ScenarioId::HardConstraint.problem(1).unwrap();
        let b = ScenarioId::HardConstraint.problem(2).unwrap();
        assert_eq!(a.cost(AgentId(0), 0, AgentId(2), 0), HARD_COST);
        assert_eq!(b.cost(AgentId(0), 0, AgentId(2), 0), HARD_COST);
        assert_eq!(a.max_cost(), HARD_COST);
    }

    #[test]
    fn test_generated_problems_build() {
        for id in ScenarioId::all().into_iter().filter(|s| s.is_generated()) {
            let p = id.problem(42).unwrap();
            assert!(p.num_variables() >= 5, "{id}");
            assert_eq!(id.delivery(), DeliveryOrder::Shuffled);
        }
        assert_eq!(ScenarioId::Actors.runtime(), Runtime::Actors);
        assert_eq!(ScenarioId::EqualityPair.delivery(), DeliveryOrder::Fifo);
    }
}
