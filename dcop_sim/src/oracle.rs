//! Ground truth oracle for simulation.
//!
//! The Oracle knows the true optimum of a problem by enumerating every
//! complete assignment. Scenarios check each protocol's answer against it.

use crate::error::SimError;
use dcop_core::Assignment;
use dcop_env::{AgentId, Cost, Problem, Value};
use serde::Serialize;

/// Default cap on the number of enumerated assignments.
pub const DEFAULT_ORACLE_LIMIT: u128 = 5_000_000;

/// A minimum-cost complete assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Optimum {
    /// True minimum cost
    pub cost: Cost,

    /// First optimal assignment in domain order
    pub assignment: Assignment,
}

/// Brute-force solver.
#[derive(Debug, Clone, Copy)]
pub struct Oracle {
    limit: u128,
}

impl Default for Oracle {
    fn default() -> Self {
        Self::new()
    }
}

impl Oracle {
    /// Creates an oracle with the default limit.
    pub fn new() -> Self {
        Self {
            limit: DEFAULT_ORACLE_LIMIT,
        }
    }

    /// Overrides the search space cap.
    pub fn with_limit(mut self, limit: u128) -> Self {
        self.limit = limit;
        self
    }

    /// Number of complete assignments of `problem`.
    pub fn search_space(problem: &dyn Problem) -> u128 {
        AgentId::all(problem.num_variables())
            .map(|id| problem.domain(id).len() as u128)
            .fold(1u128, |acc, d| acc.saturating_mul(d))
    }

    /// Enumerates every complete assignment and returns the cheapest.
    ///
    /// # Returns
    /// * `Ok(Optimum)` - Minimum cost and its first witness
    /// * `Err(SimError::OracleLimit)` - More assignments than the cap
    /// * `Err(SimError::Generator)` - Some variable has an empty domain
    pub fn solve(&self, problem: &dyn Problem) -> Result<Optimum, SimError> {
        let n = problem.num_variables();
        let space = Self::search_space(problem);
        if space > self.limit {
            return Err(SimError::OracleLimit(space));
        }
        if space == 0 {
            return Err(SimError::Generator("a variable has an empty domain".to_string()));
        }

        let domains: Vec<&[Value]> = AgentId::all(n).map(|id| problem.domain(id)).collect();
        // Odometer over domain indices, variable 0 most significant
        let mut digits = vec![0usize; n];
        let mut best: Option<(Cost, Vec<usize>)> = None;

        loop {
            let mut cost: Cost = 0;
            for a in 0..n {
                for b in a + 1..n {
                    cost += problem.cost(AgentId(a), domains[a][digits[a]], AgentId(b), domains[b][digits[b]]);
                }
            }
            if best.as_ref().map_or(true, |(c, _)| cost < *c) {
                best = Some((cost, digits.clone()));
            }

            let mut pos = n;
            loop {
                if pos == 0 {
                    let (cost, digits) = best.unwrap_or_default();
                    let assignment = digits
                        .iter()
                        .enumerate()
                        .map(|(i, d)| (AgentId(i), domains[i][*d]))
                        .collect();
                    return Ok(Optimum { cost, assignment });
                }
                pos -= 1;
                digits[pos] += 1;
                if digits[pos] < domains[pos].len() {
                    break;
                }
                digits[pos] = 0;
            }
        }
    }
}
