//! Current partial assignment (CPA).

use dcop_env::{AgentId, Cost, Problem, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered mapping agent → value threaded through the search chain.
///
/// Carried by value inside `CPA` / `BACKTRACK` messages: every hop gets its
/// own copy, so no two agents ever mutate the same assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    values: BTreeMap<AgentId, Value>,
}

impl Assignment {
    /// Creates an empty assignment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or overwrites) the value of `var`.
    pub fn assign(&mut self, var: AgentId, value: Value) {
        self.values.insert(var, value);
    }

    /// Removes the caller's own entry, returning its value.
    pub fn unassign(&mut self, var: AgentId) -> Option<Value> {
        self.values.remove(&var)
    }

    /// Value of `var`, if assigned.
    pub fn get(&self, var: AgentId) -> Option<Value> {
        self.values.get(&var).copied()
    }

    /// Returns true if `var` is assigned.
    pub fn contains(&self, var: AgentId) -> bool {
        self.values.contains_key(&var)
    }

    /// Number of assigned variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns true if all `n` variables are assigned.
    pub fn is_complete(&self, n: usize) -> bool {
        self.values.len() == n && AgentId::all(n).all(|id| self.contains(id))
    }

    /// Iterates over `(var, value)` in ascending variable order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, Value)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    /// Cost `var = value` would add against every other assigned variable.
    ///
    /// The entry of `var` itself (if any) is ignored.
    pub fn added_cost(&self, problem: &dyn Problem, var: AgentId, value: Value) -> Cost {
        self.iter()
            .filter(|(other, _)| *other != var)
            .map(|(other, v)| problem.cost(var, value, other, v))
            .sum()
    }

    /// Total cost of all constraints between assigned variables.
    pub fn total_cost(&self, problem: &dyn Problem) -> Cost {
        let entries: Vec<(AgentId, Value)> = self.iter().collect();
        let mut total = 0;
        for (i, (a, va)) in entries.iter().enumerate() {
            for (b, vb) in &entries[i + 1..] {
                total += problem.cost(*a, *va, *b, *vb);
            }
        }
        total
    }

    /// Candidate with the smallest added cost for `var`.
    ///
    /// Ties go to the candidate listed first, so passing candidates in the
    /// problem's domain order makes the choice deterministic.
    pub fn min_cost_value(
        &self,
        problem: &dyn Problem,
        var: AgentId,
        candidates: &[Value],
    ) -> Option<Value> {
        let mut best: Option<(Value, Cost)> = None;
        for &value in candidates {
            let cost = self.added_cost(problem, var, value);
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((value, cost));
            }
        }
        best.map(|(value, _)| value)
    }

    /// Values in variable order; `None` if some variable in `[0, n)` is missing.
    pub fn to_vec(&self, n: usize) -> Option<Vec<Value>> {
        AgentId::all(n).map(|id| self.get(id)).collect()
    }
}

impl FromIterator<(AgentId, Value)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (AgentId, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
