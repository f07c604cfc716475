//! Constraint problem model consumed (read-only) by every agent.

use crate::types::{AgentId, Cost, Value};
use std::collections::{BTreeMap, HashMap};

/// Read-only view of a pairwise DCOP.
///
/// One variable per agent, each with a finite integer domain. Costs are
/// symmetric: `cost(a, va, b, vb) == cost(b, vb, a, va)`. Pairs without a
/// constraint cost 0.
///
/// # Implementations
///
/// - **In-memory**: [`TableProblem`], filled by generators or by hand
/// - Anything else that can answer the lookups below (shared across all
///   agents, hence `Send + Sync`)
pub trait Problem: Send + Sync {
    /// Number of variables (= number of agents), `N`.
    fn num_variables(&self) -> usize;

    /// Domain of `var`, in the problem's preferred value order.
    fn domain(&self, var: AgentId) -> &[Value];

    /// Ids of the variables constrained with `var`, ascending.
    fn neighbors(&self, var: AgentId) -> &[AgentId];

    /// Cost of the pair `var_a = val_a`, `var_b = val_b`.
    fn cost(&self, var_a: AgentId, val_a: Value, var_b: AgentId, val_b: Value) -> Cost;

    /// Largest single constraint cost (the `max-cost` metadata entry).
    fn max_cost(&self) -> Cost;

    /// Free-form generator metadata (`p1`, `d`, ...).
    fn metadata(&self, _key: &str) -> Option<&str> {
        None
    }

    /// Index of `value` within `domain(var)`.
    fn domain_index(&self, var: AgentId, value: Value) -> Option<usize> {
        self.domain(var).iter().position(|v| *v == value)
    }
}

/// Hash-backed pairwise cost table.
#[derive(Debug, Clone, Default)]
pub struct TableProblem {
    /// Domain per variable
    domains: Vec<Vec<Value>>,

    /// Sorted neighbor lists
    neighbors: Vec<Vec<AgentId>>,

    /// Directed entries; `set_cost` always writes both directions
    costs: HashMap<(usize, Value, usize, Value), Cost>,

    /// Largest cost a single constraint may take
    max_cost: Cost,

    /// Generator parameters
    metadata: BTreeMap<String, String>,
}

impl TableProblem {
    /// Creates a problem with explicit domains and no constraints.
    pub fn new(domains: Vec<Vec<Value>>, max_cost: Cost) -> Self {
        let n = domains.len();
        let mut problem = Self {
            domains,
            neighbors: vec![Vec::new(); n],
            costs: HashMap::new(),
            max_cost,
            metadata: BTreeMap::new(),
        };
        problem.set_metadata("max-cost", max_cost);
        problem
    }

    /// Creates `n` variables sharing the domain `0..d`.
    pub fn uniform(n: usize, d: usize, max_cost: Cost) -> Self {
        let domain: Vec<Value> = (0..d as Value).collect();
        Self::new(vec![domain; n], max_cost)
    }

    /// Sets the cost of a value pair (both directions) and links the variables.
    pub fn set_cost(&mut self, var_a: AgentId, val_a: Value, var_b: AgentId, val_b: Value, cost: Cost) {
        debug_assert_ne!(var_a, var_b, "constraints are between distinct variables");
        self.connect(var_a, var_b);
        self.costs.insert((var_a.0, val_a, var_b.0, val_b), cost);
        self.costs.insert((var_b.0, val_b, var_a.0, val_a), cost);
    }

    /// Registers a constraint between two variables without touching costs.
    pub fn connect(&mut self, var_a: AgentId, var_b: AgentId) {
        for (from, to) in [(var_a, var_b), (var_b, var_a)] {
            let list = &mut self.neighbors[from.0];
            if let Err(pos) = list.binary_search(&to) {
                list.insert(pos, to);
            }
        }
    }

    /// Returns true if the two variables share a constraint.
    pub fn is_constrained(&self, var_a: AgentId, var_b: AgentId) -> bool {
        self.neighbors[var_a.0].binary_search(&var_b).is_ok()
    }

    /// Records a metadata entry.
    pub fn set_metadata(&mut self, key: &str, value: impl ToString) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    /// Number of constrained variable pairs.
    pub fn constraint_count(&self) -> usize {
        self.neighbors.iter().map(|n| n.len()).sum::<usize>() / 2
    }
}

impl Problem for TableProblem {
    fn num_variables(&self) -> usize {
        self.domains.len()
    }

    fn domain(&self, var: AgentId) -> &[Value] {
        &self.domains[var.0]
    }

    fn neighbors(&self, var: AgentId) -> &[AgentId] {
        &self.neighbors[var.0]
    }

    fn cost(&self, var_a: AgentId, val_a: Value, var_b: AgentId, val_b: Value) -> Cost {
        *self
            .costs
            .get(&(var_a.0, val_a, var_b.0, val_b))
            .unwrap_or(&0)
    }

    fn max_cost(&self) -> Cost {
        self.max_cost
    }

    fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}
