//! Random DCOP generators.
//!
//! All generators produce a [`TableProblem`] over the domain `0..d` and record
//! their parameters (always including `max-cost`) in the problem metadata.

use crate::error::SimError;
use crate::graph::Graph;
use dcop_env::{AgentId, Cost, Problem, TableProblem, Value};
use rand::Rng;
use tracing::debug;

fn check_common(n: usize, d: usize, max_cost: Cost) -> Result<(), SimError> {
    if n == 0 || d == 0 {
        return Err(SimError::Generator(format!("need n > 0 and d > 0, got n={n} d={d}")));
    }
    if max_cost < 1 {
        return Err(SimError::Generator(format!("max-cost must be positive, got {max_cost}")));
    }
    Ok(())
}

/// Unstructured random DCOP, repaired to a connected constraint graph.
///
/// Every variable pair is constrained with probability `p1`; a constrained
/// pair gets a random cost in `0..max_cost` for every value combination.
/// While some variable is unreachable from variable 0, the first such
/// variable is tied to 0 by a single value pair costing `1..=max_cost`.
pub fn unstructured<R: Rng + ?Sized>(
    n: usize,
    d: usize,
    max_cost: Cost,
    p1: f64,
    rng: &mut R,
) -> Result<TableProblem, SimError> {
    check_common(n, d, max_cost)?;
    if !(0.0..=1.0).contains(&p1) {
        return Err(SimError::Generator(format!("constraint probability {p1} outside [0, 1]")));
    }

    let mut problem = TableProblem::uniform(n, d, max_cost);
    let values = d as Value;
    for a in 0..n {
        for b in a + 1..n {
            if !rng.gen_bool(p1) {
                continue;
            }
            for va in 0..values {
                for vb in 0..values {
                    let cost = rng.gen_range(0..max_cost);
                    problem.set_cost(AgentId(a), va, AgentId(b), vb, cost);
                }
            }
        }
    }

    let mut repairs = 0;
    while let Some(loose) = first_unreachable(&problem) {
        let va = rng.gen_range(0..values);
        let vb = rng.gen_range(0..values);
        let cost = rng.gen_range(1..=max_cost);
        problem.set_cost(AgentId(0), va, AgentId(loose), vb, cost);
        repairs += 1;
    }
    debug!(n, d, p1, repairs, constraints = problem.constraint_count(), "unstructured problem");

    problem.set_metadata("p1", p1);
    problem.set_metadata("n", n);
    problem.set_metadata("d", d);
    Ok(problem)
}

/// Graph colouring with costs on a random connected graph.
///
/// The graph has `floor(p1 * n(n-1)/2)` edges; along each edge only equal
/// colours cost something, a random amount in `0..max_cost` per colour.
pub fn graph_colouring<R: Rng + ?Sized>(
    n: usize,
    d: usize,
    p1: f64,
    max_cost: Cost,
    rng: &mut R,
) -> Result<TableProblem, SimError> {
    check_common(n, d, max_cost)?;
    let graph = Graph::random_connected(n, p1, rng)?;

    let mut problem = TableProblem::uniform(n, d, max_cost);
    for (a, b) in graph.edges() {
        for colour in 0..d as Value {
            let cost = rng.gen_range(0..max_cost);
            problem.set_cost(AgentId(a), colour, AgentId(b), colour, cost);
        }
    }
    debug!(n, d, p1, edges = graph.edge_count(), "graph colouring problem");

    problem.set_metadata("p1", p1);
    problem.set_metadata("n", n);
    problem.set_metadata("d", d);
    Ok(problem)
}

/// Parameters of the scale-free topology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFreeParams {
    /// Seed graph size (default: 4)
    pub m0: usize,
    /// Seed graph edge probability (default: 0.75)
    pub ep: f64,
    /// Links per added vertex (default: 1)
    pub m: usize,
}

impl Default for ScaleFreeParams {
    fn default() -> Self {
        Self { m0: 4, ep: 0.75, m: 1 }
    }
}

/// Scale-free DCOP: full random `d x d` cost tables on a preferential
/// attachment graph.
pub fn scale_free<R: Rng + ?Sized>(
    n: usize,
    d: usize,
    params: ScaleFreeParams,
    max_cost: Cost,
    rng: &mut R,
) -> Result<TableProblem, SimError> {
    check_common(n, d, max_cost)?;
    let graph = Graph::scale_free(n, params.m0, params.ep, params.m, rng)?;

    let mut problem = TableProblem::uniform(n, d, max_cost);
    let values = d as Value;
    for (a, b) in graph.edges() {
        for va in 0..values {
            for vb in 0..values {
                let cost = rng.gen_range(0..max_cost);
                problem.set_cost(AgentId(a), va, AgentId(b), vb, cost);
            }
        }
    }
    debug!(n, d, edges = graph.edge_count(), "scale-free problem");

    problem.set_metadata("n", n);
    problem.set_metadata("d", d);
    problem.set_metadata("m0", params.m0);
    problem.set_metadata("ep", params.ep);
    problem.set_metadata("m", params.m);
    Ok(problem)
}

/// Lowest variable that cannot be reached from variable 0.
fn first_unreachable(problem: &TableProblem) -> Option<usize> {
    let n = problem.num_variables();
    let mut graph = Graph::new(n);
    for a in AgentId::all(n) {
        for b in problem.neighbors(a) {
            graph.add_edge(a.0, b.0);
        }
    }
    graph.reachable_from(0).iter().position(|seen| !seen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn connected(problem: &TableProblem) -> bool {
        first_unreachable(problem).is_none()
    }

    #[test]
    fn test_unstructured_is_repaired() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        // p1 = 0 forces every link to come from the repair loop
        let p = unstructured(6, 3, 10, 0.0, &mut rng).unwrap();
        assert!(connected(&p));
        assert_eq!(p.constraint_count(), 5);
        assert_eq!(p.metadata("max-cost"), Some("10"));
        assert_eq!(p.metadata("p1"), Some("0"));
        for b in 1..6 {
            assert!(p.is_constrained(AgentId(0), AgentId(b)));
        }
    }

    #[test]
    fn test_unstructured_costs_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let p = unstructured(5, 3, 4, 0.7, &mut rng).unwrap();
        assert!(connected(&p));
        for a in AgentId::all(5) {
            for &b in p.neighbors(a) {
                for va in 0..3 {
                    for vb in 0..3 {
                        let c = p.cost(a, va, b, vb);
                        assert!((0..=4).contains(&c));
                        assert_eq!(c, p.cost(b, vb, a, va));
                    }
                }
            }
        }
    }

    #[test]
    fn test_graph_colouring_only_same_colour_costs() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let p = graph_colouring(6, 3, 0.5, 10, &mut rng).unwrap();
        assert!(connected(&p));
        assert_eq!(p.constraint_count(), 7);
        for a in AgentId::all(6) {
            for &b in p.neighbors(a) {
                assert_eq!(p.cost(a, 0, b, 1), 0);
                assert!(p.cost(a, 2, b, 2) < 10);
            }
        }
    }

    #[test]
    fn test_scale_free_metadata() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let p = scale_free(8, 2, ScaleFreeParams::default(), 10, &mut rng).unwrap();
        assert!(connected(&p));
        assert_eq!(p.metadata("m0"), Some("4"));
        assert_eq!(p.metadata("max-cost"), Some("10"));
        assert_eq!(p.max_cost(), 10);
    }

    #[test]
    fn test_bad_parameters() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        assert!(unstructured(0, 2, 10, 0.5, &mut rng).is_err());
        assert!(unstructured(3, 2, 0, 0.5, &mut rng).is_err());
        assert!(graph_colouring(10, 3, 0.05, 10, &mut rng).is_err());
    }

    #[test]
    fn test_same_seed_same_problem() {
        let a = unstructured(5, 2, 10, 0.5, &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
        let b = unstructured(5, 2, 10, 0.5, &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
        for x in AgentId::all(5) {
            assert_eq!(a.neighbors(x), b.neighbors(x));
        }
    }
}
