//! Undirected constraint graphs for the problem generators.

use crate::error::SimError;
use rand::Rng;
use std::collections::{BTreeSet, VecDeque};

/// Simple undirected graph over vertices `0..n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    adjacency: Vec<BTreeSet<usize>>,
}

impl Graph {
    /// Creates `n` isolated vertices.
    pub fn new(n: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); n],
        }
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Adds the edge `a - b`. Returns false if it already existed.
    pub fn add_edge(&mut self, a: usize, b: usize) -> bool {
        if a == b || self.has_edge(a, b) {
            return false;
        }
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
        true
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.adjacency[a].contains(&b)
    }

    /// Neighbors of `v`, ascending.
    pub fn neighbors(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[v].iter().copied()
    }

    pub fn degree(&self, v: usize) -> usize {
        self.adjacency[v].len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|a| a.len()).sum::<usize>() / 2
    }

    /// Every edge once, as `(low, high)`.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(a, adj)| adj.range(a + 1..).map(move |b| (a, *b)))
            .collect()
    }

    /// Vertices reachable from `root`, as a membership mask.
    pub fn reachable_from(&self, root: usize) -> Vec<bool> {
        let mut seen = vec![false; self.vertex_count()];
        let mut queue = VecDeque::from([root]);
        seen[root] = true;
        while let Some(v) = queue.pop_front() {
            for u in self.neighbors(v) {
                if !seen[u] {
                    seen[u] = true;
                    queue.push_back(u);
                }
            }
        }
        seen
    }

    /// Returns true if every vertex is reachable from vertex 0.
    pub fn is_connected(&self) -> bool {
        self.vertex_count() == 0 || self.reachable_from(0).into_iter().all(|s| s)
    }

    // ========================================================================
    // GENERATORS
    // ========================================================================

    /// Random connected graph with exactly `floor(p1 * n(n-1)/2)` edges.
    ///
    /// Grows a connected set from a random vertex: every new edge starts
    /// inside the set and reaches an unvisited vertex while any remain, so the
    /// first `n - 1` edges form a spanning tree.
    ///
    /// # Returns
    /// * `Err(SimError::Generator)` - `p1` outside `[0, 1]` or too few
    ///   edges to connect `n` vertices
    pub fn random_connected<R: Rng + ?Sized>(n: usize, p1: f64, rng: &mut R) -> Result<Self, SimError> {
        if !(0.0..=1.0).contains(&p1) {
            return Err(SimError::Generator(format!("edge probability {p1} outside [0, 1]")));
        }
        let mut graph = Graph::new(n);
        if n == 0 {
            return Ok(graph);
        }

        let mut remaining = (p1 * (n * (n - 1)) as f64 / 2.0) as usize;
        if remaining < n - 1 {
            return Err(SimError::Generator(format!(
                "{remaining} edges cannot connect {n} vertices"
            )));
        }

        let first = rng.gen_range(0..n);
        let mut connected = vec![first];
        let mut unvisited: Vec<usize> = (0..n).filter(|v| *v != first).collect();

        while remaining > 0 {
            let v1 = connected[rng.gen_range(0..connected.len())];
            let pool: Vec<usize> = if unvisited.is_empty() {
                connected.iter().copied().filter(|v| *v != v1).collect()
            } else {
                unvisited.clone()
            };
            let v2 = pool[rng.gen_range(0..pool.len())];

            if let Some(pos) = unvisited.iter().position(|v| *v == v2) {
                unvisited.swap_remove(pos);
                connected.push(v2);
            }
            if graph.add_edge(v1, v2) {
                remaining -= 1;
            }
        }

        Ok(graph)
    }

    /// Scale-free graph by preferential attachment.
    ///
    /// The first `m0` vertices form a seed graph where each pair is linked
    /// with probability `ep` (then patched to be connected). Each later vertex
    /// links to `m` distinct earlier vertices, chosen with probability
    /// proportional to `degree + 1`.
    pub fn scale_free<R: Rng + ?Sized>(
        n: usize,
        m0: usize,
        ep: f64,
        m: usize,
        rng: &mut R,
    ) -> Result<Self, SimError> {
        if m0 == 0 || m0 > n {
            return Err(SimError::Generator(format!("seed size {m0} must be in 1..={n}")));
        }
        if m == 0 || m > m0 {
            return Err(SimError::Generator(format!("links per vertex {m} must be in 1..={m0}")));
        }
        if !(0.0..=1.0).contains(&ep) {
            return Err(SimError::Generator(format!("edge probability {ep} outside [0, 1]")));
        }

        let mut graph = Graph::new(n);
        for a in 0..m0 {
            for b in a + 1..m0 {
                if rng.gen_bool(ep) {
                    graph.add_edge(a, b);
                }
            }
        }
        // Seed vertices not reached from 0 get tied to a random reached one
        for v in 1..m0 {
            let reached = graph.reachable_from(0);
            if !reached[v] {
                let anchors: Vec<usize> = (0..m0).filter(|u| reached[*u]).collect();
                let anchor = anchors[rng.gen_range(0..anchors.len())];
                graph.add_edge(anchor, v);
            }
        }

        for v in m0..n {
            let mut targets = BTreeSet::new();
            while targets.len() < m {
                let candidates: Vec<usize> = (0..v).filter(|u| !targets.contains(u)).collect();
                let total: usize = candidates.iter().map(|u| graph.degree(*u) + 1).sum();
                let mut pick = rng.gen_range(0..total);
                for u in candidates {
                    let weight = graph.degree(u) + 1;
                    if pick < weight {
                        targets.insert(u);
                        break;
                    }
                    pick -= weight;
                }
            }
            for u in targets {
                graph.add_edge(u, v);
            }
        }

        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_edges_are_listed_once() {
        let mut g = Graph::new(4);
        assert!(g.add_edge(0, 1));
        assert!(!g.add_edge(1, 0));
        assert!(!g.add_edge(2, 2));
        g.add_edge(3, 1);
        assert_eq!(g.edges(), vec![(0, 1), (1, 3)]);
        assert_eq!(g.edge_count(), 2);
        assert!(!g.is_connected());
        g.add_edge(2, 0);
        assert!(g.is_connected());
    }

    #[test]
    fn test_too_sparse_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            Graph::random_connected(10, 0.1, &mut rng),
            Err(SimError::Generator(_))
        ));
        assert!(Graph::random_connected(10, 1.5, &mut rng).is_err());
    }

    #[test]
    fn test_complete_graph() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let g = Graph::random_connected(6, 1.0, &mut rng).unwrap();
        assert_eq!(g.edge_count(), 15);
    }

    #[test]
    fn test_scale_free_parameters() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(Graph::scale_free(5, 6, 0.5, 1, &mut rng).is_err());
        assert!(Graph::scale_free(5, 3, 0.5, 4, &mut rng).is_err());
        assert!(Graph::scale_free(5, 3, 0.5, 0, &mut rng).is_err());
    }

    proptest! {
        #[test]
        fn prop_random_graph_is_connected_with_exact_edges(
            n in 2usize..12,
            p1 in 0.3f64..=1.0,
            seed in any::<u64>(),
        ) {
            let edges = (p1 * (n * (n - 1)) as f64 / 2.0) as usize;
            prop_assume!(edges >= n - 1);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let g = Graph::random_connected(n, p1, &mut rng).unwrap();
            prop_assert!(g.is_connected());
            prop_assert_eq!(g.edge_count(), edges);
        }

        #[test]
        fn prop_scale_free_is_connected(
            n in 4usize..20,
            m in 1usize..3,
            ep in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let g = Graph::scale_free(n, 3, ep, m, &mut rng).unwrap();
            prop_assert!(g.is_connected());
            for v in 3..n {
                prop_assert!(g.degree(v) >= m);
            }
        }
    }
}
