/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::graphs::VecGraph;

/// Erdös-Rényi random graphs.
///
/// The Erdös-Rényi random graph model is a simple model for generating
/// random graphs. It is parameterized by the number of vertices `n` and the
/// probability `p` of an arc between any two vertices. In this
/// implementation, loops are never included.
///
/// The same seed always generates the same graph, which makes the model
/// convenient for reproducible stress tests.
#[derive(Debug, Clone)]
pub struct ErdosRenyi {
    n: usize,
    p: f64,
    seed: u64,
}

impl ErdosRenyi {
    /// Creates a new Erdös-Rényi random graph, given the number of vertices,
    /// the probability of an arc between any two vertices, and a seed for
    /// the [pseudorandom number generator](SmallRng).
    pub fn new(n: usize, p: f64, seed: u64) -> Self {
        assert!((0.0..=1.0).contains(&p), "p must be in [0..1]");
        Self { n, p, seed }
    }

    /// Materializes the graph into a [`VecGraph`].
    pub fn build(&self) -> VecGraph {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut graph = VecGraph::empty(self.n);
        for x in 0..self.n {
            for y in 0..self.n {
                if y != x && rng.random_bool(self.p) {
                    graph.add_arc(x, y);
                }
            }
        }
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::SchedulerGraph;

    #[test]
    fn test_deterministic() {
        let a = ErdosRenyi::new(50, 0.1, 0).build();
        let b = ErdosRenyi::new(50, 0.1, 0).build();
        assert_eq!(a, b);
        let c = ErdosRenyi::new(50, 0.1, 1).build();
        assert_ne!(a, c);
    }

    #[test]
    fn test_degenerate_probabilities() {
        let empty = ErdosRenyi::new(10, 0.0, 0).build();
        assert_eq!(empty.num_edges(), 0);
        let full = ErdosRenyi::new(10, 1.0, 0).build();
        assert_eq!(full.num_edges(), 10 * 9);
        for v in 0..10 {
            assert_eq!(full.in_edge_ids(v).len(), 9);
            assert_eq!(full.out_edge_ids(v).len(), 9);
        }
    }
}
