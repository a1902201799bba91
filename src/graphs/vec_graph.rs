/*
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use crate::traits::SchedulerGraph;

/// A mutable directed graph based on vectors of edge identifiers.
///
/// Edges are numbered consecutively in insertion order; for each vertex the
/// graph keeps the list of identifiers of its incoming and outgoing edges,
/// so both directions can be accessed in constant time. Parallel edges and
/// loops are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VecGraph {
    /// For each edge, its source vertex.
    sources: Vec<usize>,
    /// For each edge, its target vertex.
    targets: Vec<usize>,
    /// For each vertex, the identifiers of its incoming edges.
    in_edges: Vec<Vec<usize>>,
    /// For each vertex, the identifiers of its outgoing edges.
    out_edges: Vec<Vec<usize>>,
}

impl VecGraph {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new graph with `n` vertices and no edges.
    pub fn empty(n: usize) -> Self {
        Self {
            sources: vec![],
            targets: vec![],
            in_edges: Vec::from_iter((0..n).map(|_| Vec::new())),
            out_edges: Vec::from_iter((0..n).map(|_| Vec::new())),
        }
    }

    /// Adds an isolated vertex to the graph and returns true if it is new.
    ///
    /// All vertices up to the given one are added, too.
    pub fn add_node(&mut self, node: usize) -> bool {
        let len = self.in_edges.len();
        self.in_edges.extend((len..=node).map(|_| Vec::new()));
        self.out_edges.extend((len..=node).map(|_| Vec::new()));
        len <= node
    }

    /// Adds an edge from `u` to `v` and returns its identifier.
    ///
    /// # Panics
    ///
    /// This method will panic if one of the given vertices is greater than
    /// or equal to the number of vertices in the graph.
    pub fn add_arc(&mut self, u: usize, v: usize) -> usize {
        let max = u.max(v);
        if max >= self.in_edges.len() {
            panic!(
                "Vertex {} does not exist (the graph has {} vertices)",
                max,
                self.in_edges.len(),
            );
        }
        let edge = self.sources.len();
        self.sources.push(u);
        self.targets.push(v);
        self.out_edges[u].push(edge);
        self.in_edges[v].push(edge);
        edge
    }

    /// Creates a new graph from an iterator of arcs, adding vertices as
    /// needed.
    pub fn from_arcs(arcs: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut g = Self::new();
        for (u, v) in arcs {
            g.add_node(u);
            g.add_node(v);
            g.add_arc(u, v);
        }
        g
    }
}

impl SchedulerGraph for VecGraph {
    #[inline(always)]
    fn num_vertices(&self) -> usize {
        self.in_edges.len()
    }

    #[inline(always)]
    fn num_edges(&self) -> usize {
        self.sources.len()
    }

    #[inline(always)]
    fn in_edge_ids(&self, vertex: usize) -> &[usize] {
        &self.in_edges[vertex]
    }

    #[inline(always)]
    fn out_edge_ids(&self, vertex: usize) -> &[usize] {
        &self.out_edges[vertex]
    }

    #[inline(always)]
    fn source(&self, edge: usize) -> usize {
        self.sources[edge]
    }

    #[inline(always)]
    fn target(&self, edge: usize) -> usize {
        self.targets[edge]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty() {
        let g = VecGraph::empty(3);
        assert_eq!(g.num_vertices(), 3);
        assert_eq!(g.num_edges(), 0);
        assert!(g.in_edge_ids(2).is_empty());
        assert!(g.out_edge_ids(2).is_empty());
    }

    #[test]
    fn test_add_arc() {
        let mut g = VecGraph::empty(3);
        let e0 = g.add_arc(0, 1);
        let e1 = g.add_arc(1, 2);
        let e2 = g.add_arc(0, 2);
        assert_eq!((e0, e1, e2), (0, 1, 2));
        assert_eq!(g.num_edges(), 3);
        assert_eq!(g.out_edge_ids(0), &[0, 2]);
        assert_eq!(g.in_edge_ids(2), &[1, 2]);
        assert_eq!(g.source(1), 1);
        assert_eq!(g.target(1), 2);
    }

    #[test]
    fn test_add_node() {
        let mut g = VecGraph::new();
        assert!(g.add_node(2));
        assert_eq!(g.num_vertices(), 3);
        assert!(!g.add_node(1));
        assert_eq!(g.num_vertices(), 3);
    }

    #[test]
    fn test_loops_and_parallel_arcs() {
        let g = VecGraph::from_arcs([(0, 0), (0, 1), (0, 1)]);
        assert_eq!(g.num_edges(), 3);
        assert_eq!(g.in_edge_ids(0), &[0]);
        assert_eq!(g.out_edge_ids(0), &[0, 1, 2]);
        assert_eq!(g.in_edge_ids(1), &[1, 2]);
    }

    #[test]
    #[should_panic(expected = "does not exist")]
    fn test_add_arc_out_of_range() {
        let mut g = VecGraph::empty(2);
        g.add_arc(0, 2);
    }
}
