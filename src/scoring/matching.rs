//! Maximum-cardinality bipartite matching (Hopcroft–Karp)
//!
//! Reference notes form the left side, estimate notes the right side. The
//! graph is a plain adjacency list over indices and is rebuilt for every
//! evaluation.

use std::collections::VecDeque;

const INF: usize = usize::MAX;

/// Compatibility edges from each reference note to estimate notes
#[derive(Debug, Clone, Default)]
pub struct CompatibilityGraph {
    adjacency: Vec<Vec<usize>>,
    n_estimates: usize,
}

impl CompatibilityGraph {
    /// Build the graph by testing every (reference, estimate) pair.
    ///
    /// Edges are stored in ascending estimate order, which fixes the
    /// search order and therefore which maximum matching is returned.
    pub fn build<F>(n_references: usize, n_estimates: usize, mut compatible: F) -> Self
    where
        F: FnMut(usize, usize) -> bool,
    {
        let adjacency = (0..n_references)
            .map(|r| (0..n_estimates).filter(|&e| compatible(r, e)).collect())
            .collect();
        Self::from_adjacency(adjacency, n_estimates)
    }

    /// Build the graph from explicit neighbor lists.
    ///
    /// Lists are sorted and deduplicated; estimates `>= n_estimates` are dropped.
    pub fn from_adjacency(mut adjacency: Vec<Vec<usize>>, n_estimates: usize) -> Self {
        for neighbors in &mut adjacency {
            neighbors.retain(|&e| e < n_estimates);
            neighbors.sort_unstable();
            neighbors.dedup();
        }
        Self {
            adjacency,
            n_estimates,
        }
    }

    pub fn n_references(&self) -> usize {
        self.adjacency.len()
    }

    pub fn n_estimates(&self) -> usize {
        self.n_estimates
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    pub fn neighbors(&self, reference: usize) -> &[usize] {
        &self.adjacency[reference]
    }

    /// Largest set of disjoint (reference, estimate) edges, sorted by reference
    pub fn maximum_matching(&self) -> Vec<(usize, usize)> {
        let mut search = Search::new(self);
        search.run();
        search
            .match_of_reference
            .iter()
            .enumerate()
            .filter_map(|(r, e)| e.map(|e| (r, e)))
            .collect()
    }
}

struct Search<'g> {
    graph: &'g CompatibilityGraph,
    match_of_reference: Vec<Option<usize>>,
    match_of_estimate: Vec<Option<usize>>,
    dist: Vec<usize>,
    /// Layer at which the shortest augmenting paths end
    free_layer: usize,
    /// Next adjacency position to try per reference in the current phase
    cursor: Vec<usize>,
}

impl<'g> Search<'g> {
    fn new(graph: &'g CompatibilityGraph) -> Self {
        let n_ref = graph.n_references();
        Self {
            graph,
            match_of_reference: vec![None; n_ref],
            match_of_estimate: vec![None; graph.n_estimates],
            dist: vec![INF; n_ref],
            free_layer: INF,
            cursor: vec![0; n_ref],
        }
    }

    fn run(&mut self) {
        let mut phases = 0usize;
        while self.layer() {
            self.cursor.iter_mut().for_each(|c| *c = 0);
            for r in 0..self.graph.n_references() {
                if self.match_of_reference[r].is_none() {
                    self.augment(r);
                }
            }
            phases += 1;
        }
        log::trace!(
            "Hopcroft-Karp finished after {} phases over {} edges",
            phases,
            self.graph.edge_count()
        );
    }

    /// Breadth-first layering from free references; true if any free
    /// estimate is reachable
    fn layer(&mut self) -> bool {
        let mut queue = VecDeque::new();
        for r in 0..self.graph.n_references() {
            if self.match_of_reference[r].is_none() {
                self.dist[r] = 0;
                queue.push_back(r);
            } else {
                self.dist[r] = INF;
            }
        }
        self.free_layer = INF;

        while let Some(r) = queue.pop_front() {
            if self.dist[r] >= self.free_layer {
                continue;
            }
            for &e in self.graph.neighbors(r) {
                match self.match_of_estimate[e] {
                    None => {
                        if self.free_layer == INF {
                            self.free_layer = self.dist[r] + 1;
                        }
                    }
                    Some(partner) if self.dist[partner] == INF => {
                        self.dist[partner] = self.dist[r] + 1;
                        queue.push_back(partner);
                    }
                    Some(_) => {}
                }
            }
        }
        self.free_layer != INF
    }

    /// Depth-first search for a shortest augmenting path starting at `root`.
    ///
    /// The path is kept on an explicit stack of (reference, estimate) steps
    /// so chains of any length stay off the call stack.
    fn augment(&mut self, root: usize) -> bool {
        let graph = self.graph;
        let mut path: Vec<(usize, usize)> = Vec::new();
        let mut r = root;

        loop {
            let mut step = None;
            while self.cursor[r] < graph.neighbors(r).len() {
                let e = graph.neighbors(r)[self.cursor[r]];
                self.cursor[r] += 1;
                match self.match_of_estimate[e] {
                    None if self.dist[r] + 1 == self.free_layer => {
                        step = Some((e, None));
                        break;
                    }
                    Some(partner) if self.dist[partner] == self.dist[r] + 1 => {
                        step = Some((e, Some(partner)));
                        break;
                    }
                    _ => {}
                }
            }

            match step {
                Some((e, None)) => {
                    path.push((r, e));
                    for &(r, e) in &path {
                        self.match_of_reference[r] = Some(e);
                        self.match_of_estimate[e] = Some(r);
                    }
                    return true;
                }
                Some((e, Some(partner))) => {
                    path.push((r, e));
                    r = partner;
                }
                None => {
                    // Dead end: retire `r` for this phase and resume its parent
                    self.dist[r] = INF;
                    match path.pop() {
                        Some((parent, _)) => r = parent,
                        None => return false,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[&[usize]], n_estimates: usize) -> CompatibilityGraph {
        CompatibilityGraph::build(edges.len(), n_estimates, |r, e| edges[r].contains(&e))
    }

    fn assert_valid(graph: &CompatibilityGraph, matching: &[(usize, usize)]) {
        let mut seen_est = vec![false; graph.n_estimates()];
        let mut seen_ref = vec![false; graph.n_references()];
        for &(r, e) in matching {
            assert!(graph.neighbors(r).contains(&e), "({}, {}) is not an edge", r, e);
            assert!(!seen_ref[r] && !seen_est[e], "vertex used twice");
            seen_ref[r] = true;
            seen_est[e] = true;
        }
    }

    #[test]
    fn test_empty_graphs() {
        assert!(graph(&[], 0).maximum_matching().is_empty());
        assert!(graph(&[&[], &[]], 3).maximum_matching().is_empty());
    }

    #[test]
    fn test_greedy_trap_is_avoided() {
        // Greedy would give reference 0 its first choice (estimate 0) and
        // strand reference 1, whose only option is also estimate 0.
        let g = graph(&[&[0, 1], &[0]], 2);
        let matching = g.maximum_matching();
        assert_valid(&g, &matching);
        assert_eq!(matching, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn test_competing_references_single_estimate() {
        let g = graph(&[&[0], &[0]], 1);
        let matching = g.maximum_matching();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching, vec![(0, 0)]);
    }

    #[test]
    fn test_long_augmenting_chain() {
        // Chain r_i -> {e_i, e_{i+1}} with r_last -> {e_0}: perfect matching exists
        let n = 6;
        let edges: Vec<Vec<usize>> = (0..n)
            .map(|i| if i + 1 < n { vec![i, i + 1] } else { vec![0] })
            .collect();
        let g = CompatibilityGraph::build(n, n, |r, e| edges[r].contains(&e));
        let matching = g.maximum_matching();
        assert_valid(&g, &matching);
        assert_eq!(matching.len(), n);
    }

    #[test]
    fn test_complete_bipartite_is_deterministic() {
        let g = CompatibilityGraph::build(3, 4, |_, _| true);
        let first = g.maximum_matching();
        assert_eq!(first.len(), 3);
        assert_eq!(first, g.maximum_matching());
        assert_eq!(first, vec![(0, 0), (1, 1), (2, 2)]);
    }

    #[test]
    fn test_very_long_augmenting_chain() {
        // Same shape as above, long enough that each phase walks a 20k step path
        let n = 20_000;
        let adjacency: Vec<Vec<usize>> = (0..n)
            .map(|i| if i + 1 < n { vec![i, i + 1] } else { vec![0] })
            .collect();
        let g = CompatibilityGraph::from_adjacency(adjacency, n);
        assert_eq!(g.edge_count(), 2 * n - 1);
        let matching = g.maximum_matching();
        assert_eq!(matching.len(), n);
        assert_valid(&g, &matching);
        assert_eq!(matching[n - 1], (n - 1, 0));
    }

    #[test]
    fn test_from_adjacency_sorts_and_drops_bad_edges() {
        let g = CompatibilityGraph::from_adjacency(vec![vec![2, 0, 2, 9], vec![]], 3);
        assert_eq!(g.neighbors(0), &[0, 2]);
        assert_eq!(g.edge_count(), 2);
    }
}
