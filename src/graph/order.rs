//! Pass dependency analysis and ordering.

use std::collections::VecDeque;

/// Writer→reader (and writer→writer) dependency edges between passes,
/// indexed by insertion order.
pub(crate) struct DependencyGraph {
    pass_count: usize,
    adjacency: Vec<Vec<usize>>,
    in_degrees: Vec<usize>,
}

impl DependencyGraph {
    pub fn new(pass_count: usize) -> Self {
        Self {
            pass_count,
            adjacency: vec![Vec::new(); pass_count],
            in_degrees: vec![0; pass_count],
        }
    }

    /// `before` must execute before `after`. Duplicate edges are ignored.
    pub fn add_edge(&mut self, before: usize, after: usize) {
        if before == after {
            return;
        }
        if !self.adjacency[before].contains(&after) {
            self.adjacency[before].push(after);
            self.in_degrees[after] += 1;
        }
    }

    /// Kahn's algorithm seeded in insertion order, so independent passes
    /// keep a deterministic relative order.
    ///
    /// Returns the execution order, or the indices of passes stuck in a
    /// cycle.
    pub fn topological_sort(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut in_degrees = self.in_degrees.clone();
        let mut queue = VecDeque::new();
        let mut order = Vec::with_capacity(self.pass_count);

        for index in 0..self.pass_count {
            if in_degrees[index] == 0 {
                queue.push_back(index);
            }
        }

        while let Some(index) = queue.pop_front() {
            order.push(index);
            for &next in &self.adjacency[index] {
                in_degrees[next] -= 1;
                if in_degrees[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() != self.pass_count {
            let cyclic = (0..self.pass_count)
                .filter(|&index| in_degrees[index] > 0)
                .collect();
            Err(cyclic)
        } else {
            Ok(order)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_precedes_reader() {
        let mut graph = DependencyGraph::new(2);
        graph.add_edge(0, 1);
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1]);
    }

    #[test]
    fn chain_keeps_order() {
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(1, 2);
        graph.add_edge(0, 1);
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn independent_passes_stay_in_insertion_order() {
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(0, 2);
        graph.add_edge(1, 2);
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn duplicate_edges_do_not_inflate_in_degree() {
        let mut graph = DependencyGraph::new(2);
        graph.add_edge(0, 1);
        graph.add_edge(0, 1);
        assert_eq!(graph.topological_sort().unwrap(), vec![0, 1]);
    }

    #[test]
    fn cycle_is_reported() {
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(0, 1);
        graph.add_edge(1, 2);
        graph.add_edge(2, 1);
        let cyclic = graph.topological_sort().unwrap_err();
        assert_eq!(cyclic, vec![1, 2]);
    }

    #[test]
    fn self_edge_is_ignored() {
        let mut graph = DependencyGraph::new(1);
        graph.add_edge(0, 0);
        assert_eq!(graph.topological_sort().unwrap(), vec![0]);
    }
}
