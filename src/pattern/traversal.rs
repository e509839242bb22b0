//! Graph traversal utilities
//!
//! BFS over data and control edges of a [`GraphModel`].

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::graph::{GraphModel, Node, NodeId};

/// Direction of traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Forward: follow consumers and control successors
    Forward,
    /// Backward: follow producers and control predecessors
    Backward,
}

/// BFS traversal iterator
pub struct BfsIterator<'a> {
    graph: &'a GraphModel,
    queue: VecDeque<NodeId>,
    visited: FxHashSet<NodeId>,
    direction: Direction,
}

impl<'a> BfsIterator<'a> {
    /// Create a new BFS iterator starting from the given nodes
    pub fn new(
        graph: &'a GraphModel,
        starts: impl IntoIterator<Item = NodeId>,
        direction: Direction,
    ) -> Self {
        let mut queue = VecDeque::new();
        let mut visited = FxHashSet::default();

        for start in starts {
            if graph.contains(start) && visited.insert(start) {
                queue.push_back(start);
            }
        }

        Self {
            graph,
            queue,
            visited,
            direction,
        }
    }

    /// Create forward BFS
    pub fn forward(graph: &'a GraphModel, start: NodeId) -> Self {
        Self::new(graph, [start], Direction::Forward)
    }

    /// Create backward BFS
    pub fn backward(graph: &'a GraphModel, start: NodeId) -> Self {
        Self::new(graph, [start], Direction::Backward)
    }

    fn enqueue(&mut self, id: NodeId) {
        if self.visited.insert(id) {
            self.queue.push_back(id);
        }
    }
}

impl<'a> Iterator for BfsIterator<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.queue.pop_front()?;
        let node = self.graph.node(id)?;

        match self.direction {
            Direction::Forward => {
                for dst in node.outputs().iter().flat_map(|a| a.peers()) {
                    self.enqueue(dst.node);
                }
                for &succ in node.control_out() {
                    self.enqueue(succ);
                }
            }
            Direction::Backward => {
                for src in node.inputs().iter().filter_map(|a| a.peer()) {
                    self.enqueue(src.node);
                }
                for &pred in node.control_in() {
                    self.enqueue(pred);
                }
            }
        }

        Some(node)
    }
}

/// Ids of all nodes reachable from `starts` (inclusive)
pub fn reachable_nodes(
    graph: &GraphModel,
    starts: impl IntoIterator<Item = NodeId>,
    direction: Direction,
) -> FxHashSet<NodeId> {
    BfsIterator::new(graph, starts, direction)
        .map(|n| n.id())
        .collect()
}

/// Check if there is a forward path from any of `from` to any of `to`
///
/// Nodes in `from` that are also in `to` count as a path of length zero.
pub fn has_path(graph: &GraphModel, from: &[NodeId], to: &FxHashSet<NodeId>) -> bool {
    BfsIterator::new(graph, from.iter().copied(), Direction::Forward).any(|n| to.contains(&n.id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_chain_graph() -> (GraphModel, Vec<NodeId>) {
        let mut graph = GraphModel::new();
        let ids: Vec<_> = ["Conv", "Relu", "Conv", "Relu"]
            .iter()
            .enumerate()
            .map(|(i, op)| graph.add_op(&format!("node_{i}"), op, 1, 1))
            .collect();
        for pair in ids.windows(2) {
            graph.connect(pair[0], 0, pair[1], 0).unwrap();
        }
        (graph, ids)
    }

    #[test]
    fn test_bfs_forward() {
        let (graph, ids) = make_chain_graph();

        let visited: Vec<_> = BfsIterator::forward(&graph, ids[0]).map(|n| n.id()).collect();
        assert_eq!(visited, ids);
    }

    #[test]
    fn test_bfs_backward() {
        let (graph, ids) = make_chain_graph();

        let visited: Vec<_> = BfsIterator::backward(&graph, ids[3]).map(|n| n.id()).collect();
        let expected: Vec<_> = ids.iter().rev().copied().collect();
        assert_eq!(visited, expected);
    }

    #[test]
    fn test_control_edges_followed() {
        let (mut graph, ids) = make_chain_graph();
        let side = graph.add_op("side", "Assign", 0, 0);
        graph.link_control(ids[3], side).unwrap();

        let reach = reachable_nodes(&graph, [ids[0]], Direction::Forward);
        assert!(reach.contains(&side));
        assert_eq!(reach.len(), 5);
    }

    #[test]
    fn test_has_path() {
        let (graph, ids) = make_chain_graph();
        let target: FxHashSet<NodeId> = [ids[3]].into_iter().collect();
        let source: FxHashSet<NodeId> = [ids[0]].into_iter().collect();

        assert!(has_path(&graph, &[ids[0]], &target));
        assert!(has_path(&graph, &[ids[3]], &target)); // same node
        assert!(!has_path(&graph, &[ids[3]], &source)); // backward
    }
}
