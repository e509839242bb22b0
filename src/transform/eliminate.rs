//! Node elimination transformations
//!
//! Removal of nodes whose results nobody needs.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::error::FusionResult;
use crate::graph::{InAnchor, NodeId, OutAnchor};
use crate::pattern::{reachable_nodes, Direction};

use super::transaction::RewriteTransaction;

/// Unlink every data and control edge of `node`, then remove it
///
/// Unlike [`bypass`](super::bypass::bypass) nothing is reconnected.
pub fn detach_and_remove(tx: &mut RewriteTransaction<'_>, node: NodeId) -> FusionResult<()> {
    let target = tx.graph().try_node(node)?;

    let incoming: Vec<(OutAnchor, InAnchor)> = target
        .inputs()
        .iter()
        .enumerate()
        .filter_map(|(i, a)| a.peer().map(|src| (src, InAnchor::new(node, i))))
        .collect();
    let outgoing: Vec<(OutAnchor, InAnchor)> = target
        .outputs()
        .iter()
        .enumerate()
        .flat_map(|(i, a)| a.peers().iter().map(move |dst| (OutAnchor::new(node, i), *dst)))
        // Self-loops are already listed as incoming
        .filter(|(_, dst)| dst.node != node)
        .collect();
    let preds = target.control_in().to_vec();
    let succs = target.control_out().to_vec();

    for (src, dst) in incoming.into_iter().chain(outgoing) {
        tx.unlink(src, dst)?;
    }
    for pred in preds {
        tx.unlink_control(pred, node)?;
    }
    for succ in succs {
        tx.unlink_control(node, succ)?;
    }
    tx.remove_node(node)
}

/// Remove every node from which no graph output is reachable
///
/// Reachability follows data and control edges. A graph without marked
/// outputs is left untouched, since every node would count as dead.
/// Returns the removed nodes in iteration order.
pub fn eliminate_dead_nodes(tx: &mut RewriteTransaction<'_>) -> FusionResult<Vec<NodeId>> {
    let graph = tx.graph();
    let outputs: Vec<NodeId> = graph.graph_outputs().collect();
    if outputs.is_empty() {
        return Ok(Vec::new());
    }

    let live: FxHashSet<NodeId> = reachable_nodes(graph, outputs, Direction::Backward);
    let dead: Vec<NodeId> = graph
        .node_ids()
        .into_iter()
        .filter(|id| !live.contains(id))
        .collect();

    for &id in &dead {
        detach_and_remove(tx, id)?;
    }

    if !dead.is_empty() {
        debug!(count = dead.len(), "eliminated dead nodes");
    }
    Ok(dead)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphModel;

    // x -> conv -> out, x -> unused -> unused_tail
    fn make_test_graph() -> (GraphModel, [NodeId; 5]) {
        let mut graph = GraphModel::new();
        let x = graph.add_op("x", "Input", 0, 1);
        let conv = graph.add_op("conv", "Conv", 1, 1);
        let out = graph.add_op("out", "Relu", 1, 1);
        let unused = graph.add_op("unused", "Sigmoid", 1, 1);
        let tail = graph.add_op("unused_tail", "Tanh", 1, 1);
        graph.connect(x, 0, conv, 0).unwrap();
        graph.connect(conv, 0, out, 0).unwrap();
        graph.connect(x, 0, unused, 0).unwrap();
        graph.connect(unused, 0, tail, 0).unwrap();
        graph.mark_graph_output(out).unwrap();
        (graph, [x, conv, out, unused, tail])
    }

    #[test]
    fn test_eliminate_dead_nodes() {
        let (mut graph, [x, conv, out, unused, tail]) = make_test_graph();

        let mut tx = RewriteTransaction::new(&mut graph);
        let removed = eliminate_dead_nodes(&mut tx).unwrap();
        tx.commit().unwrap();

        assert_eq!(removed, vec![unused, tail]);
        assert_eq!(graph.node_ids(), vec![x, conv, out]);
        assert_eq!(graph.node(x).unwrap().consumer_count(), 1);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_control_dependency_keeps_node_alive() {
        let (mut graph, [_, _, out, unused, tail]) = make_test_graph();
        graph.link_control(tail, out).unwrap();

        let mut tx = RewriteTransaction::new(&mut graph);
        let removed = eliminate_dead_nodes(&mut tx).unwrap();
        tx.commit().unwrap();

        assert!(removed.is_empty());
        assert!(graph.contains(unused));
    }

    #[test]
    fn test_no_outputs_is_noop() {
        let mut graph = GraphModel::new();
        graph.add_op("a", "Relu", 0, 1);

        let mut tx = RewriteTransaction::new(&mut graph);
        assert!(eliminate_dead_nodes(&mut tx).unwrap().is_empty());
        assert!(tx.is_unchanged());
    }

    #[test]
    fn test_dead_self_loop_removed() {
        let (mut graph, [x, conv, out, unused, tail]) = make_test_graph();
        let looped = graph.add_op("looped", "Add", 2, 1);
        graph.connect(x, 0, looped, 0).unwrap();
        graph.connect(looped, 0, looped, 1).unwrap();

        let mut tx = RewriteTransaction::new(&mut graph);
        let removed = eliminate_dead_nodes(&mut tx).unwrap();
        tx.commit().unwrap();

        assert_eq!(removed, vec![unused, tail, looped]);
        assert_eq!(graph.node_ids(), vec![x, conv, out]);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_detach_and_remove() {
        let (mut graph, [x, conv, out, _, _]) = make_test_graph();

        let mut tx = RewriteTransaction::new(&mut graph);
        detach_and_remove(&mut tx, conv).unwrap();
        tx.commit().unwrap();

        assert!(!graph.contains(conv));
        assert!(!graph.node(out).unwrap().inputs()[0].is_connected());
        assert_eq!(graph.node(x).unwrap().consumer_count(), 1);
    }
}
