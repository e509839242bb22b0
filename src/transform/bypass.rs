//! Bypass: remove a pass-through node and reconnect its neighbours

use tracing::debug;

use crate::error::{FusionError, FusionResult};
use crate::graph::{InAnchor, NodeId, OutAnchor};

use super::transaction::RewriteTransaction;

/// Rewire the graph around `node` and remove it
///
/// Every producer feeding `node` is linked to every consumer fed by `node`;
/// control predecessors are linked to control successors. A consumer input
/// accepts a single producer, so a node with two or more distinct producers
/// and at least one consumer cannot be bypassed (`EdgeConflict`). Graph
/// outputs cannot be bypassed either.
///
/// Errors leave partial edits in `tx`; the caller rolls back.
pub fn bypass(tx: &mut RewriteTransaction<'_>, node: NodeId) -> FusionResult<()> {
    let graph = tx.graph();
    let target = graph.try_node(node)?;

    if graph.is_graph_output(node) {
        return Err(FusionError::structural(node, "cannot bypass a graph output"));
    }

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

    let mut producers: Vec<OutAnchor> = Vec::new();
    for (src, _) in &incoming {
        if src.node != node && !producers.contains(src) {
            producers.push(*src);
        }
    }
    if producers.len() > 1 && !outgoing.is_empty() {
        return Err(FusionError::EdgeConflict(format!(
            "bypassing {node} would feed {} producers into single-peer inputs",
            producers.len()
        )));
    }

    for (src, dst) in &incoming {
        tx.unlink(*src, *dst)?;
    }
    for (src, dst) in &outgoing {
        tx.unlink(*src, *dst)?;
    }
    for &pred in &preds {
        tx.unlink_control(pred, node)?;
    }
    for &succ in &succs {
        tx.unlink_control(node, succ)?;
    }

    if let Some(&producer) = producers.first() {
        for (_, dst) in &outgoing {
            tx.link(producer, *dst)?;
        }
    }
    for &pred in &preds {
        for &succ in &succs {
            if pred != succ {
                tx.link_control(pred, succ)?;
            }
        }
    }

    tx.remove_node(node)?;
    debug!(node = %node, producers = producers.len(), consumers = outgoing.len(), "bypassed node");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphModel;

    // a -> id -> (b, c)
    fn make_test_graph() -> (GraphModel, [NodeId; 4]) {
        let mut graph = GraphModel::new();
        let a = graph.add_op("a", "Conv", 1, 1);
        let id = graph.add_op("id", "Identity", 1, 1);
        let b = graph.add_op("b", "Relu", 1, 1);
        let c = graph.add_op("c", "Sigmoid", 1, 1);
        graph.connect(a, 0, id, 0).unwrap();
        graph.connect(id, 0, b, 0).unwrap();
        graph.connect(id, 0, c, 0).unwrap();
        (graph, [a, id, b, c])
    }

    #[test]
    fn test_bypass_fan_out() {
        let (mut graph, [a, id, b, c]) = make_test_graph();

        let mut tx = RewriteTransaction::new(&mut graph);
        bypass(&mut tx, id).unwrap();
        tx.commit().unwrap();

        assert!(!graph.contains(id));
        assert!(graph.has_data_edge(a, b));
        assert!(graph.has_data_edge(a, c));
        assert_eq!(graph.data_edge_count(), 2);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_bypass_control_edges() {
        let (mut graph, [a, id, b, _]) = make_test_graph();
        let before = graph.add_op("before", "Assign", 0, 0);
        graph.link_control(before, id).unwrap();
        graph.link_control(id, b).unwrap();

        let mut tx = RewriteTransaction::new(&mut graph);
        bypass(&mut tx, id).unwrap();
        tx.commit().unwrap();

        assert!(graph.has_control_edge(before, b));
        assert!(graph.has_data_edge(a, b));
    }

    #[test]
    fn test_bypass_multiple_producers_conflict() {
        let mut graph = GraphModel::new();
        let x = graph.add_op("x", "Const", 0, 1);
        let y = graph.add_op("y", "Const", 0, 1);
        let add = graph.add_op("add", "Add", 2, 1);
        let out = graph.add_op("out", "Relu", 1, 1);
        graph.connect(x, 0, add, 0).unwrap();
        graph.connect(y, 0, add, 1).unwrap();
        graph.connect(add, 0, out, 0).unwrap();
        let before = graph.clone();

        let mut tx = RewriteTransaction::new(&mut graph);
        let err = bypass(&mut tx, add).unwrap_err();
        assert!(matches!(err, FusionError::EdgeConflict(_)));
        tx.rollback();

        assert_eq!(graph, before);
    }

    #[test]
    fn test_bypass_graph_output_rejected() {
        let (mut graph, [_, id, _, _]) = make_test_graph();
        graph.mark_graph_output(id).unwrap();

        let mut tx = RewriteTransaction::new(&mut graph);
        let err = bypass(&mut tx, id).unwrap_err();
        assert!(matches!(err, FusionError::StructuralInvariant { .. }));
    }

    #[test]
    fn test_bypass_self_loop() {
        let mut graph = GraphModel::new();
        let a = graph.add_op("a", "Conv", 0, 1);
        let looped = graph.add_op("looped", "Identity", 2, 1);
        let b = graph.add_op("b", "Relu", 1, 1);
        graph.connect(a, 0, looped, 0).unwrap();
        graph.connect(looped, 0, looped, 1).unwrap();
        graph.connect(looped, 0, b, 0).unwrap();

        let mut tx = RewriteTransaction::new(&mut graph);
        bypass(&mut tx, looped).unwrap();
        tx.commit().unwrap();

        assert!(!graph.contains(looped));
        assert!(graph.has_data_edge(a, b));
        assert_eq!(graph.data_edge_count(), 1);
        assert!(graph.validate().is_ok());
    }

    #[test]
    fn test_bypass_sink_node() {
        let mut graph = GraphModel::new();
        let a = graph.add_op("a", "Conv", 1, 1);
        let sink = graph.add_op("sink", "Identity", 1, 1);
        graph.connect(a, 0, sink, 0).unwrap();

        let mut tx = RewriteTransaction::new(&mut graph);
        bypass(&mut tx, sink).unwrap();
        tx.commit().unwrap();

        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node(a).unwrap().consumer_count(), 0);
    }
}
