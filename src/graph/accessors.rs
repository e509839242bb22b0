//! Graph query helpers
//!
//! Peer lookups over anchors: producers, consumers, and data edges.

use crate::error::{FusionError, FusionResult};

use super::context::GraphModel;
use super::node::{InAnchor, NodeId, OutAnchor};

impl GraphModel {
    // ========================================================================
    // Anchor lookups
    // ========================================================================

    /// The producer feeding an input anchor
    pub fn input_peer(&self, anchor: InAnchor) -> FusionResult<Option<OutAnchor>> {
        let node = self.try_node(anchor.node)?;
        node.inputs
            .get(anchor.index)
            .map(|a| a.peer)
            .ok_or(FusionError::AnchorOutOfRange {
                node: anchor.node,
                index: anchor.index,
                kind: "input",
            })
    }

    /// Consumers of an output anchor
    pub fn output_peers(&self, anchor: OutAnchor) -> FusionResult<&[InAnchor]> {
        let node = self.try_node(anchor.node)?;
        node.outputs
            .get(anchor.index)
            .map(|a| a.peers.as_slice())
            .ok_or(FusionError::AnchorOutOfRange {
                node: anchor.node,
                index: anchor.index,
                kind: "output",
            })
    }

    // ========================================================================
    // Node-level neighbours
    // ========================================================================

    /// Distinct nodes feeding `id` through data inputs, in input order
    pub fn producers(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        if let Some(node) = self.node(id) {
            for src in node.inputs.iter().filter_map(|a| a.peer) {
                if !result.contains(&src.node) {
                    result.push(src.node);
                }
            }
        }
        result
    }

    /// Distinct nodes consuming `id`'s data outputs, in output/link order
    pub fn consumers(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        if let Some(node) = self.node(id) {
            for dst in node.outputs.iter().flat_map(|a| a.peers.iter()) {
                if !result.contains(&dst.node) {
                    result.push(dst.node);
                }
            }
        }
        result
    }

    /// Check if any output of `from` feeds any input of `to`
    pub fn has_data_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.node(from)
            .map(|n| {
                n.outputs
                    .iter()
                    .flat_map(|a| a.peers.iter())
                    .any(|dst| dst.node == to)
            })
            .unwrap_or(false)
    }

    /// Check if `from` has a control edge to `to`
    pub fn has_control_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.node(from)
            .map(|n| n.control_out.contains(&to))
            .unwrap_or(false)
    }

    // ========================================================================
    // Edge enumeration
    // ========================================================================

    /// All data edges in node/output/link order
    pub fn data_edges(&self) -> Vec<(OutAnchor, InAnchor)> {
        let mut edges = Vec::new();
        for node in self.nodes.values() {
            for (index, output) in node.outputs.iter().enumerate() {
                for &dst in &output.peers {
                    edges.push((OutAnchor::new(node.id, index), dst));
                }
            }
        }
        edges
    }

    /// Number of data edges
    pub fn data_edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.consumer_count()).sum()
    }

    /// All control edges as `(from, to)` pairs
    pub fn control_edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes
            .values()
            .flat_map(|n| n.control_out.iter().map(move |&to| (n.id, to)))
            .collect()
    }
}
