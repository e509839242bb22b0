//! Graph model for dataflow-graph rewriting
//!
//! `GraphModel` is the arena that owns every node. Nodes reference each
//! other only through [`NodeId`]s held in their anchors, so the graph may
//! contain arbitrary fan-out and back references without ownership cycles.

use indexmap::{IndexMap, IndexSet};

use crate::error::{FusionError, FusionResult};

use super::node::{InAnchor, Node, NodeId, OutAnchor};

/// Arena of nodes with deterministic iteration order
///
/// Iteration follows insertion order; a node re-inserted by a rollback
/// returns to its original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphModel {
    pub(crate) nodes: IndexMap<NodeId, Node>,
    pub(crate) graph_outputs: IndexSet<NodeId>,
    pub(crate) next_id: u32,
}

impl GraphModel {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty graph with room for `capacity` nodes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: IndexMap::with_capacity(capacity),
            ..Default::default()
        }
    }

    // ========================================================================
    // Node accessors
    // ========================================================================

    /// Get a node by id
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Get a node by id, failing with `NodeNotFound`
    pub fn try_node(&self, id: NodeId) -> FusionResult<&Node> {
        self.nodes.get(&id).ok_or(FusionError::NodeNotFound(id))
    }

    pub(crate) fn try_node_mut(&mut self, id: NodeId) -> FusionResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(FusionError::NodeNotFound(id))
    }

    /// Check if a node exists
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes in order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Node ids in iteration order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    /// Position of a node in iteration order
    pub fn position_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.get_index_of(&id)
    }

    /// Find the first node with the given name
    pub fn find_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name == name)
    }

    /// Ids of all nodes of the given type
    pub fn nodes_of_type(&self, op_type: &str) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.op_type == op_type)
            .map(|n| n.id)
            .collect()
    }

    /// The id the next inserted node will receive
    ///
    /// Every node created from now on has an id `>=` this value, which the
    /// pass driver uses as a per-round horizon.
    pub fn next_id(&self) -> NodeId {
        NodeId(self.next_id)
    }

    // ========================================================================
    // Graph outputs
    // ========================================================================

    /// Mark a node as producing a graph result; returns whether it was newly marked
    pub fn mark_graph_output(&mut self, id: NodeId) -> FusionResult<bool> {
        self.try_node(id)?;
        Ok(self.graph_outputs.insert(id))
    }

    /// Remove the graph-output mark; returns whether the node was marked
    pub fn unmark_graph_output(&mut self, id: NodeId) -> bool {
        self.graph_outputs.shift_remove(&id)
    }

    /// Check if a node produces a graph result
    pub fn is_graph_output(&self, id: NodeId) -> bool {
        self.graph_outputs.contains(&id)
    }

    /// Graph output nodes in marking order
    pub fn graph_outputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph_outputs.iter().copied()
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Check that every link of `id` is mirrored on its peer
    pub fn validate_node(&self, id: NodeId) -> FusionResult<()> {
        let node = self.try_node(id)?;

        for (index, input) in node.inputs.iter().enumerate() {
            if let Some(src) = input.peer {
                let here = InAnchor::new(id, index);
                let mirrored = self
                    .node(src.node)
                    .and_then(|p| p.outputs.get(src.index))
                    .map(|a| a.peers.contains(&here))
                    .unwrap_or(false);
                if !mirrored {
                    return Err(FusionError::structural(
                        id,
                        format!("{here} points at {src}, which does not list it"),
                    ));
                }
            }
        }

        for (index, output) in node.outputs.iter().enumerate() {
            let here = OutAnchor::new(id, index);
            for (pos, dst) in output.peers.iter().enumerate() {
                if output.peers[..pos].contains(dst) {
                    return Err(FusionError::structural(
                        id,
                        format!("{here} lists {dst} twice"),
                    ));
                }
                let mirrored = self
                    .node(dst.node)
                    .and_then(|p| p.inputs.get(dst.index))
                    .map(|a| a.peer == Some(here))
                    .unwrap_or(false);
                if !mirrored {
                    return Err(FusionError::structural(
                        id,
                        format!("{here} lists {dst}, which is fed elsewhere"),
                    ));
                }
            }
        }

        for &pred in &node.control_in {
            let ok = self
                .node(pred)
                .map(|p| p.control_out.contains(&id))
                .unwrap_or(false);
            if !ok {
                return Err(FusionError::structural(
                    id,
                    format!("control edge from {pred} is one-sided"),
                ));
            }
        }
        for &succ in &node.control_out {
            let ok = self
                .node(succ)
                .map(|p| p.control_in.contains(&id))
                .unwrap_or(false);
            if !ok {
                return Err(FusionError::structural(
                    id,
                    format!("control edge to {succ} is one-sided"),
                ));
            }
        }

        Ok(())
    }

    /// Validate every node
    pub fn validate(&self) -> FusionResult<()> {
        for id in self.nodes.keys() {
            self.validate_node(*id)?;
        }
        Ok(())
    }
}
