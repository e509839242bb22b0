//! Graph mutation operations
//!
//! Primitive edits on the arena: inserting and removing nodes, linking and
//! unlinking anchors, and attribute updates. Each primitive keeps both sides
//! of a link in sync. Rewrites go through
//! [`RewriteTransaction`](crate::transform::RewriteTransaction), which logs
//! these primitives so they can be undone.

use crate::error::{FusionError, FusionResult};

use super::attr::AttrValue;
use super::context::GraphModel;
use super::node::{InAnchor, Node, NodeId, OutAnchor};

impl GraphModel {
    // ========================================================================
    // Node mutation
    // ========================================================================

    /// Insert a node and assign it a fresh id
    ///
    /// Any peer links carried by `node` are discarded; it starts isolated.
    pub fn add_node(&mut self, mut node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        node.id = id;
        for input in &mut node.inputs {
            input.peer = None;
        }
        for output in &mut node.outputs {
            output.peers.clear();
        }
        node.control_in.clear();
        node.control_out.clear();

        self.nodes.insert(id, node);
        id
    }

    /// Convenience constructor used by graph front ends and tests
    pub fn add_op(&mut self, name: &str, op_type: &str, inputs: usize, outputs: usize) -> NodeId {
        self.add_node(Node::new(name, op_type, inputs, outputs))
    }

    /// Remove an isolated node
    ///
    /// Returns the node's position in iteration order together with the
    /// node. Fails if any anchor still has a peer or the node is a graph
    /// output.
    pub fn remove_node(&mut self, id: NodeId) -> FusionResult<(usize, Node)> {
        let node = self.try_node(id)?;

        if !node.is_isolated() {
            let peers = node.connected_inputs()
                + node.consumer_count()
                + node.control_in.len()
                + node.control_out.len();
            return Err(FusionError::structural(
                id,
                format!("cannot remove node with {peers} remaining peer(s)"),
            ));
        }
        if self.graph_outputs.contains(&id) {
            return Err(FusionError::structural(
                id,
                "cannot remove a graph output node",
            ));
        }

        let (index, _, node) = self
            .nodes
            .shift_remove_full(&id)
            .ok_or(FusionError::NodeNotFound(id))?;
        Ok((index, node))
    }

    /// Re-insert a previously removed node at its old position
    pub(crate) fn restore_node(&mut self, index: usize, node: Node) {
        let index = index.min(self.nodes.len());
        self.nodes.shift_insert(index, node.id, node);
    }

    /// Remove a node without structural checks
    pub(crate) fn discard_node(&mut self, id: NodeId) -> Option<Node> {
        self.graph_outputs.shift_remove(&id);
        self.nodes.shift_remove(&id)
    }

    pub(crate) fn set_next_id(&mut self, next: NodeId) {
        self.next_id = next.0;
    }

    // ========================================================================
    // Data links
    // ========================================================================

    /// Connect `from_node.outputs[out_index]` to `to_node.inputs[in_index]`
    pub fn connect(
        &mut self,
        from_node: NodeId,
        out_index: usize,
        to_node: NodeId,
        in_index: usize,
    ) -> FusionResult<()> {
        self.link(
            OutAnchor::new(from_node, out_index),
            InAnchor::new(to_node, in_index),
        )
        .map(|_| ())
    }

    /// Link an output anchor to an input anchor
    ///
    /// Returns the position of `dst` in the source's peer list. Fails with
    /// `EdgeConflict` if `dst` already has a producer.
    pub fn link(&mut self, src: OutAnchor, dst: InAnchor) -> FusionResult<usize> {
        self.check_output(src)?;
        if let Some(existing) = self.input_peer(dst)? {
            return Err(FusionError::EdgeConflict(format!(
                "{dst} is already fed by {existing}, cannot link {src}"
            )));
        }

        self.try_node_mut(dst.node)?.inputs[dst.index].peer = Some(src);
        let peers = &mut self.try_node_mut(src.node)?.outputs[src.index].peers;
        peers.push(dst);
        Ok(peers.len() - 1)
    }

    /// Remove the link `src -> dst`
    ///
    /// Returns the position `dst` occupied in the source's peer list.
    pub fn unlink(&mut self, src: OutAnchor, dst: InAnchor) -> FusionResult<usize> {
        self.check_output(src)?;
        if self.input_peer(dst)? != Some(src) {
            return Err(FusionError::EdgeConflict(format!(
                "{src} is not linked to {dst}"
            )));
        }

        let peers = &mut self.try_node_mut(src.node)?.outputs[src.index].peers;
        let position = peers
            .iter()
            .position(|p| *p == dst)
            .ok_or_else(|| FusionError::structural(src.node, format!("{src} does not list {dst}")))?;
        peers.remove(position);
        self.try_node_mut(dst.node)?.inputs[dst.index].peer = None;
        Ok(position)
    }

    /// Undo an `unlink` by re-inserting the link at its old position
    pub(crate) fn relink_at(&mut self, src: OutAnchor, dst: InAnchor, position: usize) {
        if let Some(node) = self.nodes.get_mut(&dst.node) {
            if let Some(input) = node.inputs.get_mut(dst.index) {
                input.peer = Some(src);
            }
        }
        if let Some(node) = self.nodes.get_mut(&src.node) {
            if let Some(output) = node.outputs.get_mut(src.index) {
                let position = position.min(output.peers.len());
                output.peers.insert(position, dst);
            }
        }
    }

    fn check_output(&self, anchor: OutAnchor) -> FusionResult<()> {
        let node = self.try_node(anchor.node)?;
        if anchor.index >= node.outputs.len() {
            return Err(FusionError::AnchorOutOfRange {
                node: anchor.node,
                index: anchor.index,
                kind: "output",
            });
        }
        Ok(())
    }

    // ========================================================================
    // Control links
    // ========================================================================

    /// Add a precedence edge `from -> to`; returns `false` if it already exists
    pub fn link_control(&mut self, from: NodeId, to: NodeId) -> FusionResult<bool> {
        if from == to {
            return Err(FusionError::EdgeConflict(format!(
                "control self-loop on {from}"
            )));
        }
        self.try_node(to)?;
        if self.try_node(from)?.control_out.contains(&to) {
            return Ok(false);
        }

        self.try_node_mut(from)?.control_out.push(to);
        self.try_node_mut(to)?.control_in.push(from);
        Ok(true)
    }

    /// Remove the precedence edge `from -> to`
    ///
    /// Returns the positions the edge occupied in `from.control_out` and
    /// `to.control_in`.
    pub fn unlink_control(&mut self, from: NodeId, to: NodeId) -> FusionResult<(usize, usize)> {
        let from_pos = self
            .try_node(from)?
            .control_out
            .iter()
            .position(|n| *n == to)
            .ok_or_else(|| FusionError::EdgeConflict(format!("no control edge {from} -> {to}")))?;
        let to_pos = self
            .try_node(to)?
            .control_in
            .iter()
            .position(|n| *n == from)
            .ok_or_else(|| FusionError::structural(to, format!("control edge from {from} is one-sided")))?;

        self.try_node_mut(from)?.control_out.remove(from_pos);
        self.try_node_mut(to)?.control_in.remove(to_pos);
        Ok((from_pos, to_pos))
    }

    pub(crate) fn relink_control_at(
        &mut self,
        from: NodeId,
        to: NodeId,
        from_pos: usize,
        to_pos: usize,
    ) {
        if let Some(node) = self.nodes.get_mut(&from) {
            let pos = from_pos.min(node.control_out.len());
            node.control_out.insert(pos, to);
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            let pos = to_pos.min(node.control_in.len());
            node.control_in.insert(pos, from);
        }
    }

    // ========================================================================
    // Attribute mutation
    // ========================================================================

    /// Set an attribute; returns the previous value
    pub fn set_attr(
        &mut self,
        id: NodeId,
        name: &str,
        value: AttrValue,
    ) -> FusionResult<Option<AttrValue>> {
        Ok(self
            .try_node_mut(id)?
            .attributes
            .insert(name.to_string(), value))
    }

    /// Remove an attribute; returns its position and value
    pub fn remove_attr(
        &mut self,
        id: NodeId,
        name: &str,
    ) -> FusionResult<Option<(usize, AttrValue)>> {
        Ok(self
            .try_node_mut(id)?
            .attributes
            .shift_remove_full(name)
            .map(|(index, _, value)| (index, value)))
    }

    pub(crate) fn restore_attr(&mut self, id: NodeId, index: usize, name: String, value: AttrValue) {
        if let Some(node) = self.nodes.get_mut(&id) {
            let index = index.min(node.attributes.len());
            node.attributes.shift_insert(index, name, value);
        }
    }

    /// Replace a node's operator type; returns the previous type
    pub fn set_op_type(&mut self, id: NodeId, op_type: &str) -> FusionResult<String> {
        let node = self.try_node_mut(id)?;
        Ok(std::mem::replace(&mut node.op_type, op_type.to_string()))
    }
}
