//! Rewrite transactions
//!
//! A [`RewriteTransaction`] holds the only mutable borrow of a
//! [`GraphModel`] while a rewrite runs. Every primitive it exposes is logged
//! with enough information to undo it, so a failed rewrite leaves the graph
//! exactly as it was: same node ids, same iteration order, same peer order.

use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::error::FusionResult;
use crate::graph::{AttrValue, GraphModel, InAnchor, Node, NodeId, OutAnchor};

/// Lifecycle of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Opened, nothing changed yet
    Open,
    /// At least one mutation applied
    Mutating,
    /// Changes kept
    Committed,
    /// Changes undone
    RolledBack,
}

impl TransactionState {
    /// Whether the transaction has finished
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }
}

#[derive(Debug)]
enum UndoOp {
    Linked {
        src: OutAnchor,
        dst: InAnchor,
    },
    Unlinked {
        src: OutAnchor,
        dst: InAnchor,
        position: usize,
    },
    ControlLinked {
        from: NodeId,
        to: NodeId,
    },
    ControlUnlinked {
        from: NodeId,
        to: NodeId,
        from_pos: usize,
        to_pos: usize,
    },
    NodeAdded(NodeId),
    NodeRemoved {
        index: usize,
        node: Node,
    },
    AttrSet {
        node: NodeId,
        name: String,
        previous: Option<AttrValue>,
    },
    AttrRemoved {
        node: NodeId,
        name: String,
        index: usize,
        value: AttrValue,
    },
    OpTypeSet {
        node: NodeId,
        previous: String,
    },
    OutputMarked(NodeId),
    OutputUnmarked {
        node: NodeId,
        position: usize,
    },
}

/// Logged, undoable mutation of a graph
///
/// `commit` and `rollback` consume the transaction, so a finished
/// transaction cannot be reused. Dropping an unfinished transaction rolls
/// it back.
///
/// # Example
///
/// ```ignore
/// let mut tx = RewriteTransaction::new(&mut graph);
/// bypass(&mut tx, identity)?;
/// tx.commit()?;
/// ```
pub struct RewriteTransaction<'g> {
    graph: &'g mut GraphModel,
    log: Vec<UndoOp>,
    touched: IndexSet<NodeId>,
    state: TransactionState,
    next_id_at_open: NodeId,
}

impl<'g> RewriteTransaction<'g> {
    /// Open a transaction on `graph`
    pub fn new(graph: &'g mut GraphModel) -> Self {
        let next_id_at_open = graph.next_id();
        Self {
            graph,
            log: Vec::new(),
            touched: IndexSet::new(),
            state: TransactionState::Open,
            next_id_at_open,
        }
    }

    /// Read access to the graph in its current (uncommitted) state
    pub fn graph(&self) -> &GraphModel {
        self.graph
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of logged mutations
    pub fn mutation_count(&self) -> usize {
        self.log.len()
    }

    /// Check if nothing has been changed
    pub fn is_unchanged(&self) -> bool {
        self.log.is_empty()
    }

    /// Nodes created by this transaction, in creation order
    pub fn created_nodes(&self) -> Vec<NodeId> {
        self.log
            .iter()
            .filter_map(|op| match op {
                UndoOp::NodeAdded(id) => Some(*id),
                _ => None,
            })
            .filter(|id| self.graph.contains(*id))
            .collect()
    }

    fn record(&mut self, op: UndoOp) {
        self.state = TransactionState::Mutating;
        self.log.push(op);
    }

    fn touch(&mut self, ids: &[NodeId]) {
        self.touched.extend(ids.iter().copied());
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Insert a node; see [`GraphModel::add_node`]
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = self.graph.add_node(node);
        self.touch(&[id]);
        self.record(UndoOp::NodeAdded(id));
        id
    }

    /// Insert a fresh node built from its parts
    pub fn add_op(&mut self, name: &str, op_type: &str, inputs: usize, outputs: usize) -> NodeId {
        self.add_node(Node::new(name, op_type, inputs, outputs))
    }

    /// Remove an isolated node; see [`GraphModel::remove_node`]
    pub fn remove_node(&mut self, id: NodeId) -> FusionResult<()> {
        let (index, node) = self.graph.remove_node(id)?;
        self.touched.shift_remove(&id);
        self.record(UndoOp::NodeRemoved { index, node });
        Ok(())
    }

    // ========================================================================
    // Data links
    // ========================================================================

    /// Link an output anchor to a free input anchor
    pub fn link(&mut self, src: OutAnchor, dst: InAnchor) -> FusionResult<()> {
        self.graph.link(src, dst)?;
        self.touch(&[src.node, dst.node]);
        self.record(UndoOp::Linked { src, dst });
        Ok(())
    }

    /// Connect `from.outputs[out_index]` to `to.inputs[in_index]`
    pub fn connect(
        &mut self,
        from: NodeId,
        out_index: usize,
        to: NodeId,
        in_index: usize,
    ) -> FusionResult<()> {
        self.link(OutAnchor::new(from, out_index), InAnchor::new(to, in_index))
    }

    /// Remove an existing link
    pub fn unlink(&mut self, src: OutAnchor, dst: InAnchor) -> FusionResult<()> {
        let position = self.graph.unlink(src, dst)?;
        self.touch(&[src.node, dst.node]);
        self.record(UndoOp::Unlinked { src, dst, position });
        Ok(())
    }

    /// Detach whatever feeds `dst`; returns the former producer
    pub fn detach_input(&mut self, dst: InAnchor) -> FusionResult<Option<OutAnchor>> {
        match self.graph.input_peer(dst)? {
            Some(src) => {
                self.unlink(src, dst)?;
                Ok(Some(src))
            }
            None => Ok(None),
        }
    }

    // ========================================================================
    // Control links
    // ========================================================================

    /// Add a precedence edge; returns `false` if it already existed
    pub fn link_control(&mut self, from: NodeId, to: NodeId) -> FusionResult<bool> {
        let added = self.graph.link_control(from, to)?;
        if added {
            self.touch(&[from, to]);
            self.record(UndoOp::ControlLinked { from, to });
        }
        Ok(added)
    }

    /// Remove a precedence edge
    pub fn unlink_control(&mut self, from: NodeId, to: NodeId) -> FusionResult<()> {
        let (from_pos, to_pos) = self.graph.unlink_control(from, to)?;
        self.touch(&[from, to]);
        self.record(UndoOp::ControlUnlinked {
            from,
            to,
            from_pos,
            to_pos,
        });
        Ok(())
    }

    // ========================================================================
    // Attributes and type
    // ========================================================================

    /// Set an attribute
    pub fn set_attr(&mut self, node: NodeId, name: &str, value: AttrValue) -> FusionResult<()> {
        let previous = self.graph.set_attr(node, name, value)?;
        self.record(UndoOp::AttrSet {
            node,
            name: name.to_string(),
            previous,
        });
        Ok(())
    }

    /// Remove an attribute; returns its value
    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> FusionResult<Option<AttrValue>> {
        let Some((index, value)) = self.graph.remove_attr(node, name)? else {
            return Ok(None);
        };
        self.record(UndoOp::AttrRemoved {
            node,
            name: name.to_string(),
            index,
            value: value.clone(),
        });
        Ok(Some(value))
    }

    /// Replace a node's operator type
    pub fn set_op_type(&mut self, node: NodeId, op_type: &str) -> FusionResult<()> {
        let previous = self.graph.set_op_type(node, op_type)?;
        self.record(UndoOp::OpTypeSet { node, previous });
        Ok(())
    }

    // ========================================================================
    // Graph outputs
    // ========================================================================

    /// Mark a node as a graph output
    pub fn mark_graph_output(&mut self, node: NodeId) -> FusionResult<()> {
        if self.graph.mark_graph_output(node)? {
            self.record(UndoOp::OutputMarked(node));
        }
        Ok(())
    }

    /// Remove a node's graph-output mark
    pub fn unmark_graph_output(&mut self, node: NodeId) {
        if let Some(position) = self.graph.graph_outputs.get_index_of(&node) {
            self.graph.unmark_graph_output(node);
            self.record(UndoOp::OutputUnmarked { node, position });
        }
    }

    /// Move the graph-output mark from `from` to `to`, if `from` carries it
    pub fn transfer_graph_output(&mut self, from: NodeId, to: NodeId) -> FusionResult<()> {
        if self.graph.is_graph_output(from) {
            self.unmark_graph_output(from);
            self.mark_graph_output(to)?;
        }
        Ok(())
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Validate every touched node and keep the changes
    ///
    /// On a validation failure the transaction rolls back and the error is
    /// returned.
    pub fn commit(mut self) -> FusionResult<()> {
        let validation = self
            .touched
            .iter()
            .filter(|id| self.graph.contains(**id))
            .try_for_each(|id| self.graph.validate_node(*id));

        if let Err(err) = validation {
            warn!(error = %err, mutations = self.log.len(), "commit validation failed, rolling back");
            self.undo_all();
            return Err(err);
        }

        debug!(mutations = self.log.len(), "transaction committed");
        self.log.clear();
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Undo every logged mutation
    pub fn rollback(mut self) {
        self.undo_all();
    }

    fn undo_all(&mut self) {
        let count = self.log.len();
        while let Some(op) = self.log.pop() {
            self.undo(op);
        }
        self.graph.set_next_id(self.next_id_at_open);
        self.touched.clear();
        self.state = TransactionState::RolledBack;
        if count > 0 {
            debug!(mutations = count, "transaction rolled back");
        }
    }

    fn undo(&mut self, op: UndoOp) {
        let graph = &mut *self.graph;
        match op {
            UndoOp::Linked { src, dst } => {
                // Cannot fail: the link was created by this transaction
                let _ = graph.unlink(src, dst);
            }
            UndoOp::Unlinked { src, dst, position } => graph.relink_at(src, dst, position),
            UndoOp::ControlLinked { from, to } => {
                let _ = graph.unlink_control(from, to);
            }
            UndoOp::ControlUnlinked {
                from,
                to,
                from_pos,
                to_pos,
            } => graph.relink_control_at(from, to, from_pos, to_pos),
            UndoOp::NodeAdded(id) => {
                graph.discard_node(id);
            }
            UndoOp::NodeRemoved { index, node } => graph.restore_node(index, node),
            UndoOp::AttrSet {
                node,
                name,
                previous,
            } => match previous {
                Some(value) => {
                    let _ = graph.set_attr(node, &name, value);
                }
                None => {
                    let _ = graph.remove_attr(node, &name);
                }
            },
            UndoOp::AttrRemoved {
                node,
                name,
                index,
                value,
            } => graph.restore_attr(node, index, name, value),
            UndoOp::OpTypeSet { node, previous } => {
                let _ = graph.set_op_type(node, &previous);
            }
            UndoOp::OutputMarked(id) => {
                graph.unmark_graph_output(id);
            }
            UndoOp::OutputUnmarked { node, position } => {
                let position = position.min(graph.graph_outputs.len());
                graph.graph_outputs.shift_insert(position, node);
            }
        }
    }
}

impl Drop for RewriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.undo_all();
        }
    }
}

impl std::fmt::Debug for RewriteTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteTransaction")
            .field("state", &self.state)
            .field("mutations", &self.log.len())
            .finish()
    }
}
