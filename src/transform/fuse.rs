//! Node fusion transformations
//!
//! Helpers for turning a mapping into the list of nodes a rewrite may
//! touch, and [`fuse_nodes`], which collapses such a list into a single
//! replacement node.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::error::{FusionError, FusionResult};
use crate::graph::{InAnchor, NodeId, OutAnchor};
use crate::pattern::{has_path, Mapping, PatternDefinition};
use crate::traits::NodeFactory;

use super::transaction::RewriteTransaction;

/// Result of a fusion operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseResult {
    /// The replacement node
    pub fused: NodeId,
    /// Nodes folded into it (removed from the graph)
    pub removed: Vec<NodeId>,
    /// Number of external inputs the fused node took over
    pub inputs: usize,
    /// Number of external outputs the fused node took over
    pub outputs: usize,
}

/// Flatten a mapping into its nodes in pattern-definition order
pub fn get_matched_nodes(mapping: &Mapping) -> Vec<NodeId> {
    mapping.nodes()
}

/// Drop nodes bound to output-role slots
///
/// Output-role nodes survive every rewrite of the match that bound them.
pub fn exclude_output_role_nodes(
    nodes: &[NodeId],
    pattern: &PatternDefinition,
    mapping: &Mapping,
) -> Vec<NodeId> {
    let protected: FxHashSet<NodeId> = pattern
        .nodes()
        .iter()
        .filter(|slot| slot.is_output)
        .flat_map(|slot| mapping.get(&slot.name).iter().copied())
        .collect();

    nodes
        .iter()
        .copied()
        .filter(|id| !protected.contains(id))
        .collect()
}

/// Replace `nodes` with a single node of type `op_type`
///
/// External producers feeding the set become the fused node's inputs in
/// encounter order (one input per distinct producer anchor). Output anchors
/// of the set that feed nodes outside it become the fused node's outputs,
/// also in encounter order. Control edges crossing the boundary move to the
/// fused node; edges inside the set are dropped. The fused node takes the
/// name of the first node and the union of attributes (earlier nodes win).
///
/// Fails with `CycleDetected` if a path leaves the set and comes back,
/// since the fused node would then depend on itself.
pub fn fuse_nodes(
    tx: &mut RewriteTransaction<'_>,
    nodes: &[NodeId],
    op_type: &str,
    factory: &dyn NodeFactory,
) -> FusionResult<FuseResult> {
    let mut members: Vec<NodeId> = Vec::with_capacity(nodes.len());
    for &id in nodes {
        if !members.contains(&id) {
            members.push(id);
        }
    }
    let Some(&first) = members.first() else {
        return Err(FusionError::Internal("fuse_nodes called with no nodes".into()));
    };
    let set: FxHashSet<NodeId> = members.iter().copied().collect();

    let graph = tx.graph();
    let mut ext_inputs: Vec<OutAnchor> = Vec::new();
    let mut ext_outputs: Vec<(OutAnchor, Vec<InAnchor>)> = Vec::new();
    let mut data_edges: Vec<(OutAnchor, InAnchor)> = Vec::new();
    let mut control_edges: Vec<(NodeId, NodeId)> = Vec::new();
    let mut preds: Vec<NodeId> = Vec::new();
    let mut succs: Vec<NodeId> = Vec::new();
    let mut exits: Vec<NodeId> = Vec::new();
    let mut is_output = false;

    for &id in &members {
        let node = graph.try_node(id)?;
        is_output |= graph.is_graph_output(id);

        for (index, input) in node.inputs().iter().enumerate() {
            let Some(src) = input.peer() else { continue };
            if !set.contains(&src.node) {
                data_edges.push((src, InAnchor::new(id, index)));
                if !ext_inputs.contains(&src) {
                    ext_inputs.push(src);
                }
            }
        }

        for (index, output) in node.outputs().iter().enumerate() {
            let anchor = OutAnchor::new(id, index);
            let mut external = Vec::new();
            for &dst in output.peers() {
                data_edges.push((anchor, dst));
                if !set.contains(&dst.node) {
                    external.push(dst);
                    if !exits.contains(&dst.node) {
                        exits.push(dst.node);
                    }
                }
            }
            if !external.is_empty() {
                ext_outputs.push((anchor, external));
            }
        }

        for &pred in node.control_in() {
            if !control_edges.contains(&(pred, id)) {
                control_edges.push((pred, id));
            }
            if !set.contains(&pred) && !preds.contains(&pred) {
                preds.push(pred);
            }
        }
        for &succ in node.control_out() {
            if !control_edges.contains(&(id, succ)) {
                control_edges.push((id, succ));
            }
            if !set.contains(&succ) {
                if !succs.contains(&succ) {
                    succs.push(succ);
                }
                if !exits.contains(&succ) {
                    exits.push(succ);
                }
            }
        }
    }

    if has_path(graph, &exits, &set) {
        return Err(FusionError::CycleDetected(first));
    }

    let anchor_node = graph.try_node(first)?;
    let mut fused = factory.create(op_type, anchor_node.name(), ext_inputs.len(), ext_outputs.len())?;
    for &id in &members {
        for (name, value) in graph.try_node(id)?.attributes() {
            if fused.attr(name).is_none() {
                fused = fused.with_attr(name, value.clone());
            }
        }
    }

    let fused_id = tx.add_node(fused);

    for &(src, dst) in &data_edges {
        tx.unlink(src, dst)?;
    }
    for &(from, to) in &control_edges {
        tx.unlink_control(from, to)?;
    }

    for (index, &src) in ext_inputs.iter().enumerate() {
        tx.link(src, InAnchor::new(fused_id, index))?;
    }
    for (index, (_, consumers)) in ext_outputs.iter().enumerate() {
        for &dst in consumers {
            tx.link(OutAnchor::new(fused_id, index), dst)?;
        }
    }
    for &pred in &preds {
        tx.link_control(pred, fused_id)?;
    }
    for &succ in &succs {
        tx.link_control(fused_id, succ)?;
    }

    if is_output {
        for &id in &members {
            tx.unmark_graph_output(id);
        }
        tx.mark_graph_output(fused_id)?;
    }
    for &id in &members {
        tx.remove_node(id)?;
    }

    debug!(
        fused = %fused_id,
        op_type,
        removed = members.len(),
        inputs = ext_inputs.len(),
        outputs = ext_outputs.len(),
        "fused nodes"
    );

    Ok(FuseResult {
        fused: fused_id,
        inputs: ext_inputs.len(),
        outputs: ext_outputs.len(),
        removed: members,
    })
}
