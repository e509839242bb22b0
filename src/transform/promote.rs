//! Const-to-attr promotion
//!
//! Replaces a node whose input is fed by a compile-time constant with a new
//! node that carries the constant as an attribute and has one input fewer.

use tracing::debug;

use crate::error::{FusionError, FusionResult};
use crate::graph::{AttrSpec, InAnchor, NodeId, OutAnchor};
use crate::traits::{ConstantOracle, NodeFactory};

use super::eliminate::detach_and_remove;
use super::transaction::RewriteTransaction;

/// Promote input `input_index` of `node` into attribute `spec`
///
/// The replacement node has type `new_type`, inherits every attribute of
/// `node`, and takes over its remaining inputs (indices above
/// `input_index` shift down by one), its outputs, its control edges and
/// its graph-output mark. `node` is removed; the constant producer is
/// detached and removed too once nothing else consumes it, unless it is a
/// graph output.
///
/// Fails with `NotConstant` if the input is unconnected, is not a constant
/// according to `oracle`, or cannot be converted to `spec.kind`.
pub fn promote_input_to_attribute(
    tx: &mut RewriteTransaction<'_>,
    node: NodeId,
    input_index: usize,
    new_type: &str,
    spec: &AttrSpec,
    factory: &dyn NodeFactory,
    oracle: &dyn ConstantOracle,
) -> FusionResult<NodeId> {
    let graph = tx.graph();
    let original = graph.try_node(node)?;

    let input = original
        .inputs()
        .get(input_index)
        .ok_or(FusionError::AnchorOutOfRange {
            node,
            index: input_index,
            kind: "input",
        })?;
    let not_constant = FusionError::NotConstant {
        node,
        index: input_index,
    };
    let constant = input.peer().ok_or_else(|| not_constant.clone())?;
    let value = oracle
        .constant_value(graph, constant)
        .and_then(|v| v.convert_to(spec.kind))
        .ok_or(not_constant)?;

    let inputs: Vec<Option<OutAnchor>> = original.inputs().iter().map(|a| a.peer()).collect();
    let outputs: Vec<Vec<InAnchor>> = original
        .outputs()
        .iter()
        .map(|a| a.peers().to_vec())
        .collect();
    let preds = original.control_in().to_vec();
    let succs = original.control_out().to_vec();

    let mut replacement = factory.create(
        new_type,
        original.name(),
        inputs.len() - 1,
        outputs.len(),
    )?;
    for (name, attr) in original.attributes() {
        replacement = replacement.with_attr(name, attr.clone());
    }
    replacement = replacement.with_attr(&spec.name, value);

    let new_id = tx.add_node(replacement);

    // Inputs: drop the constant, shift the rest down
    for (index, peer) in inputs.iter().enumerate() {
        let Some(src) = *peer else { continue };
        tx.unlink(src, InAnchor::new(node, index))?;
        if index != input_index {
            let target = if index < input_index { index } else { index - 1 };
            tx.link(src, InAnchor::new(new_id, target))?;
        }
    }

    for (index, peers) in outputs.iter().enumerate() {
        for &dst in peers {
            tx.unlink(OutAnchor::new(node, index), dst)?;
            tx.link(OutAnchor::new(new_id, index), dst)?;
        }
    }

    for &pred in &preds {
        tx.unlink_control(pred, node)?;
        tx.link_control(pred, new_id)?;
    }
    for &succ in &succs {
        tx.unlink_control(node, succ)?;
        tx.link_control(new_id, succ)?;
    }

    tx.transfer_graph_output(node, new_id)?;
    tx.remove_node(node)?;

    let graph = tx.graph();
    let producer_done = graph
        .node(constant.node)
        .map(|p| p.consumer_count() == 0 && !graph.is_graph_output(constant.node))
        .unwrap_or(false);
    if producer_done {
        detach_and_remove(tx, constant.node)?;
    }

    debug!(
        node = %node,
        replacement = %new_id,
        attr = %spec.name,
        removed_constant = producer_done,
        "promoted constant input to attribute"
    );
    Ok(new_id)
}
