//! Pass-through elimination pass

use crate::driver::{Pass, RewriteContext};
use crate::error::FusionResult;
use crate::pattern::{Mapping, PatternDefinition, PASS_THROUGH_OPS};
use crate::transform::bypass;

/// Pass name
pub const PASS_THROUGH_ELIMINATION: &str = "pass_through_elimination";

fn definitions() -> FusionResult<Vec<PatternDefinition>> {
    Ok(vec![PatternDefinition::builder("pass_through")
        .add_pattern_node("node", PASS_THROUGH_OPS)
        .set_head(&["node"])
        .build()?])
}

/// Bypass a node that forwards exactly one producer
///
/// Nodes without a producer, with several, or that are graph outputs are
/// left alone.
fn eliminate(ctx: &mut RewriteContext<'_, '_>, mapping: &Mapping) -> FusionResult<bool> {
    let Some(id) = mapping.first("node") else {
        return Ok(false);
    };

    let graph = ctx.graph();
    let node = graph.try_node(id)?;
    if node.connected_inputs() != 1 || graph.is_graph_output(id) {
        return Ok(false);
    }

    bypass(ctx.tx, id)?;
    Ok(true)
}

/// Removes Identity-like nodes and reconnects their neighbours
///
/// Transforms:
///   A -> Identity -> (B, C)
/// Into:
///   A -> (B, C)
pub fn pass_through_elimination() -> Pass {
    Pass::fallible(PASS_THROUGH_ELIMINATION, definitions, eliminate)
}
