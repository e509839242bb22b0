//! Dead constant elimination pass

use crate::driver::{Pass, PassStage, RewriteContext};
use crate::error::FusionResult;
use crate::pattern::{Mapping, PatternDefinition, CONSTANT_OPS};
use crate::transform::detach_and_remove;

/// Pass name
pub const DEAD_CONSTANT_ELIMINATION: &str = "dead_constant_elimination";

fn definitions() -> FusionResult<Vec<PatternDefinition>> {
    Ok(vec![PatternDefinition::builder("constant")
        .add_pattern_node("constant", CONSTANT_OPS)
        .set_head(&["constant"])
        .build()?])
}

fn eliminate(ctx: &mut RewriteContext<'_, '_>, mapping: &Mapping) -> FusionResult<bool> {
    let Some(id) = mapping.first("constant") else {
        return Ok(false);
    };

    let graph = ctx.graph();
    if graph.try_node(id)?.consumer_count() > 0 || graph.is_graph_output(id) {
        return Ok(false);
    }

    detach_and_remove(ctx.tx, id)?;
    Ok(true)
}

/// Removes constants nothing reads
///
/// Runs in [`PassStage::SecondRound`] so it sees constants orphaned by the
/// built-in rewrites of the same round.
pub fn dead_constant_elimination() -> Pass {
    Pass::fallible(DEAD_CONSTANT_ELIMINATION, definitions, eliminate).in_stage(PassStage::SecondRound)
}
