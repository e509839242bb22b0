//! Constant-to-attribute promotion pass

use tracing::debug;

use crate::driver::{Pass, PassOutcome, RewriteContext};
use crate::error::FusionResult;
use crate::graph::AttrSpec;
use crate::pattern::{Mapping, PatternDefinition};
use crate::transform::promote_input_to_attribute;

/// Which input of which operator becomes which attribute
#[derive(Debug, Clone, PartialEq)]
pub struct ConstToAttrRule {
    /// Operator type to rewrite
    pub op_type: String,
    /// Input carrying the constant
    pub input_index: usize,
    /// Type of the replacement node
    pub new_type: String,
    /// Attribute receiving the constant
    pub attr: AttrSpec,
}

impl ConstToAttrRule {
    /// Create a new rule
    pub fn new(op_type: &str, input_index: usize, new_type: &str, attr: AttrSpec) -> Self {
        Self {
            op_type: op_type.to_string(),
            input_index,
            new_type: new_type.to_string(),
            attr,
        }
    }

    /// Name of the pass built from this rule
    pub fn pass_name(&self) -> String {
        format!("const_to_attr_{}", self.op_type.to_lowercase())
    }
}

fn promote(ctx: &mut RewriteContext<'_, '_>, mapping: &Mapping, rule: &ConstToAttrRule) -> PassOutcome {
    let Some(id) = mapping.first("node") else {
        return PassOutcome::NotChanged;
    };

    let result = promote_input_to_attribute(
        ctx.tx,
        id,
        rule.input_index,
        &rule.new_type,
        &rule.attr,
        ctx.services.factory.as_ref(),
        ctx.services.constants.as_ref(),
    );
    let replacement = match result {
        Ok(replacement) => replacement,
        Err(err) => {
            let outcome = PassOutcome::from_result(&Err(err.clone()));
            debug!(node = %id, error = %err, %outcome, "const-to-attr not applied");
            return outcome;
        }
    };

    let supported = ctx
        .graph()
        .node(replacement)
        .map(|n| ctx.services.support.is_supported(n))
        .unwrap_or(false);
    if !supported {
        debug!(node = %id, new_type = %rule.new_type, "replacement not supported by target");
        return PassOutcome::NotChanged;
    }

    PassOutcome::Changed
}

/// Folds a constant input into an attribute
///
/// Transforms:
///   Const(v) -> Op(x, c)
/// Into:
///   NewOp(x, attr=v)
///
/// The replacement is kept only if the op-support oracle accepts it.
pub fn const_to_attr(rule: ConstToAttrRule) -> Pass {
    let name = rule.pass_name();
    let op_type = rule.op_type.clone();

    let definitions = move || -> FusionResult<Vec<PatternDefinition>> {
        Ok(vec![PatternDefinition::builder(&format!("{}_const_input", op_type))
            .add_pattern_node("node", &[op_type.as_str()])
            .set_head(&["node"])
            .build()?])
    };

    Pass::new(&name, definitions, move |ctx, mapping| promote(ctx, mapping, &rule))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{HostServices, PassDriver};
    use crate::graph::{AttrKind, AttrValue, GraphModel, Node, NodeId, Tensor};
    use crate::traits::SupportedOps;

    fn reshape_rule() -> ConstToAttrRule {
        ConstToAttrRule::new(
            "Reshape",
            1,
            "ReshapeStatic",
            AttrSpec::new("shape", AttrKind::Ints),
        )
    }

    // x -> reshape(x, shape) -> relu, plus a reshape fed by a runtime shape
    fn make_test_graph() -> (GraphModel, [NodeId; 3]) {
        let mut graph = GraphModel::new();
        let x = graph.add_op("x", "Input", 0, 1);
        let shape = graph.add_node(
            Node::new("shape", "Const", 0, 1)
                .with_attr("value", AttrValue::Tensor(Tensor::from_i64s(vec![2, 8]))),
        );
        let reshape = graph.add_op("reshape", "Reshape", 2, 1);
        let relu = graph.add_op("relu", "Relu", 1, 1);
        let dyn_shape = graph.add_op("dyn_shape", "Shape", 1, 1);
        let dyn_reshape = graph.add_op("dyn_reshape", "Reshape", 2, 1);
        graph.connect(x, 0, reshape, 0).unwrap();
        graph.connect(shape, 0, reshape, 1).unwrap();
        graph.connect(reshape, 0, relu, 0).unwrap();
        graph.connect(relu, 0, dyn_shape, 0).unwrap();
        graph.connect(relu, 0, dyn_reshape, 0).unwrap();
        graph.connect(dyn_shape, 0, dyn_reshape, 1).unwrap();
        (graph, [x, relu, dyn_reshape])
    }

    #[test]
    fn test_const_to_attr() {
        let (mut graph, [x, relu, dyn_reshape]) = make_test_graph();
        let rule = reshape_rule();
        let name = rule.pass_name();
        let mut driver = PassDriver::new();
        driver.register(const_to_attr(rule)).unwrap();

        let summary = driver.run_once(&mut graph).unwrap();

        let stats = summary.pass(&name).unwrap();
        assert_eq!((stats.matched, stats.applied, stats.not_changed), (2, 1, 1));
        let fused = graph.nodes_of_type("ReshapeStatic");
        assert_eq!(fused.len(), 1);
        let node = graph.node(fused[0]).unwrap();
        assert_eq!(node.attr("shape"), Some(&AttrValue::Ints(vec![2, 8])));
        assert!(graph.has_data_edge(x, fused[0]));
        assert!(graph.has_data_edge(fused[0], relu));
        assert!(graph.contains(dyn_reshape));
        assert!(graph.nodes_of_type("Const").is_empty());
    }

    #[test]
    fn test_unsupported_replacement_rolled_back() {
        let (mut graph, _) = make_test_graph();
        let before = graph.clone();
        let mut driver = PassDriver::new()
            .with_services(HostServices::default().with_support(SupportedOps::new(&["Reshape"])));
        driver.register(const_to_attr(reshape_rule())).unwrap();

        let summary = driver.run_once(&mut graph).unwrap();

        assert_eq!(summary.changed(), 0);
        assert_eq!(graph, before);
    }

    #[test]
    fn test_pass_name() {
        assert_eq!(reshape_rule().pass_name(), "const_to_attr_reshape");
    }
}
