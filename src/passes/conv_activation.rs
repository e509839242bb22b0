//! Convolution + activation fusion

use crate::driver::{Pass, RewriteContext};
use crate::error::FusionResult;
use crate::graph::AttrValue;
use crate::pattern::{BranchMode, Mapping, PatternDefinition, ACTIVATIONS, CONV_LIKE, QUANT_OPS};
use crate::transform::{exclude_output_role_nodes, fuse_nodes, get_matched_nodes};

/// Pass name
pub const CONV_ACTIVATION_FUSION: &str = "conv_activation_fusion";

/// Attribute naming the folded activation on the fused node
pub const ACTIVATION_ATTR: &str = "activation";

fn definitions() -> FusionResult<Vec<PatternDefinition>> {
    Ok(vec![PatternDefinition::builder("conv_activation")
        .add_pattern_node("conv", CONV_LIKE)
        .add_pattern_node("act", ACTIVATIONS)
        .add_repeated_node("quant", QUANT_OPS, 0, 1)
        .set_head(&["conv"])
        .set_outputs("conv", &["act"], BranchMode::Single)
        .set_outputs("act", &["quant"], BranchMode::Single)
        .set_output_role(&["quant"])
        .build()?])
}

fn fuse(ctx: &mut RewriteContext<'_, '_>, mapping: &Mapping) -> FusionResult<bool> {
    let (Some(conv), Some(act)) = (mapping.first("conv"), mapping.first("act")) else {
        return Ok(false);
    };

    // The conv output must reach nothing but the activation
    let graph = ctx.graph();
    let conv_node = graph.try_node(conv)?;
    if conv_node.consumer_count() != 1 || graph.is_graph_output(conv) {
        return Ok(false);
    }
    let fused_type = format!("{}{}", conv_node.op_type(), graph.try_node(act)?.op_type());
    let act_type = graph.try_node(act)?.op_type().to_string();

    let nodes = exclude_output_role_nodes(&get_matched_nodes(mapping), ctx.pattern, mapping);
    let result = fuse_nodes(ctx.tx, &nodes, &fused_type, ctx.services.factory.as_ref())?;
    ctx.tx
        .set_attr(result.fused, ACTIVATION_ATTR, AttrValue::Str(act_type))?;

    let fused = ctx.tx.graph().try_node(result.fused)?;
    Ok(ctx.services.support.is_supported(fused))
}

/// Folds an activation into the convolution feeding it
///
/// Transforms:
///   Conv -> Relu -> [Quant]
/// Into:
///   ConvRelu(activation="Relu") -> [Quant]
///
/// A trailing quantize node is matched but never absorbed.
pub fn conv_activation_fusion() -> Pass {
    Pass::fallible(CONV_ACTIVATION_FUSION, definitions, fuse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{HostServices, PassDriver};
    use crate::graph::{GraphModel, Node, NodeId};
    use crate::traits::SupportedOps;

    // x, w -> conv -> act -> quant
    fn make_test_graph(act: &str) -> (GraphModel, [NodeId; 5]) {
        let mut graph = GraphModel::new();
        let x = graph.add_op("x", "Input", 0, 1);
        let w = graph.add_op("w", "Const", 0, 1);
        let conv = graph.add_node(
            Node::new("conv", "Conv", 2, 1).with_attr("group", AttrValue::Int(1)),
        );
        let act = graph.add_op("act", act, 1, 1);
        let quant = graph.add_op("quant", "Quant", 1, 1);
        graph.connect(x, 0, conv, 0).unwrap();
        graph.connect(w, 0, conv, 1).unwrap();
        graph.connect(conv, 0, act, 0).unwrap();
        graph.connect(act, 0, quant, 0).unwrap();
        (graph, [x, w, conv, act, quant])
    }

    fn driver() -> PassDriver {
        let mut driver = PassDriver::new();
        driver.register(conv_activation_fusion()).unwrap();
        driver
    }

    #[test]
    fn test_fuse_keeps_quant() {
        let (mut graph, [x, w, conv, act, quant]) = make_test_graph("Relu");

        let summary = driver().run_once(&mut graph).unwrap();

        assert_eq!(summary.pass(CONV_ACTIVATION_FUSION).unwrap().applied, 1);
        assert!(!graph.contains(conv));
        assert!(!graph.contains(act));
        let fused = graph.nodes_of_type("ConvRelu");
        assert_eq!(fused.len(), 1);
        let node = graph.node(fused[0]).unwrap();
        assert_eq!(node.attr(ACTIVATION_ATTR), Some(&AttrValue::Str("Relu".into())));
        assert_eq!(node.attr("group"), Some(&AttrValue::Int(1)));
        assert!(graph.has_data_edge(x, fused[0]));
        assert!(graph.has_data_edge(w, fused[0]));
        assert!(graph.has_data_edge(fused[0], quant));
    }

    #[test]
    fn test_fuse_without_quant() {
        let mut graph = GraphModel::new();
        let x = graph.add_op("x", "Input", 0, 1);
        let conv = graph.add_op("conv", "Conv", 1, 1);
        let act = graph.add_op("act", "Sigmoid", 1, 1);
        graph.connect(x, 0, conv, 0).unwrap();
        graph.connect(conv, 0, act, 0).unwrap();
        graph.mark_graph_output(act).unwrap();

        driver().run_once(&mut graph).unwrap();

        let fused = graph.nodes_of_type("ConvSigmoid");
        assert_eq!(fused.len(), 1);
        assert!(graph.is_graph_output(fused[0]));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_shared_conv_output_skipped() {
        let (mut graph, [_, _, conv, _, _]) = make_test_graph("Relu");
        let other = graph.add_op("other", "Add", 1, 1);
        graph.connect(conv, 0, other, 0).unwrap();
        let before = graph.clone();

        let summary = driver().run_once(&mut graph).unwrap();

        assert_eq!(summary.pass(CONV_ACTIVATION_FUSION).unwrap().not_changed, 1);
        assert_eq!(graph, before);
    }

    #[test]
    fn test_unsupported_fusion_rolled_back() {
        let (mut graph, _) = make_test_graph("Tanh");
        let before = graph.clone();
        let mut driver = PassDriver::new()
            .with_services(HostServices::default().with_support(SupportedOps::new(&["ConvRelu"])));
        driver.register(conv_activation_fusion()).unwrap();

        let summary = driver.run_once(&mut graph).unwrap();

        assert_eq!(summary.changed(), 0);
        assert_eq!(graph, before);
    }
}
