//! Built-in fusion passes
//!
//! Each pass is a plain [`Pass`] value: a static pattern plus a small
//! rewrite callback. All of the search and mutation machinery lives in
//! [`crate::pattern`] and [`crate::transform`].
//!
//! - [`pass_through_elimination`]: bypass Identity-like nodes
//! - [`const_to_attr`]: fold a constant input into an attribute
//! - [`conv_activation_fusion`]: fold an activation into its convolution
//! - [`dead_constant_elimination`]: drop unread constants (second stage)

pub mod const_to_attr;
pub mod conv_activation;
pub mod dead_constant;
pub mod pass_through;

pub use const_to_attr::{const_to_attr, ConstToAttrRule};
pub use conv_activation::{conv_activation_fusion, ACTIVATION_ATTR, CONV_ACTIVATION_FUSION};
pub use dead_constant::{dead_constant_elimination, DEAD_CONSTANT_ELIMINATION};
pub use pass_through::{pass_through_elimination, PASS_THROUGH_ELIMINATION};

use crate::driver::{Pass, PassDriver};
use crate::error::FusionResult;

/// The rule-free built-in passes, in registration order
pub fn builtin_passes() -> Vec<Pass> {
    vec![
        pass_through_elimination(),
        conv_activation_fusion(),
        dead_constant_elimination(),
    ]
}

/// Register the built-in passes plus one const-to-attr pass per rule
///
/// Const-to-attr passes run after pass-through elimination so constants
/// hidden behind an Identity are already exposed.
pub fn register_builtin(driver: &mut PassDriver, rules: &[ConstToAttrRule]) -> FusionResult<()> {
    let mut passes = builtin_passes().into_iter();
    if let Some(first) = passes.next() {
        driver.register(first)?;
    }
    for rule in rules {
        driver.register(const_to_attr(rule.clone()))?;
    }
    for pass in passes {
        driver.register(pass)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::run_until_fixed_point;
    use crate::graph::{AttrKind, AttrSpec, AttrValue, GraphModel, Node, Tensor};

    #[test]
    fn test_register_builtin_order() {
        let mut driver = PassDriver::new();
        let rule = ConstToAttrRule::new("Pad", 1, "PadStatic", AttrSpec::new("pads", AttrKind::Ints));
        register_builtin(&mut driver, &[rule]).unwrap();

        assert_eq!(
            driver.registry().names(),
            vec![
                PASS_THROUGH_ELIMINATION,
                "const_to_attr_pad",
                CONV_ACTIVATION_FUSION,
                DEAD_CONSTANT_ELIMINATION,
            ]
        );
    }

    #[test]
    fn test_builtin_pipeline() {
        // x -> conv -> identity -> relu ; shape -> identity2 -> reshape(relu, shape)
        let mut graph = GraphModel::new();
        let x = graph.add_op("x", "Input", 0, 1);
        let conv = graph.add_op("conv", "Conv", 1, 1);
        let identity = graph.add_op("identity", "Identity", 1, 1);
        let relu = graph.add_op("relu", "Relu", 1, 1);
        let shape = graph.add_node(
            Node::new("shape", "Const", 0, 1)
                .with_attr("value", AttrValue::Tensor(Tensor::from_i64s(vec![4, 4]))),
        );
        let identity2 = graph.add_op("identity2", "Identity", 1, 1);
        let reshape = graph.add_op("reshape", "Reshape", 2, 1);
        graph.connect(x, 0, conv, 0).unwrap();
        graph.connect(conv, 0, identity, 0).unwrap();
        graph.connect(identity, 0, relu, 0).unwrap();
        graph.connect(relu, 0, reshape, 0).unwrap();
        graph.connect(shape, 0, identity2, 0).unwrap();
        graph.connect(identity2, 0, reshape, 1).unwrap();
        graph.mark_graph_output(reshape).unwrap();

        let mut driver = PassDriver::new();
        let rule = ConstToAttrRule::new(
            "Reshape",
            1,
            "ReshapeStatic",
            AttrSpec::new("shape", AttrKind::Ints),
        );
        register_builtin(&mut driver, &[rule]).unwrap();
        let report = run_until_fixed_point(&driver, &mut graph, 8).unwrap();

        assert!(report.converged);
        let mut types: Vec<_> = graph.nodes().map(|n| n.op_type().to_string()).collect();
        types.sort();
        assert_eq!(types, vec!["ConvRelu", "Input", "ReshapeStatic"]);
        assert_eq!(graph.graph_outputs().count(), 1);
        assert!(graph.validate().is_ok());
    }
}
