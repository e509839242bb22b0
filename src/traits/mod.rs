//! Host capabilities
//!
//! The engine never decides on its own how nodes are built, how constants
//! are represented, or which operators the downstream compiler accepts.
//! The host supplies those answers through the traits below; simple
//! defaults are provided for tests and standalone use.

use crate::error::FusionResult;
use crate::graph::{AttrValue, GraphModel, Node, OutAnchor};
use crate::pattern::is_constant_op;

/// Creates replacement nodes
///
/// # Example
///
/// ```ignore
/// struct NamedFactory;
///
/// impl NodeFactory for NamedFactory {
///     fn create(&self, op_type: &str, name: &str, inputs: usize, outputs: usize) -> FusionResult<Node> {
///         Ok(Node::new(&format!("{name}_fused"), op_type, inputs, outputs))
///     }
/// }
/// ```
pub trait NodeFactory {
    /// Build a detached node with the given anchor counts
    fn create(&self, op_type: &str, name: &str, inputs: usize, outputs: usize)
        -> FusionResult<Node>;
}

/// Factory that builds plain [`Node`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNodeFactory;

impl NodeFactory for DefaultNodeFactory {
    fn create(
        &self,
        op_type: &str,
        name: &str,
        inputs: usize,
        outputs: usize,
    ) -> FusionResult<Node> {
        Ok(Node::new(name, op_type, inputs, outputs))
    }
}

/// Answers whether an output anchor carries a compile-time constant
pub trait ConstantOracle {
    /// The constant value produced at `anchor`, if it is one
    fn constant_value(&self, graph: &GraphModel, anchor: OutAnchor) -> Option<AttrValue>;

    /// Check if `anchor` produces a compile-time constant
    fn is_constant(&self, graph: &GraphModel, anchor: OutAnchor) -> bool {
        self.constant_value(graph, anchor).is_some()
    }
}

/// Reads constants from the `value` attribute of `Const`/`Constant` nodes
#[derive(Debug, Clone, Copy, Default)]
pub struct AttrConstantOracle;

impl AttrConstantOracle {
    /// Attribute holding the constant payload
    pub const VALUE_ATTR: &'static str = "value";
}

impl ConstantOracle for AttrConstantOracle {
    fn constant_value(&self, graph: &GraphModel, anchor: OutAnchor) -> Option<AttrValue> {
        let node = graph.node(anchor.node)?;
        if !is_constant_op(node.op_type()) || anchor.index != 0 {
            return None;
        }
        node.attr(Self::VALUE_ATTR).cloned()
    }
}

/// Answers whether the downstream compiler accepts a node
pub trait OpSupportOracle {
    /// Check if a node of this shape would be accepted
    fn is_supported(&self, node: &Node) -> bool;
}

/// Accepts every node
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl OpSupportOracle for AcceptAll {
    fn is_supported(&self, _node: &Node) -> bool {
        true
    }
}

/// Accepts nodes whose type appears in a fixed list
#[derive(Debug, Clone, Default)]
pub struct SupportedOps {
    op_types: Vec<String>,
}

impl SupportedOps {
    /// Create from a list of supported op types
    pub fn new(op_types: &[&str]) -> Self {
        Self {
            op_types: op_types.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl OpSupportOracle for SupportedOps {
    fn is_supported(&self, node: &Node) -> bool {
        self.op_types.iter().any(|t| t == node.op_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_factory() {
        let node = DefaultNodeFactory.create("Relu", "relu_new", 1, 1).unwrap();
        assert_eq!(node.op_type(), "Relu");
        assert_eq!(node.name(), "relu_new");
        assert_eq!(node.inputs().len(), 1);
    }

    #[test]
    fn test_attr_constant_oracle() {
        let mut graph = GraphModel::new();
        let c = graph.add_node(
            Node::new("c", "Const", 0, 1).with_attr("value", AttrValue::Int(7)),
        );
        let r = graph.add_op("r", "Relu", 1, 1);

        let oracle = AttrConstantOracle;
        assert_eq!(
            oracle.constant_value(&graph, OutAnchor::new(c, 0)),
            Some(AttrValue::Int(7))
        );
        assert!(!oracle.is_constant(&graph, OutAnchor::new(r, 0)));
    }

    #[test]
    fn test_support_oracles() {
        let node = Node::new("x", "Conv", 2, 1);
        assert!(AcceptAll.is_supported(&node));
        assert!(SupportedOps::new(&["Conv", "Relu"]).is_supported(&node));
        assert!(!SupportedOps::new(&["Relu"]).is_supported(&node));
    }
}
