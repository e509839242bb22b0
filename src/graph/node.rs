//! Node and anchor types
//!
//! Nodes live in the [`GraphModel`](super::GraphModel) arena and refer to
//! each other only through ids. An anchor never owns its peer.

use std::fmt;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::attr::AttrValue;

/// Stable node identity within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Address of an output anchor: `(node, output index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OutAnchor {
    /// Owning node
    pub node: NodeId,
    /// Output index
    pub index: usize,
}

impl OutAnchor {
    /// Create an output anchor address
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for OutAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:out{}", self.node, self.index)
    }
}

/// Address of an input anchor: `(node, input index)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InAnchor {
    /// Owning node
    pub node: NodeId,
    /// Input index
    pub index: usize,
}

impl InAnchor {
    /// Create an input anchor address
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

impl fmt::Display for InAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:in{}", self.node, self.index)
    }
}

/// Data input anchor: at most one producer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputAnchor {
    pub(crate) peer: Option<OutAnchor>,
}

impl InputAnchor {
    /// The producer feeding this input, if connected
    pub fn peer(&self) -> Option<OutAnchor> {
        self.peer
    }

    /// Whether a producer is connected
    pub fn is_connected(&self) -> bool {
        self.peer.is_some()
    }
}

/// Data output anchor: any number of consumers (fan-out)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputAnchor {
    pub(crate) peers: SmallVec<[InAnchor; 4]>,
}

impl OutputAnchor {
    /// Consumers of this output, in link order
    pub fn peers(&self) -> &[InAnchor] {
        &self.peers
    }

    /// Number of consumers
    pub fn fan_out(&self) -> usize {
        self.peers.len()
    }
}

/// A dataflow node
///
/// The `id` is assigned by the graph on insertion; a node built with
/// [`Node::new`] carries a placeholder until then.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) op_type: String,
    pub(crate) inputs: Vec<InputAnchor>,
    pub(crate) outputs: Vec<OutputAnchor>,
    pub(crate) control_in: SmallVec<[NodeId; 2]>,
    pub(crate) control_out: SmallVec<[NodeId; 2]>,
    pub(crate) attributes: IndexMap<String, AttrValue>,
}

impl Node {
    /// Create an unattached node with `inputs` input and `outputs` output anchors
    pub fn new(name: &str, op_type: &str, inputs: usize, outputs: usize) -> Self {
        Self {
            id: NodeId(u32::MAX),
            name: name.to_string(),
            op_type: op_type.to_string(),
            inputs: vec![InputAnchor::default(); inputs],
            outputs: vec![OutputAnchor::default(); outputs],
            control_in: SmallVec::new(),
            control_out: SmallVec::new(),
            attributes: IndexMap::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attr(mut self, name: &str, value: AttrValue) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// Node id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operator kind
    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    /// Input anchors in order
    pub fn inputs(&self) -> &[InputAnchor] {
        &self.inputs
    }

    /// Output anchors in order
    pub fn outputs(&self) -> &[OutputAnchor] {
        &self.outputs
    }

    /// Control predecessors
    pub fn control_in(&self) -> &[NodeId] {
        &self.control_in
    }

    /// Control successors
    pub fn control_out(&self) -> &[NodeId] {
        &self.control_out
    }

    /// All attributes in insertion order
    pub fn attributes(&self) -> &IndexMap<String, AttrValue> {
        &self.attributes
    }

    /// Attribute by name
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Whether no anchor of this node has a peer
    pub fn is_isolated(&self) -> bool {
        self.inputs.iter().all(|a| a.peer.is_none())
            && self.outputs.iter().all(|a| a.peers.is_empty())
            && self.control_in.is_empty()
            && self.control_out.is_empty()
    }

    /// Total number of data consumers over all outputs
    pub fn consumer_count(&self) -> usize {
        self.outputs.iter().map(|a| a.peers.len()).sum()
    }

    /// Number of connected data inputs
    pub fn connected_inputs(&self) -> usize {
        self.inputs.iter().filter(|a| a.peer.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_new() {
        let node = Node::new("conv_0", "Conv", 3, 1);
        assert_eq!(node.op_type(), "Conv");
        assert_eq!(node.inputs().len(), 3);
        assert_eq!(node.outputs().len(), 1);
        assert!(node.is_isolated());
    }

    #[test]
    fn test_with_attr() {
        let node = Node::new("c", "Const", 0, 1).with_attr("value", AttrValue::Int(7));
        assert_eq!(node.attr("value"), Some(&AttrValue::Int(7)));
        assert!(node.attr("missing").is_none());
    }

    #[test]
    fn test_anchor_display() {
        assert_eq!(OutAnchor::new(NodeId(2), 0).to_string(), "n2:out0");
        assert_eq!(InAnchor::new(NodeId(5), 1).to_string(), "n5:in1");
    }
}
