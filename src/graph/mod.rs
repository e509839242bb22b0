//! Dataflow graph model
//!
//! This module provides the mutable graph the engine rewrites:
//!
//! - [`GraphModel`]: arena of nodes indexed by stable [`NodeId`]s
//! - [`Node`]: operator kind, ordered data anchors, control peers, attributes
//! - [`AttrValue`]: typed attribute values and constant tensors
//!
//! # Overview
//!
//! Anchors hold ids of their peers, never the peers themselves. An input
//! anchor has at most one producer; an output anchor may feed any number of
//! consumers. Control anchors record precedence and may have several peers
//! on both sides.
//!
//! # Example
//!
//! ```ignore
//! use fusion_engine::graph::GraphModel;
//!
//! let mut graph = GraphModel::new();
//! let conv = graph.add_op("conv_0", "Conv", 2, 1);
//! let relu = graph.add_op("relu_0", "Relu", 1, 1);
//! graph.connect(conv, 0, relu, 0)?;
//!
//! assert_eq!(graph.consumers(conv), vec![relu]);
//! ```

pub mod accessors;
pub mod attr;
pub mod context;
pub mod mutators;
pub mod node;

// Re-export main types
pub use attr::{AttrKind, AttrSpec, AttrValue, Tensor, TensorData};
pub use context::GraphModel;
pub use node::{InAnchor, InputAnchor, Node, NodeId, OutAnchor, OutputAnchor};
