//! Pattern definition and matching
//!
//! This module provides the declarative side of a fusion pass and the
//! matcher that maps it onto a graph.
//!
//! # Overview
//!
//! The pattern matching system works by:
//! 1. Declaring slots (pattern nodes) with accepted operator types and
//!    repeat counts, connected by pattern edges
//! 2. Seeding the search at head slots and following edges outward
//! 3. Backtracking until every slot count and edge constraint holds
//!
//! # Example
//!
//! ```ignore
//! use fusion_engine::pattern::{BranchMode, GraphMatcher, PatternDefinition};
//!
//! let pattern = PatternDefinition::builder("conv_relu")
//!     .add_pattern_node("conv", &["Conv"])
//!     .add_pattern_node("relu", &["Relu"])
//!     .set_head(&["conv"])
//!     .set_outputs("conv", &["relu"], BranchMode::Single)
//!     .build()?;
//!
//! if let Some(m) = GraphMatcher::new(&graph).find_next_match(&pattern) {
//!     println!("conv {:?} feeds relu {:?}", m.first("conv"), m.first("relu"));
//! }
//! ```

pub mod definition;
pub mod matcher;
pub mod ops;
pub mod traversal;

// Re-export main types
pub use definition::{
    BranchMode, PatternBuilder, PatternDefinition, PatternEdge, PatternNode, DEFAULT_REPEAT,
};
pub use matcher::{consumed_nodes, GraphMatcher, Mapping, MatchConfig, MatchMode, SlotBinding};
pub use ops::{
    is_activation, is_constant_op, is_conv_like, is_pass_through, is_quant, ACTIVATIONS,
    CONSTANT_OPS, CONV_LIKE, PASS_THROUGH_OPS, QUANT_OPS,
};
pub use traversal::{has_path, reachable_nodes, BfsIterator, Direction};
