//! # Fusion Engine
//!
//! Declarative pattern matching and transactional rewriting for
//! dataflow-graph fusion passes.
//!
//! Passes supply a small pattern description and a rewrite callback; the
//! engine finds the subgraphs, runs the callback inside a transaction and
//! commits or rolls back depending on the outcome.
//!
//! ## Features
//!
//! - **Pattern Matching**: slots with type sets, repeat counts, fan-out
//!   modes and output roles, matched by a backtracking search
//! - **Transactions**: every mutation is logged; rollback restores the graph
//!   exactly, commit re-validates touched nodes
//! - **Rewrites**: bypass, const-to-attr promotion, node fusion and
//!   dead-node elimination
//! - **Driver**: staged pass registry, per-round summaries, fixed-point loop
//!
//! ## Example
//!
//! ```ignore
//! use fusion_engine::prelude::*;
//!
//! let mut driver = PassDriver::new();
//! register_builtin(&mut driver, &[])?;
//!
//! let report = run_until_fixed_point(&driver, &mut graph, DEFAULT_MAX_ROUNDS)?;
//! println!("{}", report.summary);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod driver;
pub mod error;
pub mod graph;
pub mod passes;
pub mod pattern;
pub mod traits;
pub mod transform;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use fusion_engine::prelude::*`
pub mod prelude {
    pub use crate::driver::{
        run_until_fixed_point, DriverConfig, HostServices, Pass, PassDriver, PassOutcome,
        PassStage, RewriteContext, Summary, DEFAULT_MAX_ROUNDS,
    };
    pub use crate::error::{FusionError, FusionResult};
    pub use crate::graph::{
        AttrKind, AttrSpec, AttrValue, GraphModel, InAnchor, Node, NodeId, OutAnchor, Tensor,
    };
    pub use crate::passes::{register_builtin, ConstToAttrRule};
    pub use crate::pattern::{BranchMode, GraphMatcher, Mapping, PatternDefinition};
    pub use crate::traits::{ConstantOracle, NodeFactory, OpSupportOracle};
    pub use crate::transform::RewriteTransaction;
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use error::{FusionError, FusionResult};
pub use graph::GraphModel;

// ============================================================================
// Version information
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
