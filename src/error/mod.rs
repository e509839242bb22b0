//! Error types for fusion-engine
//!
//! This module defines all error types used throughout the crate.
//!
//! "No match found" is deliberately absent: the matcher reports it as
//! `None`, and passes report it as [`crate::driver::PassOutcome::NotChanged`].

use thiserror::Error;

use crate::graph::NodeId;

/// Main error type for pattern definition and graph rewriting
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    /// Malformed pattern definition (fatal at pass registration)
    #[error("Invalid pattern definition `{pattern}`: {reason}")]
    Definition {
        /// Pattern name
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// A relink would give a single-peer anchor a second peer
    #[error("Edge conflict: {0}")]
    EdgeConflict(String),

    /// Const-to-attr precondition unmet
    #[error("Input {index} of node {node} is not a usable compile-time constant")]
    NotConstant {
        /// Node whose input was inspected
        node: NodeId,
        /// Input anchor index
        index: usize,
    },

    /// Removal of a node that still has peers, or of a protected node
    #[error("Structural invariant violated at node {node}: {reason}")]
    StructuralInvariant {
        /// Offending node
        node: NodeId,
        /// Description of the violation
        reason: String,
    },

    /// Node id not present in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Anchor index beyond the node's anchor list
    #[error("Node {node} has no {kind} anchor at index {index}")]
    AnchorOutOfRange {
        /// Node id
        node: NodeId,
        /// Requested index
        index: usize,
        /// "input" or "output"
        kind: &'static str,
    },

    /// Fusing the requested node set would create a cycle
    #[error("Fusion would introduce a cycle through node {0}")]
    CycleDetected(NodeId),

    /// A pass with this name is already registered
    #[error("Pass already registered: {0}")]
    DuplicatePass(String),

    /// A rewrite reported failure while the driver runs in fail-fast mode
    #[error("Pass `{pass}` failed on pattern `{pattern}`")]
    PassFailed {
        /// Pass name
        pass: String,
        /// Pattern definition name
        pattern: String,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FusionError {
    /// Create a definition error for the named pattern
    pub fn definition(pattern: &str, reason: impl Into<String>) -> Self {
        FusionError::Definition {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a structural invariant violation
    pub fn structural(node: NodeId, reason: impl Into<String>) -> Self {
        FusionError::StructuralInvariant {
            node,
            reason: reason.into(),
        }
    }

    /// Whether the error is local to a single match
    ///
    /// Recoverable errors roll back the current transaction and the driver
    /// moves on to the next match. Everything else is a programmer or
    /// configuration error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FusionError::EdgeConflict(_)
                | FusionError::NotConstant { .. }
                | FusionError::StructuralInvariant { .. }
                | FusionError::CycleDetected(_)
                | FusionError::NodeNotFound(_)
                | FusionError::AnchorOutOfRange { .. }
        )
    }
}

/// Result type alias for engine operations
pub type FusionResult<T> = Result<T, FusionError>;
