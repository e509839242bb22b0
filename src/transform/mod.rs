//! Graph rewrite module
//!
//! This module provides the mutation side of a fusion pass:
//!
//! - [`RewriteTransaction`]: logged, undoable graph mutation
//! - [`bypass`](bypass::bypass): remove a pass-through node, reconnect neighbours
//! - [`promote`]: const-to-attr promotion
//! - [`fuse`]: collapse matched nodes into one
//! - [`eliminate`]: dead-node removal
//!
//! # Overview
//!
//! Rewrites take `&mut RewriteTransaction` and stop at the first failing
//! step with `?`. They never clean up after themselves: whoever opened the
//! transaction commits it on success and rolls it back on error (dropping
//! it has the same effect).
//!
//! # Example
//!
//! ```ignore
//! use fusion_engine::transform::{bypass, RewriteTransaction};
//!
//! let mut tx = RewriteTransaction::new(&mut graph);
//! match bypass(&mut tx, identity) {
//!     Ok(()) => tx.commit()?,
//!     Err(err) if err.is_recoverable() => tx.rollback(),
//!     Err(err) => return Err(err),
//! }
//! ```

pub mod bypass;
pub mod eliminate;
pub mod fuse;
pub mod promote;
pub mod transaction;

// Re-export main types and functions
pub use bypass::bypass;
pub use eliminate::{detach_and_remove, eliminate_dead_nodes};
pub use fuse::{exclude_output_role_nodes, fuse_nodes, get_matched_nodes, FuseResult};
pub use promote::promote_input_to_attribute;
pub use transaction::{RewriteTransaction, TransactionState};
