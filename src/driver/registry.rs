//! Passes and the pass registry
//!
//! A pass is a plain value: a name, a stage, a provider of pattern
//! definitions and a rewrite callback. There is no pass trait hierarchy and
//! no process-wide registry; each [`PassRegistry`] belongs to whoever owns
//! the driver.

use std::fmt;

use tracing::{debug, warn};

use crate::error::{FusionError, FusionResult};
use crate::graph::GraphModel;
use crate::pattern::{Mapping, PatternDefinition};
use crate::traits::{
    AcceptAll, AttrConstantOracle, ConstantOracle, DefaultNodeFactory, NodeFactory,
    OpSupportOracle,
};
use crate::transform::RewriteTransaction;

use super::config::PassStage;

/// Result of one rewrite callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The graph was rewritten; commit
    Changed,
    /// The match was unsuitable; roll back
    NotChanged,
    /// The rewrite went wrong; roll back and log
    Failed,
}

impl PassOutcome {
    /// Classify a rewrite result
    ///
    /// `Ok(true)` is `Changed`, `Ok(false)` and `NotConstant` are
    /// `NotChanged`, every other error is `Failed`.
    pub fn from_result(result: &FusionResult<bool>) -> Self {
        match result {
            Ok(true) => PassOutcome::Changed,
            Ok(false) | Err(FusionError::NotConstant { .. }) => PassOutcome::NotChanged,
            Err(_) => PassOutcome::Failed,
        }
    }
}

impl fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassOutcome::Changed => "changed",
            PassOutcome::NotChanged => "not-changed",
            PassOutcome::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Capabilities supplied by the host compiler
pub struct HostServices {
    /// Builds replacement nodes
    pub factory: Box<dyn NodeFactory>,
    /// Answers constant-value queries
    pub constants: Box<dyn ConstantOracle>,
    /// Answers op-support queries
    pub support: Box<dyn OpSupportOracle>,
}

impl Default for HostServices {
    fn default() -> Self {
        Self {
            factory: Box::new(DefaultNodeFactory),
            constants: Box::new(AttrConstantOracle),
            support: Box::new(AcceptAll),
        }
    }
}

impl HostServices {
    /// Replace the node factory
    pub fn with_factory(mut self, factory: impl NodeFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// Replace the constant oracle
    pub fn with_constants(mut self, constants: impl ConstantOracle + 'static) -> Self {
        self.constants = Box::new(constants);
        self
    }

    /// Replace the op-support oracle
    pub fn with_support(mut self, support: impl OpSupportOracle + 'static) -> Self {
        self.support = Box::new(support);
        self
    }
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}

/// What a rewrite callback gets to work with
pub struct RewriteContext<'t, 'g> {
    /// Open transaction on the graph
    pub tx: &'t mut RewriteTransaction<'g>,
    /// Pattern that produced the mapping
    pub pattern: &'t PatternDefinition,
    /// Host capabilities
    pub services: &'t HostServices,
}

impl RewriteContext<'_, '_> {
    /// The graph in its current state
    pub fn graph(&self) -> &GraphModel {
        self.tx.graph()
    }
}

/// Produces a pass's pattern definitions
pub type DefinitionsProvider = Box<dyn Fn() -> FusionResult<Vec<PatternDefinition>>>;

/// Rewrites one mapping
pub type RewriteFn = Box<dyn Fn(&mut RewriteContext<'_, '_>, &Mapping) -> PassOutcome>;

fn boxed_rewrite<F>(rewrite: F) -> RewriteFn
where
    F: Fn(&mut RewriteContext<'_, '_>, &Mapping) -> PassOutcome + 'static,
{
    Box::new(rewrite)
}

/// A named (definitions, rewrite) pair
pub struct Pass {
    name: String,
    stage: PassStage,
    provider: DefinitionsProvider,
    rewrite: RewriteFn,
}

impl Pass {
    /// Create a pass in the [`PassStage::BuiltIn`] stage
    pub fn new<P, R>(name: &str, provider: P, rewrite: R) -> Self
    where
        P: Fn() -> FusionResult<Vec<PatternDefinition>> + 'static,
        R: Fn(&mut RewriteContext<'_, '_>, &Mapping) -> PassOutcome + 'static,
    {
        Self {
            name: name.to_string(),
            stage: PassStage::default(),
            provider: Box::new(provider),
            rewrite: boxed_rewrite(rewrite),
        }
    }

    /// Create a pass whose rewrite reports through `FusionResult<bool>`
    ///
    /// The result is classified with [`PassOutcome::from_result`]; errors
    /// are logged.
    pub fn fallible<P, R>(name: &str, provider: P, rewrite: R) -> Self
    where
        P: Fn() -> FusionResult<Vec<PatternDefinition>> + 'static,
        R: Fn(&mut RewriteContext<'_, '_>, &Mapping) -> FusionResult<bool> + 'static,
    {
        let pass_name = name.to_string();
        Self::new(name, provider, move |ctx, mapping| {
            let result = rewrite(ctx, mapping);
            let outcome = PassOutcome::from_result(&result);
            if let Err(err) = &result {
                match outcome {
                    PassOutcome::Failed => warn!(
                        pass = %pass_name,
                        pattern = mapping.pattern_name(),
                        error = %err,
                        "rewrite failed"
                    ),
                    _ => debug!(
                        pass = %pass_name,
                        pattern = mapping.pattern_name(),
                        error = %err,
                        "rewrite declined"
                    ),
                }
            }
            outcome
        })
    }

    /// Move the pass to another stage
    pub fn in_stage(mut self, stage: PassStage) -> Self {
        self.stage = stage;
        self
    }

    /// Pass name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pass stage
    pub fn stage(&self) -> PassStage {
        self.stage
    }

    /// Run the rewrite callback
    pub fn rewrite(&self, ctx: &mut RewriteContext<'_, '_>, mapping: &Mapping) -> PassOutcome {
        (self.rewrite)(ctx, mapping)
    }
}

impl fmt::Debug for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pass")
            .field("name", &self.name)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

/// A pass together with its built definitions
#[derive(Debug)]
pub struct RegisteredPass {
    pass: Pass,
    definitions: Vec<PatternDefinition>,
}

impl RegisteredPass {
    /// The pass
    pub fn pass(&self) -> &Pass {
        &self.pass
    }

    /// Definitions produced at registration
    pub fn definitions(&self) -> &[PatternDefinition] {
        &self.definitions
    }
}

/// Ordered set of passes
#[derive(Debug, Default)]
pub struct PassRegistry {
    passes: Vec<RegisteredPass>,
}

impl PassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pass, building its pattern definitions now
    ///
    /// Fails with `DuplicatePass` for a reused name and with the provider's
    /// `Definition` error for a malformed pattern.
    pub fn register(&mut self, pass: Pass) -> FusionResult<()> {
        if self.contains(pass.name()) {
            return Err(FusionError::DuplicatePass(pass.name().to_string()));
        }
        let definitions = (pass.provider)()?;
        debug!(pass = pass.name(), stage = ?pass.stage(), definitions = definitions.len(), "pass registered");
        self.passes.push(RegisteredPass { pass, definitions });
        Ok(())
    }

    /// Check if a pass with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.passes.iter().any(|p| p.pass.name() == name)
    }

    /// Number of registered passes
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Check if no pass is registered
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Pass names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.pass.name()).collect()
    }

    /// Passes of one stage, in registration order
    pub fn in_stage(&self, stage: PassStage) -> impl Iterator<Item = &RegisteredPass> {
        self.passes.iter().filter(move |p| p.pass.stage() == stage)
    }
}
