//! Pass driver
//!
//! This module applies registered passes to a graph:
//!
//! - [`PassDriver`]: owns the registry, host services and configuration
//! - [`Pass`]: a named (pattern definitions, rewrite callback) pair
//! - [`Summary`]: per-pass match and rewrite counters
//!
//! # Overview
//!
//! One call to [`PassDriver::run_once`] is one round. For every pass, in
//! stage order and then registration order, and for every pattern
//! definition of that pass, the driver repeatedly:
//!
//! 1. Asks the matcher for the next mapping that avoids nodes already
//!    consumed by this pass in this round and nodes created in this round
//! 2. Opens a [`RewriteTransaction`] and runs the rewrite callback
//! 3. Commits on `Changed`, rolls back on `NotChanged` or `Failed`
//!
//! Iterating rounds to a fixed point is the caller's job;
//! [`run_until_fixed_point`] is a ready-made loop for it.
//!
//! # Example
//!
//! ```ignore
//! use fusion_engine::driver::{PassDriver, run_until_fixed_point};
//! use fusion_engine::passes::pass_through_elimination;
//!
//! let mut driver = PassDriver::new();
//! driver.register(pass_through_elimination())?;
//!
//! let summary = driver.run_once(&mut graph)?;
//! println!("{summary}");
//! ```

pub mod config;
pub mod registry;
pub mod summary;

pub use config::{DriverConfig, PassStage, DEFAULT_MAX_ROUNDS};
pub use registry::{
    DefinitionsProvider, HostServices, Pass, PassOutcome, PassRegistry, RegisteredPass,
    RewriteContext, RewriteFn,
};
pub use summary::{PassStats, Summary};

use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use crate::error::{FusionError, FusionResult};
use crate::graph::{GraphModel, NodeId};
use crate::pattern::{consumed_nodes, GraphMatcher, Mapping, PatternDefinition};
use crate::transform::RewriteTransaction;

/// Applies registered passes to a graph
#[derive(Debug, Default)]
pub struct PassDriver {
    registry: PassRegistry,
    services: HostServices,
    config: DriverConfig,
}

impl PassDriver {
    /// Create a driver with default services and configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the driver
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the host services
    pub fn with_services(mut self, services: HostServices) -> Self {
        self.services = services;
        self
    }

    /// Current configuration
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Registered passes
    pub fn registry(&self) -> &PassRegistry {
        &self.registry
    }

    /// Register a pass value
    pub fn register(&mut self, pass: Pass) -> FusionResult<()> {
        self.registry.register(pass)
    }

    /// Register a pass in the built-in stage from its parts
    ///
    /// Pattern definitions are built immediately, so a malformed pattern
    /// fails here rather than during a run.
    pub fn register_pass<P, R>(&mut self, name: &str, provider: P, rewrite: R) -> FusionResult<()>
    where
        P: Fn() -> FusionResult<Vec<PatternDefinition>> + 'static,
        R: Fn(&mut RewriteContext<'_, '_>, &Mapping) -> PassOutcome + 'static,
    {
        self.register(Pass::new(name, provider, rewrite))
    }

    /// Register a pass in a specific stage from its parts
    pub fn register_pass_in_stage<P, R>(
        &mut self,
        stage: PassStage,
        name: &str,
        provider: P,
        rewrite: R,
    ) -> FusionResult<()>
    where
        P: Fn() -> FusionResult<Vec<PatternDefinition>> + 'static,
        R: Fn(&mut RewriteContext<'_, '_>, &Mapping) -> PassOutcome + 'static,
    {
        self.register(Pass::new(name, provider, rewrite).in_stage(stage))
    }

    /// Run one round over every configured stage
    ///
    /// Errors only in fail-fast mode, when a rewrite reports `Failed`.
    pub fn run_once(&self, graph: &mut GraphModel) -> FusionResult<Summary> {
        let horizon = graph.next_id();
        let mut summary = Summary::new();

        for stage in self.config.ordered_stages() {
            self.run_stage_below(stage, graph, horizon, &mut summary)?;
        }
        summary.set_rounds(1);

        info!(
            nodes = graph.node_count(),
            matched = summary.matched(),
            changed = summary.changed(),
            failed = summary.failed(),
            "pass round finished"
        );
        Ok(summary)
    }

    /// Run one round of a single stage
    pub fn run_stage(&self, stage: PassStage, graph: &mut GraphModel) -> FusionResult<Summary> {
        let horizon = graph.next_id();
        let mut summary = Summary::new();
        self.run_stage_below(stage, graph, horizon, &mut summary)?;
        summary.set_rounds(1);
        Ok(summary)
    }

    fn run_stage_below(
        &self,
        stage: PassStage,
        graph: &mut GraphModel,
        horizon: NodeId,
        summary: &mut Summary,
    ) -> FusionResult<()> {
        for registered in self.registry.in_stage(stage) {
            let pass = registered.pass();
            summary.ensure_pass(pass.name());

            let mut consumed: FxHashSet<NodeId> = FxHashSet::default();
            for pattern in registered.definitions() {
                self.run_pattern(pass, pattern, graph, horizon, &mut consumed, summary)?;
            }
        }
        Ok(())
    }

    fn run_pattern(
        &self,
        pass: &Pass,
        pattern: &PatternDefinition,
        graph: &mut GraphModel,
        horizon: NodeId,
        consumed: &mut FxHashSet<NodeId>,
        summary: &mut Summary,
    ) -> FusionResult<()> {
        let mut attempts = 0usize;

        loop {
            if self.config.match_budget.is_some_and(|budget| attempts >= budget) {
                debug!(pass = pass.name(), pattern = pattern.name(), "match budget exhausted");
                break;
            }

            let Some(mapping) = GraphMatcher::new(graph)
                .excluding(consumed)
                .below(horizon)
                .find_next_match(pattern)
            else {
                break;
            };
            attempts += 1;

            let outcome = self.apply(pass, pattern, graph, &mapping);

            let before = consumed.len();
            if outcome == PassOutcome::Changed {
                consumed.extend(consumed_nodes(pattern, &mapping));
            }
            if consumed.len() == before {
                consumed.extend(mapping.nodes());
            }

            summary.record(pass.name(), outcome);
            if outcome == PassOutcome::Failed {
                warn!(
                    pass = pass.name(),
                    pattern = pattern.name(),
                    nodes = ?mapping.nodes(),
                    "pass failed on match"
                );
                if self.config.fail_fast {
                    return Err(FusionError::PassFailed {
                        pass: pass.name().to_string(),
                        pattern: pattern.name().to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn apply(
        &self,
        pass: &Pass,
        pattern: &PatternDefinition,
        graph: &mut GraphModel,
        mapping: &Mapping,
    ) -> PassOutcome {
        let mut tx = RewriteTransaction::new(graph);
        let outcome = {
            let mut ctx = RewriteContext {
                tx: &mut tx,
                pattern,
                services: &self.services,
            };
            pass.rewrite(&mut ctx, mapping)
        };

        match outcome {
            PassOutcome::Changed if tx.is_unchanged() => {
                debug!(pass = pass.name(), "rewrite reported a change without mutating");
                PassOutcome::NotChanged
            }
            PassOutcome::Changed => match tx.commit() {
                Ok(()) => PassOutcome::Changed,
                Err(err) => {
                    warn!(pass = pass.name(), error = %err, "commit rejected");
                    PassOutcome::Failed
                }
            },
            PassOutcome::NotChanged | PassOutcome::Failed => {
                tx.rollback();
                outcome
            }
        }
    }
}

/// Outcome of [`run_until_fixed_point`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedPointReport {
    /// Whether the last round changed nothing
    pub converged: bool,
    /// Counters over every round
    pub summary: Summary,
}

/// Run rounds until one changes nothing or `max_rounds` is reached
pub fn run_until_fixed_point(
    driver: &PassDriver,
    graph: &mut GraphModel,
    max_rounds: usize,
) -> FusionResult<FixedPointReport> {
    let mut summary = Summary::new();

    for round in 0..max_rounds {
        let round_summary = driver.run_once(graph)?;
        let changed = round_summary.changed();
        summary.merge(&round_summary);
        debug!(round, changed, "fixed-point round");

        if changed == 0 {
            return Ok(FixedPointReport {
                converged: true,
                summary,
            });
        }
    }

    warn!(max_rounds, "fixed point not reached");
    Ok(FixedPointReport {
        converged: false,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::bypass;

    // conv -> id1 -> id2 -> relu
    fn make_test_graph() -> GraphModel {
        let mut graph = GraphModel::new();
        let conv = graph.add_op("conv", "Conv", 1, 1);
        let id1 = graph.add_op("id1", "Identity", 1, 1);
        let id2 = graph.add_op("id2", "Identity", 1, 1);
        let relu = graph.add_op("relu", "Relu", 1, 1);
        graph.connect(conv, 0, id1, 0).unwrap();
        graph.connect(id1, 0, id2, 0).unwrap();
        graph.connect(id2, 0, relu, 0).unwrap();
        graph
    }

    fn identity_pattern() -> FusionResult<Vec<PatternDefinition>> {
        Ok(vec![PatternDefinition::builder("identity")
            .add_pattern_node("node", &["Identity"])
            .set_head(&["node"])
            .build()?])
    }

    fn bypass_rewrite(ctx: &mut RewriteContext<'_, '_>, mapping: &Mapping) -> PassOutcome {
        let Some(node) = mapping.first("node") else {
            return PassOutcome::NotChanged;
        };
        PassOutcome::from_result(&bypass(ctx.tx, node).map(|_| true))
    }

    #[test]
    fn test_run_once_bypasses_all() {
        let mut graph = make_test_graph();
        let mut driver = PassDriver::new();
        driver.register_pass("bypass_identity", identity_pattern, bypass_rewrite).unwrap();

        let summary = driver.run_once(&mut graph).unwrap();
        let stats = summary.pass("bypass_identity").unwrap();
        assert_eq!(stats.applied, 2);
        assert_eq!(graph.node_count(), 2);
        assert!(graph.validate().is_ok());

        let second = driver.run_once(&mut graph).unwrap();
        assert_eq!(second.changed(), 0);
        assert!(second.pass("bypass_identity").is_some());
    }

    #[test]
    fn test_not_changed_rolls_back_and_consumes() {
        let mut graph = make_test_graph();
        let before = graph.clone();
        let mut driver = PassDriver::new();
        driver
            .register_pass("mutate_then_decline", identity_pattern, |ctx, mapping| {
                if let Some(node) = mapping.first("node") {
                    let _ = ctx.tx.set_op_type(node, "Copy");
                }
                PassOutcome::NotChanged
            })
            .unwrap();

        let summary = driver.run_once(&mut graph).unwrap();
        let stats = summary.pass("mutate_then_decline").unwrap();
        assert_eq!((stats.matched, stats.not_changed), (2, 2));
        assert_eq!(graph, before);
    }

    #[test]
    fn test_failed_continues_unless_fail_fast() {
        let mut graph = make_test_graph();
        let mut driver = PassDriver::new();
        driver
            .register_pass("always_fails", identity_pattern, |_, _| PassOutcome::Failed)
            .unwrap();

        let summary = driver.run_once(&mut graph).unwrap();
        assert_eq!(summary.failed(), 2);

        let mut strict = PassDriver::new().with_config(DriverConfig::new().with_fail_fast(true));
        strict
            .register_pass("always_fails", identity_pattern, |_, _| PassOutcome::Failed)
            .unwrap();
        let err = strict.run_once(&mut graph).unwrap_err();
        assert!(matches!(err, FusionError::PassFailed { .. }));
    }

    #[test]
    fn test_match_budget() {
        let mut graph = make_test_graph();
        let mut driver = PassDriver::new().with_config(DriverConfig::new().with_match_budget(1));
        driver.register_pass("bypass_identity", identity_pattern, bypass_rewrite).unwrap();

        let summary = driver.run_once(&mut graph).unwrap();
        assert_eq!(summary.changed(), 1);
        assert_eq!(graph.nodes_of_type("Identity").len(), 1);
    }

    #[test]
    fn test_new_nodes_invisible_until_next_round() {
        // Replaces every Identity with a fresh Identity: would never terminate
        // if new nodes were matchable in the same round
        let mut graph = make_test_graph();
        let mut driver = PassDriver::new();
        driver
            .register_pass("respawn", identity_pattern, |ctx, mapping| {
                let Some(node) = mapping.first("node") else {
                    return PassOutcome::NotChanged;
                };
                ctx.tx.add_op("fresh", "Identity", 0, 0);
                match ctx.tx.set_op_type(node, "Copy") {
                    Ok(()) => PassOutcome::Changed,
                    Err(_) => PassOutcome::Failed,
                }
            })
            .unwrap();

        let summary = driver.run_once(&mut graph).unwrap();
        assert_eq!(summary.changed(), 2);
        assert_eq!(graph.nodes_of_type("Identity").len(), 2);
    }

    #[test]
    fn test_stage_order() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut graph = make_test_graph();
        let mut driver = PassDriver::new();

        let second_log = Rc::clone(&log);
        driver
            .register_pass_in_stage(PassStage::SecondRound, "late", identity_pattern, move |_, _| {
                second_log.borrow_mut().push("late");
                PassOutcome::NotChanged
            })
            .unwrap();
        let first_log = Rc::clone(&log);
        driver
            .register_pass("early", identity_pattern, move |_, _| {
                first_log.borrow_mut().push("early");
                PassOutcome::NotChanged
            })
            .unwrap();

        driver.run_once(&mut graph).unwrap();
        assert_eq!(*log.borrow(), vec!["early", "early", "late", "late"]);

        log.borrow_mut().clear();
        driver.run_stage(PassStage::SecondRound, &mut graph).unwrap();
        assert_eq!(*log.borrow(), vec!["late", "late"]);
    }

    #[test]
    fn test_run_until_fixed_point() {
        let mut graph = make_test_graph();
        let mut driver = PassDriver::new();
        driver.register_pass("bypass_identity", identity_pattern, bypass_rewrite).unwrap();

        let report = run_until_fixed_point(&driver, &mut graph, DEFAULT_MAX_ROUNDS).unwrap();
        assert!(report.converged);
        assert_eq!(report.summary.rounds(), 2);
        assert_eq!(report.summary.changed(), 2);
    }
}
