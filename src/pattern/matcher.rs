//! Subgraph matcher
//!
//! Constrained backtracking search that binds pattern slots to concrete
//! nodes. Search is seeded at head slots and follows pattern edges through
//! the peers of already-bound nodes, in the order fixed by the pattern's
//! plan. Graph iteration order and peer order are deterministic, so the
//! same graph always yields the same mappings.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::graph::{GraphModel, Node, NodeId};

use super::definition::{BranchMode, PatternDefinition, Step};

/// Bindings of one slot
pub type SlotBinding = SmallVec<[NodeId; 2]>;

/// Result of a successful match: slot name → bound nodes
///
/// Slots appear in pattern-definition order; nodes within a slot in the
/// order they were bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pattern: String,
    slots: IndexMap<String, SlotBinding>,
}

impl Mapping {
    /// Name of the pattern that produced this mapping
    pub fn pattern_name(&self) -> &str {
        &self.pattern
    }

    /// Nodes bound to a slot (empty for unknown or unbound slots)
    pub fn get(&self, slot: &str) -> &[NodeId] {
        self.slots.get(slot).map(|b| b.as_slice()).unwrap_or(&[])
    }

    /// First node bound to a slot
    pub fn first(&self, slot: &str) -> Option<NodeId> {
        self.get(slot).first().copied()
    }

    /// Iterate over `(slot, nodes)` pairs in definition order
    pub fn slots(&self) -> impl Iterator<Item = (&str, &[NodeId])> {
        self.slots.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// All bound nodes, flattened in definition order
    pub fn nodes(&self) -> Vec<NodeId> {
        self.slots.values().flat_map(|b| b.iter().copied()).collect()
    }

    /// Slot a node is bound to
    pub fn slot_of(&self, id: NodeId) -> Option<&str> {
        self.slots
            .iter()
            .find(|(_, b)| b.contains(&id))
            .map(|(k, _)| k.as_str())
    }

    /// Check if a node is bound anywhere in the mapping
    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.values().any(|b| b.contains(&id))
    }

    /// Total number of bound nodes
    pub fn len(&self) -> usize {
        self.slots.values().map(|b| b.len()).sum()
    }

    /// Check if nothing is bound
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether matching stops at the first mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// Return at most one mapping
    #[default]
    FirstOnly,
    /// Enumerate node-disjoint mappings
    Disjoint,
}

/// Matcher configuration
#[derive(Debug, Clone, Default)]
pub struct MatchConfig {
    /// Enumeration mode for [`GraphMatcher::find_matches`]
    pub mode: MatchMode,
    /// Upper bound on mappings returned by `find_matches`
    pub max_matches: Option<usize>,
}

impl MatchConfig {
    /// Enumerate disjoint matches
    pub fn disjoint() -> Self {
        Self {
            mode: MatchMode::Disjoint,
            max_matches: None,
        }
    }

    /// Cap the number of mappings
    pub fn with_max_matches(mut self, max: usize) -> Self {
        self.max_matches = Some(max);
        self
    }
}

struct SearchState {
    bindings: Vec<SlotBinding>,
    used: FxHashSet<NodeId>,
}

impl SearchState {
    fn new(slots: usize) -> Self {
        Self {
            bindings: vec![SmallVec::new(); slots],
            used: FxHashSet::default(),
        }
    }

    fn bind(&mut self, slot: usize, nodes: &[NodeId]) {
        self.bindings[slot].extend_from_slice(nodes);
        self.used.extend(nodes.iter().copied());
    }

    fn unbind(&mut self, slot: usize) {
        for id in self.bindings[slot].drain(..) {
            self.used.remove(&id);
        }
    }
}

/// Pattern matcher over a [`GraphModel`]
///
/// Never errors: "no match" is `None`. Malformed patterns cannot reach the
/// matcher because [`PatternDefinition`] is only obtainable through a
/// validating builder.
pub struct GraphMatcher<'a> {
    graph: &'a GraphModel,
    excluded: Option<&'a FxHashSet<NodeId>>,
    horizon: Option<NodeId>,
    config: MatchConfig,
}

impl<'a> GraphMatcher<'a> {
    /// Create a new matcher
    pub fn new(graph: &'a GraphModel) -> Self {
        Self {
            graph,
            excluded: None,
            horizon: None,
            config: MatchConfig::default(),
        }
    }

    /// Skip nodes already consumed elsewhere
    pub fn excluding(mut self, excluded: &'a FxHashSet<NodeId>) -> Self {
        self.excluded = Some(excluded);
        self
    }

    /// Ignore nodes with id `>= horizon` (created after a round started)
    pub fn below(mut self, horizon: NodeId) -> Self {
        self.horizon = Some(horizon);
        self
    }

    /// Configure the matcher
    pub fn with_config(mut self, config: MatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Find the first mapping in deterministic search order
    pub fn find_next_match(&self, pattern: &PatternDefinition) -> Option<Mapping> {
        let empty = FxHashSet::default();
        let excluded = self.excluded.unwrap_or(&empty);
        self.search_from(pattern, excluded)
    }

    /// Find mappings according to the configured [`MatchMode`]
    ///
    /// In `Disjoint` mode every later mapping avoids the nodes of earlier
    /// ones, except nodes bound to output-role slots.
    pub fn find_matches(&self, pattern: &PatternDefinition) -> Vec<Mapping> {
        let limit = match self.config.mode {
            MatchMode::FirstOnly => 1,
            MatchMode::Disjoint => self.config.max_matches.unwrap_or(usize::MAX),
        };

        let mut excluded = self.excluded.cloned().unwrap_or_default();
        let mut results = Vec::new();

        while results.len() < limit {
            let Some(mapping) = self.search_from(pattern, &excluded) else {
                break;
            };
            let before = excluded.len();
            excluded.extend(consumed_nodes(pattern, &mapping));
            if excluded.len() == before {
                // Mapping made only of output-role nodes; consume them too.
                excluded.extend(mapping.nodes());
            }
            results.push(mapping);
        }

        results
    }

    /// Check if any mapping exists
    pub fn has_match(&self, pattern: &PatternDefinition) -> bool {
        self.find_next_match(pattern).is_some()
    }

    fn search_from(
        &self,
        pattern: &PatternDefinition,
        excluded: &FxHashSet<NodeId>,
    ) -> Option<Mapping> {
        let mut state = SearchState::new(pattern.nodes().len());
        if !self.search(pattern, excluded, 0, &mut state) {
            trace!(pattern = pattern.name(), "no match");
            return None;
        }

        let slots = pattern
            .nodes()
            .iter()
            .zip(state.bindings)
            .map(|(slot, binding)| (slot.name.clone(), binding))
            .collect();
        let mapping = Mapping {
            pattern: pattern.name().to_string(),
            slots,
        };
        debug!(pattern = pattern.name(), nodes = ?mapping.nodes(), "pattern matched");
        Some(mapping)
    }

    fn search(
        &self,
        pattern: &PatternDefinition,
        excluded: &FxHashSet<NodeId>,
        step: usize,
        state: &mut SearchState,
    ) -> bool {
        let plan = pattern.plan();
        if step == plan.len() {
            return self.verify(pattern, state);
        }

        match plan[step] {
            Step::Seed { slot } => {
                for node in self.graph.nodes() {
                    if !self.is_candidate(pattern, slot, node, excluded, state) {
                        continue;
                    }
                    trace!(pattern = pattern.name(), slot, node = %node.id(), "seeding head");
                    state.bind(slot, &[node.id()]);
                    if self.search(pattern, excluded, step + 1, state) {
                        return true;
                    }
                    state.unbind(slot);
                }
                false
            }
            Step::Expand { edge, forward } => {
                let edge = pattern.edges()[edge];
                let (from, to) = if forward {
                    (edge.source, edge.target)
                } else {
                    (edge.target, edge.source)
                };
                let candidates = self.expansion_candidates(pattern, from, to, forward, excluded, state);
                let slot = &pattern.nodes()[to];

                match edge.branch {
                    BranchMode::Single => {
                        if slot.min <= 1 {
                            for &candidate in &candidates {
                                state.bind(to, &[candidate]);
                                if self.search(pattern, excluded, step + 1, state) {
                                    return true;
                                }
                                state.unbind(to);
                            }
                        }
                    }
                    BranchMode::Multi => {
                        let upper = slot.max.min(candidates.len());
                        let lower = slot.min.max(1);
                        for count in (lower..=upper).rev() {
                            for picked in Combinations::new(candidates.len(), count) {
                                let nodes: SlotBinding =
                                    picked.iter().map(|&i| candidates[i]).collect();
                                state.bind(to, &nodes);
                                if self.search(pattern, excluded, step + 1, state) {
                                    return true;
                                }
                                state.unbind(to);
                            }
                        }
                    }
                }

                // Optional slot left empty as the last alternative
                slot.min == 0 && self.search(pattern, excluded, step + 1, state)
            }
        }
    }

    fn is_candidate(
        &self,
        pattern: &PatternDefinition,
        slot: usize,
        node: &Node,
        excluded: &FxHashSet<NodeId>,
        state: &SearchState,
    ) -> bool {
        let id = node.id();
        if state.used.contains(&id) || excluded.contains(&id) {
            return false;
        }
        if let Some(horizon) = self.horizon {
            if id >= horizon {
                return false;
            }
        }
        if !pattern.nodes()[slot].accepts(node.op_type()) {
            return false;
        }
        // Anchor degree must allow the slot's edge obligations
        if pattern.has_outgoing(slot) && node.outputs().is_empty() {
            return false;
        }
        if pattern.has_incoming(slot) && node.inputs().is_empty() {
            return false;
        }
        true
    }

    fn expansion_candidates(
        &self,
        pattern: &PatternDefinition,
        from: usize,
        to: usize,
        forward: bool,
        excluded: &FxHashSet<NodeId>,
        state: &SearchState,
    ) -> Vec<NodeId> {
        let mut neighbours: Vec<NodeId> = Vec::new();
        for &bound in &state.bindings[from] {
            let Some(node) = self.graph.node(bound) else {
                continue;
            };
            if forward {
                for dst in node.outputs().iter().flat_map(|a| a.peers()) {
                    if !neighbours.contains(&dst.node) {
                        neighbours.push(dst.node);
                    }
                }
            } else {
                for src in node.inputs().iter().filter_map(|a| a.peer()) {
                    if !neighbours.contains(&src.node) {
                        neighbours.push(src.node);
                    }
                }
            }
        }

        neighbours
            .into_iter()
            .filter(|id| {
                self.graph
                    .node(*id)
                    .map(|n| self.is_candidate(pattern, to, n, excluded, state))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Final check: counts within bounds and every edge realized
    fn verify(&self, pattern: &PatternDefinition, state: &SearchState) -> bool {
        for (slot, binding) in pattern.nodes().iter().zip(&state.bindings) {
            if binding.len() < slot.min || binding.len() > slot.max {
                return false;
            }
        }

        for edge in pattern.edges() {
            let sources = &state.bindings[edge.source];
            let targets = &state.bindings[edge.target];
            if sources.is_empty() || targets.is_empty() {
                continue;
            }
            let every_source_feeds = sources
                .iter()
                .all(|&s| targets.iter().any(|&t| self.graph.has_data_edge(s, t)));
            let every_target_fed = targets
                .iter()
                .all(|&t| sources.iter().any(|&s| self.graph.has_data_edge(s, t)));
            if !every_source_feeds || !every_target_fed {
                return false;
            }
        }

        true
    }
}

/// `k`-subsets of `0..n` as index lists, in lexicographic order
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();
        let k = self.indices.len();
        match (0..k).rev().find(|&i| self.indices[i] < self.n - k + i) {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.done = true,
        }
        Some(current)
    }
}

/// Nodes of a mapping that a round consumes: everything not bound to an
/// output-role slot
pub fn consumed_nodes(pattern: &PatternDefinition, mapping: &Mapping) -> Vec<NodeId> {
    pattern
        .nodes()
        .iter()
        .filter(|slot| !slot.is_output)
        .flat_map(|slot| mapping.get(&slot.name).iter().copied())
        .collect()
}
