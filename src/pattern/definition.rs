//! Declarative pattern definitions
//!
//! A [`PatternDefinition`] names a set of slots (pattern nodes), each
//! accepting a set of operator types and a `[min, max]` repeat count,
//! connected by directed pattern edges. It is built once per pass with
//! [`PatternBuilder`] and is immutable afterwards.

use indexmap::IndexSet;

use crate::error::{FusionError, FusionResult};

/// Default repeat bound: a slot matches exactly one concrete node
pub const DEFAULT_REPEAT: usize = 1;

/// How a pattern edge binds fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchMode {
    /// Exactly one concrete target per expansion
    Single,
    /// The source may feed several concrete targets of the same slot
    Multi,
}

/// One slot of a pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternNode {
    /// Slot name, unique within the pattern
    pub name: String,
    /// Accepted operator types, in declaration order
    pub types: IndexSet<String>,
    /// Minimum number of bound nodes
    pub min: usize,
    /// Maximum number of bound nodes
    pub max: usize,
    /// Matching starts here
    pub is_head: bool,
    /// Bound nodes must survive the rewrite
    pub is_output: bool,
}

impl PatternNode {
    /// Check if a concrete operator type is accepted
    pub fn accepts(&self, op_type: &str) -> bool {
        self.types.contains(op_type)
    }
}

/// Directed pattern edge between two slots (indices into the node list)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternEdge {
    /// Producing slot
    pub source: usize,
    /// Consuming slot
    pub target: usize,
    /// Fan-out mode
    pub branch: BranchMode,
}

/// Matching plan step, derived at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Bind a head slot by scanning the graph
    Seed { slot: usize },
    /// Bind the unbound end of `edge` from its bound end
    Expand { edge: usize, forward: bool },
}

/// Immutable, validated pattern
#[derive(Debug, Clone, PartialEq)]
pub struct PatternDefinition {
    name: String,
    nodes: Vec<PatternNode>,
    edges: Vec<PatternEdge>,
    heads: Vec<usize>,
    plan: Vec<Step>,
}

impl PatternDefinition {
    /// Start building a pattern
    pub fn builder(name: &str) -> PatternBuilder {
        PatternBuilder::new(name)
    }

    /// Pattern name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slots in definition order
    pub fn nodes(&self) -> &[PatternNode] {
        &self.nodes
    }

    /// Pattern edges in definition order
    pub fn edges(&self) -> &[PatternEdge] {
        &self.edges
    }

    /// Head slot indices
    pub fn heads(&self) -> &[usize] {
        &self.heads
    }

    /// Slot by name
    pub fn node(&self, name: &str) -> Option<&PatternNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Slot index by name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Whether a slot has outgoing pattern edges
    pub fn has_outgoing(&self, slot: usize) -> bool {
        self.edges.iter().any(|e| e.source == slot)
    }

    /// Whether a slot has incoming pattern edges
    pub fn has_incoming(&self, slot: usize) -> bool {
        self.edges.iter().any(|e| e.target == slot)
    }

    pub(crate) fn plan(&self) -> &[Step] {
        &self.plan
    }
}

/// Builder for [`PatternDefinition`]
///
/// Builder methods never fail on their own; the first problem is recorded
/// and reported by [`PatternBuilder::build`], so a malformed pattern
/// surfaces when the pass is registered.
///
/// # Example
///
/// ```ignore
/// let pattern = PatternDefinition::builder("conv_relu")
///     .add_pattern_node("conv", &["Conv"])
///     .add_pattern_node("relu", &["Relu", "Relu6"])
///     .set_head(&["conv"])
///     .set_outputs("conv", &["relu"], BranchMode::Single)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct PatternBuilder {
    name: String,
    nodes: Vec<PatternNode>,
    edges: Vec<(String, String, BranchMode)>,
    heads: Vec<String>,
    output_roles: Vec<String>,
    error: Option<FusionError>,
}

impl PatternBuilder {
    /// Create a new builder
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
            heads: Vec::new(),
            output_roles: Vec::new(),
            error: None,
        }
    }

    fn fail(&mut self, reason: String) {
        if self.error.is_none() {
            self.error = Some(FusionError::definition(&self.name, reason));
        }
    }

    /// Register a slot matching exactly one node
    pub fn add_pattern_node(self, name: &str, types: &[&str]) -> Self {
        self.add_repeated_node(name, types, DEFAULT_REPEAT, DEFAULT_REPEAT)
    }

    /// Register a slot matching between `min` and `max` nodes
    pub fn add_repeated_node(mut self, name: &str, types: &[&str], min: usize, max: usize) -> Self {
        if self.nodes.iter().any(|n| n.name == name) {
            self.fail(format!("pattern node `{name}` defined twice"));
            return self;
        }
        if min > max {
            self.fail(format!("pattern node `{name}` has min {min} > max {max}"));
            return self;
        }
        if max == 0 {
            self.fail(format!("pattern node `{name}` has max 0"));
            return self;
        }
        if types.is_empty() {
            self.fail(format!("pattern node `{name}` accepts no types"));
            return self;
        }

        self.nodes.push(PatternNode {
            name: name.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
            min,
            max,
            is_head: false,
            is_output: false,
        });
        self
    }

    /// Mark slots as entry points for matching
    pub fn set_head(mut self, names: &[&str]) -> Self {
        for name in names {
            if !self.heads.iter().any(|h| h == name) {
                self.heads.push(name.to_string());
            }
        }
        self
    }

    /// Declare pattern edges from `source` to each of `targets`
    pub fn set_outputs(mut self, source: &str, targets: &[&str], branch: BranchMode) -> Self {
        for target in targets {
            self.edges
                .push((source.to_string(), target.to_string(), branch));
        }
        self
    }

    /// Mark slots whose bound nodes must not be fused away
    pub fn set_output_role(mut self, names: &[&str]) -> Self {
        self.output_roles
            .extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Validate and freeze the pattern
    pub fn build(self) -> FusionResult<PatternDefinition> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let name = self.name;
        let mut nodes = self.nodes;
        let index_of = |nodes: &[PatternNode], slot: &str| nodes.iter().position(|n| n.name == slot);

        if nodes.is_empty() {
            return Err(FusionError::definition(&name, "pattern has no nodes"));
        }

        // Heads
        if self.heads.is_empty() {
            return Err(FusionError::definition(&name, "pattern has no head"));
        }
        let mut heads = Vec::with_capacity(self.heads.len());
        for head in &self.heads {
            let idx = index_of(&nodes, head).ok_or_else(|| {
                FusionError::definition(&name, format!("head `{head}` is not a pattern node"))
            })?;
            let node = &mut nodes[idx];
            if node.min > 1 || node.min == 0 {
                return Err(FusionError::definition(
                    &name,
                    format!("head `{head}` must have min count 1"),
                ));
            }
            node.is_head = true;
            heads.push(idx);
        }

        // Output roles
        for role in &self.output_roles {
            let idx = index_of(&nodes, role).ok_or_else(|| {
                FusionError::definition(&name, format!("output role `{role}` is not a pattern node"))
            })?;
            nodes[idx].is_output = true;
        }

        // Edges
        let mut edges = Vec::with_capacity(self.edges.len());
        for (source, target, branch) in &self.edges {
            let s = index_of(&nodes, source).ok_or_else(|| {
                FusionError::definition(&name, format!("dangling edge source `{source}`"))
            })?;
            let t = index_of(&nodes, target).ok_or_else(|| {
                FusionError::definition(&name, format!("dangling edge target `{target}`"))
            })?;
            if s == t {
                return Err(FusionError::definition(
                    &name,
                    format!("self edge on `{source}`"),
                ));
            }
            if *branch == BranchMode::Single && nodes[t].min > 1 {
                return Err(FusionError::definition(
                    &name,
                    format!(
                        "single edge into `{target}` cannot bind min count {}",
                        nodes[t].min
                    ),
                ));
            }
            let edge = PatternEdge {
                source: s,
                target: t,
                branch: *branch,
            };
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }

        let plan = build_plan(&name, &nodes, &edges, &heads)?;

        Ok(PatternDefinition {
            name,
            nodes,
            edges,
            heads,
            plan,
        })
    }
}

/// Order slot bindings so every non-head slot is reached through an edge
///
/// Starts from the first head and repeatedly expands the first edge (in
/// definition order) with exactly one bound endpoint; when stuck, seeds the
/// next unbound head. A slot reachable from no head is a definition error.
fn build_plan(
    name: &str,
    nodes: &[PatternNode],
    edges: &[PatternEdge],
    heads: &[usize],
) -> FusionResult<Vec<Step>> {
    let mut bound = vec![false; nodes.len()];
    let mut plan = Vec::with_capacity(nodes.len());
    let mut remaining = nodes.len();

    while remaining > 0 {
        let expansion = edges.iter().enumerate().find_map(|(i, e)| {
            match (bound[e.source], bound[e.target]) {
                (true, false) => Some((i, true, e.target)),
                (false, true) => Some((i, false, e.source)),
                _ => None,
            }
        });

        if let Some((edge, forward, slot)) = expansion {
            plan.push(Step::Expand { edge, forward });
            bound[slot] = true;
            remaining -= 1;
            continue;
        }

        match heads.iter().copied().find(|&h| !bound[h]) {
            Some(slot) => {
                plan.push(Step::Seed { slot });
                bound[slot] = true;
                remaining -= 1;
            }
            None => {
                let orphan = nodes
                    .iter()
                    .zip(&bound)
                    .find(|(_, b)| !**b)
                    .map(|(n, _)| n.name.as_str())
                    .unwrap_or_default();
                return Err(FusionError::definition(
                    name,
                    format!("pattern node `{orphan}` is not reachable from any head"),
                ));
            }
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv_relu_builder() -> PatternBuilder {
        PatternDefinition::builder("conv_relu")
            .add_pattern_node("conv", &["Conv"])
            .add_pattern_node("relu", &["Relu", "Relu6"])
    }

    #[test]
    fn test_build_simple_pattern() {
        let pattern = conv_relu_builder()
            .set_head(&["conv"])
            .set_outputs("conv", &["relu"], BranchMode::Single)
            .build()
            .unwrap();

        assert_eq!(pattern.name(), "conv_relu");
        assert_eq!(pattern.nodes().len(), 2);
        assert_eq!(pattern.heads(), &[0]);
        assert!(pattern.nodes()[0].is_head);
        assert!(pattern.node("relu").unwrap().accepts("Relu6"));
        assert_eq!(
            pattern.plan(),
            &[Step::Seed { slot: 0 }, Step::Expand { edge: 0, forward: true }]
        );
    }

    #[test]
    fn test_missing_head_rejected() {
        let err = conv_relu_builder()
            .set_outputs("conv", &["relu"], BranchMode::Single)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no head"));
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let err = conv_relu_builder()
            .add_pattern_node("conv", &["Conv"])
            .set_head(&["conv"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let err = PatternDefinition::builder("p")
            .add_repeated_node("a", &["A"], 3, 2)
            .set_head(&["a"])
            .build()
            .unwrap_err();
        assert!(matches!(err, FusionError::Definition { .. }));
    }

    #[test]
    fn test_single_edge_into_repeated_slot_rejected() {
        let err = PatternDefinition::builder("p")
            .add_pattern_node("split", &["Split"])
            .add_repeated_node("relu", &["Relu"], 2, 3)
            .set_head(&["split"])
            .set_outputs("split", &["relu"], BranchMode::Single)
            .build()
            .unwrap_err();
        assert!(matches!(err, FusionError::Definition { .. }));
        assert!(err.to_string().contains("single edge into `relu`"));

        assert!(PatternDefinition::builder("p")
            .add_pattern_node("split", &["Split"])
            .add_repeated_node("relu", &["Relu"], 2, 3)
            .set_head(&["split"])
            .set_outputs("split", &["relu"], BranchMode::Multi)
            .build()
            .is_ok());
    }

    #[test]
    fn test_dangling_edge_rejected() {
        let err = conv_relu_builder()
            .set_head(&["conv"])
            .set_outputs("conv", &["bn"], BranchMode::Single)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("dangling edge target"));
    }

    #[test]
    fn test_unreachable_node_rejected() {
        let err = conv_relu_builder()
            .set_head(&["conv"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("not reachable"));
    }

    #[test]
    fn test_backward_expansion_plan() {
        // Head is the consumer; the producer is reached backwards.
        let pattern = conv_relu_builder()
            .set_head(&["relu"])
            .set_outputs("conv", &["relu"], BranchMode::Single)
            .build()
            .unwrap();

        assert_eq!(
            pattern.plan(),
            &[Step::Seed { slot: 1 }, Step::Expand { edge: 0, forward: false }]
        );
    }

    #[test]
    fn test_output_role() {
        let pattern = conv_relu_builder()
            .set_head(&["conv"])
            .set_outputs("conv", &["relu"], BranchMode::Single)
            .set_output_role(&["relu"])
            .build()
            .unwrap();

        assert!(pattern.node("relu").unwrap().is_output);
        assert!(!pattern.node("conv").unwrap().is_output);
    }
}
