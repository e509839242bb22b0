//! Per-round statistics

use std::fmt;

use indexmap::IndexMap;

use super::registry::PassOutcome;

/// Counters for one pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    /// Mappings found
    pub matched: usize,
    /// Rewrites committed
    pub applied: usize,
    /// Rewrites declined
    pub not_changed: usize,
    /// Rewrites that failed and were rolled back
    pub failed: usize,
}

impl PassStats {
    /// Count one outcome (the match itself included)
    pub fn record(&mut self, outcome: PassOutcome) {
        self.matched += 1;
        match outcome {
            PassOutcome::Changed => self.applied += 1,
            PassOutcome::NotChanged => self.not_changed += 1,
            PassOutcome::Failed => self.failed += 1,
        }
    }

    /// Merge counters
    pub fn merge(&mut self, other: &PassStats) {
        self.matched += other.matched;
        self.applied += other.applied;
        self.not_changed += other.not_changed;
        self.failed += other.failed;
    }
}

/// Aggregated result of one or more driver rounds
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    passes: IndexMap<String, PassStats>,
    rounds: usize,
}

impl Summary {
    /// Create an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ensure_pass(&mut self, pass: &str) {
        if !self.passes.contains_key(pass) {
            self.passes.insert(pass.to_string(), PassStats::default());
        }
    }

    /// Count one outcome for `pass`
    pub fn record(&mut self, pass: &str, outcome: PassOutcome) {
        self.ensure_pass(pass);
        if let Some(stats) = self.passes.get_mut(pass) {
            stats.record(outcome);
        }
    }

    pub(crate) fn set_rounds(&mut self, rounds: usize) {
        self.rounds = rounds;
    }

    /// Counters for a pass
    pub fn pass(&self, name: &str) -> Option<&PassStats> {
        self.passes.get(name)
    }

    /// Iterate over `(pass, stats)` in first-run order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PassStats)> {
        self.passes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of driver rounds aggregated
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Total committed rewrites
    pub fn changed(&self) -> usize {
        self.passes.values().map(|s| s.applied).sum()
    }

    /// Total mappings found
    pub fn matched(&self) -> usize {
        self.passes.values().map(|s| s.matched).sum()
    }

    /// Total failed rewrites
    pub fn failed(&self) -> usize {
        self.passes.values().map(|s| s.failed).sum()
    }

    /// Check if no rewrite was committed
    pub fn is_fixed_point(&self) -> bool {
        self.changed() == 0
    }

    /// Add another summary's counters into this one
    pub fn merge(&mut self, other: &Summary) {
        for (name, stats) in &other.passes {
            self.ensure_pass(name);
            if let Some(mine) = self.passes.get_mut(name) {
                mine.merge(stats);
            }
        }
        self.rounds += other.rounds;
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} round(s): {} matched, {} changed, {} failed",
            self.rounds,
            self.matched(),
            self.changed(),
            self.failed()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_totals() {
        let mut summary = Summary::new();
        summary.record("a", PassOutcome::Changed);
        summary.record("a", PassOutcome::NotChanged);
        summary.record("b", PassOutcome::Failed);

        let a = summary.pass("a").unwrap();
        assert_eq!((a.matched, a.applied, a.not_changed), (2, 1, 1));
        assert_eq!(summary.changed(), 1);
        assert_eq!(summary.matched(), 3);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.is_fixed_point());
    }

    #[test]
    fn test_merge() {
        let mut first = Summary::new();
        first.record("a", PassOutcome::Changed);
        first.set_rounds(1);
        let mut second = Summary::new();
        second.record("b", PassOutcome::Changed);
        second.record("a", PassOutcome::Changed);
        second.set_rounds(1);

        first.merge(&second);
        assert_eq!(first.rounds(), 2);
        assert_eq!(first.pass("a").unwrap().applied, 2);
        let names: Vec<_> = first.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            first.to_string(),
            "2 round(s): 3 matched, 3 changed, 0 failed"
        );
    }
}
