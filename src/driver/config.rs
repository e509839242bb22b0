//! Driver configuration

/// Default round limit for [`run_until_fixed_point`](super::run_until_fixed_point)
pub const DEFAULT_MAX_ROUNDS: usize = 16;

/// Scheduling category of a pass
///
/// Stages run in ascending order within one round; passes within a stage
/// run in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PassStage {
    /// Regular rewrite passes
    #[default]
    BuiltIn,
    /// Cleanup passes that run after every built-in pass of the round
    SecondRound,
}

impl PassStage {
    /// Every stage, in execution order
    pub const ALL: [PassStage; 2] = [PassStage::BuiltIn, PassStage::SecondRound];
}

/// Pass driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Abort the round on the first `Failed` outcome
    pub fail_fast: bool,
    /// Maximum matches per pattern definition per round
    pub match_budget: Option<usize>,
    /// Stages executed by `run_once`
    pub stages: Vec<PassStage>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            match_budget: None,
            stages: PassStage::ALL.to_vec(),
        }
    }
}

impl DriverConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable fail-fast mode
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Cap matches per pattern definition per round
    pub fn with_match_budget(mut self, budget: usize) -> Self {
        self.match_budget = Some(budget);
        self
    }

    /// Restrict `run_once` to the given stages
    pub fn with_stages(mut self, stages: &[PassStage]) -> Self {
        self.stages = stages.to_vec();
        self
    }

    /// Configured stages, sorted and deduplicated
    pub(crate) fn ordered_stages(&self) -> Vec<PassStage> {
        let mut stages = self.stages.clone();
        stages.sort();
        stages.dedup();
        stages
    }
}
