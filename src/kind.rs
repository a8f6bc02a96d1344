use serde::{Deserialize, Serialize};

use crate::error::{DrillError, Result};

/// The practice modules the runner knows how to drive
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    #[strum(to_string = "OIR")]
    Oir,
    #[strum(to_string = "PPDT")]
    Ppdt,
    #[strum(to_string = "TAT")]
    Tat,
    #[strum(to_string = "WAT")]
    Wat,
    #[strum(to_string = "SRT")]
    Srt,
}

impl TestKind {
    pub const ALL: [TestKind; 5] = [
        TestKind::Oir,
        TestKind::Ppdt,
        TestKind::Tat,
        TestKind::Wat,
        TestKind::Srt,
    ];

    /// Document store collection holding this kind's stimuli
    pub fn collection(&self) -> &'static str {
        match self {
            TestKind::Oir => "oir_questions",
            TestKind::Ppdt => "ppdt_pictures",
            TestKind::Tat => "tat_pictures",
            TestKind::Wat => "wat_words",
            TestKind::Srt => "srt_situations",
        }
    }

    /// Lowercase key used in config files and the completion log
    pub fn key(&self) -> &'static str {
        match self {
            TestKind::Oir => "oir",
            TestKind::Ppdt => "ppdt",
            TestKind::Tat => "tat",
            TestKind::Wat => "wat",
            TestKind::Srt => "srt",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TestKind::Oir => "Officer Intelligence Rating",
            TestKind::Ppdt => "Picture Perception & Description Test",
            TestKind::Tat => "Thematic Apperception Test",
            TestKind::Wat => "Word Association Test",
            TestKind::Srt => "Situation Reaction Test",
        }
    }

    pub fn config(&self) -> TestConfig {
        TestConfig::for_kind(*self)
    }
}

/// A named, timed sub-step of handling one stimulus
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Answer,
    View,
    Write,
    Respond,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PhaseSpec {
    pub phase: Phase,
    pub seconds: u32,
}

impl PhaseSpec {
    pub fn new(phase: Phase, seconds: u32) -> Self {
        Self { phase, seconds }
    }
}

/// Whether one clock spans the whole pool or each stimulus runs its own phases
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimerScope {
    WholePool,
    PerStimulus,
}

/// What the test-taker produces for a stimulus
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponseMode {
    /// Multiple choice, scored against the answer key
    Choice,
    /// Free text typed in the write phase, persisted per stimulus
    Story,
    /// Answers are written on paper; the runner only presents and times
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolSizing {
    Fixed(usize),
    Choice(Vec<usize>),
}

/// Per-test configuration; frozen once a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    pub kind: TestKind,
    pub scope: TimerScope,
    pub phases: Vec<PhaseSpec>,
    pub mode: ResponseMode,
    pub sizing: PoolSizing,
}

impl TestConfig {
    pub fn for_kind(kind: TestKind) -> Self {
        match kind {
            TestKind::Oir => Self {
                kind,
                scope: TimerScope::WholePool,
                phases: vec![PhaseSpec::new(Phase::Answer, 40 * 60)],
                mode: ResponseMode::Choice,
                sizing: PoolSizing::Choice(vec![10, 20, 30, 40, 50]),
            },
            TestKind::Ppdt => Self {
                kind,
                scope: TimerScope::PerStimulus,
                phases: vec![
                    PhaseSpec::new(Phase::View, 30),
                    PhaseSpec::new(Phase::Write, 240),
                ],
                mode: ResponseMode::Offline,
                sizing: PoolSizing::Choice(vec![1, 2, 4, 6, 8, 10]),
            },
            TestKind::Tat => Self {
                kind,
                scope: TimerScope::PerStimulus,
                phases: vec![
                    PhaseSpec::new(Phase::View, 30),
                    PhaseSpec::new(Phase::Write, 240),
                ],
                mode: ResponseMode::Story,
                sizing: PoolSizing::Choice(vec![2, 4, 6, 8, 10, 12]),
            },
            TestKind::Wat => Self {
                kind,
                scope: TimerScope::PerStimulus,
                phases: vec![PhaseSpec::new(Phase::Respond, 15)],
                mode: ResponseMode::Offline,
                sizing: PoolSizing::Choice((10..=300).step_by(10).collect()),
            },
            TestKind::Srt => Self {
                kind,
                scope: TimerScope::PerStimulus,
                phases: vec![PhaseSpec::new(Phase::Respond, 30)],
                mode: ResponseMode::Offline,
                sizing: PoolSizing::Choice(vec![10, 20, 30, 40, 50, 60]),
            },
        }
    }

    pub fn with_sizing(mut self, sizing: PoolSizing) -> Self {
        self.sizing = sizing;
        self
    }

    /// Replace the duration of every phase named `phase`
    pub fn with_phase_seconds(mut self, phase: Phase, seconds: u32) -> Self {
        for spec in self.phases.iter_mut().filter(|s| s.phase == phase) {
            spec.seconds = seconds;
        }
        self
    }

    /// Sum of phase durations for one pass over the phase list
    pub fn seconds_per_pass(&self) -> u32 {
        self.phases.iter().map(|p| p.seconds).sum()
    }

    /// Expected session length for `stimuli` items when every phase runs out
    pub fn planned_seconds(&self, stimuli: usize) -> u64 {
        match self.scope {
            TimerScope::WholePool => self.seconds_per_pass() as u64,
            TimerScope::PerStimulus => self.seconds_per_pass() as u64 * stimuli as u64,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.phases.is_empty() {
            return Err(DrillError::InvalidConfig(format!(
                "{} has no phases",
                self.kind
            )));
        }
        if let Some(spec) = self.phases.iter().find(|p| p.seconds == 0) {
            return Err(DrillError::InvalidConfig(format!(
                "{} phase '{}' must last at least one second",
                self.kind, spec.phase
            )));
        }
        if self.scope == TimerScope::WholePool && self.phases.len() != 1 {
            return Err(DrillError::InvalidConfig(format!(
                "{} runs one clock over the pool and takes exactly one phase",
                self.kind
            )));
        }
        match &self.sizing {
            PoolSizing::Fixed(0) => Err(DrillError::InvalidConfig(format!(
                "{} pool size must be positive",
                self.kind
            ))),
            PoolSizing::Choice(choices) if choices.is_empty() || choices.contains(&0) => {
                Err(DrillError::InvalidConfig(format!(
                    "{} pool size choices must be positive",
                    self.kind
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn builtin_configs_are_valid() {
        for kind in TestKind::ALL {
            assert!(kind.config().validate().is_ok(), "{kind} config invalid");
        }
    }

    #[test]
    fn picture_tests_view_then_write() {
        for kind in [TestKind::Tat, TestKind::Ppdt] {
            let phases: Vec<_> = kind.config().phases.iter().map(|p| (p.phase, p.seconds)).collect();
            assert_eq!(phases, vec![(Phase::View, 30), (Phase::Write, 240)]);
        }
    }

    #[test]
    fn wat_offers_ten_to_three_hundred_words() {
        let PoolSizing::Choice(choices) = TestKind::Wat.config().sizing else {
            panic!("WAT should let the user pick a count");
        };
        assert_eq!(choices.first(), Some(&10));
        assert_eq!(choices.last(), Some(&300));
        assert_eq!(choices.len(), 30);
    }

    #[test]
    fn planned_seconds_depend_on_scope() {
        assert_eq!(TestKind::Oir.config().planned_seconds(50), 2400);
        assert_eq!(TestKind::Wat.config().planned_seconds(10), 150);
        assert_eq!(TestKind::Tat.config().planned_seconds(2), 540);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let cfg = TestKind::Srt.config().with_phase_seconds(Phase::Respond, 0);
        assert_matches!(cfg.validate(), Err(DrillError::InvalidConfig(_)));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let cfg = TestKind::Wat.config().with_sizing(PoolSizing::Fixed(0));
        assert_matches!(cfg.validate(), Err(DrillError::InvalidConfig(_)));
    }

    #[test]
    fn whole_pool_takes_a_single_phase() {
        let mut cfg = TestKind::Oir.config();
        cfg.phases.push(PhaseSpec::new(Phase::Write, 10));
        assert_matches!(cfg.validate(), Err(DrillError::InvalidConfig(_)));
    }

    #[test]
    fn display_uses_acronyms() {
        assert_eq!(TestKind::Oir.to_string(), "OIR");
        assert_eq!(TestKind::Srt.to_string(), "SRT");
        assert_eq!(Phase::Write.to_string(), "write");
    }
}
