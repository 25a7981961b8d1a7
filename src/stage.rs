//! Execution stages of a pipeline element.
//!
//! Every element passes through up to six stages per processing cycle, always
//! in this order:
//!
//! ```text
//! PRE_INPUT → POST_INPUT → PRE_EXECUTE → POST_EXECUTE → PRE_OUTPUT → POST_OUTPUT
//! ```
//!
//! The set is closed. Hooks, breakpoints, scope restrictions and the timing
//! listeners all use [`Stage`] as their vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the six points in an element's processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    PreInput,
    PostInput,
    PreExecute,
    PostExecute,
    PreOutput,
    PostOutput,
}

/// The phase a stage belongs to: each phase has one PRE and one POST stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Input,
    Execute,
    Output,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Input => "input",
            Phase::Execute => "execute",
            Phase::Output => "output",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Stage {
    /// All stages in cycle order.
    pub const ALL: [Stage; 6] = [
        Stage::PreInput,
        Stage::PostInput,
        Stage::PreExecute,
        Stage::PostExecute,
        Stage::PreOutput,
        Stage::PostOutput,
    ];

    /// Position within the processing cycle (0..6).
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Name of the listener hook invoked for this stage.
    pub fn hook_name(self) -> &'static str {
        match self {
            Stage::PreInput => "preInput",
            Stage::PostInput => "postInput",
            Stage::PreExecute => "preExecute",
            Stage::PostExecute => "postExecute",
            Stage::PreOutput => "preOutput",
            Stage::PostOutput => "postOutput",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            Stage::PreInput | Stage::PostInput => Phase::Input,
            Stage::PreExecute | Stage::PostExecute => Phase::Execute,
            Stage::PreOutput | Stage::PostOutput => Phase::Output,
        }
    }

    #[inline]
    pub fn is_pre(self) -> bool {
        matches!(self, Stage::PreInput | Stage::PreExecute | Stage::PreOutput)
    }

    #[inline]
    pub fn is_post(self) -> bool {
        !self.is_pre()
    }

    /// The PRE stage that opens this stage's phase.
    pub fn opening(self) -> Stage {
        match self.phase() {
            Phase::Input => Stage::PreInput,
            Phase::Execute => Stage::PreExecute,
            Phase::Output => Stage::PreOutput,
        }
    }

    /// The POST stage that closes this stage's phase.
    pub fn closing(self) -> Stage {
        match self.phase() {
            Phase::Input => Stage::PostInput,
            Phase::Execute => Stage::PostExecute,
            Phase::Output => Stage::PostOutput,
        }
    }

    /// Whether the hook for this stage carries a token.
    pub fn carries_token(self) -> bool {
        matches!(self, Stage::PreInput | Stage::PostOutput)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hook_name())
    }
}

impl FromStr for Stage {
    type Err = String;

    /// Accepts hook names (`preExecute`), snake case (`pre_execute`) and
    /// upper snake case (`PRE_EXECUTE`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.hook_name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

/// Compact set of stages, one bit per stage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StageSet(u8);

impl StageSet {
    pub const EMPTY: StageSet = StageSet(0);
    pub const ALL: StageSet = StageSet(0b0011_1111);

    pub fn only(stage: Stage) -> Self {
        StageSet(1 << stage.index())
    }

    pub fn of(stages: &[Stage]) -> Self {
        stages.iter().fold(StageSet::EMPTY, |set, s| set.with(*s))
    }

    #[must_use]
    pub fn with(self, stage: Stage) -> Self {
        StageSet(self.0 | (1 << stage.index()))
    }

    #[must_use]
    pub fn without(self, stage: Stage) -> Self {
        StageSet(self.0 & !(1 << stage.index()))
    }

    pub fn insert(&mut self, stage: Stage) {
        *self = self.with(stage);
    }

    #[inline]
    pub fn contains(self, stage: Stage) -> bool {
        self.0 & (1 << stage.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Stages in cycle order.
    pub fn iter(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl fmt::Debug for StageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Stage> for StageSet {
    fn from_iter<I: IntoIterator<Item = Stage>>(iter: I) -> Self {
        iter.into_iter().fold(StageSet::EMPTY, |set, s| set.with(s))
    }
}

impl Serialize for StageSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for StageSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        names
            .iter()
            .map(|n| n.parse::<Stage>().map_err(serde::de::Error::custom))
            .collect()
    }
}
