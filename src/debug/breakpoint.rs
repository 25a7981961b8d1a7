//! Breakpoint definitions.
//!
//! A breakpoint participates in a set of stages and fires when its kind
//! matches the element and its condition holds. Besides the enabled flag, the
//! only state a breakpoint carries across invocations is how often it has
//! caused a block.

use crate::debug::condition::{Condition, Watch};
use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::stage::{Stage, StageSet};
use std::fmt;

/// Which elements a breakpoint looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind {
    /// Every element; the condition alone decides.
    AnyElement,
    /// Only the element whose path equals this string.
    Path(String),
}

impl BreakpointKind {
    pub fn matches(&self, element: &dyn PipelineElement) -> bool {
        match self {
            BreakpointKind::AnyElement => true,
            BreakpointKind::Path(path) => element.path() == path,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub kind: BreakpointKind,
    pub condition: Condition,
    pub stages: StageSet,
    pub enabled: bool,
    /// Disable after the first block.
    pub one_off: bool,
    pub watches: Vec<Watch>,
    trigger_count: u64,
}

impl Breakpoint {
    pub fn new(kind: BreakpointKind, stages: StageSet, condition: Condition) -> Self {
        Self {
            kind,
            condition,
            stages,
            enabled: true,
            one_off: false,
            watches: Vec::new(),
            trigger_count: 0,
        }
    }

    /// Unconditional breakpoint on one path.
    pub fn at_path(path: impl Into<String>, stages: StageSet) -> Self {
        Self::new(BreakpointKind::Path(path.into()), stages, Condition::Always)
    }

    /// Breakpoint on any element, filtered by its condition.
    pub fn anywhere(stages: StageSet, condition: Condition) -> Self {
        Self::new(BreakpointKind::AnyElement, stages, condition)
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    pub fn with_watch(mut self, watch: Watch) -> Self {
        self.watches.push(watch);
        self
    }

    pub fn one_off(mut self) -> Self {
        self.one_off = true;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn participates_in(&self, stage: Stage) -> bool {
        self.stages.contains(stage)
    }

    /// Kind match first, then the condition. Does not look at `enabled`,
    /// the stage set or any scope.
    pub fn fires(
        &self,
        element: &dyn PipelineElement,
        stage: Stage,
        token: Option<&Token>,
    ) -> Result<bool> {
        if !self.kind.matches(element) {
            return Ok(false);
        }
        self.condition.evaluate(element, stage, token)
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count
    }

    /// Record that this breakpoint caused a block.
    pub fn record_trigger(&mut self) {
        self.trigger_count += 1;
        if self.one_off {
            self.enabled = false;
        }
    }

    pub fn describe(&self) -> String {
        let target = match &self.kind {
            BreakpointKind::AnyElement => "any element".to_string(),
            BreakpointKind::Path(path) => path.clone(),
        };
        format!("{} [{}] if {}", target, self.stage_list(), self.condition.source())
    }

    fn stage_list(&self) -> String {
        self.stages
            .iter()
            .map(Stage::hook_name)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Copy of a breakpoint's identity, handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    pub index: usize,
    pub description: String,
    pub condition: String,
    pub trigger_count: u64,
}

impl BreakpointInfo {
    pub fn of(index: usize, breakpoint: &Breakpoint) -> Self {
        Self {
            index,
            description: breakpoint.describe(),
            condition: breakpoint.condition.source().to_string(),
            trigger_count: breakpoint.trigger_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::NamedElement;

    #[test]
    fn test_path_kind() {
        let bp = Breakpoint::at_path("/x", StageSet::only(Stage::PreExecute));
        assert!(bp.fires(&NamedElement::new("/x"), Stage::PreExecute, None).unwrap());
        assert!(!bp.fires(&NamedElement::new("/y"), Stage::PreExecute, None).unwrap());
        assert!(!bp.fires(&NamedElement::new("/x/child"), Stage::PreExecute, None).unwrap());
    }

    #[test]
    fn test_condition_not_evaluated_on_path_mismatch() {
        let bp = Breakpoint::at_path("/x", StageSet::ALL).with_condition(Condition::custom(
            "panics",
            |_, _| panic!("condition must not run"),
        ));
        assert!(!bp.fires(&NamedElement::new("/y"), Stage::PreInput, None).unwrap());
    }

    #[test]
    fn test_one_off_disables_after_trigger() {
        let mut bp = Breakpoint::anywhere(StageSet::ALL, Condition::Always).one_off();
        assert!(bp.enabled);
        bp.record_trigger();
        assert!(!bp.enabled);
        assert_eq!(bp.trigger_count(), 1);
    }

    #[test]
    fn test_describe() {
        let bp = Breakpoint::at_path(
            "/Flow/x",
            StageSet::of(&[Stage::PreExecute, Stage::PostExecute]),
        );
        assert_eq!(bp.describe(), "/Flow/x [preExecute,postExecute] if true");

        let info = BreakpointInfo::of(2, &bp);
        assert_eq!(info.index, 2);
        assert_eq!(info.condition, "true");
    }
}
