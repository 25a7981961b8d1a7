//! Breakpoint debugging
//!
//! - [`Breakpoint`]: where and when to suspend, with an optional condition
//! - [`ScopeRestriction`]: which `(element, stage)` pairs are considered at all
//! - [`find_trigger`]: first-match search, free of side effects
//! - [`DebugControl`]: the suspend/resume bridge the pipeline thread parks in
//! - [`DebugListener`]: the listener tying these together, driven by a
//!   [`DebugHandle`] from the operator's thread

mod breakpoint;
mod condition;
mod control;
mod evaluator;
mod listener;
mod scope;

pub use breakpoint::{Breakpoint, BreakpointInfo, BreakpointKind};
pub use condition::{Condition, ConditionFn, Watch};
pub use control::{BlockOutcome, DebugControl, SuspendSnapshot, SuspendState, DEFAULT_POLL_INTERVAL};
pub use evaluator::find_trigger;
pub use listener::{DebugHandle, DebugListener};
pub use scope::{AllOf, ExpressionScope, ScopeRestriction, StageScope, Subtree, Unrestricted};
