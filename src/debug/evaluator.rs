//! First-match breakpoint search.
//!
//! Finding the triggering breakpoint is kept free of side effects; recording
//! the trigger and blocking the thread are up to the caller.

use crate::debug::breakpoint::Breakpoint;
use crate::debug::scope::ScopeRestriction;
use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::stage::Stage;

/// Index of the first breakpoint, in registration order, that fires for
/// `(element, stage, token)`.
///
/// Disabled breakpoints and breakpoints not participating in `stage` are
/// skipped without evaluation. The scope is consulted once, lazily, before
/// the first candidate's condition; when it refuses, nothing fires.
/// Condition errors propagate and end the search.
pub fn find_trigger(
    breakpoints: &[Breakpoint],
    scope: &dyn ScopeRestriction,
    element: &dyn PipelineElement,
    stage: Stage,
    token: Option<&Token>,
) -> Result<Option<usize>> {
    let mut in_scope = None;

    for (index, breakpoint) in breakpoints.iter().enumerate() {
        if !breakpoint.enabled || !breakpoint.participates_in(stage) {
            continue;
        }

        let permitted = match in_scope {
            Some(permitted) => permitted,
            None => {
                let permitted = scope.permits(element, stage)?;
                in_scope = Some(permitted);
                permitted
            }
        };
        if !permitted {
            return Ok(None);
        }

        if breakpoint.fires(element, stage, token)? {
            return Ok(Some(index));
        }
    }

    Ok(None)
}
