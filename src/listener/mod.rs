//! Listener protocol
//!
//! A [`Listener`] is bound to one pipeline run at a time. The pipeline engine
//! calls [`Listener::start`] once before the first element is processed, the
//! six stage hooks once per element per stage occurrence, and
//! [`Listener::finish`] once after the last element (or when the run stops).
//!
//! ```text
//! start → (preInput → postInput → preExecute → postExecute → preOutput → postOutput)* → finish
//! ```
//!
//! Every hook defaults to a no-op, so a listener only implements the stages it
//! cares about. Optional capabilities ([`HasDisplayModel`],
//! [`HasDefaultFrameSize`]) are exposed through accessor methods instead of a
//! type hierarchy.
//!
//! Stage hooks return `Result`. The only errors that travel through them are
//! breakpoint evaluation failures; resource failures (files, sockets) are
//! logged by the listener owning the resource, which then degrades to a no-op.

mod attach;
mod bridge;
mod counter;
mod delimited;
mod multi;
mod registry;
mod remote;
mod timer;
mod trace_log;
mod tracer;

pub use attach::ListenerSlot;
pub use bridge::{ListenerMessage, ObserverBridge, ObserverSender, TableSnapshot};
pub use counter::ExecutionCounter;
pub use delimited::Delimiter;
pub use multi::MultiListener;
pub use registry::{ListenerFactory, ListenerRegistry};
pub use remote::{RemoteListener, DEFAULT_PORT, NO_FLOW_RESPONSE};
pub use timer::ExecutionTimer;
pub use trace_log::ExecutionLog;
pub use tracer::OccurrenceTracer;

use crate::debug::DebugListener;
use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::run::RunHandle;
use crate::stage::Stage;

/// Default refresh interval of table listeners, in notifications.
pub const DEFAULT_REFRESH_INTERVAL: u64 = 100;

/// Receives stage notifications across the lifetime of one pipeline run.
pub trait Listener: Send {
    /// Short name used in logs and observer messages.
    fn name(&self) -> &str;

    /// Attach the non-owning back-reference to the run this listener serves.
    fn set_owner(&mut self, _owner: RunHandle) {}

    /// Called once before the first element is processed.
    fn start(&mut self) {}

    fn pre_input(&mut self, _element: &dyn PipelineElement, _token: Option<&Token>) -> Result<()> {
        Ok(())
    }

    fn post_input(&mut self, _element: &dyn PipelineElement) -> Result<()> {
        Ok(())
    }

    fn pre_execute(&mut self, _element: &dyn PipelineElement) -> Result<()> {
        Ok(())
    }

    fn post_execute(&mut self, _element: &dyn PipelineElement) -> Result<()> {
        Ok(())
    }

    fn pre_output(&mut self, _element: &dyn PipelineElement) -> Result<()> {
        Ok(())
    }

    fn post_output(&mut self, _element: &dyn PipelineElement, _token: Option<&Token>) -> Result<()> {
        Ok(())
    }

    /// Called once after the last element. Releases every resource the
    /// listener opened; must be safe to call on a listener never started.
    fn finish(&mut self) {}

    fn as_display_model(&self) -> Option<&dyn HasDisplayModel> {
        None
    }

    fn as_frame_sized(&self) -> Option<&dyn HasDefaultFrameSize> {
        None
    }

    fn as_multi_mut(&mut self) -> Option<&mut MultiListener> {
        None
    }

    fn as_debug_mut(&mut self) -> Option<&mut DebugListener> {
        None
    }

    /// Whether this listener stands for "listening disabled".
    fn is_null(&self) -> bool {
        false
    }
}

/// A listener that can render its state as a table.
pub trait HasDisplayModel {
    /// Owned copy of the current state, safe to hand to another thread.
    fn display_model(&self) -> TableSnapshot;
}

/// Preferred size of a window presenting a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    /// Default for table listeners and for aggregates without sized children.
    pub const DEFAULT: FrameSize = FrameSize {
        width: 800,
        height: 600,
    };

    /// Default for the debug listener.
    pub const DEBUG: FrameSize = FrameSize {
        width: 900,
        height: 600,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

pub trait HasDefaultFrameSize {
    fn default_frame_size(&self) -> FrameSize;

    /// Whether the presenting window is disposed when the run finishes.
    fn dispose_on_finish(&self) -> bool {
        true
    }
}

/// Route a stage notification to the matching hook.
///
/// The token is only forwarded to the hooks that carry one
/// (`preInput` and `postOutput`).
pub fn dispatch(
    listener: &mut dyn Listener,
    stage: Stage,
    element: &dyn PipelineElement,
    token: Option<&Token>,
) -> Result<()> {
    match stage {
        Stage::PreInput => listener.pre_input(element, token),
        Stage::PostInput => listener.post_input(element),
        Stage::PreExecute => listener.pre_execute(element),
        Stage::PostExecute => listener.post_execute(element),
        Stage::PreOutput => listener.pre_output(element),
        Stage::PostOutput => listener.post_output(element, token),
    }
}

/// Listener that disables listening.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl Listener for NullListener {
    fn name(&self) -> &str {
        "null"
    }

    fn is_null(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::NamedElement;

    #[derive(Default)]
    struct StageRecorder {
        seen: Vec<(Stage, Option<i64>)>,
    }

    impl Listener for StageRecorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn pre_input(&mut self, _e: &dyn PipelineElement, token: Option<&Token>) -> Result<()> {
            self.seen.push((Stage::PreInput, token.and_then(Token::as_int)));
            Ok(())
        }

        fn post_execute(&mut self, _e: &dyn PipelineElement) -> Result<()> {
            self.seen.push((Stage::PostExecute, None));
            Ok(())
        }

        fn post_output(&mut self, _e: &dyn PipelineElement, token: Option<&Token>) -> Result<()> {
            self.seen.push((Stage::PostOutput, token.and_then(Token::as_int)));
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_routes_stages() {
        let mut recorder = StageRecorder::default();
        let element = NamedElement::new("/a");
        let token = Token::Int(5);

        for stage in Stage::ALL {
            dispatch(&mut recorder, stage, &element, Some(&token)).unwrap();
        }

        assert_eq!(
            recorder.seen,
            vec![
                (Stage::PreInput, Some(5)),
                (Stage::PostExecute, None),
                (Stage::PostOutput, Some(5)),
            ]
        );
    }

    #[test]
    fn test_null_listener_defaults() {
        let mut null = NullListener;
        let element = NamedElement::new("/a");
        null.start();
        for stage in Stage::ALL {
            assert!(dispatch(&mut null, stage, &element, None).is_ok());
        }
        null.finish();
        assert!(null.is_null());
        assert!(null.as_display_model().is_none());
        assert!(null.as_frame_sized().is_none());
    }
}
