//! # flowhook: execution listeners and breakpoint debugging for dataflow pipelines
//!
//! An external pipeline engine runs elements ("actors") one stage at a time and
//! notifies a [`listener::Listener`] at six points of each element's cycle:
//!
//! ```text
//! preInput → postInput → preExecute → postExecute → preOutput → postOutput
//! ```
//!
//! Listeners count, time, trace and log those notifications, answer remote
//! introspection requests, or suspend the pipeline thread at a breakpoint
//! until an operator resumes it.
//!
//! ## Architecture
//!
//! - **Listener protocol**: one top-level listener per run, fan-out through
//!   [`listener::MultiListener`], runtime attach through [`listener::ListenerSlot`]
//! - **Debugging**: breakpoints, scope restrictions and the suspend/resume bridge
//!   in [`debug`], operated through a [`debug::DebugHandle`] from another thread
//! - **Scripting**: Rhai-based conditions and watch expressions
//! - **Communication**: listener state reaches observers through a bounded
//!   crossbeam channel that never blocks the pipeline thread
//! - **Configuration**: TOML/JSON listener descriptions built by
//!   [`listener::ListenerRegistry`]
//!
//! ## Example
//!
//! ```ignore
//! use flowhook::{
//!     debug::Breakpoint,
//!     listener::ListenerSlot,
//!     runner::{ElementStep, ScriptedRun},
//!     run::FlowNode,
//!     stage::{Stage, StageSet},
//! };
//!
//! let mut slot = ListenerSlot::null();
//! let handle = slot.add_breakpoint(Breakpoint::at_path("/Flow/Display", StageSet::only(Stage::PreExecute)));
//!
//! let mut run = ScriptedRun::new(FlowNode::leaf("Flow"), slot)
//!     .with_steps(vec![ElementStep::new("/Flow/Display").with_input(42i64)]);
//! let worker = std::thread::spawn(move || run.run());
//!
//! let snapshot = handle.wait_until_blocked(std::time::Duration::from_secs(1));
//! handle.resume();
//! worker.join();
//! ```

pub mod config;
pub mod debug;
pub mod element;
pub mod error;
pub mod listener;
pub mod run;
pub mod runner;
pub mod scripting;
pub mod stage;

// Re-export commonly used types
pub use config::{InstrumentationConfig, ListenerSpec};
pub use debug::{Breakpoint, DebugHandle, DebugListener};
pub use element::{NamedElement, PipelineElement, Token};
pub use error::{FlowHookError, Result};
pub use listener::{Listener, ListenerRegistry, ListenerSlot, MultiListener};
pub use run::{FlowRun, RunHandle};
pub use stage::{Stage, StageSet};
