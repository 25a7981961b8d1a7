//! Suspend/resume bridge between the pipeline thread and an operator.
//!
//! The pipeline thread parks inside [`DebugControl::block`] when a breakpoint
//! fires. It waits on a condition variable with a bounded poll interval and
//! re-checks, on every wake-up, whether it was resumed, whether the session was
//! stopped, whether the element reports itself stopped and whether the owning
//! run was stopped. Any of these releases the thread.
//!
//! Once the session is stopped it fails open: no later call to `block` parks
//! the thread until [`DebugControl::reset`] is called at the next run start.
//!
//! All state lives behind the single mutex the condition variable waits on.

use crate::debug::breakpoint::BreakpointInfo;
use crate::element::{PipelineElement, Token};
use crate::run::RunHandle;
use crate::stage::Stage;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Default interval between re-checks while blocked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What the blocked pipeline thread is looking at.
#[derive(Debug, Clone)]
pub struct SuspendSnapshot {
    pub element_path: String,
    pub stage: Stage,
    pub token: Option<Token>,
    /// `None` when blocked by step mode without a matching breakpoint.
    pub breakpoint: Option<BreakpointInfo>,
    /// `(expression, rendered value)` pairs.
    pub watches: Vec<(String, String)>,
    pub blocked_at: chrono::DateTime<chrono::Local>,
}

impl SuspendSnapshot {
    pub fn new(element_path: impl Into<String>, stage: Stage, token: Option<Token>) -> Self {
        Self {
            element_path: element_path.into(),
            stage,
            token,
            breakpoint: None,
            watches: Vec::new(),
            blocked_at: chrono::Local::now(),
        }
    }

    pub fn with_breakpoint(mut self, breakpoint: Option<BreakpointInfo>) -> Self {
        self.breakpoint = breakpoint;
        self
    }

    pub fn with_watches(mut self, watches: Vec<(String, String)>) -> Self {
        self.watches = watches;
        self
    }
}

/// Shared flags of one debug session.
#[derive(Debug, Default)]
pub struct SuspendState {
    pub blocked: bool,
    pub stopped: bool,
    pub resume_requested: bool,
    pub step_mode: bool,
    pub disabled: bool,
    /// Number of blocks since the last reset.
    pub block_count: u64,
    pub current: Option<SuspendSnapshot>,
}

/// How a call to [`DebugControl::block`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Released by resume, step, continue or disable.
    Resumed,
    /// Released, or never blocked, because the session or run was stopped.
    Stopped,
    /// The element reported itself stopped while blocked.
    ElementStopped,
    /// Not blocked at all: the session was already stopped or disabled.
    FailedOpen,
}

#[derive(Debug)]
pub struct DebugControl {
    state: Mutex<SuspendState>,
    cond: Condvar,
    poll_interval: Duration,
    owner: Mutex<RunHandle>,
}

impl DebugControl {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(SuspendState::default()),
            cond: Condvar::new(),
            poll_interval,
            owner: Mutex::new(RunHandle::none()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn lock(&self) -> MutexGuard<'_, SuspendState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn owner(&self) -> RunHandle {
        self.owner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_owner(&self, owner: RunHandle) {
        *self.owner.lock().unwrap_or_else(|e| e.into_inner()) = owner;
    }

    /// Clear run-scoped state at the start of a run. Step mode and the
    /// disabled flag are operator settings and survive.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.blocked = false;
        state.stopped = false;
        state.resume_requested = false;
        state.block_count = 0;
        state.current = None;
        self.cond.notify_all();
    }

    /// Whether `block` would return at once without parking: the session is
    /// disabled or stopped, or the owning run has been stopped.
    pub fn fails_open(&self) -> bool {
        let owner = self.owner();
        let mut state = self.lock();
        Self::fails_open_locked(&mut state, &owner)
    }

    fn fails_open_locked(state: &mut SuspendState, owner: &RunHandle) -> bool {
        if state.stopped || state.disabled {
            return true;
        }
        if owner.is_stopped() {
            state.stopped = true;
            return true;
        }
        false
    }

    /// Park the calling thread until released. See the module docs for the
    /// release conditions.
    pub fn block(&self, snapshot: SuspendSnapshot, element: &dyn PipelineElement) -> BlockOutcome {
        let owner = self.owner();
        let mut state = self.lock();

        if Self::fails_open_locked(&mut state, &owner) {
            return BlockOutcome::FailedOpen;
        }

        state.blocked = true;
        state.resume_requested = false;
        state.block_count += 1;
        state.current = Some(snapshot);
        self.cond.notify_all();

        let outcome = loop {
            if state.stopped {
                break BlockOutcome::Stopped;
            }
            if state.resume_requested {
                break BlockOutcome::Resumed;
            }
            if element.is_stopped() {
                break BlockOutcome::ElementStopped;
            }
            if owner.is_stopped() {
                state.stopped = true;
                break BlockOutcome::Stopped;
            }
            state = match self.cond.wait_timeout(state, self.poll_interval) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        };

        state.blocked = false;
        state.resume_requested = false;
        state.current = None;
        self.cond.notify_all();
        outcome
    }

    /// Release a pending block. Returns `false` when nothing was blocked.
    pub fn resume(&self) -> bool {
        let mut state = self.lock();
        if !state.blocked {
            return false;
        }
        state.resume_requested = true;
        self.cond.notify_all();
        true
    }

    pub fn set_step_mode(&self, enabled: bool) {
        self.lock().step_mode = enabled;
    }

    /// Enable step mode and release a pending block.
    pub fn step(&self) -> bool {
        let mut state = self.lock();
        state.step_mode = true;
        self.release_locked(&mut state)
    }

    /// Disable step mode and release a pending block.
    pub fn continue_execution(&self) -> bool {
        let mut state = self.lock();
        state.step_mode = false;
        self.release_locked(&mut state)
    }

    fn release_locked(&self, state: &mut SuspendState) -> bool {
        if !state.blocked {
            return false;
        }
        state.resume_requested = true;
        self.cond.notify_all();
        true
    }

    /// Mark the session stopped, release any block and forward the stop to
    /// the owning run.
    pub fn stop(&self, message: &str) {
        // The run must observe its stop flag once the pipeline thread wakes.
        if !self.owner().request_stop(message) {
            tracing::debug!("Stop requested with no run attached: {}", message);
        }
        let mut state = self.lock();
        state.stopped = true;
        self.cond.notify_all();
    }

    /// Disabling while blocked releases the block.
    pub fn set_disabled(&self, disabled: bool) {
        let mut state = self.lock();
        state.disabled = disabled;
        if disabled {
            self.release_locked(&mut state);
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.lock().blocked
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn is_disabled(&self) -> bool {
        self.lock().disabled
    }

    pub fn step_mode(&self) -> bool {
        self.lock().step_mode
    }

    pub fn block_count(&self) -> u64 {
        self.lock().block_count
    }

    /// Copy of what the pipeline thread is blocked on, if anything.
    pub fn snapshot(&self) -> Option<SuspendSnapshot> {
        self.lock().current.clone()
    }

    /// Wait until the pipeline thread is blocked and not yet released.
    pub fn wait_until_blocked(&self, timeout: Duration) -> Option<SuspendSnapshot> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if state.blocked && !state.resume_requested {
                return state.current.clone();
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = match self.cond.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl Default for DebugControl {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}
