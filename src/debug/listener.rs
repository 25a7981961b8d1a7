//! DebugListener: suspends the pipeline thread when a breakpoint fires or
//! when stepping, and hands control to an operator holding a [`DebugHandle`].

use crate::debug::breakpoint::{Breakpoint, BreakpointInfo};
use crate::debug::condition::Watch;
use crate::debug::control::{BlockOutcome, DebugControl, SuspendSnapshot, DEFAULT_POLL_INTERVAL};
use crate::debug::evaluator::find_trigger;
use crate::debug::scope::{ScopeRestriction, Unrestricted};
use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::listener::{
    FrameSize, HasDefaultFrameSize, Listener, ListenerMessage, ObserverSender,
};
use crate::run::RunHandle;
use crate::stage::{Stage, StageSet};
use std::sync::Arc;
use std::time::Duration;

/// Operator side of a debug session. Cheap to clone and safe to use from any
/// thread.
#[derive(Debug, Clone)]
pub struct DebugHandle {
    control: Arc<DebugControl>,
}

impl DebugHandle {
    pub fn new(control: Arc<DebugControl>) -> Self {
        Self { control }
    }

    /// Release the pipeline thread. Returns `false` when it was not blocked.
    pub fn resume(&self) -> bool {
        self.control.resume()
    }

    /// Block again at the next step stage, then release.
    pub fn step(&self) -> bool {
        self.control.step()
    }

    /// Leave step mode, then release.
    pub fn continue_execution(&self) -> bool {
        self.control.continue_execution()
    }

    pub fn set_step_mode(&self, enabled: bool) {
        self.control.set_step_mode(enabled);
    }

    pub fn step_mode(&self) -> bool {
        self.control.step_mode()
    }

    pub fn stop(&self, message: &str) {
        self.control.stop(message);
    }

    pub fn disable(&self) {
        self.control.set_disabled(true);
    }

    pub fn enable(&self) {
        self.control.set_disabled(false);
    }

    pub fn is_disabled(&self) -> bool {
        self.control.is_disabled()
    }

    pub fn is_blocked(&self) -> bool {
        self.control.is_blocked()
    }

    pub fn is_stopped(&self) -> bool {
        self.control.is_stopped()
    }

    pub fn block_count(&self) -> u64 {
        self.control.block_count()
    }

    pub fn snapshot(&self) -> Option<SuspendSnapshot> {
        self.control.snapshot()
    }

    pub fn wait_until_blocked(&self, timeout: Duration) -> Option<SuspendSnapshot> {
        self.control.wait_until_blocked(timeout)
    }
}

pub struct DebugListener {
    breakpoints: Vec<Breakpoint>,
    scope: Box<dyn ScopeRestriction>,
    step_stages: StageSet,
    watches: Vec<Watch>,
    control: Arc<DebugControl>,
    observer: Option<ObserverSender>,
    frame_size: FrameSize,
    /// Token of the last `preInput`, reported until that element finishes
    /// executing.
    last_input: Option<(String, Token)>,
}

impl DebugListener {
    pub fn new() -> Self {
        Self {
            breakpoints: Vec::new(),
            scope: Box::new(Unrestricted),
            step_stages: StageSet::only(Stage::PreExecute),
            watches: Vec::new(),
            control: Arc::new(DebugControl::new(DEFAULT_POLL_INTERVAL)),
            observer: None,
            frame_size: FrameSize::DEBUG,
            last_input: None,
        }
    }

    pub fn with_breakpoints(mut self, breakpoints: Vec<Breakpoint>) -> Self {
        self.breakpoints = breakpoints;
        self
    }

    pub fn with_scope(mut self, scope: Box<dyn ScopeRestriction>) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_step_mode(self, enabled: bool) -> Self {
        self.control.set_step_mode(enabled);
        self
    }

    pub fn with_step_stages(mut self, stages: StageSet) -> Self {
        self.step_stages = stages;
        self
    }

    /// Evaluated whenever the thread blocks, after the breakpoint's own
    /// watches.
    pub fn with_watch(mut self, watch: Watch) -> Self {
        self.watches.push(watch);
        self
    }

    /// Replaces the control; handles taken earlier no longer apply.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        let control = DebugControl::new(poll_interval);
        control.set_step_mode(self.control.step_mode());
        control.set_disabled(self.control.is_disabled());
        self.control = Arc::new(control);
        self
    }

    pub fn with_frame_size(mut self, frame_size: FrameSize) -> Self {
        self.frame_size = frame_size;
        self
    }

    pub fn with_observer(mut self, observer: ObserverSender) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn handle(&self) -> DebugHandle {
        DebugHandle::new(Arc::clone(&self.control))
    }

    pub fn control(&self) -> &Arc<DebugControl> {
        &self.control
    }

    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) {
        tracing::debug!("Breakpoint added: {}", breakpoint);
        self.breakpoints.push(breakpoint);
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn breakpoints_mut(&mut self) -> &mut Vec<Breakpoint> {
        &mut self.breakpoints
    }

    pub fn scope(&self) -> &dyn ScopeRestriction {
        self.scope.as_ref()
    }

    pub fn step_stages(&self) -> StageSet {
        self.step_stages
    }

    fn publish(&self, msg: ListenerMessage) {
        if let Some(observer) = &self.observer {
            observer.publish(msg);
        }
    }

    fn remembered_token(&self, element: &dyn PipelineElement, stage: Stage) -> Option<Token> {
        match stage {
            Stage::PostInput | Stage::PreExecute | Stage::PostExecute => self
                .last_input
                .as_ref()
                .filter(|(path, _)| path == element.path())
                .map(|(_, token)| token.clone()),
            _ => None,
        }
    }

    fn on_stage(
        &mut self,
        element: &dyn PipelineElement,
        stage: Stage,
        token: Option<&Token>,
    ) -> Result<()> {
        // A stopped run must not consume one-off breakpoints.
        if self.control.fails_open() {
            return Ok(());
        }

        let hit = find_trigger(&self.breakpoints, self.scope.as_ref(), element, stage, token)?;
        let stepping = hit.is_none()
            && self.control.step_mode()
            && self.step_stages.contains(stage)
            && self.scope.permits(element, stage)?;
        if hit.is_none() && !stepping {
            return Ok(());
        }

        let info = match hit {
            Some(index) => {
                let breakpoint = &mut self.breakpoints[index];
                breakpoint.record_trigger();
                tracing::info!(
                    "{}/{}: {}",
                    breakpoint.describe(),
                    stage.hook_name(),
                    element.path()
                );
                Some(BreakpointInfo::of(index, breakpoint))
            }
            None => {
                tracing::info!("step/{}: {}", stage.hook_name(), element.path());
                None
            }
        };

        let shown = token.cloned().or_else(|| self.remembered_token(element, stage));
        let own_watches = hit
            .map(|index| self.breakpoints[index].watches.as_slice())
            .unwrap_or(&[]);
        let watches = own_watches
            .iter()
            .chain(self.watches.iter())
            .map(|watch| watch.render(element, stage, shown.as_ref()))
            .collect();

        let snapshot = SuspendSnapshot::new(element.path(), stage, shown)
            .with_breakpoint(info)
            .with_watches(watches);
        self.publish(ListenerMessage::BreakpointReached(snapshot.clone()));

        let outcome = self.control.block(snapshot, element);
        match outcome {
            BlockOutcome::Resumed => {}
            other => tracing::debug!("Released {} with {:?}", element.path(), other),
        }
        self.publish(ListenerMessage::Released {
            element_path: element.path().to_string(),
            outcome,
        });
        Ok(())
    }
}

impl Default for DebugListener {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener for DebugListener {
    fn name(&self) -> &str {
        "debug"
    }

    fn set_owner(&mut self, owner: RunHandle) {
        self.control.set_owner(owner);
    }

    fn start(&mut self) {
        self.control.reset();
        self.last_input = None;
        tracing::debug!(
            breakpoints = self.breakpoints.len(),
            scope = %self.scope.describe(),
            "Debug session started"
        );
    }

    fn pre_input(&mut self, element: &dyn PipelineElement, token: Option<&Token>) -> Result<()> {
        self.last_input = token.map(|t| (element.path().to_string(), t.clone()));
        self.on_stage(element, Stage::PreInput, token)
    }

    fn post_input(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.on_stage(element, Stage::PostInput, None)
    }

    fn pre_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.on_stage(element, Stage::PreExecute, None)
    }

    fn post_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        let result = self.on_stage(element, Stage::PostExecute, None);
        if matches!(&self.last_input, Some((path, _)) if path == element.path()) {
            self.last_input = None;
        }
        result
    }

    fn pre_output(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.on_stage(element, Stage::PreOutput, None)
    }

    fn post_output(&mut self, element: &dyn PipelineElement, token: Option<&Token>) -> Result<()> {
        self.on_stage(element, Stage::PostOutput, token)
    }

    fn finish(&mut self) {
        self.last_input = None;
        for (index, breakpoint) in self.breakpoints.iter().enumerate() {
            if breakpoint.trigger_count() > 0 {
                tracing::debug!(
                    "Breakpoint {} ({}) triggered {} times",
                    index,
                    breakpoint,
                    breakpoint.trigger_count()
                );
            }
        }
        self.publish(ListenerMessage::Finished {
            listener: self.name().to_string(),
        });
    }

    fn as_frame_sized(&self) -> Option<&dyn HasDefaultFrameSize> {
        Some(self)
    }

    fn as_debug_mut(&mut self) -> Option<&mut DebugListener> {
        Some(self)
    }
}

impl HasDefaultFrameSize for DebugListener {
    fn default_frame_size(&self) -> FrameSize {
        self.frame_size
    }
}
