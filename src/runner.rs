//! Scripted run: drives a listener through a fixed sequence of element steps.
//!
//! Stands in for the pipeline engine: it calls `start` once, the stage hooks
//! of each step in protocol order, and `finish` once, even when a hook fails
//! or the run is stopped. Each step runs on the calling thread, which is the
//! thread a debug listener suspends.
//!
//! ```text
//! per step: [preInput → postInput] → preExecute → (work) → postExecute → [preOutput → postOutput]
//! ```
//!
//! Input stages only happen for steps with an input token, output stages only
//! for steps producing one.

use crate::element::{NamedElement, PipelineElement, Token};
use crate::error::Result;
use crate::listener::ListenerSlot;
use crate::run::{FlowNode, FlowRun, FlowRunState, RunHandle};
use crate::stage::Stage;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// One element's turn in the scripted run.
#[derive(Debug, Clone)]
pub struct ElementStep {
    pub element: Arc<NamedElement>,
    pub input: Option<Token>,
    pub output: Option<Token>,
    /// Simulated execution time.
    pub work: Duration,
}

impl ElementStep {
    pub fn new(path: impl Into<String>) -> Self {
        Self::for_element(Arc::new(NamedElement::new(path)))
    }

    /// Step for an element the caller keeps a handle to (e.g. to stop it).
    pub fn for_element(element: Arc<NamedElement>) -> Self {
        Self {
            element,
            input: None,
            output: None,
            work: Duration::ZERO,
        }
    }

    pub fn with_input(mut self, token: impl Into<Token>) -> Self {
        self.input = Some(token.into());
        self
    }

    pub fn with_output(mut self, token: impl Into<Token>) -> Self {
        self.output = Some(token.into());
        self
    }

    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }
}

/// How a scripted run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps that went through all their stages.
    pub completed: usize,
    /// Steps cut short because their element stopped itself.
    pub abandoned: usize,
    pub stopped: bool,
    pub stop_message: Option<String>,
    pub elapsed: Duration,
}

pub struct ScriptedRun {
    state: Arc<FlowRunState>,
    steps: Vec<ElementStep>,
    slot: ListenerSlot,
}

impl ScriptedRun {
    pub fn new(root: FlowNode, mut slot: ListenerSlot) -> Self {
        let state = FlowRunState::new(root);
        slot.set_owner(RunHandle::new(&state));
        Self {
            state,
            steps: Vec::new(),
            slot,
        }
    }

    pub fn with_steps(mut self, steps: Vec<ElementStep>) -> Self {
        self.steps = steps;
        self
    }

    pub fn push_step(&mut self, step: ElementStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[ElementStep] {
        &self.steps
    }

    pub fn state(&self) -> &Arc<FlowRunState> {
        &self.state
    }

    pub fn slot(&self) -> &ListenerSlot {
        &self.slot
    }

    pub fn slot_mut(&mut self) -> &mut ListenerSlot {
        &mut self.slot
    }

    /// Execute every step once. `finish` is called even when a hook fails.
    pub fn run(&mut self) -> Result<RunSummary> {
        self.state.reset();
        let started = Instant::now();
        tracing::info!(steps = self.steps.len(), "Run started");

        self.slot.start();
        let outcome = run_steps(&self.state, &self.steps, &mut self.slot);
        self.slot.finish();

        let (completed, abandoned) = outcome?;
        let summary = RunSummary {
            completed,
            abandoned,
            stopped: self.state.is_stopped(),
            stop_message: self.state.stop_message(),
            elapsed: started.elapsed(),
        };
        tracing::info!(
            completed = summary.completed,
            stopped = summary.stopped,
            "Run finished in {:?}",
            summary.elapsed
        );
        Ok(summary)
    }
}

enum StepEnd {
    Completed,
    Abandoned,
    RunStopped,
}

fn run_steps(
    state: &FlowRunState,
    steps: &[ElementStep],
    slot: &mut ListenerSlot,
) -> Result<(usize, usize)> {
    let mut completed = 0;
    let mut abandoned = 0;
    for step in steps {
        match run_step(state, step, slot)? {
            StepEnd::Completed => completed += 1,
            StepEnd::Abandoned => abandoned += 1,
            StepEnd::RunStopped => {
                tracing::debug!("Run stopped before {}", step.element.path());
                break;
            }
        }
    }
    Ok((completed, abandoned))
}

fn run_step(state: &FlowRunState, step: &ElementStep, slot: &mut ListenerSlot) -> Result<StepEnd> {
    let element = step.element.as_ref();
    let halted = || {
        if state.is_stopped() {
            Some(StepEnd::RunStopped)
        } else if element.is_stopped() {
            Some(StepEnd::Abandoned)
        } else {
            None
        }
    };

    if let Some(end) = halted() {
        return Ok(end);
    }

    if let Some(input) = &step.input {
        slot.dispatch(Stage::PreInput, element, Some(input))?;
        slot.dispatch(Stage::PostInput, element, None)?;
        if let Some(end) = halted() {
            return Ok(end);
        }
    }

    slot.dispatch(Stage::PreExecute, element, None)?;
    if let Some(end) = halted() {
        return Ok(end);
    }
    if !step.work.is_zero() {
        thread::sleep(step.work);
    }
    slot.dispatch(Stage::PostExecute, element, None)?;

    if let Some(output) = &step.output {
        if let Some(end) = halted() {
            return Ok(end);
        }
        slot.dispatch(Stage::PreOutput, element, None)?;
        slot.dispatch(Stage::PostOutput, element, Some(output))?;
    }

    Ok(StepEnd::Completed)
}
