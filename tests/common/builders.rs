//! Test data builders for creating test objects

use flowhook::element::{PipelineElement, Token};
use flowhook::runner::ElementStep;
use flowhook::{Listener, Result, Stage};
use std::sync::{Arc, Mutex};

/// Shared, ordered record of everything recording listeners saw
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Listener that appends `name:hook:path` for every notification
pub struct RecordingListener {
    name: String,
    log: EventLog,
}

impl RecordingListener {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
        }
    }

    fn record(&self, stage: Stage, element: &dyn PipelineElement) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.name, stage.hook_name(), element.path()));
        Ok(())
    }
}

impl Listener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.log.lock().unwrap().push(format!("{}:start", self.name));
    }

    fn pre_input(&mut self, element: &dyn PipelineElement, _token: Option<&Token>) -> Result<()> {
        self.record(Stage::PreInput, element)
    }

    fn post_input(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.record(Stage::PostInput, element)
    }

    fn pre_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.record(Stage::PreExecute, element)
    }

    fn post_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.record(Stage::PostExecute, element)
    }

    fn pre_output(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.record(Stage::PreOutput, element)
    }

    fn post_output(&mut self, element: &dyn PipelineElement, _token: Option<&Token>) -> Result<()> {
        self.record(Stage::PostOutput, element)
    }

    fn finish(&mut self) {
        self.log.lock().unwrap().push(format!("{}:finish", self.name));
    }
}

/// Builder for a step that passes an integer through an element
pub struct StepBuilder {
    path: String,
    input: Option<i64>,
    output: Option<i64>,
}

impl StepBuilder {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            input: None,
            output: None,
        }
    }

    pub fn input(mut self, value: i64) -> Self {
        self.input = Some(value);
        self
    }

    pub fn output(mut self, value: i64) -> Self {
        self.output = Some(value);
        self
    }

    pub fn build(self) -> ElementStep {
        let mut step = ElementStep::new(self.path);
        if let Some(input) = self.input {
            step = step.with_input(input);
        }
        if let Some(output) = self.output {
            step = step.with_output(output);
        }
        step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_builder() {
        let step = StepBuilder::new("/Flow/x").input(3).build();

        assert_eq!(step.element.path(), "/Flow/x");
        assert_eq!(step.input.as_ref().and_then(Token::as_int), Some(3));
        assert!(step.output.is_none());
    }
}
