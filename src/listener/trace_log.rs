//! ExecutionLog: one tab-separated line per notification for a chosen set
//! of stages.
//!
//! ```text
//! 2024-05-01 12:00:00.123	/Flow/Display	preInput	token received	int:42
//! ```
//!
//! Lines go to a file when one is configured, otherwise to standard output.
//! These lines are data, not diagnostics, so they bypass `tracing`.

use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::listener::Listener;
use crate::stage::{Stage, StageSet};
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::PathBuf;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn stage_message(stage: Stage) -> &'static str {
    match stage {
        Stage::PreInput => "token received",
        Stage::PostInput => "input accepted",
        Stage::PreExecute => "executing",
        Stage::PostExecute => "executed",
        Stage::PreOutput => "output requested",
        Stage::PostOutput => "token emitted",
    }
}

/// Format one log line, without the trailing newline.
pub fn format_line(
    timestamp: chrono::DateTime<chrono::Local>,
    element: &dyn PipelineElement,
    stage: Stage,
    token: Option<&Token>,
) -> String {
    let mut line = format!(
        "{}\t{}\t{}\t{}",
        timestamp.format(TIMESTAMP_FORMAT),
        element.path(),
        stage.hook_name(),
        stage_message(stage)
    );
    if let Some(token) = token {
        line.push('\t');
        line.push_str(&token.identity());
    }
    line
}

pub struct ExecutionLog {
    stages: StageSet,
    output_file: Option<PathBuf>,
    log_tokens: bool,
    writer: Option<Box<dyn Write + Send>>,
    lines_written: u64,
}

impl ExecutionLog {
    /// Log `stages` to standard output.
    pub fn new(stages: StageSet) -> Self {
        Self {
            stages,
            output_file: None,
            log_tokens: false,
            writer: None,
            lines_written: 0,
        }
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// Append the token identity to lines of hooks that carry one.
    pub fn with_tokens(mut self, log_tokens: bool) -> Self {
        self.log_tokens = log_tokens;
        self
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn stages(&self) -> StageSet {
        self.stages
    }

    /// Whether output is open; false after a failure.
    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    fn open_output(&mut self) {
        self.writer = match &self.output_file {
            None => Some(Box::new(io::stdout()) as Box<dyn Write + Send>),
            Some(path) => match File::create(path) {
                Ok(f) => {
                    tracing::info!("Execution log opened file: {:?}", path);
                    Some(Box::new(LineWriter::new(f)) as Box<dyn Write + Send>)
                }
                Err(e) => {
                    tracing::error!("Execution log failed to open file {:?}: {}", path, e);
                    None
                }
            },
        };
    }

    fn log(&mut self, element: &dyn PipelineElement, stage: Stage, token: Option<&Token>) {
        if !self.stages.contains(stage) {
            return;
        }
        let Some(ref mut writer) = self.writer else {
            return;
        };

        let token = if self.log_tokens { token } else { None };
        let line = format_line(chrono::Local::now(), element, stage, token);
        match writeln!(writer, "{}", line) {
            Ok(()) => self.lines_written += 1,
            Err(e) => {
                tracing::error!("Execution log write failed, disabling for this run: {}", e);
                self.writer = None;
            }
        }
    }
}

impl Listener for ExecutionLog {
    fn name(&self) -> &str {
        "log"
    }

    fn start(&mut self) {
        self.lines_written = 0;
        self.open_output();
    }

    fn pre_input(&mut self, element: &dyn PipelineElement, token: Option<&Token>) -> Result<()> {
        self.log(element, Stage::PreInput, token);
        Ok(())
    }

    fn post_input(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.log(element, Stage::PostInput, None);
        Ok(())
    }

    fn pre_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.log(element, Stage::PreExecute, None);
        Ok(())
    }

    fn post_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.log(element, Stage::PostExecute, None);
        Ok(())
    }

    fn pre_output(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.log(element, Stage::PreOutput, None);
        Ok(())
    }

    fn post_output(&mut self, element: &dyn PipelineElement, token: Option<&Token>) -> Result<()> {
        self.log(element, Stage::PostOutput, token);
        Ok(())
    }

    fn finish(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::error!("Execution log failed to flush: {}", e);
            }
        }
    }
}
