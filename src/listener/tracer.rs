//! OccurrenceTracer: one row per completed PRE/POST pair, written through
//! to a file as it happens.

use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::listener::delimited::{format_millis, Delimiter};
use crate::listener::timer::timing_key;
use crate::listener::Listener;
use crate::stage::Stage;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, LineWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

pub struct OccurrenceTracer {
    output_file: PathBuf,
    delimiter: Delimiter,
    writer: Option<LineWriter<File>>,
    started: HashMap<String, Instant>,
    rows_written: u64,
}

impl OccurrenceTracer {
    pub fn new(output_file: impl Into<PathBuf>, delimiter: Delimiter) -> Self {
        Self {
            output_file: output_file.into(),
            delimiter,
            writer: None,
            started: HashMap::new(),
            rows_written: 0,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Whether the output file is open; false after a failure.
    pub fn is_active(&self) -> bool {
        self.writer.is_some()
    }

    fn open_file(&mut self) {
        match fs::remove_file(&self.output_file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Tracer could not remove {:?}: {}", self.output_file, e);
            }
        }

        let opened = File::create(&self.output_file).and_then(|f| {
            let mut writer = LineWriter::new(f);
            writeln!(
                writer,
                "{}",
                self.delimiter.join(&["path", "type", "milliseconds"])
            )?;
            Ok(writer)
        });

        match opened {
            Ok(writer) => {
                self.writer = Some(writer);
                tracing::info!("Tracer opened file: {:?}", self.output_file);
            }
            Err(e) => {
                self.writer = None;
                tracing::error!("Tracer failed to open file {:?}: {}", self.output_file, e);
            }
        }
    }

    fn close_file(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::error!("Tracer failed to flush {:?}: {}", self.output_file, e);
            }
        }
        if self.rows_written > 0 {
            tracing::info!("Tracer closed file after {} rows", self.rows_written);
        }
    }

    fn begin(&mut self, element: &dyn PipelineElement, stage: Stage) {
        if self.writer.is_none() {
            return;
        }
        self.started
            .insert(timing_key(element.path(), stage.phase()), Instant::now());
    }

    fn end(&mut self, element: &dyn PipelineElement, stage: Stage) {
        let Some(ref mut writer) = self.writer else {
            return;
        };
        let Some(begun) = self.started.remove(&timing_key(element.path(), stage.phase())) else {
            return;
        };

        let row = self.delimiter.join(&[
            element.path(),
            stage.phase().name(),
            format_millis(begun.elapsed()).as_str(),
        ]);
        match writeln!(writer, "{}", row) {
            Ok(()) => self.rows_written += 1,
            Err(e) => {
                tracing::error!(
                    "Tracer failed to write {:?}, disabling for this run: {}",
                    self.output_file,
                    e
                );
                self.writer = None;
            }
        }
    }
}

impl Listener for OccurrenceTracer {
    fn name(&self) -> &str {
        "tracer"
    }

    fn start(&mut self) {
        self.started.clear();
        self.rows_written = 0;
        self.open_file();
    }

    fn pre_input(&mut self, element: &dyn PipelineElement, _token: Option<&Token>) -> Result<()> {
        self.begin(element, Stage::PreInput);
        Ok(())
    }

    fn post_input(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.end(element, Stage::PostInput);
        Ok(())
    }

    fn pre_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.begin(element, Stage::PreExecute);
        Ok(())
    }

    fn post_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.end(element, Stage::PostExecute);
        Ok(())
    }

    fn pre_output(&mut self, element: &dyn PipelineElement) -> Result<()> {
        self.begin(element, Stage::PreOutput);
        Ok(())
    }

    fn post_output(&mut self, element: &dyn PipelineElement, _token: Option<&Token>) -> Result<()> {
        self.end(element, Stage::PostOutput);
        Ok(())
    }

    fn finish(&mut self) {
        self.close_file();
        self.started.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::NamedElement;

    #[test]
    fn test_rows_written_through() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let mut tracer = OccurrenceTracer::new(&path, Delimiter::Comma);
        let element = NamedElement::new("/Flow/a");

        tracer.start();
        tracer.pre_execute(&element).unwrap();
        tracer.post_execute(&element).unwrap();

        // line buffered: visible before finish
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "path,type,milliseconds");
        assert!(lines[1].starts_with("/Flow/a,execute,"));

        tracer.finish();
        assert_eq!(tracer.rows_written(), 1);
    }

    #[test]
    fn test_start_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.tsv");
        fs::write(&path, "stale\tdata\n").unwrap();

        let mut tracer = OccurrenceTracer::new(&path, Delimiter::Tab);
        tracer.start();
        tracer.finish();

        assert_eq!(fs::read_to_string(&path).unwrap(), "path\ttype\tmilliseconds\n");
    }

    #[test]
    fn test_open_failure_degrades_to_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("trace.tsv");
        let mut tracer = OccurrenceTracer::new(&path, Delimiter::Tab);
        let element = NamedElement::new("/a");

        tracer.start();
        assert!(!tracer.is_active());
        tracer.pre_execute(&element).unwrap();
        tracer.post_execute(&element).unwrap();
        tracer.finish();
        assert_eq!(tracer.rows_written(), 0);
    }
}
