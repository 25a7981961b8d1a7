//! ExecutionTimer: cumulative time spent per element and phase.
//!
//! A PRE hook records a start instant under `"<path> (<phase>)"`; the matching
//! POST hook adds the elapsed time to that key's total. At `finish()` the
//! totals can be written to a delimited file.

use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::listener::delimited::{format_millis, write_table, Delimiter};
use crate::listener::{
    FrameSize, HasDefaultFrameSize, HasDisplayModel, Listener, ListenerMessage, ObserverSender,
    TableSnapshot, DEFAULT_REFRESH_INTERVAL,
};
use crate::stage::{Phase, Stage};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Key under which a phase of an element is timed.
pub fn timing_key(path: &str, phase: Phase) -> String {
    format!("{} ({})", path, phase)
}

pub struct ExecutionTimer {
    started: HashMap<String, Instant>,
    totals: BTreeMap<String, Duration>,
    output_file: Option<PathBuf>,
    delimiter: Delimiter,
    refresh_interval: u64,
    since_refresh: u64,
    latest: Arc<RwLock<TableSnapshot>>,
    observer: Option<ObserverSender>,
}

impl ExecutionTimer {
    pub fn new() -> Self {
        Self {
            started: HashMap::new(),
            totals: BTreeMap::new(),
            output_file: None,
            delimiter: Delimiter::Tab,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            since_refresh: 0,
            latest: Arc::new(RwLock::new(TableSnapshot::new("timer", &["key", "milliseconds"]))),
            observer: None,
        }
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>, delimiter: Delimiter) -> Self {
        self.output_file = Some(path.into());
        self.delimiter = delimiter;
        self
    }

    pub fn with_refresh_interval(mut self, refresh_interval: u64) -> Self {
        self.refresh_interval = refresh_interval.max(1);
        self
    }

    pub fn with_observer(mut self, observer: ObserverSender) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn totals(&self) -> &BTreeMap<String, Duration> {
        &self.totals
    }

    pub fn total(&self, path: &str, phase: Phase) -> Option<Duration> {
        self.totals.get(&timing_key(path, phase)).copied()
    }

    pub fn latest(&self) -> Arc<RwLock<TableSnapshot>> {
        Arc::clone(&self.latest)
    }

    fn begin(&mut self, element: &dyn PipelineElement, stage: Stage) {
        self.started
            .insert(timing_key(element.path(), stage.phase()), Instant::now());
    }

    fn end(&mut self, element: &dyn PipelineElement, stage: Stage) {
        let key = timing_key(element.path(), stage.phase());
        // A POST without its PRE (listener attached mid-cycle) is ignored
        let Some(begun) = self.started.remove(&key) else {
            return;
        };
        *self.totals.entry(key).or_default() += begun.elapsed();

        self.since_refresh += 1;
        if self.since_refresh >= self.refresh_interval {
            self.refresh();
        }
    }

    fn refresh(&mut self) {
        self.since_refresh = 0;
        let snapshot = self.display_model();
        if let Some(observer) = &self.observer {
            observer.publish(ListenerMessage::Table(snapshot.clone()));
        }
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.totals
            .iter()
            .map(|(key, total)| vec![key.clone(), format_millis(*total)])
            .collect()
    }

    fn write_output(&self) {
        let Some(path) = &self.output_file else {
            return;
        };
        match write_table(path, self.delimiter, &["key", "milliseconds"], &self.rows()) {
            Ok(()) => tracing::info!("Timer wrote {} rows to {:?}", self.totals.len(), path),
            Err(e) => tracing::error!("Timer failed to write {:?}: {}", path, e),
        }
    }
}

impl Default for ExecutionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener for ExecutionTimer {
    fn name(&self) -> &str {
        "timer"
    }

    fn start(&mut self) {
        self.started.clear();
        self.totals.clear();
        self.refresh();
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
        self.refresh();
        self.write_output();
        self.started.clear();
    }

    fn as_display_model(&self) -> Option<&dyn HasDisplayModel> {
        Some(self)
    }

    fn as_frame_sized(&self) -> Option<&dyn HasDefaultFrameSize> {
        Some(self)
    }
}

impl HasDisplayModel for ExecutionTimer {
    fn display_model(&self) -> TableSnapshot {
        let mut table = TableSnapshot::new("timer", &["key", "milliseconds"]);
        for row in self.rows() {
            table.push_row(row);
        }
        table
    }
}

impl HasDefaultFrameSize for ExecutionTimer {
    fn default_frame_size(&self) -> FrameSize {
        FrameSize::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::NamedElement;
    use std::thread;

    #[test]
    fn test_accumulates_execute_time() {
        let mut timer = ExecutionTimer::new();
        let element = NamedElement::new("/a");
        timer.start();

        for _ in 0..2 {
            timer.pre_execute(&element).unwrap();
            thread::sleep(Duration::from_millis(10));
            timer.post_execute(&element).unwrap();
        }

        let total = timer.total("/a", Phase::Execute).unwrap();
        assert!(total >= Duration::from_millis(20));
        assert!(timer.total("/a", Phase::Input).is_none());
    }

    #[test]
    fn test_post_without_pre_is_ignored() {
        let mut timer = ExecutionTimer::new();
        timer.start();
        timer.post_output(&NamedElement::new("/a"), None).unwrap();
        assert!(timer.totals().is_empty());
    }

    #[test]
    fn test_writes_sorted_table_on_finish() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timing.tsv");
        let mut timer = ExecutionTimer::new().with_output_file(&path, Delimiter::Tab);

        timer.start();
        for name in ["/b", "/a"] {
            let element = NamedElement::new(name);
            timer.pre_execute(&element).unwrap();
            timer.post_execute(&element).unwrap();
        }
        timer.finish();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "key\tmilliseconds");
        assert!(lines[1].starts_with("/a (execute)\t"));
        assert!(lines[2].starts_with("/b (execute)\t"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_unwritable_output_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("timing.tsv");
        let mut timer = ExecutionTimer::new().with_output_file(&path, Delimiter::Comma);
        timer.start();
        timer.finish();
        assert!(!path.exists());
    }
}
