//! ExecutionCounter: counts how often each element finished executing.

use crate::element::PipelineElement;
use crate::error::Result;
use crate::listener::{
    FrameSize, HasDefaultFrameSize, HasDisplayModel, Listener, ListenerMessage, ObserverSender,
    TableSnapshot, DEFAULT_REFRESH_INTERVAL,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Counts POST_EXECUTE notifications per element path.
pub struct ExecutionCounter {
    counts: BTreeMap<String, u64>,
    refresh_interval: u64,
    since_refresh: u64,
    latest: Arc<RwLock<TableSnapshot>>,
    observer: Option<ObserverSender>,
}

impl ExecutionCounter {
    pub fn new() -> Self {
        Self::with_refresh_interval(DEFAULT_REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(refresh_interval: u64) -> Self {
        Self {
            counts: BTreeMap::new(),
            refresh_interval: refresh_interval.max(1),
            since_refresh: 0,
            latest: Arc::new(RwLock::new(TableSnapshot::new("counter", &["path", "count"]))),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: ObserverSender) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }

    pub fn count(&self, path: &str) -> u64 {
        self.counts.get(path).copied().unwrap_or(0)
    }

    /// Shared slot holding the most recently refreshed table.
    pub fn latest(&self) -> Arc<RwLock<TableSnapshot>> {
        Arc::clone(&self.latest)
    }

    fn refresh(&mut self) {
        self.since_refresh = 0;
        let snapshot = self.display_model();
        if let Some(observer) = &self.observer {
            observer.publish(ListenerMessage::Table(snapshot.clone()));
        }
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = snapshot;
    }
}

impl Default for ExecutionCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Listener for ExecutionCounter {
    fn name(&self) -> &str {
        "counter"
    }

    fn start(&mut self) {
        self.counts.clear();
        self.refresh();
    }

    fn post_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        *self.counts.entry(element.path().to_string()).or_insert(0) += 1;
        self.since_refresh += 1;
        if self.since_refresh >= self.refresh_interval {
            self.refresh();
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.refresh();
        tracing::debug!("Counter finished with {} elements", self.counts.len());
    }

    fn as_display_model(&self) -> Option<&dyn HasDisplayModel> {
        Some(self)
    }

    fn as_frame_sized(&self) -> Option<&dyn HasDefaultFrameSize> {
        Some(self)
    }
}

impl HasDisplayModel for ExecutionCounter {
    fn display_model(&self) -> TableSnapshot {
        let mut table = TableSnapshot::new("counter", &["path", "count"]);
        for (path, count) in &self.counts {
            table.push_row(vec![path.clone(), count.to_string()]);
        }
        table
    }
}

impl HasDefaultFrameSize for ExecutionCounter {
    fn default_frame_size(&self) -> FrameSize {
        FrameSize::DEFAULT
    }
}
