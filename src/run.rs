//! The owning pipeline run, seen from the listener side.
//!
//! Listeners keep a non-owning [`RunHandle`] back to the run they are attached
//! to. The handle is only ever used for read-only queries (has the run been
//! stopped? what does it look like?) and for forwarding an operator's stop
//! request; it never extends the run's lifetime.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// A pipeline run that listeners can query.
pub trait FlowRun: Send + Sync {
    /// Whether a stop has been requested for this run.
    fn is_stopped(&self) -> bool;

    /// Ask the run to stop cooperatively.
    fn request_stop(&self, message: &str);

    /// Nested, human-readable structural description of the run.
    fn describe(&self) -> String;
}

/// Weak back-reference from a listener to its owning run.
#[derive(Clone, Default)]
pub struct RunHandle {
    run: Option<Weak<dyn FlowRun>>,
}

impl RunHandle {
    /// Handle that is not attached to any run.
    pub fn none() -> Self {
        Self { run: None }
    }

    pub fn new<R: FlowRun + 'static>(run: &Arc<R>) -> Self {
        let run: Arc<dyn FlowRun> = run.clone();
        Self::from_dyn(&run)
    }

    pub fn from_dyn(run: &Arc<dyn FlowRun>) -> Self {
        Self {
            run: Some(Arc::downgrade(run)),
        }
    }

    /// Whether the handle was attached to a run that is still alive.
    pub fn is_attached(&self) -> bool {
        self.upgrade().is_some()
    }

    /// Stop status of the owning run.
    ///
    /// A detached handle reports `false`; a handle whose run has been dropped
    /// reports `true`, since nothing is left to resume.
    pub fn is_stopped(&self) -> bool {
        match &self.run {
            None => false,
            Some(weak) => weak.upgrade().map_or(true, |run| run.is_stopped()),
        }
    }

    /// Forward a stop request. Returns `false` when no live run is attached.
    pub fn request_stop(&self, message: &str) -> bool {
        match self.upgrade() {
            Some(run) => {
                run.request_stop(message);
                true
            }
            None => false,
        }
    }

    pub fn describe(&self) -> Option<String> {
        self.upgrade().map(|run| run.describe())
    }

    fn upgrade(&self) -> Option<Arc<dyn FlowRun>> {
        self.run.as_ref().and_then(Weak::upgrade)
    }
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.run {
            None => "detached",
            Some(weak) if weak.strong_count() > 0 => "attached",
            Some(_) => "dropped",
        };
        f.debug_tuple("RunHandle").field(&state).finish()
    }
}

/// One node of a run's structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowNode {
    pub name: String,
    pub children: Vec<FlowNode>,
}

impl FlowNode {
    pub fn leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(name: impl Into<String>, children: Vec<FlowNode>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }

    /// Indented description, two spaces per nesting level, one node per line.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.write_description(&mut out, 0);
        out
    }

    fn write_description(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&self.name);
        out.push('\n');
        for child in &self.children {
            child.write_description(out, depth + 1);
        }
    }

    /// Hierarchical paths of every node, depth first.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        let path = format!("{}/{}", prefix, self.name);
        for child in &self.children {
            child.collect_paths(&path, paths);
        }
        paths.push(path);
    }
}

/// In-process run state: a stop flag plus the structure to describe.
#[derive(Debug)]
pub struct FlowRunState {
    root: FlowNode,
    stopped: AtomicBool,
    stop_message: Mutex<Option<String>>,
}

impl FlowRunState {
    pub fn new(root: FlowNode) -> Arc<Self> {
        Arc::new(Self {
            root,
            stopped: AtomicBool::new(false),
            stop_message: Mutex::new(None),
        })
    }

    pub fn root(&self) -> &FlowNode {
        &self.root
    }

    pub fn stop_message(&self) -> Option<String> {
        self.stop_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Clear the stop flag so the run can be executed again.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        *self.stop_message.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl FlowRun for FlowRunState {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn request_stop(&self, message: &str) {
        tracing::info!("Stop requested: {}", message);
        *self.stop_message.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        self.root.describe()
    }
}
