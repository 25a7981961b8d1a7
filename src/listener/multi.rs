//! Fan-out over several listeners.

use crate::debug::DebugListener;
use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::listener::{FrameSize, HasDefaultFrameSize, Listener};
use crate::run::RunHandle;

/// Broadcasts every notification to its children in registration order.
///
/// Errors from a child are not caught: the first failing child ends the
/// broadcast for that call and the error reaches the pipeline engine.
#[derive(Default)]
pub struct MultiListener {
    listeners: Vec<Box<dyn Listener>>,
    owner: RunHandle,
}

impl MultiListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listeners(listeners: Vec<Box<dyn Listener>>) -> Self {
        Self {
            listeners,
            owner: RunHandle::none(),
        }
    }

    pub fn add(&mut self, listener: Box<dyn Listener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn listeners(&self) -> &[Box<dyn Listener>] {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut [Box<dyn Listener>] {
        &mut self.listeners
    }

    /// First debug listener among the children, searching nested multi
    /// listeners depth first.
    pub fn find_debug_mut(&mut self) -> Option<&mut DebugListener> {
        for listener in self.listeners.iter_mut() {
            if listener.as_debug_mut().is_some() {
                return listener.as_debug_mut();
            }
            if let Some(found) = listener.as_multi_mut().and_then(MultiListener::find_debug_mut) {
                return Some(found);
            }
        }
        None
    }

    /// Per-axis maximum over children exposing a size, or
    /// [`FrameSize::DEFAULT`] when none does.
    pub fn aggregate_frame_size(&self) -> FrameSize {
        self.listeners
            .iter()
            .filter_map(|l| l.as_frame_sized().map(|s| s.default_frame_size()))
            .reduce(|a, b| FrameSize::new(a.width.max(b.width), a.height.max(b.height)))
            .unwrap_or(FrameSize::DEFAULT)
    }

    /// True only if every child exposing a dispose policy returns true.
    pub fn aggregate_dispose_on_finish(&self) -> bool {
        self.listeners
            .iter()
            .filter_map(|l| l.as_frame_sized())
            .all(|s| s.dispose_on_finish())
    }
}

impl Listener for MultiListener {
    fn name(&self) -> &str {
        "multi"
    }

    fn set_owner(&mut self, owner: RunHandle) {
        self.owner = owner;
    }

    fn start(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener.set_owner(self.owner.clone());
            listener.start();
        }
    }

    fn pre_input(&mut self, element: &dyn PipelineElement, token: Option<&Token>) -> Result<()> {
        for listener in self.listeners.iter_mut() {
            listener.pre_input(element, token)?;
        }
        Ok(())
    }

    fn post_input(&mut self, element: &dyn PipelineElement) -> Result<()> {
        for listener in self.listeners.iter_mut() {
            listener.post_input(element)?;
        }
        Ok(())
    }

    fn pre_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        for listener in self.listeners.iter_mut() {
            listener.pre_execute(element)?;
        }
        Ok(())
    }

    fn post_execute(&mut self, element: &dyn PipelineElement) -> Result<()> {
        for listener in self.listeners.iter_mut() {
            listener.post_execute(element)?;
        }
        Ok(())
    }

    fn pre_output(&mut self, element: &dyn PipelineElement) -> Result<()> {
        for listener in self.listeners.iter_mut() {
            listener.pre_output(element)?;
        }
        Ok(())
    }

    fn post_output(&mut self, element: &dyn PipelineElement, token: Option<&Token>) -> Result<()> {
        for listener in self.listeners.iter_mut() {
            listener.post_output(element, token)?;
        }
        Ok(())
    }

    fn finish(&mut self) {
        for listener in self.listeners.iter_mut() {
            listener.set_owner(self.owner.clone());
            listener.finish();
        }
    }

    fn as_frame_sized(&self) -> Option<&dyn HasDefaultFrameSize> {
        Some(self)
    }

    fn as_multi_mut(&mut self) -> Option<&mut MultiListener> {
        Some(self)
    }
}

impl HasDefaultFrameSize for MultiListener {
    fn default_frame_size(&self) -> FrameSize {
        self.aggregate_frame_size()
    }

    fn dispose_on_finish(&self) -> bool {
        self.aggregate_dispose_on_finish()
    }
}
