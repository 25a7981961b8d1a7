//! The listener position of a run, and attaching listeners while it runs.

use crate::debug::{Breakpoint, DebugHandle, DebugListener};
use crate::element::{PipelineElement, Token};
use crate::error::Result;
use crate::listener::{dispatch, Listener, MultiListener, NullListener};
use crate::run::RunHandle;
use crate::stage::Stage;

/// Holds the one top-level listener of a run.
pub struct ListenerSlot {
    current: Box<dyn Listener>,
    owner: RunHandle,
    live: bool,
}

impl ListenerSlot {
    pub fn new(listener: Box<dyn Listener>) -> Self {
        Self {
            current: listener,
            owner: RunHandle::none(),
            live: false,
        }
    }

    /// Slot with listening disabled.
    pub fn null() -> Self {
        Self::new(Box::new(NullListener))
    }

    pub fn set_owner(&mut self, owner: RunHandle) {
        self.current.set_owner(owner.clone());
        self.owner = owner;
    }

    /// Whether the run is between `start` and `finish`.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn listener(&self) -> &dyn Listener {
        self.current.as_ref()
    }

    pub fn listener_mut(&mut self) -> &mut dyn Listener {
        self.current.as_mut()
    }

    /// Replace the listener outright, finishing the old one if the run is
    /// live.
    pub fn replace(&mut self, mut listener: Box<dyn Listener>) -> Box<dyn Listener> {
        listener.set_owner(self.owner.clone());
        if self.live {
            self.current.finish();
            listener.start();
        }
        std::mem::replace(&mut self.current, listener)
    }

    pub fn start(&mut self) {
        self.current.set_owner(self.owner.clone());
        self.current.start();
        self.live = true;
    }

    pub fn finish(&mut self) {
        if !self.live {
            return;
        }
        self.current.finish();
        self.live = false;
    }

    pub fn dispatch(
        &mut self,
        stage: Stage,
        element: &dyn PipelineElement,
        token: Option<&Token>,
    ) -> Result<()> {
        dispatch(self.current.as_mut(), stage, element, token)
    }

    /// Start listening while the run may already be executing.
    ///
    /// The new listener is bound to the owner and, when the run is live,
    /// started before it sees any notification. A null listener detaches
    /// whatever is attached; otherwise a null listener is replaced, a multi
    /// listener is appended to, and any other listener is wrapped together
    /// with the new one in a multi listener.
    pub fn attach_at_runtime(&mut self, mut listener: Box<dyn Listener>) {
        listener.set_owner(self.owner.clone());

        if listener.is_null() {
            tracing::info!("Detaching {} listener", self.current.name());
            if self.live {
                self.current.finish();
            }
            self.current = listener;
            return;
        }

        if self.live {
            listener.start();
        }
        tracing::info!("Attaching {} listener", listener.name());

        if self.current.is_null() {
            self.current = listener;
            return;
        }
        if let Some(multi) = self.current.as_multi_mut() {
            multi.add(listener);
            return;
        }

        let previous = std::mem::replace(&mut self.current, Box::new(NullListener));
        let mut multi = MultiListener::with_listeners(vec![previous, listener]);
        multi.set_owner(self.owner.clone());
        self.current = Box::new(multi);
    }

    /// The attached debug listener, top level or inside a multi listener.
    pub fn debug_listener_mut(&mut self) -> Option<&mut DebugListener> {
        if self.current.as_debug_mut().is_some() {
            return self.current.as_debug_mut();
        }
        self.current.as_multi_mut()?.find_debug_mut()
    }

    pub fn debug_handle(&mut self) -> Option<DebugHandle> {
        self.debug_listener_mut().map(|debug| debug.handle())
    }

    /// Append a breakpoint to the attached debug listener, attaching a new
    /// debug listener when there is none. Returns the handle of the debug
    /// listener that received it.
    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) -> DebugHandle {
        if let Some(debug) = self.debug_listener_mut() {
            debug.add_breakpoint(breakpoint);
            return debug.handle();
        }

        let debug = DebugListener::new().with_breakpoints(vec![breakpoint]);
        let handle = debug.handle();
        self.attach_at_runtime(Box::new(debug));
        handle
    }
}

impl Default for ListenerSlot {
    fn default() -> Self {
        Self::null()
    }
}
