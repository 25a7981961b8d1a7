//! Thread boundary between listeners (pipeline thread) and an observer.
//!
//! Listeners publish owned snapshots; the observer (a UI, the console
//! debugger, a test) drains them at its own pace. Publishing never blocks the
//! pipeline thread: when the channel is full or the observer has gone away
//! the message is dropped.

use crate::debug::{BlockOutcome, SuspendSnapshot};
use crate::error::{FlowHookError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

/// Owned copy of a table listener's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSnapshot {
    /// Name of the listener that produced the table.
    pub listener: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSnapshot {
    pub fn new(listener: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            listener: listener.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// Value of `column` in the first row whose first cell equals `key`.
    pub fn lookup(&self, key: &str, column: usize) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.first().map(String::as_str) == Some(key))
            .and_then(|row| row.get(column))
            .map(String::as_str)
    }
}

/// Messages sent from listeners to the observer.
#[derive(Debug, Clone)]
pub enum ListenerMessage {
    /// Periodic or final table refresh.
    Table(TableSnapshot),

    /// The pipeline thread is now blocked.
    BreakpointReached(SuspendSnapshot),

    /// A block ended.
    Released {
        element_path: String,
        outcome: BlockOutcome,
    },

    /// The listener finished its run.
    Finished { listener: String },
}

impl ListenerMessage {
    fn kind(&self) -> &'static str {
        match self {
            ListenerMessage::Table(_) => "table",
            ListenerMessage::BreakpointReached(_) => "breakpoint",
            ListenerMessage::Released { .. } => "released",
            ListenerMessage::Finished { .. } => "finished",
        }
    }
}

/// Channel capacity for messages (pipeline → observer).
const MSG_CHANNEL_CAPACITY: usize = 1_024;

/// Listener-side sending half.
#[derive(Debug, Clone)]
pub struct ObserverSender {
    msg_tx: Sender<ListenerMessage>,
}

impl ObserverSender {
    /// Publish without blocking. Returns `false` if the message was dropped.
    pub fn publish(&self, msg: ListenerMessage) -> bool {
        match self.msg_tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(msg)) => {
                tracing::debug!("Observer channel full, dropping {} message", msg.kind());
                false
            }
            Err(TrySendError::Disconnected(msg)) => {
                tracing::debug!("Observer gone, dropping {} message", msg.kind());
                false
            }
        }
    }
}

/// Observer-side handle.
pub struct ObserverBridge {
    msg_rx: Receiver<ListenerMessage>,
}

impl ObserverBridge {
    /// Create a new bridge pair: `(bridge_for_observer, sender_for_listeners)`.
    pub fn new() -> (Self, ObserverSender) {
        Self::with_capacity(MSG_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, ObserverSender) {
        let (msg_tx, msg_rx) = bounded(capacity);
        (Self { msg_rx }, ObserverSender { msg_tx })
    }

    /// Drain all pending messages.
    pub fn drain(&self) -> Vec<ListenerMessage> {
        let mut msgs = Vec::new();
        while let Ok(msg) = self.msg_rx.try_recv() {
            msgs.push(msg);
        }
        msgs
    }

    /// Try to receive a single message without blocking.
    pub fn try_recv(&self) -> Option<ListenerMessage> {
        self.msg_rx.try_recv().ok()
    }

    /// Wait for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ListenerMessage> {
        self.msg_rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => {
                FlowHookError::Channel(format!("no listener message within {:?}", timeout))
            }
            RecvTimeoutError::Disconnected => {
                FlowHookError::Channel("all listeners disconnected".to_string())
            }
        })
    }
}
