//! Serializable listener descriptions.
//!
//! A [`ListenerSpec`] is plain data; [`crate::listener::ListenerRegistry`]
//! turns it into a live listener. Breakpoint and scope descriptions compile
//! their expressions through a shared [`ExpressionEngine`].

use crate::debug::{
    AllOf, Breakpoint, BreakpointKind, Condition, ExpressionScope, ScopeRestriction, StageScope,
    Subtree, Unrestricted, Watch, DEFAULT_POLL_INTERVAL,
};
use crate::error::{FlowHookError, Result, ResultExt};
use crate::listener::{Delimiter, FrameSize, DEFAULT_PORT};
use crate::scripting::ExpressionEngine;
use crate::stage::{Stage, StageSet};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub use crate::listener::DEFAULT_REFRESH_INTERVAL;

fn default_true() -> bool {
    true
}

fn default_condition() -> String {
    "true".to_string()
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL
}

fn default_port() -> u32 {
    u32::from(DEFAULT_PORT)
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_log_stages() -> StageSet {
    StageSet::ALL
}

fn default_step_stages() -> StageSet {
    StageSet::only(Stage::PreExecute)
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_debug_width() -> u32 {
    FrameSize::DEBUG.width
}

fn default_debug_height() -> u32 {
    FrameSize::DEBUG.height
}

/// One listener, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListenerSpec {
    /// Listening disabled.
    #[default]
    Null,

    /// Fan-out to every listed listener, in order.
    Multi {
        #[serde(default)]
        listeners: Vec<ListenerSpec>,
    },

    Debug(DebugSpec),

    Counter {
        #[serde(default = "default_refresh_interval")]
        refresh_interval: u64,
    },

    Timer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_file: Option<PathBuf>,
        #[serde(default)]
        delimiter: Delimiter,
        #[serde(default = "default_refresh_interval")]
        refresh_interval: u64,
    },

    Tracer {
        output_file: PathBuf,
        #[serde(default)]
        delimiter: Delimiter,
    },

    Log {
        #[serde(default = "default_log_stages")]
        stages: StageSet,
        /// Standard output when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output_file: Option<PathBuf>,
        #[serde(default)]
        log_tokens: bool,
    },

    Remote {
        #[serde(default = "default_port")]
        port: u32,
        #[serde(default = "default_bind_address")]
        bind_address: String,
    },
}

impl ListenerSpec {
    /// The `kind` tag, also the registry key.
    pub fn kind(&self) -> &'static str {
        match self {
            ListenerSpec::Null => "null",
            ListenerSpec::Multi { .. } => "multi",
            ListenerSpec::Debug(_) => "debug",
            ListenerSpec::Counter { .. } => "counter",
            ListenerSpec::Timer { .. } => "timer",
            ListenerSpec::Tracer { .. } => "tracer",
            ListenerSpec::Log { .. } => "log",
            ListenerSpec::Remote { .. } => "remote",
        }
    }

    /// Check the description without building it. Expressions are compiled
    /// with `engine` so syntax errors surface here rather than mid-run.
    pub fn validate(&self, engine: &Arc<ExpressionEngine>) -> Result<()> {
        match self {
            ListenerSpec::Null => Ok(()),
            ListenerSpec::Multi { listeners } => {
                for (index, listener) in listeners.iter().enumerate() {
                    listener
                        .validate(engine)
                        .with_context(|| format!("listener {} ({})", index, listener.kind()))?;
                }
                Ok(())
            }
            ListenerSpec::Debug(debug) => debug.validate(engine),
            ListenerSpec::Counter { refresh_interval }
            | ListenerSpec::Timer {
                refresh_interval, ..
            } => {
                if *refresh_interval == 0 {
                    return Err(FlowHookError::Config(
                        "refresh interval must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
            ListenerSpec::Tracer { output_file, .. } => {
                if output_file.as_os_str().is_empty() {
                    return Err(FlowHookError::Config(
                        "tracer needs an output file".to_string(),
                    ));
                }
                Ok(())
            }
            ListenerSpec::Log { stages, .. } => {
                if stages.is_empty() {
                    return Err(FlowHookError::Config(
                        "log listener has no stages to log".to_string(),
                    ));
                }
                Ok(())
            }
            ListenerSpec::Remote { port, bind_address } => {
                if *port == 0 || *port > u32::from(u16::MAX) {
                    return Err(FlowHookError::InvalidPort(*port));
                }
                bind_address.parse::<std::net::IpAddr>().map_err(|e| {
                    FlowHookError::Config(format!("invalid bind address '{}': {}", bind_address, e))
                })?;
                Ok(())
            }
        }
    }
}

/// Configuration of the debug listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugSpec {
    #[serde(default)]
    pub breakpoints: Vec<BreakpointSpec>,

    #[serde(default)]
    pub scope: ScopeSpec,

    /// Start the run in step mode.
    #[serde(default)]
    pub step_mode: bool,

    #[serde(default = "default_step_stages")]
    pub step_stages: StageSet,

    /// Evaluated whenever the thread blocks.
    #[serde(default)]
    pub watches: Vec<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_debug_width")]
    pub width: u32,

    #[serde(default = "default_debug_height")]
    pub height: u32,
}

impl Default for DebugSpec {
    fn default() -> Self {
        Self {
            breakpoints: Vec::new(),
            scope: ScopeSpec::default(),
            step_mode: false,
            step_stages: default_step_stages(),
            watches: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
            width: default_debug_width(),
            height: default_debug_height(),
        }
    }
}

impl DebugSpec {
    pub fn validate(&self, engine: &Arc<ExpressionEngine>) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(FlowHookError::Config(
                "poll interval must be at least 1 ms".to_string(),
            ));
        }
        for (index, breakpoint) in self.breakpoints.iter().enumerate() {
            breakpoint
                .build(engine)
                .with_context(|| format!("breakpoint {}", index))?;
        }
        self.scope.build(engine).context("debug scope")?;
        for watch in &self.watches {
            engine.validate(watch).context("debug watch")?;
        }
        Ok(())
    }
}

/// What a breakpoint looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakpointTarget {
    /// Every element; the condition decides.
    #[default]
    Any,
    /// The element whose full path equals `path`.
    Path,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    #[serde(default)]
    pub kind: BreakpointTarget,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default = "default_condition")]
    pub condition: String,

    pub stages: StageSet,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub one_off: bool,

    #[serde(default)]
    pub watches: Vec<String>,
}

impl BreakpointSpec {
    /// Unconditional breakpoint on `path`.
    pub fn at_path(path: impl Into<String>, stages: StageSet) -> Self {
        Self {
            kind: BreakpointTarget::Path,
            path: Some(path.into()),
            condition: default_condition(),
            stages,
            enabled: true,
            one_off: false,
            watches: Vec::new(),
        }
    }

    /// Breakpoint on any element whose state satisfies `condition`.
    pub fn anywhere(condition: impl Into<String>, stages: StageSet) -> Self {
        Self {
            kind: BreakpointTarget::Any,
            path: None,
            condition: condition.into(),
            stages,
            enabled: true,
            one_off: false,
            watches: Vec::new(),
        }
    }

    pub fn build(&self, engine: &Arc<ExpressionEngine>) -> Result<Breakpoint> {
        if self.stages.is_empty() {
            return Err(FlowHookError::Config(
                "breakpoint does not participate in any stage".to_string(),
            ));
        }

        let kind = match self.kind {
            BreakpointTarget::Any => BreakpointKind::AnyElement,
            BreakpointTarget::Path => {
                let path = self.path.as_deref().unwrap_or("").trim();
                if !path.starts_with('/') {
                    return Err(FlowHookError::Config(format!(
                        "breakpoint path '{}' must be an absolute element path",
                        path
                    )));
                }
                BreakpointKind::Path(path.to_string())
            }
        };

        let condition = Condition::compile(engine, &self.condition)?;
        let mut breakpoint = Breakpoint::new(kind, self.stages, condition);
        breakpoint.enabled = self.enabled;
        breakpoint.one_off = self.one_off;
        for watch in &self.watches {
            breakpoint = breakpoint.with_watch(Watch::compile(engine, watch)?);
        }
        Ok(breakpoint)
    }
}

/// Listener-level restriction on where breakpoints are considered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScopeSpec {
    #[default]
    Unrestricted,
    Subtree {
        root: String,
    },
    Stages {
        stages: StageSet,
    },
    Expression {
        condition: String,
    },
    All {
        scopes: Vec<ScopeSpec>,
    },
}

impl ScopeSpec {
    pub fn build(&self, engine: &Arc<ExpressionEngine>) -> Result<Box<dyn ScopeRestriction>> {
        Ok(match self {
            ScopeSpec::Unrestricted => Box::new(Unrestricted),
            ScopeSpec::Subtree { root } => {
                if !root.starts_with('/') {
                    return Err(FlowHookError::Config(format!(
                        "scope root '{}' must be an absolute element path",
                        root
                    )));
                }
                Box::new(Subtree::new(root.as_str()))
            }
            ScopeSpec::Stages { stages } => Box::new(StageScope::new(*stages)),
            ScopeSpec::Expression { condition } => {
                Box::new(ExpressionScope::compile(engine, condition)?)
            }
            ScopeSpec::All { scopes } => Box::new(AllOf::new(
                scopes
                    .iter()
                    .map(|s| s.build(engine))
                    .collect::<Result<Vec<_>>>()?,
            )),
        })
    }
}
