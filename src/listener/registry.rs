//! Listener registry: builds live listeners from [`ListenerSpec`]s.
//!
//! Every `kind` tag maps to one factory. The built-in kinds are registered by
//! [`ListenerRegistry::with_builtins`]; a factory can be replaced to plug in a
//! custom listener under an existing tag.

use crate::config::{DebugSpec, ListenerSpec};
use crate::debug::{DebugListener, Watch};
use crate::error::{FlowHookError, Result, ResultExt};
use crate::listener::{
    ExecutionCounter, ExecutionLog, ExecutionTimer, FrameSize, Listener, MultiListener,
    NullListener, ObserverSender, OccurrenceTracer, RemoteListener,
};
use crate::scripting::ExpressionEngine;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

pub type ListenerFactory =
    Box<dyn Fn(&ListenerSpec, &ListenerRegistry) -> Result<Box<dyn Listener>> + Send + Sync>;

pub struct ListenerRegistry {
    factories: BTreeMap<String, ListenerFactory>,
    engine: Arc<ExpressionEngine>,
    observer: Option<ObserverSender>,
}

impl ListenerRegistry {
    /// Registry without any factories.
    pub fn empty(engine: Arc<ExpressionEngine>) -> Self {
        Self {
            factories: BTreeMap::new(),
            engine,
            observer: None,
        }
    }

    /// Registry with every built-in listener kind.
    pub fn with_builtins(engine: Arc<ExpressionEngine>) -> Self {
        let mut registry = Self::empty(engine);
        registry.register("null", Box::new(build_null));
        registry.register("multi", Box::new(build_multi));
        registry.register("debug", Box::new(build_debug));
        registry.register("counter", Box::new(build_counter));
        registry.register("timer", Box::new(build_timer));
        registry.register("tracer", Box::new(build_tracer));
        registry.register("log", Box::new(build_log));
        registry.register("remote", Box::new(build_remote));
        registry
    }

    /// Hand table snapshots and breakpoint events of every listener built
    /// from now on to `observer`.
    pub fn with_observer(mut self, observer: ObserverSender) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Register or replace the factory for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, factory: ListenerFactory) {
        let kind = kind.into();
        if self.factories.insert(kind.clone(), factory).is_some() {
            tracing::debug!("Replaced listener factory '{}'", kind);
        }
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn engine(&self) -> &Arc<ExpressionEngine> {
        &self.engine
    }

    pub fn observer(&self) -> Option<&ObserverSender> {
        self.observer.as_ref()
    }

    pub fn build(&self, spec: &ListenerSpec) -> Result<Box<dyn Listener>> {
        let kind = spec.kind();
        let factory = self.factories.get(kind).ok_or_else(|| {
            FlowHookError::Config(format!("No listener registered for kind '{}'", kind))
        })?;
        let listener = factory(spec, self)?;
        tracing::debug!("Built {} listener", listener.name());
        Ok(listener)
    }
}

fn mismatch(expected: &str, spec: &ListenerSpec) -> FlowHookError {
    FlowHookError::Config(format!(
        "Factory for '{}' cannot build a '{}' listener",
        expected,
        spec.kind()
    ))
}

fn build_null(_spec: &ListenerSpec, _registry: &ListenerRegistry) -> Result<Box<dyn Listener>> {
    Ok(Box::new(NullListener))
}

fn build_multi(spec: &ListenerSpec, registry: &ListenerRegistry) -> Result<Box<dyn Listener>> {
    let ListenerSpec::Multi { listeners } = spec else {
        return Err(mismatch("multi", spec));
    };
    let mut multi = MultiListener::new();
    for (index, child) in listeners.iter().enumerate() {
        multi.add(
            registry
                .build(child)
                .with_context(|| format!("listener {} ({})", index, child.kind()))?,
        );
    }
    Ok(Box::new(multi))
}

/// Build a debug listener from its description.
pub fn build_debug_listener(
    spec: &DebugSpec,
    engine: &Arc<ExpressionEngine>,
    observer: Option<&ObserverSender>,
) -> Result<DebugListener> {
    spec.validate(engine)?;

    let breakpoints = spec
        .breakpoints
        .iter()
        .map(|b| b.build(engine))
        .collect::<Result<Vec<_>>>()?;

    let mut debug = DebugListener::new()
        .with_poll_interval(Duration::from_millis(spec.poll_interval_ms))
        .with_breakpoints(breakpoints)
        .with_scope(spec.scope.build(engine)?)
        .with_step_mode(spec.step_mode)
        .with_step_stages(spec.step_stages)
        .with_frame_size(FrameSize::new(spec.width, spec.height));
    for watch in &spec.watches {
        debug = debug.with_watch(Watch::compile(engine, watch)?);
    }
    if let Some(observer) = observer {
        debug = debug.with_observer(observer.clone());
    }
    Ok(debug)
}

fn build_debug(spec: &ListenerSpec, registry: &ListenerRegistry) -> Result<Box<dyn Listener>> {
    let ListenerSpec::Debug(debug) = spec else {
        return Err(mismatch("debug", spec));
    };
    Ok(Box::new(build_debug_listener(
        debug,
        registry.engine(),
        registry.observer(),
    )?))
}

fn build_counter(spec: &ListenerSpec, registry: &ListenerRegistry) -> Result<Box<dyn Listener>> {
    let ListenerSpec::Counter { refresh_interval } = spec else {
        return Err(mismatch("counter", spec));
    };
    spec.validate(registry.engine())?;
    let mut counter = ExecutionCounter::with_refresh_interval(*refresh_interval);
    if let Some(observer) = registry.observer() {
        counter = counter.with_observer(observer.clone());
    }
    Ok(Box::new(counter))
}

fn build_timer(spec: &ListenerSpec, registry: &ListenerRegistry) -> Result<Box<dyn Listener>> {
    let ListenerSpec::Timer {
        output_file,
        delimiter,
        refresh_interval,
    } = spec
    else {
        return Err(mismatch("timer", spec));
    };
    spec.validate(registry.engine())?;
    let mut timer = ExecutionTimer::new().with_refresh_interval(*refresh_interval);
    if let Some(path) = output_file {
        timer = timer.with_output_file(path, *delimiter);
    }
    if let Some(observer) = registry.observer() {
        timer = timer.with_observer(observer.clone());
    }
    Ok(Box::new(timer))
}

fn build_tracer(spec: &ListenerSpec, registry: &ListenerRegistry) -> Result<Box<dyn Listener>> {
    let ListenerSpec::Tracer {
        output_file,
        delimiter,
    } = spec
    else {
        return Err(mismatch("tracer", spec));
    };
    spec.validate(registry.engine())?;
    Ok(Box::new(OccurrenceTracer::new(output_file, *delimiter)))
}

fn build_log(spec: &ListenerSpec, registry: &ListenerRegistry) -> Result<Box<dyn Listener>> {
    let ListenerSpec::Log {
        stages,
        output_file,
        log_tokens,
    } = spec
    else {
        return Err(mismatch("log", spec));
    };
    spec.validate(registry.engine())?;
    let mut log = ExecutionLog::new(*stages).with_tokens(*log_tokens);
    if let Some(path) = output_file {
        log = log.with_output_file(path);
    }
    Ok(Box::new(log))
}

fn build_remote(spec: &ListenerSpec, _registry: &ListenerRegistry) -> Result<Box<dyn Listener>> {
    let ListenerSpec::Remote { port, bind_address } = spec else {
        return Err(mismatch("remote", spec));
    };
    let port = u16::try_from(*port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or(FlowHookError::InvalidPort(*port))?;
    let bind_address: IpAddr = bind_address.parse().map_err(|e| {
        FlowHookError::Config(format!("invalid bind address '{}': {}", bind_address, e))
    })?;
    Ok(Box::new(
        RemoteListener::new(port).with_bind_address(bind_address),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BreakpointSpec, ScopeSpec};
    use crate::listener::Delimiter;
    use crate::stage::{Stage, StageSet};

    fn registry() -> ListenerRegistry {
        ListenerRegistry::with_builtins(Arc::new(ExpressionEngine::new()))
    }

    #[test]
    fn test_builtin_kinds() {
        assert_eq!(
            registry().kinds(),
            vec!["counter", "debug", "log", "multi", "null", "remote", "timer", "tracer"]
        );
    }

    #[test]
    fn test_build_nested_multi() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ListenerSpec::Multi {
            listeners: vec![
                ListenerSpec::Counter {
                    refresh_interval: 5,
                },
                ListenerSpec::Tracer {
                    output_file: dir.path().join("trace.tsv"),
                    delimiter: Delimiter::Tab,
                },
                ListenerSpec::Multi {
                    listeners: vec![ListenerSpec::Debug(DebugSpec::default())],
                },
            ],
        };

        let mut listener = registry().build(&spec).unwrap();
        let multi = listener.as_multi_mut().unwrap();
        let names: Vec<_> = multi.listeners().iter().map(|l| l.name().to_string()).collect();
        assert_eq!(names, vec!["counter", "tracer", "multi"]);
        assert!(multi.find_debug_mut().is_some());
    }

    #[test]
    fn test_build_debug_listener() {
        let spec = DebugSpec {
            breakpoints: vec![BreakpointSpec::at_path(
                "/Flow/a",
                StageSet::only(Stage::PostOutput),
            )],
            scope: ScopeSpec::Subtree {
                root: "/Flow".to_string(),
            },
            step_mode: true,
            width: 1024,
            ..DebugSpec::default()
        };

        let mut listener = registry().build(&ListenerSpec::Debug(spec)).unwrap();
        assert_eq!(
            listener.as_frame_sized().unwrap().default_frame_size(),
            FrameSize::new(1024, 600)
        );
        let debug = listener.as_debug_mut().unwrap();
        assert_eq!(debug.breakpoints().len(), 1);
        assert!(debug.handle().step_mode());
        assert_eq!(debug.scope().describe(), "subtree /Flow");
    }

    #[test]
    fn test_invalid_spec_is_not_built() {
        let spec = ListenerSpec::Remote {
            port: 70_000,
            bind_address: "127.0.0.1".to_string(),
        };
        assert!(matches!(
            registry().build(&spec),
            Err(FlowHookError::InvalidPort(70_000))
        ));

        let bad = ListenerSpec::Debug(DebugSpec {
            breakpoints: vec![BreakpointSpec::anywhere("(", StageSet::ALL)],
            ..DebugSpec::default()
        });
        assert!(registry().build(&bad).is_err());
    }

    #[test]
    fn test_unknown_kind() {
        let registry = ListenerRegistry::empty(Arc::new(ExpressionEngine::new()));
        let err = registry.build(&ListenerSpec::Null).err().unwrap();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_custom_factory_replaces_builtin() {
        let mut registry = registry();
        registry.register(
            "counter",
            Box::new(|_: &ListenerSpec, _: &ListenerRegistry| {
                Ok(Box::new(ExecutionTimer::new()) as Box<dyn Listener>)
            }),
        );
        let listener = registry
            .build(&ListenerSpec::Counter {
                refresh_interval: 1,
            })
            .unwrap();
        assert_eq!(listener.name(), "timer");
    }
}
