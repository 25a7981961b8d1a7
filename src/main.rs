//! flowhook demo runner
//!
//! Loads an instrumentation configuration (first argument, or the default
//! location), attaches the configured listener to a small scripted flow and
//! runs it. When a debug listener is attached, a console debugger reads
//! commands from stdin whenever the flow is suspended.

use anyhow::{anyhow, Context};
use flowhook::{
    config::{default_config_path, BreakpointSpec, DebugSpec, LoggingConfig, DEFAULT_LOG_FILTER},
    debug::{DebugHandle, SuspendSnapshot},
    listener::{ListenerMessage, ObserverBridge, TableSnapshot},
    run::FlowNode,
    runner::{ElementStep, RunSummary, ScriptedRun},
    scripting::ExpressionEngine,
    InstrumentationConfig, ListenerRegistry, ListenerSlot, ListenerSpec, Stage, StageSet,
};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const POLL: Duration = Duration::from_millis(100);

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow!("log file {:?} has no file name", path))?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating log directory {:?}", dir))?;
            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Listener used when no configuration file exists.
fn demo_config() -> InstrumentationConfig {
    let mut breakpoint =
        BreakpointSpec::anywhere("name == \"Display\" && token > 4", StageSet::only(Stage::PreInput));
    breakpoint.watches = vec!["token".to_string(), "parent(path)".to_string()];

    InstrumentationConfig::new(ListenerSpec::Multi {
        listeners: vec![
            ListenerSpec::Counter {
                refresh_interval: 10,
            },
            ListenerSpec::Timer {
                output_file: None,
                delimiter: Default::default(),
                refresh_interval: 10,
            },
            ListenerSpec::Debug(DebugSpec {
                breakpoints: vec![breakpoint],
                watches: vec!["stage".to_string()],
                ..DebugSpec::default()
            }),
        ],
    })
}

fn demo_flow() -> FlowNode {
    FlowNode::with_children(
        "Flow",
        vec![
            FlowNode::leaf("Source"),
            FlowNode::with_children(
                "Branch",
                vec![FlowNode::leaf("Square"), FlowNode::leaf("Display")],
            ),
        ],
    )
}

fn demo_steps() -> Vec<ElementStep> {
    let mut steps = Vec::new();
    for i in 1..=3i64 {
        steps.push(ElementStep::new("/Flow/Source").with_output(i));
        steps.push(
            ElementStep::new("/Flow/Branch/Square")
                .with_input(i)
                .with_output(i * i)
                .with_work(Duration::from_millis(20)),
        );
        steps.push(ElementStep::new("/Flow/Branch/Display").with_input(i * i));
    }
    steps
}

fn load_config() -> anyhow::Result<(InstrumentationConfig, Option<PathBuf>)> {
    let path = std::env::args().nth(1).map(PathBuf::from).or_else(default_config_path);
    match path {
        Some(path) if path.exists() => {
            let config = InstrumentationConfig::load(&path)
                .with_context(|| format!("loading {:?}", path))?;
            Ok((config, Some(path)))
        }
        _ => Ok((demo_config(), None)),
    }
}

fn spawn_stdin_reader() -> crossbeam_channel::Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_snapshot(snapshot: &SuspendSnapshot) {
    println!();
    println!(
        "Suspended at {} ({})",
        snapshot.element_path,
        snapshot.stage.hook_name()
    );
    match &snapshot.breakpoint {
        Some(info) => println!("  breakpoint #{}: {}", info.index, info.description),
        None => println!("  step"),
    }
    if let Some(token) = &snapshot.token {
        println!("  token: {:?}", token);
    }
    for (expr, value) in &snapshot.watches {
        println!("  {} = {}", expr, value);
    }
    print!("[c]ontinue [s]tep [r]esume [d]isable [q]uit > ");
    let _ = io::stdout().flush();
}

/// Serve the operator until the pipeline thread finishes.
fn console(handle: &DebugHandle, worker: &JoinHandle<flowhook::Result<RunSummary>>) {
    let lines = spawn_stdin_reader();

    while !worker.is_finished() {
        let Some(snapshot) = handle.wait_until_blocked(POLL) else {
            continue;
        };
        print_snapshot(&snapshot);

        loop {
            if worker.is_finished() || !handle.is_blocked() {
                break;
            }
            let line = match lines.recv_timeout(POLL) {
                Ok(line) => line,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    tracing::info!("Console closed, disabling breakpoints");
                    handle.disable();
                    break;
                }
            };
            match line.trim() {
                "c" | "continue" => {
                    handle.continue_execution();
                }
                "s" | "step" => {
                    handle.step();
                }
                "r" | "resume" => {
                    handle.resume();
                }
                "d" | "disable" => handle.disable(),
                "q" | "quit" => handle.stop("User stopped flow!"),
                other => {
                    println!("unknown command '{}'", other);
                    print!("> ");
                    let _ = io::stdout().flush();
                    continue;
                }
            }
            break;
        }
    }
}

fn print_tables(bridge: &ObserverBridge) {
    let mut latest: BTreeMap<String, TableSnapshot> = BTreeMap::new();
    let mut suspensions = 0;
    for msg in bridge.drain() {
        match msg {
            ListenerMessage::Table(table) => {
                latest.insert(table.listener.clone(), table);
            }
            ListenerMessage::BreakpointReached(_) => suspensions += 1,
            _ => {}
        }
    }

    for table in latest.values() {
        println!("\n[{}]", table.listener);
        println!("{}", table.columns.join("\t"));
        for row in &table.rows {
            println!("{}", row.join("\t"));
        }
    }
    if suspensions > 0 {
        println!("\n{} suspension(s)", suspensions);
    }
}

fn main() -> anyhow::Result<()> {
    let (config, config_path) = load_config()?;
    let _guard = init_logging(&config.logging)?;

    match &config_path {
        Some(path) => tracing::info!("Loaded instrumentation from {:?}", path),
        None => tracing::info!("No configuration found, using the demo listeners"),
    }

    let engine = Arc::new(ExpressionEngine::new());
    config
        .validate_with(&engine)
        .context("invalid instrumentation configuration")?;

    let (bridge, observer) = ObserverBridge::new();
    let registry = ListenerRegistry::with_builtins(engine).with_observer(observer);
    let mut slot = ListenerSlot::new(registry.build(&config.listener)?);
    let debug = slot.debug_handle();

    let mut run = ScriptedRun::new(demo_flow(), slot).with_steps(demo_steps());
    println!("{}", run.state().root().describe());

    let worker = thread::Builder::new()
        .name("flowhook-pipeline".to_string())
        .spawn(move || run.run())
        .context("spawning the pipeline thread")?;

    if let Some(handle) = &debug {
        console(handle, &worker);
    }

    let summary = worker
        .join()
        .map_err(|_| anyhow!("pipeline thread panicked"))??;
    print_tables(&bridge);

    tracing::info!(
        completed = summary.completed,
        abandoned = summary.abandoned,
        stopped = summary.stopped,
        "Done"
    );
    if let Some(message) = summary.stop_message {
        println!("Stopped: {}", message);
    }
    Ok(())
}
