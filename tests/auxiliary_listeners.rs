//! Integration tests for the counting, timing, tracing and logging listeners

mod common;

use common::builders::StepBuilder;
use common::mock_helpers::create_test_bridge;
use flowhook::listener::{
    Delimiter, ExecutionLog, ExecutionTimer, HasDisplayModel, ListenerMessage, OccurrenceTracer,
};
use flowhook::runner::{ElementStep, ScriptedRun};
use flowhook::scripting::ExpressionEngine;
use flowhook::{Listener, ListenerRegistry, ListenerSlot, ListenerSpec, MultiListener, Stage, StageSet};
use std::fs;
use std::sync::Arc;
use std::time::Duration;

fn run_with(listener: Box<dyn Listener>, steps: Vec<ElementStep>) -> ScriptedRun {
    let mut run = ScriptedRun::new(common::test_flow(), ListenerSlot::new(listener)).with_steps(steps);
    run.run().unwrap();
    run
}

fn millis(cell: Option<&str>) -> f64 {
    cell.and_then(|c| c.parse().ok()).unwrap_or(-1.0)
}

#[test]
fn test_counter_reports_through_observer() {
    let (bridge, observer) = create_test_bridge();
    let registry =
        ListenerRegistry::with_builtins(Arc::new(ExpressionEngine::new())).with_observer(observer);
    let counter = registry
        .build(&ListenerSpec::Counter {
            refresh_interval: 1,
        })
        .unwrap();

    run_with(
        counter,
        vec![
            StepBuilder::new("/Flow/x").build(),
            StepBuilder::new("/Flow/y").build(),
            StepBuilder::new("/Flow/x").build(),
        ],
    );

    let last = bridge
        .drain()
        .into_iter()
        .filter_map(|msg| match msg {
            ListenerMessage::Table(table) => Some(table),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(last.listener, "counter");
    assert_eq!(last.rows.len(), 2);
    assert_eq!(last.lookup("/Flow/x", 1), Some("2"));
    assert_eq!(last.lookup("/Flow/y", 1), Some("1"));
}

#[test]
fn test_timer_accumulates_execution_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timings.csv");
    let timer = ExecutionTimer::new().with_output_file(&path, Delimiter::Comma);

    let run = run_with(
        Box::new(timer),
        vec![
            StepBuilder::new("/Flow/x")
                .input(1)
                .build()
                .with_work(Duration::from_millis(30)),
            StepBuilder::new("/Flow/x")
                .build()
                .with_work(Duration::from_millis(30)),
        ],
    );

    let table = run.slot().listener().as_display_model().unwrap().display_model();
    assert!(millis(table.lookup("/Flow/x (execute)", 1)) >= 60.0);
    assert!(table.lookup("/Flow/x (input)", 1).is_some());
    assert!(table.lookup("/Flow/x (output)", 1).is_none());

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines[0], "key,milliseconds");
    assert!(lines.iter().any(|l| l.starts_with("/Flow/x (execute),")));
}

#[test]
fn test_timer_is_reset_by_start() {
    let mut run = run_with(
        Box::new(ExecutionTimer::new()),
        vec![StepBuilder::new("/Flow/x").build()],
    );
    run.slot_mut().listener_mut().start();

    let table = run.slot().listener().as_display_model().unwrap().display_model();
    assert!(table.rows.is_empty());
}

#[test]
fn test_tracer_writes_one_row_per_phase() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trace.tsv");

    run_with(
        Box::new(OccurrenceTracer::new(&path, Delimiter::Tab)),
        vec![
            StepBuilder::new("/Flow/x").input(1).output(2).build(),
            StepBuilder::new("/Flow/Branch/z").build(),
        ],
    );

    let content = fs::read_to_string(&path).unwrap();
    let rows: Vec<Vec<&str>> = content.lines().map(|l| l.split('\t').collect()).collect();
    assert_eq!(rows[0], vec!["path", "type", "milliseconds"]);
    let kinds: Vec<(&str, &str)> = rows[1..].iter().map(|r| (r[0], r[1])).collect();
    assert_eq!(
        kinds,
        vec![
            ("/Flow/x", "input"),
            ("/Flow/x", "execute"),
            ("/Flow/x", "output"),
            ("/Flow/Branch/z", "execute"),
        ]
    );
    assert!(rows[1..].iter().all(|r| millis(Some(r[2])) >= 0.0));
}

#[test]
fn test_tracer_with_unwritable_path_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("trace.csv");

    let run = run_with(
        Box::new(OccurrenceTracer::new(&path, Delimiter::Comma)),
        vec![StepBuilder::new("/Flow/x").build()],
    );

    assert!(!path.exists());
    assert_eq!(run.slot().listener().name(), "tracer");
}

#[test]
fn test_log_writes_selected_stages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.log");
    let log = ExecutionLog::new(StageSet::of(&[Stage::PreInput, Stage::PostOutput]))
        .with_output_file(&path)
        .with_tokens(true);

    run_with(
        Box::new(log),
        vec![StepBuilder::new("/Flow/x").input(1).output(2).build()],
    );

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("\t/Flow/x\tpreInput\ttoken received\tint:1"));
    assert!(lines[1].ends_with("\t/Flow/x\tpostOutput\ttoken emitted\tint:2"));
}

#[test]
fn test_listeners_combined_in_multi() {
    let dir = tempfile::tempdir().unwrap();
    let trace = dir.path().join("trace.csv");
    let multi = MultiListener::with_listeners(vec![
        Box::new(ExecutionTimer::new()),
        Box::new(OccurrenceTracer::new(&trace, Delimiter::Comma)),
    ]);

    let mut run = run_with(
        Box::new(multi),
        vec![
            StepBuilder::new("/Flow/x").build(),
            StepBuilder::new("/Flow/y").build(),
        ],
    );

    assert_eq!(fs::read_to_string(&trace).unwrap().lines().count(), 3);
    let multi = run.slot_mut().listener_mut().as_multi_mut().unwrap();
    let timer = multi.listeners()[0].as_display_model().unwrap().display_model();
    assert_eq!(timer.rows.len(), 2);
}
