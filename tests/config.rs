//! Integration tests for loading and building instrumentation configurations

mod common;

use flowhook::config::{BreakpointTarget, ConfigFormat, ScopeSpec};
use flowhook::scripting::ExpressionEngine;
use flowhook::{InstrumentationConfig, Listener, ListenerRegistry, ListenerSpec, Stage, StageSet};
use std::path::PathBuf;
use std::sync::Arc;

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/instrumentation.toml")
}

#[test]
fn test_fixture_parses() {
    let config = InstrumentationConfig::load(fixture()).unwrap();
    config.validate().unwrap();

    let ListenerSpec::Multi { listeners } = &config.listener else {
        panic!("expected a multi listener, got {:?}", config.listener);
    };
    let kinds: Vec<_> = listeners.iter().map(ListenerSpec::kind).collect();
    assert_eq!(kinds, vec!["counter", "log", "debug"]);

    let ListenerSpec::Log { stages, output_file, .. } = &listeners[1] else {
        panic!("expected a log listener");
    };
    assert_eq!(*stages, StageSet::of(&[Stage::PreInput, Stage::PostOutput]));
    assert!(output_file.is_none());

    let ListenerSpec::Debug(debug) = &listeners[2] else {
        panic!("expected a debug listener");
    };
    assert_eq!(
        debug.step_stages,
        StageSet::of(&[Stage::PreExecute, Stage::PostExecute])
    );
    assert_eq!(
        debug.scope,
        ScopeSpec::Subtree {
            root: "/Flow/Branch".to_string()
        }
    );
    assert_eq!(debug.breakpoints[0].kind, BreakpointTarget::Path);
    assert!(debug.breakpoints[0].one_off);
    assert_eq!(debug.breakpoints[0].condition, "true");
    assert_eq!(debug.breakpoints[1].kind, BreakpointTarget::Any);
    assert!(debug.breakpoints[1].enabled);
}

#[test]
fn test_fixture_builds_listeners() {
    let config = InstrumentationConfig::load(fixture()).unwrap();
    let registry = ListenerRegistry::with_builtins(Arc::new(ExpressionEngine::new()));

    let mut listener = registry.build(&config.listener).unwrap();
    let multi = listener.as_multi_mut().unwrap();
    assert_eq!(multi.len(), 3);

    let debug = multi.find_debug_mut().unwrap();
    assert_eq!(debug.breakpoints().len(), 2);
    assert_eq!(debug.scope().describe(), "subtree /Flow/Branch");
}

#[test]
fn test_json_and_toml_agree() {
    let config = InstrumentationConfig::load(fixture()).unwrap();
    let json = config.render(ConfigFormat::Json).unwrap();
    let reparsed = InstrumentationConfig::parse(&json, ConfigFormat::Json).unwrap();
    assert_eq!(reparsed, config);
}

#[test]
fn test_malformed_condition_rejected_before_run() {
    let text = r#"
        [listener]
        kind = "debug"

        [[listener.breakpoints]]
        condition = "token >"
        stages = ["preInput"]
    "#;
    let config = InstrumentationConfig::parse(text, ConfigFormat::Toml).unwrap();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("listener"), "{}", err);
}

#[test]
fn test_unknown_stage_is_a_parse_error() {
    let text = r#"
        [listener]
        kind = "log"
        stages = ["midExecute"]
    "#;
    assert!(InstrumentationConfig::parse(text, ConfigFormat::Toml).is_err());
}

#[test]
fn test_out_of_range_port_rejected() {
    let text = r#"{ "listener": { "kind": "remote", "port": 70000 } }"#;
    let config = InstrumentationConfig::parse(text, ConfigFormat::Json).unwrap();
    assert!(config.validate().is_err());
}
