//! Integration tests for the remote introspection listener
//!
//! Each test binds a real loopback port, so they run serially.

mod common;

use common::builders::StepBuilder;
use flowhook::element::PipelineElement;
use flowhook::listener::RemoteListener;
use flowhook::runner::ScriptedRun;
use flowhook::scripting::ExpressionEngine;
use flowhook::{Listener, ListenerRegistry, ListenerSlot, ListenerSpec, MultiListener, Result};
use serial_test::serial;
use std::io::Read;
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

fn free_port() -> u16 {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn fetch(port: u16) -> std::io::Result<String> {
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port))?;
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    Ok(response)
}

/// Queries the remote listener from inside the run, once per element.
struct Client {
    port: u16,
    responses: Arc<Mutex<Vec<String>>>,
}

impl Listener for Client {
    fn name(&self) -> &str {
        "client"
    }

    fn post_execute(&mut self, _element: &dyn PipelineElement) -> Result<()> {
        let response = fetch(self.port).unwrap_or_else(|e| format!("error: {}", e));
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}

#[test]
#[serial]
fn test_describes_run_while_it_executes() {
    let port = free_port();
    let responses = Arc::new(Mutex::new(Vec::new()));
    let multi = MultiListener::with_listeners(vec![
        Box::new(RemoteListener::new(port)),
        Box::new(Client {
            port,
            responses: Arc::clone(&responses),
        }),
    ]);

    let mut run = ScriptedRun::new(common::test_flow(), ListenerSlot::new(Box::new(multi)))
        .with_steps(vec![
            StepBuilder::new("/Flow/x").build(),
            StepBuilder::new("/Flow/y").build(),
        ]);
    run.run().unwrap();

    let expected = "Flow\n  x\n  y\n  Branch\n    z\n";
    assert_eq!(*responses.lock().unwrap(), vec![expected, expected]);
}

#[test]
#[serial]
fn test_port_closed_after_finish() {
    let port = free_port();
    let mut remote = RemoteListener::new(port);
    remote.start();
    assert!(remote.is_serving());
    assert_eq!(fetch(port).unwrap(), flowhook::listener::NO_FLOW_RESPONSE);

    remote.finish();
    assert!(!remote.is_serving());
    assert!(fetch(port).is_err());
}

#[test]
#[serial]
fn test_restart_after_finish() {
    let port = free_port();
    let mut remote = RemoteListener::new(port);
    remote.start();
    remote.finish();

    remote.start();
    assert!(!fetch(port).unwrap().is_empty());
    remote.finish();
}

#[test]
#[serial]
fn test_occupied_port_degrades() {
    let blocker = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let port = blocker.local_addr().unwrap().port();

    let mut remote = RemoteListener::new(port);
    remote.start();
    assert!(!remote.is_serving());
    remote.finish();
}

#[test]
#[serial]
fn test_built_from_listener_config() {
    let port = free_port();
    let registry = ListenerRegistry::with_builtins(Arc::new(ExpressionEngine::new()));
    let mut listener = registry
        .build(&ListenerSpec::Remote {
            port: u32::from(port),
            bind_address: "127.0.0.1".to_string(),
        })
        .unwrap();

    listener.start();
    assert!(!fetch(port).unwrap().is_empty());
    listener.finish();
}
