//! RemoteListener: answers every TCP connection with a description of the
//! run it is attached to, then closes the connection.
//!
//! The socket is bound synchronously in `start()`, so a bind failure is
//! reported there and the port is known as soon as `start()` returns. The
//! accept loop runs on a dedicated thread with a current-thread tokio runtime
//! and stops on a oneshot shutdown signal. `finish()` joins that thread, so
//! the port is released when it returns.

use crate::listener::Listener;
use crate::run::RunHandle;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

pub const DEFAULT_PORT: u16 = 12345;

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Sent when no run is attached.
pub const NO_FLOW_RESPONSE: &str = "(no flow attached)\n";

pub struct RemoteListener {
    port: u16,
    bind_address: IpAddr,
    owner: Arc<Mutex<RunHandle>>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl RemoteListener {
    /// Listen on `port` of the loopback interface. Port 0 picks a free port.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            owner: Arc::new(Mutex::new(RunHandle::none())),
            local_addr: None,
            shutdown_tx: None,
            worker: None,
        }
    }

    pub fn with_bind_address(mut self, bind_address: IpAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address actually bound, while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn is_serving(&self) -> bool {
        self.worker.is_some()
    }

    fn bind(&self) -> std::io::Result<std::net::TcpListener> {
        let listener = std::net::TcpListener::bind((self.bind_address, self.port))?;
        listener.set_nonblocking(true)?;
        Ok(listener)
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Remote listener thread panicked");
            }
            if let Some(addr) = self.local_addr {
                info!(%addr, "Remote listener closed");
            }
        }
        self.local_addr = None;
    }
}

impl Default for RemoteListener {
    fn default() -> Self {
        Self::new(DEFAULT_PORT)
    }
}

impl Listener for RemoteListener {
    fn name(&self) -> &str {
        "remote"
    }

    fn set_owner(&mut self, owner: RunHandle) {
        *self.owner.lock().unwrap_or_else(|e| e.into_inner()) = owner;
    }

    fn start(&mut self) {
        self.shutdown();

        let listener = match self.bind() {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    address = %self.bind_address,
                    port = self.port,
                    "Remote listener failed to bind: {}",
                    e
                );
                return;
            }
        };
        let local_addr = listener.local_addr().ok();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let owner = Arc::clone(&self.owner);
        let spawned = thread::Builder::new()
            .name("flowhook-remote".to_string())
            .spawn(move || serve(listener, owner, shutdown_rx));

        match spawned {
            Ok(worker) => {
                self.shutdown_tx = Some(shutdown_tx);
                self.worker = Some(worker);
                self.local_addr = local_addr;
                if let Some(addr) = local_addr {
                    info!(%addr, "Remote listener accepting connections");
                }
            }
            Err(e) => error!("Remote listener failed to spawn its thread: {}", e),
        }
    }

    fn finish(&mut self) {
        self.shutdown();
    }
}

impl Drop for RemoteListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(
    listener: std::net::TcpListener,
    owner: Arc<Mutex<RunHandle>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Remote listener failed to build its runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match TcpListener::from_std(listener) {
            Ok(listener) => listener,
            Err(e) => {
                error!("Remote listener failed to register its socket: {}", e);
                return;
            }
        };

        let mut failures: u32 = 0;
        loop {
            let accepted = tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    debug!("Remote listener shutting down");
                    break;
                }

                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    failures = 0;
                    debug!(%peer, "Remote listener connection");
                    respond(stream, &owner).await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let backoff = accept_backoff(failures);
                    warn!(
                        failures,
                        backoff_ms = backoff.as_millis() as u64,
                        "Remote listener accept failed: {}",
                        e
                    );
                    tokio::select! {
                        biased;

                        _ = &mut shutdown_rx => {
                            debug!("Remote listener shutting down");
                            break;
                        }

                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    });
}

/// Exponential delay after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1 << exponent)
        .min(ACCEPT_BACKOFF_MAX)
}

fn response_for(owner: &Mutex<RunHandle>) -> String {
    let description = owner.lock().unwrap_or_else(|e| e.into_inner()).describe();
    match description {
        Some(mut text) => {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text
        }
        None => NO_FLOW_RESPONSE.to_string(),
    }
}

async fn respond(mut stream: TcpStream, owner: &Mutex<RunHandle>) {
    let response = response_for(owner);
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        warn!("Remote listener failed to send description: {}", e);
        return;
    }
    let _ = stream.shutdown().await;
}
