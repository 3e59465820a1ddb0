//! Workload runtime interface, process runtime and mock implementation.
//!
//! A runtime starts one workload per service instance and hands back a
//! [`WorkloadHandle`]. Stopping (or dropping) the handle terminates the
//! workload. A workload that ends on its own is reported as a
//! [`WorkloadExit`] on the channel passed to [`Runtime::start`]; a workload
//! terminated through its handle is not.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use fleet_id::ServiceId;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Environment variable carrying the instance's service ID to the workload.
pub const SERVICE_ID_ENV: &str = "FLEET_SERVICE_ID";

/// A workload that ended without being asked to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadExit {
    pub service_id: ServiceId,

    /// Exit code, or `None` if the workload was killed by a signal.
    pub code: Option<i32>,
}

pub type ExitSender = mpsc::UnboundedSender<WorkloadExit>;

/// Handle to a running workload.
#[derive(Debug)]
pub struct WorkloadHandle {
    service_id: ServiceId,
    pid: Option<u32>,
    stop: Option<oneshot::Sender<()>>,
}

impl WorkloadHandle {
    pub fn new(service_id: ServiceId, pid: Option<u32>, stop: oneshot::Sender<()>) -> Self {
        Self {
            service_id,
            pid,
            stop: Some(stop),
        }
    }

    pub fn service_id(&self) -> &ServiceId {
        &self.service_id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Terminate the workload. Its exit is not reported.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// Workload runtime interface.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Start a workload for `service_id`.
    async fn start(&self, service_id: &ServiceId, exits: ExitSender) -> Result<WorkloadHandle>;
}

// =============================================================================
// Process runtime
// =============================================================================

/// Runs the payload as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    program: String,
    args: Vec<String>,
}

impl ProcessRuntime {
    /// Create a runtime for `command` (program followed by its arguments).
    pub fn new(command: Vec<String>) -> Result<Self> {
        let mut command = command.into_iter();
        let program = command
            .next()
            .context("payload command must name a program")?;
        Ok(Self {
            program,
            args: command.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl Runtime for ProcessRuntime {
    async fn start(&self, service_id: &ServiceId, exits: ExitSender) -> Result<WorkloadHandle> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(SERVICE_ID_ENV, service_id.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn payload {}", self.program))?;
        let pid = child.id();

        info!(service_id = %service_id, pid = ?pid, program = %self.program, "Workload started");

        let (stop_tx, stop_rx) = oneshot::channel();
        tokio::spawn(watch_process(service_id.clone(), child, stop_rx, exits));

        Ok(WorkloadHandle::new(service_id.clone(), pid, stop_tx))
    }
}

/// Wait for the child to exit or for its handle to ask for termination.
async fn watch_process(
    service_id: ServiceId,
    mut child: Child,
    stop: oneshot::Receiver<()>,
    exits: ExitSender,
) {
    tokio::select! {
        status = child.wait() => {
            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(service_id = %service_id, error = %e, "Failed to wait for workload");
                    None
                }
            };
            info!(service_id = %service_id, code = ?code, "Workload exited");
            let _ = exits.send(WorkloadExit { service_id, code });
        }
        // Stop requested, or the handle was dropped.
        _ = stop => {
            if let Err(e) = child.kill().await {
                warn!(service_id = %service_id, error = %e, "Failed to kill workload");
            } else {
                debug!(service_id = %service_id, "Workload killed");
            }
        }
    }
}

// =============================================================================
// Mock runtime
// =============================================================================

/// In-memory runtime for tests and development.
///
/// Workloads run until stopped, or until [`MockRuntime::exit`] makes one end
/// on its own.
#[derive(Debug, Default)]
pub struct MockRuntime {
    running: Arc<Mutex<BTreeMap<ServiceId, oneshot::Sender<i32>>>>,
    started: AtomicU32,
    fail_starts: bool,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock runtime that fails all starts.
    pub fn failing() -> Self {
        Self {
            fail_starts: true,
            ..Self::default()
        }
    }

    /// Number of workloads started so far.
    pub fn started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }

    /// Service IDs of workloads currently running.
    pub fn running(&self) -> Vec<ServiceId> {
        match self.running.lock() {
            Ok(running) => running.keys().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Make a running workload exit with `code`. Returns false if it is not
    /// running.
    pub fn exit(&self, service_id: &ServiceId, code: i32) -> bool {
        let trigger = match self.running.lock() {
            Ok(mut running) => running.remove(service_id),
            Err(_) => None,
        };
        match trigger {
            Some(trigger) => trigger.send(code).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn start(&self, service_id: &ServiceId, exits: ExitSender) -> Result<WorkloadHandle> {
        if self.fail_starts {
            anyhow::bail!("Mock runtime configured to fail");
        }

        info!(service_id = %service_id, "[MOCK] Starting workload");
        self.started.fetch_add(1, Ordering::SeqCst);

        let (exit_tx, exit_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        self.running
            .lock()
            .map_err(|_| anyhow::anyhow!("mock runtime state poisoned"))?
            .insert(service_id.clone(), exit_tx);

        let running = Arc::clone(&self.running);
        let id = service_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                code = exit_rx => {
                    if let Ok(code) = code {
                        let _ = exits.send(WorkloadExit { service_id: id, code: Some(code) });
                    }
                }
                _ = stop_rx => {
                    debug!(service_id = %id, "[MOCK] Workload stopped");
                    if let Ok(mut running) = running.lock() {
                        running.remove(&id);
                    }
                }
            }
        });

        Ok(WorkloadHandle::new(service_id.clone(), None, stop_tx))
    }
}
