//! Router process supervisor
//!
//! The supervisor is the only owner of router subprocess handles. Every
//! operation takes the node table lock for its whole read-modify-write, so a
//! stop (signal, reap, clear handle) or a start (spawn, set handle) is never
//! observed half-done by the liveness audit.

/// Signal probing and process state classification
pub mod process;

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use nix::errno::Errno;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;

use crate::error::SupervisorError;
use crate::topology::NodeId;

pub use process::{ProcessState, StopSignal};

/// Lifecycle of one router.
///
/// `NotStarted → Running → (Stopping → Stopped → Running)*`, with
/// `Running → Crashed` as the terminal state set by the liveness audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    NotStarted,
    Running,
    Stopping,
    Stopped,
    Crashed,
}

/// A router and its current subprocess, if any.
#[derive(Debug)]
pub struct RouterNode {
    pub id: NodeId,
    pub config_path: PathBuf,
    pub state: NodeState,
    child: Option<Child>,
    pid: Option<u32>,
    launches: u32,
}

impl RouterNode {
    fn new(id: NodeId, config_path: PathBuf) -> Self {
        Self {
            id,
            config_path,
            state: NodeState::NotStarted,
            child: None,
            pid: None,
            launches: 0,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_process(&self) -> bool {
        self.child.is_some()
    }

    pub fn launches(&self) -> u32 {
        self.launches
    }
}

/// Node table guarded by the supervisor lock.
pub type NodeTable = IndexMap<NodeId, RouterNode>;

/// How routers are launched and stopped.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub binary: PathBuf,
    /// Directory receiving `router_<label>_output.txt`
    pub log_dir: PathBuf,
    pub stop_signal: StopSignal,
    /// Time allowed between the stop signal and a forced kill
    pub stop_timeout: Duration,
}

pub struct Supervisor {
    spec: LaunchSpec,
    nodes: Mutex<NodeTable>,
}

impl Supervisor {
    pub fn new(spec: LaunchSpec, nodes: impl IntoIterator<Item = (NodeId, PathBuf)>) -> Self {
        let nodes = nodes
            .into_iter()
            .map(|(id, config_path)| (id, RouterNode::new(id, config_path)))
            .collect();
        Self {
            spec,
            nodes: Mutex::new(nodes),
        }
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    pub fn output_log_path(&self, node: NodeId) -> PathBuf {
        self.spec
            .log_dir
            .join(format!("router_{}_output.txt", node))
    }

    /// Exclusive access to the node table.
    pub async fn lock(&self) -> MutexGuard<'_, NodeTable> {
        self.nodes.lock().await
    }

    pub async fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.lock().await.keys().copied().collect()
    }

    pub async fn state(&self, node: NodeId) -> Option<NodeState> {
        self.nodes.lock().await.get(&node).map(|n| n.state)
    }

    pub async fn pid(&self, node: NodeId) -> Option<u32> {
        self.nodes.lock().await.get(&node).and_then(|n| n.pid)
    }

    /// Launch the router. Returns once the OS process exists.
    pub async fn start(&self, node: NodeId) -> Result<u32, SupervisorError> {
        let mut nodes = self.nodes.lock().await;
        let entry = nodes
            .get_mut(&node)
            .ok_or(SupervisorError::UnknownNode(node))?;
        self.launch(entry)
    }

    fn launch(&self, entry: &mut RouterNode) -> Result<u32, SupervisorError> {
        if entry.child.is_some() {
            return Err(SupervisorError::AlreadyRunning(
                entry.id,
                entry.pid.unwrap_or_default(),
            ));
        }

        let log_path = self.output_log_path(entry.id);
        let output = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|source| SupervisorError::OutputLog {
                node: entry.id,
                path: log_path.clone(),
                source,
            })?;
        let stderr = output
            .try_clone()
            .map_err(|source| SupervisorError::OutputLog {
                node: entry.id,
                path: log_path.clone(),
                source,
            })?;

        let child = Command::new(&self.spec.binary)
            .arg("--config")
            .arg(&entry.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| SupervisorError::Launch {
                node: entry.id,
                binary: self.spec.binary.clone(),
                source,
            })?;

        // A freshly spawned child always has an id until it is reaped
        let pid = child.id().unwrap_or_default();
        entry.child = Some(child);
        entry.pid = Some(pid);
        entry.state = NodeState::Running;
        entry.launches += 1;

        info!(
            "start_router: router {} started with pid {} (launch #{})",
            entry.id, pid, entry.launches
        );
        Ok(pid)
    }

    /// Signal the router, then reap it before returning.
    pub async fn stop(&self, node: NodeId) -> Result<ExitStatus, SupervisorError> {
        let mut nodes = self.nodes.lock().await;
        let entry = nodes
            .get_mut(&node)
            .ok_or(SupervisorError::UnknownNode(node))?;
        self.terminate(entry).await
    }

    async fn terminate(&self, entry: &mut RouterNode) -> Result<ExitStatus, SupervisorError> {
        let mut child = entry
            .child
            .take()
            .ok_or(SupervisorError::NotLaunched(entry.id))?;
        let pid = entry.pid.take().unwrap_or_default();
        entry.state = NodeState::Stopping;

        let result = reap(&mut child, entry.id, pid, &self.spec).await;
        entry.state = NodeState::Stopped;

        match &result {
            Ok(status) => info!(
                "stop_router: router {} (pid {}) exited with status {}",
                entry.id, pid, status
            ),
            Err(e) => error!("stop_router: {}", e),
        }
        result
    }

    /// Two-phase liveness check of the router's current process.
    pub async fn is_running(&self, node: NodeId) -> bool {
        let nodes = self.nodes.lock().await;
        match nodes.get(&node).and_then(|n| n.child.as_ref().and(n.pid)) {
            Some(pid) => {
                let state = process::probe(pid);
                if !state.is_running() && log::log_enabled!(log::Level::Debug) {
                    debug!("is_running: router {} pid {} is {}", node, pid, state);
                }
                state.is_running()
            }
            None => false,
        }
    }

    /// Stop every router that currently has a process.
    pub async fn stop_all(&self) {
        let mut nodes = self.nodes.lock().await;
        for entry in nodes.values_mut().filter(|n| n.has_process()) {
            // Errors are already logged by terminate
            let _ = self.terminate(entry).await;
        }
        info!("stop_all: every router is stopped");
    }
}

/// Deliver the stop signal and wait for the exit status. A process that
/// outlives the stop timeout is killed and reaped anyway.
async fn reap(
    child: &mut Child,
    node: NodeId,
    pid: u32,
    spec: &LaunchSpec,
) -> Result<ExitStatus, SupervisorError> {
    if let Err(errno) = process::send_signal(pid, spec.stop_signal.signal()) {
        // ESRCH: the process already exited and only needs reaping
        if errno != Errno::ESRCH {
            warn!(
                "stop_router: error sending {:?} to router {} (pid {}): {}",
                spec.stop_signal, node, pid, errno
            );
        }
    }

    let status = match timeout(spec.stop_timeout, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                "stop_router: router {} (pid {}) still alive after {:?}, killing it",
                node, pid, spec.stop_timeout
            );
            match child.kill().await {
                Ok(()) => child.wait().await,
                Err(e) => Err(e),
            }
        }
    };

    status.map_err(|source| SupervisorError::Reap { node, pid, source })
}
