use std::io::Error as IoError;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

use crate::supervisor::ProcessState;
use crate::topology::NodeId;

/// Errors raised while laying out the topology.
#[derive(Error, Debug)]
pub enum TopologyError {
    /// A network needs at least one router.
    #[error("Network size must be at least 1")]
    EmptyNetwork,

    /// The port blocks do not fit below 65536.
    #[error("Port block for {block} needs ports {start}..{end}, which exceeds 65535")]
    PortRangeExhausted {
        block: &'static str,
        start: u32,
        end: u32,
    },
}

/// Errors raised while materializing a config artifact on disk.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Failed to create config directory '{path}': {source}")]
    CreateDir { path: PathBuf, source: IoError },

    #[error("Failed to write config artifact '{path}': {source}")]
    Write { path: PathBuf, source: IoError },
}

/// Errors raised by the process supervisor.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Unknown router {0}")]
    UnknownNode(NodeId),

    #[error("Router {0} is already running with pid {1}")]
    AlreadyRunning(NodeId, u32),

    #[error("Router {0} has no launched process")]
    NotLaunched(NodeId),

    #[error("Failed to open output log '{path}' for router {node}: {source}")]
    OutputLog {
        node: NodeId,
        path: PathBuf,
        source: IoError,
    },

    #[error("Failed to launch '{binary}' for router {node}: {source}")]
    Launch {
        node: NodeId,
        binary: PathBuf,
        source: IoError,
    },

    #[error("Failed to reap router {node} (pid {pid}): {source}")]
    Reap {
        node: NodeId,
        pid: u32,
        source: IoError,
    },

    #[error("Router {node} (pid {pid}) is not running: process is {state}")]
    LivenessViolation {
        node: NodeId,
        pid: u32,
        state: ProcessState,
    },
}

impl SupervisorError {
    /// Launch failures and liveness violations end the run; everything else
    /// is absorbed by the caller with a log record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SupervisorError::OutputLog { .. }
                | SupervisorError::Launch { .. }
                | SupervisorError::LivenessViolation { .. }
        )
    }
}

/// Errors raised by the administrative plane.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Failed to run '{program}': {source}")]
    Spawn { program: PathBuf, source: IoError },

    #[error("'{request}' timed out after {timeout:?}")]
    TimedOut { request: String, timeout: Duration },

    #[error("'{request}' exited with {status}: {stderr}")]
    Failed {
        request: String,
        status: ExitStatus,
        stderr: String,
    },
}

/// Top-level harness error.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    #[error("Failed to launch traffic generator '{binary}' on port {port}: {source}")]
    TrafficLaunch {
        binary: PathBuf,
        port: u16,
        source: IoError,
    },

    #[error("Fault injector task failed: {0}")]
    Task(String),
}

impl HarnessError {
    /// Environment errors and liveness violations are fatal to the whole run.
    pub fn is_fatal(&self) -> bool {
        match self {
            HarnessError::Topology(_) => true,
            HarnessError::Artifact(_) => false,
            HarnessError::Supervisor(e) => e.is_fatal(),
            HarnessError::Admin(_) => false,
            HarnessError::TrafficLaunch { .. } => true,
            HarnessError::Task(_) => true,
        }
    }
}
