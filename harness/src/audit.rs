//! Liveness audit
//!
//! Every router that has a launched process must be running. The first one
//! that is not ends the run: a router that died on its own invalidates the
//! fuzzing session, so the violation is never retried or masked.

use log::{error, info};

use crate::error::SupervisorError;
use crate::supervisor::{process, NodeState, Supervisor};

/// Outcome of a successful audit pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditReport {
    /// Routers with a live process
    pub running: usize,
    /// Routers without a process (never started, or inside a bounce outage)
    pub idle: usize,
}

/// Check every launched router, holding the node table lock for the whole pass.
///
/// On the first router that is not running, marks it `Crashed` and returns
/// [`SupervisorError::LivenessViolation`], which callers treat as fatal.
pub async fn audit_all(supervisor: &Supervisor) -> Result<AuditReport, SupervisorError> {
    let mut nodes = supervisor.lock().await;
    let mut report = AuditReport {
        running: 0,
        idle: 0,
    };

    for entry in nodes.values_mut() {
        let pid = match (entry.has_process(), entry.pid()) {
            (true, Some(pid)) => pid,
            _ => {
                report.idle += 1;
                continue;
            }
        };

        let state = process::probe(pid);
        if !state.is_running() {
            entry.state = NodeState::Crashed;
            error!(
                "check_routers: router {}, pid {} is not running ({})",
                entry.id, pid, state
            );
            return Err(SupervisorError::LivenessViolation {
                node: entry.id,
                pid,
                state,
            });
        }
        report.running += 1;
    }

    info!(
        "check_routers: all routers are running ({} running, {} idle)",
        report.running, report.idle
    );
    Ok(report)
}
