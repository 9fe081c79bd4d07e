//! Process state probing
//!
//! A zombie still answers a signal-0 probe, so liveness needs a second,
//! structured look at the process table.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;
use sysinfo::{ProcessStatus, ProcessesToUpdate, System};

/// Observed state of an OS process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited but not reaped
    Zombie,
    Exited,
    NotFound,
}

impl ProcessState {
    pub fn is_running(self) -> bool {
        self == ProcessState::Running
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessState::Running => "running",
            ProcessState::Zombie => "zombie",
            ProcessState::Exited => "exited",
            ProcessState::NotFound => "not-found",
        })
    }
}

/// Signal used to stop a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StopSignal {
    /// SIGKILL: the router gets no chance to clean up
    #[default]
    Kill,
    /// SIGTERM
    Term,
}

impl StopSignal {
    pub fn signal(self) -> Signal {
        match self {
            StopSignal::Kill => Signal::SIGKILL,
            StopSignal::Term => Signal::SIGTERM,
        }
    }
}

fn nix_pid(pid: u32) -> Pid {
    Pid::from_raw(pid as i32)
}

/// Zero-effect signal probe: does the process table still hold `pid`?
pub fn signal_probe(pid: u32) -> bool {
    match kill(nix_pid(pid), None) {
        Ok(()) => true,
        // Exists, but belongs to someone else
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

pub fn send_signal(pid: u32, signal: Signal) -> Result<(), Errno> {
    kill(nix_pid(pid), signal)
}

/// Structured classification of `pid` from the host process table.
pub fn classify(pid: u32) -> ProcessState {
    let pid = sysinfo::Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid).map(|process| process.status()) {
        None => ProcessState::NotFound,
        Some(ProcessStatus::Zombie) => ProcessState::Zombie,
        Some(ProcessStatus::Dead) => ProcessState::Exited,
        Some(_) => ProcessState::Running,
    }
}

/// Two-phase probe: the signal probe and the classification must both agree
/// before a process counts as running.
pub fn probe(pid: u32) -> ProcessState {
    if !signal_probe(pid) {
        return ProcessState::NotFound;
    }
    classify(pid)
}
