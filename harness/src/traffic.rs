//! External traffic generators
//!
//! Raw TCP servers sit behind every TCP connector port and raw TCP clients
//! drive every TCP listener port. They are independent processes that share
//! nothing with the harness except the port they were given.

use log::{info, warn};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::broadcast;

use crate::error::HarnessError;
use crate::faults::pause;

/// Pause between consecutive launches.
pub const LAUNCH_STAGGER: Duration = Duration::from_millis(300);

#[derive(Debug)]
struct Generator {
    binary: PathBuf,
    port: u16,
    child: Child,
}

/// Owns every spawned traffic generator process.
#[derive(Debug, Default)]
pub struct TrafficGenerators {
    running: Vec<Generator>,
    stagger: Option<Duration>,
}

impl TrafficGenerators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stagger(mut self, stagger: Duration) -> Self {
        self.stagger = Some(stagger);
        self
    }

    pub fn len(&self) -> usize {
        self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty()
    }

    /// Launch `<binary> <port>` for every port, staggered.
    ///
    /// Returns `Ok(false)` if the exit signal interrupted the launches.
    pub async fn launch_all(
        &mut self,
        binary: &Path,
        ports: &[u16],
        exit: &mut broadcast::Receiver<()>,
    ) -> Result<bool, HarnessError> {
        let stagger = self.stagger.unwrap_or(LAUNCH_STAGGER);
        for &port in ports {
            self.launch(binary, port)?;
            if !pause(exit, stagger).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn launch(&mut self, binary: &Path, port: u16) -> Result<u32, HarnessError> {
        let child = Command::new(binary)
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::TrafficLaunch {
                binary: binary.to_path_buf(),
                port,
                source,
            })?;

        let pid = child.id().unwrap_or_default();
        info!("started {} on port {} with pid {}", binary.display(), port, pid);
        self.running.push(Generator {
            binary: binary.to_path_buf(),
            port,
            child,
        });
        Ok(pid)
    }

    /// Kill and reap every generator.
    pub async fn stop_all(&mut self) {
        for mut generator in self.running.drain(..) {
            if let Err(e) = generator.child.kill().await {
                warn!(
                    "failed to stop {} on port {}: {}",
                    generator.binary.display(),
                    generator.port,
                    e
                );
            }
        }
        info!("all traffic generators stopped");
    }
}
