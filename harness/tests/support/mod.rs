#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use steel_rain::admin::{AdminOutput, AdminPlane, AdminRequest};
use steel_rain::config::{ConfigValidator, ValidatedConfig};
use steel_rain::faults::PauseRange;
use steel_rain::supervisor::{LaunchSpec, StopSignal, Supervisor};
use steel_rain::topology::{ConfigGenerator, EndpointKind, EndpointRegistry, PortBases};
use steel_rain::{AdminError, PortLayout};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const SCRIPTS: [(&str, &str); 3] = [
    // Ignores its arguments and stays up
    ("fake-router", "exec sleep 600"),
    // Survives SIGTERM
    ("stubborn-router", "trap '' TERM\nexec sleep 600"),
    // Exits as soon as it starts
    ("crashing-router", "exit 0"),
];

/// Every stand-in script is written before the first one is handed out, so no
/// script is ever executed while another is still open for writing.
fn scripts_dir() -> &'static Path {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("steel-rain-tests-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, body) in SCRIPTS {
            let path = dir.join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    })
}

pub fn fake_router() -> PathBuf {
    scripts_dir().join("fake-router")
}

pub fn stubborn_router() -> PathBuf {
    scripts_dir().join("stubborn-router")
}

pub fn crashing_router() -> PathBuf {
    scripts_dir().join("crashing-router")
}

/// Topology, artifacts and supervisor for `n` routers in a scratch directory.
pub struct Mesh {
    pub dir: tempfile::TempDir,
    pub layout: PortLayout,
    pub registry: Arc<EndpointRegistry>,
    pub generator: Arc<ConfigGenerator>,
    pub supervisor: Arc<Supervisor>,
}

impl Mesh {
    pub fn new(n: usize, binary: PathBuf, stop_signal: StopSignal) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let layout = PortLayout::new(n, PortBases::default()).unwrap();
        let registry = Arc::new(EndpointRegistry::from_layout(&layout));
        let generator = Arc::new(ConfigGenerator::new(layout, dir.path().join("configs")));
        generator.ensure_dir().unwrap();

        let spec = LaunchSpec {
            binary,
            log_dir: dir.path().to_path_buf(),
            stop_signal,
            stop_timeout: Duration::from_millis(500),
        };
        let supervisor = Arc::new(Supervisor::new(
            spec,
            layout.nodes().map(|node| (node, generator.artifact_path(node))),
        ));

        Self {
            dir,
            layout,
            registry,
            generator,
            supervisor,
        }
    }

    pub fn write_artifacts(&self, seed: u64) {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        for node in self.layout.nodes() {
            let artifact = self.generator.generate(node, &mut rng).unwrap();
            self.registry.record_artifact(&artifact);
        }
    }

    pub async fn start_all(&self) {
        for node in self.layout.nodes() {
            self.supervisor.start(node).await.unwrap();
        }
    }
}

/// One recorded administrative call.
#[derive(Debug, Clone)]
pub struct AdminCall {
    pub amqp_port: u16,
    pub request: AdminRequest,
    /// Bound ports of the request's endpoint kind when the call was made
    pub bound_ports: Vec<u16>,
}

/// Administrative plane double that records every request.
#[derive(Default)]
pub struct RecordingAdmin {
    calls: Mutex<Vec<AdminCall>>,
    fail: AtomicBool,
    registry: Option<Arc<EndpointRegistry>>,
}

impl RecordingAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observing(registry: Arc<EndpointRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        let admin = Self::default();
        admin.fail.store(true, Ordering::SeqCst);
        admin
    }

    pub fn calls(&self) -> Vec<AdminCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AdminPlane for RecordingAdmin {
    async fn execute(
        &self,
        amqp_port: u16,
        request: &AdminRequest,
    ) -> Result<AdminOutput, AdminError> {
        let kind = match request {
            AdminRequest::Delete { kind, .. } | AdminRequest::Create { kind, .. } => *kind,
            _ => EndpointKind::TcpConnector,
        };
        let bound_ports = self
            .registry
            .as_ref()
            .map(|registry| registry.bound_ports(kind))
            .unwrap_or_default();
        self.calls.lock().push(AdminCall {
            amqp_port,
            request: request.clone(),
            bound_ports,
        });

        if self.fail.load(Ordering::SeqCst) {
            return Err(AdminError::TimedOut {
                request: request.to_string(),
                timeout: Duration::from_millis(1),
            });
        }
        Ok(AdminOutput {
            stdout: "[]".to_string(),
        })
    }
}

/// Harness configuration for a fast run inside `dir`.
pub fn fast_config(dir: &Path, n: usize, router: PathBuf) -> ValidatedConfig {
    let mut config = ValidatedConfig {
        network_size: n,
        router_binary: router.to_string_lossy().into_owned(),
        logs_path: dir.join("logs").to_string_lossy().into_owned(),
        config_dir: Some(dir.join("configs").to_string_lossy().into_owned()),
        seed: Some(0x5eed),
        startup_grace_secs: 1,
        stop_timeout_secs: 1,
        router_outage: PauseRange {
            min_ms: 50,
            max_ms: 100,
        },
        resource_pause: PauseRange {
            min_ms: 10,
            max_ms: 20,
        },
        probe_interval: PauseRange {
            min_ms: 10,
            max_ms: 20,
        },
        traffic: false,
        ..ValidatedConfig::default()
    };
    ConfigValidator::new(false).validate(&mut config).unwrap();
    config
}
