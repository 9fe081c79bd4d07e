//! Administrative plane
//!
//! Live router state is mutated and inspected through an external management
//! CLI. The harness only relies on its exit status and stdout. Every call is a
//! child process with a bounded lifetime, so a stuck call never holds up
//! another fault injector.

use async_trait::async_trait;
use log::debug;
use rand::Rng;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::AdminError;
use crate::topology::{EndpointKind, SymbolicAddress};

/// A single administrative command, independent of the router it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminRequest {
    /// `QUERY --type=<resource_type>`
    Query { resource_type: String },
    /// `get-log`
    GetLog,
    /// `delete --type=<kind> --name=<name>`
    Delete { kind: EndpointKind, name: String },
    /// `create --type=<kind> --name=<name> host=<h> port==<p> address=<addr>`
    Create {
        kind: EndpointKind,
        name: String,
        host: String,
        port: u16,
        address: SymbolicAddress,
    },
}

impl AdminRequest {
    pub fn query(resource_type: impl Into<String>) -> Self {
        AdminRequest::Query {
            resource_type: resource_type.into(),
        }
    }

    /// Read-only requests get pretty-printed output.
    pub fn is_read_only(&self) -> bool {
        matches!(self, AdminRequest::Query { .. } | AdminRequest::GetLog)
    }

    /// Operation-specific arguments, without the bus and timeout options.
    pub fn args(&self) -> Vec<String> {
        match self {
            AdminRequest::Query { resource_type } => {
                vec!["QUERY".to_string(), format!("--type={}", resource_type)]
            }
            AdminRequest::GetLog => vec!["get-log".to_string()],
            AdminRequest::Delete { kind, name } => vec![
                "delete".to_string(),
                format!("--type={}", kind.entity_type()),
                format!("--name={}", name),
            ],
            AdminRequest::Create {
                kind,
                name,
                host,
                port,
                address,
            } => vec![
                "create".to_string(),
                format!("--type={}", kind.entity_type()),
                format!("--name={}", name),
                format!("host={}", host),
                format!("port=={}", port),
                format!("address={}", address),
            ],
        }
    }
}

impl fmt::Display for AdminRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args().join(" "))
    }
}

/// Read-only queries fired by the management prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagementProbe {
    ConnectorQuery,
    LogRetrieval,
    AutolinkQuery,
    MetricsQuery,
}

impl ManagementProbe {
    pub const ALL: [ManagementProbe; 4] = [
        ManagementProbe::ConnectorQuery,
        ManagementProbe::LogRetrieval,
        ManagementProbe::AutolinkQuery,
        ManagementProbe::MetricsQuery,
    ];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    pub fn request(self) -> AdminRequest {
        match self {
            ManagementProbe::ConnectorQuery => {
                AdminRequest::query(EndpointKind::TcpConnector.entity_type())
            }
            ManagementProbe::LogRetrieval => AdminRequest::GetLog,
            ManagementProbe::AutolinkQuery => {
                AdminRequest::query("io.skupper.router.router.config.autoLink")
            }
            ManagementProbe::MetricsQuery => AdminRequest::query("io.skupper.router.routerMetrics"),
        }
    }
}

impl fmt::Display for ManagementProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ManagementProbe::ConnectorQuery => "connector query",
            ManagementProbe::LogRetrieval => "log retrieval",
            ManagementProbe::AutolinkQuery => "autolink query",
            ManagementProbe::MetricsQuery => "metrics query",
        })
    }
}

/// Captured result of a successful administrative call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminOutput {
    pub stdout: String,
}

/// Seam between the fault injectors and the management CLI.
#[async_trait]
pub trait AdminPlane: Send + Sync {
    /// Run `request` against the router whose AMQP listener is `amqp_port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned, exceeds its
    /// timeout, or exits unsuccessfully.
    async fn execute(&self, amqp_port: u16, request: &AdminRequest)
        -> Result<AdminOutput, AdminError>;
}

/// The `skmanage` command line client.
#[derive(Debug, Clone)]
pub struct SkManage {
    program: PathBuf,
    timeout: Duration,
    host: String,
}

impl SkManage {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
            host: "0.0.0.0".to_string(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn bus_url(&self, amqp_port: u16) -> String {
        format!("amqp://{}:{}", self.host, amqp_port)
    }

    /// Full argument list for `request` against `amqp_port`.
    pub fn command_args(&self, amqp_port: u16, request: &AdminRequest) -> Vec<String> {
        let mut args = request.args();
        args.push("--bus".to_string());
        args.push(self.bus_url(amqp_port));
        if request.is_read_only() {
            args.push("--indent=2".to_string());
        }
        args.push("--timeout".to_string());
        args.push(format!("{:.1}", self.timeout.as_secs_f64()));
        args
    }
}

#[async_trait]
impl AdminPlane for SkManage {
    async fn execute(
        &self,
        amqp_port: u16,
        request: &AdminRequest,
    ) -> Result<AdminOutput, AdminError> {
        let args = self.command_args(amqp_port, request);
        if log::log_enabled!(log::Level::Debug) {
            debug!("{} {}", self.program.display(), args.join(" "));
        }

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| AdminError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the timed-out future drops the child, which kills it
        let output = match timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(|source| AdminError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(AdminError::TimedOut {
                    request: request.to_string(),
                    timeout: self.timeout,
                })
            }
        };

        if !output.status.success() {
            return Err(AdminError::Failed {
                request: request.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(AdminOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
