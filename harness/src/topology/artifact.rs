//! Router config artifacts
//!
//! One block-structured text file per router. The generator can be called for
//! a running router at any time: the file only takes effect the next time the
//! router starts, which is how a bounced router comes back into a world whose
//! address bindings moved while it was down.

use log::{debug, info};
use rand::Rng;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};

use super::ports::{MeshLink, PortLayout};
use super::{address_space, EndpointKind, NodeId, SymbolicAddress, ENDPOINTS_PER_KIND};
use crate::error::ArtifactError;

const WORKER_THREADS: u32 = 2;
const IDLE_TIMEOUT_SECS: u32 = 120;
const SITE_ID: &str = "my-site";

/// A TCP listener or connector as written into an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpBinding {
    pub name: String,
    pub kind: EndpointKind,
    pub port: u16,
    pub address: SymbolicAddress,
}

/// Everything a router needs to join the mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigArtifact {
    pub node: NodeId,
    pub amqp_port: u16,
    pub inter_router_port: Option<u16>,
    pub tcp_listeners: Vec<TcpBinding>,
    pub tcp_connectors: Vec<TcpBinding>,
    pub mesh: Vec<MeshLink>,
}

impl ConfigArtifact {
    /// Build the artifact for `node`, drawing every TCP address independently.
    pub fn build<R: Rng + ?Sized>(layout: &PortLayout, node: NodeId, rng: &mut R) -> Self {
        let space = address_space(layout.network_size());
        let mut bindings = |kind: EndpointKind| -> Vec<TcpBinding> {
            (0..ENDPOINTS_PER_KIND)
                .map(|slot| TcpBinding {
                    name: kind.endpoint_name(node, slot),
                    kind,
                    port: match kind {
                        EndpointKind::TcpListener => layout.tcp_listener_port(node, slot),
                        EndpointKind::TcpConnector => layout.tcp_connector_port(node, slot),
                    },
                    address: SymbolicAddress::random(&mut *rng, space),
                })
                .collect()
        };
        let tcp_listeners = bindings(EndpointKind::TcpListener);
        let tcp_connectors = bindings(EndpointKind::TcpConnector);

        Self {
            node,
            amqp_port: layout.amqp_port(node),
            inter_router_port: layout.inter_router_port(node),
            tcp_listeners,
            tcp_connectors,
            mesh: layout.mesh_links(node),
        }
    }

    /// Listener and connector bindings in artifact order.
    pub fn bindings(&self) -> impl Iterator<Item = &TcpBinding> {
        self.tcp_listeners.iter().chain(self.tcp_connectors.iter())
    }
}

impl fmt::Display for ConfigArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "router {{")?;
        writeln!(f, "  id:            {}", self.node)?;
        writeln!(f, "  mode:          interior")?;
        writeln!(f, "  workerThreads: {}", WORKER_THREADS)?;
        writeln!(f, "}}\n")?;

        writeln!(f, "listener {{")?;
        writeln!(f, "  port: {}", self.amqp_port)?;
        writeln!(f, "  role: normal")?;
        writeln!(f, "  host: 0.0.0.0")?;
        writeln!(f, "}}\n")?;

        if let Some(port) = self.inter_router_port {
            writeln!(f, "listener {{")?;
            writeln!(f, "  name: inter-router-listener-{}", self.node)?;
            writeln!(f, "  port: {}", port)?;
            writeln!(f, "  role: inter-router")?;
            writeln!(f, "  idleTimeoutSeconds: {}", IDLE_TIMEOUT_SECS)?;
            writeln!(f, "  saslMechanisms: ANONYMOUS")?;
            writeln!(f, "  host: 0.0.0.0")?;
            writeln!(f, "  authenticatePeer: no")?;
            writeln!(f, "}}\n")?;
        }

        for listener in &self.tcp_listeners {
            writeln!(f, "tcpListener {{")?;
            writeln!(f, "  name:  {}", listener.name)?;
            writeln!(f, "  port: {}", listener.port)?;
            writeln!(f, "  host: {}", EndpointKind::TcpListener.host())?;
            writeln!(f, "  address: {}", listener.address)?;
            writeln!(f, "  siteId: {}", SITE_ID)?;
            writeln!(f, "}}\n")?;
        }

        for connector in &self.tcp_connectors {
            writeln!(f, "tcpConnector {{")?;
            writeln!(f, "  name: {}", connector.name)?;
            writeln!(f, "  port: {}", connector.port)?;
            writeln!(f, "  host: {}", EndpointKind::TcpConnector.host())?;
            writeln!(f, "  address: {}", connector.address)?;
            writeln!(f, "}}\n")?;
        }

        for link in &self.mesh {
            writeln!(f, "connector {{")?;
            writeln!(f, "  name: {}", link.name())?;
            writeln!(f, "  port: {}", link.port)?;
            writeln!(f, "  role: inter-router")?;
            writeln!(f, "  stripAnnotations: no")?;
            writeln!(f, "  idleTimeoutSeconds: {}", IDLE_TIMEOUT_SECS)?;
            writeln!(f, "  saslMechanisms: ANONYMOUS")?;
            writeln!(f, "  host: 127.0.0.1")?;
            writeln!(f, "}}\n")?;
        }

        Ok(())
    }
}

/// Writes artifacts into the config directory.
#[derive(Debug, Clone)]
pub struct ConfigGenerator {
    layout: PortLayout,
    config_dir: PathBuf,
}

impl ConfigGenerator {
    pub fn new(layout: PortLayout, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            config_dir: config_dir.into(),
        }
    }

    pub fn layout(&self) -> &PortLayout {
        &self.layout
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn artifact_path(&self, node: NodeId) -> PathBuf {
        self.config_dir.join(format!("{}.conf", node))
    }

    /// Create the config directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<(), ArtifactError> {
        std::fs::create_dir_all(&self.config_dir).map_err(|source| ArtifactError::CreateDir {
            path: self.config_dir.clone(),
            source,
        })?;
        info!("Config directory ready at {}", self.config_dir.display());
        Ok(())
    }

    /// Build a fresh artifact for `node` and overwrite its file.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        node: NodeId,
        rng: &mut R,
    ) -> Result<ConfigArtifact, ArtifactError> {
        let artifact = ConfigArtifact::build(&self.layout, node, rng);
        let path = self.artifact_path(node);

        let mut content = String::new();
        // Writing into a String cannot fail
        let _ = write!(content, "{}", artifact);
        std::fs::write(&path, content).map_err(|source| ArtifactError::Write {
            path: path.clone(),
            source,
        })?;

        info!("Wrote config for router {} to {}", node, path.display());
        if log::log_enabled!(log::Level::Debug) {
            for binding in artifact.bindings() {
                debug!(
                    "    name {} port {} addr {}",
                    binding.name, binding.port, binding.address
                );
            }
        }
        Ok(artifact)
    }
}
