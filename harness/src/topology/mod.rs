//! Topology model
//!
//! Node identities, endpoint naming, the symbolic address space and the
//! deterministic port layout that every other component derives from.

/// Config artifact generation
pub mod artifact;
/// Deterministic port allocation
pub mod ports;
/// Endpoint name → port registry
pub mod registry;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use artifact::{ConfigArtifact, ConfigGenerator, TcpBinding};
pub use ports::{MeshLink, NodePorts, PortBases, PortLayout};
pub use registry::{Binding, Endpoint, EndpointRegistry};

/// Number of TCP listeners and of TCP connectors on every router.
pub const ENDPOINTS_PER_KIND: usize = 3;

/// Symbolic addresses available per router in the network.
pub const ADDRESSES_PER_NODE: usize = 3;

/// Opaque router identity.
///
/// The index is the only thing the harness computes with; the letter label
/// (`A`, `B`, ... `Z`, `AA`, ...) is presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }

    /// Every node identity of a network of `size` routers.
    pub fn all(size: usize) -> impl Iterator<Item = NodeId> {
        (0..size).map(NodeId)
    }

    /// Spreadsheet-style label: A..Z, then AA, AB, ...
    pub fn label(self) -> String {
        let mut n = self.0 + 1;
        let mut label = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            label.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        label.reverse();
        String::from_utf8(label).unwrap_or_default()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// The two kinds of TCP endpoint the fault injectors bounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    TcpListener,
    TcpConnector,
}

impl EndpointKind {
    /// Entity type understood by the administrative CLI.
    pub fn entity_type(self) -> &'static str {
        match self {
            EndpointKind::TcpListener => "tcpListener",
            EndpointKind::TcpConnector => "tcpConnector",
        }
    }

    /// Host written into the artifact and used when recreating the endpoint.
    pub fn host(self) -> &'static str {
        match self {
            EndpointKind::TcpListener => "0.0.0.0",
            EndpointKind::TcpConnector => "127.0.0.1",
        }
    }

    fn name_prefix(self) -> &'static str {
        match self {
            EndpointKind::TcpListener => "tcp-listener",
            EndpointKind::TcpConnector => "tcp-connector",
        }
    }

    /// Deterministic endpoint name, e.g. `tcp-listener-A-0`.
    pub fn endpoint_name(self, node: NodeId, slot: usize) -> String {
        format!("{}-{}-{}", self.name_prefix(), node, slot)
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_prefix())
    }
}

/// A logical message address (`addr_<n>`). Several endpoints may share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolicAddress(usize);

impl SymbolicAddress {
    pub const fn new(n: usize) -> Self {
        Self(n)
    }

    pub const fn index(self) -> usize {
        self.0
    }

    /// Uniform draw from an address space of `space` addresses.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, space: usize) -> Self {
        Self(rng.gen_range(0..space.max(1)))
    }
}

impl fmt::Display for SymbolicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "addr_{}", self.0)
    }
}

/// Size of the symbolic address space for a network of `network_size` routers.
pub fn address_space(network_size: usize) -> usize {
    network_size * ADDRESSES_PER_NODE
}
