//! Endpoint registry
//!
//! Names and ports are fixed when the topology is built and are read without
//! locking afterwards. Only the address view (which symbolic address an
//! endpoint is bound to, or whether it is currently deleted) changes, under a
//! short lock of its own.
//!
//! Alongside the live view the registry remembers the addresses of the
//! artifact currently on disk for each endpoint. A router that is restarted
//! comes back with exactly those bindings, whatever happened to the live view
//! while it was down.

use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;

use super::artifact::ConfigArtifact;
use super::ports::PortLayout;
use super::{EndpointKind, NodeId, SymbolicAddress, ENDPOINTS_PER_KIND};

/// A named TCP endpoint. Immutable for the life of the harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub name: String,
    pub node: NodeId,
    pub kind: EndpointKind,
    pub slot: usize,
    pub port: u16,
}

/// Last known state of an endpoint on its router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Not configured yet
    Unbound,
    Bound(SymbolicAddress),
    Deleted,
}

struct AddressView {
    live: HashMap<String, Binding>,
    /// Addresses of the artifact on disk
    configured: HashMap<String, SymbolicAddress>,
}

pub struct EndpointRegistry {
    endpoints: IndexMap<String, Endpoint>,
    network_size: usize,
    view: Mutex<AddressView>,
}

impl EndpointRegistry {
    pub fn from_layout(layout: &PortLayout) -> Self {
        let mut endpoints = IndexMap::new();
        for kind in [EndpointKind::TcpListener, EndpointKind::TcpConnector] {
            for node in layout.nodes() {
                for slot in 0..ENDPOINTS_PER_KIND {
                    let name = kind.endpoint_name(node, slot);
                    let port = match kind {
                        EndpointKind::TcpListener => layout.tcp_listener_port(node, slot),
                        EndpointKind::TcpConnector => layout.tcp_connector_port(node, slot),
                    };
                    endpoints.insert(
                        name.clone(),
                        Endpoint {
                            name,
                            node,
                            kind,
                            slot,
                            port,
                        },
                    );
                }
            }
        }

        let live = endpoints
            .keys()
            .map(|name| (name.clone(), Binding::Unbound))
            .collect();

        Self {
            endpoints,
            network_size: layout.network_size(),
            view: Mutex::new(AddressView {
                live,
                configured: HashMap::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints.get(name)
    }

    pub fn port(&self, name: &str) -> Option<u16> {
        self.endpoints.get(name).map(|endpoint| endpoint.port)
    }

    pub fn lookup(&self, kind: EndpointKind, node: NodeId, slot: usize) -> Option<&Endpoint> {
        self.endpoints.get(&kind.endpoint_name(node, slot))
    }

    pub fn endpoints(&self, kind: EndpointKind) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values().filter(move |e| e.kind == kind)
    }

    /// Uniform pick of a node, then of a slot on that node.
    pub fn pick<R: Rng + ?Sized>(&self, kind: EndpointKind, rng: &mut R) -> &Endpoint {
        let node = NodeId::new(rng.gen_range(0..self.network_size));
        let slot = rng.gen_range(0..ENDPOINTS_PER_KIND);
        // Every (node, slot) pair was registered in from_layout
        &self.endpoints[&kind.endpoint_name(node, slot)]
    }

    pub fn binding(&self, name: &str) -> Option<Binding> {
        self.view.lock().live.get(name).copied()
    }

    /// Address `name` gets from the artifact on disk, if one was written.
    pub fn configured(&self, name: &str) -> Option<SymbolicAddress> {
        self.view.lock().configured.get(name).copied()
    }

    /// Record an artifact whose router is (or is about to be) running on it:
    /// the bindings become both the configured and the live view.
    pub fn record_artifact(&self, artifact: &ConfigArtifact) {
        let mut view = self.view.lock();
        for binding in artifact.bindings() {
            view.configured.insert(binding.name.clone(), binding.address);
            view.live
                .insert(binding.name.clone(), Binding::Bound(binding.address));
        }
    }

    /// Record an artifact written for a router that is still running on its
    /// previous one. The live view is untouched until the router restarts.
    pub fn stage_artifact(&self, artifact: &ConfigArtifact) {
        let mut view = self.view.lock();
        for binding in artifact.bindings() {
            view.configured.insert(binding.name.clone(), binding.address);
        }
    }

    /// The router of `node` has no process: none of its endpoints is bound.
    pub fn mark_node_stopped(&self, node: NodeId) {
        let mut view = self.view.lock();
        for endpoint in self.endpoints.values().filter(|e| e.node == node) {
            view.live.insert(endpoint.name.clone(), Binding::Unbound);
        }
    }

    /// The router of `node` was started on its configured artifact.
    pub fn mark_node_started(&self, node: NodeId) {
        let mut view = self.view.lock();
        for endpoint in self.endpoints.values().filter(|e| e.node == node) {
            let binding = match view.configured.get(&endpoint.name) {
                Some(address) => Binding::Bound(*address),
                None => Binding::Unbound,
            };
            view.live.insert(endpoint.name.clone(), binding);
        }
    }

    pub fn mark_deleted(&self, name: &str) {
        if let Some(binding) = self.view.lock().live.get_mut(name) {
            *binding = Binding::Deleted;
        }
    }

    pub fn mark_bound(&self, name: &str, address: SymbolicAddress) {
        if let Some(binding) = self.view.lock().live.get_mut(name) {
            *binding = Binding::Bound(address);
        }
    }

    /// Ports of endpoints of `kind` that are currently bound.
    pub fn bound_ports(&self, kind: EndpointKind) -> Vec<u16> {
        let view = self.view.lock();
        self.endpoints(kind)
            .filter(|e| matches!(view.live.get(&e.name), Some(Binding::Bound(_))))
            .map(|e| e.port)
            .collect()
    }

    /// Ports of every endpoint of `kind`, bound or not.
    pub fn ports(&self, kind: EndpointKind) -> Vec<u16> {
        self.endpoints(kind).map(|e| e.port).collect()
    }
}
