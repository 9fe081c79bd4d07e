//! Deterministic port allocation
//!
//! Every port in the harness is a pure function of (node, network size). The
//! four port blocks (AMQP listeners, inter-router listeners, TCP listeners,
//! TCP connectors) are laid out in ascending order of their requested base; a
//! block that would run into the previous one starts right after it, so no
//! two ports ever collide whatever the network size.

use serde::{Deserialize, Serialize};

use super::{NodeId, ENDPOINTS_PER_KIND};
use crate::error::TopologyError;

/// Requested base port of every block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBases {
    pub amqp: u16,
    pub inter_router: u16,
    pub tcp_listener: u16,
    pub tcp_connector: u16,
}

impl Default for PortBases {
    fn default() -> Self {
        Self {
            amqp: 5672,
            inter_router: 20000,
            tcp_listener: 5800,
            tcp_connector: 5900,
        }
    }
}

/// An inter-router connector from a node to a strictly higher node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshLink {
    pub from: NodeId,
    pub to: NodeId,
    /// Inter-router listener port of `to`
    pub port: u16,
}

impl MeshLink {
    pub fn name(&self) -> String {
        format!("{}-connector-to-{}", self.from, self.to)
    }
}

/// All ports of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePorts {
    pub node: NodeId,
    pub amqp: u16,
    /// Absent for the first node: nobody dials it
    pub inter_router: Option<u16>,
    pub tcp_listeners: [u16; ENDPOINTS_PER_KIND],
    pub tcp_connectors: [u16; ENDPOINTS_PER_KIND],
    pub mesh: Vec<MeshLink>,
}

impl NodePorts {
    /// Ports owned by this node: listeners it binds and connector targets it
    /// alone dials. Mesh link ports belong to their target.
    pub fn owned(&self) -> impl Iterator<Item = u16> + '_ {
        std::iter::once(self.amqp)
            .chain(self.inter_router)
            .chain(self.tcp_listeners.iter().copied())
            .chain(self.tcp_connectors.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Amqp,
    InterRouter,
    TcpListener,
    TcpConnector,
}

impl Block {
    fn name(self) -> &'static str {
        match self {
            Block::Amqp => "amqp listeners",
            Block::InterRouter => "inter-router listeners",
            Block::TcpListener => "tcp listeners",
            Block::TcpConnector => "tcp connectors",
        }
    }

    fn width(self, network_size: usize) -> u32 {
        let n = network_size as u32;
        match self {
            Block::Amqp => n,
            Block::InterRouter => n.saturating_sub(1),
            Block::TcpListener | Block::TcpConnector => n * ENDPOINTS_PER_KIND as u32,
        }
    }
}

/// Effective port layout of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLayout {
    network_size: usize,
    amqp: u16,
    inter_router: u16,
    tcp_listener: u16,
    tcp_connector: u16,
}

impl PortLayout {
    pub fn new(network_size: usize, bases: PortBases) -> Result<Self, TopologyError> {
        if network_size == 0 {
            return Err(TopologyError::EmptyNetwork);
        }
        // The widest block needs 3N ports; anything above this cannot fit anyway
        if network_size > u16::MAX as usize {
            return Err(TopologyError::PortRangeExhausted {
                block: Block::TcpListener.name(),
                start: bases.tcp_listener as u32,
                end: u32::MAX,
            });
        }

        let mut blocks = [
            (Block::Amqp, bases.amqp),
            (Block::InterRouter, bases.inter_router),
            (Block::TcpListener, bases.tcp_listener),
            (Block::TcpConnector, bases.tcp_connector),
        ];
        // Stable: equal requested bases keep the declaration order
        blocks.sort_by_key(|(_, base)| *base);

        let mut layout = Self {
            network_size,
            amqp: 0,
            inter_router: 0,
            tcp_listener: 0,
            tcp_connector: 0,
        };
        let mut cursor: u32 = 0;
        for (block, requested) in blocks {
            let start = cursor.max(requested as u32);
            let end = start + block.width(network_size);
            if end > u16::MAX as u32 + 1 {
                return Err(TopologyError::PortRangeExhausted {
                    block: block.name(),
                    start,
                    end,
                });
            }
            let start = start as u16;
            match block {
                Block::Amqp => layout.amqp = start,
                Block::InterRouter => layout.inter_router = start,
                Block::TcpListener => layout.tcp_listener = start,
                Block::TcpConnector => layout.tcp_connector = start,
            }
            cursor = end;
        }

        Ok(layout)
    }

    pub fn network_size(&self) -> usize {
        self.network_size
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        NodeId::all(self.network_size)
    }

    pub fn amqp_port(&self, node: NodeId) -> u16 {
        self.amqp + node.index() as u16
    }

    /// Inter-router listener of `node`. Numbering starts at the second node.
    pub fn inter_router_port(&self, node: NodeId) -> Option<u16> {
        match node.index() {
            0 => None,
            i => Some(self.inter_router + (i - 1) as u16),
        }
    }

    pub fn tcp_listener_port(&self, node: NodeId, slot: usize) -> u16 {
        debug_assert!(slot < ENDPOINTS_PER_KIND);
        self.tcp_listener + (node.index() * ENDPOINTS_PER_KIND + slot) as u16
    }

    pub fn tcp_connector_port(&self, node: NodeId, slot: usize) -> u16 {
        debug_assert!(slot < ENDPOINTS_PER_KIND);
        self.tcp_connector + (node.index() * ENDPOINTS_PER_KIND + slot) as u16
    }

    /// Mesh connectors of `node`: one per strictly higher node.
    pub fn mesh_links(&self, node: NodeId) -> Vec<MeshLink> {
        ((node.index() + 1)..self.network_size)
            .map(NodeId::new)
            .filter_map(|to| {
                self.inter_router_port(to).map(|port| MeshLink {
                    from: node,
                    to,
                    port,
                })
            })
            .collect()
    }

    pub fn node_ports(&self, node: NodeId) -> NodePorts {
        NodePorts {
            node,
            amqp: self.amqp_port(node),
            inter_router: self.inter_router_port(node),
            tcp_listeners: std::array::from_fn(|slot| self.tcp_listener_port(node, slot)),
            tcp_connectors: std::array::from_fn(|slot| self.tcp_connector_port(node, slot)),
            mesh: self.mesh_links(node),
        }
    }
}
