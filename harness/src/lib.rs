//! Steel Rain chaos harness
//!
//! Builds a fully-meshed topology of router nodes, launches every router as a
//! subprocess and then keeps disturbing the mesh: routers are bounced, TCP
//! listeners and connectors are deleted and recreated through the
//! administrative CLI, and read-only management queries are fired at random
//! nodes. Every router bounce is gated by a liveness audit; a router that dies
//! on its own ends the run.
//!
//! ## Layout
//!
//! - [`topology`]: port allocation, node identities, config artifacts and the
//!   endpoint registry
//! - [`supervisor`]: router process lifecycle (start, stop + reap, liveness)
//! - [`audit`]: the fail-fast liveness audit
//! - [`admin`]: the administrative plane (skmanage wrapper)
//! - [`faults`]: the fault injection loops
//! - [`harness`]: bootstrap sequencing and shutdown

pub mod admin;
pub mod audit;
pub mod config;
pub mod error;
pub mod faults;
pub mod harness;
pub mod rng;
pub mod supervisor;
pub mod topology;
pub mod traffic;

pub use error::{AdminError, ArtifactError, HarnessError, SupervisorError, TopologyError};
pub use harness::{BootstrapSchedule, Harness};
pub use topology::{EndpointKind, NodeId, PortLayout};

/// Harness version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
