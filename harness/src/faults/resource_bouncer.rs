use log::{info, warn};
use rand::rngs::StdRng;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{exit_requested, pause, PauseRange};
use crate::admin::{AdminPlane, AdminRequest};
use crate::topology::{
    address_space, Endpoint, EndpointKind, EndpointRegistry, PortLayout, SymbolicAddress,
};

/// Deletes a random TCP listener or connector through the administrative
/// plane, then recreates it on the same port with a fresh address.
pub struct ResourceBouncer {
    kind: EndpointKind,
    layout: PortLayout,
    registry: Arc<EndpointRegistry>,
    admin: Arc<dyn AdminPlane>,
    pause: PauseRange,
    rng: StdRng,
}

impl ResourceBouncer {
    pub fn new(
        kind: EndpointKind,
        layout: PortLayout,
        registry: Arc<EndpointRegistry>,
        admin: Arc<dyn AdminPlane>,
        pause: PauseRange,
        rng: StdRng,
    ) -> Self {
        Self {
            kind,
            layout,
            registry,
            admin,
            pause,
            rng,
        }
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Admin failures never end this loop; only the exit signal does.
    pub async fn run(mut self, mut exit: broadcast::Receiver<()>) {
        info!("bounce_{}s: starting", self.kind);
        let registry = Arc::clone(&self.registry);
        loop {
            if exit_requested(&mut exit) {
                break;
            }
            let endpoint = registry.pick(self.kind, &mut self.rng);
            if !self.bounce_endpoint(endpoint, &mut exit).await {
                break;
            }
        }
        info!("bounce_{}s: stopping", self.kind);
    }

    /// Delete, pause, recreate, pause. Returns `false` on exit.
    pub async fn bounce_endpoint(
        &mut self,
        endpoint: &Endpoint,
        exit: &mut broadcast::Receiver<()>,
    ) -> bool {
        let amqp_port = self.layout.amqp_port(endpoint.node);

        let delete = AdminRequest::Delete {
            kind: endpoint.kind,
            name: endpoint.name.clone(),
        };
        match self.admin.execute(amqp_port, &delete).await {
            Ok(_) => {
                self.registry.mark_deleted(&endpoint.name);
                info!(
                    "bounce_{}s: deleted {} on port {}",
                    self.kind, endpoint.name, endpoint.port
                );
            }
            Err(e) => warn!("bounce_{}s: delete of {} failed: {}", self.kind, endpoint.name, e),
        }

        if !pause(exit, self.pause.sample(&mut self.rng)).await {
            return false;
        }

        let address =
            SymbolicAddress::random(&mut self.rng, address_space(self.layout.network_size()));
        let create = AdminRequest::Create {
            kind: endpoint.kind,
            name: endpoint.name.clone(),
            host: endpoint.kind.host().to_string(),
            port: endpoint.port,
            address,
        };
        match self.admin.execute(amqp_port, &create).await {
            Ok(_) => {
                self.registry.mark_bound(&endpoint.name, address);
                info!(
                    "bounce_{}s: recreated {} on port {} with address {}",
                    self.kind, endpoint.name, endpoint.port, address
                );
            }
            Err(e) => warn!("bounce_{}s: create of {} failed: {}", self.kind, endpoint.name, e),
        }

        pause(exit, self.pause.sample(&mut self.rng)).await
    }
}
