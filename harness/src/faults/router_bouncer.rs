use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{exit_requested, pause, PauseRange};
use crate::audit::audit_all;
use crate::error::HarnessError;
use crate::supervisor::Supervisor;
use crate::topology::{ConfigGenerator, EndpointRegistry, NodeId};

/// Kills a random router, rewrites its config and brings it back.
pub struct RouterBouncer {
    supervisor: Arc<Supervisor>,
    generator: Arc<ConfigGenerator>,
    registry: Arc<EndpointRegistry>,
    outage: PauseRange,
    rng: StdRng,
    bounces: u64,
}

impl RouterBouncer {
    pub fn new(
        supervisor: Arc<Supervisor>,
        generator: Arc<ConfigGenerator>,
        registry: Arc<EndpointRegistry>,
        outage: PauseRange,
        rng: StdRng,
    ) -> Self {
        Self {
            supervisor,
            generator,
            registry,
            outage,
            rng,
            bounces: 0,
        }
    }

    pub fn bounces(&self) -> u64 {
        self.bounces
    }

    /// Audit, then bounce, until the exit signal or a fatal error.
    pub async fn run(mut self, mut exit: broadcast::Receiver<()>) -> Result<(), HarnessError> {
        info!("bounce_routers: starting");
        loop {
            if exit_requested(&mut exit) {
                break;
            }
            audit_all(&self.supervisor).await?;

            let size = self.generator.layout().network_size();
            let node = NodeId::new(self.rng.gen_range(0..size));
            if !self.bounce_once(node, &mut exit).await? {
                break;
            }
        }
        info!("bounce_routers: stopping after {} bounces", self.bounces);
        Ok(())
    }

    /// Regenerate `node`'s config, stop it, wait out the outage, restart it.
    ///
    /// The endpoints of `node` leave the bound view when it stops and take
    /// the addresses of its artifact on disk when it comes back.
    ///
    /// Returns `Ok(false)` if the exit signal arrived during the outage, in
    /// which case the router is left stopped for shutdown to deal with.
    pub async fn bounce_once(
        &mut self,
        node: NodeId,
        exit: &mut broadcast::Receiver<()>,
    ) -> Result<bool, HarnessError> {
        info!("bounce_routers: bouncing router {}", node);

        match self.generator.generate(node, &mut self.rng) {
            Ok(artifact) => self.registry.stage_artifact(&artifact),
            // The previous artifact is still on disk and still valid
            Err(e) => error!("bounce_routers: {}, restarting with the previous config", e),
        }

        match self.supervisor.stop(node).await {
            Ok(status) => info!("bounce_routers: router {} stopped ({})", node, status),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => warn!("bounce_routers: failed to stop router {}: {}", node, e),
        }
        // Whatever stop reported, the router has no process now
        self.registry.mark_node_stopped(node);

        let outage = self.outage.sample(&mut self.rng);
        info!("bounce_routers: router {} down for {:?}", node, outage);
        if !pause(exit, outage).await {
            return Ok(false);
        }

        match self.supervisor.start(node).await {
            Ok(pid) => {
                self.registry.mark_node_started(node);
                self.bounces += 1;
                info!("bounce_routers: router {} restarted with pid {}", node, pid);
                Ok(true)
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                warn!("bounce_routers: router {} not restarted: {}", node, e);
                Ok(true)
            }
        }
    }
}
