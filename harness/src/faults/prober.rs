use log::{info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{pause, PauseRange};
use crate::admin::{AdminOutput, AdminPlane, ManagementProbe};
use crate::error::AdminError;
use crate::topology::{NodeId, PortLayout};

/// Fires random read-only administrative queries at random routers.
pub struct ManagementProber {
    layout: PortLayout,
    admin: Arc<dyn AdminPlane>,
    interval: PauseRange,
    rng: StdRng,
}

impl ManagementProber {
    pub fn new(
        layout: PortLayout,
        admin: Arc<dyn AdminPlane>,
        interval: PauseRange,
        rng: StdRng,
    ) -> Self {
        Self {
            layout,
            admin,
            interval,
            rng,
        }
    }

    pub async fn run(mut self, mut exit: broadcast::Receiver<()>) {
        info!("management_commands: starting");
        loop {
            if !pause(&mut exit, self.interval.sample(&mut self.rng)).await {
                break;
            }
            let node = NodeId::new(self.rng.gen_range(0..self.layout.network_size()));
            let probe = ManagementProbe::random(&mut self.rng);
            // Failures are logged by probe_once and never end the loop
            let _ = self.probe_once(node, probe).await;
        }
        info!("management_commands: stopping");
    }

    pub async fn probe_once(
        &self,
        node: NodeId,
        probe: ManagementProbe,
    ) -> Result<AdminOutput, AdminError> {
        let result = self
            .admin
            .execute(self.layout.amqp_port(node), &probe.request())
            .await;
        match &result {
            Ok(output) => info!(
                "management_commands: {} on router {} succeeded ({} bytes)",
                probe,
                node,
                output.stdout.len()
            ),
            Err(e) => warn!("management_commands: {} on router {} failed: {}", probe, node, e),
        }
        result
    }
}
