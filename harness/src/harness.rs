//! Harness orchestration
//!
//! Builds the topology, brings the mesh up in the order the routers expect,
//! starts the fault injectors and then waits for either an external shutdown
//! request or a fatal injector error. Both paths end in the same shutdown:
//! broadcast exit, join the injectors, stop every router, kill the traffic
//! generators.

use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use crate::admin::{AdminPlane, SkManage};
use crate::audit::audit_all;
use crate::config::ValidatedConfig;
use crate::error::HarnessError;
use crate::faults::{pause, ManagementProber, ResourceBouncer, RouterBouncer};
use crate::rng::{SeedSource, Stream};
use crate::supervisor::Supervisor;
use crate::topology::{ConfigGenerator, EndpointKind, EndpointRegistry, PortLayout};
use crate::traffic::{TrafficGenerators, LAUNCH_STAGGER};

/// Fixed pauses of the bootstrap sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapSchedule {
    /// After every router was started, before the first audit
    pub startup_grace: Duration,
    /// Between starting the TCP servers and the TCP clients
    pub server_warmup: Duration,
    /// Before the router bouncer starts
    pub bounce_warmup: Duration,
    /// Between starting consecutive bouncers
    pub injector_stagger: Duration,
    /// Between consecutive traffic generator launches
    pub traffic_stagger: Duration,
}

impl Default for BootstrapSchedule {
    fn default() -> Self {
        Self {
            startup_grace: Duration::from_secs(5),
            server_warmup: Duration::from_secs(5),
            bounce_warmup: Duration::from_secs(10),
            injector_stagger: Duration::from_secs(2),
            traffic_stagger: LAUNCH_STAGGER,
        }
    }
}

pub struct Harness {
    config: ValidatedConfig,
    schedule: BootstrapSchedule,
    seed: SeedSource,
    layout: PortLayout,
    registry: Arc<EndpointRegistry>,
    generator: Arc<ConfigGenerator>,
    supervisor: Arc<Supervisor>,
    admin: Arc<dyn AdminPlane>,
    traffic: TrafficGenerators,
    exit: broadcast::Sender<()>,
    injectors: JoinSet<Result<(), HarnessError>>,
}

impl Harness {
    /// Harness driving the configured `skmanage` binary.
    pub fn build(config: ValidatedConfig) -> Result<Self, HarnessError> {
        let admin = Arc::new(SkManage::new(&config.skmanage, config.admin_timeout()));
        Self::with_admin(config, admin)
    }

    pub fn with_admin(
        config: ValidatedConfig,
        admin: Arc<dyn AdminPlane>,
    ) -> Result<Self, HarnessError> {
        let layout = config.port_layout()?;
        let registry = Arc::new(EndpointRegistry::from_layout(&layout));
        let generator = Arc::new(ConfigGenerator::new(layout, config.config_dir()));
        let supervisor = Arc::new(Supervisor::new(
            config.launch_spec(),
            layout
                .nodes()
                .map(|node| (node, generator.artifact_path(node))),
        ));
        let seed = SeedSource::from_config_or_env(config.seed);
        let schedule = BootstrapSchedule {
            startup_grace: config.startup_grace(),
            ..BootstrapSchedule::default()
        };
        let (exit, _) = broadcast::channel(1);

        Ok(Self {
            config,
            schedule,
            seed,
            layout,
            registry,
            generator,
            supervisor,
            admin,
            traffic: TrafficGenerators::new().with_stagger(schedule.traffic_stagger),
            exit,
            injectors: JoinSet::new(),
        })
    }

    pub fn with_schedule(mut self, schedule: BootstrapSchedule) -> Self {
        self.traffic = TrafficGenerators::new().with_stagger(schedule.traffic_stagger);
        self.schedule = schedule;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed.seed()
    }

    pub fn layout(&self) -> &PortLayout {
        &self.layout
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn generator(&self) -> &Arc<ConfigGenerator> {
        &self.generator
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    /// Sending on this channel starts an orderly shutdown.
    pub fn exit_sender(&self) -> broadcast::Sender<()> {
        self.exit.clone()
    }

    /// Run until shutdown is requested or an injector fails fatally.
    pub async fn run(mut self) -> Result<(), HarnessError> {
        let mut exit = self.exit.subscribe();
        let signals = spawn_signal_listener(self.exit.clone());

        let outcome = match self.bootstrap(&mut exit).await {
            Ok(true) => self.wait(&mut exit).await,
            Ok(false) => Ok(()),
            Err(e) => Err(e),
        };
        if let Err(e) = &outcome {
            error!("Fatal: {}", e);
        }

        self.shutdown().await;
        signals.abort();
        outcome
    }

    /// Bring the mesh up and start the injectors.
    ///
    /// Returns `Ok(false)` if shutdown was requested part way through.
    pub async fn bootstrap(
        &mut self,
        exit: &mut broadcast::Receiver<()>,
    ) -> Result<bool, HarnessError> {
        info!(
            "Bootstrapping a network of {} routers (seed 0x{:016x})",
            self.layout.network_size(),
            self.seed.seed()
        );

        self.generator.ensure_dir()?;
        let mut rng = self.seed.fork(Stream::Bootstrap);
        for node in self.layout.nodes() {
            let artifact = self.generator.generate(node, &mut rng)?;
            self.registry.record_artifact(&artifact);
        }

        info!("Starting routers");
        for node in self.layout.nodes() {
            self.supervisor.start(node).await?;
        }
        info!("Pause {:?}", self.schedule.startup_grace);
        if !pause(exit, self.schedule.startup_grace).await {
            return Ok(false);
        }
        audit_all(&self.supervisor).await?;

        if self.config.management_probe {
            let prober = ManagementProber::new(
                self.layout,
                Arc::clone(&self.admin),
                self.config.probe_interval,
                self.seed.fork(Stream::ManagementProber),
            );
            let rx = self.exit.subscribe();
            self.injectors.spawn(async move {
                prober.run(rx).await;
                Ok(())
            });
        }

        if self.config.traffic && !self.start_traffic(exit).await? {
            return Ok(false);
        }

        info!(
            "Sleeping {:?} before starting to bounce routers",
            self.schedule.bounce_warmup
        );
        if !pause(exit, self.schedule.bounce_warmup).await {
            return Ok(false);
        }

        if self.config.router_bounce {
            let bouncer = RouterBouncer::new(
                Arc::clone(&self.supervisor),
                Arc::clone(&self.generator),
                Arc::clone(&self.registry),
                self.config.router_outage,
                self.seed.fork(Stream::RouterBouncer),
            );
            self.injectors.spawn(bouncer.run(self.exit.subscribe()));
        }

        for (kind, enabled, stream) in [
            (
                EndpointKind::TcpListener,
                self.config.listener_bounce,
                Stream::ListenerBouncer,
            ),
            (
                EndpointKind::TcpConnector,
                self.config.connector_bounce,
                Stream::ConnectorBouncer,
            ),
        ] {
            if !enabled {
                continue;
            }
            if !pause(exit, self.schedule.injector_stagger).await {
                return Ok(false);
            }
            info!("Start bouncing {}s", kind);
            let bouncer = ResourceBouncer::new(
                kind,
                self.layout,
                Arc::clone(&self.registry),
                Arc::clone(&self.admin),
                self.config.resource_pause,
                self.seed.fork(stream),
            );
            let rx = self.exit.subscribe();
            self.injectors.spawn(async move {
                bouncer.run(rx).await;
                Ok(())
            });
        }

        info!("Bootstrap complete, {} injectors running", self.injectors.len());
        Ok(true)
    }

    async fn start_traffic(
        &mut self,
        exit: &mut broadcast::Receiver<()>,
    ) -> Result<bool, HarnessError> {
        let servers = PathBuf::from(&self.config.mock_server_binary);
        let clients = PathBuf::from(&self.config.mock_client_binary);

        info!("Starting TCP servers");
        let ports = self.registry.ports(EndpointKind::TcpConnector);
        if !self.traffic.launch_all(&servers, &ports, exit).await? {
            return Ok(false);
        }
        if !pause(exit, self.schedule.server_warmup).await {
            return Ok(false);
        }

        info!("Starting TCP clients");
        let ports = self.registry.ports(EndpointKind::TcpListener);
        self.traffic.launch_all(&clients, &ports, exit).await
    }

    async fn wait(&mut self, exit: &mut broadcast::Receiver<()>) -> Result<(), HarnessError> {
        loop {
            select! {
                biased;
                _ = exit.recv() => {
                    info!("Shutdown requested");
                    return Ok(());
                },
                Some(res) = self.injectors.join_next() => match res {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) if e.is_fatal() => return Err(e),
                    Ok(Err(e)) => warn!("Fault injector stopped: {}", e),
                    Err(e) => return Err(HarnessError::Task(e.to_string())),
                },
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down");
        // No receivers left is fine
        let _ = self.exit.send(());

        while let Some(res) = self.injectors.join_next().await {
            match res {
                Ok(Err(e)) => warn!("Fault injector ended with error during shutdown: {}", e),
                Err(e) => warn!("Fault injector task failed during shutdown: {}", e),
                Ok(Ok(())) => {}
            }
        }

        self.supervisor.stop_all().await;
        self.traffic.stop_all().await;
        info!("Shutdown complete");
    }
}

/// Ctrl-C and SIGTERM both request an orderly shutdown.
fn spawn_signal_listener(exit: broadcast::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                    _ = term.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Cannot listen for Ctrl-C: {}", e);
                    return;
                }
                info!("Received Ctrl-C");
            }
        }
        let _ = exit.send(());
    })
}
