mod support;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use steel_rain::admin::{AdminRequest, ManagementProbe};
use steel_rain::faults::{ManagementProber, PauseRange, ResourceBouncer, RouterBouncer};
use steel_rain::supervisor::{NodeState, StopSignal};
use steel_rain::topology::{Binding, EndpointKind};
use steel_rain::{HarnessError, NodeId, SupervisorError};

use support::{fake_router, init_logging, Mesh, RecordingAdmin};

const NO_PAUSE: PauseRange = PauseRange {
    min_ms: 0,
    max_ms: 0,
};

#[tokio::test]
async fn test_listener_bounce_keeps_name_and_port() {
    init_logging();
    let mesh = Mesh::new(3, fake_router(), StopSignal::Kill);
    mesh.write_artifacts(11);
    let admin = Arc::new(RecordingAdmin::observing(Arc::clone(&mesh.registry)));
    let mut bouncer = ResourceBouncer::new(
        EndpointKind::TcpListener,
        mesh.layout,
        Arc::clone(&mesh.registry),
        admin.clone(),
        NO_PAUSE,
        StdRng::seed_from_u64(12),
    );
    let (_sender, mut exit) = broadcast::channel(1);

    let endpoint = mesh.registry.get("tcp-listener-A-0").unwrap().clone();
    assert_eq!(endpoint.port, 5800);
    assert!(matches!(
        mesh.registry.binding(&endpoint.name),
        Some(Binding::Bound(_))
    ));
    assert!(mesh
        .registry
        .bound_ports(EndpointKind::TcpListener)
        .contains(&5800));

    assert!(bouncer.bounce_endpoint(&endpoint, &mut exit).await);

    let calls = admin.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].amqp_port, 5672);
    assert_eq!(
        calls[0].request,
        AdminRequest::Delete {
            kind: EndpointKind::TcpListener,
            name: "tcp-listener-A-0".to_string(),
        }
    );
    // While deleted, the port is out of the bound view
    assert!(!calls[1].bound_ports.contains(&5800));

    let AdminRequest::Create {
        kind,
        name,
        host,
        port,
        address,
    } = &calls[1].request
    else {
        panic!("expected a create, got {:?}", calls[1].request);
    };
    assert_eq!(*kind, EndpointKind::TcpListener);
    assert_eq!(name, "tcp-listener-A-0");
    assert_eq!(host, "0.0.0.0");
    assert_eq!(*port, 5800);
    assert!(address.index() < 9);

    assert_eq!(
        mesh.registry.binding(&endpoint.name),
        Some(Binding::Bound(*address))
    );
    assert_eq!(mesh.registry.port("tcp-listener-A-0"), Some(5800));
    assert!(mesh
        .registry
        .bound_ports(EndpointKind::TcpListener)
        .contains(&5800));
}

#[tokio::test]
async fn test_connector_bounce_targets_owning_router() {
    let mesh = Mesh::new(3, fake_router(), StopSignal::Kill);
    mesh.write_artifacts(13);
    let admin = Arc::new(RecordingAdmin::new());
    let mut bouncer = ResourceBouncer::new(
        EndpointKind::TcpConnector,
        mesh.layout,
        Arc::clone(&mesh.registry),
        admin.clone(),
        NO_PAUSE,
        StdRng::seed_from_u64(14),
    );
    let (_sender, mut exit) = broadcast::channel(1);

    let endpoint = mesh.registry.get("tcp-connector-C-2").unwrap().clone();
    assert!(bouncer.bounce_endpoint(&endpoint, &mut exit).await);

    let calls = admin.calls();
    assert!(calls.iter().all(|call| call.amqp_port == 5674));
    match &calls[1].request {
        AdminRequest::Create { host, port, .. } => {
            assert_eq!(host, "127.0.0.1");
            assert_eq!(*port, endpoint.port);
        }
        other => panic!("expected a create, got {other:?}"),
    }
}

#[tokio::test]
async fn test_admin_failures_do_not_stop_bouncer() {
    let mesh = Mesh::new(2, fake_router(), StopSignal::Kill);
    mesh.write_artifacts(15);
    let admin = Arc::new(RecordingAdmin::failing());
    let mut bouncer = ResourceBouncer::new(
        EndpointKind::TcpListener,
        mesh.layout,
        Arc::clone(&mesh.registry),
        admin.clone(),
        NO_PAUSE,
        StdRng::seed_from_u64(16),
    );
    let (sender, mut exit) = broadcast::channel(1);

    let endpoint = mesh.registry.get("tcp-listener-B-1").unwrap().clone();
    let before = mesh.registry.binding(&endpoint.name);
    assert!(bouncer.bounce_endpoint(&endpoint, &mut exit).await);
    // Neither the delete nor the create took effect
    assert_eq!(mesh.registry.binding(&endpoint.name), before);
    assert_eq!(admin.calls().len(), 2);

    let looping = ResourceBouncer::new(
        EndpointKind::TcpListener,
        mesh.layout,
        Arc::clone(&mesh.registry),
        admin.clone(),
        PauseRange {
            min_ms: 1,
            max_ms: 5,
        },
        StdRng::seed_from_u64(17),
    );
    let task = tokio::spawn(looping.run(sender.subscribe()));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!task.is_finished());

    sender.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
    assert!(admin.calls().len() > 4);
}

#[tokio::test]
async fn test_prober_issues_read_only_queries() {
    let mesh = Mesh::new(3, fake_router(), StopSignal::Kill);
    let admin = Arc::new(RecordingAdmin::new());
    let prober = ManagementProber::new(
        mesh.layout,
        admin.clone(),
        NO_PAUSE,
        StdRng::seed_from_u64(18),
    );

    for probe in ManagementProbe::ALL {
        prober.probe_once(NodeId::new(1), probe).await.unwrap();
    }
    let calls = admin.calls();
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|call| call.amqp_port == 5673));
    assert!(calls.iter().all(|call| call.request.is_read_only()));
    assert!(calls
        .iter()
        .any(|call| call.request == AdminRequest::query("io.skupper.router.routerMetrics")));

    let failing = Arc::new(RecordingAdmin::failing());
    let (sender, _) = broadcast::channel(1);
    let prober = ManagementProber::new(
        mesh.layout,
        failing.clone(),
        PauseRange {
            min_ms: 1,
            max_ms: 2,
        },
        StdRng::seed_from_u64(19),
    );
    let task = tokio::spawn(prober.run(sender.subscribe()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    sender.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    let calls = failing.calls();
    assert!(calls.len() > 1);
    assert!(calls.iter().all(|call| call.request.is_read_only()));
}

#[tokio::test]
async fn test_router_bounce_of_b() {
    init_logging();
    let mesh = Mesh::new(3, fake_router(), StopSignal::Kill);
    mesh.write_artifacts(20);
    mesh.start_all().await;

    let a = mesh.supervisor.pid(NodeId::new(0)).await.unwrap();
    let b = mesh.supervisor.pid(NodeId::new(1)).await.unwrap();
    let c = mesh.supervisor.pid(NodeId::new(2)).await.unwrap();

    let mut bouncer = RouterBouncer::new(
        Arc::clone(&mesh.supervisor),
        Arc::clone(&mesh.generator),
        Arc::clone(&mesh.registry),
        NO_PAUSE,
        StdRng::seed_from_u64(21),
    );
    let (_sender, mut exit) = broadcast::channel(1);
    assert!(bouncer.bounce_once(NodeId::new(1), &mut exit).await.unwrap());
    assert_eq!(bouncer.bounces(), 1);

    let restarted = mesh.supervisor.pid(NodeId::new(1)).await.unwrap();
    assert_ne!(restarted, b);
    assert!(mesh.supervisor.is_running(NodeId::new(1)).await);
    assert_eq!(
        mesh.supervisor.state(NodeId::new(1)).await,
        Some(NodeState::Running)
    );

    let artifact =
        std::fs::read_to_string(mesh.generator.artifact_path(NodeId::new(1))).unwrap();
    assert!(artifact.contains("B-connector-to-C"));
    assert!(!artifact.contains("B-connector-to-A"));

    // Neighbours were never touched
    assert_eq!(mesh.supervisor.pid(NodeId::new(0)).await, Some(a));
    assert_eq!(mesh.supervisor.pid(NodeId::new(2)).await, Some(c));
    assert!(mesh.supervisor.is_running(NodeId::new(0)).await);
    assert!(mesh.supervisor.is_running(NodeId::new(2)).await);

    mesh.supervisor.stop_all().await;
}

#[tokio::test]
async fn test_bound_view_follows_router_outage() {
    init_logging();
    let mesh = Mesh::new(3, fake_router(), StopSignal::Kill);
    mesh.write_artifacts(24);
    mesh.start_all().await;

    let b = NodeId::new(1);
    let b_listeners = [5803, 5804, 5805];
    let mut bouncer = RouterBouncer::new(
        Arc::clone(&mesh.supervisor),
        Arc::clone(&mesh.generator),
        Arc::clone(&mesh.registry),
        PauseRange {
            min_ms: 1_000,
            max_ms: 1_000,
        },
        StdRng::seed_from_u64(25),
    );
    let (_sender, mut exit) = broadcast::channel(1);
    let bounce = tokio::spawn(async move {
        let restarted = bouncer.bounce_once(b, &mut exit).await;
        (bouncer, restarted)
    });

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(mesh.supervisor.pid(b).await, None);
    let bound = mesh.registry.bound_ports(EndpointKind::TcpListener);
    assert!(b_listeners.iter().all(|port| !bound.contains(port)));
    assert!(bound.contains(&5800) && bound.contains(&5806));
    assert_eq!(
        mesh.registry.binding("tcp-connector-B-0"),
        Some(Binding::Unbound)
    );

    let (bouncer, restarted) = tokio::time::timeout(Duration::from_secs(10), bounce)
        .await
        .unwrap()
        .unwrap();
    assert!(restarted.unwrap());
    assert_eq!(bouncer.bounces(), 1);

    // Back with the addresses of the artifact it was restarted on
    let bound = mesh.registry.bound_ports(EndpointKind::TcpListener);
    assert!(b_listeners.iter().all(|port| bound.contains(port)));
    let artifact = std::fs::read_to_string(mesh.generator.artifact_path(b)).unwrap();
    let Some(Binding::Bound(address)) = mesh.registry.binding("tcp-listener-B-0") else {
        panic!("tcp-listener-B-0 is not bound after the restart");
    };
    assert!(artifact.contains(&format!(
        "name:  tcp-listener-B-0\n  port: 5803\n  host: 0.0.0.0\n  address: {}\n",
        address
    )));

    mesh.supervisor.stop_all().await;
}

#[tokio::test]
async fn test_router_bouncer_fails_on_crashed_router() {
    init_logging();
    let mesh = Mesh::new(2, fake_router(), StopSignal::Kill);
    mesh.write_artifacts(22);
    mesh.start_all().await;

    let victim = NodeId::new(0);
    let pid = mesh.supervisor.pid(victim).await.unwrap();
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
    // Give the kernel a moment to turn the victim into a zombie
    tokio::time::sleep(Duration::from_millis(200)).await;

    let bouncer = RouterBouncer::new(
        Arc::clone(&mesh.supervisor),
        Arc::clone(&mesh.generator),
        Arc::clone(&mesh.registry),
        PauseRange {
            min_ms: 5_000,
            max_ms: 5_000,
        },
        StdRng::seed_from_u64(23),
    );
    let (_sender, exit) = broadcast::channel(1);
    let err = tokio::time::timeout(Duration::from_secs(5), bouncer.run(exit))
        .await
        .unwrap()
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(matches!(
        err,
        HarnessError::Supervisor(SupervisorError::LivenessViolation { node, .. }) if node == victim
    ));
    assert_eq!(mesh.supervisor.state(victim).await, Some(NodeState::Crashed));
    mesh.supervisor.stop_all().await;
}
