mod support;

use std::sync::Arc;
use std::time::Duration;

use steel_rain::admin::AdminRequest;
use steel_rain::supervisor::NodeState;
use steel_rain::topology::EndpointKind;
use steel_rain::{BootstrapSchedule, Harness, HarnessError, NodeId, SupervisorError};

use support::{crashing_router, fake_router, fast_config, init_logging, RecordingAdmin};

fn fast_schedule() -> BootstrapSchedule {
    BootstrapSchedule {
        startup_grace: Duration::from_millis(200),
        server_warmup: Duration::from_millis(10),
        bounce_warmup: Duration::from_millis(10),
        injector_stagger: Duration::from_millis(10),
        traffic_stagger: Duration::from_millis(10),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_and_orderly_shutdown() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path(), 3, fake_router());
    let admin = Arc::new(RecordingAdmin::new());

    let harness = Harness::with_admin(config, admin.clone())
        .unwrap()
        .with_schedule(fast_schedule());
    assert_eq!(harness.seed(), 0x5eed);
    let supervisor = Arc::clone(harness.supervisor());
    let generator = Arc::clone(harness.generator());
    let exit = harness.exit_sender();

    let run = tokio::spawn(harness.run());
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!run.is_finished());

    exit.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(30), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // Every router was stopped and reaped on the way out
    for node in NodeId::all(3) {
        assert_eq!(supervisor.state(node).await, Some(NodeState::Stopped));
        assert!(!supervisor.is_running(node).await);
    }

    let artifact = std::fs::read_to_string(generator.artifact_path(NodeId::new(1))).unwrap();
    assert!(artifact.contains("B-connector-to-C"));

    let calls = admin.calls();
    let deleted = |kind: EndpointKind| {
        calls.iter().any(|call| {
            matches!(&call.request, AdminRequest::Delete { kind: k, .. } if *k == kind)
        })
    };
    assert!(deleted(EndpointKind::TcpListener));
    assert!(deleted(EndpointKind::TcpConnector));
    assert!(calls.iter().any(|call| call.request.is_read_only()));
    assert!(calls
        .iter()
        .all(|call| (5672..5675).contains(&call.amqp_port)));
}

#[tokio::test]
async fn test_crashed_router_fails_the_run() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path(), 2, crashing_router());
    let admin = Arc::new(RecordingAdmin::new());

    let harness = Harness::with_admin(config, admin.clone())
        .unwrap()
        .with_schedule(fast_schedule());
    let supervisor = Arc::clone(harness.supervisor());

    let err = tokio::time::timeout(Duration::from_secs(30), harness.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        HarnessError::Supervisor(SupervisorError::LivenessViolation { .. })
    ));

    // No injector got to run
    assert!(admin.calls().is_empty());
    for node in NodeId::all(2) {
        assert!(!supervisor.is_running(node).await);
    }
}

#[tokio::test]
async fn test_missing_router_binary_fails_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let config = fast_config(dir.path(), 2, "/nonexistent/skrouterd".into());

    let harness = Harness::with_admin(config, Arc::new(RecordingAdmin::new()))
        .unwrap()
        .with_schedule(fast_schedule());
    let err = harness.run().await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Supervisor(SupervisorError::Launch { .. })
    ));
}
