//! End-to-end coverage of the seed scenarios (spec §8), driven through
//! the dispatcher over a `MockTransport`/`MockLauncher` pair instead of
//! real sockets and child processes, except where a scenario's semantics
//! (requester liveness) genuinely need a real OS pid.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fabric_host::config::{Declaration, HostSettings};
use fabric_host::entry::state::HostedState;
use fabric_host::host::{DrainMode, Host, HostDeps};
use fabric_host::launcher::mock::MockLauncher;
use fabric_host::transport::MockTransport;
use fabric_protocol::types::{HostedServiceParams, ProcessDescription, ResourceLimits};
use fabric_protocol::version::CURRENT_VERSION;
use fabric_protocol::{Notification, Reply, Request};

fn process(executable: &str) -> ProcessDescription {
    ProcessDescription {
        executable: executable.to_string(),
        arguments: vec![],
        working_directory: None,
        environment: HashMap::new(),
        console_ctrl: false,
        runas_id: None,
        resource_limits: None,
        container: None,
    }
}

async fn open_host(
    declaration: Declaration,
    launcher: Arc<MockLauncher>,
) -> (Host<MockTransport>, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let deps = HostDeps::new(Arc::clone(&transport), launcher as Arc<dyn fabric_host::launcher::Launcher>);
    let host = Host::open(declaration, None, deps, Duration::from_secs(5))
        .await
        .expect("host opens");
    (host, transport)
}

async fn poll_until<F, Fut>(mut predicate: F, budget: Duration)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(budget, async {
        loop {
            if predicate().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition did not become true within budget");
}

/// Seed scenario 1: activate an app service, kill its process out from
/// under it, and expect the requester to be notified of the termination.
#[tokio::test]
async fn activated_process_death_notifies_its_requester() {
    let launcher = Arc::new(MockLauncher::new());
    let (host, transport) = open_host(Declaration::default(), Arc::clone(&launcher)).await;

    let register = Request::Register {
        version: CURRENT_VERSION,
        requester_id: "requesterA".into(),
        process_id: std::process::id() as i32,
        node_id: "node0".into(),
        callback_address: "n/a".into(),
    };
    assert_eq!(transport.submit(register).await, Reply::Register { error: None });

    let activate = Request::ActivateProcess {
        version: CURRENT_VERSION,
        requester_id: "requesterA".into(),
        app_service_id: "svcA".into(),
        process: process("/bin/svcA"),
    };
    let reply = transport.submit(activate).await;
    let pid = match reply {
        Reply::ActivateProcess { error: None, process_id: Some(pid) } => pid,
        other => panic!("unexpected reply: {:?}", other),
    };

    let handle = launcher.handle_for(pid).await.expect("mock handle exists");
    handle.exit(42).await;

    poll_until(
        || async { !transport.notifications_for("requesterA").await.is_empty() },
        Duration::from_secs(2),
    )
    .await;

    let notifications = transport.notifications_for("requesterA").await;
    assert_eq!(
        notifications,
        vec![Notification::ApplicationServiceTerminated {
            parent_id: "requesterA".into(),
            app_service_id: "svcA".into(),
            exit_code: 42,
        }]
    );

    host.close(DrainMode::Skip, Duration::from_secs(1)).await;
}

/// Seed scenario 2: a hosted service that keeps exiting non-zero is
/// restarted with the 2s/4s/6s backoff ladder, then disabled once it
/// exceeds the failure budget.
#[tokio::test(start_paused = true)]
async fn hosted_service_backoff_then_disable() {
    let launcher = Arc::new(MockLauncher::new());
    let declaration = Declaration {
        host: HostSettings {
            activation_retry_backoff_interval_secs: 2,
            activation_max_retry_interval_secs: 6,
            activation_max_failure_count: 3,
            hosted_service_continuous_exit_failure_reset_interval_secs: 3600,
            ..Default::default()
        },
        services: vec![HostedServiceParams {
            service_name: "flaky".into(),
            process: process("/bin/flaky"),
            endpoint: None,
        }],
    };
    let (host, _transport) = open_host(declaration, Arc::clone(&launcher)).await;
    let registry = Arc::clone(host.registry());

    for attempt in 1..=4 {
        poll_until(
            || async { registry.get_hosted("flaky").await.unwrap().state().await == HostedState::Initialized },
            Duration::from_secs(30),
        )
        .await;

        let entry = registry.get_hosted("flaky").await.unwrap();
        let pid = entry.get_process_id().await.expect("running");
        let handle = launcher.handle_for(pid).await.expect("mock handle exists");
        handle.exit(1).await;

        if attempt < 4 {
            poll_until(
                || async {
                    let entry = registry.get_hosted("flaky").await.unwrap();
                    !entry.is_disabled() && entry.state().await != HostedState::Initialized
                },
                Duration::from_secs(30),
            )
            .await;
        }
    }

    poll_until(
        || async { registry.get_hosted("flaky").await.unwrap().is_disabled() },
        Duration::from_secs(30),
    )
    .await;

    host.close(DrainMode::Skip, Duration::from_secs(1)).await;
}

/// Seed scenario 3: a requester process dies; every app service it owned
/// is torn down and removed without an explicit `Unregister`.
#[tokio::test]
async fn requester_death_tears_down_its_app_services() {
    let launcher = Arc::new(MockLauncher::new());
    let (host, transport) = open_host(Declaration::default(), Arc::clone(&launcher)).await;
    let registry = Arc::clone(host.registry());

    let mut requester_proc = std::process::Command::new("true")
        .spawn()
        .expect("spawn a short-lived process to act as the requester");
    let requester_pid = requester_proc.id() as i32;
    requester_proc.wait().expect("reap it immediately so it is truly gone");

    let register = Request::Register {
        version: CURRENT_VERSION,
        requester_id: "requesterB".into(),
        process_id: requester_pid,
        node_id: "node0".into(),
        callback_address: "n/a".into(),
    };
    assert_eq!(transport.submit(register).await, Reply::Register { error: None });

    let activate = Request::ActivateProcess {
        version: CURRENT_VERSION,
        requester_id: "requesterB".into(),
        app_service_id: "svcB".into(),
        process: process("/bin/svcB"),
    };
    assert!(matches!(
        transport.submit(activate).await,
        Reply::ActivateProcess { error: None, .. }
    ));
    assert_eq!(registry.total_app_count().await, 1);

    poll_until(|| async { registry.total_app_count().await == 0 }, Duration::from_secs(3)).await;

    host.close(DrainMode::Skip, Duration::from_secs(1)).await;
}

/// Seed scenario 4: an in-place resource-limit update does not restart
/// the process (activation count is unchanged).
#[tokio::test]
async fn in_place_resource_limit_update_does_not_restart() {
    let launcher = Arc::new(MockLauncher::new());
    let declaration = Declaration {
        services: vec![HostedServiceParams {
            service_name: "steady".into(),
            process: process("/bin/steady"),
            endpoint: None,
        }],
        ..Default::default()
    };
    let (host, _transport) = open_host(declaration, Arc::clone(&launcher)).await;
    let registry = Arc::clone(host.registry());

    poll_until(
        || async { registry.get_hosted("steady").await.unwrap().state().await == HostedState::Initialized },
        Duration::from_secs(2),
    )
    .await;

    let entry = registry.get_hosted("steady").await.unwrap();
    let activation_count_before = entry.stats.lock().unwrap().activation_count;

    let mut updated = process("/bin/steady");
    updated.resource_limits = Some(ResourceLimits { cpu_shares: Some(256), cpuset: None, memory_bytes: Some(1 << 20) });
    host.hosted()
        .update(HostedServiceParams { service_name: "steady".into(), process: updated, endpoint: None })
        .await
        .expect("in-place update succeeds");

    let activation_count_after = entry.stats.lock().unwrap().activation_count;
    assert_eq!(activation_count_before, activation_count_after);
    assert_eq!(entry.state().await, HostedState::Initialized);

    host.close(DrainMode::Skip, Duration::from_secs(1)).await;
}

/// Seed scenario 5: a deactivate against a process that ignores the
/// friendly signal times out, and escalates to a force-kill that lands
/// the entry in `Stopped`.
#[tokio::test]
async fn deactivate_timeout_escalates_to_force_kill() {
    let launcher = Arc::new(MockLauncher::new());
    launcher.ignore_graceful_term_for.lock().await.push("/bin/stubborn".to_string());
    let (host, transport) = open_host(Declaration::default(), Arc::clone(&launcher)).await;

    let register = Request::Register {
        version: CURRENT_VERSION,
        requester_id: "requesterC".into(),
        process_id: std::process::id() as i32,
        node_id: "node0".into(),
        callback_address: "n/a".into(),
    };
    transport.submit(register).await;

    let activate = Request::ActivateProcess {
        version: CURRENT_VERSION,
        requester_id: "requesterC".into(),
        app_service_id: "svcC".into(),
        process: process("/bin/stubborn"),
    };
    assert!(matches!(
        transport.submit(activate).await,
        Reply::ActivateProcess { error: None, .. }
    ));

    let result = host
        .app()
        .deactivate_process("requesterC", "svcC", true, Duration::from_millis(200))
        .await;
    assert_eq!(result.unwrap_err().kind(), fabric_core::ErrorKind::Timeout);

    let entry = host.registry().get_app("requesterC", "svcC").await.expect("entry still tracked");
    assert_eq!(entry.state().await, fabric_host::entry::state::AppState::Stopped);

    host.close(DrainMode::Skip, Duration::from_secs(1)).await;
}

/// Seed scenario 6: a request carrying an unsupported protocol version is
/// rejected with `ProtocolMismatch` and never reaches a supervisor.
#[tokio::test]
async fn unsupported_protocol_version_is_rejected() {
    let launcher = Arc::new(MockLauncher::new());
    let (host, transport) = open_host(Declaration::default(), Arc::clone(&launcher)).await;

    let activate = Request::ActivateProcess {
        version: CURRENT_VERSION + 1,
        requester_id: "requesterD".into(),
        app_service_id: "svcD".into(),
        process: process("/bin/svcD"),
    };
    let reply = transport.submit(activate).await;
    assert_eq!(
        reply,
        Reply::ActivateProcess {
            error: Some(fabric_protocol::types::WireErrorKind::ProtocolMismatch),
            process_id: None,
        }
    );
    assert_eq!(host.registry().total_app_count().await, 0);

    host.close(DrainMode::Skip, Duration::from_secs(1)).await;
}
