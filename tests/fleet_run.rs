// End-to-end coordinator runs. No live SSH server is required: unreachable
// loopback ports exercise the whole connect → ledger → summary path, and the
// capture sink makes the emitted line protocol assertable.

use fleetpull::{
    run_fleet, CoordinatorError, EventSink, FleetConfig, HostOutcome, NodeSpec, RunContext,
    RunMode, WorkerParams,
};
use std::time::{Duration, Instant};

fn refused_node(host: &str) -> NodeSpec {
    NodeSpec {
        host: host.to_string(),
        port: 1, // nothing listens on loopback port 1
        username: "reip".into(),
        password: Some("reip".into()),
        label: None,
    }
}

fn test_config(nodes: Vec<NodeSpec>, local_dir: &std::path::Path) -> FleetConfig {
    FleetConfig {
        nodes,
        remote_data_root: "/media/reip/ssd/data".into(),
        local_data_dir: local_dir.display().to_string(),
        command: None,
        timeout_secs: 5,
    }
}

fn fast_params() -> WorkerParams {
    WorkerParams {
        connect_timeout: Duration::from_secs(2),
        session_timeout: Duration::from_secs(5),
        ..WorkerParams::default()
    }
}

#[tokio::test]
async fn unreachable_host_resolves_to_error_with_tcp_reason() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(vec![refused_node("127.0.0.1")], dir.path());
    let (sink, captured) = EventSink::capture();
    let ctx = RunContext::new(fast_params(), sink);

    let summary = run_fleet(&config, RunMode::Pull, &ctx).await.unwrap();

    match &summary.outcomes["127.0.0.1"] {
        HostOutcome::Error { error } => assert!(error.contains("tcp"), "got: {}", error),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let lines = captured.lines();
    assert!(lines.iter().all(|l| !l.starts_with("PROGRESS")));
    assert!(lines.iter().any(|l| l == "COMPLETE 127.0.0.1 ERROR"));

    let summaries: Vec<_> = lines.iter().filter(|l| l.starts_with("SUMMARY ")).collect();
    assert_eq!(summaries.len(), 1, "exactly one SUMMARY line");
    let report: serde_json::Value =
        serde_json::from_str(summaries[0].strip_prefix("SUMMARY ").unwrap()).unwrap();
    assert_eq!(report["127.0.0.1"]["status"], "error");
    assert!(report["127.0.0.1"]["error"]
        .as_str()
        .unwrap()
        .contains("tcp"));
}

#[tokio::test]
async fn every_host_gets_a_definite_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let hosts = ["127.0.0.1", "127.0.0.2", "127.0.0.3"];
    let config = test_config(hosts.iter().map(|h| refused_node(h)).collect(), dir.path());
    let (sink, _captured) = EventSink::capture();
    let ctx = RunContext::new(fast_params(), sink);

    let summary = run_fleet(&config, RunMode::Pull, &ctx).await.unwrap();

    assert_eq!(summary.outcomes.len(), hosts.len());
    for host in hosts {
        assert!(
            !summary.outcomes[host].is_pending(),
            "{} left unresolved",
            host
        );
    }
}

#[tokio::test]
async fn empty_host_list_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(Vec::new(), dir.path());
    let (sink, captured) = EventSink::capture();
    let ctx = RunContext::new(fast_params(), sink);

    let err = run_fleet(&config, RunMode::Pull, &ctx).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NoNodes));
    assert!(captured.lines().is_empty(), "no events before workers start");
}

#[tokio::test]
async fn preset_shutdown_stops_every_worker_without_connecting() {
    let dir = tempfile::tempdir().unwrap();
    // Unroutable TEST-NET addresses: a real connect attempt would block for
    // the full connect timeout, so a quick run proves none was made.
    let hosts = ["192.0.2.1", "192.0.2.2"];
    let config = test_config(hosts.iter().map(|h| refused_node(h)).collect(), dir.path());
    let (sink, _captured) = EventSink::capture();
    let ctx = RunContext::new(fast_params(), sink);
    ctx.shutdown.trigger();

    let started = Instant::now();
    let summary = run_fleet(&config, RunMode::Pull, &ctx).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    for host in hosts {
        assert_eq!(summary.outcomes[host], HostOutcome::Stopped);
    }
}

#[tokio::test]
async fn exec_mode_also_ends_in_a_single_summary() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(vec![refused_node("127.0.0.1")], dir.path());
    let (sink, captured) = EventSink::capture();
    let ctx = RunContext::new(fast_params(), sink);

    let summary = run_fleet(
        &config,
        RunMode::Exec {
            command: "echo hi".into(),
        },
        &ctx,
    )
    .await
    .unwrap();

    assert!(matches!(
        summary.outcomes["127.0.0.1"],
        HostOutcome::Error { .. }
    ));
    let summaries = captured
        .lines()
        .into_iter()
        .filter(|l| l.starts_with("SUMMARY "))
        .count();
    assert_eq!(summaries, 1);
}

#[tokio::test]
async fn pull_run_creates_the_date_keyed_local_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(vec![refused_node("127.0.0.1")], dir.path());
    let (sink, _captured) = EventSink::capture();
    let ctx = RunContext::new(fast_params(), sink);

    run_fleet(&config, RunMode::Pull, &ctx).await.unwrap();

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1, "one date-keyed run directory");
}
