//! Process supervisor lifecycle tests, using /bin/sh fixtures.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use rds_mcp_broker::error::BrokerError;
use rds_mcp_broker::supervisor::ProcessSupervisor;

fn sh(script: &str) -> ProcessSupervisor {
    ProcessSupervisor::new("/bin/sh", vec!["-c".to_string(), script.to_string()])
}

#[tokio::test]
async fn becomes_ready_when_marker_appears() {
    let supervisor = sh("echo 'Server is running'; sleep 30");

    supervisor.ensure_running().await.unwrap();
    assert!(supervisor.is_ready().await);

    // Second call is a fast-path no-op against the live child.
    supervisor.ensure_running().await.unwrap();

    supervisor.close().await;
    assert!(!supervisor.is_ready().await);
}

#[tokio::test]
async fn fails_when_marker_never_appears() {
    let supervisor =
        sh("echo 'still warming up'; sleep 30").with_ready_budget(2, Duration::from_millis(100));

    let err = supervisor.ensure_running().await.unwrap_err();
    assert!(matches!(err, BrokerError::SupervisorStart { .. }));
    assert!(!supervisor.is_ready().await);

    // Cleanup reaps the still-running child.
    supervisor.close().await;
}

#[tokio::test]
async fn fails_when_process_exits_before_marker() {
    let supervisor = sh("echo 'goodbye'").with_ready_budget(5, Duration::from_millis(200));

    let err = supervisor.ensure_running().await.unwrap_err();
    assert!(matches!(err, BrokerError::SupervisorStart { .. }));
    assert!(err.to_string().contains("failed to start"));

    supervisor.close().await;
}

#[tokio::test]
async fn spawn_failure_is_a_supervisor_error() {
    let supervisor = ProcessSupervisor::new("/nonexistent/binary/path", vec![]);
    let err = supervisor.ensure_running().await.unwrap_err();
    assert!(matches!(err, BrokerError::SupervisorStart { .. }));
}

#[tokio::test]
async fn concurrent_callers_spawn_one_process() {
    // The marker file counts spawns; every sh invocation appends a line.
    let dir = std::env::temp_dir().join(format!("supervisor-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let counter = dir.join("spawns");
    let _ = std::fs::remove_file(&counter);

    let script = format!(
        "echo x >> {}; echo 'Server is running'; sleep 30",
        counter.display()
    );
    let supervisor = Arc::new(sh(&script));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let s = Arc::clone(&supervisor);
        handles.push(tokio::spawn(async move { s.ensure_running().await }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let spawns = std::fs::read_to_string(&counter).unwrap();
    assert_eq!(spawns.lines().count(), 1);

    supervisor.close().await;
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn close_is_safe_on_absent_state() {
    let supervisor = sh("echo 'Server is running'; sleep 30");
    // Never started; close is a no-op.
    supervisor.close().await;
    supervisor.close().await;
    assert!(!supervisor.is_ready().await);
}

#[tokio::test]
async fn restart_after_close() {
    let supervisor = sh("echo 'Server is running'; sleep 30");
    supervisor.ensure_running().await.unwrap();
    supervisor.close().await;

    supervisor.ensure_running().await.unwrap();
    assert!(supervisor.is_ready().await);
    supervisor.close().await;
}
