use super::*;
use cnagent_core::{FakeClock, PauseFlag, QueueSet};
use serde_json::json;

fn test_supervisor(worker_bin: &str) -> Arc<Supervisor<FakeClock>> {
    Supervisor::new(
        QueueSet::reference(),
        Arc::new(PauseFlag::new()),
        FakeClock::new(),
        SupervisorConfig {
            worker_bin: PathBuf::from(worker_bin),
            log_dir: std::env::temp_dir(),
            tasks_path: "/tasks".to_string(),
            termination_grace: Duration::from_millis(50),
        },
    )
}

#[tokio::test]
async fn admit_rejects_unknown_kind() {
    let supervisor = test_supervisor("/nonexistent/cnagent-worker");
    let err = supervisor.admit("not_a_real_kind", json!({}), "test", None).unwrap_err();
    assert!(matches!(err, AdmitError::UnknownTask(_)));
}

#[tokio::test]
async fn admit_rejects_while_paused() {
    let supervisor = test_supervisor("/nonexistent/cnagent-worker");
    supervisor.pause();
    let err = supervisor.admit("nop", json!({}), "test", None).unwrap_err();
    assert!(matches!(err, AdmitError::Paused));
    supervisor.resume();
    assert!(supervisor.admit("nop", json!({}), "test", None).is_ok());
}

#[tokio::test]
async fn admitted_task_appears_in_snapshot_before_the_worker_spawns() {
    let supervisor = test_supervisor("/nonexistent/cnagent-worker");
    let id = supervisor.admit("nop", json!({"n": 1}), "test", None).expect("admission should succeed");
    let summary = supervisor.get(id).expect("freshly admitted task should be retrievable");
    assert_eq!(summary["id"], json!(id.to_string()));
    assert_eq!(summary["kind"], json!("nop"));
}

#[tokio::test]
async fn missing_worker_binary_fails_the_task_as_spawn_failed() {
    let supervisor = test_supervisor("/nonexistent/cnagent-worker-binary");
    let id = supervisor.admit("nop", json!({}), "test", None).expect("admission should succeed");

    let mut summary = supervisor.get(id).expect("task should exist");
    for _ in 0..200 {
        if summary["status"] == json!("failed") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        summary = supervisor.get(id).expect("task should still exist");
    }

    assert_eq!(summary["status"], json!("failed"));
    assert_eq!(summary["fatal"]["kind"], json!("SpawnFailed"));
}

#[tokio::test]
async fn terminate_all_is_a_no_op_with_no_live_workers() {
    let supervisor = test_supervisor("/nonexistent/cnagent-worker");
    supervisor.terminate_all().await;
}
