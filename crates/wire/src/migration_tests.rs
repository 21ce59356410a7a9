use super::*;
use serde_json::json;

#[test]
fn command_kebab_case_matches_spec_literals() {
    assert_eq!(MigrationCommand::GetZfsResumeToken.as_str(), "get-zfs-resume-token");
    assert_eq!(MigrationCommand::SetRecord.as_str(), "set-record");
    let value = serde_json::to_value(MigrationCommand::ZfsDestroy).unwrap();
    assert_eq!(value, json!("zfs-destroy"));
}

#[test]
fn request_round_trips_with_args() {
    let req = MigrationRequest::new(MigrationCommand::Sync, "evt-1")
        .with_arg("host", json!("10.0.0.5"))
        .with_arg("port", json!(4500));
    let value = serde_json::to_value(&req).unwrap();
    assert_eq!(value["type"], "request");
    assert_eq!(value["command"], "sync");
    assert_eq!(value["event_id"], "evt-1");
    assert_eq!(value["host"], "10.0.0.5");
    assert_eq!(value["port"], 4500);
}

#[test]
fn frame_decodes_request_by_type_tag() {
    let frame: MigrationFrame = serde_json::from_value(json!({
        "type": "request",
        "command": "ping",
        "event_id": "evt-2",
    }))
    .unwrap();
    match frame {
        MigrationFrame::Request { command, event_id, .. } => {
            assert_eq!(command, MigrationCommand::Ping);
            assert_eq!(event_id, "evt-2");
        }
        other => panic!("unexpected frame: {other:?}"),
    }
}

#[test]
fn frame_decodes_progress_event() {
    let frame: MigrationFrame = serde_json::from_value(json!({
        "type": "progress",
        "current_progress": 10,
        "total_progress": 100,
        "transfer_bytes_second": 1024.0,
        "eta_ms": 5000,
        "phase": "sync",
        "state": "running",
        "store": false,
    }))
    .unwrap();
    assert!(matches!(frame, MigrationFrame::Progress { current_progress: 10, .. }));
}

#[test]
fn frame_decodes_sync_success_with_no_body() {
    let frame: MigrationFrame = serde_json::from_value(json!({"type": "sync-success"})).unwrap();
    assert!(matches!(frame, MigrationFrame::SyncSuccess));
}

#[test]
fn error_not_implemented_has_fixed_message() {
    let err = MigrationError::not_implemented("evt-3");
    assert_eq!(err.message, "Not Implemented");
    assert_eq!(err.event_id.as_deref(), Some("evt-3"));
}

#[test]
fn response_with_result_serializes_flattened() {
    let resp = MigrationResponse::new(MigrationCommand::GetZfsSnapshotNames, "evt-4")
        .with_result("names", json!(["snap-a", "snap-b"]));
    let value = serde_json::to_value(&resp).unwrap();
    assert_eq!(value["type"], "response");
    assert_eq!(value["names"], json!(["snap-a", "snap-b"]));
}
