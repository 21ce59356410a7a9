use super::*;
use serde_json::json;

fn env(json_value: serde_json::Value) -> RawEnvelope {
    serde_json::from_value(json_value).unwrap()
}

#[test]
fn parses_ready() {
    let e = ChildEvent::from_envelope(env(json!({"type": "ready"}))).unwrap();
    assert_eq!(e, ChildEvent::Ready);
}

#[test]
fn parses_progress_and_clamps_over_100() {
    let e = ChildEvent::from_envelope(env(json!({"type": "event:progress", "value": 150}))).unwrap();
    assert_eq!(e, ChildEvent::Progress { value: 100 });
}

#[test]
fn parses_arbitrary_named_event() {
    let e = ChildEvent::from_envelope(env(json!({"type": "event:zone_booting", "state": "booting"}))).unwrap();
    match e {
        ChildEvent::Named { name, payload } => {
            assert_eq!(name, "zone_booting");
            assert_eq!(payload["state"], "booting");
        }
        other => panic!("unexpected variant: {other:?}"),
    }
}

#[test]
fn parses_subtask_call() {
    let e = ChildEvent::from_envelope(env(json!({
        "type": "subtask",
        "resource": "vm",
        "task": "image_ensure_present",
        "msg": {"uuid": "abc"},
        "id": "deadbeef",
    })))
    .unwrap();
    assert_eq!(
        e,
        ChildEvent::Subtask {
            resource: "vm".to_string(),
            task: "image_ensure_present".to_string(),
            msg: json!({"uuid": "abc"}),
            id: "deadbeef".to_string(),
        }
    );
}

#[test]
fn parses_exception() {
    let e = ChildEvent::from_envelope(env(json!({"type": "exception", "message": "boom", "stack": "at x"}))).unwrap();
    assert_eq!(e, ChildEvent::Exception { message: "boom".to_string(), stack: Some("at x".to_string()) });
}

#[test]
fn rejects_unrecognized_type() {
    let err = ChildEvent::from_envelope(env(json!({"type": "bogus"}))).unwrap_err();
    assert!(matches!(err, WorkerMessageError::UnrecognizedType(_)));
}

#[test]
fn missing_required_field_is_an_error() {
    let err = ChildEvent::from_envelope(env(json!({"type": "event:progress"}))).unwrap_err();
    assert!(matches!(err, WorkerMessageError::MissingField("value", _)));
}

#[test]
fn parent_start_message_serializes_with_action_tag() {
    let msg = ParentMessage::Start { req: json!({"params": {}}), taskspath: "/opt/tasks".to_string() };
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(value["action"], "start");
    assert_eq!(value["taskspath"], "/opt/tasks");
}
