use super::*;
use serde_json::json;

fn req() -> SubtaskRequest {
    SubtaskRequest { caller_task_id: TaskId::new(), target_kind: "image_ensure_present".to_string(), payload: json!({}) }
}

#[test]
fn register_then_take_round_trips_the_continuation() {
    let mut table: SubtaskTable<&'static str> = SubtaskTable::new();
    let id = SubtaskId::new();
    table.register(id.clone(), req(), "reply-channel").unwrap();
    assert!(table.is_pending(&id));

    let (_, cont) = table.take(&id).expect("registered");
    assert_eq!(cont, "reply-channel");
    assert!(!table.is_pending(&id));
}

#[test]
fn duplicate_registration_is_rejected() {
    let mut table: SubtaskTable<u32> = SubtaskTable::new();
    let id = SubtaskId::new();
    table.register(id.clone(), req(), 1).unwrap();
    assert_eq!(table.register(id, req(), 2), Err(DuplicateSubtask));
}

#[test]
fn discard_drops_without_panicking_on_missing_id() {
    let mut table: SubtaskTable<u32> = SubtaskTable::new();
    table.discard(&SubtaskId::new());
    assert!(table.is_empty());
}

#[test]
fn take_on_unknown_id_returns_none() {
    let mut table: SubtaskTable<u32> = SubtaskTable::new();
    assert!(table.take(&SubtaskId::new()).is_none());
}
