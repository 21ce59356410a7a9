use super::*;

#[test]
fn task_id_round_trips_through_display_and_parse() {
    let id = TaskId::new();
    let parsed = TaskId::parse(&id.to_string());
    assert_eq!(parsed, Some(id));
}

#[test]
fn task_id_parse_rejects_garbage() {
    assert_eq!(TaskId::parse("not-a-uuid"), None);
}

#[test]
fn subtask_id_is_unique_per_call() {
    let a = SubtaskId::new();
    let b = SubtaskId::new();
    assert_ne!(a, b);
}

#[test]
fn queue_name_borrows_as_str_for_map_lookup() {
    use std::collections::HashMap;
    let mut m: HashMap<QueueName, u32> = HashMap::new();
    m.insert(QueueName::from("machine_tasks"), 1);
    assert_eq!(m.get("machine_tasks"), Some(&1));
}
