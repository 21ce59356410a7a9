use super::*;

#[test]
fn reference_table_assigns_machine_tasks_queue_to_mutating_kinds() {
    let reg = TaskRegistry::reference();
    for kind in ["machine_boot", "machine_destroy", "machine_kill", "machine_reboot", "machine_shutdown", "machine_update"] {
        let info = reg.lookup(kind).unwrap();
        assert_eq!(info.queue.as_str(), "machine_tasks");
        assert!(info.logging);
    }
}

#[test]
fn reference_table_puts_machine_load_on_unlogged_query_queue() {
    let reg = TaskRegistry::reference();
    let info = reg.lookup("machine_load").unwrap();
    assert_eq!(info.queue.as_str(), "machine_query");
    assert!(!info.logging);
}

#[test]
fn unknown_kind_is_an_error() {
    let reg = TaskRegistry::reference();
    assert!(reg.lookup("totally_bogus").is_err());
    assert!(!reg.contains("totally_bogus"));
}
