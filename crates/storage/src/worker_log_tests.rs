use super::*;

#[test]
fn path_includes_pid_and_task_kind() {
    let dir = tempfile::tempdir().unwrap();
    let path = worker_log_path(dir.path(), 4242, "machine_create");
    let name = path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.contains("4242"));
    assert!(name.contains("machine_create"));
    assert!(name.ends_with(".log"));
}

#[test]
fn file_log_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let log = WorkerLog::open(dir.path(), 1, "nop").unwrap();
    log.write(1, "nop", LogLevel::Info, "started", None);
    log.write(1, "nop", LogLevel::Info, "finished", Some(serde_json::json!({"result": "ok"})));

    let contents = std::fs::read_to_string(log.path().unwrap()).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["msg"], "started");
    assert_eq!(first["level"], 30);
    let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second["data"]["result"], "ok");
}

#[test]
fn null_log_writes_nothing_and_has_no_path() {
    let log = WorkerLog::disabled();
    log.write(1, "machine_load", LogLevel::Info, "ignored", None);
    assert!(log.path().is_none());
}
