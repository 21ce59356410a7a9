//! End-to-end seed scenarios (spec §8) driven against real `cnagentd`/
//! `cnagent` binaries. Scenarios that require a concrete task body (the
//! `nop` worker actually running to completion) are adapted to assert
//! on the admit/terminal-event behavior this repository does implement;
//! concrete task bodies themselves are out of scope (§1).

use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::process::Child;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use serial_test::serial;
use tempfile::TempDir;

struct Daemon {
    child: Child,
    addr: String,
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

fn wait_until_listening(port: u16, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if std::net::TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("cnagentd did not start listening on port {port} within {timeout:?}");
}

/// Spawns `cnagentd` against a throwaway config pointing at a worker
/// binary that does not exist, so every admitted task fails fast with
/// `SpawnFailed` rather than hanging (no concrete worker ships in this
/// repository).
fn spawn_daemon(dir: &TempDir) -> Daemon {
    let port = free_port();
    let config_path = dir.path().join("cnagentd.toml");
    let log_dir = dir.path().join("logs");
    let mut file = std::fs::File::create(&config_path).expect("create config file");
    writeln!(
        file,
        "port = {port}\nbind_addr = \"127.0.0.1\"\nlog_dir = \"{}\"\nworker_bin = \"{}\"\n",
        log_dir.display(),
        dir.path().join("no-such-worker").display(),
    )
    .expect("write config");

    let mut cmd = Command::cargo_bin("cnagentd").expect("cnagentd binary should build");
    cmd.env("CNAGENT_CONFIG", &config_path);
    let child = cmd.spawn().expect("spawn cnagentd");

    wait_until_listening(port, Duration::from_secs(10));
    Daemon { child, addr: format!("http://127.0.0.1:{port}") }
}

fn cli(daemon: &Daemon) -> Command {
    let mut cmd = Command::cargo_bin("cnagent").expect("cnagent binary should build");
    cmd.arg("--addr").arg(&daemon.addr);
    cmd
}

/// Seed scenario 2: "Pause blocks admit".
#[test]
#[serial]
fn pause_blocks_admit_and_resume_restores_it() {
    let dir = TempDir::new().expect("tempdir");
    let daemon = spawn_daemon(&dir);

    cli(&daemon).arg("pause").assert().success().stdout("paused\n");

    cli(&daemon).args(["admit", "nop"]).assert().failure();

    cli(&daemon).arg("resume").assert().success().stdout("resumed\n");

    cli(&daemon).args(["admit", "nop"]).assert().success();
}

/// Boundary behavior: admitting an unregistered task kind is rejected
/// (404) with no Task Record created.
#[test]
#[serial]
fn admitting_an_unknown_task_kind_fails() {
    let dir = TempDir::new().expect("tempdir");
    let daemon = spawn_daemon(&dir);

    cli(&daemon).args(["admit", "not_a_real_task"]).assert().failure().stderr(predicates_contains("404"));
}

/// Adapted seed scenario 1 ("admit and run"): since no worker binary
/// ships here, the admitted task reaches the other terminal outcome —
/// a synthesized failure — but the single-terminal-event invariant
/// (§8) still holds and is observable through `cnagent tasks`.
#[test]
#[serial]
fn admitted_task_reaches_a_terminal_status() {
    let dir = TempDir::new().expect("tempdir");
    let daemon = spawn_daemon(&dir);

    let output = cli(&daemon).args(["admit", "nop"]).assert().success().get_output().stdout.clone();
    let id = String::from_utf8(output).expect("utf8 stdout").trim().to_string();
    assert!(!id.is_empty());

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut last_tasks = String::new();
    while Instant::now() < deadline {
        let output = cli(&daemon).arg("tasks").assert().success().get_output().stdout.clone();
        last_tasks = String::from_utf8(output).expect("utf8 stdout");
        let tasks: Vec<serde_json::Value> = serde_json::from_str(&last_tasks).expect("tasks json");
        if let Some(task) = tasks.iter().find(|t| t["id"] == id) {
            if task["status"] == "failed" {
                assert_eq!(task["fatal"]["kind"], "SpawnFailed");
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    panic!("task {id} never reached a terminal status; last tasks response: {last_tasks}");
}

#[test]
#[serial]
fn healthz_succeeds_against_a_freshly_started_daemon() {
    let dir = TempDir::new().expect("tempdir");
    let daemon = spawn_daemon(&dir);
    cli(&daemon).arg("healthz").assert().success().stdout("ok\n");
}

fn predicates_contains(needle: &'static str) -> predicates::str::ContainsPredicate {
    predicates::prelude::predicate::str::contains(needle)
}

#[allow(dead_code)]
fn unused(_: &Path) {}
