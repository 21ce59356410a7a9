use super::*;
use serial_test::serial;

fn clear_env() {
    for var in [
        "PORT",
        "CNAGENT_PORT",
        "CNAGENT_BIND_ADDR",
        "CNAGENT_LOG_DIR",
        "CNAGENT_WORKER_BIN",
        "CNAGENT_TERMINATION_GRACE_SECS",
        "SAPI_ADOPTION_RETRY_COUNT",
        "SAPI_ADOPTION_RETRY_INTERVAL",
    ] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    clear_env();
    let config = Config::load(Path::new("/nonexistent/cnagentd.toml")).expect("missing file is not an error");
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.sapi_adoption_retry_count, 10);
}

#[test]
#[serial]
fn file_values_override_defaults() {
    clear_env();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cnagentd.toml");
    std::fs::write(&path, "port = 6000\nworker_bin = \"/opt/custom/worker\"\n").expect("write config");

    let config = Config::load(&path).expect("config should parse");
    assert_eq!(config.port, 6000);
    assert_eq!(config.worker_bin, PathBuf::from("/opt/custom/worker"));
}

#[test]
#[serial]
fn env_var_overrides_file_value() {
    clear_env();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("cnagentd.toml");
    std::fs::write(&path, "port = 6000\n").expect("write config");
    std::env::set_var("PORT", "5310");

    let config = Config::load(&path).expect("config should parse");
    assert_eq!(config.port, 5310);
    clear_env();
}

#[test]
#[serial]
fn invalid_env_var_is_a_typed_error() {
    clear_env();
    std::env::set_var("SAPI_ADOPTION_RETRY_COUNT", "not-a-number");
    let err = Config::load(Path::new("/nonexistent/cnagentd.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnv { name: "SAPI_ADOPTION_RETRY_COUNT", .. }));
    clear_env();
}
