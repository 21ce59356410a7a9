// SPDX-License-Identifier: MIT

//! Daemon configuration (`[AMBIENT]`): a `cnagentd.toml` file, overridable
//! by environment variables, following the teacher's `toml` + `serde`
//! config convention.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Default admin-IP HTTP port (§6).
pub const DEFAULT_PORT: u16 = 5309;
/// Self-update variant port (§6).
pub const SELF_UPDATE_PORT: u16 = 5310;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid environment variable {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    port: Option<u16>,
    bind_addr: Option<String>,
    log_dir: Option<PathBuf>,
    worker_bin: Option<PathBuf>,
    termination_grace_secs: Option<u64>,
    sapi_adoption_retry_count: Option<u32>,
    sapi_adoption_retry_interval_secs: Option<u64>,
}

/// Fully resolved daemon configuration (file, then environment overrides,
/// then defaults).
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: String,
    pub log_dir: PathBuf,
    pub worker_bin: PathBuf,
    pub termination_grace: Duration,
    /// Open question preserved per §9: the reference policy is exactly 10
    /// retries at 5s, exposed here as configuration rather than invented.
    pub sapi_adoption_retry_count: u32,
    pub sapi_adoption_retry_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_addr: "0.0.0.0".to_string(),
            log_dir: default_log_dir(),
            worker_bin: PathBuf::from("/opt/cnagent/bin/cnagent-worker"),
            termination_grace: Duration::from_secs(30),
            sapi_adoption_retry_count: 10,
            sapi_adoption_retry_interval: Duration::from_secs(5),
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::state_dir().unwrap_or_else(std::env::temp_dir).join("cnagent").join("logs")
}

impl Config {
    /// Loads `path` if it exists (a missing file is not an error — the
    /// defaults apply), then applies `CNAGENT_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
            let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
            config.apply_file(file);
        }
        config.apply_env()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(addr) = file.bind_addr {
            self.bind_addr = addr;
        }
        if let Some(dir) = file.log_dir {
            self.log_dir = dir;
        }
        if let Some(bin) = file.worker_bin {
            self.worker_bin = bin;
        }
        if let Some(secs) = file.termination_grace_secs {
            self.termination_grace = Duration::from_secs(secs);
        }
        if let Some(count) = file.sapi_adoption_retry_count {
            self.sapi_adoption_retry_count = count;
        }
        if let Some(secs) = file.sapi_adoption_retry_interval_secs {
            self.sapi_adoption_retry_interval = Duration::from_secs(secs);
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = parse_env("PORT")? {
            self.port = value;
        } else if let Some(value) = parse_env("CNAGENT_PORT")? {
            self.port = value;
        }
        if let Ok(addr) = std::env::var("CNAGENT_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(dir) = std::env::var("CNAGENT_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Ok(bin) = std::env::var("CNAGENT_WORKER_BIN") {
            self.worker_bin = PathBuf::from(bin);
        }
        if let Some(secs) = parse_env::<u64>("CNAGENT_TERMINATION_GRACE_SECS")? {
            self.termination_grace = Duration::from_secs(secs);
        }
        if let Some(count) = parse_env::<u32>("SAPI_ADOPTION_RETRY_COUNT")? {
            self.sapi_adoption_retry_count = count;
        }
        if let Some(secs) = parse_env::<u64>("SAPI_ADOPTION_RETRY_INTERVAL")? {
            self.sapi_adoption_retry_interval = Duration::from_secs(secs);
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.parse().map(Some).map_err(|_| ConfigError::InvalidEnv { name, value }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
