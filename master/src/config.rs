//! Master configuration file (spec.md §6: JSON, `-c <path>`).
//!
//! Grounded on `examples/original_source/master/main.go`'s `Config` struct
//! and `group.go`/`daemon.go`'s slave/group shapes, widened to the keys
//! spec.md §6 names (`interval`, `groups[]`, `database{}`, optional `slack`)
//! that this particular Go revision had not yet grown.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Shared password for the (out-of-scope) admin/login surface; parsed
    /// and retained because it is part of the on-disk config, not dialed
    /// out to by this crate.
    pub password: String,
    /// Reconciliation tick interval, in seconds. Defaults to 10 (spec.md §4.6).
    #[serde(default = "default_interval")]
    pub interval: u64,
    pub slaves: HashMap<String, SlaveConfig>,
    pub groups: Vec<GroupConfig>,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub slack: Option<SlackConfig>,
}

fn default_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlaveConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub token: String,
    #[serde(rename = "portMin")]
    pub port_min: u16,
    #[serde(rename = "portMax")]
    pub port_max: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub name: String,
    pub slaves: Vec<String>,
    pub limit: GroupLimit,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GroupLimit {
    /// Quota, in MiB. Stored traffic quota is this value times 2^20.
    pub flow: i64,
    /// Lifetime, in hours, counted from account creation.
    pub time: i64,
}

/// The default group id every config must define (spec.md §3, §6).
pub const DEFAULT_GROUP_ID: &str = "default";

#[derive(Debug, Deserialize)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(rename = "fromAddr")]
    pub from_addr: String,
    #[serde(rename = "fromAlias")]
    pub from_alias: String,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub dialect: String,
    pub args: String,
}

/// Out-of-scope per spec.md §1; parsed so the config round-trips, never
/// connected to.
#[derive(Debug, Deserialize)]
pub struct SlackConfig {
    pub webhook: String,
    #[serde(default)]
    pub channel: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("group '{DEFAULT_GROUP_ID}' is required but was not found in config")]
    MissingDefaultGroup,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        if !config.groups.iter().any(|g| g.id == DEFAULT_GROUP_ID) {
            return Err(ConfigError::MissingDefaultGroup);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"{
            "host": "0.0.0.0",
            "port": 8080,
            "password": "admin",
            "interval": 10,
            "slaves": {
                "w1": {"name": "worker-1", "host": "10.0.0.1", "port": 6001, "token": "tok", "portMin": 20000, "portMax": 20100}
            },
            "groups": [
                {"id": "default", "name": "Default", "slaves": ["w1"], "limit": {"flow": 1024, "time": 720}}
            ],
            "database": {"dialect": "postgres", "args": "postgres://localhost/ssmgr"}
        }"#
    }

    #[test]
    fn parses_minimal_config() {
        let config: Config = serde_json::from_str(sample()).unwrap();
        assert_eq!(config.interval, 10);
        assert_eq!(config.slaves["w1"].port_min, 20000);
        assert_eq!(config.groups[0].id, DEFAULT_GROUP_ID);
        assert!(config.slack.is_none());
    }

    #[test]
    fn defaults_interval_when_absent() {
        let json = sample().replace(r#""interval": 10,"#, "");
        let config: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config.interval, 10);
    }

    #[test]
    fn load_rejects_config_missing_default_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let json = sample().replace("\"default\"", "\"other\"");
        std::fs::write(&path, json).unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDefaultGroup));
    }
}
