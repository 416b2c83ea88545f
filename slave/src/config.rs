//! Slave configuration (spec.md §6, `-c <path>`/`-v`).
//!
//! Grounded on `examples/original_source/slave/cli/slave.go`'s flags
//! (`port`, `manager-port`, `token`) widened to a JSON file per spec.md §6,
//! which names the slave as taking `-c <config>` like the master rather
//! than flat CLI flags — the older `slave/cli` revision predates that.

use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_run_root() -> PathBuf {
    dirs_run_root()
}

fn dirs_run_root() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".shadowsocks_manager")
}

#[derive(Debug, Deserialize)]
pub struct Config {
    /// TCP port the RPC server listens on.
    pub port: u16,
    /// UDP port the stats ingester (C2) listens on at 127.0.0.1.
    #[serde(rename = "managerPort")]
    pub manager_port: u16,
    /// Shared secret every RPC call must present.
    pub token: String,
    /// Root directory for per-port run directories. Defaults to
    /// `~/.shadowsocks_manager`, matching `manager_ng.go`'s `NewManager`.
    #[serde(default = "default_run_root")]
    pub run_root: PathBuf,
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
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let json = r#"{"port": 6001, "managerPort": 6002, "token": "s3cret"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 6001);
        assert_eq!(config.manager_port, 6002);
        assert!(config.run_root.ends_with(".shadowsocks_manager"));
    }

    #[test]
    fn honors_explicit_run_root() {
        let json = r#"{"port": 6001, "managerPort": 6002, "token": "s3cret", "run_root": "/tmp/ssmgr"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.run_root, PathBuf::from("/tmp/ssmgr"));
    }
}
