//! Proxy descriptor, run-directory layout, and CLI argv construction.
//!
//! Grounded on `examples/original_source/slave/shadowsocks/server.go`'s
//! `serverOptions`/`args()` (flag set and order) and `Server`/`Valid()`,
//! merged with `manager_ng.go`'s `methods` allow-list and run-directory
//! naming (`ss_server.conf`/`.pid`/`.log`, directory name = decimal port,
//! per spec.md §6).

use std::path::PathBuf;

use serde::Serialize;

use crate::error::SlaveError;

/// Cipher methods the native proxy binary accepts. Verbatim from
/// `server.go`'s `methods` / `manager_ng.go`'s `methods`.
pub const METHODS: &[&str] = &[
    "table", "rc4", "rc4-md5", "aes-128-cfb", "aes-192-cfb", "aes-256-cfb", "aes-128-ctr",
    "aes-192-ctr", "aes-256-ctr", "bf-cfb", "camellia-128-cfb", "camellia-192-cfb",
    "camellia-256-cfb", "cast5-cfb", "des-cfb", "idea-cfb", "rc2-cfb", "seed-cfb", "salsa20",
    "chacha20", "chacha20-ietf",
];

pub fn is_valid_method(method: &str) -> bool {
    METHODS.contains(&method)
}

/// CLI option flags layered on top of the base `-s/-p/-m/-k/-d` arguments.
/// Field order matches `server.go`'s `args()` emission order.
#[derive(Debug, Clone, Default)]
pub struct ProxyOptions {
    pub udp_relay: bool,
    pub ipv6_first: bool,
    pub mptcp: bool,
    pub tcp_fast_open: bool,
    pub auth: bool,
    pub name_server: Option<String>,
    pub manager_address: Option<String>,
    pub firewall: bool,
    pub verbose: bool,
}

impl ProxyOptions {
    fn build_args(&self, pid_file: &str) -> Vec<String> {
        let mut args = Vec::new();
        if self.udp_relay {
            args.push("-u".to_string());
        }
        if self.ipv6_first {
            args.push("-6".to_string());
        }
        if self.mptcp {
            args.push("--mptcp".to_string());
        }
        if self.tcp_fast_open {
            args.push("--fast-open".to_string());
        }
        if self.auth {
            args.push("-A".to_string());
        }
        if let Some(ns) = &self.name_server {
            args.push("-d".to_string());
            args.push(ns.clone());
        }
        if !pid_file.is_empty() {
            args.push("-f".to_string());
            args.push(pid_file.to_string());
        }
        if let Some(addr) = &self.manager_address {
            args.push("--manager-address".to_string());
            args.push(addr.clone());
        }
        if self.firewall {
            args.push("--firewall".to_string());
        }
        if self.verbose {
            args.push("-v".to_string());
        }
        args
    }
}

/// What a caller asks C1.Add to create. Serializes to `ss_server.conf`
/// (field names match the native binary's own config file keys, per
/// `server.go`'s `Server` struct json tags).
#[derive(Debug, Clone, Serialize)]
pub struct ProxyDescriptor {
    #[serde(rename = "server")]
    pub host: String,
    #[serde(rename = "server_port")]
    pub port: u16,
    pub password: String,
    pub method: String,
    pub timeout: u32,
    #[serde(skip)]
    pub options: ProxyOptions,
}

impl ProxyDescriptor {
    pub fn validate(&self) -> Result<(), SlaveError> {
        if self.host.is_empty() {
            return Err(SlaveError::InvalidServer("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(SlaveError::InvalidServer("port must be in (0, 65536)".to_string()));
        }
        if self.password.len() < 8 {
            return Err(SlaveError::InvalidServer(
                "password must be at least 8 characters".to_string(),
            ));
        }
        if !is_valid_method(&self.method) {
            return Err(SlaveError::InvalidServer(format!(
                "unsupported method: {}",
                self.method
            )));
        }
        if self.timeout == 0 {
            return Err(SlaveError::InvalidServer("timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Command-equivalent argv, for logging and for spawning. `pid_file` is
    /// the run directory's `ss_server.pid` path, matching `prepareExec`
    /// setting `options.PidFile` before building args.
    pub fn build_argv(&self, config_path: &str, pid_file: &str) -> Vec<String> {
        let mut argv = vec!["-c".to_string(), config_path.to_string()];
        argv.extend(self.options.build_args(pid_file));
        argv
    }
}

/// Per-port run directory: `<root>/<port>/{ss_server.conf,.pid,.log}`.
pub struct RunDir {
    pub root: PathBuf,
}

impl RunDir {
    pub fn new(run_root: &std::path::Path, port: u16) -> Self {
        Self {
            root: run_root.join(port.to_string()),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("ss_server.conf")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.root.join("ss_server.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join("ss_server.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ProxyDescriptor {
        ProxyDescriptor {
            host: "0.0.0.0".to_string(),
            port: 20000,
            password: "0123456789".to_string(),
            method: "aes-256-cfb".to_string(),
            timeout: 60,
            options: ProxyOptions::default(),
        }
    }

    #[test]
    fn validate_accepts_well_formed_descriptor() {
        assert!(descriptor().validate().is_ok());
    }

    #[test]
    fn validate_rejects_short_password() {
        let mut d = descriptor();
        d.password = "short".to_string();
        assert!(matches!(d.validate(), Err(SlaveError::InvalidServer(_))));
    }

    #[test]
    fn validate_rejects_unknown_method() {
        let mut d = descriptor();
        d.method = "rot13".to_string();
        assert!(matches!(d.validate(), Err(SlaveError::InvalidServer(_))));
    }

    #[test]
    fn validate_rejects_zero_port() {
        let mut d = descriptor();
        d.port = 0;
        assert!(matches!(d.validate(), Err(SlaveError::InvalidServer(_))));
    }

    #[test]
    fn build_argv_orders_flags_like_the_source() {
        let mut d = descriptor();
        d.options.udp_relay = true;
        d.options.manager_address = Some("127.0.0.1:6002".to_string());
        d.options.verbose = true;
        let argv = d.build_argv("/run/20000/ss_server.conf", "/run/20000/ss_server.pid");
        assert_eq!(
            argv,
            vec![
                "-c",
                "/run/20000/ss_server.conf",
                "-u",
                "-f",
                "/run/20000/ss_server.pid",
                "--manager-address",
                "127.0.0.1:6002",
                "-v",
            ]
        );
    }
}
