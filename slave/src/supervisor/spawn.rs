//! Directory preparation and process spawning shared by `Add`, `Restore`,
//! and the crash-restart watcher.
//!
//! Grounded on `examples/original_source/slave/shadowsocks/manager_ng.go`'s
//! `prepareExec`/`exec` (`os.MkdirAll`, write config, open log, `cmd.Start()`,
//! record pid). We track the child only by pid, not by a `tokio::process::Child`
//! handle: liveness and termination go through `nix::sys::signal::kill`
//! (matching `server.go`'s `proc.Alive`), and a detached reaper task
//! prevents zombies without holding a handle the watcher would otherwise
//! need to share.

use std::path::Path;

use tokio::process::Command;

use super::instance::ProxyDescriptor;
use crate::error::SlaveError;

pub struct SpawnedChild {
    pub pid: u32,
    pub start_time_ns: i64,
}

pub async fn spawn_child(
    descriptor: &ProxyDescriptor,
    config_path: &Path,
    log_path: &Path,
    pid_path: &Path,
) -> Result<SpawnedChild, SlaveError> {
    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let config_json = serde_json::to_vec_pretty(descriptor)
        .map_err(|e| SlaveError::Transient(format!("failed to serialize config: {e}")))?;
    tokio::fs::write(config_path, config_json).await?;

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    let log_file_err = log_file.try_clone()?;

    let argv = descriptor.build_argv(
        &config_path.display().to_string(),
        &pid_path.display().to_string(),
    );
    tracing::debug!(?argv, "spawning ss-server");

    let mut child = Command::new("ss-server")
        .args(&argv)
        .stdout(log_file)
        .stderr(log_file_err)
        .kill_on_drop(false)
        .spawn()?;

    let pid = child
        .id()
        .ok_or_else(|| SlaveError::Transient("child exited immediately after spawn".to_string()))?;

    tokio::fs::write(pid_path, pid.to_string()).await?;

    let start_time_ns = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64;

    // Reap in the background; the watcher and `Remove` observe/signal the
    // pid directly via `nix`, never through this handle.
    tokio::spawn(async move {
        let _ = child.wait().await;
    });

    Ok(SpawnedChild { pid, start_time_ns })
}
