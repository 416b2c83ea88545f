//! Proxy Supervisor (C1).
//!
//! Grounded on `examples/original_source/slave/shadowsocks/manager_ng.go`'s
//! `Manager` interface and `manager` struct. Concurrency per spec.md §4.1,
//! §5: one `Mutex` guards the port map (write on Add/Remove, read on
//! List/Get, matching `serverLock sync.RWMutex`), a second `Mutex` serializes
//! spawn/kill so directory preparation and pid-file I/O never race.

pub mod instance;
mod spawn;
mod watch;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::sync::{mpsc, Mutex, RwLock};

pub use instance::{ProxyDescriptor, ProxyOptions};
use instance::RunDir;
use spawn::{spawn_child, SpawnedChild};
use watch::{spawn_watch, WatchHandles};

use crate::error::SlaveError;

/// Snapshot returned by `List`/`Get` — no handle back into the live
/// instance, so callers cannot mutate supervisor state (spec.md §4.1).
#[derive(Debug, Clone)]
pub struct ProxyInstanceView {
    pub port: u16,
    pub descriptor_password: String,
    pub descriptor_method: String,
    pub traffic: i64,
    pub start_time_ns: i64,
}

struct ProxyInstance {
    descriptor: ProxyDescriptor,
    run_dir: RunDir,
    traffic: Arc<AtomicI64>,
    start_time_ns: Arc<AtomicI64>,
    runtime: Arc<Mutex<SpawnedChild>>,
    watch: WatchHandles,
}

impl ProxyInstance {
    fn view(&self, port: u16) -> ProxyInstanceView {
        ProxyInstanceView {
            port,
            descriptor_password: self.descriptor.password.clone(),
            descriptor_method: self.descriptor.method.clone(),
            traffic: self.traffic.load(Ordering::SeqCst),
            start_time_ns: self.start_time_ns.load(Ordering::SeqCst),
        }
    }
}

pub struct Supervisor {
    instances: RwLock<HashMap<u16, ProxyInstance>>,
    exec_lock: Arc<Mutex<()>>,
    run_root: PathBuf,
    /// This slave's own stats-ingester address, passed to every instance via
    /// `--manager-address` on every exec, including crash-restarts and
    /// `Restore`'s respawns (`manager_ng.go`'s `prepareExec` rebuilds this on
    /// every exec rather than persisting it).
    manager_address: String,
    exhausted_tx: mpsc::UnboundedSender<u16>,
}

impl Supervisor {
    /// `exhausted_rx` yields a port whenever its crash-restart watcher gives
    /// up; the caller (slave `main`) removes the instance and relies on the
    /// master's next reconciliation tick to re-push the allocation.
    pub fn new(run_root: PathBuf, manager_address: String) -> (Self, mpsc::UnboundedReceiver<u16>) {
        let (exhausted_tx, exhausted_rx) = mpsc::unbounded_channel();
        (
            Self {
                instances: RwLock::new(HashMap::new()),
                exec_lock: Arc::new(Mutex::new(())),
                run_root,
                manager_address,
                exhausted_tx,
            },
            exhausted_rx,
        )
    }

    /// The options every freshly-exec'd instance gets, per
    /// `rpc_server.rs::allocate` and `manager_ng.go`'s `prepareExec`: UDP
    /// relay and verbose logging on, reporting to this slave's own stats
    /// ingester.
    fn default_options(&self) -> ProxyOptions {
        ProxyOptions {
            udp_relay: true,
            verbose: true,
            manager_address: Some(self.manager_address.clone()),
            ..Default::default()
        }
    }

    /// `Add` (C1): validate, ensure the port is free, spawn.
    pub async fn add(&self, descriptor: ProxyDescriptor) -> Result<(), SlaveError> {
        descriptor.validate()?;
        let port = descriptor.port;

        {
            let instances = self.instances.read().await;
            if instances.contains_key(&port) {
                return Err(SlaveError::ServerExists(port));
            }
        }

        let run_dir = RunDir::new(&self.run_root, port);
        let spawned = {
            let _guard = self.exec_lock.lock().await;
            spawn_child(
                &descriptor,
                &run_dir.config_path(),
                &run_dir.log_path(),
                &run_dir.pid_path(),
            )
            .await?
        };

        let traffic = Arc::new(AtomicI64::new(0));
        let start_time_ns = Arc::new(AtomicI64::new(spawned.start_time_ns));
        let runtime = Arc::new(Mutex::new(spawned));

        let watch = spawn_watch(
            port,
            descriptor.clone(),
            run_dir.config_path(),
            run_dir.log_path(),
            run_dir.pid_path(),
            runtime.clone(),
            start_time_ns.clone(),
            self.exec_lock.clone(),
            self.exhausted_tx.clone(),
        );

        let mut instances = self.instances.write().await;
        // Re-check under the write lock: two concurrent Adds could have
        // raced past the read-lock check above.
        if instances.contains_key(&port) {
            watch.cancel.cancel();
            return Err(SlaveError::ServerExists(port));
        }
        instances.insert(
            port,
            ProxyInstance {
                descriptor,
                run_dir,
                traffic,
                start_time_ns,
                runtime,
                watch,
            },
        );
        Ok(())
    }

    /// `Remove` (C1): cancel the watch before killing, to avoid a restart
    /// race (spec.md §9), then delete the run directory.
    pub async fn remove(&self, port: u16) -> Result<(), SlaveError> {
        let instance = {
            let mut instances = self.instances.write().await;
            instances.remove(&port).ok_or(SlaveError::ServerNotFound(port))?
        };

        instance.watch.cancel.cancel();

        let _guard = self.exec_lock.lock().await;
        let pid = instance.runtime.lock().await.pid;
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        if !wait_for_exit(pid).await {
            tracing::warn!(port, pid, "process ignored SIGTERM, sending SIGKILL");
            let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            wait_for_exit(pid).await;
        }

        if let Err(err) = tokio::fs::remove_dir_all(&instance.run_dir.root).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(port, error = %err, "failed to remove run directory");
            }
        }
        Ok(())
    }

    pub async fn list(&self) -> Vec<ProxyInstanceView> {
        let instances = self.instances.read().await;
        instances.iter().map(|(port, inst)| inst.view(*port)).collect()
    }

    pub async fn get(&self, port: u16) -> Result<ProxyInstanceView, SlaveError> {
        let instances = self.instances.read().await;
        instances
            .get(&port)
            .map(|inst| inst.view(port))
            .ok_or(SlaveError::ServerNotFound(port))
    }

    /// Sets the traffic counter for `port` directly, bypassing the port-map
    /// lock (spec.md §9: "do not protect it with the port-map lock").
    pub async fn record_traffic(&self, port: u16, traffic: i64) -> bool {
        let instances = self.instances.read().await;
        match instances.get(&port) {
            Some(inst) => {
                inst.traffic.store(traffic, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// `Restore` (C1): enumerate run-directory subdirectories, adopt live
    /// children, respawn dead ones, and discard unrecognized/corrupt
    /// entries.
    pub async fn restore(&self) -> Result<(), SlaveError> {
        tokio::fs::create_dir_all(&self.run_root).await?;
        let mut read_dir = tokio::fs::read_dir(&self.run_root).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Ok(port) = name.parse::<u16>() else {
                tracing::warn!(dir = %name, "unrecognized run directory entry, removing");
                let _ = tokio::fs::remove_dir_all(&path).await;
                continue;
            };

            if let Err(err) = self.restore_one(port).await {
                tracing::warn!(port, error = %err, "failed to restore run directory, removing");
                let _ = tokio::fs::remove_dir_all(&path).await;
            }
        }
        Ok(())
    }

    async fn restore_one(&self, port: u16) -> Result<(), SlaveError> {
        let run_dir = RunDir::new(&self.run_root, port);
        let config_bytes = tokio::fs::read(run_dir.config_path()).await?;
        let descriptor: ProxyDescriptorConfig = serde_json::from_slice(&config_bytes)
            .map_err(|e| SlaveError::Transient(format!("corrupt config: {e}")))?;
        let descriptor = descriptor.into_descriptor(port, self.default_options());
        descriptor.validate()?;

        let pid_bytes = tokio::fs::read_to_string(run_dir.pid_path()).await.ok();
        let existing_pid = pid_bytes.and_then(|s| s.trim().parse::<u32>().ok());

        let (spawned, adopted) = match existing_pid {
            Some(pid) if process_alive(pid) => (
                SpawnedChild {
                    pid,
                    start_time_ns: now_ns(),
                },
                true,
            ),
            _ => {
                let _guard = self.exec_lock.lock().await;
                let spawned = spawn_child(
                    &descriptor,
                    &run_dir.config_path(),
                    &run_dir.log_path(),
                    &run_dir.pid_path(),
                )
                .await?;
                (spawned, false)
            }
        };

        tracing::info!(port, adopted, pid = spawned.pid, "restored proxy instance");

        let traffic = Arc::new(AtomicI64::new(0));
        let start_time_ns = Arc::new(AtomicI64::new(spawned.start_time_ns));
        let runtime = Arc::new(Mutex::new(spawned));

        let watch = spawn_watch(
            port,
            descriptor.clone(),
            run_dir.config_path(),
            run_dir.log_path(),
            run_dir.pid_path(),
            runtime.clone(),
            start_time_ns.clone(),
            self.exec_lock.clone(),
            self.exhausted_tx.clone(),
        );

        let mut instances = self.instances.write().await;
        instances.insert(
            port,
            ProxyInstance {
                descriptor,
                run_dir,
                traffic,
                start_time_ns,
                runtime,
                watch,
            },
        );
        Ok(())
    }

    /// `CleanUp` (C1): stop every instance and remove the run root.
    pub async fn clean_up(&self) {
        let ports: Vec<u16> = {
            let instances = self.instances.read().await;
            instances.keys().copied().collect()
        };
        for port in ports {
            if let Err(err) = self.remove(port).await {
                tracing::warn!(port, error = %err, "failed to stop instance during cleanup");
            }
        }
        let _ = tokio::fs::remove_dir_all(&self.run_root).await;
    }
}

fn process_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn now_ns() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as i64
}

/// Polls for process exit up to `MAX_WAIT`, returning whether it exited.
async fn wait_for_exit(pid: u32) -> bool {
    const MAX_WAIT: std::time::Duration = std::time::Duration::from_secs(2);
    let deadline = tokio::time::Instant::now() + MAX_WAIT;
    while process_alive(pid) {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    true
}

/// Only the fields the native binary's own config file carries
/// (spec.md §6); options are reconstructed fresh on restore rather than
/// round-tripped, since the manager-address/verbose flags are this
/// process's own runtime choices, not the server's persisted identity —
/// mirroring `manager_ng.go`'s `prepareExec`, which rebuilds them on every
/// exec instead of reading them back from disk.
#[derive(serde::Deserialize)]
struct ProxyDescriptorConfig {
    #[serde(rename = "server")]
    host: String,
    password: String,
    method: String,
    timeout: u32,
}

impl ProxyDescriptorConfig {
    fn into_descriptor(self, port: u16, options: ProxyOptions) -> ProxyDescriptor {
        ProxyDescriptor {
            host: self.host,
            port,
            password: self.password,
            method: self.method,
            timeout: self.timeout,
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_rejects_invalid_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _rx) = Supervisor::new(dir.path().to_path_buf(), "127.0.0.1:6002".to_string());
        let bad = ProxyDescriptor {
            host: "0.0.0.0".to_string(),
            port: 20000,
            password: "short".to_string(),
            method: "aes-256-cfb".to_string(),
            timeout: 60,
            options: ProxyOptions::default(),
        };
        assert!(matches!(sup.add(bad).await, Err(SlaveError::InvalidServer(_))));
    }

    #[tokio::test]
    async fn get_on_empty_supervisor_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _rx) = Supervisor::new(dir.path().to_path_buf(), "127.0.0.1:6002".to_string());
        assert!(matches!(sup.get(20000).await, Err(SlaveError::ServerNotFound(20000))));
    }

    #[tokio::test]
    async fn remove_on_empty_supervisor_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _rx) = Supervisor::new(dir.path().to_path_buf(), "127.0.0.1:6002".to_string());
        assert!(matches!(sup.remove(20000).await, Err(SlaveError::ServerNotFound(20000))));
    }

    #[tokio::test]
    async fn list_on_empty_supervisor_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (sup, _rx) = Supervisor::new(dir.path().to_path_buf(), "127.0.0.1:6002".to_string());
        assert!(sup.list().await.is_empty());
    }
}
