//! Crash-restart watch (spec.md §4.1, §9): a per-instance cancellable task
//! that polls liveness every 5 s and restarts a dead child up to 10 times
//! at 100 ms spacing before giving up.
//!
//! Grounded on `examples/original_source/slave/shadowsocks/server.go`'s
//! `watchDaemon` field and restart loop, expressed as a `(CancellationToken,
//! JoinHandle)` pair per spec.md §9's design note rather than a bare
//! goroutine, so `Remove` can cancel it before killing the process.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal;
use nix::unistd::Pid;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::instance::ProxyDescriptor;
use super::spawn::{spawn_child, SpawnedChild};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RESTARTS: u32 = 10;
const RESTART_SPACING: Duration = Duration::from_millis(100);

pub struct WatchHandles {
    pub cancel: CancellationToken,
    pub join: tokio::task::JoinHandle<()>,
}

/// Returns true if the process identified by `pid` is still alive, using
/// `kill(pid, 0)` the way `server.go`'s `proc.Alive` does on Linux.
fn is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

#[allow(clippy::too_many_arguments)]
pub fn spawn_watch(
    port: u16,
    descriptor: ProxyDescriptor,
    config_path: std::path::PathBuf,
    log_path: std::path::PathBuf,
    pid_path: std::path::PathBuf,
    runtime: Arc<Mutex<SpawnedChild>>,
    start_time_ns: Arc<AtomicI64>,
    exec_lock: Arc<Mutex<()>>,
    exhausted_tx: UnboundedSender<u16>,
) -> WatchHandles {
    let cancel = CancellationToken::new();
    let watch_cancel = cancel.clone();

    let join = tokio::spawn(async move {
        let mut restarts = 0u32;
        loop {
            tokio::select! {
                _ = watch_cancel.cancelled() => return,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            let pid = { runtime.lock().await.pid };
            if is_alive(pid) {
                restarts = 0;
                continue;
            }

            tracing::warn!(port, pid, "proxy process died, attempting restart");

            let mut restarted = false;
            while restarts < MAX_RESTARTS {
                restarts += 1;
                let _exec_guard = exec_lock.lock().await;
                match spawn_child(&descriptor, &config_path, &log_path, &pid_path).await {
                    Ok(spawned) => {
                        start_time_ns.store(spawned.start_time_ns, Ordering::SeqCst);
                        *runtime.lock().await = spawned;
                        tracing::info!(port, attempt = restarts, "proxy process restarted");
                        restarted = true;
                        break;
                    }
                    Err(err) => {
                        tracing::error!(port, attempt = restarts, error = %err, "restart attempt failed");
                        drop(_exec_guard);
                        tokio::time::sleep(RESTART_SPACING).await;
                    }
                }
            }

            if !restarted {
                tracing::error!(port, "supervisor exhausted restart attempts, giving up");
                let _ = exhausted_tx.send(port);
                return;
            }
        }
    });

    WatchHandles { cancel, join }
}
