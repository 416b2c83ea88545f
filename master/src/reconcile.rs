//! Reconciliation Loop (C6).
//!
//! Grounded line-for-line on `examples/original_source/master/daemon.go`'s
//! `Monitoring`/`updateStats`/`checkUserLimit`/`diffPorts`. The `[65536]int8`
//! diff array becomes a `HashSet` symmetric difference; everything else —
//! order of operations, which errors abort a worker's pass vs. the whole
//! loop, the flow-record upsert keyed by `start_time` — is kept as
//! described in spec.md §4.6.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::MasterError;

/// The cipher method every Allocate call uses. `master/daemon.go` and
/// `master/user.go` both hardcode `"aes-256-cfb"`; spec.md's data model
/// does not carry a per-user method choice, so we keep the constant.
const METHOD: &str = "aes-256-cfb";

/// Computes `(missing, stray)`: ports expected but not actually live on the
/// slave, and ports live on the slave but not expected, respectively.
pub fn diff_ports(expected: &HashSet<u16>, actual: &HashSet<u16>) -> (Vec<u16>, Vec<u16>) {
    let missing = expected.difference(actual).copied().collect();
    let stray = actual.difference(expected).copied().collect();
    (missing, stray)
}

struct ExpectedEntry {
    password: String,
    user_id: String,
}

/// One pass over a single worker (`updateStats` in `daemon.go`). Any error
/// aborts only this worker's pass; the caller logs and moves to the next
/// worker on the next tick.
pub async fn reconcile_worker(ctx: &mut Context, worker_id: &str) -> Result<(), MasterError> {
    let allocations = ctx.store.get_allocations_by_worker(worker_id)?;
    let mut expected_map: HashMap<u16, ExpectedEntry> = HashMap::new();
    for alloc in &allocations {
        expected_map.insert(
            alloc.port as u16,
            ExpectedEntry {
                password: alloc.password.clone(),
                user_id: alloc.user_id.clone(),
            },
        );
    }
    let expected: HashSet<u16> = expected_map.keys().copied().collect();

    let client = ctx.client(worker_id).await?;
    let stats = {
        let mut client = client.lock().await;
        client.get_stats().await?
    };
    let actual: HashSet<u16> = stats.flow.keys().map(|&p| p as u16).collect();

    let (missing, stray) = diff_ports(&expected, &actual);

    for port in missing {
        let entry = &expected_map[&port];
        let mut client = client.lock().await;
        if let Err(err) = client.allocate(port, &entry.password, METHOD).await {
            tracing::error!(worker = %worker_id, port, error = %err, "failed to allocate port");
        }
    }

    for port in stray {
        let mut client = client.lock().await;
        if let Err(err) = client.free(port).await {
            tracing::error!(worker = %worker_id, port, error = %err, "failed to free port");
        }
    }

    for (port, unit) in stats.flow {
        let Some(entry) = expected_map.get(&(port as u16)) else {
            continue;
        };
        if let Err(err) = ctx
            .store
            .upsert_flow_record(&entry.user_id, worker_id, unit.start_time, unit.traffic)
        {
            tracing::error!(worker = %worker_id, port, error = %err, "failed to upsert flow record");
        }
    }

    Ok(())
}

/// `checkUserLimit` (`daemon.go`): disables every user whose cumulative
/// flow has reached its quota or whose account has expired.
pub fn check_user_limit(ctx: &Context) -> Result<Vec<String>, MasterError> {
    let now = chrono::Utc::now().timestamp();
    let rows = ctx.store.quota_evaluation_rows()?;
    let should_disable: Vec<String> = rows
        .into_iter()
        .filter(|row| row.current_flow >= row.quota_flow || row.expired <= now)
        .map(|row| row.user_id)
        .collect();

    if !should_disable.is_empty() {
        tracing::info!(users = ?should_disable, "disabling users past quota or expiry");
        crate::users::remove_users(ctx, &should_disable)?;
    }
    Ok(should_disable)
}

/// One full tick: every worker in turn, then the quota sweep. Mirrors
/// `Monitoring`'s inner loop body.
pub async fn tick(ctx: &mut Context) {
    let worker_ids: Vec<String> = ctx.slaves.keys().cloned().collect();
    for worker_id in worker_ids {
        if let Err(err) = reconcile_worker(ctx, &worker_id).await {
            tracing::error!(worker = %worker_id, error = %err, "reconciliation pass failed for worker");
        }
    }
    if let Err(err) = check_user_limit(ctx) {
        tracing::error!(error = %err, "quota check failed");
    }
}

/// Runs `tick` every `interval` seconds until `cancel` fires.
pub async fn run(ctx: &mut Context, interval: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("reconciliation loop shutting down");
                return;
            }
            _ = tokio::time::sleep(interval) => {
                tick(ctx).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_ports_finds_missing_and_stray() {
        let expected = HashSet::from([20000, 20001, 20002]);
        let actual = HashSet::from([20001, 20003]);
        let (mut missing, mut stray) = diff_ports(&expected, &actual);
        missing.sort();
        stray.sort();
        assert_eq!(missing, vec![20000, 20002]);
        assert_eq!(stray, vec![20003]);
    }

    #[test]
    fn diff_ports_empty_when_equal() {
        let set = HashSet::from([20000, 20001]);
        let (missing, stray) = diff_ports(&set, &set);
        assert!(missing.is_empty());
        assert!(stray.is_empty());
    }

    #[test]
    fn diff_ports_is_symmetric() {
        let a = HashSet::from([1, 2, 3]);
        let b = HashSet::from([3, 4, 5]);
        let (a_minus_b, b_minus_a) = diff_ports(&a, &b);
        let (b_minus_a_2, a_minus_b_2) = diff_ports(&b, &a);
        assert_eq!(
            a_minus_b.iter().collect::<HashSet<_>>(),
            a_minus_b_2.iter().collect::<HashSet<_>>()
        );
        assert_eq!(
            b_minus_a.iter().collect::<HashSet<_>>(),
            b_minus_a_2.iter().collect::<HashSet<_>>()
        );
    }
}
