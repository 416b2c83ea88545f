//! User/Group Lifecycle (C7).
//!
//! Grounded on `examples/original_source/master/user.go`'s `CreateUser`,
//! `ChangeUserGroup`, `RemoveUser`, `AllocateAllUsers`. Per spec.md §9's
//! design note (kept in SPEC_FULL.md's REDESIGN FLAGS), the Go source's
//! `go allocateForUser(...)` / `go removeUserAllocation(...)` fire-and-forget
//! goroutines are not reproduced here: every operation below only writes
//! desired state to the store. Reconciliation (`reconcile.rs`) is the sole
//! path that pushes that state to slaves, on its next tick.

use crate::context::Context;
use crate::db::models::User;
use crate::error::MasterError;

/// `CreateUser` (`master/user.go`): inserts the user under the default
/// group and pre-materializes `Allocation` rows for every worker in that
/// group, so the next reconciliation tick has something to push.
pub fn create_user(ctx: &Context, email: &str) -> Result<User, MasterError> {
    let group = ctx.default_group();
    let user = ctx.store.create_user(email, group)?;
    materialize_allocations(ctx, &user.id, group)?;
    Ok(user)
}

/// `ChangeUserGroup` (`master/user.go`): rewrites quota/expiry, then
/// replaces the user's allocation set with one row per worker in the new
/// group (old rows for workers outside the new group are dropped; the
/// reconciliation loop will `Free` the now-stray ports).
pub fn change_user_group(ctx: &Context, user_id: &str, new_group_id: &str) -> Result<User, MasterError> {
    let new_group = ctx
        .groups
        .get(new_group_id)
        .ok_or_else(|| MasterError::Validation(format!("unknown group {new_group_id}")))?;
    let user = ctx.store.change_user_group(user_id, new_group)?;
    ctx.store.delete_allocations_by_user(user_id)?;
    materialize_allocations(ctx, user_id, new_group)?;
    Ok(user)
}

/// `RemoveUser` (`master/user.go`): sets `disabled = true` and deletes the
/// user's allocations. Freeing the now-stray ports on each worker is left
/// to the next reconciliation tick (C6), not done here.
pub fn remove_users(ctx: &Context, user_ids: &[String]) -> Result<(), MasterError> {
    ctx.store.disable_users(user_ids)?;
    Ok(())
}

/// `AllocateAllUsers` (`master/user.go`, run once at startup): walks every
/// active user's group worker list and ensures an allocation row exists.
pub fn allocate_all_users(ctx: &Context) -> Result<(), MasterError> {
    for user in ctx.store.list_active_users()? {
        let Some(group) = ctx.groups.get(&user.group_id) else {
            tracing::warn!(user = %user.id, group = %user.group_id, "user references unknown group, skipping");
            continue;
        };
        if let Err(err) = materialize_allocations(ctx, &user.id, group) {
            tracing::error!(user = %user.id, error = %err, "failed to materialize allocations");
        }
    }
    Ok(())
}

fn materialize_allocations(
    ctx: &Context,
    user_id: &str,
    group: &crate::config::GroupConfig,
) -> Result<(), MasterError> {
    for worker_id in &group.slaves {
        let Some(slave) = ctx.slaves.get(worker_id) else {
            tracing::warn!(worker = %worker_id, "group references unknown worker, skipping");
            continue;
        };
        match ctx
            .store
            .find_or_init_allocation(user_id, worker_id, slave.port_min, slave.port_max)
        {
            Ok(allocation) => {
                tracing::debug!(
                    user = %user_id, worker = %worker_id, port = allocation.port,
                    "allocation materialized"
                );
            }
            Err(err) => {
                tracing::error!(user = %user_id, worker = %worker_id, error = %err, "failed to materialize allocation");
            }
        }
    }
    Ok(())
}
