//! Allocation Store Interface (C5).
//!
//! Grounded on `examples/original_source/master/user.go` (`findOrInitAllocation`,
//! `CreateUser`, `removeUserAllocation`) and `daemon.go` (`CleanInvalidAllocation`,
//! `checkUserLimit`'s raw SQL). Queries run against a pooled `diesel`
//! connection, the same `r2d2::Pool<ConnectionManager<PgConnection>>` shape
//! `storage_controller` uses for its persistence layer.

use std::collections::HashSet;

use diesel::prelude::*;
use diesel::sql_query;
use rand::distributions::Alphanumeric;
use rand::Rng;

use utils::id::UserId;

use super::models::{Allocation, FlowRecord, User, UserQuotaRow};
use super::schema::{allocation, flow_record, users};
use super::Pool;
use crate::config::GroupConfig;
use crate::error::MasterError;
use crate::scheduler::{pick_free_port, ScheduleError};

const PASSWORD_LENGTH: usize = 10;

/// Mirrors `RandomPassword` in `examples/original_source/master/utils.go`:
/// a 10-character lowercase-alphanumeric string. `rand::distributions::Alphanumeric`
/// samples `[A-Za-z0-9]`; we lowercase to match the original's alphabet exactly.
fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<PgConnection>>, MasterError>
    {
        Ok(self.pool.get()?)
    }

    /// `CreateUser` (`master/user.go`): generates a 32-hex user id, applies
    /// the default group's quota/lifetime policy.
    pub fn create_user(&self, email: &str, default_group: &GroupConfig) -> Result<User, MasterError> {
        let now = chrono::Utc::now().timestamp();
        let user = User {
            id: UserId::generate().to_string(),
            email: email.to_string(),
            quota_flow: default_group.limit.flow * 1024 * 1024,
            time: now,
            expired: now + default_group.limit.time * 3600,
            disabled: false,
            group_id: default_group.id.clone(),
        };
        let mut conn = self.conn()?;
        diesel::insert_into(users::table)
            .values(&user)
            .execute(&mut conn)?;
        Ok(user)
    }

    /// `ChangeUserGroup` (`master/user.go`): rewrites quota/expiry from the
    /// user's original creation time plus the new group's lifetime.
    pub fn change_user_group(
        &self,
        user_id: &str,
        new_group: &GroupConfig,
    ) -> Result<User, MasterError> {
        let mut conn = self.conn()?;
        let mut user: User = users::table.find(user_id).first(&mut conn)?;
        user.group_id = new_group.id.clone();
        user.expired = user.time + new_group.limit.time * 3600;
        user.quota_flow = new_group.limit.flow * 1024 * 1024;
        diesel::update(users::table.find(user_id))
            .set(&user)
            .execute(&mut conn)?;
        Ok(user)
    }

    /// `RemoveUser` (`master/user.go`): marks disabled and returns the
    /// allocations that must now be freed on their workers.
    pub fn disable_users(&self, ids: &[String]) -> Result<Vec<Allocation>, MasterError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn()?;
        diesel::update(users::table.filter(users::id.eq_any(ids)))
            .set(users::disabled.eq(true))
            .execute(&mut conn)?;
        let allocs = allocation::table
            .filter(allocation::user_id.eq_any(ids))
            .load::<Allocation>(&mut conn)?;
        diesel::delete(allocation::table.filter(allocation::user_id.eq_any(ids)))
            .execute(&mut conn)?;
        Ok(allocs)
    }

    pub fn list_active_users(&self) -> Result<Vec<User>, MasterError> {
        let mut conn = self.conn()?;
        Ok(users::table
            .filter(users::disabled.eq(false))
            .load(&mut conn)?)
    }

    pub fn get_allocations_by_user(&self, user_id: &str) -> Result<Vec<Allocation>, MasterError> {
        let mut conn = self.conn()?;
        Ok(allocation::table
            .filter(allocation::user_id.eq(user_id))
            .load(&mut conn)?)
    }

    pub fn get_allocations_by_worker(&self, worker_id: &str) -> Result<Vec<Allocation>, MasterError> {
        let mut conn = self.conn()?;
        Ok(allocation::table
            .filter(allocation::server_id.eq(worker_id))
            .load(&mut conn)?)
    }

    /// `findOrInitAllocation` (`master/user.go`): returns the existing
    /// (port, password) for (user, worker), or scans via C4 and inserts a
    /// fresh one. Deterministic across calls until the row is deleted.
    pub fn find_or_init_allocation(
        &self,
        user_id: &str,
        worker_id: &str,
        port_min: u16,
        port_max: u16,
    ) -> Result<Allocation, MasterError> {
        let mut conn = self.conn()?;
        if let Some(existing) = allocation::table
            .find((user_id, worker_id))
            .first::<Allocation>(&mut conn)
            .optional()?
        {
            return Ok(existing);
        }

        let used: HashSet<u16> = allocation::table
            .filter(allocation::server_id.eq(worker_id))
            .select(allocation::port)
            .load::<i32>(&mut conn)?
            .into_iter()
            .map(|p| p as u16)
            .collect();

        let port = pick_free_port(&used, port_min, port_max).map_err(|ScheduleError::PoolFull { .. }| {
            MasterError::Transient(format!("no port available on worker {worker_id}"))
        })?;

        let allocation = Allocation {
            user_id: user_id.to_string(),
            server_id: worker_id.to_string(),
            port: port as i32,
            password: random_password(),
        };
        diesel::insert_into(allocation::table)
            .values(&allocation)
            .execute(&mut conn)?;
        Ok(allocation)
    }

    pub fn delete_allocations_by_user(&self, user_id: &str) -> Result<Vec<Allocation>, MasterError> {
        let mut conn = self.conn()?;
        let allocs = allocation::table
            .filter(allocation::user_id.eq(user_id))
            .load::<Allocation>(&mut conn)?;
        diesel::delete(allocation::table.filter(allocation::user_id.eq(user_id)))
            .execute(&mut conn)?;
        Ok(allocs)
    }

    /// `CleanInvalidAllocation` (`master/daemon.go`): startup garbage
    /// collection of allocations referring to workers no longer in config.
    pub fn delete_allocations_not_in_workers(&self, valid_worker_ids: &[String]) -> Result<usize, MasterError> {
        let mut conn = self.conn()?;
        Ok(diesel::delete(allocation::table.filter(allocation::server_id.ne_all(valid_worker_ids)))
            .execute(&mut conn)?)
    }

    /// `updateStats`'s flow-record upsert (`master/daemon.go`): keyed on
    /// `start_time` so a process restart creates a new row rather than
    /// overwriting the prior instance's cumulative total.
    pub fn upsert_flow_record(
        &self,
        user_id: &str,
        worker_id: &str,
        start_time: i64,
        traffic: i64,
    ) -> Result<(), MasterError> {
        let mut conn = self.conn()?;
        let record = FlowRecord {
            user_id: user_id.to_string(),
            server_id: worker_id.to_string(),
            start_time,
            flow: traffic,
        };
        diesel::insert_into(flow_record::table)
            .values(&record)
            .on_conflict((flow_record::user_id, flow_record::server_id, flow_record::start_time))
            .do_update()
            .set(flow_record::flow.eq(traffic))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn sum_flow_by_user(&self, user_id: &str) -> Result<i64, MasterError> {
        let mut conn = self.conn()?;
        let total: Option<i64> = flow_record::table
            .filter(flow_record::user_id.eq(user_id))
            .select(diesel::dsl::sum(flow_record::flow))
            .first(&mut conn)?;
        Ok(total.unwrap_or(0))
    }

    /// `checkUserLimit`'s raw SQL join (`master/daemon.go`), translated 1:1.
    pub fn quota_evaluation_rows(&self) -> Result<Vec<UserQuotaRow>, MasterError> {
        let mut conn = self.conn()?;
        const SQL: &str = "SELECT u.id AS user_id, u.quota_flow AS quota_flow, \
            COALESCE(SUM(f.flow), 0) AS current_flow, u.expired AS expired \
            FROM users u LEFT JOIN flow_record f ON u.id = f.user_id \
            WHERE u.disabled = false \
            GROUP BY u.id, u.quota_flow, u.expired";
        Ok(sql_query(SQL).load(&mut conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::random_password;

    #[test]
    fn random_password_has_expected_length_and_alphabet() {
        let pw = random_password();
        assert_eq!(pw.len(), 10);
        assert!(pw.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn random_password_is_not_constant() {
        let a = random_password();
        let b = random_password();
        assert_ne!(a, b, "extremely unlikely collision, treat as a bug if it happens");
    }
}
