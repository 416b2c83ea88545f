//! Row types for `db::schema`. Grounded on
//! `examples/original_source/master/orm/orm.go`'s `User`/`Allocation`/
//! `FlowRecord`/`VerifyCode` structs; `group` on `User` is a field the Go
//! source also carries (`user.go`'s `orm.User{..., Group: "default"}`)
//! even though it isn't in the retrieved `orm.go` snippet of that struct.

use diesel::prelude::*;

use super::schema::{allocation, flow_record, users, verify_code};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(primary_key(id))]
pub struct User {
    pub id: String,
    pub email: String,
    pub quota_flow: i64,
    pub time: i64,
    pub expired: i64,
    pub disabled: bool,
    pub group_id: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = allocation)]
#[diesel(primary_key(user_id, server_id))]
pub struct Allocation {
    pub user_id: String,
    pub server_id: String,
    pub port: i32,
    pub password: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = flow_record)]
#[diesel(primary_key(user_id, server_id, start_time))]
pub struct FlowRecord {
    pub user_id: String,
    pub server_id: String,
    pub start_time: i64,
    pub flow: i64,
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = verify_code)]
#[diesel(primary_key(email))]
pub struct VerifyCode {
    pub email: String,
    pub code: String,
    pub time: i64,
}

/// Row shape of the quota-evaluation join query (`checkUserLimit` in
/// `master/daemon.go`).
#[derive(Debug, Clone, QueryableByName)]
pub struct UserQuotaRow {
    #[diesel(sql_type = diesel::sql_types::Text)]
    pub user_id: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub quota_flow: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub current_flow: i64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub expired: i64,
}
