//! Hand-maintained mirror of `master/migrations`. Neon generates this file
//! with `diesel print-schema`; we keep it in sync by hand since we never
//! run the diesel CLI in this workspace.

diesel::table! {
    users (id) {
        id -> Varchar,
        email -> Text,
        quota_flow -> BigInt,
        time -> BigInt,
        expired -> BigInt,
        disabled -> Bool,
        group_id -> Text,
    }
}

diesel::table! {
    allocation (user_id, server_id) {
        user_id -> Varchar,
        server_id -> Text,
        port -> Integer,
        password -> Text,
    }
}

diesel::table! {
    flow_record (user_id, server_id, start_time) {
        user_id -> Varchar,
        server_id -> Text,
        start_time -> BigInt,
        flow -> BigInt,
    }
}

diesel::table! {
    verify_code (email) {
        email -> Text,
        code -> Text,
        time -> BigInt,
    }
}
