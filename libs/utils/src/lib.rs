//! Shared, dependency-light building blocks used by both `master` and `slave`.
//!
//! Grounded on `examples/pks-os-neon/libs/utils`: small standalone helpers
//! (ids, logging init, shutdown signalling) that every binary in the
//! workspace pulls in first, rather than each binary rolling its own.

pub mod id;
pub mod logging;
pub mod shutdown;

pub use id::UserId;
