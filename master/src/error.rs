//! Error taxonomy for the master (spec.md §7), mirroring `ScheduleError` in
//! `examples/pks-os-neon/storage_controller/src/scheduler.rs`: one flat
//! `thiserror` enum per component boundary, converted up with `?`/`From`.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum MasterError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transient error, will retry next tick: {0}")]
    Transient(String),

    #[error("fatal startup error: {0}")]
    Fatal(String),
}

impl From<diesel::result::Error> for MasterError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => MasterError::NotFound(err.to_string()),
            other => MasterError::Transient(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for MasterError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        MasterError::Transient(err.to_string())
    }
}

impl From<tonic::Status> for MasterError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;
        match status.code() {
            Code::NotFound => MasterError::NotFound(status.message().to_string()),
            Code::AlreadyExists => MasterError::Conflict(status.message().to_string()),
            Code::InvalidArgument => MasterError::Validation(status.message().to_string()),
            _ => MasterError::Transient(status.message().to_string()),
        }
    }
}

impl From<ConfigError> for MasterError {
    fn from(err: ConfigError) -> Self {
        MasterError::Fatal(err.to_string())
    }
}
