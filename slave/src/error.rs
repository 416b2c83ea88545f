//! Error taxonomy for the slave (spec.md §7), mirroring the Go source's
//! `ErrServerNotFound`/`ErrInvalidServer`/`ErrServerExists`
//! (`manager_ng.go`) plus the supervisor-exhaustion and transient-IO kinds
//! spec.md §7 names.

#[derive(Debug, thiserror::Error)]
pub enum SlaveError {
    #[error("invalid server descriptor: {0}")]
    InvalidServer(String),

    #[error("server already exists on port {0}")]
    ServerExists(u16),

    #[error("server not found on port {0}")]
    ServerNotFound(u16),

    #[error("supervisor gave up restarting port {0} after repeated crashes")]
    SupervisorExhausted(u16),

    #[error("transient IO error: {0}")]
    Transient(String),
}

impl From<std::io::Error> for SlaveError {
    fn from(err: std::io::Error) -> Self {
        SlaveError::Transient(err.to_string())
    }
}

impl From<SlaveError> for tonic::Status {
    fn from(err: SlaveError) -> Self {
        match err {
            SlaveError::InvalidServer(msg) => tonic::Status::invalid_argument(msg),
            SlaveError::ServerExists(port) => {
                tonic::Status::already_exists(format!("port {port} already allocated"))
            }
            SlaveError::ServerNotFound(port) => {
                tonic::Status::not_found(format!("port {port} not found"))
            }
            SlaveError::SupervisorExhausted(port) => {
                tonic::Status::unavailable(format!("port {port} supervisor exhausted"))
            }
            SlaveError::Transient(msg) => tonic::Status::unavailable(msg),
        }
    }
}
