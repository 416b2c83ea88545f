//! Generated wire types for the master↔slave RPC surface (spec.md §6),
//! plus the shared bearer-token auth interceptor both sides install.
//!
//! Grounded on `examples/original_source/slave/server.go`'s `authorize`,
//! `UnaryAuthInterceptor` and `StreamAuthInterceptor` (tonic's single
//! `Interceptor` trait unifies the unary/streaming cases the Go source
//! needed two interceptor types for).

pub mod proto {
    tonic::include_proto!("proxy_control");
}

pub use proto::{
    proxy_control_client::ProxyControlClient,
    proxy_control_server::{ProxyControl, ProxyControlServer},
    AllocateReply, AllocateRequest, FlowUnit, FreeReply, FreeRequest, GetStatsRequest, Statistics,
};

use tonic::metadata::MetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// The metadata key both sides read the shared secret from.
pub const TOKEN_METADATA_KEY: &str = "token";

/// Rejects any request whose `token` metadata entry doesn't match the
/// slave's configured shared secret.
///
/// Installed on both the server (every unary and the streaming call) and
/// the client (which attaches the token on every outgoing request).
#[derive(Clone)]
pub struct TokenAuth {
    token: String,
}

impl TokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl Interceptor for TokenAuth {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let value: MetadataValue<_> = self
            .token
            .parse()
            .map_err(|_| Status::internal("invalid configured token"))?;
        request.metadata_mut().insert(TOKEN_METADATA_KEY, value);
        Ok(request)
    }
}

/// Server-side check: compares the incoming `token` metadata entry against
/// the slave's configured secret. Used both from a `tonic::Interceptor`
/// wrapping the service, and directly in `GetStatsStream`'s handler since
/// tonic interceptors cannot themselves hold per-call streaming state.
pub fn authorize(request: &Request<()>, expected_token: &str) -> Result<(), Status> {
    authorize_metadata(request.metadata(), expected_token)
}

pub fn authorize_metadata(
    metadata: &tonic::metadata::MetadataMap,
    expected_token: &str,
) -> Result<(), Status> {
    match metadata.get(TOKEN_METADATA_KEY) {
        Some(value) if value.to_str().map(|v| v == expected_token).unwrap_or(false) => Ok(()),
        Some(_) => Err(Status::unauthenticated("access denied")),
        None => Err(Status::unauthenticated("empty metadata")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorize_accepts_matching_token() {
        let mut req = Request::new(());
        req.metadata_mut()
            .insert(TOKEN_METADATA_KEY, "s3cret".parse().unwrap());
        assert!(authorize(&req, "s3cret").is_ok());
    }

    #[test]
    fn authorize_rejects_mismatched_token() {
        let mut req = Request::new(());
        req.metadata_mut()
            .insert(TOKEN_METADATA_KEY, "wrong".parse().unwrap());
        assert!(authorize(&req, "s3cret").is_err());
    }

    #[test]
    fn authorize_rejects_missing_token() {
        let req = Request::new(());
        assert!(authorize(&req, "s3cret").is_err());
    }
}
