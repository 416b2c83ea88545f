//! A connected handle to one slave: its RPC stub plus the token interceptor.
//!
//! Grounded on `examples/original_source/master/daemon.go`'s `Slave` struct
//! (`stub` + per-dial `ctx` carrying the token in metadata) and
//! `InitSlaves`, translated to `tonic`'s channel + interceptor pair.

use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::Request;

use proxy_control_proto::proto::{AllocateRequest, FreeRequest, GetStatsRequest, Statistics};
use proxy_control_proto::{ProxyControlClient, TokenAuth};

use crate::config::SlaveConfig;
use crate::error::MasterError;

/// Deadline applied to every unary call, derived from the reconciliation
/// interval (spec.md §5: "every master→slave RPC carries a deadline").
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SlaveClient {
    inner: ProxyControlClient<tonic::service::interceptor::InterceptedService<Channel, TokenAuth>>,
}

impl SlaveClient {
    pub async fn connect(config: &SlaveConfig) -> Result<Self, MasterError> {
        let uri = format!("http://{}:{}", config.host, config.port);
        let endpoint = Endpoint::from_shared(uri)
            .map_err(|e| MasterError::Fatal(format!("invalid slave endpoint: {e}")))?
            .timeout(CALL_TIMEOUT);
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| MasterError::Transient(format!("failed to dial slave: {e}")))?;
        let inner = ProxyControlClient::with_interceptor(channel, TokenAuth::new(config.token.clone()));
        Ok(Self { inner })
    }

    pub async fn allocate(&mut self, port: u16, password: &str, method: &str) -> Result<(), MasterError> {
        let request = Request::new(AllocateRequest {
            port: port as i32,
            password: password.to_string(),
            method: method.to_string(),
        });
        self.inner.allocate(request).await?;
        Ok(())
    }

    pub async fn free(&mut self, port: u16) -> Result<(), MasterError> {
        let request = Request::new(FreeRequest { port: port as i32 });
        self.inner.free(request).await?;
        Ok(())
    }

    pub async fn get_stats(&mut self) -> Result<Statistics, MasterError> {
        let request = Request::new(GetStatsRequest {});
        Ok(self.inner.get_stats(request).await?.into_inner())
    }
}
