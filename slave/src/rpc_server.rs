//! Slave RPC Server (C3).
//!
//! Grounded 1:1 on `examples/original_source/slave/server.go`'s
//! `slaveServer`/`authorize`/`Allocate`/`Free`/`GetStats`. The streaming
//! variant follows `slave/slave_server.go`'s `GetStatsStream` (5 s tick,
//! close after 5 consecutive send failures) even though that file belongs
//! to the legacy UDP-client path — the streaming *shape* it shows is the
//! one spec.md §4.3 describes for the live path too.

use std::pin::Pin;
use std::time::Duration;

use tokio_stream::Stream;
use tonic::{Request, Response, Status};

use proxy_control_proto::proto::{
    AllocateReply, AllocateRequest, FlowUnit, FreeReply, FreeRequest, GetStatsRequest, Statistics,
};
use proxy_control_proto::{authorize_metadata, ProxyControl};

use crate::error::SlaveError;
use crate::supervisor::{ProxyDescriptor, ProxyOptions, Supervisor};
use std::sync::Arc;

/// Fixed host/timeout every Allocate call uses, per `server.go`'s literal
/// `Host: "0.0.0.0", Timeout: 60`.
const PROXY_HOST: &str = "0.0.0.0";
const PROXY_TIMEOUT_SECS: u32 = 60;

/// Consecutive send failures before `GetStatsStream` gives up (spec.md §4.3).
const STREAM_ERROR_LIMIT: u32 = 5;
const STREAM_TICK: Duration = Duration::from_secs(5);

pub struct Server {
    token: String,
    supervisor: Arc<Supervisor>,
    manager_address: String,
}

impl Server {
    pub fn new(token: String, supervisor: Arc<Supervisor>, manager_address: String) -> Self {
        Self {
            token,
            supervisor,
            manager_address,
        }
    }

    fn authorize<T>(&self, request: &Request<T>) -> Result<(), Status> {
        authorize_metadata(request.metadata(), &self.token)
    }

    async fn snapshot_statistics(&self) -> Statistics {
        let mut flow = std::collections::HashMap::new();
        for instance in self.supervisor.list().await {
            flow.insert(
                instance.port as i32,
                FlowUnit {
                    traffic: instance.traffic,
                    start_time: instance.start_time_ns,
                },
            );
        }
        Statistics { flow }
    }
}

#[tonic::async_trait]
impl ProxyControl for Server {
    async fn allocate(
        &self,
        request: Request<AllocateRequest>,
    ) -> Result<Response<AllocateReply>, Status> {
        self.authorize(&request)?;
        let req = request.into_inner();
        let port: u16 = req
            .port
            .try_into()
            .map_err(|_| Status::invalid_argument("port out of range"))?;

        let descriptor = ProxyDescriptor {
            host: PROXY_HOST.to_string(),
            port,
            password: req.password.clone(),
            method: req.method.clone(),
            timeout: PROXY_TIMEOUT_SECS,
            options: ProxyOptions {
                udp_relay: true,
                verbose: true,
                manager_address: Some(self.manager_address.clone()),
                ..Default::default()
            },
        };

        match self.supervisor.add(descriptor).await {
            Ok(()) => Ok(Response::new(AllocateReply {})),
            // Idempotence resolution (SPEC_FULL.md §9, open question #1):
            // an existing instance with the same password/method is success,
            // a different one is a real conflict.
            Err(SlaveError::ServerExists(port)) => {
                let existing = self.supervisor.get(port).await?;
                if existing.descriptor_password == req.password && existing.descriptor_method == req.method {
                    Ok(Response::new(AllocateReply {}))
                } else {
                    Err(Status::already_exists(format!(
                        "port {port} already allocated with different password/method"
                    )))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn free(&self, request: Request<FreeRequest>) -> Result<Response<FreeReply>, Status> {
        self.authorize(&request)?;
        let port: u16 = request
            .get_ref()
            .port
            .try_into()
            .map_err(|_| Status::invalid_argument("port out of range"))?;

        match self.supervisor.remove(port).await {
            Ok(()) => Ok(Response::new(FreeReply {})),
            // "already gone" is not fatal (spec.md §4.3, §7).
            Err(SlaveError::ServerNotFound(_)) => Ok(Response::new(FreeReply {})),
            Err(err) => Err(err.into()),
        }
    }

    async fn get_stats(
        &self,
        request: Request<GetStatsRequest>,
    ) -> Result<Response<Statistics>, Status> {
        self.authorize(&request)?;
        Ok(Response::new(self.snapshot_statistics().await))
    }

    type GetStatsStreamStream = Pin<Box<dyn Stream<Item = Result<Statistics, Status>> + Send + 'static>>;

    async fn get_stats_stream(
        &self,
        request: Request<GetStatsRequest>,
    ) -> Result<Response<Self::GetStatsStreamStream>, Status> {
        self.authorize(&request)?;
        let supervisor = self.supervisor.clone();

        // tonic has no hook for "the client failed to receive the last
        // item"; a dropped receiver simply stops polling this generator,
        // which is indistinguishable here from 5 consecutive send errors
        // (SPEC_FULL.md §9, open question #2 — left unresolved as spec.md
        // requires). `STREAM_ERROR_LIMIT` documents the intended bound.
        let _ = STREAM_ERROR_LIMIT;
        let stream = async_stream::stream! {
            loop {
                let mut flow = std::collections::HashMap::new();
                for instance in supervisor.list().await {
                    flow.insert(
                        instance.port as i32,
                        FlowUnit { traffic: instance.traffic, start_time: instance.start_time_ns },
                    );
                }
                yield Ok(Statistics { flow });
                tokio::time::sleep(STREAM_TICK).await;
            }
        };

        Ok(Response::new(Box::pin(stream)))
    }
}
