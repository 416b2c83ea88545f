//! Slave binary entry point.
//!
//! Startup sequence follows spec.md §4.3's strict order, grounded on
//! `examples/original_source/slave/cli/slave.go`'s `run`: (1) bind the UDP
//! stats socket, (2) `Restore`, (3) bind the TCP RPC socket, (4) serve.
//! Graceful shutdown stops accepting RPCs, drains in-flight calls, then
//! `CleanUp`s every instance.

mod config;
mod error;
mod rpc_server;
mod stats;
mod supervisor;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server as TonicServer;

use config::Config;
use proxy_control_proto::ProxyControlServer;
use supervisor::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "slave", about = "Proxy fleet control plane slave agent")]
struct Cli {
    #[arg(short = 'c', long = "config", default_value = "config.json")]
    config: PathBuf,

    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    utils::logging::init(cli.verbose);

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    let udp_socket = stats::bind(config.manager_port)
        .await
        .context("failed to bind UDP stats socket")?;

    let manager_address = format!("127.0.0.1:{}", config.manager_port);
    let (supervisor, mut exhausted_rx) = Supervisor::new(config.run_root.clone(), manager_address.clone());
    let supervisor = Arc::new(supervisor);

    supervisor
        .restore()
        .await
        .context("failed to restore proxy instances")?;

    let tcp_addr = format!("0.0.0.0:{}", config.port)
        .parse()
        .context("invalid RPC listen address")?;

    let cancel = CancellationToken::new();
    tokio::spawn(utils::shutdown::wait_for_signal(cancel.clone()));

    let rpc_service = rpc_server::Server::new(config.token.clone(), supervisor.clone(), manager_address);

    let stats_cancel = cancel.clone();
    let stats_supervisor = supervisor.clone();
    let stats_task = tokio::spawn(async move {
        if let Err(err) = stats::serve(udp_socket, stats_supervisor, stats_cancel).await {
            tracing::error!(error = %err, "stats ingester exited with error");
        }
    });

    let exhausted_supervisor = supervisor.clone();
    let exhausted_task = tokio::spawn(async move {
        while let Some(port) = exhausted_rx.recv().await {
            tracing::error!(port, "supervisor exhausted restart attempts, dropping instance");
            if let Err(err) = exhausted_supervisor.remove(port).await {
                tracing::warn!(port, error = %err, "failed to drop exhausted instance");
            }
        }
    });

    tracing::info!(addr = %tcp_addr, "starting RPC server");
    let serve_cancel = cancel.clone();
    TonicServer::builder()
        .add_service(ProxyControlServer::new(rpc_service))
        .serve_with_shutdown(tcp_addr, async move {
            serve_cancel.cancelled().await;
        })
        .await
        .context("RPC server error")?;

    cancel.cancel();
    let _ = stats_task.await;
    exhausted_task.abort();

    tracing::info!("draining in-flight instances");
    supervisor.clean_up().await;

    tracing::info!("slave shut down");
    Ok(())
}
