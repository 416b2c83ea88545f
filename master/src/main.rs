//! Master binary entry point.
//!
//! Startup sequence mirrors `examples/original_source/master/main.go`'s
//! `main`: parse config, open the DB, dial slaves, garbage-collect stale
//! allocations, materialize allocations for active users, then run the
//! reconciliation loop until shutdown. The web admin/login surface
//! (`web.go`) is out of scope per spec.md §1 and is not started here.

mod config;
mod context;
mod db;
mod error;
mod reconcile;
mod rpc_client;
mod scheduler;
mod users;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use diesel_migrations::MigrationHarness;
use tokio_util::sync::CancellationToken;

use config::Config;
use context::Context;
use db::Store;

#[derive(Parser, Debug)]
#[command(name = "master", about = "Proxy fleet control plane master")]
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

    let pool = db::build_pool(&config.database.args).context("failed to build database pool")?;
    {
        let mut conn = pool.get().context("failed to acquire database connection")?;
        conn.run_pending_migrations(db::MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    }
    let store = Store::new(pool);

    let mut ctx = Context::new(&config, store)
        .await
        .context("failed to initialize runtime context")?;

    let valid_worker_ids: Vec<String> = ctx.slaves.keys().cloned().collect();
    let removed = ctx
        .store
        .delete_allocations_not_in_workers(&valid_worker_ids)
        .context("failed to clean up stale allocations")?;
    if removed > 0 {
        tracing::info!(removed, "cleaned up allocations for unknown workers");
    }

    users::allocate_all_users(&ctx).context("failed to materialize allocations at startup")?;

    let cancel = CancellationToken::new();
    tokio::spawn(utils::shutdown::wait_for_signal(cancel.clone()));
    let interval = std::time::Duration::from_secs(config.interval);

    reconcile::run(&mut ctx, interval, cancel).await;

    tracing::info!("master shut down");
    Ok(())
}
