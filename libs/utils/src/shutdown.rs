//! Cooperative shutdown signalling.
//!
//! spec.md §5: "Every long-running loop must accept a cancellation signal
//! and exit on receipt within one tick or one poll period." We express
//! that as a single [`tokio_util::sync::CancellationToken`] created at
//! startup and cloned into every background task; [`wait_for_signal`]
//! triggers it on SIGINT/SIGTERM.

use tokio_util::sync::CancellationToken;

/// Wait for a shutdown signal (Ctrl-C or SIGTERM) and cancel `token`.
///
/// Intended to be raced against a server's accept loop in `main`, e.g.
/// `tokio::select! { _ = wait_for_signal(token.clone()) => {}, _ = serve(...) => {} }`.
pub async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    token.cancel();
}
