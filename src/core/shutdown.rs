//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes on the first of:
//! - `SIGINT` (Ctrl-C in a terminal)
//! - `SIGTERM` (service managers, `kill`)
//! - `SIGQUIT`

use tokio::signal::unix::{SignalKind, signal};

/// Waits for a termination signal.
///
/// Each call registers its own listeners; `Err` means registration failed.
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    tracing::info!(signal = name, "termination signal");
    Ok(())
}
