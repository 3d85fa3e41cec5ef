//! The reconnect driver.
//!
//! Runs one session at a time and reacts to exactly two events: an external
//! shutdown request, which tears the session down and returns, and a session
//! interruption, which tears down and reopens under exponential backoff.
//! The backoff resets as soon as a reconnect succeeds, so a long-stable
//! tunnel that drops again starts waiting from the floor.
//!
//! The first open is special: there is nothing to fall back to yet, so a
//! failure propagates to the caller instead of entering the retry loop.

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vpnws_core::ReconnectBackoff;

use crate::application::session::SessionController;

enum Wake {
    Shutdown,
    Interrupted,
}

/// Runs the session until shutdown.
///
/// # Errors
///
/// When the initial open fails, or when a shutdown-path teardown fails.
pub async fn run(
    controller: &mut SessionController,
    mut backoff: ReconnectBackoff,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    controller
        .open()
        .await
        .context("failed to open tunnel session")?;

    loop {
        let wake = tokio::select! {
            _ = shutdown.cancelled() => Wake::Shutdown,
            _ = controller.interrupted() => Wake::Interrupted,
        };

        match wake {
            Wake::Shutdown => {
                info!("shutdown requested");
                controller
                    .close()
                    .await
                    .context("failed to close tunnel session")?;
                return Ok(());
            }
            Wake::Interrupted => {
                warn!("tunnel session interrupted");
                controller.mark_interrupted();
                // Teardown failures cannot stop the reconnect cycle.
                if let Err(e) = controller.close().await {
                    warn!("teardown after interruption failed: {e}");
                }
                controller.mark_reconnecting();

                loop {
                    let wait = backoff.next_wait();
                    info!(?wait, "waiting before reconnect");
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!("shutdown requested during reconnect wait");
                            // No session is live here; close settles the
                            // controller state at Closed.
                            controller
                                .close()
                                .await
                                .context("failed to close tunnel session")?;
                            return Ok(());
                        }
                        _ = tokio::time::sleep(wait) => {}
                    }
                    match controller.open().await {
                        Ok(()) => {
                            backoff.reset();
                            info!("tunnel session reestablished");
                            break;
                        }
                        Err(e) => warn!("reconnect attempt failed: {e}"),
                    }
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
