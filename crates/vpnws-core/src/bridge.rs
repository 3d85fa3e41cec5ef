//! The bidirectional frame pump.
//!
//! A [`Bridge`] runs two concurrent loops: interface → channel and
//! channel → interface.  Each endpoint is read by exactly one loop and
//! written by the other, so the directions never contend on a lock inside
//! this module.
//!
//! # Fault propagation
//!
//! The first loop to hit an error (deadline expiry or endpoint failure)
//! cancels the shared token exactly once.  The other loop observes the
//! cancellation at the top of its next iteration — an in-flight transfer is
//! never interrupted, it runs to completion or to its own deadline.
//! [`Bridge::join`] blocks until both loops have exited, which is the
//! barrier the session controller closes behind.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::io::{Deadlines, FrameIo};
use crate::transfer::transfer_frame;

/// A running pair of pump loops.
pub struct Bridge {
    cancel: CancellationToken,
    uplink: JoinHandle<()>,
    downlink: JoinHandle<()>,
}

impl Bridge {
    /// Spawns the two pump loops.
    ///
    /// `uplink` deadlines apply to interface reads and channel writes;
    /// `downlink` deadlines apply to channel reads and interface writes.
    pub fn start<I, C>(
        interface: Arc<I>,
        channel: Arc<C>,
        buf_size: usize,
        uplink: Deadlines,
        downlink: Deadlines,
    ) -> Self
    where
        I: FrameIo + ?Sized + 'static,
        C: FrameIo + ?Sized + 'static,
    {
        let cancel = CancellationToken::new();

        let up = tokio::spawn(pump(
            "interface -> channel",
            Arc::clone(&interface),
            Arc::clone(&channel),
            buf_size,
            uplink,
            cancel.clone(),
        ));
        let down = tokio::spawn(pump(
            "channel -> interface",
            channel,
            interface,
            buf_size,
            downlink,
            cancel.clone(),
        ));

        Self {
            cancel,
            uplink: up,
            downlink: down,
        }
    }

    /// A token that fires when either pump loop has faulted or
    /// [`Bridge::cancel`] was called.
    pub fn liveness(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Asks both loops to stop at the top of their next iteration.
    ///
    /// Safe to call any number of times and concurrently with a pump fault.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits until both pump loops have exited.
    ///
    /// A loop blocked mid-transfer exits after that transfer completes or
    /// hits its deadline, so this waits at most one deadline per direction.
    pub async fn join(self) {
        let _ = self.uplink.await;
        let _ = self.downlink.await;
    }
}

/// One pump direction: read from `src`, write to `dst`, repeat until a
/// transfer fails or the shared token is cancelled.
async fn pump<S, D>(
    label: &'static str,
    src: Arc<S>,
    dst: Arc<D>,
    buf_size: usize,
    deadlines: Deadlines,
    cancel: CancellationToken,
) where
    S: FrameIo + ?Sized + 'static,
    D: FrameIo + ?Sized + 'static,
{
    debug!("{label} pump started");
    loop {
        // Cancellation is only checked here, between cycles.
        if cancel.is_cancelled() {
            break;
        }
        match transfer_frame(Arc::clone(&src), Arc::clone(&dst), buf_size, deadlines).await {
            Ok(len) => trace!("{label}: forwarded {len} byte frame"),
            Err(e) => {
                warn!("{label}: {e}");
                cancel.cancel();
                break;
            }
        }
    }
    debug!("{label} pump stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
