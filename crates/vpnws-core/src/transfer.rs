//! The deadline-bounded read-then-write primitive.
//!
//! One transfer cycle reads a single frame from the source, then writes
//! exactly those bytes to the destination.  Each leg runs on its own spawned
//! task and is raced against a fresh `tokio::time::timeout`.  A cycle
//! succeeds only if both legs finish inside their deadlines.
//!
//! # Abandonment, not cancellation
//!
//! When a deadline expires the leg's `JoinHandle` is dropped.  The task keeps
//! running detached — an endpoint blocked in a read stays blocked — and its
//! eventual result is discarded.  The abandoned task owns nothing but its
//! frame buffer and an `Arc` of the endpoint, so the cost of each abandonment
//! is bounded by those two allocations.  There is no upper bound on how many
//! abandoned tasks can accumulate over the life of the process.

use std::sync::Arc;

use tokio::time::timeout;

use crate::error::{TransferError, TransferLeg};
use crate::io::{Deadlines, FrameIo};

/// Moves one frame from `src` to `dst`, honoring both deadlines.
///
/// Returns the number of bytes forwarded.  The write leg receives exactly
/// the bytes the read leg produced; a timeout on either leg aborts the cycle
/// before any partial write can happen.
///
/// # Errors
///
/// [`TransferError::Timeout`] when a leg misses its deadline,
/// [`TransferError::Endpoint`] when an endpoint fails, and
/// [`TransferError::TaskFailed`] when a leg's task panics.
pub async fn transfer_frame<S, D>(
    src: Arc<S>,
    dst: Arc<D>,
    max_len: usize,
    deadlines: Deadlines,
) -> Result<usize, TransferError>
where
    S: FrameIo + ?Sized + 'static,
    D: FrameIo + ?Sized + 'static,
{
    // Read leg.  The spawned task owns the frame it produces, so dropping
    // the handle on timeout leaves the task free to finish on its own.
    let reader = tokio::spawn({
        let src = Arc::clone(&src);
        async move { src.read_frame(max_len).await }
    });
    let frame = match timeout(deadlines.read, reader).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join)) => return Err(TransferError::TaskFailed(join.to_string())),
        Err(_) => {
            return Err(TransferError::Timeout {
                leg: TransferLeg::Read,
                deadline: deadlines.read,
            })
        }
    };

    // Write leg, same shape.  The frame moves into the task; on timeout it
    // is discarded along with whatever the endpoint eventually does with it.
    let len = frame.len();
    let writer = tokio::spawn({
        let dst = Arc::clone(&dst);
        async move { dst.write_frame(frame).await }
    });
    match timeout(deadlines.write, writer).await {
        Ok(Ok(result)) => result?,
        Ok(Err(join)) => return Err(TransferError::TaskFailed(join.to_string())),
        Err(_) => {
            return Err(TransferError::Timeout {
                leg: TransferLeg::Write,
                deadline: deadlines.write,
            })
        }
    }

    Ok(len)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
