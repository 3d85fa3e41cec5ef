//! Error types shared by the tunnel engine.
//!
//! Endpoints (the TAP interface and the secure channel) surface
//! [`EndpointError`]; the transfer primitive wraps endpoint failures and its
//! own deadline expiries into [`TransferError`].

use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by a tunnel endpoint.
///
/// Both endpoint implementations map their transport-specific errors into
/// this enum so the pump loops can treat the two directions uniformly.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The endpoint has not been opened, or has already been closed.
    ///
    /// Calling read or write on an unopened endpoint is an error, never a
    /// panic.
    #[error("endpoint is not open")]
    NotOpen,

    /// The peer ended the connection (close frame or EOF).
    #[error("endpoint closed by peer")]
    Closed,

    /// Any other transport-level failure.
    #[error("endpoint i/o failed: {0}")]
    Io(String),
}

/// Which leg of a transfer cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferLeg {
    Read,
    Write,
}

impl std::fmt::Display for TransferLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferLeg::Read => write!(f, "read"),
            TransferLeg::Write => write!(f, "write"),
        }
    }
}

/// Failure of a single read-then-write cycle.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A leg did not finish inside its deadline.
    ///
    /// The in-flight operation was abandoned: it keeps running on its own
    /// task and its eventual result is discarded.
    #[error("{leg} deadline of {deadline:?} elapsed")]
    Timeout { leg: TransferLeg, deadline: Duration },

    /// The endpoint itself failed.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The task running a leg panicked or was cancelled externally.
    #[error("transfer task failed: {0}")]
    TaskFailed(String),
}

impl TransferError {
    /// Returns `true` when this is a deadline expiry rather than an
    /// endpoint or task failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransferError::Timeout { .. })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
