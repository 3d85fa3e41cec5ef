//! Endpoint traits and per-direction deadlines.
//!
//! The tunnel engine is written against two small traits rather than concrete
//! transports.  [`FrameIo`] is what the pump loops need: read a frame, write a
//! frame.  [`TunnelEndpoint`] adds the lifecycle surface the session
//! controller needs on top: a name for logging and hook templating, and an
//! idempotent close.
//!
//! All methods take `&self` so a single endpoint can be shared between the
//! two pump directions behind an `Arc` without locking at the trait boundary.
//! Implementations guard their own interior state.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::EndpointError;

/// Default frame buffer capacity in bytes.
///
/// An Ethernet frame: 1500-byte MTU plus 14 bytes of header, 4 bytes of
/// 802.1Q VLAN tag, and 8 bytes of slack.
pub const DEFAULT_FRAME_CAPACITY: usize = 1526;

/// Independent read and write deadlines for one pump direction.
///
/// A fresh absolute deadline is armed per operation; deadlines are never
/// shared between concurrent operations and never reused across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    /// Maximum time a single read may take.
    pub read: Duration,
    /// Maximum time a single write may take.
    pub write: Duration,
}

impl Deadlines {
    pub fn new(read: Duration, write: Duration) -> Self {
        Self { read, write }
    }
}

/// A frame source and sink.
///
/// `read_frame` blocks until one whole frame is available and returns it;
/// `write_frame` blocks until the whole frame has been handed to the
/// transport.  Frames are opaque byte vectors.
#[async_trait]
pub trait FrameIo: Send + Sync {
    /// Reads one frame, at most `max_len` bytes.
    ///
    /// # Errors
    ///
    /// [`EndpointError::NotOpen`] if the endpoint is not open,
    /// [`EndpointError::Closed`] if the peer ended the connection, and
    /// [`EndpointError::Io`] for transport failures.
    async fn read_frame(&self, max_len: usize) -> Result<Vec<u8>, EndpointError>;

    /// Writes one frame in its entirety.
    ///
    /// # Errors
    ///
    /// Same contract as [`FrameIo::read_frame`].
    async fn write_frame(&self, frame: Vec<u8>) -> Result<(), EndpointError>;
}

/// A frame endpoint with a lifecycle.
#[async_trait]
pub trait TunnelEndpoint: FrameIo {
    /// A short name for log lines and hook command templating.
    ///
    /// For a virtual interface this is the platform-assigned device name
    /// (e.g. `tap0`); for the secure channel it is the remote URL.
    fn endpoint_name(&self) -> String;

    /// Releases the underlying transport.
    ///
    /// Closing is idempotent, and closing a never-opened or already-closed
    /// endpoint succeeds.  After close returns, subsequent reads and writes
    /// fail with [`EndpointError::NotOpen`].
    async fn close(&self) -> Result<(), EndpointError>;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
