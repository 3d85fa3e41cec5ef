//! # vpnws-core
//!
//! Transport-agnostic tunnel engine shared by the vpnws binaries.
//!
//! This crate knows nothing about sockets, TLS, or TAP devices.  It defines
//! the seams the client plugs its transports into, and the machinery that
//! moves frames between them:
//!
//! - **`io`** – The [`FrameIo`] and [`TunnelEndpoint`] traits implemented by
//!   both ends of the tunnel, and the per-direction [`Deadlines`] pair.
//!
//! - **`transfer`** – One read-then-write cycle with an independent deadline
//!   on each leg.  A leg that misses its deadline is abandoned, not aborted:
//!   the in-flight operation keeps running on its own task and its eventual
//!   result is discarded.
//!
//! - **`bridge`** – The bidirectional frame pump: two concurrent loops, one
//!   per direction, with cancel-once fault propagation and a join barrier.
//!
//! - **`backoff`** – The reconnect wait policy (1 s floor, doubling, 60 s
//!   ceiling, reset on success).
//!
//! # Why frames are opaque
//!
//! The tunnel carries raw Ethernet frames between a TAP device and a remote
//! WebSocket peer.  Nothing in this crate inspects a payload; a frame is a
//! `Vec<u8>` from the moment it is read until the moment it is written.

pub mod backoff;
pub mod bridge;
pub mod error;
pub mod io;
pub mod transfer;

// Re-export the most-used types at the crate root so callers can write
// `vpnws_core::Bridge` instead of `vpnws_core::bridge::Bridge`.
pub use backoff::ReconnectBackoff;
pub use bridge::Bridge;
pub use error::{EndpointError, TransferError, TransferLeg};
pub use io::{Deadlines, FrameIo, TunnelEndpoint, DEFAULT_FRAME_CAPACITY};
pub use transfer::transfer_frame;
