//! Application layer.
//!
//! The session controller enforces the open/close lifecycle over abstract
//! endpoints, and the driver runs it under a reconnect policy.  Nothing in
//! here does I/O directly.

pub mod driver;
pub mod session;

pub use session::{EndpointOpener, SessionController, SessionError, SessionState, TunnelOpener};
