//! # vpnws-client
//!
//! VPN-over-WebSocket tunnel client.  Bridges a local TAP virtual network
//! interface with a remote endpoint over a TLS-secured WebSocket, so two
//! Ethernet segments behave as one across the public internet.
//!
//! The crate follows a clean-architecture layering:
//!
//! - **`domain`** – Plain configuration types: the channel settings, the
//!   tunnel settings, and the lifecycle hook command slots.  No I/O.
//!
//! - **`application`** – The session state machine and the reconnect driver.
//!   Written against the `vpnws-core` traits and the [`application::session::EndpointOpener`]
//!   seam, so it is testable without a network or a TAP device.
//!
//! - **`infrastructure`** – The real transports: the rustls/tungstenite
//!   secure channel, the `/dev/net/tun` TAP provider, the shell hook runner,
//!   and the ICMP keep-alive probe.
//!
//! The heavy lifting (frame pump, deadlines, backoff) lives in `vpnws-core`;
//! this crate supplies endpoints and policy.

pub mod application;
pub mod domain;
pub mod infrastructure;
