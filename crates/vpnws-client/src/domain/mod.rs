//! Domain layer: plain configuration types with no I/O dependencies.

pub mod config;

pub use config::{ChannelConfig, HookCommands, KeepAliveConfig, TunnelConfig};
