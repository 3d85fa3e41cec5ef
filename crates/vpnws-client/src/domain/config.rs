//! Tunnel client configuration.
//!
//! All of these are plain data.  They are filled in from the CLI in `main`,
//! validated there, and immutable once a session has been opened — a running
//! session never observes a configuration change.

use std::net::IpAddr;
use std::time::Duration;

use vpnws_core::{Deadlines, DEFAULT_FRAME_CAPACITY};

/// Settings for the secure channel to the remote endpoint.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Remote endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Value for the `Origin` handshake header.
    pub origin: String,
    /// HTTP Basic-Auth username.
    pub username: String,
    /// HTTP Basic-Auth password.
    pub password: String,
    /// Path to the PKCS#12 bundle holding the client key and certificate.
    pub pkcs12_path: String,
    /// Password protecting the PKCS#12 bundle.
    pub pkcs12_password: String,
    /// Tolerate an expired or otherwise invalid client certificate.
    pub skip_verify_client: bool,
    /// Do not verify the server's TLS certificate.
    pub skip_verify_server: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            origin: "http://localhost".to_string(),
            username: String::new(),
            password: String::new(),
            pkcs12_path: String::new(),
            pkcs12_password: String::new(),
            skip_verify_client: false,
            skip_verify_server: false,
        }
    }
}

/// Settings for the tunnel itself.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Candidate device names are `{prefix}0` through `{prefix}15`.
    pub interface_prefix: String,
    /// Frame buffer size shared by both pump directions.
    pub buf_size: usize,
    /// Read/write deadlines for the TAP interface.
    pub interface_deadlines: Deadlines,
    /// Read/write deadlines for the secure channel.
    pub channel_deadlines: Deadlines,
}

impl TunnelConfig {
    /// Deadlines for the interface → channel pump: an interface read
    /// followed by a channel write.
    pub fn uplink_deadlines(&self) -> Deadlines {
        Deadlines::new(self.interface_deadlines.read, self.channel_deadlines.write)
    }

    /// Deadlines for the channel → interface pump.
    pub fn downlink_deadlines(&self) -> Deadlines {
        Deadlines::new(self.channel_deadlines.read, self.interface_deadlines.write)
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            interface_prefix: "tap".to_string(),
            buf_size: DEFAULT_FRAME_CAPACITY,
            interface_deadlines: Deadlines::new(
                Duration::from_secs(60),
                Duration::from_secs(60),
            ),
            channel_deadlines: Deadlines::new(
                Duration::from_secs(15),
                Duration::from_secs(15),
            ),
        }
    }
}

/// Target and cadence of the ICMP keep-alive probe.
///
/// The probe is optional; a session runs fine without one.
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Host that receives the echo requests, typically a machine on the far
    /// side of the tunnel.
    pub host: IpAddr,
    /// Interval between echo requests.
    pub tick: Duration,
}

/// Shell command templates run at the four session lifecycle points.
///
/// `{{.dev}}` in a template is replaced with the open device name before the
/// command runs.  An unset slot is a no-op.
#[derive(Debug, Clone, Default)]
pub struct HookCommands {
    /// Runs after both endpoints open, before the pumps start.  Failure
    /// aborts the open.
    pub before_connect: Option<String>,
    /// Runs after the pumps start.  Failure is logged only.
    pub after_connect: Option<String>,
    /// Runs at the start of teardown.  Failure is logged only.
    pub before_disconnect: Option<String>,
    /// Runs after the channel is closed, before the interface is.  Failure
    /// is logged only.
    pub after_disconnect: Option<String>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channel_config_has_localhost_origin() {
        let config = ChannelConfig::default();
        assert_eq!(config.origin, "http://localhost");
        assert!(!config.skip_verify_client);
        assert!(!config.skip_verify_server);
    }

    #[test]
    fn test_default_tunnel_config_matches_wire_defaults() {
        let config = TunnelConfig::default();
        assert_eq!(config.interface_prefix, "tap");
        assert_eq!(config.buf_size, 1526);
        assert_eq!(config.interface_deadlines.read, Duration::from_secs(60));
        assert_eq!(config.channel_deadlines.read, Duration::from_secs(15));
    }

    #[test]
    fn test_uplink_deadlines_mix_interface_read_with_channel_write() {
        // Arrange
        let config = TunnelConfig {
            interface_deadlines: Deadlines::new(
                Duration::from_secs(60),
                Duration::from_secs(50),
            ),
            channel_deadlines: Deadlines::new(
                Duration::from_secs(15),
                Duration::from_secs(10),
            ),
            ..TunnelConfig::default()
        };

        // Act / Assert: each pump reads one device and writes the other
        assert_eq!(
            config.uplink_deadlines(),
            Deadlines::new(Duration::from_secs(60), Duration::from_secs(10))
        );
        assert_eq!(
            config.downlink_deadlines(),
            Deadlines::new(Duration::from_secs(15), Duration::from_secs(50))
        );
    }

    #[test]
    fn test_hook_commands_default_to_no_ops() {
        let hooks = HookCommands::default();
        assert!(hooks.before_connect.is_none());
        assert!(hooks.after_connect.is_none());
        assert!(hooks.before_disconnect.is_none());
        assert!(hooks.after_disconnect.is_none());
    }
}
