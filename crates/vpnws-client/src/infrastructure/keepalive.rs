//! Periodic ICMP keep-alive probe.
//!
//! Some network paths expire idle tunnel state (NAT bindings, stateful
//! firewall entries) faster than real traffic arrives.  Pinging a host
//! through the tunnel on a fixed tick keeps those entries warm.  Probe
//! failures are logged and never affect the tunnel session.

use surge_ping::{Client, Config, IcmpPacket, PingIdentifier, PingSequence};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::KeepAliveConfig;

const PROBE_PAYLOAD: &[u8] = &[0u8; 56];

/// Runs the keep-alive probe loop until shutdown.
pub async fn run(config: KeepAliveConfig, shutdown: CancellationToken) {
    let client = match Client::new(&Config::default()) {
        Ok(client) => client,
        Err(e) => {
            warn!("keep-alive disabled, cannot create ICMP client: {e}");
            return;
        }
    };

    let ident = PingIdentifier(std::process::id() as u16);
    let mut pinger = client.pinger(config.host, ident).await;
    pinger.timeout(config.tick);

    info!(host = %config.host, tick = ?config.tick, "keep-alive probe started");

    let mut interval = tokio::time::interval(config.tick);
    let mut seq: u16 = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("keep-alive probe stopping");
                return;
            }
            _ = interval.tick() => {}
        }

        match pinger.ping(PingSequence(seq), PROBE_PAYLOAD).await {
            Ok((packet, rtt)) => {
                let size = match &packet {
                    IcmpPacket::V4(p) => p.get_size(),
                    IcmpPacket::V6(p) => p.get_size(),
                };
                debug!(size, seq = seq, ?rtt, "keep-alive reply");
            }
            Err(e) => {
                warn!(host = %config.host, seq = seq, "keep-alive probe failed: {e}");
            }
        }
        seq = seq.wrapping_add(1);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // ICMP needs raw sockets; only the shutdown path is testable without
    // privileges.  An unprivileged environment makes Client::new fail, which
    // returns immediately, and a privileged one exits on the first cancelled
    // select arm.

    #[tokio::test]
    async fn test_probe_loop_stops_on_shutdown() {
        // Arrange
        let config = KeepAliveConfig {
            host: "127.0.0.1".parse().unwrap(),
            tick: Duration::from_secs(5),
        };
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        // Act / Assert: returns rather than looping forever
        tokio::time::timeout(Duration::from_secs(10), run(config, shutdown))
            .await
            .expect("probe loop should exit promptly");
    }
}
