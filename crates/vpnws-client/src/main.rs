//! vpnws client — entry point.
//!
//! Bridges a local TAP virtual interface with a remote endpoint over a TLS
//! WebSocket, so two Ethernet segments behave as one.  Everything interesting
//! happens in the library crate; this binary parses the command line, wires
//! the adapters together, and runs the reconnect driver until a shutdown
//! signal arrives.
//!
//! # Usage
//!
//! ```text
//! vpnws-client [OPTIONS] <URL>
//!
//! Arguments:
//!   <URL>   Remote endpoint URL (ws://host/path or wss://host/path)
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be set through an environment variable; CLI
//! arguments take precedence when both are present.
//!
//! | Variable               | Default            | Description                       |
//! |------------------------|--------------------|-----------------------------------|
//! | `VPNWS_ORIGIN`         | `http://localhost` | Origin handshake header           |
//! | `VPNWS_USERNAME`       | *(empty)*          | Basic-Auth username               |
//! | `VPNWS_PASSWORD`       | *(empty)*          | Basic-Auth password               |
//! | `VPNWS_PKCS12_FILE`    | *(empty)*          | Client certificate bundle path    |
//! | `VPNWS_PKCS12_PASS`    | *(empty)*          | Client certificate bundle secret  |
//! | `VPNWS_INTERFACE`      | `tap`              | Device name prefix                |
//! | `VPNWS_KEEPALIVE_HOST` | *(unset)*          | ICMP keep-alive target            |
//!
//! # Process lifecycle
//!
//! 1. Logging is initialised from `RUST_LOG`, falling back to `info`.
//! 2. The CLI is parsed and validated into the domain configuration types.
//! 3. A signal task cancels the shutdown token on Ctrl+C or SIGTERM.
//! 4. The reconnect driver opens the session and keeps it alive under
//!    exponential backoff until shutdown.
//!
//! The process exits 0 after a clean shutdown and 1 when the initial open or
//! the final teardown fails.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vpnws_client::application::{driver, SessionController, TunnelOpener};
use vpnws_client::domain::{ChannelConfig, HookCommands, KeepAliveConfig, TunnelConfig};
use vpnws_client::infrastructure::keepalive;
use vpnws_client::infrastructure::tap::platform_provider;
use vpnws_client::infrastructure::ShellHookRunner;
use vpnws_core::{Deadlines, ReconnectBackoff, DEFAULT_FRAME_CAPACITY};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Layer-2 VPN client tunneling Ethernet frames over a TLS WebSocket.
#[derive(Debug, Parser)]
#[command(
    name = "vpnws-client",
    about = "Bridges a TAP virtual interface with a remote WebSocket endpoint",
    version
)]
struct Cli {
    /// Remote endpoint URL (`ws://` or `wss://`).
    url: Option<String>,

    /// Value for the `Origin` WebSocket handshake header.
    #[arg(long, default_value = "http://localhost", env = "VPNWS_ORIGIN")]
    origin: String,

    /// HTTP Basic-Auth username.
    #[arg(long, default_value = "", env = "VPNWS_USERNAME")]
    username: String,

    /// HTTP Basic-Auth password.
    #[arg(long, default_value = "", env = "VPNWS_PASSWORD")]
    password: String,

    /// Path to the PKCS#12 bundle holding the client key and certificate.
    ///
    /// Required: the remote endpoint always authenticates clients by
    /// certificate.
    #[arg(long, default_value = "", env = "VPNWS_PKCS12_FILE")]
    pkcs12_file: String,

    /// Password protecting the PKCS#12 bundle.
    #[arg(long, default_value = "", env = "VPNWS_PKCS12_PASS")]
    pkcs12_file_pass: String,

    /// Tolerate an expired or otherwise invalid client certificate.
    ///
    /// The certificate is still presented to the server; this only stops the
    /// client from refusing to start with it.
    #[arg(long)]
    skip_verify_client: bool,

    /// Do not verify the server's TLS certificate.
    #[arg(long)]
    skip_verify_server: bool,

    /// Device name prefix; `{prefix}0` through `{prefix}15` are probed.
    #[arg(short, long, default_value = "tap", env = "VPNWS_INTERFACE")]
    interface: String,

    /// Shell command run after both endpoints open, before traffic flows.
    /// `{{.dev}}` is replaced with the device name.  Failure aborts the open.
    #[arg(long, env = "VPNWS_CMD_BEFORE_CONNECT")]
    cmd_before_connect: Option<String>,

    /// Shell command run once traffic is flowing.  Failure is logged only.
    #[arg(long, env = "VPNWS_CMD_AFTER_CONNECT")]
    cmd_after_connect: Option<String>,

    /// Shell command run at the start of teardown.  Failure is logged only.
    #[arg(long, env = "VPNWS_CMD_BEFORE_DISCONNECT")]
    cmd_before_disconnect: Option<String>,

    /// Shell command run after the channel closes, before the interface
    /// does.  Failure is logged only.
    #[arg(long, env = "VPNWS_CMD_AFTER_DISCONNECT")]
    cmd_after_disconnect: Option<String>,

    /// Frame buffer size in bytes for both tunnel directions.
    #[arg(long, default_value_t = DEFAULT_FRAME_CAPACITY, env = "VPNWS_BUF_SIZE")]
    buf_size: usize,

    /// Host to ping through the tunnel to keep NAT and firewall state warm.
    /// The probe is disabled when unset.
    #[arg(long, env = "VPNWS_KEEPALIVE_HOST")]
    keep_alive_host: Option<IpAddr>,

    /// Seconds between keep-alive pings.
    #[arg(long, default_value_t = 5, env = "VPNWS_KEEPALIVE_TICK")]
    keep_alive_tick: u64,

    /// Read deadline on the TAP interface, in seconds.
    #[arg(long, default_value_t = 60, env = "VPNWS_TAP_READ_TIMEOUT")]
    tap_read_timeout: u64,

    /// Write deadline on the TAP interface, in seconds.
    #[arg(long, default_value_t = 60, env = "VPNWS_TAP_WRITE_TIMEOUT")]
    tap_write_timeout: u64,

    /// Read deadline on the WebSocket channel, in seconds.
    #[arg(long, default_value_t = 15, env = "VPNWS_WS_READ_TIMEOUT")]
    ws_read_timeout: u64,

    /// Write deadline on the WebSocket channel, in seconds.
    #[arg(long, default_value_t = 15, env = "VPNWS_WS_WRITE_TIMEOUT")]
    ws_write_timeout: u64,
}

/// Everything the wiring in `main` needs, converted and validated.
struct ClientSettings {
    channel: ChannelConfig,
    tunnel: TunnelConfig,
    hooks: HookCommands,
    keep_alive: Option<KeepAliveConfig>,
}

impl Cli {
    /// Converts the parsed arguments into the domain configuration types.
    ///
    /// # Errors
    ///
    /// When the URL is missing or does not use a WebSocket scheme.
    fn into_settings(self) -> anyhow::Result<ClientSettings> {
        let url = self.url.context("a remote endpoint URL is required")?;
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            anyhow::bail!("remote endpoint URL must use the ws:// or wss:// scheme, got '{url}'");
        }

        let channel = ChannelConfig {
            url,
            origin: self.origin,
            username: self.username,
            password: self.password,
            pkcs12_path: self.pkcs12_file,
            pkcs12_password: self.pkcs12_file_pass,
            skip_verify_client: self.skip_verify_client,
            skip_verify_server: self.skip_verify_server,
        };

        let tunnel = TunnelConfig {
            interface_prefix: self.interface,
            buf_size: self.buf_size,
            interface_deadlines: Deadlines::new(
                Duration::from_secs(self.tap_read_timeout),
                Duration::from_secs(self.tap_write_timeout),
            ),
            channel_deadlines: Deadlines::new(
                Duration::from_secs(self.ws_read_timeout),
                Duration::from_secs(self.ws_write_timeout),
            ),
        };

        let hooks = HookCommands {
            before_connect: self.cmd_before_connect,
            after_connect: self.cmd_after_connect,
            before_disconnect: self.cmd_before_disconnect,
            after_disconnect: self.cmd_after_disconnect,
        };

        let keep_alive = self.keep_alive_host.map(|host| KeepAliveConfig {
            host,
            tick: Duration::from_secs(self.keep_alive_tick),
        });

        Ok(ClientSettings {
            channel,
            tunnel,
            hooks,
            keep_alive,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if cli.url.is_none() {
        Cli::command().print_help()?;
        std::process::exit(1);
    }
    let settings = cli.into_settings()?;

    info!(
        url = %settings.channel.url,
        interface = %settings.tunnel.interface_prefix,
        "vpnws client starting"
    );

    // ── Shutdown signal handling ──────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        signal_token.cancel();
    });

    // ── Wiring ────────────────────────────────────────────────────────────────
    let provider = platform_provider()?;
    let opener = Arc::new(TunnelOpener::new(
        settings.channel,
        provider,
        settings.tunnel.interface_prefix.clone(),
    ));
    let mut controller = SessionController::new(
        opener,
        Arc::new(ShellHookRunner::new()),
        settings.hooks,
        &settings.tunnel,
    );

    if let Some(config) = settings.keep_alive {
        tokio::spawn(keepalive::run(config, shutdown.clone()));
    }

    driver::run(&mut controller, ReconnectBackoff::default(), shutdown).await?;

    info!("vpnws client stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!("failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
