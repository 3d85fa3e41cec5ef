//! Tunnel session lifecycle.
//!
//! A session is one channel, one interface, and one running bridge.  The
//! [`SessionController`] owns the ordering rules around them:
//!
//! - open: channel first, then interface, then the before-connect hook,
//!   then the pumps, then the after-connect hook.  A failure part-way
//!   unwinds whatever already opened.
//! - close: before-disconnect hook, stop the pumps, close the channel,
//!   after-disconnect hook, close the interface, wait for the pumps.
//!
//! Only the before-connect hook and the interface close can fail a
//! lifecycle operation; every other step degrades to a warning so teardown
//! always runs to the end.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vpnws_core::{Bridge, Deadlines, TunnelEndpoint};

use crate::domain::{ChannelConfig, HookCommands, TunnelConfig};
use crate::infrastructure::channel::{ChannelError, SecureChannel};
use crate::infrastructure::hooks::{HookError, HookRunner};
use crate::infrastructure::tap::{DeviceError, TapProvider, VirtualInterface};

/// Where the controller is in the session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    /// A pump faulted; teardown has not started yet.
    Interrupted,
    /// Torn down after an interruption, waiting to open again.
    Reconnecting,
}

/// Session lifecycle failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("before-connect hook failed: {0}")]
    Hook(#[from] HookError),

    /// The interface did not close cleanly during teardown.
    #[error("session cleanup failed: {0}")]
    Cleanup(String),
}

/// Capability for opening the two tunnel endpoints.
///
/// The controller never constructs endpoints itself, which keeps the
/// lifecycle rules testable without a network or a TAP device.
#[async_trait]
pub trait EndpointOpener: Send + Sync {
    async fn open_channel(&self) -> Result<Arc<dyn TunnelEndpoint>, SessionError>;
    async fn open_interface(&self) -> Result<Arc<dyn TunnelEndpoint>, SessionError>;
}

/// Production opener: TLS WebSocket channel plus platform TAP device.
pub struct TunnelOpener {
    channel: ChannelConfig,
    provider: Arc<dyn TapProvider>,
    interface_prefix: String,
}

impl TunnelOpener {
    pub fn new(
        channel: ChannelConfig,
        provider: Arc<dyn TapProvider>,
        interface_prefix: String,
    ) -> Self {
        Self {
            channel,
            provider,
            interface_prefix,
        }
    }
}

#[async_trait]
impl EndpointOpener for TunnelOpener {
    async fn open_channel(&self) -> Result<Arc<dyn TunnelEndpoint>, SessionError> {
        let channel = SecureChannel::open(&self.channel).await?;
        Ok(Arc::new(channel))
    }

    async fn open_interface(&self) -> Result<Arc<dyn TunnelEndpoint>, SessionError> {
        let interface =
            VirtualInterface::open(self.provider.as_ref(), &self.interface_prefix).await?;
        Ok(Arc::new(interface))
    }
}

struct ActiveSession {
    id: Uuid,
    channel: Arc<dyn TunnelEndpoint>,
    interface: Arc<dyn TunnelEndpoint>,
    device: String,
    bridge: Bridge,
}

/// Owns at most one active session and enforces the lifecycle ordering.
pub struct SessionController {
    opener: Arc<dyn EndpointOpener>,
    hook_runner: Arc<dyn HookRunner>,
    hooks: HookCommands,
    buf_size: usize,
    uplink: Deadlines,
    downlink: Deadlines,
    state: SessionState,
    session: Option<ActiveSession>,
}

impl SessionController {
    pub fn new(
        opener: Arc<dyn EndpointOpener>,
        hook_runner: Arc<dyn HookRunner>,
        hooks: HookCommands,
        tunnel: &TunnelConfig,
    ) -> Self {
        Self {
            opener,
            hook_runner,
            hooks,
            buf_size: tunnel.buf_size,
            uplink: tunnel.uplink_deadlines(),
            downlink: tunnel.downlink_deadlines(),
            state: SessionState::Closed,
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Opens a session: both endpoints, the hooks, and the pumps.
    ///
    /// # Errors
    ///
    /// Channel open, interface open, and the before-connect hook are all
    /// fatal here.  Whatever opened before the failure is closed again, so
    /// an error leaves the controller exactly as it was.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Opening;
        let id = Uuid::new_v4();

        let channel = match self.opener.open_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                self.state = SessionState::Closed;
                return Err(e);
            }
        };

        let interface = match self.opener.open_interface().await {
            Ok(interface) => interface,
            Err(e) => {
                if let Err(close_err) = channel.close().await {
                    warn!("channel close during unwind failed: {close_err}");
                }
                self.state = SessionState::Closed;
                return Err(e);
            }
        };

        let device = interface.endpoint_name();

        if let Some(cmd) = &self.hooks.before_connect {
            if let Err(e) = self.hook_runner.run(cmd, &device).await {
                if let Err(close_err) = channel.close().await {
                    warn!("channel close during unwind failed: {close_err}");
                }
                if let Err(close_err) = interface.close().await {
                    warn!("interface close during unwind failed: {close_err}");
                }
                self.state = SessionState::Closed;
                return Err(e.into());
            }
        }

        let bridge = Bridge::start(
            Arc::clone(&interface),
            Arc::clone(&channel),
            self.buf_size,
            self.uplink,
            self.downlink,
        );
        info!(session = %id, device = %device, "tunnel session open");

        if let Some(cmd) = &self.hooks.after_connect {
            if let Err(e) = self.hook_runner.run(cmd, &device).await {
                warn!(device = %device, "after-connect hook failed: {e}");
            }
        }

        self.session = Some(ActiveSession {
            id,
            channel,
            interface,
            device,
            bridge,
        });
        self.state = SessionState::Open;
        Ok(())
    }

    /// Tears the session down.
    ///
    /// Safe to call on a controller that never opened.  Hook and channel
    /// failures during teardown are logged and skipped so the interface is
    /// always reached.
    ///
    /// # Errors
    ///
    /// [`SessionError::Cleanup`] when the interface refuses to close.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        let Some(session) = self.session.take() else {
            self.state = SessionState::Closed;
            return Ok(());
        };
        let ActiveSession {
            id,
            channel,
            interface,
            device,
            bridge,
        } = session;
        debug!(session = %id, "closing tunnel session");

        if let Some(cmd) = &self.hooks.before_disconnect {
            if let Err(e) = self.hook_runner.run(cmd, &device).await {
                warn!(device = %device, "before-disconnect hook failed: {e}");
            }
        }

        bridge.cancel();

        if let Err(e) = channel.close().await {
            warn!("channel close failed: {e}");
        }

        if let Some(cmd) = &self.hooks.after_disconnect {
            if let Err(e) = self.hook_runner.run(cmd, &device).await {
                warn!(device = %device, "after-disconnect hook failed: {e}");
            }
        }

        let cleanup = interface.close().await;
        bridge.join().await;
        self.state = SessionState::Closed;
        info!(session = %id, "tunnel session closed");

        cleanup.map_err(|e| SessionError::Cleanup(e.to_string()))
    }

    /// Resolves when the active session's bridge has faulted or been
    /// cancelled.  Pends forever when no session is active.
    pub async fn interrupted(&self) {
        match &self.session {
            Some(session) => {
                let liveness = session.bridge.liveness();
                liveness.cancelled().await;
            }
            None => std::future::pending().await,
        }
    }

    pub fn mark_interrupted(&mut self) {
        self.state = SessionState::Interrupted;
    }

    pub fn mark_reconnecting(&mut self) {
        self.state = SessionState::Reconnecting;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use vpnws_core::{EndpointError, FrameIo};

    type EventLog = Arc<Mutex<Vec<String>>>;

    fn events(log: &EventLog) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    /// Endpoint whose reads pend forever and whose close is recorded.
    struct RecordingEndpoint {
        name: &'static str,
        log: EventLog,
        closed: AtomicBool,
        fault_reads: bool,
    }

    impl RecordingEndpoint {
        fn new(name: &'static str, log: EventLog, fault_reads: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                log,
                closed: AtomicBool::new(false),
                fault_reads,
            })
        }
    }

    #[async_trait]
    impl FrameIo for RecordingEndpoint {
        async fn read_frame(&self, _max_len: usize) -> Result<Vec<u8>, EndpointError> {
            if self.closed.load(Ordering::SeqCst) {
                // Use-after-close shows up in the event log and trips the
                // exact-order assertions.
                self.log
                    .lock()
                    .unwrap()
                    .push(format!("violation:read:{}", self.name));
                return Err(EndpointError::NotOpen);
            }
            if self.fault_reads {
                return Err(EndpointError::Io("fault".into()));
            }
            std::future::pending().await
        }

        async fn write_frame(&self, _frame: Vec<u8>) -> Result<(), EndpointError> {
            if self.closed.load(Ordering::SeqCst) {
                self.log
                    .lock()
                    .unwrap()
                    .push(format!("violation:write:{}", self.name));
                return Err(EndpointError::NotOpen);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl TunnelEndpoint for RecordingEndpoint {
        fn endpoint_name(&self) -> String {
            self.name.to_string()
        }

        async fn close(&self) -> Result<(), EndpointError> {
            self.closed.store(true, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("close:{}", self.name));
            Ok(())
        }
    }

    /// Opener handing out recording endpoints, optionally failing one side.
    struct FakeOpener {
        log: EventLog,
        fail_interface: bool,
        fault_reads: bool,
    }

    #[async_trait]
    impl EndpointOpener for FakeOpener {
        async fn open_channel(&self) -> Result<Arc<dyn TunnelEndpoint>, SessionError> {
            Ok(RecordingEndpoint::new("channel", Arc::clone(&self.log), self.fault_reads))
        }

        async fn open_interface(&self) -> Result<Arc<dyn TunnelEndpoint>, SessionError> {
            if self.fail_interface {
                return Err(SessionError::Device(DeviceError::Open {
                    name: "tap0".to_string(),
                    reason: "busy".to_string(),
                }));
            }
            Ok(RecordingEndpoint::new("tap0", Arc::clone(&self.log), self.fault_reads))
        }
    }

    /// Hook runner that records every invocation; templates named "fail"
    /// report failure.
    struct RecordingHookRunner {
        log: EventLog,
    }

    #[async_trait]
    impl HookRunner for RecordingHookRunner {
        async fn run(&self, template: &str, device: &str) -> Result<(), HookError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("hook:{template}:{device}"));
            if template == "fail" {
                return Err(HookError::Spawn(std::io::Error::other("fail")));
            }
            Ok(())
        }
    }

    fn controller(
        log: &EventLog,
        hooks: HookCommands,
        fail_interface: bool,
        fault_reads: bool,
    ) -> SessionController {
        SessionController::new(
            Arc::new(FakeOpener {
                log: Arc::clone(log),
                fail_interface,
                fault_reads,
            }),
            Arc::new(RecordingHookRunner {
                log: Arc::clone(log),
            }),
            hooks,
            &TunnelConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_order_runs_hooks_channel_then_interface() {
        // Arrange
        let log = EventLog::default();
        let hooks = HookCommands {
            before_disconnect: Some("pre-down".to_string()),
            after_disconnect: Some("post-down".to_string()),
            ..HookCommands::default()
        };
        let mut controller = controller(&log, hooks, false, false);
        controller.open().await.unwrap();

        // Act
        controller.close().await.unwrap();

        // Assert: hooks bracket the channel close, interface closes last
        assert_eq!(
            events(&log),
            vec![
                "hook:pre-down:tap0",
                "close:channel",
                "hook:post-down:tap0",
                "close:tap0",
            ]
        );
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_runs_connect_hooks_around_the_pumps() {
        // Arrange
        let log = EventLog::default();
        let hooks = HookCommands {
            before_connect: Some("pre-up".to_string()),
            after_connect: Some("post-up".to_string()),
            ..HookCommands::default()
        };
        let mut controller = controller(&log, hooks, false, false);

        // Act
        controller.open().await.unwrap();

        // Assert: both hooks ran against the open device
        assert_eq!(events(&log), vec!["hook:pre-up:tap0", "hook:post-up:tap0"]);
        assert_eq!(controller.state(), SessionState::Open);
        controller.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_interface_failure_unwinds_the_channel() {
        // Arrange
        let log = EventLog::default();
        let mut controller = controller(&log, HookCommands::default(), true, false);

        // Act
        let result = controller.open().await;

        // Assert
        assert!(matches!(result, Err(SessionError::Device(_))));
        assert_eq!(events(&log), vec!["close:channel"]);
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_before_connect_hook_failure_unwinds_both_endpoints() {
        // Arrange
        let log = EventLog::default();
        let hooks = HookCommands {
            before_connect: Some("fail".to_string()),
            ..HookCommands::default()
        };
        let mut controller = controller(&log, hooks, false, false);

        // Act
        let result = controller.open().await;

        // Assert: the hook ran, then both endpoints closed, no session left
        assert!(matches!(result, Err(SessionError::Hook(_))));
        assert_eq!(
            events(&log),
            vec!["hook:fail:tap0", "close:channel", "close:tap0"]
        );
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_after_connect_hook_failure_does_not_abort_the_open() {
        // Arrange
        let log = EventLog::default();
        let hooks = HookCommands {
            after_connect: Some("fail".to_string()),
            ..HookCommands::default()
        };
        let mut controller = controller(&log, hooks, false, false);

        // Act / Assert
        controller.open().await.unwrap();
        assert_eq!(controller.state(), SessionState::Open);
        controller.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_on_a_never_opened_controller_succeeds() {
        let log = EventLog::default();
        let mut controller = controller(&log, HookCommands::default(), false, false);
        controller.close().await.unwrap();
        assert_eq!(controller.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_a_pump_fault_trips_interrupted() {
        // Arrange: endpoints whose reads fail immediately
        let log = EventLog::default();
        let mut controller = controller(&log, HookCommands::default(), false, true);
        controller.open().await.unwrap();

        // Act / Assert: the fault surfaces without any deadline elapsing
        tokio::time::timeout(Duration::from_secs(1), controller.interrupted())
            .await
            .expect("interruption should surface promptly");
        controller.close().await.unwrap();
    }
}
