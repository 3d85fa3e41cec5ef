//! TAP virtual interface support.
//!
//! Platform specifics live behind the [`TapProvider`] capability trait,
//! chosen once at composition time in `main`.  The [`VirtualInterface`] on
//! top is platform-agnostic: it probes candidate device names, adapts the
//! open handle to the `vpnws-core` endpoint traits, and owns the close
//! lifecycle.

#[cfg(target_os = "linux")]
pub mod linux;
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use vpnws_core::{EndpointError, FrameIo, TunnelEndpoint};

/// How many candidate device names are probed: `{prefix}0` .. `{prefix}15`.
pub const MAX_DEVICE_CANDIDATES: usize = 16;

/// TAP device failures.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The interface has not been opened, or has already been closed.
    #[error("virtual interface is not open")]
    NotOpen,

    #[error("failed to open device '{name}': {reason}")]
    Open { name: String, reason: String },

    #[error("device i/o failed: {0}")]
    Io(String),
}

/// An open TAP device.
#[async_trait]
pub trait TapHandle: Send + Sync {
    /// The platform-assigned device name.
    fn name(&self) -> &str;

    /// Receives one frame into `buf`, returning its length.
    async fn recv(&self, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Sends one frame, returning the number of bytes written.
    async fn send(&self, frame: &[u8]) -> Result<usize, DeviceError>;
}

/// Platform capability for opening TAP devices by name.
#[async_trait]
pub trait TapProvider: Send + Sync {
    /// Opens the named device.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Open`] when the name is taken, the caller lacks
    /// privileges, or the platform refuses the device.
    async fn open(&self, name: &str) -> Result<Arc<dyn TapHandle>, DeviceError>;
}

/// Returns the TAP provider for the build target.
///
/// # Errors
///
/// On platforms without an implementation.
#[cfg(target_os = "linux")]
pub fn platform_provider() -> anyhow::Result<Arc<dyn TapProvider>> {
    Ok(Arc::new(linux::LinuxTapProvider::new()))
}

/// Returns the TAP provider for the build target.
///
/// # Errors
///
/// On platforms without an implementation.
#[cfg(not(target_os = "linux"))]
pub fn platform_provider() -> anyhow::Result<Arc<dyn TapProvider>> {
    anyhow::bail!("no TAP provider is available for this platform")
}

/// A TAP device adapted to the tunnel endpoint traits.
pub struct VirtualInterface {
    name: String,
    handle: Mutex<Option<Arc<dyn TapHandle>>>,
}

impl std::fmt::Debug for VirtualInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualInterface")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl VirtualInterface {
    /// Probes `{prefix}0` through `{prefix}15` and keeps the first device
    /// that opens.
    ///
    /// # Errors
    ///
    /// When every candidate fails, the last platform error is returned.
    pub async fn open(provider: &dyn TapProvider, prefix: &str) -> Result<Self, DeviceError> {
        let mut last: Option<DeviceError> = None;
        for i in 0..MAX_DEVICE_CANDIDATES {
            let candidate = format!("{prefix}{i}");
            match provider.open(&candidate).await {
                Ok(handle) => {
                    let name = handle.name().to_string();
                    info!("virtual interface {name} open");
                    return Ok(Self {
                        name,
                        handle: Mutex::new(Some(handle)),
                    });
                }
                Err(e) => {
                    debug!("device candidate {candidate} unavailable: {e}");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or(DeviceError::Open {
            name: prefix.to_string(),
            reason: "no candidate device names".to_string(),
        }))
    }

    /// The open device's name, as assigned by the platform.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clones the handle out so I/O happens without holding the lock.
    async fn current(&self) -> Result<Arc<dyn TapHandle>, EndpointError> {
        self.handle
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or(EndpointError::NotOpen)
    }
}

fn to_endpoint(e: DeviceError) -> EndpointError {
    match e {
        DeviceError::NotOpen => EndpointError::NotOpen,
        other => EndpointError::Io(other.to_string()),
    }
}

#[async_trait]
impl FrameIo for VirtualInterface {
    async fn read_frame(&self, max_len: usize) -> Result<Vec<u8>, EndpointError> {
        let handle = self.current().await?;
        let mut buf = vec![0u8; max_len];
        let n = handle.recv(&mut buf).await.map_err(to_endpoint)?;
        buf.truncate(n);
        Ok(buf)
    }

    async fn write_frame(&self, frame: Vec<u8>) -> Result<(), EndpointError> {
        let handle = self.current().await?;
        handle.send(&frame).await.map_err(to_endpoint)?;
        Ok(())
    }
}

#[async_trait]
impl TunnelEndpoint for VirtualInterface {
    fn endpoint_name(&self) -> String {
        self.name.clone()
    }

    /// Drops the interface's handle.  The device file descriptor closes
    /// when the last clone of the handle drops, which may be later if an
    /// abandoned read is still blocked on it.
    async fn close(&self) -> Result<(), EndpointError> {
        self.handle.lock().await.take();
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
