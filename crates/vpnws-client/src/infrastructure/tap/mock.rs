//! In-memory TAP provider for tests and development.
//!
//! Behaves like the kernel's device table from the outside: names can be
//! occupied so opens fail, frames can be injected to show up on reads, and
//! everything the tunnel sends is recorded per device.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{DeviceError, TapHandle, TapProvider};

/// An in-memory TAP device.
pub struct MemoryTap {
    name: String,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: Mutex<Vec<Vec<u8>>>,
}

impl MemoryTap {
    /// Frames the tunnel has sent out of this device.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.outbound.lock().unwrap().clone()
    }
}

#[async_trait]
impl TapHandle for MemoryTap {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let mut inbound = self.inbound.lock().await;
        let frame = inbound
            .recv()
            .await
            .ok_or_else(|| DeviceError::Io("device feed closed".to_string()))?;
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }

    async fn send(&self, frame: &[u8]) -> Result<usize, DeviceError> {
        self.outbound.lock().unwrap().push(frame.to_vec());
        Ok(frame.len())
    }
}

#[derive(Default)]
struct ProviderState {
    occupied: HashSet<String>,
    feeders: HashMap<String, mpsc::UnboundedSender<Vec<u8>>>,
    handles: HashMap<String, Arc<MemoryTap>>,
}

/// An in-memory device table.
#[derive(Default)]
pub struct MemoryTapProvider {
    state: Mutex<ProviderState>,
}

impl MemoryTapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a device name as taken, as if another process owned it.
    pub fn occupy(&self, name: &str) {
        self.state.lock().unwrap().occupied.insert(name.to_string());
    }

    /// Queues a frame to arrive on the named device's next read.
    pub fn inject(&self, name: &str, frame: Vec<u8>) {
        if let Some(feeder) = self.state.lock().unwrap().feeders.get(name) {
            let _ = feeder.send(frame);
        }
    }

    /// The handle for an opened device, for inspecting sent frames.
    pub fn handle(&self, name: &str) -> Option<Arc<MemoryTap>> {
        self.state.lock().unwrap().handles.get(name).cloned()
    }
}

#[async_trait]
impl TapProvider for MemoryTapProvider {
    async fn open(&self, name: &str) -> Result<Arc<dyn TapHandle>, DeviceError> {
        let mut state = self.state.lock().unwrap();
        if state.occupied.contains(name) || state.handles.contains_key(name) {
            return Err(DeviceError::Open {
                name: name.to_string(),
                reason: "device busy".to_string(),
            });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let tap = Arc::new(MemoryTap {
            name: name.to_string(),
            inbound: tokio::sync::Mutex::new(rx),
            outbound: Mutex::new(Vec::new()),
        });
        state.feeders.insert(name.to_string(), tx);
        state.handles.insert(name.to_string(), Arc::clone(&tap));
        Ok(tap)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
