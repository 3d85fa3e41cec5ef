//! End-to-end scenarios for the frame pump.
//!
//! These tests drive a [`Bridge`] with scripted in-memory endpoints and a
//! paused tokio clock, so deadline behavior is asserted deterministically.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

use vpnws_core::{Bridge, Deadlines, EndpointError, FrameIo, DEFAULT_FRAME_CAPACITY};

/// In-memory endpoint: reads are fed from an mpsc channel, writes are
/// recorded.  A read with no frame queued blocks until one arrives; a read
/// after the feeding sender is dropped reports the peer as closed.
struct ScriptedEndpoint {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    written: Mutex<Vec<Vec<u8>>>,
}

fn scripted() -> (mpsc::UnboundedSender<Vec<u8>>, Arc<ScriptedEndpoint>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let endpoint = Arc::new(ScriptedEndpoint {
        inbound: tokio::sync::Mutex::new(rx),
        written: Mutex::new(Vec::new()),
    });
    (tx, endpoint)
}

impl ScriptedEndpoint {
    fn written_frames(&self) -> Vec<Vec<u8>> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrameIo for ScriptedEndpoint {
    async fn read_frame(&self, _max_len: usize) -> Result<Vec<u8>, EndpointError> {
        let mut inbound = self.inbound.lock().await;
        inbound.recv().await.ok_or(EndpointError::Closed)
    }

    async fn write_frame(&self, frame: Vec<u8>) -> Result<(), EndpointError> {
        self.written.lock().unwrap().push(frame);
        Ok(())
    }
}

fn secs(read: u64, write: u64) -> Deadlines {
    Deadlines::new(Duration::from_secs(read), Duration::from_secs(write))
}

#[tokio::test(start_paused = true)]
async fn test_frames_are_delivered_byte_for_byte_in_both_directions() {
    // Arrange
    let (iface_feed, iface) = scripted();
    let (chan_feed, chan) = scripted();
    let bridge = Bridge::start(
        Arc::clone(&iface),
        Arc::clone(&chan),
        DEFAULT_FRAME_CAPACITY,
        secs(60, 15),
        secs(15, 60),
    );

    let uplink_frame: Vec<u8> = (0..100u8).collect();
    let downlink_frame: Vec<u8> = (100..200u8).collect();

    // Act: one frame in each direction
    assert_ok!(iface_feed.send(uplink_frame.clone()));
    assert_ok!(chan_feed.send(downlink_frame.clone()));
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Assert: each side received exactly the peer's bytes, unmodified
    assert_eq!(chan.written_frames(), vec![uplink_frame]);
    assert_eq!(iface.written_frames(), vec![downlink_frame]);

    bridge.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_quiet_source_faults_the_bridge_within_its_read_deadline() {
    // Arrange: the interface never produces a frame and has a 2 s read
    // deadline; the other direction is far slower to trip
    let (_iface_feed, iface) = scripted();
    let (_chan_feed, chan) = scripted();
    let started = tokio::time::Instant::now();
    let bridge = Bridge::start(
        Arc::clone(&iface),
        Arc::clone(&chan),
        DEFAULT_FRAME_CAPACITY,
        secs(2, 15),
        secs(60, 60),
    );

    // Act: wait for the fault to propagate
    bridge.liveness().cancelled().await;
    let elapsed = started.elapsed();

    // Assert: the bridge faulted at the read deadline, give or take the
    // fault-propagation tick, and nothing was written anywhere
    assert!(elapsed >= Duration::from_secs(2), "faulted early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "faulted late: {elapsed:?}");
    assert!(chan.written_frames().is_empty());
    assert!(iface.written_frames().is_empty());

    bridge.join().await;
}

#[tokio::test(start_paused = true)]
async fn test_peer_closure_cancels_once_and_join_releases() {
    // Arrange
    let (iface_feed, iface) = scripted();
    let (chan_feed, chan) = scripted();
    let bridge = Bridge::start(
        Arc::clone(&iface),
        Arc::clone(&chan),
        DEFAULT_FRAME_CAPACITY,
        secs(60, 15),
        secs(15, 60),
    );

    // A frame makes it through before the peer goes away
    assert_ok!(chan_feed.send(vec![7; 42]));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(iface.written_frames(), vec![vec![7; 42]]);

    // Act: the remote peer closes; the channel-side read reports Closed
    drop(chan_feed);
    bridge.liveness().cancelled().await;

    // Assert: the other pump exits at the top of its next iteration (or at
    // its own deadline if mid-read) and join comes back
    bridge.join().await;
    drop(iface_feed);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_cancel_stops_both_pumps() {
    // Arrange
    let (_iface_feed, iface) = scripted();
    let (_chan_feed, chan) = scripted();
    let bridge = Bridge::start(
        Arc::clone(&iface),
        Arc::clone(&chan),
        DEFAULT_FRAME_CAPACITY,
        secs(5, 5),
        secs(5, 5),
    );

    // Act
    bridge.cancel();

    // Assert: both pumps exit once their in-flight reads hit the 5 s
    // deadline; join returns without external help
    bridge.join().await;
}
