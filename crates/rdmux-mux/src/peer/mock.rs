//! Recording [`PeerSink`] used by unit and integration tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use rdmux_core::PixelFormat;

use crate::listener::Listener;
use crate::peer::{Peer, PeerError, PeerSink};

/// One recorded `full_update` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullUpdateCall {
    pub peer: Uuid,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// One recorded `partial_update` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialUpdateCall {
    pub peer: Uuid,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Default capture rate reported for peers without an explicit override.
const DEFAULT_CAPTURE_FPS: u32 = 30;

/// Records every sink call; `start` parks until [`shut_down`] is invoked,
/// which is how tests hold a listener in the `Running` state and later
/// release it.
///
/// [`shut_down`]: RecordingPeerSink::shut_down
pub struct RecordingPeerSink {
    full_updates: Mutex<Vec<FullUpdateCall>>,
    partial_updates: Mutex<Vec<PartialUpdateCall>>,
    capture_rates: Mutex<HashMap<Uuid, u32>>,
    fail_allocation: bool,
    stop_tx: watch::Sender<bool>,
}

impl RecordingPeerSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_options(false))
    }

    /// A sink whose `allocate` fails, for exercising the fatal construction
    /// path.
    pub fn failing_allocation() -> Arc<Self> {
        Arc::new(Self::with_options(true))
    }

    fn with_options(fail_allocation: bool) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            full_updates: Mutex::new(Vec::new()),
            partial_updates: Mutex::new(Vec::new()),
            capture_rates: Mutex::new(HashMap::new()),
            fail_allocation,
            stop_tx,
        }
    }

    /// Overrides the capture rate reported for one peer.
    pub fn set_capture_fps(&self, peer: Uuid, fps: u32) {
        self.capture_rates.lock().unwrap().insert(peer, fps);
    }

    /// Releases every parked `start` call, including ones that subscribe
    /// afterwards.
    pub fn shut_down(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn full_updates(&self) -> Vec<FullUpdateCall> {
        self.full_updates.lock().unwrap().clone()
    }

    pub fn partial_updates(&self) -> Vec<PartialUpdateCall> {
        self.partial_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl PeerSink for RecordingPeerSink {
    fn allocate(&self) -> Result<(), PeerError> {
        if self.fail_allocation {
            Err(PeerError::ServerAlloc("injected allocation failure".into()))
        } else {
            Ok(())
        }
    }

    async fn start(&self, _listener: Arc<Listener>) -> Result<(), PeerError> {
        let mut rx = self.stop_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        Ok(())
    }

    fn full_update(&self, peer: &Peer, width: u32, height: u32, format: PixelFormat) {
        self.full_updates.lock().unwrap().push(FullUpdateCall {
            peer: peer.id(),
            width,
            height,
            format,
        });
    }

    fn partial_update(&self, peer: &Peer, x: u32, y: u32, width: u32, height: u32) {
        self.partial_updates.lock().unwrap().push(PartialUpdateCall {
            peer: peer.id(),
            x,
            y,
            width,
            height,
        });
    }

    fn capture_fps(&self, peer: &Peer) -> u32 {
        self.capture_rates
            .lock()
            .unwrap()
            .get(&peer.id())
            .copied()
            .unwrap_or(DEFAULT_CAPTURE_FPS)
    }
}
