//! Per-VM listener: framebuffer lifecycle, peer registry, and the
//! update/ack handshake with the shim.
//!
//! One `Listener` exists per VM and owns everything that VM's remote-desktop
//! sessions need: the shared-memory framebuffer mapping, the set of
//! connected peers, and the pacing state that throttles the shim. Incoming
//! shim events are dispatched through [`Listener::on_incoming`]; client
//! input flows back out through [`Listener::send_mouse`] /
//! [`Listener::send_keyboard`] onto the worker's outbound queue.
//!
//! # Lifecycle
//!
//! ```text
//! Created --run()--> Running --stop signal--> Stopping --cleanup--> Stopped
//! ```
//!
//! The stop signal is a `Shutdown` event from the shim or the peer server
//! exiting. Once the stop flag is set, `on_incoming` is a no-op; the
//! framebuffer mapping is released when the listener drops.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use rdmux_core::{FrameRatePacer, MuxEvent, PixelFormat};

use crate::framebuffer::{Framebuffer, FRAMEBUFFER_BYTES};
use crate::peer::{Peer, PeerError, PeerSink};
use crate::worker::{OutboundError, OutboundSender};

/// Lifecycle state of a [`Listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// Constructed; the peer server has not been started.
    Created,
    /// `run()` is blocked inside the peer server.
    Running,
    /// A stop signal was received; the peer server is winding down.
    Stopping,
    /// The peer server has exited. No further events are dispatched.
    Stopped,
}

/// Per-VM listener state. Shared as `Arc<Listener>` between the worker's
/// registry, the run task, and the peer sink.
pub struct Listener {
    uuid: String,
    vm_id: u32,
    port: u16,

    sink: Arc<dyn PeerSink>,
    outbound: OutboundSender,

    state: Mutex<ListenerState>,
    stop: AtomicBool,

    authenticating: AtomicBool,
    credential_path: Mutex<String>,

    framebuffer: Mutex<Option<Framebuffer>>,
    // Dimensions and format are read by peers without locking; whole-word
    // atomic stores during DisplaySwitch keep them coherent.
    width: AtomicU32,
    height: AtomicU32,
    format: AtomicU32,

    peers: Mutex<Vec<Arc<Peer>>>,
    pacer: Mutex<FrameRatePacer>,
}

impl Listener {
    /// Constructs a listener in state `Created` with no framebuffer mapped
    /// and the target frame rate at its initial ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::ServerAlloc`] if the backing peer server cannot
    /// be allocated; the listener cannot exist without it.
    pub fn new(
        uuid: impl Into<String>,
        vm_id: u32,
        port: u16,
        auth: bool,
        sink: Arc<dyn PeerSink>,
        outbound: OutboundSender,
    ) -> Result<Self, PeerError> {
        sink.allocate()?;

        Ok(Self {
            uuid: uuid.into(),
            vm_id,
            port,
            sink,
            outbound,
            state: Mutex::new(ListenerState::Created),
            stop: AtomicBool::new(false),
            authenticating: AtomicBool::new(auth),
            credential_path: Mutex::new(String::new()),
            framebuffer: Mutex::new(None),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            format: AtomicU32::new(0),
            peers: Mutex::new(Vec::new()),
            pacer: Mutex::new(FrameRatePacer::new()),
        })
    }

    /// Runs the peer server until it exits, then transitions to `Stopped`.
    ///
    /// The worker's registration task awaits this and unregisters the VM
    /// when it returns, so a returning `run` is the listener's
    /// self-destruction trigger.
    pub async fn run(self: Arc<Self>) -> Result<(), PeerError> {
        *self.state.lock().unwrap() = ListenerState::Running;
        info!(uuid = %self.uuid, port = self.port, "listener running");

        let result = self.sink.start(Arc::clone(&self)).await;

        self.stop.store(true, Ordering::SeqCst);
        *self.state.lock().unwrap() = ListenerState::Stopped;
        match &result {
            Ok(()) => info!(uuid = %self.uuid, "listener stopped"),
            Err(e) => warn!(uuid = %self.uuid, error = %e, "listener stopped with error"),
        }
        result
    }

    /// Dispatches one decoded shim event. No-op once the stop flag is set.
    pub fn on_incoming(&self, event: MuxEvent) {
        if self.stop.load(Ordering::SeqCst) {
            return;
        }
        match event {
            MuxEvent::DisplayUpdate { x, y, width, height } => {
                self.handle_display_update(x, y, width, height);
            }
            MuxEvent::DisplaySwitch { format, width, height } => {
                self.handle_display_switch(format, width, height);
            }
            MuxEvent::Shutdown => {
                debug!(uuid = %self.uuid, "shutdown event from shim");
                self.request_stop();
            }
            other => {
                warn!(uuid = %self.uuid, tag = ?other.event_type(), "unexpected event from shim, discarding");
            }
        }
    }

    /// Sets the stop flag; `run` returns at the peer server's next exit.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if *state != ListenerState::Stopped {
            *state = ListenerState::Stopping;
        }
    }

    fn handle_display_update(&self, x: u32, y: u32, width: u32, height: u32) {
        // Snapshot under the lock, release, then call the sink: sink calls
        // may take time and must not run under the peer-set lock.
        let peers = self.peer_snapshot();

        let mut samples = Vec::with_capacity(peers.len());
        for peer in &peers {
            self.sink.partial_update(peer, x, y, width, height);
            samples.push(self.sink.capture_fps(peer));
        }

        let framerate = {
            let mut pacer = self.pacer.lock().unwrap();
            for sample in samples {
                pacer.observe(sample);
            }
            pacer.current()
        };

        // The ack is the shim's permission to send the next update.
        let ack = MuxEvent::DisplayUpdateComplete {
            success: 1,
            framerate,
        };
        if let Err(e) = self.outbound.send(ack, &self.uuid) {
            warn!(uuid = %self.uuid, error = %e, "could not enqueue update ack");
        }
    }

    fn handle_display_switch(&self, format: u32, width: u32, height: u32) {
        // Wire-supplied dimensions; an overflowing size is oversized too.
        let needed = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4));
        if needed.map_or(true, |bytes| bytes > FRAMEBUFFER_BYTES as u64) {
            warn!(
                uuid = %self.uuid,
                width,
                height,
                "display switch exceeds the framebuffer mapping, rejecting"
            );
            return;
        }

        {
            let mut fb = self.framebuffer.lock().unwrap();
            if fb.is_none() {
                match Framebuffer::open(self.vm_id) {
                    Ok(map) => {
                        debug!(uuid = %self.uuid, vm_id = self.vm_id, "framebuffer mapped");
                        *fb = Some(map);
                    }
                    Err(e) => {
                        // The shim retries on its next switch.
                        warn!(uuid = %self.uuid, error = %e, "framebuffer mapping failed");
                        return;
                    }
                }
            }
        }

        self.width.store(width, Ordering::SeqCst);
        self.height.store(height, Ordering::SeqCst);
        self.format.store(format, Ordering::SeqCst);

        match PixelFormat::from_wire(format) {
            Some(px) => {
                for peer in self.peer_snapshot() {
                    self.sink.full_update(&peer, width, height, px);
                }
                debug!(uuid = %self.uuid, width, height, format = ?px, "display switch processed");
            }
            None => {
                // Peers are declined until a switch with a known format
                // arrives.
                warn!(uuid = %self.uuid, format, "unknown pixel format, peers not refreshed");
            }
        }
    }

    // ── Peer registry ─────────────────────────────────────────────────────────

    /// Adds a peer and, if a framebuffer is already mapped, pushes it a
    /// full-display update for the current mode.
    pub fn register_peer(&self, peer: Arc<Peer>) {
        self.peers.lock().unwrap().push(Arc::clone(&peer));

        let mapped = self.framebuffer.lock().unwrap().is_some();
        if mapped {
            if let Some(px) = PixelFormat::from_wire(self.format.load(Ordering::SeqCst)) {
                self.sink.full_update(
                    &peer,
                    self.width.load(Ordering::SeqCst),
                    self.height.load(Ordering::SeqCst),
                    px,
                );
            }
        }
        debug!(uuid = %self.uuid, peer = %peer.id(), peers = self.num_connected_peers(), "peer registered");
    }

    pub fn unregister_peer(&self, peer: &Peer) {
        self.peers.lock().unwrap().retain(|p| p.id() != peer.id());
        debug!(uuid = %self.uuid, peer = %peer.id(), "peer unregistered");
    }

    fn peer_snapshot(&self) -> Vec<Arc<Peer>> {
        self.peers.lock().unwrap().clone()
    }

    // ── Client input ──────────────────────────────────────────────────────────

    /// Forwards a client pointer event to the shim.
    pub fn send_mouse(&self, x: u32, y: u32, flags: u32) -> Result<(), OutboundError> {
        self.outbound.send(MuxEvent::Mouse { x, y, flags }, &self.uuid)
    }

    /// Forwards a client keyboard event to the shim.
    pub fn send_keyboard(&self, keycode: u32, flags: u32) -> Result<(), OutboundError> {
        self.outbound
            .send(MuxEvent::Keyboard { keycode, flags }, &self.uuid)
    }

    // ── Authentication configuration ──────────────────────────────────────────

    /// Updates the credential file path. Takes effect for sessions
    /// negotiated after the call; already-connected peers are unaffected.
    pub fn set_credential_file(&self, path: impl Into<String>) {
        *self.credential_path.lock().unwrap() = path.into();
    }

    /// Enables or disables authentication for future sessions.
    pub fn set_authentication(&self, enabled: bool) {
        self.authenticating.store(enabled, Ordering::SeqCst);
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn vm_id(&self) -> u32 {
        self.vm_id
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn width(&self) -> u32 {
        self.width.load(Ordering::SeqCst)
    }

    pub fn height(&self) -> u32 {
        self.height.load(Ordering::SeqCst)
    }

    /// The current pixel format, or `None` before the first valid switch.
    pub fn pixel_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_wire(self.format.load(Ordering::SeqCst))
    }

    pub fn credential_path(&self) -> String {
        self.credential_path.lock().unwrap().clone()
    }

    pub fn authenticating(&self) -> bool {
        self.authenticating.load(Ordering::SeqCst)
    }

    pub fn num_connected_peers(&self) -> u32 {
        self.peers.lock().unwrap().len() as u32
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock().unwrap()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Whether the shared-memory framebuffer has been mapped.
    pub fn framebuffer_mapped(&self) -> bool {
        self.framebuffer.lock().unwrap().is_some()
    }

    /// The current pacing target advertised to the shim.
    pub fn target_fps(&self) -> u32 {
        self.pacer.lock().unwrap().current()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("uuid", &self.uuid)
            .field("vm_id", &self.vm_id)
            .field("port", &self.port)
            .field("state", &self.state())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
