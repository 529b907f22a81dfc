//! The seam between a listener and the remote-desktop protocol engine.
//!
//! The engine that negotiates client sessions and encodes pixels lives
//! outside this crate; the listener drives it through the [`PeerSink`]
//! trait. The engine in turn registers a [`Peer`] per connected client and
//! receives full/partial update requests for each one.
//!
//! The original implementation recovered the active listener from
//! thread-local storage inside engine callbacks. Here the handle is passed
//! explicitly: `start` receives the `Arc<Listener>` and every `Peer` carries
//! a weak back reference for lookups that must not extend the listener's
//! lifetime.

pub mod mock;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use rdmux_core::PixelFormat;

use crate::listener::Listener;

/// Errors surfaced by a peer-sink implementation.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The backing server could not be allocated. Raised at listener
    /// construction; the listener cannot exist without it.
    #[error("peer server allocation failed: {0}")]
    ServerAlloc(String),

    /// The running server exited abnormally.
    #[error("peer server failed: {0}")]
    Server(String),
}

/// A connected remote-desktop client session.
///
/// Owned by the listener's peer set; the sink keeps its own handle for the
/// session's lifetime. The listener back reference is lookup-only.
pub struct Peer {
    id: Uuid,
    listener: Weak<Listener>,
}

impl Peer {
    pub fn new(listener: &Arc<Listener>) -> Self {
        Self {
            id: Uuid::new_v4(),
            listener: Arc::downgrade(listener),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Upgrades the back reference. Returns `None` once the listener has
    /// been destroyed.
    pub fn listener(&self) -> Option<Arc<Listener>> {
        self.listener.upgrade()
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").field("id", &self.id).finish()
    }
}

/// Adapter to the remote-desktop protocol engine.
///
/// `full_update`, `partial_update` and `capture_fps` are called while the
/// listener iterates a snapshot of its peer set; implementations must be
/// non-blocking and must not call back into peer registration.
#[async_trait]
pub trait PeerSink: Send + Sync {
    /// Called once per listener at construction time. A failure here is
    /// fatal for the listener and fails `Worker::register_vm`.
    fn allocate(&self) -> Result<(), PeerError>;

    /// Runs the remote-desktop server for `listener` until it exits. The
    /// listener's `run` blocks on this call; returning (cleanly or with an
    /// error) triggers the listener's teardown.
    async fn start(&self, listener: Arc<Listener>) -> Result<(), PeerError>;

    /// Pushes a whole-display refresh for one peer.
    fn full_update(&self, peer: &Peer, width: u32, height: u32, format: PixelFormat);

    /// Pushes one damage rectangle for one peer.
    fn partial_update(&self, peer: &Peer, x: u32, y: u32, width: u32, height: u32);

    /// The rate at which this peer's client is consuming frames, in fps.
    fn capture_fps(&self, peer: &Peer) -> u32;
}
