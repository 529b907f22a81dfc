//! Process-wide registry of listeners and the single outbound writer.
//!
//! The worker owns every [`Listener`] in the process, keyed by VM uuid, and
//! funnels all mux→shim traffic through one bounded FIFO drained by a single
//! writer task. Serializing writes on one task is the invariant that lets
//! any thread call [`Worker::send_message`] without further locking: for a
//! given uuid, events reach the transport in enqueue order.
//!
//! Inbound traffic takes the mirror path: the transport layer hands each
//! received frame to [`Worker::handle_incoming`], which decodes it and
//! dispatches to the owning listener. Malformed frames are logged and
//! dropped; the connection is not torn down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use rdmux_core::{decode_event, encode_event, MuxEvent};

use crate::listener::Listener;
use crate::peer::{PeerError, PeerSink};

/// Default bound of the outbound FIFO.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Errors from the VM registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("VM {0} is already registered")]
    AlreadyRegistered(String),

    #[error("VM {0} is not registered")]
    NotFound(String),

    /// Listener construction failed; the VM was not registered.
    #[error("listener initialization failed")]
    ListenerInit(#[source] PeerError),
}

/// Errors from enqueueing onto the outbound FIFO.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutboundError {
    /// The bounded queue is full. The caller must not block; drop or retry.
    #[error("outbound queue is full")]
    QueueFull,

    /// The writer task is gone.
    #[error("outbound queue is closed")]
    Closed,
}

/// Errors from delivering an encoded frame to a shim.
///
/// Recoverable from the worker's perspective: the writer logs and moves on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error delivering frame: {0}")]
    Io(#[from] std::io::Error),

    #[error("no transport connection for VM {0}")]
    Disconnected(String),
}

/// Delivery seam to the shim transport. One frame per call; framing is the
/// transport's job.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, uuid: &str, frame: Vec<u8>) -> Result<(), TransportError>;
}

/// A transport that discards every frame. Used by the headless binary until
/// a socket transport is attached, and convenient in tests.
#[derive(Debug, Default)]
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn deliver(&self, uuid: &str, frame: Vec<u8>) -> Result<(), TransportError> {
        trace!(uuid, len = frame.len(), "frame discarded (null transport)");
        Ok(())
    }
}

/// One entry in the outbound FIFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    pub event: MuxEvent,
    pub uuid: String,
}

/// Cloneable producer half of the outbound FIFO. Each listener holds one.
#[derive(Clone)]
pub struct OutboundSender {
    tx: mpsc::Sender<OutboundFrame>,
}

impl OutboundSender {
    /// Enqueues without blocking.
    ///
    /// # Errors
    ///
    /// [`OutboundError::QueueFull`] when the bound is hit; the caller
    /// decides whether to drop or retry. [`OutboundError::Closed`] when the
    /// writer task has exited.
    pub fn send(&self, event: MuxEvent, uuid: &str) -> Result<(), OutboundError> {
        self.tx
            .try_send(OutboundFrame {
                event,
                uuid: uuid.to_string(),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => OutboundError::QueueFull,
                TrySendError::Closed(_) => OutboundError::Closed,
            })
    }
}

/// Creates a detached outbound queue. The worker wires the receiver to its
/// writer task; tests use this to observe a listener's enqueues directly.
pub fn outbound_queue(depth: usize) -> (OutboundSender, mpsc::Receiver<OutboundFrame>) {
    let (tx, rx) = mpsc::channel(depth);
    (OutboundSender { tx }, rx)
}

/// Process-wide listener registry plus the outbound writer.
pub struct Worker {
    sink: Arc<dyn PeerSink>,
    listeners: Mutex<HashMap<String, Arc<Listener>>>,
    outbound: OutboundSender,
    // Handed to each run task so it can unregister its VM on exit without
    // keeping the worker alive.
    self_ref: Weak<Worker>,
}

impl Worker {
    /// Creates the worker and spawns its writer task on the current Tokio
    /// runtime.
    pub fn new(
        sink: Arc<dyn PeerSink>,
        transport: Arc<dyn Transport>,
        queue_depth: usize,
    ) -> Arc<Self> {
        let (outbound, rx) = outbound_queue(queue_depth);
        tokio::spawn(write_loop(rx, transport));

        Arc::new_cyclic(|self_ref| Self {
            sink,
            listeners: Mutex::new(HashMap::new()),
            outbound,
            self_ref: self_ref.clone(),
        })
    }

    /// Allocates a listener for `uuid`, inserts it into the registry, and
    /// spawns its run task. The run task unregisters the VM when the
    /// listener's server exits, destroying the listener.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AlreadyRegistered`] if `uuid` is present,
    /// [`RegistryError::ListenerInit`] if the peer server cannot be
    /// allocated.
    pub fn register_vm(
        &self,
        uuid: &str,
        vm_id: u32,
        port: u16,
        auth: bool,
    ) -> Result<Arc<Listener>, RegistryError> {
        let listener = {
            let mut listeners = self.listeners.lock().unwrap();
            if listeners.contains_key(uuid) {
                return Err(RegistryError::AlreadyRegistered(uuid.to_string()));
            }
            let listener = Arc::new(
                Listener::new(
                    uuid,
                    vm_id,
                    port,
                    auth,
                    Arc::clone(&self.sink),
                    self.outbound.clone(),
                )
                .map_err(RegistryError::ListenerInit)?,
            );
            listeners.insert(uuid.to_string(), Arc::clone(&listener));
            listener
        };

        let worker = self.self_ref.clone();
        let running = Arc::clone(&listener);
        tokio::spawn(async move {
            let uuid = running.uuid().to_string();
            let port = running.port();
            let _ = running.run().await;
            if let Some(worker) = worker.upgrade() {
                worker.unregister_vm(&uuid, port);
            }
        });

        info!(uuid, vm_id, port, "registered VM listener");
        Ok(listener)
    }

    /// Removes `uuid` from the registry, dropping the worker's reference to
    /// the listener. Idempotent.
    pub fn unregister_vm(&self, uuid: &str, port: u16) {
        match self.listeners.lock().unwrap().remove(uuid) {
            Some(_) => info!(uuid, port, "unregistered VM listener"),
            None => debug!(uuid, "unregister for VM that is not registered"),
        }
    }

    /// Enqueues an event for delivery to `uuid`'s shim. Never blocks.
    ///
    /// # Errors
    ///
    /// See [`OutboundSender::send`].
    pub fn send_message(&self, event: MuxEvent, uuid: &str) -> Result<(), OutboundError> {
        self.outbound.send(event, uuid)
    }

    /// Decodes one received frame and dispatches it to the owning listener.
    ///
    /// Malformed frames and frames for unknown VMs are logged and dropped
    /// without touching the connection.
    pub fn handle_incoming(&self, uuid: &str, frame: &[u8]) {
        let event = match decode_event(frame) {
            Ok((event, consumed)) => {
                if consumed != frame.len() {
                    debug!(uuid, consumed, len = frame.len(), "trailing bytes after event");
                }
                event
            }
            Err(e) => {
                warn!(uuid, error = %e, "dropping malformed frame");
                return;
            }
        };

        let listener = self.listeners.lock().unwrap().get(uuid).cloned();
        match listener {
            Some(listener) => listener.on_incoming(event),
            None => warn!(uuid, "frame for unregistered VM"),
        }
    }

    /// Looks up a registered listener, e.g. for the control surface.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotFound`] if `uuid` is not registered.
    pub fn listener(&self, uuid: &str) -> Result<Arc<Listener>, RegistryError> {
        self.listeners
            .lock()
            .unwrap()
            .get(uuid)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(uuid.to_string()))
    }

    pub fn num_registered(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }
}

/// The single writer: drains the FIFO, encodes, and delivers. Transport
/// failures are logged and skipped; encode failures indicate a bug and are
/// logged at error level.
async fn write_loop(mut rx: mpsc::Receiver<OutboundFrame>, transport: Arc<dyn Transport>) {
    while let Some(frame) = rx.recv().await {
        let bytes = match encode_event(&frame.event) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(uuid = %frame.uuid, error = %e, "failed to encode outbound event");
                continue;
            }
        };
        if let Err(e) = transport.deliver(&frame.uuid, bytes).await {
            warn!(uuid = %frame.uuid, error = %e, "outbound delivery failed");
        }
    }
    debug!("outbound writer stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_queue_reports_full_without_blocking() {
        let (tx, _rx) = outbound_queue(2);
        assert!(tx.send(MuxEvent::Shutdown, "vm").is_ok());
        assert!(tx.send(MuxEvent::Shutdown, "vm").is_ok());
        assert_eq!(
            tx.send(MuxEvent::Shutdown, "vm"),
            Err(OutboundError::QueueFull)
        );
    }

    #[test]
    fn test_outbound_queue_reports_closed_after_receiver_drop() {
        let (tx, rx) = outbound_queue(2);
        drop(rx);
        assert_eq!(
            tx.send(MuxEvent::Shutdown, "vm"),
            Err(OutboundError::Closed)
        );
    }

    #[test]
    fn test_registry_error_messages_name_the_vm() {
        assert_eq!(
            RegistryError::AlreadyRegistered("vm-a".into()).to_string(),
            "VM vm-a is already registered"
        );
        assert_eq!(
            RegistryError::NotFound("vm-b".into()).to_string(),
            "VM vm-b is not registered"
        );
    }
}
