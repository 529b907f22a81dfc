//! Worker lifecycle and outbound-path integration tests: registry
//! invariants, run-task self-destruction, queue backpressure, and the
//! single-writer ordering guarantee.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rdmux_core::{decode_event, MuxEvent};
use rdmux_mux::listener::ListenerState;
use rdmux_mux::peer::mock::RecordingPeerSink;
use rdmux_mux::worker::{
    NullTransport, OutboundError, RegistryError, Transport, TransportError, Worker,
};

// ── Test helpers ──────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingTransport {
    frames: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn frames(&self) -> Vec<(String, Vec<u8>)> {
        self.frames.lock().unwrap().clone()
    }

    async fn wait_for(&self, count: usize) {
        for _ in 0..200 {
            if self.frames.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {count} delivered frame(s)");
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(&self, uuid: &str, frame: Vec<u8>) -> Result<(), TransportError> {
        self.frames.lock().unwrap().push((uuid.to_string(), frame));
        Ok(())
    }
}

/// Never completes a delivery; keeps the writer task pinned so the queue
/// fills up.
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn deliver(&self, _uuid: &str, _frame: Vec<u8>) -> Result<(), TransportError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

// ── Registry invariants ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let worker = Worker::new(RecordingPeerSink::new(), Arc::new(NullTransport), 16);

    worker.register_vm("vm-dup", 1, 3901, false).unwrap();
    let err = worker.register_vm("vm-dup", 1, 3901, false).unwrap_err();

    assert!(matches!(err, RegistryError::AlreadyRegistered(uuid) if uuid == "vm-dup"));
    assert_eq!(worker.num_registered(), 1);
}

#[tokio::test]
async fn test_unregister_is_idempotent_and_frees_the_uuid() {
    let worker = Worker::new(RecordingPeerSink::new(), Arc::new(NullTransport), 16);

    worker.register_vm("vm-cycle", 2, 3902, false).unwrap();
    assert_eq!(worker.num_registered(), 1);

    worker.unregister_vm("vm-cycle", 3902);
    assert_eq!(worker.num_registered(), 0);

    // A second unregister is a no-op.
    worker.unregister_vm("vm-cycle", 3902);

    // The uuid is immediately reusable.
    worker.register_vm("vm-cycle", 2, 3902, false).unwrap();
    assert_eq!(worker.num_registered(), 1);
}

#[tokio::test]
async fn test_failed_server_allocation_fails_registration() {
    let worker = Worker::new(
        RecordingPeerSink::failing_allocation(),
        Arc::new(NullTransport),
        16,
    );

    let err = worker.register_vm("vm-noalloc", 3, 3903, false).unwrap_err();

    assert!(matches!(err, RegistryError::ListenerInit(_)));
    assert_eq!(worker.num_registered(), 0);
}

#[tokio::test]
async fn test_lookup_surfaces_not_found() {
    let worker = Worker::new(RecordingPeerSink::new(), Arc::new(NullTransport), 16);

    let err = worker.listener("vm-ghost").unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(uuid) if uuid == "vm-ghost"));

    let registered = worker.register_vm("vm-real", 4, 3904, true).unwrap();
    let found = worker.listener("vm-real").unwrap();
    assert!(Arc::ptr_eq(&registered, &found));
    assert!(found.authenticating());
}

#[tokio::test]
async fn test_server_exit_unregisters_the_vm() {
    let sink = RecordingPeerSink::new();
    let worker = Worker::new(sink.clone(), Arc::new(NullTransport), 16);

    let listener = worker.register_vm("vm-exit", 5, 3905, false).unwrap();
    assert_eq!(worker.num_registered(), 1);

    // Release the parked peer server; run() returns and the registration
    // task tears the entry down.
    sink.shut_down();
    for _ in 0..200 {
        if worker.num_registered() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(worker.num_registered(), 0);
    assert_eq!(listener.state(), ListenerState::Stopped);
    assert!(listener.is_stopped());

    // Dispatch after Stopped is a no-op by contract.
    listener.on_incoming(MuxEvent::DisplayUpdate {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
    });
    assert!(sink.partial_updates().is_empty());
}

// ── Outbound path ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_message_returns_queue_full_instead_of_blocking() {
    let worker = Worker::new(RecordingPeerSink::new(), Arc::new(StalledTransport), 1);

    // The writer task drains at most one frame into the stalled delivery;
    // after that the bounded queue must push back.
    let mut full = None;
    for _ in 0..10 {
        match worker.send_message(MuxEvent::Shutdown, "vm-full") {
            Ok(()) => tokio::time::sleep(Duration::from_millis(2)).await,
            Err(e) => {
                full = Some(e);
                break;
            }
        }
    }

    assert_eq!(full, Some(OutboundError::QueueFull));
}

#[tokio::test]
async fn test_writer_delivers_frames_in_enqueue_order() {
    let transport = RecordingTransport::new();
    let worker = Worker::new(RecordingPeerSink::new(), transport.clone(), 16);

    let events = [
        MuxEvent::Keyboard { keycode: 1, flags: 0 },
        MuxEvent::Keyboard { keycode: 2, flags: 0 },
        MuxEvent::Mouse { x: 3, y: 4, flags: 0 },
        MuxEvent::DisplayUpdateComplete {
            success: 1,
            framerate: 24,
        },
    ];
    for event in &events {
        worker.send_message(*event, "vm-order").unwrap();
    }

    transport.wait_for(events.len()).await;
    let frames = transport.frames();
    assert_eq!(frames.len(), events.len());
    for (i, (uuid, bytes)) in frames.iter().enumerate() {
        assert_eq!(uuid, "vm-order");
        let (decoded, _) = decode_event(bytes).unwrap();
        assert_eq!(decoded, events[i], "frame {i} out of order");
    }
}

#[tokio::test]
async fn test_incoming_frame_for_unknown_vm_is_ignored() {
    let sink = RecordingPeerSink::new();
    let transport = RecordingTransport::new();
    let worker = Worker::new(sink.clone(), transport.clone(), 16);

    // A valid frame addressed to a VM that was never registered.
    let bytes = rdmux_core::encode_event(&MuxEvent::Shutdown).unwrap();
    worker.handle_incoming("vm-unknown", &bytes);

    tokio::time::sleep(Duration::from_millis(25)).await;
    assert!(transport.frames().is_empty());
    assert_eq!(worker.num_registered(), 0);
}
