//! # rdmux-mux
//!
//! The multiplexer half of rdmux: hosts one remote-desktop listener per VM,
//! fans display updates out to connected peers, and routes client input back
//! to the hypervisor-side shim.
//!
//! # Module map
//!
//! - **`listener`** – Per-VM state machine: framebuffer lifecycle, peer set,
//!   update pacing, incoming-event dispatch.
//! - **`worker`** – Process-wide registry of listeners, the bounded outbound
//!   FIFO, and the single writer task that serializes mux→shim traffic.
//! - **`framebuffer`** – Read-only mapping of the shim's shared-memory
//!   framebuffer.
//! - **`peer`** – The [`PeerSink`](peer::PeerSink) seam to the
//!   remote-desktop protocol engine, plus the recording mock the tests use.
//! - **`control`** – Transport-agnostic operator surface per listener.
//! - **`config`** – TOML process configuration.
//!
//! The wire protocol itself lives in `rdmux-core`; this crate only decodes
//! at the worker boundary and encodes in the writer task.

pub mod config;
pub mod control;
pub mod framebuffer;
pub mod listener;
pub mod peer;
pub mod worker;

pub use control::ListenerControl;
pub use framebuffer::{Framebuffer, FramebufferError, FRAMEBUFFER_BYTES};
pub use listener::{Listener, ListenerState};
pub use peer::{Peer, PeerError, PeerSink};
pub use worker::{
    OutboundError, OutboundFrame, OutboundSender, RegistryError, Transport, TransportError, Worker,
};
