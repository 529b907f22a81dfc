//! # rdmux-core
//!
//! Shared library for rdmux containing the shim wire protocol codec and the
//! pure display domain logic (pixel-format translation, update pacing).
//!
//! This crate is used by the multiplexer process and by anything that needs
//! to speak the shim protocol. It has zero dependencies on OS APIs, sockets,
//! or shared memory; those live in `rdmux-mux`.
//!
//! # Module map
//!
//! - **`protocol`** – How bytes travel between the shim and the multiplexer.
//!   Events are encoded as packed self-describing arrays (minimum-width
//!   big-endian unsigned integers) and decoded back into the typed
//!   [`MuxEvent`] union.
//!
//! - **`domain`** – Pure logic with no I/O: the pixel-format table that maps
//!   the shim's wire codes onto peer encoder formats, and the
//!   running-average frame-rate pacer that feeds the update/ack handshake.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `rdmux_core::MuxEvent` instead of the full path.
pub use domain::pacing::{FrameRatePacer, MAX_TARGET_FPS, MIN_TARGET_FPS};
pub use domain::pixel::{ColorLayout, EncoderFormat, PixelFormat};
pub use protocol::codec::{decode_event, encode_event, CodecError};
pub use protocol::events::{DamageRect, EventType, MuxEvent};
