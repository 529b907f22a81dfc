//! The shim wire protocol: event types and the binary codec.
//!
//! Every exchange between a shim and the multiplexer is a single
//! [`MuxEvent`](events::MuxEvent) carried as one packed array per transport
//! frame. The `codec` sub-module provides the two entry points:
//!
//! - [`encode_event`](codec::encode_event) – `&MuxEvent` → `Vec<u8>`
//! - [`decode_event`](codec::decode_event) – `&[u8]` → `(MuxEvent, consumed)`
//!
//! The message shapes are asymmetric per direction: the shim sends display
//! events (`DisplayUpdate`, `DisplaySwitch`), the multiplexer sends input
//! and acknowledgements (`Mouse`, `Keyboard`, `DisplayUpdateComplete`), and
//! `Shutdown` may travel either way.

pub mod codec;
pub mod events;

pub use codec::{decode_event, encode_event, CodecError};
pub use events::{DamageRect, EventType, MuxEvent};
