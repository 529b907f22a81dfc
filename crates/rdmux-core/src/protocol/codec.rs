//! Binary codec for the shim wire protocol.
//!
//! Events are carried as packed self-describing arrays: a length-prefixed
//! array header followed by one unsigned integer per field, tag first.
//! Integers use minimum-width encoding with big-endian byte order, so the
//! encoder and the shim's serializer produce byte-identical frames:
//!
//! ```text
//! 0x00..=0x7F        positive fixint (value is the marker byte)
//! 0xCC               uint8,  1 payload byte
//! 0xCD               uint16, 2 payload bytes big-endian
//! 0xCE               uint32, 4 payload bytes big-endian
//! 0xCF               uint64, 8 payload bytes big-endian
//! 0x90..=0x9F        fixarray, length in the low nibble
//! 0xDC / 0xDD        array16 / array32 with big-endian length
//! ```
//!
//! A `DisplayUpdate` therefore encodes to at most 21 bytes and usually far
//! fewer; the tag never needs more than 5 bytes on the wire.
//!
//! Decoding is non-allocating: the reader walks a borrowed slice with a
//! position cursor and every read is bounds-checked against the buffer end.
//! The array header's length is read but not trusted for dispatch; the tag
//! alone determines how many fields follow.

use thiserror::Error;

use crate::protocol::events::{EventType, MuxEvent};

/// Errors that can occur during event encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ended in the middle of an event.
    #[error("truncated event: need {needed} more byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// The event tag is outside the defined set.
    #[error("unknown event tag: {0}")]
    BadTag(u64),

    /// A field was not encoded as an unsigned integer (or an array header
    /// was expected and something else was found).
    #[error("unexpected type marker: 0x{marker:02X}")]
    BadType { marker: u8 },

    /// The encode buffer could not be grown.
    #[error("out of memory growing the encode buffer")]
    EncodeOom,
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Initial capacity of the encode buffer. Every event in the protocol fits
/// without reallocation.
const INITIAL_CAPACITY: usize = 32;

/// Write half of the codec: owns a growable byte buffer that doubles its
/// capacity on demand.
struct EventWriter {
    buf: Vec<u8>,
}

impl EventWriter {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Ensures room for `additional` more bytes, doubling the capacity until
    /// it fits. Allocation failure surfaces as [`CodecError::EncodeOom`]
    /// instead of aborting.
    fn grow_for(&mut self, additional: usize) -> Result<(), CodecError> {
        let needed = self.buf.len() + additional;
        if needed <= self.buf.capacity() {
            return Ok(());
        }
        let mut target = self.buf.capacity().max(INITIAL_CAPACITY);
        while target < needed {
            target *= 2;
        }
        self.buf
            .try_reserve(target - self.buf.len())
            .map_err(|_| CodecError::EncodeOom)
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.grow_for(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn put_u8(&mut self, byte: u8) -> Result<(), CodecError> {
        self.put(&[byte])
    }

    /// Writes an array header for `len` elements using the smallest marker.
    fn write_array_header(&mut self, len: u32) -> Result<(), CodecError> {
        if len < 16 {
            self.put_u8(0x90 | len as u8)
        } else if len <= u16::MAX as u32 {
            self.put_u8(0xDC)?;
            self.put(&(len as u16).to_be_bytes())
        } else {
            self.put_u8(0xDD)?;
            self.put(&len.to_be_bytes())
        }
    }

    /// Writes an unsigned integer using the smallest encoding that holds it.
    fn write_uint(&mut self, value: u64) -> Result<(), CodecError> {
        if value < 0x80 {
            self.put_u8(value as u8)
        } else if value <= u8::MAX as u64 {
            self.put_u8(0xCC)?;
            self.put_u8(value as u8)
        } else if value <= u16::MAX as u64 {
            self.put_u8(0xCD)?;
            self.put(&(value as u16).to_be_bytes())
        } else if value <= u32::MAX as u64 {
            self.put_u8(0xCE)?;
            self.put(&(value as u32).to_be_bytes())
        } else {
            self.put_u8(0xCF)?;
            self.put(&value.to_be_bytes())
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Encodes one event as a packed array: the tag, then each payload field in
/// wire order.
///
/// # Errors
///
/// Returns [`CodecError::EncodeOom`] if the buffer cannot be grown.
///
/// # Examples
///
/// ```rust
/// use rdmux_core::protocol::codec::{decode_event, encode_event};
/// use rdmux_core::protocol::events::MuxEvent;
///
/// let event = MuxEvent::Mouse { x: 640, y: 480, flags: 1 };
/// let bytes = encode_event(&event).unwrap();
/// let (decoded, consumed) = decode_event(&bytes).unwrap();
/// assert_eq!(decoded, event);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_event(event: &MuxEvent) -> Result<Vec<u8>, CodecError> {
    let mut w = EventWriter::new();
    let tag = event.event_type() as u32 as u64;

    match *event {
        MuxEvent::DisplayUpdate { x, y, width, height } => {
            w.write_array_header(5)?;
            w.write_uint(tag)?;
            w.write_uint(x as u64)?;
            w.write_uint(y as u64)?;
            w.write_uint(width as u64)?;
            w.write_uint(height as u64)?;
        }
        MuxEvent::DisplaySwitch { format, width, height } => {
            w.write_array_header(4)?;
            w.write_uint(tag)?;
            w.write_uint(format as u64)?;
            w.write_uint(width as u64)?;
            w.write_uint(height as u64)?;
        }
        MuxEvent::DisplayUpdateComplete { success, framerate } => {
            w.write_array_header(3)?;
            w.write_uint(tag)?;
            w.write_uint(success as u64)?;
            w.write_uint(framerate as u64)?;
        }
        MuxEvent::Mouse { x, y, flags } => {
            w.write_array_header(4)?;
            w.write_uint(tag)?;
            w.write_uint(x as u64)?;
            w.write_uint(y as u64)?;
            w.write_uint(flags as u64)?;
        }
        MuxEvent::Keyboard { keycode, flags } => {
            w.write_array_header(3)?;
            w.write_uint(tag)?;
            w.write_uint(keycode as u64)?;
            w.write_uint(flags as u64)?;
        }
        MuxEvent::Shutdown => {
            w.write_array_header(1)?;
            w.write_uint(tag)?;
        }
    }

    Ok(w.into_bytes())
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Read half of the codec: a position cursor over a borrowed byte slice.
struct EventReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> EventReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    /// Takes the next `n` bytes, rejecting any read past the buffer end.
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::Truncated {
                offset: self.pos,
                needed: self.pos + n - self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Reads an array header and returns the declared element count.
    fn read_array_header(&mut self) -> Result<u32, CodecError> {
        let marker = self.take_u8()?;
        match marker {
            0x90..=0x9F => Ok((marker & 0x0F) as u32),
            0xDC => {
                let b = self.take(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as u32)
            }
            0xDD => {
                let b = self.take(4)?;
                Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
            _ => Err(CodecError::BadType { marker }),
        }
    }

    /// Reads one unsigned integer of any width.
    fn read_uint(&mut self) -> Result<u64, CodecError> {
        let marker = self.take_u8()?;
        match marker {
            0x00..=0x7F => Ok(marker as u64),
            0xCC => Ok(self.take_u8()? as u64),
            0xCD => {
                let b = self.take(2)?;
                Ok(u16::from_be_bytes([b[0], b[1]]) as u64)
            }
            0xCE => {
                let b = self.take(4)?;
                Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as u64)
            }
            0xCF => {
                let b = self.take(8)?;
                Ok(u64::from_be_bytes([
                    b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
                ]))
            }
            _ => Err(CodecError::BadType { marker }),
        }
    }

    /// Reads an unsigned integer that must fit a protocol field (u32).
    fn read_field(&mut self) -> Result<u32, CodecError> {
        let value = self.read_uint()?;
        u32::try_from(value).map_err(|_| CodecError::BadType { marker: 0xCF })
    }
}

/// Decodes one event from the beginning of `bytes`.
///
/// Returns the event and the number of bytes consumed so the caller can
/// advance its read cursor. The array header's declared length is not used
/// for dispatch; the tag alone determines the field count.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if the buffer ends mid-event,
/// [`CodecError::BadTag`] for an unknown tag, and [`CodecError::BadType`]
/// when a field is not an unsigned integer.
pub fn decode_event(bytes: &[u8]) -> Result<(MuxEvent, usize), CodecError> {
    let mut r = EventReader::new(bytes);

    let _declared_len = r.read_array_header()?;
    let tag = r.read_uint()?;
    let event_type = EventType::try_from(tag).map_err(|_| CodecError::BadTag(tag))?;

    let event = match event_type {
        EventType::DisplayUpdate => {
            let x = r.read_field()?;
            let y = r.read_field()?;
            let width = r.read_field()?;
            let height = r.read_field()?;
            MuxEvent::DisplayUpdate { x, y, width, height }
        }
        EventType::DisplaySwitch => {
            let format = r.read_field()?;
            let width = r.read_field()?;
            let height = r.read_field()?;
            MuxEvent::DisplaySwitch { format, width, height }
        }
        EventType::DisplayUpdateComplete => {
            let success = r.read_field()?;
            let framerate = r.read_field()?;
            MuxEvent::DisplayUpdateComplete { success, framerate }
        }
        EventType::Mouse => {
            let x = r.read_field()?;
            let y = r.read_field()?;
            let flags = r.read_field()?;
            MuxEvent::Mouse { x, y, flags }
        }
        EventType::Keyboard => {
            let keycode = r.read_field()?;
            let flags = r.read_field()?;
            MuxEvent::Keyboard { keycode, flags }
        }
        EventType::Shutdown => MuxEvent::Shutdown,
    };

    Ok((event, r.position()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
