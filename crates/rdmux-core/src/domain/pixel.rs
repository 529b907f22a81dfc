//! Pixel-format translation between the shim's wire codes and the peer
//! encoder.
//!
//! The shim advertises the framebuffer's layout in `DisplaySwitch.format`
//! using pixman-style format codes. The peer encoder wants a
//! `(source, target, bytes-per-pixel)` triple instead. The mapping below is
//! bit-exact and load-bearing for peer interop; do not "fix" rows that look
//! asymmetric (the 24- and 16-bit sources really do expand to XRGB32).

/// Wire codes for the pixel formats the shim can advertise.
///
/// These are pixman format codes: `(bpp << 24) | (type << 16)` followed by
/// the per-channel bit widths, exactly as the shim emits them.
mod wire {
    pub const R8G8B8A8: u32 = 0x2009_8888;
    pub const R8G8B8X8: u32 = 0x2009_0888;
    pub const A8R8G8B8: u32 = 0x2002_8888;
    pub const X8R8G8B8: u32 = 0x2002_0888;
    pub const R8G8B8: u32 = 0x1802_0888;
    pub const B8G8R8: u32 = 0x1803_0888;
    pub const R5G6B5: u32 = 0x1002_0565;
    pub const X1R5G5B5: u32 = 0x1002_0555;
}

/// A framebuffer pixel layout the multiplexer knows how to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    R8g8b8a8,
    R8g8b8x8,
    A8r8g8b8,
    X8r8g8b8,
    R8g8b8,
    B8g8r8,
    R5g6b5,
    X1r5g5b5,
}

/// Color layouts understood by the peer encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorLayout {
    Xbgr32,
    Xrgb32,
    Bgr24,
    Rgb24,
    Bgr16,
    Abgr15,
}

/// The triple handed to the peer encoder: how to read the framebuffer and
/// what to emit to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderFormat {
    /// Layout of the bytes in the shared-memory framebuffer.
    pub source: ColorLayout,
    /// Layout the encoder converts to for the client session.
    pub target: ColorLayout,
    /// Bytes per framebuffer pixel.
    pub bytes_per_pixel: u8,
}

impl PixelFormat {
    /// Parses a wire code from a `DisplaySwitch` event.
    ///
    /// Unknown codes return `None`: the listener keeps the raw code but
    /// declines to serve peers until a switch with a known format arrives.
    pub fn from_wire(code: u32) -> Option<Self> {
        match code {
            wire::R8G8B8A8 => Some(PixelFormat::R8g8b8a8),
            wire::R8G8B8X8 => Some(PixelFormat::R8g8b8x8),
            wire::A8R8G8B8 => Some(PixelFormat::A8r8g8b8),
            wire::X8R8G8B8 => Some(PixelFormat::X8r8g8b8),
            wire::R8G8B8 => Some(PixelFormat::R8g8b8),
            wire::B8G8R8 => Some(PixelFormat::B8g8r8),
            wire::R5G6B5 => Some(PixelFormat::R5g6b5),
            wire::X1R5G5B5 => Some(PixelFormat::X1r5g5b5),
            _ => None,
        }
    }

    /// Returns the wire code for this format.
    pub fn wire_code(self) -> u32 {
        match self {
            PixelFormat::R8g8b8a8 => wire::R8G8B8A8,
            PixelFormat::R8g8b8x8 => wire::R8G8B8X8,
            PixelFormat::A8r8g8b8 => wire::A8R8G8B8,
            PixelFormat::X8r8g8b8 => wire::X8R8G8B8,
            PixelFormat::R8g8b8 => wire::R8G8B8,
            PixelFormat::B8g8r8 => wire::B8G8R8,
            PixelFormat::R5g6b5 => wire::R5G6B5,
            PixelFormat::X1r5g5b5 => wire::X1R5G5B5,
        }
    }

    /// Returns the encoder triple for this format.
    pub fn encoder_format(self) -> EncoderFormat {
        use ColorLayout::*;
        match self {
            PixelFormat::R8g8b8a8 | PixelFormat::R8g8b8x8 => EncoderFormat {
                source: Xbgr32,
                target: Xbgr32,
                bytes_per_pixel: 4,
            },
            PixelFormat::A8r8g8b8 | PixelFormat::X8r8g8b8 => EncoderFormat {
                source: Xrgb32,
                target: Xrgb32,
                bytes_per_pixel: 4,
            },
            PixelFormat::R8g8b8 => EncoderFormat {
                source: Bgr24,
                target: Xrgb32,
                bytes_per_pixel: 3,
            },
            PixelFormat::B8g8r8 => EncoderFormat {
                source: Rgb24,
                target: Xrgb32,
                bytes_per_pixel: 3,
            },
            PixelFormat::R5g6b5 => EncoderFormat {
                source: Bgr16,
                target: Xrgb32,
                bytes_per_pixel: 2,
            },
            PixelFormat::X1r5g5b5 => EncoderFormat {
                source: Abgr15,
                target: Xrgb32,
                bytes_per_pixel: 2,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_wire_code_round_trips() {
        for format in [
            PixelFormat::R8g8b8a8,
            PixelFormat::R8g8b8x8,
            PixelFormat::A8r8g8b8,
            PixelFormat::X8r8g8b8,
            PixelFormat::R8g8b8,
            PixelFormat::B8g8r8,
            PixelFormat::R5g6b5,
            PixelFormat::X1r5g5b5,
        ] {
            assert_eq!(PixelFormat::from_wire(format.wire_code()), Some(format));
        }
    }

    #[test]
    fn test_unknown_wire_code_is_declined() {
        assert_eq!(PixelFormat::from_wire(0), None);
        assert_eq!(PixelFormat::from_wire(0xDEAD_BEEF), None);
    }

    #[test]
    fn test_rgba_variants_stay_xbgr32() {
        for format in [PixelFormat::R8g8b8a8, PixelFormat::R8g8b8x8] {
            let enc = format.encoder_format();
            assert_eq!(enc.source, ColorLayout::Xbgr32);
            assert_eq!(enc.target, ColorLayout::Xbgr32);
            assert_eq!(enc.bytes_per_pixel, 4);
        }
    }

    #[test]
    fn test_argb_variants_stay_xrgb32() {
        for format in [PixelFormat::A8r8g8b8, PixelFormat::X8r8g8b8] {
            let enc = format.encoder_format();
            assert_eq!(enc.source, ColorLayout::Xrgb32);
            assert_eq!(enc.target, ColorLayout::Xrgb32);
            assert_eq!(enc.bytes_per_pixel, 4);
        }
    }

    #[test]
    fn test_24_bit_sources_expand_to_xrgb32() {
        let rgb = PixelFormat::R8g8b8.encoder_format();
        assert_eq!(
            (rgb.source, rgb.target, rgb.bytes_per_pixel),
            (ColorLayout::Bgr24, ColorLayout::Xrgb32, 3)
        );

        let bgr = PixelFormat::B8g8r8.encoder_format();
        assert_eq!(
            (bgr.source, bgr.target, bgr.bytes_per_pixel),
            (ColorLayout::Rgb24, ColorLayout::Xrgb32, 3)
        );
    }

    #[test]
    fn test_16_bit_sources_expand_to_xrgb32() {
        let r565 = PixelFormat::R5g6b5.encoder_format();
        assert_eq!(
            (r565.source, r565.target, r565.bytes_per_pixel),
            (ColorLayout::Bgr16, ColorLayout::Xrgb32, 2)
        );

        let r555 = PixelFormat::X1r5g5b5.encoder_format();
        assert_eq!(
            (r555.source, r555.target, r555.bytes_per_pixel),
            (ColorLayout::Abgr15, ColorLayout::Xrgb32, 2)
        );
    }
}
