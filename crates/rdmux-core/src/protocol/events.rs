//! All shim-to-multiplexer protocol event types.
//!
//! Every event travels as one packed array on the wire: the numeric tag
//! first, then the payload fields as unsigned integers in declaration order.
//! The tag values are fixed by the shim side and must not be renumbered.

/// All event tags defined in the protocol.
///
/// The discriminant values appear literally on the wire; `Mouse`, `Keyboard`
/// and `DisplayUpdateComplete` travel mux→shim, `DisplayUpdate` and
/// `DisplaySwitch` travel shim→mux, and `Shutdown` may be sent by either
/// side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventType {
    DisplayUpdate = 0,
    DisplaySwitch = 1,
    DisplayUpdateComplete = 2,
    Mouse = 3,
    Keyboard = 4,
    Shutdown = 5,
}

impl TryFrom<u64> for EventType {
    type Error = ();

    fn try_from(value: u64) -> Result<Self, ()> {
        match value {
            0 => Ok(EventType::DisplayUpdate),
            1 => Ok(EventType::DisplaySwitch),
            2 => Ok(EventType::DisplayUpdateComplete),
            3 => Ok(EventType::Mouse),
            4 => Ok(EventType::Keyboard),
            5 => Ok(EventType::Shutdown),
            _ => Err(()),
        }
    }
}

/// A damage rectangle in inclusive-exclusive `(x1, y1, x2, y2)` form, as
/// produced by the display surface's dirty-region tracking.
///
/// The wire format carries `(x, y, w, h)` instead; use
/// [`MuxEvent::display_update`] to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DamageRect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

/// All valid protocol events, discriminated by tag.
///
/// Field order within each variant matches the wire order exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxEvent {
    /// Tag 0 (shim→mux): a region of the framebuffer changed.
    DisplayUpdate { x: u32, y: u32, width: u32, height: u32 },
    /// Tag 1 (shim→mux): the display mode changed. `format` is the raw
    /// pixel-format wire code (see `domain::pixel`).
    DisplaySwitch { format: u32, width: u32, height: u32 },
    /// Tag 2 (mux→shim): acknowledges one `DisplayUpdate`. `success` is 1
    /// on success; `framerate` is the pacing hint for the shim's
    /// damage-coalescing loop.
    DisplayUpdateComplete { success: u32, framerate: u32 },
    /// Tag 3 (mux→shim): client pointer event.
    Mouse { x: u32, y: u32, flags: u32 },
    /// Tag 4 (mux→shim): client keyboard event. The keycode is passed
    /// through to the shim unchanged.
    Keyboard { keycode: u32, flags: u32 },
    /// Tag 5 (either direction): the sender is going away.
    Shutdown,
}

impl MuxEvent {
    /// Builds a `DisplayUpdate` from a damage rectangle, converting the
    /// inclusive-exclusive corners into the `(x, y, w, h)` wire shape.
    ///
    /// Degenerate rectangles (`x2 < x1` or `y2 < y1`) produce a zero-sized
    /// update rather than wrapping.
    pub fn display_update(rect: DamageRect) -> Self {
        MuxEvent::DisplayUpdate {
            x: rect.x1,
            y: rect.y1,
            width: rect.x2.saturating_sub(rect.x1),
            height: rect.y2.saturating_sub(rect.y1),
        }
    }

    /// Returns the [`EventType`] discriminant for this event.
    pub fn event_type(&self) -> EventType {
        match self {
            MuxEvent::DisplayUpdate { .. } => EventType::DisplayUpdate,
            MuxEvent::DisplaySwitch { .. } => EventType::DisplaySwitch,
            MuxEvent::DisplayUpdateComplete { .. } => EventType::DisplayUpdateComplete,
            MuxEvent::Mouse { .. } => EventType::Mouse,
            MuxEvent::Keyboard { .. } => EventType::Keyboard,
            MuxEvent::Shutdown => EventType::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags_match_wire_values() {
        // External compatibility: the shim dispatches on these exact values.
        assert_eq!(EventType::DisplayUpdate as u32, 0);
        assert_eq!(EventType::DisplaySwitch as u32, 1);
        assert_eq!(EventType::DisplayUpdateComplete as u32, 2);
        assert_eq!(EventType::Mouse as u32, 3);
        assert_eq!(EventType::Keyboard as u32, 4);
        assert_eq!(EventType::Shutdown as u32, 5);
    }

    #[test]
    fn test_try_from_rejects_unknown_tag() {
        assert!(EventType::try_from(6).is_err());
        assert!(EventType::try_from(u64::MAX).is_err());
    }

    #[test]
    fn test_display_update_converts_corners_to_extent() {
        let event = MuxEvent::display_update(DamageRect {
            x1: 10,
            y1: 20,
            x2: 110,
            y2: 220,
        });
        assert_eq!(
            event,
            MuxEvent::DisplayUpdate {
                x: 10,
                y: 20,
                width: 100,
                height: 200
            }
        );
    }

    #[test]
    fn test_display_update_degenerate_rect_is_zero_sized() {
        let event = MuxEvent::display_update(DamageRect {
            x1: 50,
            y1: 50,
            x2: 40,
            y2: 40,
        });
        assert_eq!(
            event,
            MuxEvent::DisplayUpdate {
                x: 50,
                y: 50,
                width: 0,
                height: 0
            }
        );
    }

    #[test]
    fn test_event_type_matches_variant() {
        assert_eq!(
            MuxEvent::Mouse { x: 0, y: 0, flags: 0 }.event_type(),
            EventType::Mouse
        );
        assert_eq!(MuxEvent::Shutdown.event_type(), EventType::Shutdown);
    }
}
