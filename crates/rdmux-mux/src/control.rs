//! Transport-agnostic operator surface for a single listener.
//!
//! Operators manage listeners over some IPC mechanism (the original system
//! exposed them on the session bus); that plumbing lives outside this crate
//! and drives listeners through this trait. Authentication changes apply to
//! sessions negotiated after the call; peers that already completed their
//! handshake are unaffected.

use crate::listener::Listener;

/// The per-listener control interface.
pub trait ListenerControl: Send + Sync {
    /// Points the listener at a credential file. The path is opaque to the
    /// multiplexer and handed to the peer engine unchanged.
    fn set_credential_file(&self, path: String);

    /// Enables or disables authentication for future peer sessions.
    fn set_authentication(&self, enabled: bool);

    /// The port the listener's remote-desktop server is bound to.
    fn port(&self) -> u16;

    /// Number of currently connected peers.
    fn num_connected_peers(&self) -> u32;

    /// Whether new peer sessions must authenticate.
    fn requires_authentication(&self) -> bool;
}

impl ListenerControl for Listener {
    fn set_credential_file(&self, path: String) {
        Listener::set_credential_file(self, path);
    }

    fn set_authentication(&self, enabled: bool) {
        Listener::set_authentication(self, enabled);
    }

    fn port(&self) -> u16 {
        Listener::port(self)
    }

    fn num_connected_peers(&self) -> u32 {
        Listener::num_connected_peers(self)
    }

    fn requires_authentication(&self) -> bool {
        self.authenticating()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::mock::RecordingPeerSink;
    use crate::worker::outbound_queue;
    use std::sync::Arc;

    #[test]
    fn test_control_surface_forwards_to_listener() {
        let (tx, _rx) = outbound_queue(4);
        let listener = Arc::new(
            Listener::new("ctl-vm", 3, 3905, false, RecordingPeerSink::new(), tx).unwrap(),
        );
        let control: &dyn ListenerControl = listener.as_ref();

        assert_eq!(control.port(), 3905);
        assert_eq!(control.num_connected_peers(), 0);
        assert!(!control.requires_authentication());

        control.set_authentication(true);
        control.set_credential_file("/run/rdmux/creds".to_string());

        assert!(control.requires_authentication());
        assert_eq!(listener.credential_path(), "/run/rdmux/creds");
    }
}
