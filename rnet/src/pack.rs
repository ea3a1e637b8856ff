//! Ephemeral per-datagram context handed to [`crate::UdpCallback`].

use std::net::SocketAddr;

/// Context for one received UDP datagram.
///
/// Constructed by the receive path, passed to the user by reference, and
/// dropped as soon as the callback returns and any reply has been sent.
/// Nothing here is pooled: address strings are cheap to allocate per
/// datagram and doing so avoids the aliasing hazards a free-list would
/// otherwise reintroduce.
pub struct Pack<'a> {
    peer: SocketAddr,
    peer_str: String,
    local_str: &'a str,
}

impl<'a> Pack<'a> {
    pub(crate) fn new(peer: SocketAddr, local_str: &'a str) -> Self {
        let peer_str = rnet_core::addr::format_addr(&peer);
        Self {
            peer,
            peer_str,
            local_str,
        }
    }

    /// The peer's address as a parsed `SocketAddr`.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// The peer's address, formatted `host:port`.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.peer_str
    }

    /// This server's local bound address, formatted `host:port`.
    #[must_use]
    pub fn local_addr(&self) -> &str {
        self.local_str
    }
}
