//! Socket address helpers.
//!
//! Connections and datagram packs cache their local/remote address as a
//! plain `String` at creation time so callback invocations never need to
//! re-resolve or re-format a `sockaddr` on the hot path.

use std::net::SocketAddr;

/// Render a socket address the way connection/pack objects cache it:
/// `host:port`, IPv6 hosts bracketed.
#[must_use]
pub fn format_addr(addr: &SocketAddr) -> String {
    addr.to_string()
}

/// Best-effort local address of a bound/connected fd, formatted via
/// [`format_addr`]. Returns `"unknown"` if the kernel can't report one.
#[must_use]
pub fn local_addr_string(socket: &socket2::Socket) -> String {
    socket
        .local_addr()
        .ok()
        .and_then(|a| a.as_socket())
        .map(|a| format_addr(&a))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Best-effort peer address of a connected fd, formatted via
/// [`format_addr`]. Returns `"unknown"` if the kernel can't report one
/// (e.g. the peer already reset the connection).
#[must_use]
pub fn peer_addr_string(socket: &socket2::Socket) -> String {
    socket
        .peer_addr()
        .ok()
        .and_then(|a| a.as_socket())
        .map(|a| format_addr(&a))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_v4_and_v6() {
        let v4: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(format_addr(&v4), "127.0.0.1:8080");

        let v6: SocketAddr = "[::1]:9090".parse().unwrap();
        assert_eq!(format_addr(&v6), "[::1]:9090");
    }
}
