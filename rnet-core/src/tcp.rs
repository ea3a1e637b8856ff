//! TCP socket option helpers.
//!
//! Unlike the listener (which is shared across loops and lives behind
//! [`crate::listener::Listener`]), an accepted connection's
//! [`socket2::Socket`] is owned outright by the loop that accepted it, so
//! these helpers just flip options on a borrowed reference — no raw fd
//! juggling required.

use std::io;
use std::time::Duration;

use socket2::{Socket, TcpKeepalive};

/// Disable Nagle's algorithm. Essential for request/response protocols
/// where small writes must go out immediately.
pub fn enable_tcp_nodelay(socket: &Socket) -> io::Result<()> {
    socket.set_nodelay(true)
}

/// Apply `SO_KEEPALIVE` plus `interval` for both the idle time and probe
/// interval.
pub fn set_keepalive(socket: &Socket, interval: Duration) -> io::Result<()> {
    let ka = TcpKeepalive::new().with_time(interval).with_interval(interval);
    socket.set_tcp_keepalive(&ka)
}
