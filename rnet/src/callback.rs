//! User-supplied callback contracts.
//!
//! TCP and UDP never share a socket, so they get two disjoint traits
//! instead of one interface with methods that only make sense for one of
//! them.

use std::io;

use crate::conn::Conn;
use crate::pack::Pack;

/// What the loop should do after a callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operation {
    /// Keep the connection/loop running.
    #[default]
    None,
    /// Finish writing any returned bytes, then close this connection.
    Close,
    /// Finish writing any returned bytes, then shut the whole server down.
    Shutdown,
}

/// Bytes to write back, paired with the operation to perform afterward.
pub type CallbackReturn = (Option<Vec<u8>>, Operation);

/// Callbacks for a TCP server.
///
/// All methods run on the thread that owns `conn`; implementations must
/// not block (see the crate's concurrency model) and must be `Send + Sync`
/// since one callback instance is shared across every loop thread.
pub trait TcpCallback: Send + Sync {
    /// Called once, right after a connection is accepted and registered.
    fn on_conn_opened(&self, conn: &mut Conn<'_>) -> CallbackReturn {
        let _ = conn;
        (None, Operation::None)
    }

    /// Called once, right before a connection's resources are released.
    /// `err` is `None` for a clean close initiated by either side.
    fn on_conn_closed(&self, conn: &mut Conn<'_>, err: Option<io::Error>) -> Operation {
        let _ = (conn, err);
        Operation::None
    }

    /// Called whenever new bytes have been appended to the inbound ring.
    fn conn_handler(&self, conn: &mut Conn<'_>) -> CallbackReturn;

    /// Called on the loop thread after a remote `ConnHandle::wake()`.
    fn on_waken_handler(&self, conn: &mut Conn<'_>) -> CallbackReturn {
        let _ = conn;
        (None, Operation::None)
    }
}

/// Callbacks for a UDP server.
pub trait UdpCallback: Send + Sync {
    /// Called for every received datagram.
    fn pack_handler(&self, data: &[u8], pack: &Pack<'_>) -> CallbackReturn;

    /// Called when `sendto` for a reply fails.
    fn send_err(&self, remote_addr: &str, err: io::Error) {
        let _ = (remote_addr, err);
    }
}
