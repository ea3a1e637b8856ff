//! Per-connection state and the two ways callers see it.
//!
//! A [`Connection`] is owned outright by the loop that accepted it and
//! lives in that loop's fd map. Callbacks borrow it through [`Conn`],
//! which cannot outlive the callback invocation. Other threads only ever
//! get a [`ConnHandle`]: a small `Send + Sync` value that can post
//! `async_write`/`wake`/`close` requests onto the owning loop's thread,
//! but never touches loop-owned state directly.

use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use hashbrown::HashMap;
use socket2::Socket;

use rnet_core::addr::{format_addr, local_addr_string, peer_addr_string};
use rnet_core::ringbuf::RingBuffer;

use crate::tcp_loop::TcpLoopShared;

const INITIAL_RING_CAPACITY: usize = 4096;

/// Connection state owned by its loop. Never exposed directly outside the
/// loop thread.
pub(crate) struct Connection {
    pub(crate) fd: RawFd,
    pub(crate) socket: Socket,
    pub(crate) opened: bool,
    pub(crate) local_addr: String,
    pub(crate) remote_addr: String,
    pub(crate) inbound: RingBuffer,
    pub(crate) outbound: RingBuffer,
    pub(crate) write_interest: bool,
    pub(crate) user_data: HashMap<String, Box<dyn Any + Send>>,
    pub(crate) handle: ConnHandle,
}

impl Connection {
    pub(crate) fn new(socket: Socket, loop_shared: Arc<TcpLoopShared>) -> Self {
        let fd = socket.as_raw_fd();
        let local_addr = local_addr_string(&socket);
        let remote_addr = peer_addr_string(&socket);
        let handle = ConnHandle { fd, loop_shared };
        Self {
            fd,
            socket,
            opened: false,
            local_addr,
            remote_addr,
            inbound: RingBuffer::new(INITIAL_RING_CAPACITY),
            outbound: RingBuffer::new(INITIAL_RING_CAPACITY),
            write_interest: false,
            user_data: HashMap::new(),
            handle,
        }
    }
}

/// View of a [`Connection`] handed to callbacks. Borrows loop-owned state
/// for the duration of one callback invocation and cannot outlive it.
pub struct Conn<'a> {
    inner: &'a mut Connection,
}

impl<'a> Conn<'a> {
    pub(crate) fn new(inner: &'a mut Connection) -> Self {
        Self { inner }
    }

    /// This connection's local address, `host:port`.
    #[must_use]
    pub fn local_addr(&self) -> &str {
        &self.inner.local_addr
    }

    /// The peer's address, `host:port`.
    #[must_use]
    pub fn remote_addr(&self) -> &str {
        &self.inner.remote_addr
    }

    /// Bytes currently sitting unread in the inbound ring.
    #[must_use]
    pub fn buffer_length(&self) -> usize {
        self.inner.inbound.len()
    }

    /// Peek at every unread inbound byte without consuming it.
    ///
    /// Returns `(total_len, head, tail)`; `tail` is non-empty only when the
    /// unread range wraps past the end of the ring's backing storage.
    #[must_use]
    pub fn read(&self) -> (usize, &[u8], &[u8]) {
        let len = self.inner.inbound.len();
        let (head, tail) = self.inner.inbound.lazy_read_all();
        (len, head, tail)
    }

    /// Peek at up to `n` unread inbound bytes without consuming them.
    ///
    /// Returns `(0, &[], &[])` if fewer than `n` bytes are available.
    #[must_use]
    pub fn read_n(&self, n: usize) -> (usize, &[u8], &[u8]) {
        if n > self.inner.inbound.len() {
            return (0, &[], &[]);
        }
        let (head, tail) = self.inner.inbound.lazy_read(n);
        (n, head, tail)
    }

    /// Consume `n` unread inbound bytes, returning how many were actually
    /// available to consume.
    pub fn shift_n(&mut self, n: usize) -> usize {
        self.inner.inbound.shift(n)
    }

    /// Discard every unread inbound byte.
    pub fn reset_buffer(&mut self) {
        self.inner.inbound.reset();
    }

    /// The opaque per-connection user-data bag.
    #[must_use]
    pub fn user_data(&self) -> &HashMap<String, Box<dyn Any + Send>> {
        &self.inner.user_data
    }

    /// Mutable access to the opaque per-connection user-data bag.
    pub fn user_data_mut(&mut self) -> &mut HashMap<String, Box<dyn Any + Send>> {
        &mut self.inner.user_data
    }

    /// A cheap, `Send + Sync` handle other threads can use to
    /// `async_write`/`wake`/`close` this connection.
    #[must_use]
    pub fn handle(&self) -> ConnHandle {
        self.inner.handle.clone()
    }
}

/// Cross-thread-safe handle to one connection.
///
/// Exposes exactly the operations safe to call from any thread. Every
/// method posts a trigger onto the owning loop rather than touching
/// connection state directly.
#[derive(Clone)]
pub struct ConnHandle {
    fd: RawFd,
    loop_shared: Arc<TcpLoopShared>,
}

impl ConnHandle {
    /// Queue `bytes` to be written to this connection from its owning
    /// loop thread, following the same opportunistic-write path a
    /// callback return would.
    pub fn async_write(&self, bytes: Vec<u8>) {
        let fd = self.fd;
        let shared = Arc::clone(&self.loop_shared);
        let _ = self.loop_shared.trigger(Box::new(move || {
            shared.handle_async_write(fd, &bytes);
            Ok(())
        }));
    }

    /// Schedule `on_waken_handler` to run on the owning loop thread.
    pub fn wake(&self) {
        let fd = self.fd;
        let shared = Arc::clone(&self.loop_shared);
        let _ = self
            .loop_shared
            .trigger(Box::new(move || shared.handle_wake(fd)));
    }

    /// Schedule this connection to be closed from the owning loop thread.
    pub fn close(&self) {
        let fd = self.fd;
        let shared = Arc::clone(&self.loop_shared);
        let _ = self
            .loop_shared
            .trigger(Box::new(move || shared.close_connection(fd, None)));
    }
}

/// Format a raw `SocketAddr` the way cached connection/pack addresses are
/// rendered (re-exported for callers building their own diagnostics).
#[must_use]
pub fn addr_to_string(addr: &SocketAddr) -> String {
    format_addr(addr)
}

/// Transient error passed to `on_conn_closed` describing why a connection
/// went away, when known.
pub type CloseReason = Option<io::Error>;
