//! Bound listening/receiving socket shared by the reactor and reuseport
//! topologies.
//!
//! `Listener` owns a [`socket2::Socket`] in non-blocking mode and hands out
//! its raw fd for registration with one or more [`crate::poller::Poller`]s.
//! Close is idempotent: multiple loops may independently decide to tear
//! down the shared listener in reuseport mode, so only the first close
//! actually touches the fd.

use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use socket2::{Domain, Protocol, SockAddr, Socket, TcpKeepalive, Type};

use crate::error::{CoreError, Result};

/// Transport the listener was bound for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
}

/// A bound, non-blocking socket plus the bits needed to tear it down once.
pub struct Listener {
    socket: Socket,
    network: Network,
    closed: AtomicBool,
}

impl Listener {
    /// Bind `addr` for `network`. When `reuse_port` is set, `SO_REUSEPORT`
    /// is applied before bind so N independent listeners can share the
    /// address and let the kernel shard inbound traffic across them.
    pub fn bind(addr: SocketAddr, network: Network, reuse_port: bool) -> Result<Self> {
        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let (ty, proto) = match network {
            Network::Tcp => (Type::STREAM, Protocol::TCP),
            Network::Udp => (Type::DGRAM, Protocol::UDP),
        };

        let socket = Socket::new(domain, ty, Some(proto))?;
        socket.set_reuse_address(true)?;
        if reuse_port {
            socket.set_reuse_port(true)?;
        }
        socket.set_nonblocking(true)?;
        socket.bind(&SockAddr::from(addr))?;
        if matches!(network, Network::Tcp) {
            socket.listen(1024)?;
        }

        Ok(Self {
            socket,
            network,
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn network(&self) -> Network {
        self.network
    }

    #[must_use]
    pub fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Borrow the underlying socket, e.g. for `recv_from`/`send_to` on a
    /// UDP listener.
    #[must_use]
    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Accept one pending connection. Only meaningful for `Network::Tcp`.
    pub fn accept(&self) -> Result<(Socket, SocketAddr)> {
        let (socket, sockaddr) = self.socket.accept()?;
        let addr = sockaddr
            .as_socket()
            .ok_or_else(|| CoreError::Io(std::io::Error::other("non-IP peer address")))?;
        Ok((socket, addr))
    }

    /// Receive one datagram into `buf`. Only meaningful for `Network::Udp`.
    ///
    /// Implemented via a raw `recvfrom(2)` rather than `socket2`'s
    /// `MaybeUninit`-based API so the rest of the crate can pass a plain
    /// `&mut [u8]` scratch buffer.
    ///
    /// # Safety
    ///
    /// The syscall is passed this fd and a pointer/length pair derived
    /// directly from `buf`; the kernel writes at most `buf.len()` bytes
    /// and the return value (checked before use) tells us how many.
    #[allow(unsafe_code)]
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
        let mut addr_len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

        let n = unsafe {
            libc::recvfrom(
                self.as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
                0,
                std::ptr::addr_of_mut!(storage).cast::<libc::sockaddr>(),
                &mut addr_len,
            )
        };
        if n < 0 {
            return Err(CoreError::Io(std::io::Error::last_os_error()));
        }
        let addr = sockaddr_storage_to_socket_addr(&storage)?;
        Ok((n as usize, addr))
    }

    /// Send one datagram to `addr`. Only meaningful for `Network::Udp`.
    ///
    /// # Safety
    ///
    /// Mirrors [`Listener::recv_from`]: the syscall is given this fd and a
    /// pointer/length pair derived directly from `buf`.
    #[allow(unsafe_code)]
    pub fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize> {
        let sock_addr = SockAddr::from(addr);
        let n = unsafe {
            libc::sendto(
                self.as_raw_fd(),
                buf.as_ptr().cast::<libc::c_void>(),
                buf.len(),
                0,
                sock_addr.as_ptr().cast::<libc::sockaddr>(),
                sock_addr.len(),
            )
        };
        if n < 0 {
            return Err(CoreError::Io(std::io::Error::last_os_error()));
        }
        Ok(n as usize)
    }

    /// Local address the kernel assigned (resolves `:0` ephemeral ports).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| CoreError::Io(std::io::Error::other("non-IP local address")))
    }

    /// Apply TCP keepalive with `interval` used for both the idle time and
    /// the probe interval. No-op for UDP listeners.
    pub fn set_keepalive(&self, interval: Duration) -> Result<()> {
        if matches!(self.network, Network::Udp) {
            return Ok(());
        }
        let ka = TcpKeepalive::new().with_time(interval).with_interval(interval);
        self.socket.set_tcp_keepalive(&ka)?;
        Ok(())
    }

    /// Idempotent shutdown: only the first caller actually closes the fd.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // `Socket`'s own `Drop` closes the fd; shutdown here just stops
        // further traffic immediately for callers racing the real drop.
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Convert a raw `sockaddr_storage` filled in by `recvfrom(2)` into a
/// `SocketAddr`, routing through `socket2::SockAddr` so the v4/v6 layout
/// parsing lives in one well-tested place instead of being hand-rolled here.
#[allow(unsafe_code)]
fn sockaddr_storage_to_socket_addr(storage: &libc::sockaddr_storage) -> Result<SocketAddr> {
    let len = match storage.ss_family as libc::c_int {
        libc::AF_INET => std::mem::size_of::<libc::sockaddr_in>(),
        libc::AF_INET6 => std::mem::size_of::<libc::sockaddr_in6>(),
        _ => {
            return Err(CoreError::Io(std::io::Error::other(
                "recvfrom returned an unsupported address family",
            )))
        }
    };
    let sock_addr = unsafe { SockAddr::new(*storage, len as libc::socklen_t) };
    sock_addr
        .as_socket()
        .ok_or_else(|| CoreError::Io(std::io::Error::other("non-IP peer address")))
}
