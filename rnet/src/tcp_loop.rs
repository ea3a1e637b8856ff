//! One TCP event loop: accept, read, write, close, and wake handling
//! around a single [`Poller`].

use std::io;
use std::io::{Read, Write};
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::Mutex;
use socket2::Socket;

use rnet_core::asyncwork::Work;
use rnet_core::error::{CoreError, Result as CoreResult};
use rnet_core::listener::Listener;
use rnet_core::poller::{interest, Poller};

use crate::callback::{Operation, TcpCallback};
use crate::conn::{Conn, Connection};
use crate::logger::Logger;
use crate::server::ShutdownCoordinator;

const SCRATCH_SIZE: usize = 65_536;

/// Round-robin target for the reactor (main/sub) topology. Only the main
/// loop's [`TcpLoopShared`] carries one of these.
pub(crate) struct DispatchTarget {
    pub(crate) sub_loops: Vec<Arc<TcpLoopShared>>,
    next: AtomicUsize,
}

impl DispatchTarget {
    pub(crate) fn new(sub_loops: Vec<Arc<TcpLoopShared>>) -> Self {
        Self {
            sub_loops,
            next: AtomicUsize::new(0),
        }
    }
}

/// Shared, `Arc`-held state for one TCP loop. Every field is either
/// immutable after construction or interior-mutable, because both the
/// owning thread (inside `Poller::polling`) and triggered closures posted
/// from other threads reach it through the same `Arc`.
pub(crate) struct TcpLoopShared {
    idx: usize,
    poller: Poller,
    conns: Mutex<HashMap<i32, Connection>>,
    scratch: Mutex<Vec<u8>>,
    callback: Arc<dyn TcpCallback>,
    keepalive: Option<Duration>,
    logger: Arc<dyn Logger>,
    listener: Option<Arc<Listener>>,
    dispatch: Option<DispatchTarget>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl TcpLoopShared {
    pub(crate) fn new(
        idx: usize,
        callback: Arc<dyn TcpCallback>,
        keepalive: Option<Duration>,
        logger: Arc<dyn Logger>,
        listener: Option<Arc<Listener>>,
        dispatch: Option<DispatchTarget>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> CoreResult<Arc<Self>> {
        let poller = Poller::new()?;
        if let Some(l) = &listener {
            poller.add_read(l.as_raw_fd())?;
        }
        Ok(Arc::new(Self {
            idx,
            poller,
            conns: Mutex::new(HashMap::new()),
            scratch: Mutex::new(vec![0u8; SCRATCH_SIZE]),
            callback,
            keepalive,
            logger,
            listener,
            dispatch,
            shutdown,
        }))
    }

    #[must_use]
    pub(crate) fn idx(&self) -> usize {
        self.idx
    }

    pub(crate) fn trigger(&self, work: Work) -> CoreResult<()> {
        self.poller.trigger(work)
    }

    pub(crate) fn close_all_connections(&self) {
        let fds: Vec<i32> = self.conns.lock().keys().copied().collect();
        for fd in fds {
            let _ = self.close_connection(fd, None);
        }
    }

    /// Run this loop's poll cycle forever (until shutdown).
    pub(crate) fn run(self: &Arc<Self>) -> CoreResult<()> {
        self.logger
            .log_line(&format!("event-loop {}: starting", self.idx));
        let result = self.poller.polling(|fd, events| self.handle_event(fd, events));
        self.logger
            .log_line(&format!("event-loop {}: stopped", self.idx));
        result
    }

    fn handle_event(self: &Arc<Self>, fd: i32, events: u32) -> CoreResult<()> {
        if let Some(listener) = &self.listener {
            if fd == listener.as_raw_fd() {
                return self.handle_accept();
            }
        }
        self.handle_conn_event(fd, events)
    }

    fn handle_accept(self: &Arc<Self>) -> CoreResult<()> {
        let listener = self
            .listener
            .as_ref()
            .expect("handle_accept called without a listener");
        loop {
            match listener.accept() {
                Ok((socket, _peer)) => {
                    if let Err(e) = socket.set_nonblocking(true) {
                        self.logger
                            .log_line(&format!("event-loop {}: accept setup failed: {e}", self.idx));
                        continue;
                    }
                    if let Some(dispatch) = &self.dispatch {
                        let idx = dispatch.next.fetch_add(1, Ordering::Relaxed) % dispatch.sub_loops.len();
                        let sub = Arc::clone(&dispatch.sub_loops[idx]);
                        let sub_for_closure = Arc::clone(&sub);
                        if let Err(e) = sub.trigger(Box::new(move || sub_for_closure.admit_connection(socket))) {
                            self.logger
                                .log_line(&format!("event-loop {}: dispatch failed: {e}", self.idx));
                        }
                    } else {
                        self.admit_connection(socket)?;
                    }
                }
                Err(CoreError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.logger
                        .log_line(&format!("event-loop {}: accept failed: {e}", self.idx));
                    break;
                }
            }
        }
        Ok(())
    }

    fn admit_connection(self: &Arc<Self>, socket: Socket) -> CoreResult<()> {
        if let Some(interval) = self.keepalive {
            if let Err(e) = rnet_core::tcp::set_keepalive(&socket, interval) {
                self.logger.log_line(&format!("failed to set keepalive: {e}"));
            }
        }
        if let Err(e) = rnet_core::tcp::enable_tcp_nodelay(&socket) {
            self.logger.log_line(&format!("failed to enable TCP_NODELAY: {e}"));
        }

        let fd = socket.as_raw_fd();
        if let Err(e) = self.poller.add_read(fd) {
            self.logger
                .log_line(&format!("failed to register accepted connection: {e}"));
            return Ok(());
        }

        let connection = Connection::new(socket, Arc::clone(self));
        let (bytes, op) = {
            let mut conns = self.conns.lock();
            conns.insert(fd, connection);
            let connection = conns.get_mut(&fd).expect("just inserted");
            connection.opened = true;
            let mut view = Conn::new(connection);
            self.callback.on_conn_opened(&mut view)
        };

        if let Some(b) = bytes {
            self.opportunistic_write(fd, &b);
        }
        self.handle_operation(fd, op)
    }

    fn handle_conn_event(self: &Arc<Self>, fd: i32, events: u32) -> CoreResult<()> {
        let is_write_ready = events & interest::WRITE != 0;
        let is_read_ready = events & interest::READ != 0;

        let outbound_nonempty = self
            .conns
            .lock()
            .get(&fd)
            .map(|c| !c.outbound.is_empty())
            .unwrap_or(false);

        if outbound_nonempty {
            if is_write_ready {
                self.drain_write(fd);
            }
            return Ok(());
        }

        if is_read_ready {
            return self.handle_read(fd);
        }
        if is_write_ready {
            self.drain_write(fd);
        }
        Ok(())
    }

    fn handle_read(self: &Arc<Self>, fd: i32) -> CoreResult<()> {
        enum Outcome {
            Ok,
            WouldBlock,
            Closed(Option<io::Error>),
            Missing,
        }

        let outcome = {
            let mut scratch = self.scratch.lock();
            let mut conns = self.conns.lock();
            match conns.get_mut(&fd) {
                None => Outcome::Missing,
                Some(connection) => match connection.socket.read(&mut scratch[..]) {
                    Ok(0) => Outcome::Closed(None),
                    Ok(n) => {
                        connection.inbound.write(&scratch[..n]);
                        Outcome::Ok
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => Outcome::WouldBlock,
                    Err(e) => Outcome::Closed(Some(e)),
                },
            }
        };

        match outcome {
            Outcome::Missing | Outcome::WouldBlock => return Ok(()),
            Outcome::Closed(err) => return self.close_connection(fd, err),
            Outcome::Ok => {}
        }

        let result = self.with_conn(fd, |connection| {
            let mut view = Conn::new(connection);
            self.callback.conn_handler(&mut view)
        });
        let Some((bytes, op)) = result else {
            return Ok(());
        };
        if let Some(b) = bytes {
            self.opportunistic_write(fd, &b);
        }
        self.handle_operation(fd, op)
    }

    pub(crate) fn handle_wake(self: &Arc<Self>, fd: i32) -> CoreResult<()> {
        let result = self.with_conn(fd, |connection| {
            let mut view = Conn::new(connection);
            self.callback.on_waken_handler(&mut view)
        });
        let Some((bytes, op)) = result else {
            return Ok(());
        };
        if let Some(b) = bytes {
            self.opportunistic_write(fd, &b);
        }
        self.handle_operation(fd, op)
    }

    pub(crate) fn handle_async_write(self: &Arc<Self>, fd: i32, bytes: &[u8]) {
        self.opportunistic_write(fd, bytes);
    }

    fn with_conn<R>(&self, fd: i32, f: impl FnOnce(&mut Connection) -> R) -> Option<R> {
        let mut conns = self.conns.lock();
        conns.get_mut(&fd).map(f)
    }

    fn opportunistic_write(self: &Arc<Self>, fd: i32, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut conns = self.conns.lock();
        let Some(connection) = conns.get_mut(&fd) else {
            return;
        };

        if !connection.outbound.is_empty() {
            connection.outbound.write(bytes);
            self.enable_write_interest(connection, fd);
            return;
        }

        match connection.socket.write(bytes) {
            Ok(n) if n == bytes.len() => {}
            Ok(n) => {
                connection.outbound.write(&bytes[n..]);
                self.enable_write_interest(connection, fd);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                connection.outbound.write(bytes);
                self.enable_write_interest(connection, fd);
            }
            Err(e) => {
                drop(conns);
                let _ = self.close_connection(fd, Some(e));
            }
        }
    }

    fn enable_write_interest(&self, connection: &mut Connection, fd: i32) {
        if connection.write_interest {
            return;
        }
        match self.poller.mod_read_write(fd) {
            Ok(()) => connection.write_interest = true,
            Err(e) => self
                .logger
                .log_line(&format!("failed to register write interest for fd {fd}: {e}")),
        }
    }

    fn drain_write(self: &Arc<Self>, fd: i32) {
        let mut conns = self.conns.lock();
        let Some(connection) = conns.get_mut(&fd) else {
            return;
        };

        for _ in 0..2 {
            let outcome = {
                let (head, _tail) = connection.outbound.lazy_read_all();
                if head.is_empty() {
                    break;
                }
                connection.socket.write(head)
            };
            match outcome {
                Ok(n) => {
                    let full_head = {
                        let (head, _tail) = connection.outbound.lazy_read_all();
                        n == head.len()
                    };
                    connection.outbound.shift(n);
                    if !full_head {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    drop(conns);
                    let _ = self.close_connection(fd, Some(e));
                    return;
                }
            }
        }

        if connection.outbound.is_empty() && connection.write_interest {
            match self.poller.mod_read(fd) {
                Ok(()) => connection.write_interest = false,
                Err(e) => self
                    .logger
                    .log_line(&format!("failed to clear write interest for fd {fd}: {e}")),
            }
        }
    }

    pub(crate) fn close_connection(self: &Arc<Self>, fd: i32, err: Option<io::Error>) -> CoreResult<()> {
        let mut connection = {
            let mut conns = self.conns.lock();
            match conns.remove(&fd) {
                Some(c) => c,
                None => return Ok(()),
            }
        };
        if let Err(e) = self.poller.delete(fd) {
            self.logger
                .log_line(&format!("failed to remove fd {fd} from poller: {e}"));
        }
        let op = {
            let mut view = Conn::new(&mut connection);
            self.callback.on_conn_closed(&mut view, err)
        };
        // `connection.socket` drops here, closing the fd.
        drop(connection);

        if op == Operation::Shutdown {
            self.shutdown.signal();
            return Err(CoreError::Shutdown);
        }
        Ok(())
    }

    /// Flush whatever is left in `fd`'s outbound ring synchronously, by
    /// temporarily switching the socket to blocking mode. Called before
    /// closing a connection so a reply too large for one opportunistic
    /// `write(2)` still reaches the peer instead of being dropped when the
    /// fd closes mid-buffer.
    fn drain_write_before_close(self: &Arc<Self>, fd: i32) {
        let mut conns = self.conns.lock();
        let Some(connection) = conns.get_mut(&fd) else {
            return;
        };
        if connection.outbound.is_empty() {
            return;
        }

        let (head, tail) = connection.outbound.lazy_read_all();
        let remaining: Vec<u8> = head.iter().chain(tail.iter()).copied().collect();
        let total = remaining.len();

        if let Err(e) = connection.socket.set_nonblocking(false) {
            self.logger
                .log_line(&format!("failed to switch fd {fd} to blocking for close drain: {e}"));
        }
        if let Err(e) = connection.socket.write_all(&remaining) {
            self.logger
                .log_line(&format!("failed to drain outbound buffer before close on fd {fd}: {e}"));
        }
        connection.outbound.shift(total);
    }

    fn handle_operation(self: &Arc<Self>, fd: i32, op: Operation) -> CoreResult<()> {
        match op {
            Operation::None => Ok(()),
            Operation::Close => {
                self.drain_write_before_close(fd);
                self.close_connection(fd, None)
            }
            Operation::Shutdown => {
                self.drain_write_before_close(fd);
                let _ = self.close_connection(fd, None);
                self.shutdown.signal();
                Err(CoreError::Shutdown)
            }
        }
    }
}

/// Best-effort peer address formatting, used only for diagnostics before a
/// [`Connection`] exists (e.g. failed accepts).
#[allow(dead_code)]
fn peer_label(addr: SocketAddr) -> String {
    rnet_core::addr::format_addr(&addr)
}
