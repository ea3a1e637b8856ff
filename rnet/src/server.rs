//! Server orchestration: binds listeners, starts loop threads for one of
//! the two concurrency topologies, and coordinates a clean shutdown.
//!
//! - **Reuseport**: one listener, bound once, registered for read into `N`
//!   independent loops' pollers. The kernel wakes every epoll set watching
//!   the fd, so whichever loop calls `accept()` first gets each connection
//!   and the rest see `EWOULDBLOCK`; there is no shared state between loops
//!   beyond the listener, the callback, and the shutdown coordinator.
//! - **Reactor**: one listener, accepted on a dedicated main loop, which
//!   round-robins accepted sockets out to `N` sub-loops that never touch
//!   the listener themselves. Chosen over one-fd-in-many-epoll-sets
//!   because the accept/dispatch boundary is explicit and each sub-loop's
//!   fd set stays private to its own epoll instance.
//!
//! UDP has no connection to hand off, so it only ever runs the reuseport
//! shape: `reuse_port = false` just means "one loop, one socket".

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

use rnet_core::error::CoreError;
use rnet_core::listener::{Listener, Network as CoreNetwork};

use crate::callback::{TcpCallback, UdpCallback};
use crate::config::{Config, Network};
use crate::error::{Error, Result};
use crate::tcp_loop::{DispatchTarget, TcpLoopShared};
use crate::udp_loop::UdpLoopShared;

/// Once-gate shutdown signal shared by every loop a `Server::run_*` call
/// spawns, plus the watcher thread and the SIGINT/SIGTERM handler.
pub(crate) struct ShutdownCoordinator {
    signaled: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl ShutdownCoordinator {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            signaled: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        })
    }

    /// Idempotent: the first caller wakes every waiter, later callers are
    /// no-ops.
    pub(crate) fn signal(&self) {
        if self.signaled.swap(true, Ordering::SeqCst) {
            return;
        }
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut guard = self.mutex.lock();
        while !self.signaled.load(Ordering::SeqCst) {
            self.condvar.wait(&mut guard);
        }
    }
}

fn to_core_network(network: Network) -> CoreNetwork {
    match network {
        Network::Tcp => CoreNetwork::Tcp,
        Network::Udp => CoreNetwork::Udp,
    }
}

fn parse_addr(addr: &str) -> Result<SocketAddr> {
    addr.parse()
        .map_err(|_| Error::Io(std::io::Error::other(format!("invalid address: {addr}"))))
}

/// Installs SIGINT/SIGTERM handlers that signal `shutdown`, and returns the
/// watcher thread's handle. Dropping the returned `Signals` handle (owned
/// by the spawned thread) has no effect on already-delivered signals.
fn spawn_signal_watcher(shutdown: Arc<ShutdownCoordinator>) -> std::io::Result<JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    Ok(thread::spawn(move || {
        if signals.forever().next().is_some() {
            shutdown.signal();
        }
    }))
}

/// Blocks the calling thread, running `N` TCP event loops under the
/// topology chosen by `config.reuse_port`, until the callback requests a
/// shutdown or the process receives SIGINT/SIGTERM.
pub struct Server;

impl Server {
    /// Run a TCP server. Blocks until shutdown.
    pub fn run_tcp(config: Config, callback: Arc<dyn TcpCallback>) -> Result<()> {
        if config.network != Network::Tcp {
            return Err(Error::UnsupportedProtocol);
        }
        let addr = parse_addr(&config.addr)?;
        let logger = config.resolved_logger();
        let n = config.resolved_multicore();
        let shutdown = ShutdownCoordinator::new();

        let (loops, listeners) = if config.reuse_port {
            build_reuseport_tcp_loops(addr, n, &callback, &config, &logger, &shutdown)?
        } else {
            build_reactor_tcp_loops(addr, n, &callback, &config, &logger, &shutdown)?
        };

        run_loops(loops, listeners, shutdown, &logger)
    }

    /// Run a UDP server. Blocks until shutdown.
    pub fn run_udp(config: Config, callback: Arc<dyn UdpCallback>) -> Result<()> {
        if config.network != Network::Udp {
            return Err(Error::UnsupportedProtocol);
        }
        let addr = parse_addr(&config.addr)?;
        let logger = config.resolved_logger();
        let n = if config.reuse_port { config.resolved_multicore() } else { 1 };
        let shutdown = ShutdownCoordinator::new();

        let listener = Arc::new(Listener::bind(addr, to_core_network(Network::Udp), false)?);
        let mut loops: Vec<Arc<UdpLoopShared>> = Vec::with_capacity(n);
        for i in 0..n {
            let lp = UdpLoopShared::new(i, Arc::clone(&listener), Arc::clone(&callback), Arc::clone(&logger), Arc::clone(&shutdown))?;
            loops.push(lp);
        }

        run_udp_loops(loops, vec![listener], shutdown, &logger)
    }
}

fn build_reuseport_tcp_loops(
    addr: SocketAddr,
    n: usize,
    callback: &Arc<dyn TcpCallback>,
    config: &Config,
    logger: &Arc<dyn crate::logger::Logger>,
    shutdown: &Arc<ShutdownCoordinator>,
) -> Result<(Vec<Arc<TcpLoopShared>>, Vec<Arc<Listener>>)> {
    let listener = Arc::new(Listener::bind(addr, to_core_network(Network::Tcp), false)?);
    let mut loops = Vec::with_capacity(n);
    for i in 0..n {
        let lp = TcpLoopShared::new(
            i,
            Arc::clone(callback),
            config.tcp_keepalive,
            Arc::clone(logger),
            Some(Arc::clone(&listener)),
            None,
            Arc::clone(shutdown),
        )?;
        loops.push(lp);
    }
    Ok((loops, vec![listener]))
}

fn build_reactor_tcp_loops(
    addr: SocketAddr,
    n: usize,
    callback: &Arc<dyn TcpCallback>,
    config: &Config,
    logger: &Arc<dyn crate::logger::Logger>,
    shutdown: &Arc<ShutdownCoordinator>,
) -> Result<(Vec<Arc<TcpLoopShared>>, Vec<Arc<Listener>>)> {
    let mut sub_loops = Vec::with_capacity(n);
    for i in 0..n {
        let lp = TcpLoopShared::new(
            i,
            Arc::clone(callback),
            config.tcp_keepalive,
            Arc::clone(logger),
            None,
            None,
            Arc::clone(shutdown),
        )?;
        sub_loops.push(lp);
    }

    let listener = Arc::new(Listener::bind(addr, to_core_network(Network::Tcp), false)?);
    let main_loop = TcpLoopShared::new(
        n,
        Arc::clone(callback),
        config.tcp_keepalive,
        Arc::clone(logger),
        Some(Arc::clone(&listener)),
        Some(DispatchTarget::new(sub_loops.clone())),
        Arc::clone(shutdown),
    )?;

    let mut loops = sub_loops;
    loops.push(main_loop);
    Ok((loops, vec![listener]))
}

fn run_loops(
    loops: Vec<Arc<TcpLoopShared>>,
    listeners: Vec<Arc<Listener>>,
    shutdown: Arc<ShutdownCoordinator>,
    logger: &Arc<dyn crate::logger::Logger>,
) -> Result<()> {
    let handles: Vec<JoinHandle<()>> = loops
        .iter()
        .map(|lp| {
            let lp = Arc::clone(lp);
            thread::spawn(move || {
                if let Err(e) = lp.run() {
                    eprintln!("event-loop {} exited with error: {e}", lp.idx());
                }
            })
        })
        .collect();

    let signal_handle = spawn_signal_watcher(Arc::clone(&shutdown)).ok();

    shutdown.wait();
    logger.log_line("shutdown requested, stopping loops");

    for lp in &loops {
        let lp_for_closure = Arc::clone(lp);
        let _ = lp.trigger(Box::new(move || {
            lp_for_closure.close_all_connections();
            Err(CoreError::Shutdown)
        }));
    }

    for handle in handles {
        let _ = handle.join();
    }
    for listener in listeners {
        listener.close();
    }
    if let Some(h) = signal_handle {
        // The signals iterator thread blocks forever on delivery; once the
        // process is shutting down there is nothing left worth waiting on.
        drop(h);
    }

    Ok(())
}

fn run_udp_loops(
    loops: Vec<Arc<UdpLoopShared>>,
    listeners: Vec<Arc<Listener>>,
    shutdown: Arc<ShutdownCoordinator>,
    logger: &Arc<dyn crate::logger::Logger>,
) -> Result<()> {
    let handles: Vec<JoinHandle<()>> = loops
        .iter()
        .map(|lp| {
            let lp = Arc::clone(lp);
            thread::spawn(move || {
                if let Err(e) = lp.run() {
                    eprintln!("udp-loop exited with error: {e}");
                }
            })
        })
        .collect();

    let signal_handle = spawn_signal_watcher(Arc::clone(&shutdown)).ok();

    shutdown.wait();
    logger.log_line("shutdown requested, stopping loops");

    for lp in &loops {
        let _ = lp.trigger(Box::new(|| Err(CoreError::Shutdown)));
    }

    for handle in handles {
        let _ = handle.join();
    }
    for listener in listeners {
        listener.close();
    }
    if let Some(h) = signal_handle {
        drop(h);
    }

    Ok(())
}
