//! One UDP event loop: receive a datagram, hand it to the callback, send
//! any reply.
//!
//! UDP has no per-peer connection state to own, so unlike
//! [`crate::tcp_loop`] there is only ever one kind of registered fd per
//! loop (the listener itself) and no main/sub-reactor dispatch: reuseport
//! mode just runs N independent loops, all polling the one bound socket
//! they were handed.

use std::io;
use std::sync::Arc;

use rnet_core::error::{CoreError, Result as CoreResult};
use rnet_core::listener::Listener;
use rnet_core::poller::Poller;

use crate::callback::{Operation, UdpCallback};
use crate::logger::Logger;
use crate::pack::Pack;
use crate::server::ShutdownCoordinator;

const SCRATCH_SIZE: usize = 65_536;

pub(crate) struct UdpLoopShared {
    idx: usize,
    poller: Poller,
    listener: Arc<Listener>,
    local_addr: String,
    callback: Arc<dyn UdpCallback>,
    logger: Arc<dyn Logger>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl UdpLoopShared {
    pub(crate) fn new(
        idx: usize,
        listener: Arc<Listener>,
        callback: Arc<dyn UdpCallback>,
        logger: Arc<dyn Logger>,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> CoreResult<Arc<Self>> {
        let poller = Poller::new()?;
        poller.add_read(listener.as_raw_fd())?;
        let local_addr = listener
            .local_addr()
            .map(|a| rnet_core::addr::format_addr(&a))
            .unwrap_or_else(|_| "unknown".to_string());
        Ok(Arc::new(Self {
            idx,
            poller,
            listener,
            local_addr,
            callback,
            logger,
            shutdown,
        }))
    }

    pub(crate) fn trigger(&self, work: rnet_core::asyncwork::Work) -> CoreResult<()> {
        self.poller.trigger(work)
    }

    pub(crate) fn run(self: &Arc<Self>) -> CoreResult<()> {
        self.logger
            .log_line(&format!("udp-loop {}: starting", self.idx));
        let mut scratch = vec![0u8; SCRATCH_SIZE];
        let result = self
            .poller
            .polling(|_fd, _events| self.handle_readable(&mut scratch));
        self.logger
            .log_line(&format!("udp-loop {}: stopped", self.idx));
        result
    }

    fn handle_readable(self: &Arc<Self>, scratch: &mut [u8]) -> CoreResult<()> {
        loop {
            let (n, peer) = match self.listener.recv_from(scratch) {
                Ok(pair) => pair,
                Err(CoreError::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    self.logger
                        .log_line(&format!("udp-loop {}: recv_from failed: {e}", self.idx));
                    return Ok(());
                }
            };

            let pack = Pack::new(peer, &self.local_addr);
            let (bytes, op) = self.callback.pack_handler(&scratch[..n], &pack);

            if let Some(reply) = bytes {
                if let Err(e) = self.listener.send_to(&reply, peer) {
                    let io_err = match e {
                        CoreError::Io(io_err) => io_err,
                        other => io::Error::other(other.to_string()),
                    };
                    self.callback.send_err(pack.remote_addr(), io_err);
                }
            }

            match op {
                Operation::None => {}
                Operation::Close => return Ok(()),
                Operation::Shutdown => {
                    self.shutdown.signal();
                    return Err(CoreError::Shutdown);
                }
            }
        }
    }
}
