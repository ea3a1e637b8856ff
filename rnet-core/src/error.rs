//! Error types for the event-loop kernel.

use std::io;
use thiserror::Error;

/// Errors raised by the ring buffer, async-work queue, and poller.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Syscall failure (`epoll_create1`, `eventfd`, `epoll_ctl`, `epoll_wait`, ...).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A read was attempted on an empty ring buffer.
    #[error("ring buffer is empty")]
    BufferEmpty,

    /// The requested capacity would overflow the buffer's growth doubling.
    #[error("ring buffer capacity overflow: requested {0} bytes")]
    CapacityOverflow(usize),

    /// Sentinel returned by a triggered closure to unwind the poller cleanly.
    ///
    /// Not a failure: `Poller::polling` treats this as a normal exit.
    #[error("shutdown requested")]
    Shutdown,
}

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// True for transient conditions a caller may retry (`EAGAIN`/`EWOULDBLOCK`/`EINTR`).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// True when this is the shutdown sentinel rather than a genuine failure.
    #[must_use]
    pub const fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}
