//! Startup and configuration error types.
//!
//! Transient per-connection I/O errors are not part of this enum: they're
//! delivered to the application through `TcpCallback::on_conn_closed` as a
//! plain `std::io::Error`.

use thiserror::Error;

/// Errors a caller of `Server::run` may observe.
#[derive(Error, Debug)]
pub enum Error {
    /// Bind, listen, non-blocking-set, or poller-construction failure.
    #[error(transparent)]
    Core(#[from] rnet_core::error::CoreError),

    /// A bare IO error from a setup step outside the kernel (e.g. a socket
    /// option that failed before the loop started).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `Config::network` was neither `Tcp` nor `Udp`.
    #[error("unsupported network protocol")]
    UnsupportedProtocol,
}

/// Result type alias for `rnet` setup/orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;
