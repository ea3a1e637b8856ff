//! # rnet
//!
//! A Linux-native, epoll-based event loop library for TCP and UDP servers.
//!
//! ## Architecture
//!
//! - **`rnet-core`**: the runtime-agnostic kernel — ring buffer, async-work
//!   queue, epoll + eventfd readiness notifier, bind/listen wrapper.
//! - **`rnet`** (this crate): connection state, callback contracts, and the
//!   server orchestrator built on top of it.
//!
//! ## Concurrency topologies
//!
//! - **Reuseport** (`Config::with_reuse_port(true)`): one listener fd
//!   registered for read into `N` independent worker loops' epoll sets.
//!   Whichever loop wakes first accepts each connection.
//! - **Reactor** (the default): one listener accepted on a dedicated main
//!   loop, which round-robins accepted sockets out to `N` sub-loops.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use rnet::{Conn, Config, Operation, Server, TcpCallback};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl TcpCallback for Echo {
//!     fn conn_handler(&self, conn: &mut Conn<'_>) -> (Option<Vec<u8>>, Operation) {
//!         let (len, head, tail) = conn.read();
//!         let mut reply = Vec::with_capacity(len);
//!         reply.extend_from_slice(head);
//!         reply.extend_from_slice(tail);
//!         conn.shift_n(len);
//!         (Some(reply), Operation::None)
//!     }
//! }
//!
//! # fn main() -> rnet::Result<()> {
//! let config = Config::new("127.0.0.1:9000").with_multicore(4);
//! Server::run_tcp(config, Arc::new(Echo))
//! # }
//! ```
//!
//! ## Safety
//!
//! `unsafe` code is isolated to `rnet-core`'s `poller` module (raw epoll
//! and eventfd syscalls) and `listener` module (raw `recvfrom`/`sendto`
//! for UDP). Everything above that, in both crates, is safe Rust.

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod callback;
pub mod config;
pub mod logger;
pub mod pack;

mod conn;
mod error;
mod server;
mod tcp_loop;
mod udp_loop;

pub use callback::{CallbackReturn, Operation, TcpCallback, UdpCallback};
pub use config::{Config, Network};
pub use conn::{Conn, ConnHandle};
pub use error::{Error, Result};
pub use logger::{Logger, StderrLogger};
pub use pack::Pack;
pub use server::Server;

/// Development helpers (tests).
pub mod dev_tracing;
