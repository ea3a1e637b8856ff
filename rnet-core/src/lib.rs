//! rnet-core
//!
//! The runtime-agnostic event-loop kernel that the `rnet` crate builds its
//! TCP/UDP server engine on top of:
//! - a power-of-two ring buffer for inbound/outbound byte queues (`ringbuf`)
//! - a cross-thread async-work queue (`asyncwork`)
//! - an epoll + eventfd readiness notifier (`poller`)
//! - socket address formatting helpers (`addr`)
//! - a bind/listen/recv/send wrapper shared by both concurrency topologies
//!   and both transports (`listener`)
//! - TCP socket option helpers (`tcp`)
//! - kernel-level error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]

pub mod addr;
pub mod asyncwork;
pub mod error;
pub mod ringbuf;
pub mod tcp;

// Talks to the kernel directly (epoll_create1/epoll_ctl/epoll_wait/eventfd,
// recvfrom/sendto) and opts back into unsafe code locally; the crate-wide
// `deny` still applies to every other module.
#[allow(unsafe_code)]
pub mod listener;

#[allow(unsafe_code)]
pub mod poller;

pub mod prelude {
    pub use crate::addr::{format_addr, local_addr_string, peer_addr_string};
    pub use crate::asyncwork::{Queue, Work};
    pub use crate::error::{CoreError, Result};
    pub use crate::listener::{Listener, Network};
    pub use crate::poller::{interest, Poller};
    pub use crate::ringbuf::RingBuffer;
}
