//! Server configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::logger::{Logger, StderrLogger};

/// Transport a [`crate::Server`] is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
    Udp,
}

/// Server configuration.
///
/// Built fluently via the `with_*` methods, mirroring the option-builder
/// shape used elsewhere in this workspace.
///
/// # Examples
///
/// ```
/// use rnet::Config;
/// use std::time::Duration;
///
/// let cfg = Config::new("127.0.0.1:0")
///     .with_reuse_port(true)
///     .with_multicore(4)
///     .with_tcp_keepalive(Some(Duration::from_secs(30)));
/// ```
#[derive(Clone)]
pub struct Config {
    /// Transport to bind (TCP or UDP).
    pub network: Network,

    /// `host:port` string passed to bind.
    pub addr: String,

    /// Run one independent loop per worker, each polling the same listener
    /// fd for read, instead of a single acceptor dispatching to
    /// sub-reactors. Whichever loop's `epoll_wait` wakes first accepts
    /// each incoming connection.
    pub reuse_port: bool,

    /// Number of worker loops. `0` means "hardware concurrency"
    /// (`num_cpus::get()`).
    pub multicore: usize,

    /// TCP keepalive interval, applied to both the idle time and probe
    /// interval on every accepted connection. Ignored for UDP.
    pub tcp_keepalive: Option<Duration>,

    /// Line sink for server lifecycle messages. Defaults to
    /// [`StderrLogger`] when not set.
    pub logger: Option<Arc<dyn Logger>>,
}

impl Config {
    /// Start building a TCP configuration for `addr`.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            network: Network::Tcp,
            addr: addr.into(),
            reuse_port: false,
            multicore: 0,
            tcp_keepalive: None,
            logger: None,
        }
    }

    /// Select the transport to bind.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Select the reuseport topology (`true`) or the main/sub-reactor
    /// topology (`false`, the default).
    #[must_use]
    pub fn with_reuse_port(mut self, enabled: bool) -> Self {
        self.reuse_port = enabled;
        self
    }

    /// Number of worker loops. `0` resolves to hardware concurrency.
    #[must_use]
    pub fn with_multicore(mut self, n: usize) -> Self {
        self.multicore = n;
        self
    }

    /// TCP keepalive interval; `None` leaves keepalive disabled.
    #[must_use]
    pub fn with_tcp_keepalive(mut self, interval: Option<Duration>) -> Self {
        self.tcp_keepalive = interval;
        self
    }

    /// Override the line sink used for server lifecycle messages.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Number of worker loops to actually start, resolving `0` to
    /// hardware concurrency.
    #[must_use]
    pub fn resolved_multicore(&self) -> usize {
        if self.multicore == 0 {
            num_cpus::get().max(1)
        } else {
            self.multicore
        }
    }

    /// The configured logger, or a [`StderrLogger`] if none was set.
    #[must_use]
    pub fn resolved_logger(&self) -> Arc<dyn Logger> {
        self.logger.clone().unwrap_or_else(|| Arc::new(StderrLogger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_multicore_falls_back_to_hardware_concurrency() {
        let cfg = Config::new("127.0.0.1:0");
        assert_eq!(cfg.resolved_multicore(), num_cpus::get().max(1));
    }

    #[test]
    fn resolved_multicore_honors_explicit_value() {
        let cfg = Config::new("127.0.0.1:0").with_multicore(3);
        assert_eq!(cfg.resolved_multicore(), 3);
    }

    #[test]
    fn resolved_logger_defaults_to_stderr() {
        let cfg = Config::new("127.0.0.1:0");
        // Just exercise the fallback path; StderrLogger has no visible state.
        let _logger = cfg.resolved_logger();
    }
}
