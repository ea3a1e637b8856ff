//! User-facing line sink.
//!
//! Separate from the crate's internal `tracing` instrumentation (see
//! [`crate::dev_tracing`]): this is the one place the external interface
//! hands the caller a plain logging callback, so an application that
//! already has its own sink (file, metrics pipeline, its own `tracing`
//! subscriber) can route server lifecycle lines into it without the
//! library forcing a global subscriber on them.

use std::io::Write as _;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A line-oriented log sink.
pub trait Logger: Send + Sync {
    fn log_line(&self, line: &str);
}

/// Default logger: writes `[rnet] <RFC 3339 timestamp> <line>` to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log_line(&self, line: &str) {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("unknown-time"));
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "[rnet] {timestamp} {line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_logger_does_not_panic() {
        let logger = StderrLogger;
        logger.log_line("test line");
    }
}
