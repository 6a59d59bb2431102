//! The host logger's root event stream.
//!
//! Modeled the same way as [`crate::eventbus::EventBus`]: a broadcast channel
//! with an explicit `Subscription` handle. Log entries are already in their
//! canonical [`LogRecord`] shape by the time they reach this bus — the raw
//! render-to-record conversion is the logger's own concern, out of scope for
//! this crate (§1).
//!
//! Critically, this channel is entirely separate from the `tracing` calls the
//! shipper makes about itself (drop breadcrumbs, circuit-breaker trace
//! lines). Internal shipper logs never flow through a `Logger`, so there is
//! no path by which the log-stream subscriber could re-ingest its own
//! breadcrumbs — the recursion-safety open question (§9) is resolved by
//! using a different channel entirely, not by a fragile verbosity ordering.

use crate::records::LogRecord;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct Logger {
    sender: broadcast::Sender<LogRecord>,
}

impl Logger {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(4096);
        Self { sender }
    }

    /// Emit a log record to the root stream (called by the host's logging
    /// implementation, out of scope here).
    pub fn emit(&self, record: LogRecord) {
        let _ = self.sender.send(record);
    }

    pub(crate) fn receiver(&self) -> broadcast::Receiver<LogRecord> {
        self.sender.subscribe()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}
