//! Batcher (C4): wires the generic [`RecordBuffer::take_batch`] to the
//! concrete record types, the size estimator, and the drop-breadcrumb
//! logging the spec requires (§4.2, §5 recursion safety).

use crate::buffer::RecordBuffer;
use crate::records::{EventRecord, EventRecordWire, LogRecord, LogRecordWire};
use crate::size::{size_of_event, size_of_log};

pub fn make_event_batch(buffer: &RecordBuffer<EventRecord>, max_bytes: usize) -> Vec<EventRecord> {
    buffer.take_batch(max_bytes, size_of_event, |record, n| {
        tracing::warn!(bytes = n, max_bytes, name = %record.name, "record too large ({n} bytes), dropping");
        log_dropped_breadcrumb(&EventRecordWire::from(record));
    })
}

pub fn make_log_batch(buffer: &RecordBuffer<LogRecord>, max_bytes: usize) -> Vec<LogRecord> {
    buffer.take_batch(max_bytes, size_of_log, |record, n| {
        tracing::warn!(bytes = n, max_bytes, key = %record.key, "record too large ({n} bytes), dropping");
        log_dropped_breadcrumb(&LogRecordWire::from(record));
    })
}

/// Repeatedly drain `make_batch` until the buffer is empty (`MakeAllBatches`).
/// Used by the drain-on-close path.
pub fn make_all_event_batches(
    buffer: &RecordBuffer<EventRecord>,
    max_bytes: usize,
) -> Vec<Vec<EventRecord>> {
    let mut batches = Vec::new();
    loop {
        let batch = make_event_batch(buffer, max_bytes);
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }
    batches
}

pub fn make_all_log_batches(
    buffer: &RecordBuffer<LogRecord>,
    max_bytes: usize,
) -> Vec<Vec<LogRecord>> {
    let mut batches = Vec::new();
    loop {
        let batch = make_log_batch(buffer, max_bytes);
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }
    batches
}

/// Emit the serialized form of a dropped record at the shipper's lowest
/// verbosity level, tagged with an internal target so the log-stream
/// subscriber never re-ingests it (it is not going through the host's
/// `Logger`/`EventBus` at all — see the recursion-safety design note).
fn log_dropped_breadcrumb(wire: &impl serde::Serialize) {
    if let Ok(serialized) = serde_json::to_string(wire) {
        tracing::trace!(
            target: "telemetry_shipper::internal",
            dropped_record = %serialized,
            "dropped oversize record"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{LogMessage, LogRecord};
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn oversize_log_record_is_dropped_with_no_batch_produced() {
        let buffer = RecordBuffer::new();
        buffer.append(LogRecord {
            key: "k1".into(),
            timestamp: Utc::now(),
            level: 3,
            context: json!({}),
            message: LogMessage {
                msg: "x".repeat(500),
                ..Default::default()
            },
            metadata: None,
        });

        let batch = make_log_batch(&buffer, 100);
        assert!(batch.is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn basic_flush_preserves_append_order() {
        let buffer = RecordBuffer::new();
        buffer.append(EventRecord::new("e1", json!({})));
        buffer.append(EventRecord::new("e2", json!({})));
        buffer.append(EventRecord::new("e3", json!({})));

        let batch = make_event_batch(&buffer, 1024 * 1024);
        let names: Vec<_> = batch.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec!["e1", "e2", "e3"]);
        assert!(buffer.is_empty());
    }
}
