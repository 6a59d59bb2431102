//! Deterministic on-wire byte-cost of a single record (C2).
//!
//! The value returned here is the exact number charged against a batch's byte
//! budget, so it MUST agree with what the wire serializer actually produces —
//! both routes go through [`canonical_len`], which serializes the very same
//! wire struct the dispatcher later sends, with no intermediate transform
//! that could make the two diverge.
//!
//! `serde_json::Value` is a tree, not a graph, so the cyclic payloads the
//! source implementation guards against with a `"[Circular]"` substitution
//! cannot occur here — there is no back-reference to substitute. A record
//! whose wire form fails to serialize at all (should never happen for a
//! `Value` tree; the one real case is a `NaN`/`Infinity` float, which JSON
//! has no representation for) is sized as `usize::MAX` so the batcher treats
//! it as oversize and drops it, per the `SerializationFailure` policy in the
//! error handling design.

use crate::records::{EventRecord, EventRecordWire, LogRecord, LogRecordWire};
use serde::Serialize;

pub fn size_of_event(record: &EventRecord) -> usize {
    canonical_len(&EventRecordWire::from(record))
}

pub fn size_of_log(record: &LogRecord) -> usize {
    canonical_len(&LogRecordWire::from(record))
}

fn canonical_len<T: Serialize>(wire: &T) -> usize {
    serde_json::to_vec(wire)
        .map(|bytes| bytes.len())
        .unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn size_matches_actual_serialization() {
        let record = EventRecord::new("e1", json!({"a": 1, "b": "two"}));
        let wire = EventRecordWire::from(&record);
        let actual = serde_json::to_vec(&wire).unwrap().len();
        assert_eq!(size_of_event(&record), actual);
    }

    #[test]
    fn size_matches_actual_serialization_for_deeply_nested_payloads() {
        let mut value = json!("leaf");
        for _ in 0..1_000 {
            value = json!([value]);
        }
        let record = EventRecord::new("deep", value);
        let wire = EventRecordWire::from(&record);
        let actual = serde_json::to_vec(&wire).unwrap().len();
        assert_eq!(size_of_event(&record), actual);
    }
}
