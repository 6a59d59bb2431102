//! Record and envelope types: the shapes the shipper buffers and the shapes
//! it puts on the wire.
//!
//! Domain types (`EventRecord`, `LogRecord`) are kept distinct from their wire
//! counterparts (`EventRecordWire`, `LogRecordWire`) because the wire shapes
//! carry backward-compatibility duplication (`environmentId`/`environment`)
//! that has no business living on the in-memory record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// An application event observed from the event bus or emitted by the host.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub name: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// A log entry observed from the logger's root stream.
///
/// `level` is an integer scale where lower is more severe; the shipper keeps
/// records with `level <= max_log_level`.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub level: i32,
    pub context: Value,
    pub message: LogMessage,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct LogMessage {
    pub section: Option<String>,
    pub msg: String,
    pub raw_msg: Option<String>,
    pub symbol: Option<String>,
    pub data: Option<Value>,
    pub data_format: Option<String>,
    /// Rendered explanation string of an attached error, or empty.
    pub error_text: String,
}

/// Wire shape of an [`EventRecord`] inside an [`EventBatchEnvelope`].
#[derive(Debug, Clone, Serialize)]
pub struct EventRecordWire {
    pub name: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl From<&EventRecord> for EventRecordWire {
    fn from(r: &EventRecord) -> Self {
        Self {
            name: r.name.clone(),
            payload: r.payload.clone(),
            timestamp: r.timestamp,
        }
    }
}

/// Wire shape of a [`LogRecord`] inside a [`LogBatchEnvelope`].
#[derive(Debug, Clone, Serialize)]
pub struct LogRecordWire {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub level: i32,
    pub context: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub message: LogMessageWire,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogMessageWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub msg: String,
    #[serde(rename = "rawMsg", skip_serializing_if = "Option::is_none")]
    pub raw_msg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(rename = "dataFormat", skip_serializing_if = "Option::is_none")]
    pub data_format: Option<String>,
    pub error: String,
}

impl From<&LogRecord> for LogRecordWire {
    fn from(r: &LogRecord) -> Self {
        Self {
            key: r.key.clone(),
            timestamp: r.timestamp,
            level: r.level,
            context: r.context.clone(),
            metadata: r.metadata.clone(),
            message: LogMessageWire {
                section: r.message.section.clone(),
                msg: r.message.msg.clone(),
                raw_msg: r.message.raw_msg.clone(),
                symbol: r.message.symbol.clone(),
                data: r.message.data.clone(),
                data_format: r.message.data_format.clone(),
                error: r.message.error_text.clone(),
            },
        }
    }
}

/// Envelope wrapping a batch of events with session/workflow metadata,
/// constructed at flush time. `environmentId`/`environment` and
/// `namespaceId`/`namespace` are intentionally duplicated for backward
/// compatibility with older collectors — both MUST be sent.
#[derive(Debug, Clone, Serialize)]
pub struct EventBatchEnvelope {
    pub events: Vec<EventRecordWire>,
    #[serde(rename = "workflowRunUid", skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "projectUid", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(rename = "environmentId")]
    pub environment_id: String,
    #[serde(rename = "namespaceId")]
    pub namespace_id: String,
    pub environment: String,
    pub namespace: String,
}

/// Envelope wrapping a batch of log entries with session/workflow metadata.
#[derive(Debug, Clone, Serialize)]
pub struct LogBatchEnvelope {
    #[serde(rename = "logEntries")]
    pub log_entries: Vec<LogRecordWire>,
    #[serde(rename = "workflowRunUid", skip_serializing_if = "Option::is_none")]
    pub workflow_run_id: Option<String>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "projectUid", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}
