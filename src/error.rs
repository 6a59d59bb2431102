//! Error types for the telemetry shipper.

use thiserror::Error;

/// Errors the shipper can produce.
///
/// None of these are ever returned from the public entry points the host
/// calls during normal operation (`emit`, `stream_log`, `close`) — they are
/// logged and swallowed internally. Shipping telemetry is always a side
/// concern to the host program. Subscribing to the event bus and log stream
/// (`Construct`/`Connect`) is backed by `tokio::sync::broadcast`, which is
/// infallible to subscribe to, so this crate has no listener-registration
/// failure kind to report: there is no path by which it could occur.
#[derive(Debug, Error)]
pub enum ShipperError {
    /// A single target's delivery attempt failed. Carries enough context to
    /// log a useful debug line; never propagated out of `Dispatch`.
    #[error("dispatch to {target} failed: {message}")]
    Dispatch { target: String, message: String },

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("json error: {0}")]
    Json(String),
}

impl ShipperError {
    /// Whether retrying the same request again might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ShipperError::Network(e) => !e.is_builder(),
            ShipperError::Dispatch { .. } => true,
            ShipperError::Json(_) => false,
        }
    }
}

impl From<reqwest::Error> for ShipperError {
    fn from(err: reqwest::Error) -> Self {
        ShipperError::Network(err)
    }
}

impl From<serde_json::Error> for ShipperError {
    fn from(err: serde_json::Error) -> Self {
        ShipperError::Json(err.to_string())
    }
}
