//! Target registry (C5): the ordered set of delivery endpoints a batch is
//! fanned out to.

use crate::error::ShipperError;
use async_trait::async_trait;
use bytes::Bytes;
use crate::ENTERPRISE_RETRIES;

/// The two kinds of delivery target a shipper can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Dispatches via the injected session API client, which owns its own
    /// auth, retry, and backoff.
    Enterprise,
    /// Dispatches via a raw HTTP POST; no retry at this layer.
    External,
}

/// A target's retry policy. Only consulted for `Enterprise` targets — the
/// session API client is what actually retries; this is just what the
/// dispatcher passes through to it.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub description: String,
}

/// A single delivery endpoint.
///
/// Target membership is immutable for the lifetime of a shipper instance —
/// targets are supplied once at construction and never added or removed.
#[derive(Debug, Clone)]
pub struct Target {
    pub kind: TargetKind,
    pub address: Option<String>,
    pub auth_token: Option<String>,
    pub retry: RetryPolicy,
}

impl Target {
    /// The implicit enterprise target, always first in dispatch order.
    pub fn enterprise() -> Self {
        Self {
            kind: TargetKind::Enterprise,
            address: None,
            auth_token: None,
            retry: RetryPolicy {
                max_attempts: ENTERPRISE_RETRIES,
                description: "enterprise session API".to_string(),
            },
        }
    }

    /// A user-configured external target. `auth_token` may be absent or
    /// empty: an `Authorization` header is still sent, just with an empty
    /// bearer value, and the remote decides whether to accept it.
    pub fn external(address: impl Into<String>, auth_token: Option<String>) -> Self {
        let address = address.into();
        Self {
            retry: RetryPolicy {
                max_attempts: 1,
                description: format!("external target {address}"),
            },
            kind: TargetKind::External,
            address: Some(address),
            auth_token,
        }
    }
}

/// The enterprise dispatch primitive: `SessionAPI.Post(path, body, retry,
/// maxAttempts, description)`. The client owns retry, backoff, and auth —
/// modeled as a trait so tests can substitute a mock.
#[async_trait]
pub trait SessionApiClient: Send + Sync {
    async fn post(
        &self,
        path: &str,
        body: Bytes,
        retry: bool,
        max_attempts: u32,
        description: &str,
    ) -> Result<(), ShipperError>;
}
