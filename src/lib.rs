//! Telemetry Shipper
//!
//! A buffered telemetry shipper: subscribes to an application event bus and
//! a logger, batches the observed records in memory, and periodically POSTs
//! size-bounded batches to one or more HTTP collectors.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use telemetry_shipper::{EventBus, Logger, SessionContext, ShipperConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = EventBus::new();
//!     let logger = Logger::new();
//!     let session = SessionContext::new(
//!         Some("session-1".into()),
//!         None,
//!         "env-1",
//!         "ns-1",
//!         "production",
//!         "default",
//!     );
//!
//!     let shipper = ShipperConfig::new(bus.clone(), logger, session)
//!         .external_target("https://collector.example.com", Some("token".into()))
//!         .build()?;
//!
//!     shipper.emit("user.signup", json!({"plan": "pro"}));
//!     shipper.close().await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

mod batcher;
mod buffer;
mod cleanup;
mod dispatch;
mod error;
mod eventbus;
mod flush;
mod logger;
mod records;
mod retry;
mod session;
mod session_client;
mod shipper;
mod size;
mod target;

pub use cleanup::{CleanupHook, CleanupRegistry, NoopCleanupRegistry, SignalCleanupRegistry};
pub use error::ShipperError;
pub use eventbus::{BusEvent, EventBus, Subscription};
pub use logger::Logger;
pub use records::{EventBatchEnvelope, EventRecord, LogBatchEnvelope, LogMessage, LogRecord};
pub use retry::{JitterMode, RetryConfig};
pub use session::SessionContext;
pub use session_client::HttpSessionApiClient;
pub use shipper::{Shipper, ShipperConfig, ShipperStats};
pub use target::{RetryPolicy, SessionApiClient, Target, TargetKind};

/// Interval between flush-loop ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Default per-batch byte budget: chosen to sit below typical reverse-proxy
/// body limits while still amortizing HTTP overhead.
pub const MAX_BATCH_BYTES_DEFAULT: usize = 600 * 1024;

/// Consecutive tick failures after which the flush loop disables itself for
/// the remainder of the run.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Retry attempts the enterprise session API client gets per dispatch.
pub const ENTERPRISE_RETRIES: u32 = 5;
