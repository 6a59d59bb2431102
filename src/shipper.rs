//! Lifecycle controller (C8): the public entry point. Subscribes to the
//! event bus and logger, owns the buffers and flush loop, and drains on
//! close.

use crate::batcher::{make_all_event_batches, make_all_log_batches};
use crate::buffer::RecordBuffer;
use crate::cleanup::{CleanupRegistry, NoopCleanupRegistry};
use crate::dispatch::dispatch;
use crate::error::ShipperError;
use crate::eventbus::{EventBus, Subscription};
use crate::flush::{run_tick, spawn_flush_loop, FlushContext, FlushState};
use crate::logger::Logger;
use crate::records::{
    EventBatchEnvelope, EventRecord, EventRecordWire, LogBatchEnvelope, LogRecord,
};
use crate::session::SessionContext;
use crate::target::{SessionApiClient, Target};
use crate::{MAX_BATCH_BYTES_DEFAULT, MAX_CONSECUTIVE_FAILURES, TICK_INTERVAL};
use parking_lot::Mutex as SyncMutex;
use reqwest::Client;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

/// Event names beginning with this prefix are control events: consumed
/// internally, never forwarded to a remote target.
const CONTROL_EVENT_PREFIX: &str = "_";
const WORKFLOW_RUN_REGISTERED_EVENT: &str = "_workflowRunRegistered";

type ShouldStreamFn = Arc<dyn Fn(&str, &Value) -> bool + Send + Sync>;

fn default_should_stream() -> ShouldStreamFn {
    Arc::new(|_, _| true)
}

/// Builder for [`Shipper`]. Mirrors the teacher crate's `*Builder` structs:
/// fluent `with_*` setters over a plain struct, consumed by `build`.
#[must_use]
pub struct ShipperConfig {
    event_bus: EventBus,
    logger: Logger,
    session: SessionContext,
    targets: Vec<Target>,
    max_log_level: i32,
    stream_events: bool,
    stream_logs: bool,
    max_batch_bytes: usize,
    tick_interval: Duration,
    should_stream: ShouldStreamFn,
    session_client: Option<Arc<dyn SessionApiClient>>,
    http: Client,
    cleanup_registry: Arc<dyn CleanupRegistry>,
}

impl ShipperConfig {
    pub fn new(event_bus: EventBus, logger: Logger, session: SessionContext) -> Self {
        Self {
            event_bus,
            logger,
            session,
            targets: Vec::new(),
            max_log_level: i32::MAX,
            stream_events: true,
            stream_logs: true,
            max_batch_bytes: MAX_BATCH_BYTES_DEFAULT,
            tick_interval: TICK_INTERVAL,
            should_stream: default_should_stream(),
            session_client: None,
            http: Client::new(),
            cleanup_registry: Arc::new(NoopCleanupRegistry),
        }
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    /// Convenience over `with_target(Target::external(..))` (not named in
    /// the base design, but a natural addition once `Target::external`
    /// exists as a public constructor).
    pub fn external_target(self, address: impl Into<String>, auth_token: Option<String>) -> Self {
        self.with_target(Target::external(address, auth_token))
    }

    pub fn max_log_level(mut self, level: i32) -> Self {
        self.max_log_level = level;
        self
    }

    pub fn stream_events(mut self, enabled: bool) -> Self {
        self.stream_events = enabled;
        self
    }

    pub fn stream_logs(mut self, enabled: bool) -> Self {
        self.stream_logs = enabled;
        self
    }

    pub fn max_batch_bytes(mut self, bytes: usize) -> Self {
        self.max_batch_bytes = bytes;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn should_stream(mut self, predicate: impl Fn(&str, &Value) -> bool + Send + Sync + 'static) -> Self {
        self.should_stream = Arc::new(predicate);
        self
    }

    pub fn session_client(mut self, client: Arc<dyn SessionApiClient>) -> Self {
        self.session_client = Some(client);
        self
    }

    pub fn http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn cleanup_registry(mut self, registry: Arc<dyn CleanupRegistry>) -> Self {
        self.cleanup_registry = registry;
        self
    }

    /// The implicit enterprise target (§4.6) is inserted first in dispatch
    /// order here, and only when a `session_client` was actually injected —
    /// an enterprise target with nothing to dispatch through would otherwise
    /// fail every tick and trip the circuit breaker for a shipper that was
    /// never asked to talk to the enterprise collector in the first place.
    pub fn build(mut self) -> Result<Shipper, ShipperError> {
        if self.session_client.is_some() {
            self.targets.insert(0, Target::enterprise());
        }
        Shipper::new(self)
    }
}

/// A point-in-time snapshot of shipper state, exposed for host
/// introspection (diagnostics, health checks) — a supplemented capability,
/// since the buffers and counters already exist internally.
#[derive(Debug, Clone)]
pub struct ShipperStats {
    pub event_buffer_len: usize,
    pub log_buffer_len: usize,
    pub consecutive_failures: u32,
    pub flush_enabled: bool,
    pub closed: bool,
}

struct Inner {
    event_buffer: Arc<RecordBuffer<EventRecord>>,
    log_buffer: Arc<RecordBuffer<LogRecord>>,
    session: Arc<SessionContext>,
    state: Arc<FlushState>,
    ctx: Arc<FlushContext>,
    max_log_level: i32,
    stream_events: bool,
    stream_logs: bool,
    should_stream: ShouldStreamFn,
    closed: AtomicBool,
    flush_handle: SyncMutex<Option<JoinHandle<()>>>,
    event_sub: AsyncMutex<Option<(usize, Subscription)>>,
    #[allow(dead_code)]
    log_sub: SyncMutex<Option<Subscription>>,
}

/// The buffered telemetry shipper. Cheap to clone — clones share the same
/// buffers, state, and background tasks.
#[derive(Clone)]
pub struct Shipper {
    inner: Arc<Inner>,
}

impl Shipper {
    /// `Construct` (§4.5): subscribe to the logger and event bus, install
    /// the abnormal-exit hook, and start the flush loop.
    fn new(config: ShipperConfig) -> Result<Self, ShipperError> {
        let event_buffer = Arc::new(RecordBuffer::new());
        let log_buffer = Arc::new(RecordBuffer::new());
        let session = Arc::new(config.session);

        let log_sub = spawn_log_listener(
            &config.logger,
            log_buffer.clone(),
            config.max_log_level,
            config.stream_logs,
        );

        let event_sub = spawn_event_listener(
            &config.event_bus,
            event_buffer.clone(),
            session.clone(),
            config.stream_events,
            config.should_stream.clone(),
        );

        let state = Arc::new(FlushState::new(MAX_CONSECUTIVE_FAILURES));
        let ctx = Arc::new(FlushContext {
            http: config.http,
            session_client: config.session_client,
            session: session.clone(),
            targets: config.targets,
            max_batch_bytes: config.max_batch_bytes,
        });

        let flush_handle = spawn_flush_loop(
            ctx.clone(),
            state.clone(),
            event_buffer.clone(),
            log_buffer.clone(),
            config.tick_interval,
        );

        let inner = Arc::new(Inner {
            event_buffer,
            log_buffer,
            session,
            state,
            ctx,
            max_log_level: config.max_log_level,
            stream_events: config.stream_events,
            stream_logs: config.stream_logs,
            should_stream: config.should_stream,
            closed: AtomicBool::new(false),
            flush_handle: SyncMutex::new(Some(flush_handle)),
            event_sub: AsyncMutex::new(Some((config.event_bus.id(), event_sub))),
            log_sub: SyncMutex::new(Some(log_sub)),
        });

        let shipper = Self { inner };
        shipper.install_abnormal_exit_hook(config.cleanup_registry);
        Ok(shipper)
    }

    fn install_abnormal_exit_hook(&self, registry: Arc<dyn CleanupRegistry>) {
        let shipper = self.clone();
        registry.register(
            "telemetry-shipper",
            Arc::new(move || {
                let shipper = shipper.clone();
                Box::pin(async move {
                    shipper.emit("sessionCancelled", Value::Object(Default::default()));
                    shipper.close().await;
                })
            }),
        );
    }

    /// `Connect` (§4.5): rebind the event listener to a new event bus.
    /// Unsubscribes from the previous bus first; if `new_bus` is the same
    /// instance already bound, this is a no-op (§8 idempotence property).
    pub async fn connect(&self, new_bus: &EventBus) {
        let mut guard = self.inner.event_sub.lock().await;
        if let Some((id, _)) = guard.as_ref() {
            if *id == new_bus.id() {
                return;
            }
        }
        *guard = None; // drops and aborts the old subscription
        let sub = spawn_event_listener(
            new_bus,
            self.inner.event_buffer.clone(),
            self.inner.session.clone(),
            self.inner.stream_events,
            self.inner.should_stream.clone(),
        );
        *guard = Some((new_bus.id(), sub));
    }

    /// `Emit` (§4.5): producer-side entry point for events originating
    /// inside the host process (as opposed to observed on the event bus).
    pub fn emit(&self, name: impl Into<String>, payload: Value) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        handle_event(
            &name.into(),
            payload,
            &self.inner.event_buffer,
            &self.inner.session,
            self.inner.stream_events,
            &self.inner.should_stream,
        );
    }

    /// `StreamLog` (§4.5): append a pre-built log record.
    pub fn stream_log(&self, record: LogRecord) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.inner.stream_logs && record.level <= self.inner.max_log_level {
            self.inner.log_buffer.append(record);
        }
    }

    pub fn stats(&self) -> ShipperStats {
        ShipperStats {
            event_buffer_len: self.inner.event_buffer.len(),
            log_buffer_len: self.inner.log_buffer.len(),
            consecutive_failures: self.inner.state.consecutive_failures(),
            flush_enabled: self.inner.state.is_enabled(),
            closed: self.inner.closed.load(Ordering::SeqCst),
        }
    }

    /// `Close` (§4.5): idempotent. Stops the flush timer, unsubscribes both
    /// listeners, then repeatedly drains and dispatches both buffers until
    /// empty. Never propagates dispatch errors to the caller.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.inner.flush_handle.lock().take() {
            handle.abort();
        }
        *self.inner.event_sub.lock().await = None;
        if let Some(sub) = self.inner.log_sub.lock().take() {
            sub.unsubscribe();
        }

        self.drain().await;
    }

    /// Best-effort final drain: batch-and-dispatch both buffers until both
    /// are empty, one round at a time, per §4.5.
    async fn drain(&self) {
        loop {
            let event_batches = make_all_event_batches(&self.inner.event_buffer, self.inner.ctx.max_batch_bytes);
            let log_batches = make_all_log_batches(&self.inner.log_buffer, self.inner.ctx.max_batch_bytes);
            if event_batches.is_empty() && log_batches.is_empty() {
                break;
            }

            for batch in event_batches {
                let envelope = EventBatchEnvelope {
                    events: batch.iter().map(EventRecordWire::from).collect(),
                    workflow_run_id: self.inner.session.workflow_run_id(),
                    session_id: self.inner.session.session_id.clone(),
                    project_id: self.inner.session.project_id.clone(),
                    environment_id: self.inner.session.environment_id.clone(),
                    namespace_id: self.inner.session.namespace_id.clone(),
                    environment: self.inner.session.environment_name.clone(),
                    namespace: self.inner.session.namespace_name.clone(),
                };
                if let Ok(body) = serde_json::to_vec(&envelope) {
                    let ok = dispatch(
                        &self.inner.ctx.http,
                        self.inner.ctx.session_client.as_deref(),
                        "events",
                        bytes::Bytes::from(body),
                        &self.inner.ctx.targets,
                    )
                    .await;
                    if !ok {
                        tracing::error!("final drain: event batch dispatch failed");
                    }
                }
            }

            for batch in log_batches {
                let envelope = LogBatchEnvelope {
                    log_entries: batch.iter().map(crate::records::LogRecordWire::from).collect(),
                    workflow_run_id: self.inner.session.workflow_run_id(),
                    session_id: self.inner.session.session_id.clone(),
                    project_id: self.inner.session.project_id.clone(),
                };
                if let Ok(body) = serde_json::to_vec(&envelope) {
                    let ok = dispatch(
                        &self.inner.ctx.http,
                        self.inner.ctx.session_client.as_deref(),
                        "log-entries",
                        bytes::Bytes::from(body),
                        &self.inner.ctx.targets,
                    )
                    .await;
                    if !ok {
                        tracing::error!("final drain: log batch dispatch failed");
                    }
                }
            }
        }
    }

    /// Run a single flush tick immediately, outside the timer's own
    /// schedule. Exposed for tests and for hosts that want manual control
    /// over flush cadence.
    pub async fn flush_once(&self) -> bool {
        if !self.inner.state.is_enabled() {
            return false;
        }
        run_tick(
            &self.inner.ctx,
            &self.inner.state,
            &self.inner.event_buffer,
            &self.inner.log_buffer,
        )
        .await
    }
}

fn handle_event(
    name: &str,
    payload: Value,
    event_buffer: &RecordBuffer<EventRecord>,
    session: &SessionContext,
    stream_events: bool,
    should_stream: &ShouldStreamFn,
) {
    if name == WORKFLOW_RUN_REGISTERED_EVENT {
        if let Some(id) = payload.get("workflowRunUid").and_then(Value::as_str) {
            session.set_workflow_run_id(id.to_string());
        }
        return;
    }
    if name.starts_with(CONTROL_EVENT_PREFIX) {
        return;
    }
    if stream_events && should_stream(name, &payload) {
        event_buffer.append(EventRecord::new(name, payload));
    }
}

fn spawn_event_listener(
    bus: &EventBus,
    event_buffer: Arc<RecordBuffer<EventRecord>>,
    session: Arc<SessionContext>,
    stream_events: bool,
    should_stream: ShouldStreamFn,
) -> Subscription {
    let mut receiver = bus.receiver();
    let task = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => handle_event(
                    &event.name,
                    event.payload,
                    &event_buffer,
                    &session,
                    stream_events,
                    &should_stream,
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Subscription::new(task)
}

fn spawn_log_listener(
    logger: &Logger,
    log_buffer: Arc<RecordBuffer<LogRecord>>,
    max_log_level: i32,
    stream_logs: bool,
) -> Subscription {
    let mut receiver = logger.receiver();
    let task = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(record) => {
                    if stream_logs && record.level <= max_log_level {
                        log_buffer.append(record);
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Subscription::new(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::LogMessage;
    use chrono::Utc;
    use serde_json::json;

    fn test_session() -> SessionContext {
        SessionContext::new(Some("s1".into()), None, "env", "ns", "production", "default")
    }

    #[tokio::test]
    async fn emit_buffers_ordinary_events() {
        let bus = EventBus::new();
        let logger = Logger::new();
        let shipper = ShipperConfig::new(bus, logger, test_session())
            .build()
            .unwrap();

        shipper.emit("e1", json!({}));
        shipper.emit("e2", json!({}));
        tokio::task::yield_now().await;

        assert_eq!(shipper.stats().event_buffer_len, 2);
        shipper.close().await;
    }

    #[tokio::test]
    async fn control_events_are_never_buffered() {
        let bus = EventBus::new();
        let logger = Logger::new();
        let shipper = ShipperConfig::new(bus, logger, test_session())
            .build()
            .unwrap();

        shipper.emit("_internal", json!({}));
        shipper.emit(WORKFLOW_RUN_REGISTERED_EVENT, json!({"workflowRunUid": "W-1"}));
        tokio::task::yield_now().await;

        assert_eq!(shipper.stats().event_buffer_len, 0);
        shipper.close().await;
    }

    #[tokio::test]
    async fn workflow_run_id_is_set_exactly_once_from_control_event() {
        let bus = EventBus::new();
        let logger = Logger::new();
        let shipper = ShipperConfig::new(bus, logger, test_session())
            .build()
            .unwrap();

        shipper.emit(WORKFLOW_RUN_REGISTERED_EVENT, json!({"workflowRunUid": "W-1"}));
        tokio::task::yield_now().await;
        assert_eq!(shipper.inner.session.workflow_run_id(), Some("W-1".to_string()));

        shipper.emit(WORKFLOW_RUN_REGISTERED_EVENT, json!({"workflowRunUid": "W-2"}));
        tokio::task::yield_now().await;
        assert_eq!(shipper.inner.session.workflow_run_id(), Some("W-1".to_string()));

        shipper.close().await;
    }

    #[tokio::test]
    async fn stream_log_respects_max_level() {
        let bus = EventBus::new();
        let logger = Logger::new();
        let shipper = ShipperConfig::new(bus, logger, test_session())
            .max_log_level(3)
            .build()
            .unwrap();

        shipper.stream_log(LogRecord {
            key: "k1".into(),
            timestamp: Utc::now(),
            level: 5,
            context: json!({}),
            message: LogMessage::default(),
            metadata: None,
        });
        shipper.stream_log(LogRecord {
            key: "k2".into(),
            timestamp: Utc::now(),
            level: 2,
            context: json!({}),
            message: LogMessage::default(),
            metadata: None,
        });

        assert_eq!(shipper.stats().log_buffer_len, 1);
        shipper.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let bus = EventBus::new();
        let logger = Logger::new();
        let shipper = ShipperConfig::new(bus, logger, test_session())
            .build()
            .unwrap();

        shipper.close().await;
        shipper.close().await;
        assert!(shipper.stats().closed);
    }

    #[tokio::test]
    async fn emit_after_close_is_a_no_op() {
        let bus = EventBus::new();
        let logger = Logger::new();
        let shipper = ShipperConfig::new(bus, logger, test_session())
            .build()
            .unwrap();

        shipper.close().await;
        shipper.emit("late", json!({}));
        tokio::task::yield_now().await;
        assert_eq!(shipper.stats().event_buffer_len, 0);
    }

    #[tokio::test]
    async fn connect_rebinds_event_listener_to_new_bus() {
        let bus1 = EventBus::new();
        let bus2 = EventBus::new();
        let logger = Logger::new();
        let shipper = ShipperConfig::new(bus1.clone(), logger, test_session())
            .build()
            .unwrap();

        bus1.publish("e1", json!({}));
        tokio::task::yield_now().await;

        shipper.connect(&bus2).await;

        bus1.publish("e2-on-old-bus", json!({}));
        bus2.publish("e3-on-new-bus", json!({}));
        tokio::task::yield_now().await;

        assert_eq!(shipper.stats().event_buffer_len, 2);
        shipper.close().await;
    }

    #[tokio::test]
    async fn connect_to_same_bus_instance_does_not_duplicate_subscription() {
        let bus = EventBus::new();
        let logger = Logger::new();
        let shipper = ShipperConfig::new(bus.clone(), logger, test_session())
            .build()
            .unwrap();

        shipper.connect(&bus).await;
        shipper.connect(&bus).await;

        bus.publish("e1", json!({}));
        tokio::task::yield_now().await;

        assert_eq!(shipper.stats().event_buffer_len, 1);
        shipper.close().await;
    }
}
