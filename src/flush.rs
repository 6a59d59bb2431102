//! Flush loop (C7): periodic tick, circuit breaker, tick-driven batch
//! dispatch.

use crate::batcher::{make_event_batch, make_log_batch};
use crate::buffer::RecordBuffer;
use crate::dispatch::dispatch;
use crate::records::{EventBatchEnvelope, EventRecord, EventRecordWire, LogBatchEnvelope, LogRecord, LogRecordWire};
use crate::session::SessionContext;
use crate::target::{SessionApiClient, Target};
use bytes::Bytes;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shared circuit-breaker state (§3 `ShipperState`, minus `closed` which the
/// lifecycle controller owns directly).
pub struct FlushState {
    consecutive_failures: AtomicU32,
    flush_enabled: AtomicBool,
    max_failures: u32,
}

impl FlushState {
    pub fn new(max_failures: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            flush_enabled: AtomicBool::new(true),
            max_failures,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flush_enabled.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Record a tick's outcome. Resets the counter on success; on failure,
    /// bumps it and disables flushing forever once the threshold is hit
    /// (§3: `flushEnabled` never flips back on in the same run).
    fn record_outcome(&self, success: bool) {
        if success {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.max_failures {
            self.flush_enabled.store(false, Ordering::SeqCst);
            tracing::debug!(
                consecutive_failures = failures,
                "disabling flush after {failures} consecutive failures"
            );
        }
    }
}

/// Everything one tick needs to drain and dispatch both buffers. Bundled so
/// `spawn_flush_loop` and the drain-on-close path in `shipper.rs` share one
/// code path for "do a flush round".
pub struct FlushContext {
    pub http: Client,
    pub session_client: Option<Arc<dyn SessionApiClient>>,
    pub session: Arc<SessionContext>,
    pub targets: Vec<Target>,
    pub max_batch_bytes: usize,
}

/// Run one tick: drain one batch from each buffer, dispatch both
/// concurrently (skipping empties), and fold the outcome into `state`.
/// Returns `true` if the tick did any work (used by the drain loop to know
/// when to stop).
pub async fn run_tick(
    ctx: &FlushContext,
    state: &FlushState,
    event_buffer: &RecordBuffer<EventRecord>,
    log_buffer: &RecordBuffer<LogRecord>,
) -> bool {
    // Zero targets configured: leave the buffers untouched rather than
    // draining records into a dispatch that reaches nobody (§8 boundary
    // behavior — a no-op, never a failure).
    if ctx.targets.is_empty() {
        return false;
    }

    let events = make_event_batch(event_buffer, ctx.max_batch_bytes);
    let logs = make_log_batch(log_buffer, ctx.max_batch_bytes);

    if events.is_empty() && logs.is_empty() {
        return false;
    }

    let event_fut = async {
        if events.is_empty() {
            return true;
        }
        let envelope = build_event_envelope(&ctx.session, events);
        let Ok(body) = serde_json::to_vec(&envelope) else {
            return false;
        };
        dispatch(
            &ctx.http,
            ctx.session_client.as_deref(),
            "events",
            Bytes::from(body),
            &ctx.targets,
        )
        .await
    };

    let log_fut = async {
        if logs.is_empty() {
            return true;
        }
        let envelope = build_log_envelope(&ctx.session, logs);
        let Ok(body) = serde_json::to_vec(&envelope) else {
            return false;
        };
        dispatch(
            &ctx.http,
            ctx.session_client.as_deref(),
            "log-entries",
            Bytes::from(body),
            &ctx.targets,
        )
        .await
    };

    let (events_ok, logs_ok) = tokio::join!(event_fut, log_fut);
    state.record_outcome(events_ok && logs_ok);
    true
}

fn build_event_envelope(session: &SessionContext, events: Vec<EventRecord>) -> EventBatchEnvelope {
    EventBatchEnvelope {
        events: events.iter().map(EventRecordWire::from).collect(),
        workflow_run_id: session.workflow_run_id(),
        session_id: session.session_id.clone(),
        project_id: session.project_id.clone(),
        environment_id: session.environment_id.clone(),
        namespace_id: session.namespace_id.clone(),
        environment: session.environment_name.clone(),
        namespace: session.namespace_name.clone(),
    }
}

fn build_log_envelope(session: &SessionContext, logs: Vec<LogRecord>) -> LogBatchEnvelope {
    LogBatchEnvelope {
        log_entries: logs.iter().map(LogRecordWire::from).collect(),
        workflow_run_id: session.workflow_run_id(),
        session_id: session.session_id.clone(),
        project_id: session.project_id.clone(),
    }
}

/// Spawn the recurring tick task. Uses `MissedTickBehavior::Delay` so a slow
/// dispatch never causes ticks to pile up (§9: the next tick is scheduled
/// relative to the previous one's completion, not a fixed wall-clock grid).
pub fn spawn_flush_loop(
    ctx: Arc<FlushContext>,
    state: Arc<FlushState>,
    event_buffer: Arc<RecordBuffer<EventRecord>>,
    log_buffer: Arc<RecordBuffer<LogRecord>>,
    tick_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if !state.is_enabled() || ctx.targets.is_empty() {
                continue;
            }
            run_tick(&ctx, &state, &event_buffer, &log_buffer).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_disables_after_max_consecutive_failures() {
        let state = FlushState::new(3);
        state.record_outcome(false);
        state.record_outcome(false);
        assert!(state.is_enabled());
        state.record_outcome(false);
        assert!(!state.is_enabled());
        assert_eq!(state.consecutive_failures(), 3);
    }

    #[test]
    fn success_resets_failure_counter() {
        let state = FlushState::new(3);
        state.record_outcome(false);
        state.record_outcome(false);
        state.record_outcome(true);
        assert_eq!(state.consecutive_failures(), 0);
        assert!(state.is_enabled());
    }

    #[test]
    fn disabled_flush_never_reenables_on_success() {
        let state = FlushState::new(2);
        state.record_outcome(false);
        state.record_outcome(false);
        assert!(!state.is_enabled());
        state.record_outcome(true);
        assert!(!state.is_enabled());
    }
}
