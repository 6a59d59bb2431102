//! Abnormal-exit cleanup hook registration.
//!
//! The source's `RegisterCleanupFunction(name, fn)` is process-wide state
//! owned by the host; the core only needs a `register(name, fn)` capability
//! (§9 design note). Modeled here as a trait so the default, signal-driven
//! implementation can be swapped for a host-native registry in embedding
//! contexts, and so tests can inject a no-op.

use futures::future::BoxFuture;
use std::sync::Arc;

pub type CleanupHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

pub trait CleanupRegistry: Send + Sync {
    fn register(&self, name: &'static str, hook: CleanupHook);
}

/// Registers the hook against `tokio::signal::ctrl_c()`. Bounds the hook's
/// total duration so shutdown cannot hang indefinitely on process
/// termination, per §5's cancellation guidance.
pub struct SignalCleanupRegistry {
    pub hook_timeout: std::time::Duration,
}

impl Default for SignalCleanupRegistry {
    fn default() -> Self {
        Self {
            hook_timeout: std::time::Duration::from_secs(5),
        }
    }
}

impl CleanupRegistry for SignalCleanupRegistry {
    fn register(&self, name: &'static str, hook: CleanupHook) {
        let hook_timeout = self.hook_timeout;
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!(hook = name, "abnormal exit signal received, running cleanup hook");
                if tokio::time::timeout(hook_timeout, hook()).await.is_err() {
                    tracing::debug!(hook = name, "cleanup hook timed out during shutdown");
                }
            }
        });
    }
}

/// Never installs a signal handler. Used in tests and in embedding contexts
/// where the host already owns process-exit handling and will call `close`
/// itself.
pub struct NoopCleanupRegistry;

impl CleanupRegistry for NoopCleanupRegistry {
    fn register(&self, _name: &'static str, _hook: CleanupHook) {}
}
