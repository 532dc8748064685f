use async_trait::async_trait;
use tracing::warn;

/// Collaborator invoked on critical faults (JSON-repair exhaustion, fatal
/// persistence errors). Installed once at startup, before any worker is
/// spawned, so every subsystem observes the same sink for the life of the
/// process.
#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn notify(&self, message: &str, details: &str);
}

/// Installed when no Slack credentials are configured. Logs instead of
/// notifying, so the sink is always present and callers never branch on
/// "is notification configured".
pub struct NoopErrorSink;

#[async_trait]
impl ErrorSink for NoopErrorSink {
    async fn notify(&self, message: &str, details: &str) {
        warn!(message, details, "error sink not configured, logging only");
    }
}
