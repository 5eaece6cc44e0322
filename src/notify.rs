//! One-way notification hook fired after committed transitions
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Approved,
    Rejected,
}

/// External notification dispatcher. The engine calls this after a
/// committed terminal transition; a failure here is logged and swallowed,
/// it never rolls the transition back, and the engine does not retry.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, recipient_id: &str, kind: NotifyKind, request_id: &str) -> anyhow::Result<()>;
}

/// Default sink: writes the notification to the log and nothing else.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, recipient_id: &str, kind: NotifyKind, request_id: &str) -> anyhow::Result<()> {
        info!(recipient_id, request_id, ?kind, "request notification");
        Ok(())
    }
}
