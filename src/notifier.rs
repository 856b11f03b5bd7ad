//! Fire-and-forget observability sink. Stands in for toast/notification
//! plumbing that lives outside this crate in the full clinic system.

use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Default used by the demo binary and by tests that want notifications
/// visible in output without asserting on them.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, message: &str) {
        log::info!("notify: {}", message);
    }
}

/// Used where a test wants to assert nothing about notification traffic.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _message: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_notifier_never_panics() {
        let notifier = NullNotifier;
        notifier.notify("anything").await;
    }

    #[tokio::test]
    async fn logging_notifier_never_panics() {
        let notifier = LoggingNotifier;
        notifier.notify("anything").await;
    }
}
