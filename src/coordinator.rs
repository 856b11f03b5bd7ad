//! 3-tier pause/resume hierarchy and drain-and-wait.
//! The persisted pause row is the single source of truth; every pre-flight
//! check reads through [`PauseStateStore`] rather than an in-process cache.

use crate::persistence::{PauseState, PauseStateStore, OutboundMessageStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// `"PendingQR"` / `"PendingNET"` prefixes classify the tier a stored reason
/// belongs to; anything else is advisory. Used only to shape the tiered
/// `OperationResult` an orchestrator pre-flight returns, never to decide
/// whether a resume is allowed - that is exact-string-match only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseTier {
    Authentication,
    Network,
    Advisory,
}

pub fn classify_reason(reason: &str) -> PauseTier {
    if reason.starts_with("PendingQR") {
        PauseTier::Authentication
    } else if reason.starts_with("PendingNET") {
        PauseTier::Network
    } else {
        PauseTier::Advisory
    }
}

/// Gates sends against three independent pause tiers: authentication,
/// network, and advisory. Only an exact-reason-match resume clears a pause,
/// which is what keeps a lower tier from unlocking a higher one.
pub struct OperationCoordinator {
    pause_store: Arc<dyn PauseStateStore>,
    outbound_store: Arc<dyn OutboundMessageStore>,
}

impl OperationCoordinator {
    pub fn new(pause_store: Arc<dyn PauseStateStore>, outbound_store: Arc<dyn OutboundMessageStore>) -> Self {
        Self {
            pause_store,
            outbound_store,
        }
    }

    /// Reads the slot on every call; returns `None` if no slot has ever been
    /// created for this moderator (never paused).
    pub async fn current_pause(&self, moderator_id: &str) -> anyhow::Result<Option<PauseState>> {
        self.pause_store.get(moderator_id).await
    }

    /// `PauseAllOngoingTasks` - last-writer-wins on the reason string;
    /// returns true if a write happened. A slot is created on first pause
    /// rather than requiring pre-existence, since the persisted row IS the
    /// slot.
    pub async fn pause_all_ongoing_tasks(
        &self,
        moderator_id: &str,
        user_id: &str,
        reason: &str,
    ) -> anyhow::Result<bool> {
        let state = PauseState {
            is_paused: true,
            pause_reason: Some(reason.to_string()),
            last_paused_by: Some(user_id.to_string()),
            last_paused_at: Some(chrono::Utc::now()),
        };
        self.pause_store.set(moderator_id, state).await?;
        log::info!("moderator {} paused by {}: {}", moderator_id, user_id, reason);
        Ok(true)
    }

    /// `ResumeTasksPausedForReason` - clears the pause iff the stored reason
    /// equals `reason` exactly. This, not `PauseAllOngoingTasks`, is the sole
    /// mechanism enforcing tier discipline.
    pub async fn resume_tasks_paused_for_reason(&self, moderator_id: &str, reason: &str) -> anyhow::Result<bool> {
        match self.pause_store.get(moderator_id).await? {
            Some(state) if state.is_paused && state.pause_reason.as_deref() == Some(reason) => {
                self.pause_store.clear(moderator_id).await?;
                log::info!("moderator {} resumed, reason matched: {}", moderator_id, reason);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// `HasOngoingOperations` - true iff at least one record is `sending`.
    pub async fn has_ongoing_operations(&self, moderator_id: &str) -> anyhow::Result<bool> {
        self.outbound_store.has_sending(moderator_id).await
    }

    /// `WaitForCurrentOperationToFinish` - polls `HasOngoingOperations` every
    /// `check_interval`; returns true as soon as none remain (immediately if
    /// none exist at call time), false on timeout or cancellation.
    pub async fn wait_for_current_operation_to_finish(
        &self,
        moderator_id: &str,
        cancellation: &CancellationToken,
        max_wait: Duration,
        check_interval: Duration,
    ) -> anyhow::Result<bool> {
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            if !self.has_ongoing_operations(moderator_id).await? {
                return Ok(true);
            }

            if cancellation.is_cancelled() {
                return Ok(false);
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }

            tokio::select! {
                _ = tokio::time::sleep(check_interval) => {}
                _ = cancellation.cancelled() => return Ok(false),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryOutboundMessageStore, InMemoryPauseStateStore, OutboundStatus};

    fn coordinator() -> OperationCoordinator {
        OperationCoordinator::new(
            Arc::new(InMemoryPauseStateStore::default()),
            Arc::new(InMemoryOutboundMessageStore::default()),
        )
    }

    #[tokio::test]
    async fn pause_then_resume_with_different_reason_leaves_it_paused() {
        let coord = coordinator();
        coord.pause_all_ongoing_tasks("m1", "system", "PendingQR - Authentication required").await.unwrap();

        let resumed = coord.resume_tasks_paused_for_reason("m1", "Authentication check").await.unwrap();
        assert!(!resumed);

        let state = coord.current_pause("m1").await.unwrap().unwrap();
        assert!(state.is_paused);
        assert_eq!(state.pause_reason.as_deref(), Some("PendingQR - Authentication required"));
    }

    #[tokio::test]
    async fn resume_with_matching_reason_clears_pause() {
        let coord = coordinator();
        coord.pause_all_ongoing_tasks("m2", "system", "PendingNET").await.unwrap();

        let resumed = coord.resume_tasks_paused_for_reason("m2", "PendingNET").await.unwrap();
        assert!(resumed);
        assert!(coord.current_pause("m2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_pause_overwrites_earlier_reason() {
        let coord = coordinator();
        coord.pause_all_ongoing_tasks("m3", "u1", "Authentication check").await.unwrap();
        coord.pause_all_ongoing_tasks("m3", "system", "PendingQR - Authentication required").await.unwrap();

        let state = coord.current_pause("m3").await.unwrap().unwrap();
        assert_eq!(state.pause_reason.as_deref(), Some("PendingQR - Authentication required"));
    }

    #[tokio::test]
    async fn wait_for_current_operation_returns_true_immediately_when_idle() {
        let coord = coordinator();
        let token = CancellationToken::new();
        let ready = coord
            .wait_for_current_operation_to_finish("m4", &token, Duration::from_millis(500), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(ready);
    }

    #[tokio::test]
    async fn wait_for_current_operation_times_out_while_sending() {
        let outbound = Arc::new(InMemoryOutboundMessageStore::default());
        outbound.seed("msg-1", "m5", OutboundStatus::Sending).await;
        let coord = OperationCoordinator::new(Arc::new(InMemoryPauseStateStore::default()), outbound.clone());

        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        let ready = coord
            .wait_for_current_operation_to_finish("m5", &token, Duration::from_millis(300), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!ready);
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn wait_for_current_operation_succeeds_once_status_changes() {
        let outbound = Arc::new(InMemoryOutboundMessageStore::default());
        outbound.seed("msg-2", "m6", OutboundStatus::Sending).await;
        let coord = OperationCoordinator::new(Arc::new(InMemoryPauseStateStore::default()), outbound.clone());

        outbound.set_status("msg-2", "m6", OutboundStatus::Sent).await.unwrap();

        let token = CancellationToken::new();
        let ready = coord
            .wait_for_current_operation_to_finish("m6", &token, Duration::from_millis(500), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(ready);
    }

    #[test]
    fn reason_classification_maps_prefixes_to_tiers() {
        assert_eq!(classify_reason("PendingQR - Authentication required"), PauseTier::Authentication);
        assert_eq!(classify_reason("PendingNET"), PauseTier::Network);
        assert_eq!(classify_reason("Authentication check"), PauseTier::Advisory);
    }
}
