//! Public façade: thin dispatch binding coordinator gates, session manager,
//! and orchestrator behind per-moderator mutual exclusion.

use crate::error::OperationResult;
use crate::notifier::Notifier;
use crate::orchestrator::SendOrchestrator;
use crate::session_manager::SessionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct WhatsAppCore {
    sessions: Arc<SessionManager>,
    orchestrator: Arc<SendOrchestrator>,
    notifier: Arc<dyn Notifier>,
    /// Per-moderator mutual exclusion token: at most one in-flight
    /// orchestrator operation per session.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WhatsAppCore {
    pub fn new(sessions: Arc<SessionManager>, orchestrator: Arc<SendOrchestrator>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            sessions,
            orchestrator,
            notifier,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, moderator_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(moderator_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// `SendMessageWithIconType`. `cancellation` is honored by every wait
    /// inside the orchestrator and its sub-steps; a pre-cancelled token
    /// short-circuits to `Waiting("cancelled")` without touching the browser.
    pub async fn send_message_with_icon_type(
        &self,
        moderator_id: &str,
        phone: &str,
        message: &str,
        cancellation: &CancellationToken,
    ) -> OperationResult<String> {
        let lock = self.lock_for(moderator_id).await;
        let _guard = lock.lock().await;

        let session = match self.sessions.get_or_create_session(moderator_id).await {
            Ok(session) => session,
            Err(e) => {
                self.notifier.notify(&format!("session init failed for {}: {}", moderator_id, e)).await;
                return OperationResult::Failure(e.to_string());
            }
        };

        match self
            .orchestrator
            .send_message_with_icon_type(moderator_id, phone, message, &session, cancellation)
            .await
        {
            Ok(result) => {
                if !result.is_success() {
                    self.notifier
                        .notify(&format!("send to {} for moderator {} did not succeed: {}", phone, moderator_id, result.message()))
                        .await;
                }
                result
            }
            Err(e) => {
                self.notifier.notify(&format!("send to {} failed: {}", phone, e)).await;
                OperationResult::Failure(e.to_string())
            }
        }
    }

    /// `CheckWhatsAppNumber`.
    pub async fn check_whatsapp_number(
        &self,
        moderator_id: &str,
        phone: &str,
        cancellation: &CancellationToken,
    ) -> OperationResult<bool> {
        let lock = self.lock_for(moderator_id).await;
        let _guard = lock.lock().await;

        let session = match self.sessions.get_or_create_session(moderator_id).await {
            Ok(session) => session,
            Err(e) => return OperationResult::Failure(e.to_string()),
        };

        match self.orchestrator.check_whatsapp_number(moderator_id, phone, &session, cancellation).await {
            Ok(result) => result,
            Err(e) => OperationResult::Failure(e.to_string()),
        }
    }

    /// `DisposeBrowserSession` - accepts a moderator that may have no live
    /// session (no-op), prefers async disposal, and on failure logs and
    /// swallows the error rather than throwing.
    pub async fn dispose_browser_session(&self, moderator_id: Option<&str>) {
        let Some(moderator_id) = moderator_id else {
            log::info!("dispose_browser_session called with no moderator id, nothing to do");
            return;
        };

        if let Err(e) = self.sessions.dispose_session(moderator_id).await {
            log::warn!("async disposal failed for {}: {}, falling back to sync cleanup", moderator_id, e);
            if let Err(e2) = self.sessions.dispose_session(moderator_id).await {
                log::error!("sync disposal fallback also failed for {}: {}", moderator_id, e2);
            }
            self.notifier
                .notify(&format!("failed to dispose browser session for {}", moderator_id))
                .await;
        }
    }
}
