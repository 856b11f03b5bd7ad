//! Owns the at-most-one-browser-per-moderator invariant.
//! `GetOrCreateSession` is the only way to obtain a [`BrowserSession`]; the
//! per-slot lock makes concurrent calls for the same moderator race-free
//! without serializing unrelated moderators against each other.

use crate::browser::session::BrowserSession;
use crate::browser::selectors::SelectorFamilies;
use crate::config::CoreConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

struct Slot {
    session: Mutex<Option<Arc<BrowserSession>>>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }
}

/// Per-moderator browser lifecycle: lazy creation, readiness probe,
/// disposal. Session persistence (pause state, outbound status) is a
/// separate concern - see [`crate::persistence`].
pub struct SessionManager {
    cfg: Arc<CoreConfig>,
    families: Arc<SelectorFamilies>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl SessionManager {
    pub fn new(cfg: Arc<CoreConfig>, families: Arc<SelectorFamilies>) -> Self {
        Self {
            cfg,
            families,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot_for(&self, moderator_id: &str) -> Arc<Slot> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(moderator_id.to_string())
            .or_insert_with(|| Arc::new(Slot::empty()))
            .clone()
    }

    /// Returns the moderator's browser session, initializing it (exactly
    /// once, even under concurrent callers) if this is the first request.
    /// First creation also navigates to the entry URL; if either step fails
    /// the slot is left empty so the factory is re-invoked on the next call
    /// rather than returning a half-initialized session.
    pub async fn get_or_create_session(
        &self,
        moderator_id: &str,
    ) -> Result<Arc<BrowserSession>, crate::error::BrowserError> {
        let slot = self.slot_for(moderator_id).await;
        let mut guard = slot.session.lock().await;

        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = Arc::new(BrowserSession::new(
            moderator_id,
            &self.cfg.profile_dir,
            webdriver_url_for(&self.cfg),
        ));
        session.initialize().await?;

        if let Err(e) = session.navigate_to(&self.cfg.entry_url).await {
            let _ = session.dispose().await;
            return Err(e);
        }

        *guard = Some(session.clone());
        Ok(session)
    }

    /// `GetCurrentSession` - never creates; `None` if no slot exists yet.
    pub async fn get_current_session(&self, moderator_id: &str) -> Option<Arc<BrowserSession>> {
        let slot = self.slot_for(moderator_id).await;
        slot.session.lock().await.clone()
    }

    /// `IsSessionReady` - whether a session exists and its main UI selector
    /// family currently matches. Does not create a session as a side effect.
    pub async fn is_session_ready(&self, moderator_id: &str) -> bool {
        let slot = self.slot_for(moderator_id).await;
        let guard = slot.session.lock().await;
        let Some(session) = guard.as_ref() else {
            return false;
        };
        session
            .query_family(&self.families.main_ui_ready)
            .await
            .unwrap_or(None)
            .is_some()
    }

    /// `DisposeSession` - safe to call when no session exists for this
    /// moderator, and safe to call twice.
    pub async fn dispose_session(&self, moderator_id: &str) -> Result<(), crate::error::BrowserError> {
        let slot = self.slot_for(moderator_id).await;
        let mut guard = slot.session.lock().await;
        if let Some(session) = guard.take() {
            session.dispose().await?;
        }
        Ok(())
    }
}

fn webdriver_url_for(cfg: &CoreConfig) -> String {
    std::env::var("WEBDRIVER_URL").unwrap_or_else(|_| {
        let _ = cfg;
        "http://localhost:9515".to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(CoreConfig::default()), Arc::new(SelectorFamilies::default()))
    }

    #[tokio::test]
    async fn is_session_ready_is_false_without_a_session() {
        let mgr = manager();
        assert!(!mgr.is_session_ready("mod-a").await);
    }

    #[tokio::test]
    async fn dispose_without_a_session_is_a_no_op() {
        let mgr = manager();
        assert!(mgr.dispose_session("mod-b").await.is_ok());
        assert!(mgr.dispose_session("mod-b").await.is_ok());
    }

    #[tokio::test]
    async fn get_current_session_never_creates() {
        let mgr = manager();
        assert!(mgr.get_current_session("mod-e").await.is_none());
    }

    #[tokio::test]
    async fn distinct_moderators_get_distinct_slots() {
        let mgr = manager();
        let slot_a = mgr.slot_for("mod-c").await;
        let slot_b = mgr.slot_for("mod-d").await;
        assert!(!Arc::ptr_eq(&slot_a, &slot_b));
        let slot_a_again = mgr.slot_for("mod-c").await;
        assert!(Arc::ptr_eq(&slot_a, &slot_a_again));
    }
}
