//! One isolated browser profile, page, navigation and selector query
//! surface for a single moderator.

use crate::browser::selectors::{Selector, SelectorFamily, SelectorKind};
use crate::error::BrowserError;
use fantoccini::{Client, ClientBuilder, Locator};
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Opaque handle to a matched DOM element. We keep only what the UI
/// interaction layer needs: text content and whether it was found at all -
/// the fantoccini `Element` itself is held internally for the duration of a
/// single query so callers never juggle raw webdriver element IDs.
#[derive(Debug, Clone)]
pub struct ElementHandle {
    pub text: String,
}

/// A thin, transport-level abstraction over one browser page. Not
/// thread-safe by itself - serialization is enforced by the caller (the
/// façade's per-moderator mutual exclusion).
pub struct BrowserSession {
    moderator_id: String,
    profile_dir: PathBuf,
    webdriver_url: String,
    client: Mutex<Option<Client>>,
}

impl BrowserSession {
    pub fn new(moderator_id: impl Into<String>, profile_root: &str, webdriver_url: impl Into<String>) -> Self {
        let moderator_id = moderator_id.into();
        let profile_dir = PathBuf::from(profile_root).join(&moderator_id);
        Self {
            moderator_id,
            profile_dir,
            webdriver_url: webdriver_url.into(),
            client: Mutex::new(None),
        }
    }

    pub fn moderator_id(&self) -> &str {
        &self.moderator_id
    }

    /// Idempotent: the first call launches a browser bound to this
    /// moderator's persistent profile directory; later calls are no-ops.
    pub async fn initialize(&self) -> Result<(), BrowserError> {
        let mut guard = self.client.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.profile_dir)
            .map_err(|e| BrowserError::ProfileCorrupt(e.to_string()))?;

        let mut caps = serde_json::map::Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            serde_json::json!({
                "args": [format!("--user-data-dir={}", self.profile_dir.display())]
            }),
        );

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&self.webdriver_url)
            .await?;

        *guard = Some(client);
        log::info!("browser session initialized for moderator {}", self.moderator_id);
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// Navigates the single page; waits for "document loaded" (fantoccini's
    /// `goto` already blocks on that), not network-idle.
    pub async fn navigate_to(&self, url: &str) -> Result<(), BrowserError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(BrowserError::Disposed)?;
        client
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed(e.to_string()))
    }

    /// First element matching `selector`, or `None` if absent.
    pub async fn query_selector(&self, selector: &Selector) -> Result<Option<ElementHandle>, BrowserError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(BrowserError::Disposed)?;

        match find(client, selector).await {
            Ok(el) => {
                let text = el.text().await.unwrap_or_default();
                Ok(Some(ElementHandle { text }))
            }
            Err(fantoccini::error::CmdError::NoSuchElement(_)) => Ok(None),
            Err(e) => Err(BrowserError::Transport(e.to_string())),
        }
    }

    /// First match across the whole family, first-found-wins.
    pub async fn query_family(&self, family: &SelectorFamily) -> Result<Option<ElementHandle>, BrowserError> {
        for selector in &family.selectors {
            if let Some(handle) = self.query_selector(selector).await? {
                return Ok(Some(handle));
            }
        }
        Ok(None)
    }

    /// Focuses the element matching `selector` and issues a keyboard key
    /// (e.g. the Enter fallback used when no send button is found).
    pub async fn press(&self, selector: &Selector, key: &str) -> Result<(), BrowserError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(BrowserError::Disposed)?;
        let mut el = find(client, selector)
            .await
            .map_err(|e| BrowserError::Transport(e.to_string()))?;
        el.send_keys(key).await.map_err(|e| BrowserError::Transport(e.to_string()))
    }

    /// Focuses the element matching `selector` and types `text` literally.
    pub async fn fill(&self, selector: &Selector, text: &str) -> Result<(), BrowserError> {
        self.press(selector, text).await
    }

    /// Clicks the element matching `selector`.
    pub async fn click(&self, selector: &Selector) -> Result<(), BrowserError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(BrowserError::Disposed)?;
        let el = find(client, selector)
            .await
            .map_err(|e| BrowserError::Transport(e.to_string()))?;
        el.click().await.map_err(|e| BrowserError::Transport(e.to_string()))
    }

    /// Releases the browser and profile handles. Safe to call twice - the
    /// second call is a no-op.
    pub async fn dispose(&self) -> Result<(), BrowserError> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.take() {
            client.close().await.map_err(|e| BrowserError::Transport(e.to_string()))?;
            log::info!("browser session disposed for moderator {}", self.moderator_id);
        }
        Ok(())
    }
}

/// Resolves one selector against `client`. The `Text` kind has no native
/// fantoccini locator, so it is compiled to an xpath text-contains probe
/// on the spot - kept local so the borrow never needs to outlive this call.
async fn find(client: &Client, selector: &Selector) -> Result<fantoccini::elements::Element, fantoccini::error::CmdError> {
    match selector.kind {
        SelectorKind::Css => client.find(Locator::Css(&selector.pattern)).await,
        SelectorKind::XPath => client.find(Locator::XPath(&selector.pattern)).await,
        SelectorKind::Text => {
            let xpath = format!("//*[contains(text(), \"{}\")]", selector.pattern);
            client.find(Locator::XPath(&xpath)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_dir_is_namespaced_per_moderator() {
        let session = BrowserSession::new("mod-1", "/tmp/profiles", "http://localhost:9515");
        assert_eq!(session.profile_dir, PathBuf::from("/tmp/profiles/mod-1"));
        assert_eq!(session.moderator_id(), "mod-1");
    }

    #[tokio::test]
    async fn fresh_session_is_not_initialized() {
        let session = BrowserSession::new("mod-2", "/tmp/profiles", "http://localhost:9515");
        assert!(!session.is_initialized().await);
    }

    #[tokio::test]
    async fn operations_before_initialize_report_disposed() {
        let session = BrowserSession::new("mod-3", "/tmp/profiles", "http://localhost:9515");
        let err = session.navigate_to("https://web.whatsapp.com/").await;
        assert!(matches!(err, Err(BrowserError::Disposed)));
    }

    #[tokio::test]
    async fn dispose_without_initialize_is_a_no_op() {
        let session = BrowserSession::new("mod-4", "/tmp/profiles", "http://localhost:9515");
        assert!(session.dispose().await.is_ok());
        assert!(session.dispose().await.is_ok());
    }
}
