//! Hides every fragility of the remote UI behind semantic operations.
//! This is the only module that knows about WhatsApp-Web specific icon
//! keys and dialog copy - the orchestrator calls through here.

use crate::browser::selectors::SelectorFamilies;
use crate::browser::session::BrowserSession;
use crate::config::CoreConfig;
use crate::error::OperationResult;
use crate::network::NetworkService;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Semantic tokens extracted from the remote UI's status markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconKey {
    Clock,
    SingleCheck,
    DoubleCheck,
    DoubleCheckBlue,
}

impl IconKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            IconKey::Clock => "msg-time",
            IconKey::SingleCheck => "msg-check",
            IconKey::DoubleCheck => "msg-dblcheck",
            IconKey::DoubleCheckBlue => "msg-dblcheck-ack",
        }
    }

    /// Single and double check - grey or blue - are terminal "delivery"
    /// icons; the clock (queued/sending) is not.
    pub fn is_terminal_delivery(&self) -> bool {
        !matches!(self, IconKey::Clock)
    }
}

/// `{IconKey (string or none), RawText (string or none)}`. `Empty()` denotes
/// "no status yet observed".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageStatus {
    pub icon_key: Option<IconKey>,
    pub raw_text: Option<String>,
}

impl MessageStatus {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.icon_key.is_none()
    }
}

pub struct UIInteractionService {
    families: SelectorFamilies,
}

impl Default for UIInteractionService {
    fn default() -> Self {
        Self::new(SelectorFamilies::default())
    }
}

impl UIInteractionService {
    pub fn new(families: SelectorFamilies) -> Self {
        Self { families }
    }

    pub fn families(&self) -> &SelectorFamilies {
        &self.families
    }

    /// Polls each family in order; first match of any family wins. Tie-break:
    /// a QR page beats an input field, an error dialog also beats an input
    /// field - callers rely on the precedence of the checks below, not on
    /// selector ordering within a single family. `cancellation` is checked on
    /// every iteration and interrupts the poll sleep.
    pub async fn wait_for_page_load(
        &self,
        session: &BrowserSession,
        network: &NetworkService,
        cfg: &CoreConfig,
        cancellation: &CancellationToken,
    ) -> OperationResult<bool> {
        let deadline = Instant::now() + cfg.page_load_wait;

        loop {
            if cancellation.is_cancelled() {
                return OperationResult::Waiting("cancelled".to_string());
            }

            if session
                .query_family(&self.families.qr_auth_page)
                .await
                .unwrap_or(None)
                .is_some()
            {
                return OperationResult::PendingQR("Authentication required".to_string());
            }

            if !network.check_internet_connectivity().await {
                return OperationResult::PendingNET("no internet connectivity detected".to_string());
            }

            if session
                .query_family(&self.families.invalid_number_dialog)
                .await
                .unwrap_or(None)
                .is_some()
            {
                // Let the dedicated error-dialog check classify the message;
                // page-load itself only needs to know the page is "ready".
                return OperationResult::Success(true, "error dialog visible".to_string());
            }

            if session
                .query_family(&self.families.message_input)
                .await
                .unwrap_or(None)
                .is_some()
            {
                return OperationResult::Success(true, "page ready".to_string());
            }

            if Instant::now() >= deadline {
                return OperationResult::Waiting("page load timed out".to_string());
            }

            tokio::select! {
                _ = tokio::time::sleep(cfg.poll_interval) => {}
                _ = cancellation.cancelled() => return OperationResult::Waiting("cancelled".to_string()),
            }
        }
    }

    /// Runs alongside a send to detect disruptions: QR appearing mid-send,
    /// network loss, a new error dialog, or cancellation. Returns `None` if
    /// the monitor window closes cleanly with nothing to report.
    pub async fn continuous_monitoring(
        &self,
        session: &BrowserSession,
        network: &NetworkService,
        cfg: &CoreConfig,
        window: std::time::Duration,
        cancellation: &CancellationToken,
    ) -> Option<OperationResult<bool>> {
        let deadline = Instant::now() + window;

        while Instant::now() < deadline {
            if cancellation.is_cancelled() {
                return Some(OperationResult::Waiting("cancelled".to_string()));
            }

            if session
                .query_family(&self.families.qr_auth_page)
                .await
                .unwrap_or(None)
                .is_some()
            {
                return Some(OperationResult::PendingQR("Authentication required".to_string()));
            }

            if !network.check_internet_connectivity().await {
                return Some(OperationResult::PendingNET(
                    "no internet connectivity detected".to_string(),
                ));
            }

            if let Some(el) = session
                .query_family(&self.families.invalid_number_dialog)
                .await
                .unwrap_or(None)
            {
                return Some(OperationResult::Failure(format!(
                    "does not have WhatsApp registered. Error dialog detected using selector: {}",
                    el.text
                )));
            }

            tokio::select! {
                _ = tokio::time::sleep(cfg.poll_interval) => {}
                _ = cancellation.cancelled() => return Some(OperationResult::Waiting("cancelled".to_string())),
            }
        }

        None
    }

    /// Locates the most recent outgoing message bubble and extracts its
    /// status icon. `expected_substring` optionally narrows the match to the
    /// bubble containing the just-sent content.
    pub async fn get_last_outgoing_message_status(
        &self,
        session: &BrowserSession,
        expected_substring: Option<&str>,
    ) -> MessageStatus {
        let bubble = match session.query_family(&self.families.outgoing_message_bubble).await {
            Ok(Some(b)) => b,
            _ => return MessageStatus::empty(),
        };

        if let Some(substr) = expected_substring {
            // WhatsApp Web sometimes reflows whitespace around emoji/line
            // breaks in the rendered bubble, so match loosely on whitespace
            // rather than requiring a byte-for-byte substring.
            let pattern = regex::escape(substr).replace("\\ ", "\\s+");
            let matches = regex::Regex::new(&pattern).map(|re| re.is_match(&bubble.text)).unwrap_or(false);
            if !matches {
                return MessageStatus::empty();
            }
        }

        for (family, key) in [
            (&self.families.status_icon_double_check_blue, IconKey::DoubleCheckBlue),
            (&self.families.status_icon_double_check, IconKey::DoubleCheck),
            (&self.families.status_icon_single_check, IconKey::SingleCheck),
            (&self.families.status_icon_clock, IconKey::Clock),
        ] {
            if session.query_family(family).await.unwrap_or(None).is_some() {
                return MessageStatus {
                    icon_key: Some(key),
                    raw_text: Some(bubble.text),
                };
            }
        }

        MessageStatus::empty()
    }

    /// `Failure` if an invalid-number dialog is shown; `Success(true)` if the
    /// input field is visible; `Waiting` otherwise.
    pub async fn check_for_whatsapp_error_dialog(
        &self,
        session: &BrowserSession,
        phone: &str,
    ) -> OperationResult<bool> {
        for selector in &self.families.invalid_number_dialog.selectors {
            if let Ok(Some(_)) = session.query_selector(selector).await {
                return OperationResult::Failure(format!(
                    "{} does not have WhatsApp registered. Error dialog detected using selector: {:?}",
                    phone, selector.pattern
                ));
            }
        }

        if session
            .query_family(&self.families.message_input)
            .await
            .unwrap_or(None)
            .is_some()
        {
            return OperationResult::Success(true, "input field visible".to_string());
        }

        OperationResult::Waiting("neither error dialog nor input field visible yet".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_not_a_terminal_delivery_icon() {
        assert!(!IconKey::Clock.is_terminal_delivery());
        assert!(IconKey::SingleCheck.is_terminal_delivery());
        assert!(IconKey::DoubleCheck.is_terminal_delivery());
        assert!(IconKey::DoubleCheckBlue.is_terminal_delivery());
    }

    #[test]
    fn icon_key_strings_match_closed_set() {
        assert_eq!(IconKey::SingleCheck.as_str(), "msg-check");
        assert_eq!(IconKey::DoubleCheck.as_str(), "msg-dblcheck");
    }

    #[tokio::test]
    async fn wait_for_page_load_honors_an_already_cancelled_token() {
        let service = UIInteractionService::default();
        let session = BrowserSession::new("mod-cancel-1", "/tmp/profiles", "http://localhost:9515");
        let network = NetworkService::new(&CoreConfig::default());
        let cfg = CoreConfig::default();
        let token = CancellationToken::new();
        token.cancel();

        let result = service.wait_for_page_load(&session, &network, &cfg, &token).await;
        assert_eq!(result, OperationResult::Waiting("cancelled".to_string()));
    }

    #[tokio::test]
    async fn continuous_monitoring_honors_an_already_cancelled_token() {
        let service = UIInteractionService::default();
        let session = BrowserSession::new("mod-cancel-2", "/tmp/profiles", "http://localhost:9515");
        let network = NetworkService::new(&CoreConfig::default());
        let cfg = CoreConfig::default();
        let token = CancellationToken::new();
        token.cancel();

        let result = service
            .continuous_monitoring(&session, &network, &cfg, std::time::Duration::from_secs(5), &token)
            .await;
        assert_eq!(result, Some(OperationResult::Waiting("cancelled".to_string())));
    }

    #[test]
    fn empty_message_status_has_no_icon() {
        let status = MessageStatus::empty();
        assert!(status.is_empty());
        assert!(status.icon_key.is_none());
    }
}
