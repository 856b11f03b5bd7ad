//! Per-message state machine: navigate, detect disruption, fill, send,
//! classify status - or stop early for a pure validation check.

use crate::browser::interaction::UIInteractionService;
use crate::browser::session::BrowserSession;
use crate::config::CoreConfig;
use crate::coordinator::{classify_reason, OperationCoordinator, PauseTier};
use crate::error::OperationResult;
use crate::network::NetworkService;
use crate::retry::{default_is_retryable_exception, execute_with_retry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct SendOrchestrator {
    cfg: Arc<CoreConfig>,
    coordinator: Arc<OperationCoordinator>,
    interaction: Arc<UIInteractionService>,
    network: Arc<NetworkService>,
}

impl SendOrchestrator {
    pub fn new(
        cfg: Arc<CoreConfig>,
        coordinator: Arc<OperationCoordinator>,
        interaction: Arc<UIInteractionService>,
        network: Arc<NetworkService>,
    ) -> Self {
        Self {
            cfg,
            coordinator,
            interaction,
            network,
        }
    }

    /// Builds `https://web.whatsapp.com/send?phone=<digits>&text=<encoded>`.
    /// `phone` is expected pre-concatenated (country code + local number);
    /// any non-digit characters are stripped here regardless.
    fn target_url(&self, phone: &str, message: Option<&str>) -> String {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        match message {
            Some(text) => format!(
                "{}send?phone={}&text={}",
                self.cfg.entry_url,
                digits,
                urlencode(text)
            ),
            None => format!("{}send?phone={}", self.cfg.entry_url, digits),
        }
    }

    /// Pre-flight pause check. `None` means not paused, proceed.
    async fn preflight_pause(&self, moderator_id: &str) -> anyhow::Result<Option<OperationResult<String>>> {
        let Some(state) = self.coordinator.current_pause(moderator_id).await? else {
            return Ok(None);
        };
        if !state.is_paused {
            return Ok(None);
        }
        let reason = state.pause_reason.unwrap_or_default();
        let result = match classify_reason(&reason) {
            PauseTier::Authentication => OperationResult::PendingQR(reason),
            PauseTier::Network => OperationResult::PendingNET(reason),
            PauseTier::Advisory => OperationResult::Waiting(reason),
        };
        Ok(Some(result))
    }

    /// `CheckWhatsAppNumber(phone, session) -> OperationResult<bool>`. The
    /// whole navigate-and-validate attempt is wrapped in the retry service
    /// bounded by `max_send_attempts`: a `Waiting` that survives every
    /// attempt is returned unchanged, never upgraded to `Failure`.
    pub async fn check_whatsapp_number(
        &self,
        moderator_id: &str,
        phone: &str,
        session: &BrowserSession,
        cancellation: &CancellationToken,
    ) -> anyhow::Result<OperationResult<bool>> {
        if let Some(paused) = self.preflight_pause(moderator_id).await? {
            return Ok(paused.map(|_| false));
        }
        if cancellation.is_cancelled() {
            return Ok(OperationResult::Waiting("cancelled".to_string()));
        }

        let validated = execute_with_retry(
            &self.cfg,
            self.cfg.max_send_attempts,
            |_attempt| async { Ok(self.attempt_validate(phone, session, cancellation).await) },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            cancellation,
        )
        .await;

        Ok(validated.map(|_| true))
    }

    /// `SendMessageWithIconType(phone, message, session) -> OperationResult<String>`.
    /// The whole navigate-fill-send-classify attempt is wrapped in the retry
    /// service bounded by `max_send_attempts`, mirroring `check_whatsapp_number`.
    pub async fn send_message_with_icon_type(
        &self,
        moderator_id: &str,
        phone: &str,
        message: &str,
        session: &BrowserSession,
        cancellation: &CancellationToken,
    ) -> anyhow::Result<OperationResult<String>> {
        if let Some(paused) = self.preflight_pause(moderator_id).await? {
            return Ok(paused);
        }
        if cancellation.is_cancelled() {
            return Ok(OperationResult::Waiting("cancelled".to_string()));
        }

        let result = execute_with_retry(
            &self.cfg,
            self.cfg.max_send_attempts,
            |_attempt| async { Ok(self.attempt_send(session, phone, message, cancellation).await) },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            cancellation,
        )
        .await;

        Ok(result)
    }

    async fn attempt_validate(
        &self,
        phone: &str,
        session: &BrowserSession,
        cancellation: &CancellationToken,
    ) -> OperationResult<()> {
        let url = self.target_url(phone, None);
        if let Err(e) = session.navigate_to(&url).await {
            return OperationResult::Failure(e.to_string());
        }
        if cancellation.is_cancelled() {
            return OperationResult::Waiting("cancelled".to_string());
        }

        let page = self.wait_for_page_load(session, cancellation).await;
        if page.is_terminal() && !page.is_success() {
            return page.map(|_| ());
        }
        if let OperationResult::Waiting(m) = page {
            return OperationResult::Waiting(m);
        }

        let dialog = self.check_error_dialog_with_retry(session, phone, cancellation).await;
        dialog.map(|_| ())
    }

    async fn attempt_send(
        &self,
        session: &BrowserSession,
        phone: &str,
        message: &str,
        cancellation: &CancellationToken,
    ) -> OperationResult<String> {
        let url = self.target_url(phone, Some(message));
        if let Err(e) = session.navigate_to(&url).await {
            return OperationResult::Failure(e.to_string());
        }
        if cancellation.is_cancelled() {
            return OperationResult::Waiting("cancelled".to_string());
        }

        let page = self.wait_for_page_load(session, cancellation).await;
        if page.is_terminal() && !page.is_success() {
            return page.map(|_| String::new());
        }
        if let OperationResult::Waiting(m) = page {
            return OperationResult::Waiting(m);
        }

        let dialog = self.check_error_dialog_with_retry(session, phone, cancellation).await;
        if let OperationResult::Failure(m) = dialog {
            return OperationResult::Failure(m);
        }

        let input = self.locate_input_field(session, cancellation).await;
        if !input.is_success() {
            return input.map(|_| String::new());
        }

        if let Err(failure) = self.fill_and_send(session, message).await {
            return failure;
        }

        self.classify_outcome(session, message, cancellation).await
    }

    /// Precedence is QR > network-offline > error-dialog/input ready.
    async fn wait_for_page_load(&self, session: &BrowserSession, cancellation: &CancellationToken) -> OperationResult<bool> {
        self.interaction
            .wait_for_page_load(session, &self.network, &self.cfg, cancellation)
            .await
    }

    /// Wrapped in the retry service since the dialog can briefly lag a few
    /// frames behind navigation.
    async fn check_error_dialog_with_retry(
        &self,
        session: &BrowserSession,
        phone: &str,
        cancellation: &CancellationToken,
    ) -> OperationResult<bool> {
        execute_with_retry(
            &self.cfg,
            self.cfg.max_error_dialog_attempts,
            |_attempt| async { Ok(self.interaction.check_for_whatsapp_error_dialog(session, phone).await) },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            cancellation,
        )
        .await
    }

    /// Locates the input field family with retry; `Failure` on exhaustion.
    async fn locate_input_field(&self, session: &BrowserSession, cancellation: &CancellationToken) -> OperationResult<bool> {
        let families = self.interaction.families().clone();
        let result = execute_with_retry(
            &self.cfg,
            self.cfg.max_input_field_attempts,
            |_attempt| {
                let families = families.clone();
                async move {
                    match session.query_family(&families.message_input).await {
                        Ok(Some(_)) => Ok(OperationResult::Success(true, "input field found".to_string())),
                        Ok(None) => Ok(OperationResult::Waiting("input field not found yet".to_string())),
                        Err(e) => Err(anyhow::anyhow!(e.to_string())),
                    }
                }
            },
            |r| matches!(r, OperationResult::Waiting(_)),
            default_is_retryable_exception,
            cancellation,
        )
        .await;

        match result {
            OperationResult::Waiting(_) => OperationResult::Failure("Input field not found".to_string()),
            other => other,
        }
    }

    /// Fills the input, then clicks the send button; falls back to Enter
    /// exactly once if no send button matches.
    async fn fill_and_send(&self, session: &BrowserSession, message: &str) -> Result<(), OperationResult<String>> {
        let families = self.interaction.families();
        let input_selector = families
            .message_input
            .selectors
            .first()
            .ok_or_else(|| OperationResult::Failure("message_input family has no selectors".to_string()))?;

        session
            .fill(input_selector, message)
            .await
            .map_err(|e| OperationResult::Failure(e.to_string()))?;

        for selector in &families.send_button.selectors {
            if session.click(selector).await.is_ok() {
                return Ok(());
            }
        }

        session
            .press(input_selector, "Enter")
            .await
            .map_err(|e| OperationResult::Failure(e.to_string()))
    }

    /// Classification phase: poll for a terminal delivery icon while
    /// `ContinuousMonitoring` watches for a disruption in parallel.
    async fn classify_outcome(
        &self,
        session: &BrowserSession,
        message: &str,
        cancellation: &CancellationToken,
    ) -> OperationResult<String> {
        let deadline = tokio::time::Instant::now() + self.cfg.status_classification_wait;

        loop {
            if let Some(disruption) = self
                .interaction
                .continuous_monitoring(session, &self.network, &self.cfg, self.cfg.poll_interval, cancellation)
                .await
            {
                return disruption.map(|_| String::new());
            }

            let status = self
                .interaction
                .get_last_outgoing_message_status(session, Some(message))
                .await;

            if let Some(icon) = status.icon_key {
                if icon.is_terminal_delivery() {
                    return OperationResult::Success(icon.as_str().to_string(), "message delivered".to_string());
                }
                // clock/spinner: unsent, keep polling.
            }

            if tokio::time::Instant::now() >= deadline {
                return OperationResult::Waiting("No status icon found".to_string());
            }
        }
    }
}

fn urlencode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::selectors::SelectorFamilies;
    use crate::persistence::{InMemoryOutboundMessageStore, InMemoryPauseStateStore, PauseState};

    fn orchestrator() -> SendOrchestrator {
        let cfg = Arc::new(CoreConfig::default());
        let coordinator = Arc::new(OperationCoordinator::new(
            Arc::new(InMemoryPauseStateStore::default()),
            Arc::new(InMemoryOutboundMessageStore::default()),
        ));
        let interaction = Arc::new(UIInteractionService::new(SelectorFamilies::default()));
        let network = Arc::new(NetworkService::new(&cfg));
        SendOrchestrator::new(cfg, coordinator, interaction, network)
    }

    #[test]
    fn target_url_strips_non_digits_and_encodes_text() {
        let orch = orchestrator();
        let url = orch.target_url("+1 (555) 123-4567", Some("hello world"));
        assert_eq!(url, "https://web.whatsapp.com/send?phone=15551234567&text=hello+world");
    }

    #[test]
    fn target_url_without_message_omits_text_param() {
        let orch = orchestrator();
        let url = orch.target_url("5511999999999", None);
        assert_eq!(url, "https://web.whatsapp.com/send?phone=5511999999999");
    }

    #[tokio::test]
    async fn qr_pause_short_circuits_before_touching_the_browser() {
        let orch = orchestrator();
        orch.coordinator
            .pause_all_ongoing_tasks("m1", "system", "PendingQR - Authentication required")
            .await
            .unwrap();

        let preflight = orch.preflight_pause("m1").await.unwrap();
        assert!(matches!(preflight, Some(OperationResult::PendingQR(_))));
    }

    #[tokio::test]
    async fn advisory_pause_maps_to_waiting() {
        let orch = orchestrator();
        orch.coordinator
            .pause_all_ongoing_tasks("m2", "system", "Authentication check")
            .await
            .unwrap();

        let preflight = orch.preflight_pause("m2").await.unwrap();
        assert!(matches!(preflight, Some(OperationResult::Waiting(_))));
    }

    #[tokio::test]
    async fn no_pause_state_proceeds() {
        let orch = orchestrator();
        let preflight = orch.preflight_pause("m3").await.unwrap();
        assert!(preflight.is_none());
    }

    #[tokio::test]
    async fn cleared_pause_state_proceeds() {
        let orch = orchestrator();
        orch.coordinator.pause_all_ongoing_tasks("m4", "u", "PendingNET").await.unwrap();
        orch.coordinator.resume_tasks_paused_for_reason("m4", "PendingNET").await.unwrap();

        let preflight = orch.preflight_pause("m4").await.unwrap();
        assert!(preflight.is_none());
    }

    #[test]
    fn pause_state_default_is_not_paused() {
        assert!(!PauseState::default().is_paused);
    }

    #[tokio::test]
    async fn send_short_circuits_on_an_already_cancelled_token_before_touching_the_browser() {
        let orch = orchestrator();
        let session = BrowserSession::new("m5", "/tmp/profiles", "http://localhost:9515");
        let token = CancellationToken::new();
        token.cancel();

        let result = orch
            .send_message_with_icon_type("m5", "5511999999999", "hi", &session, &token)
            .await
            .unwrap();
        assert_eq!(result, OperationResult::Waiting("cancelled".to_string()));
    }

    #[tokio::test]
    async fn check_number_short_circuits_on_an_already_cancelled_token() {
        let orch = orchestrator();
        let session = BrowserSession::new("m6", "/tmp/profiles", "http://localhost:9515");
        let token = CancellationToken::new();
        token.cancel();

        let result = orch.check_whatsapp_number("m6", "5511999999999", &session, &token).await.unwrap();
        assert_eq!(result, OperationResult::Waiting("cancelled".to_string()));
    }
}
