//! Selector families: ordered, immutable configuration. One family per
//! semantic DOM target; matching is first-found-wins within a family.
//! Implementers replace a stale selector here - the orchestrator never
//! hard-codes a WhatsApp-Web DOM path.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectorKind {
    Css,
    XPath,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selector {
    pub kind: SelectorKind,
    pub pattern: String,
}

impl Selector {
    pub fn css(pattern: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::Css,
            pattern: pattern.into(),
        }
    }

    pub fn xpath(pattern: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::XPath,
            pattern: pattern.into(),
        }
    }

    pub fn text(pattern: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::Text,
            pattern: pattern.into(),
        }
    }
}

/// An ordered list of alternative selectors for the same semantic target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorFamily {
    pub name: String,
    pub selectors: Vec<Selector>,
}

impl SelectorFamily {
    pub fn new(name: impl Into<String>, selectors: Vec<Selector>) -> Self {
        Self {
            name: name.into(),
            selectors,
        }
    }
}

/// The closed set of semantic families the UI interaction layer waits on.
/// Configuration, not behavior - see `SelectorFamilies::default` for the
/// shipped alternatives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorFamilies {
    /// Main UI mounted - used by `SessionManager::is_session_ready`.
    pub main_ui_ready: SelectorFamily,
    /// Message input field (contenteditable box at the bottom of a chat).
    pub message_input: SelectorFamily,
    /// The send button next to the input field.
    pub send_button: SelectorFamily,
    /// QR code / phone-pairing screen.
    pub qr_auth_page: SelectorFamily,
    /// "Phone number shared via url is invalid" / not-on-WhatsApp dialog.
    pub invalid_number_dialog: SelectorFamily,
    /// "Starting chat..." transient overlay shown right after navigation.
    pub starting_chat_dialog: SelectorFamily,
    /// Container holding the most recent outgoing message bubble.
    pub outgoing_message_bubble: SelectorFamily,
    /// Status icon markers within an outgoing bubble, closed set.
    pub status_icon_clock: SelectorFamily,
    pub status_icon_single_check: SelectorFamily,
    pub status_icon_double_check: SelectorFamily,
    pub status_icon_double_check_blue: SelectorFamily,
}

impl SelectorFamilies {
    /// Guards against a misconfigured family (e.g. an operator edit that
    /// emptied one out) being discovered only as a silent, permanent
    /// `Waiting`/`None` at runtime.
    pub fn validate(&self) -> Result<(), crate::error::WhatsAppUiError> {
        for family in [
            &self.main_ui_ready,
            &self.message_input,
            &self.send_button,
            &self.qr_auth_page,
            &self.invalid_number_dialog,
            &self.starting_chat_dialog,
            &self.outgoing_message_bubble,
            &self.status_icon_clock,
            &self.status_icon_single_check,
            &self.status_icon_double_check,
            &self.status_icon_double_check_blue,
        ] {
            if family.selectors.is_empty() {
                return Err(crate::error::WhatsAppUiError::EmptySelectorFamily(family.name.clone()));
            }
        }
        Ok(())
    }
}

impl Default for SelectorFamilies {
    fn default() -> Self {
        Self {
            main_ui_ready: SelectorFamily::new(
                "main_ui_ready",
                vec![
                    Selector::css("div#pane-side"),
                    Selector::css("div[data-testid='chat-list']"),
                    Selector::xpath("//div[@aria-label='Chat list']"),
                ],
            ),
            message_input: SelectorFamily::new(
                "message_input",
                vec![
                    Selector::css("div[data-testid='conversation-compose-box-input']"),
                    Selector::css("footer div[contenteditable='true']"),
                    Selector::xpath("//footer//div[@role='textbox']"),
                ],
            ),
            send_button: SelectorFamily::new(
                "send_button",
                vec![
                    Selector::css("button[data-testid='compose-btn-send']"),
                    Selector::css("span[data-icon='send']"),
                    Selector::xpath("//button[@aria-label='Send']"),
                ],
            ),
            qr_auth_page: SelectorFamily::new(
                "qr_auth_page",
                vec![
                    Selector::css("div[data-testid='qrcode']"),
                    Selector::css("canvas[aria-label='Scan this QR code to link a device!']"),
                    Selector::text("Log in to WhatsApp Web"),
                ],
            ),
            invalid_number_dialog: SelectorFamily::new(
                "invalid_number_dialog",
                vec![
                    Selector::text("Phone number shared via url is invalid"),
                    Selector::text("The phone number you entered is invalid"),
                    Selector::css("div[data-animate-modal-popup='true'] div[role='alert']"),
                ],
            ),
            starting_chat_dialog: SelectorFamily::new(
                "starting_chat_dialog",
                vec![Selector::text("Starting chat"), Selector::css("div[data-testid='starting-chat']")],
            ),
            outgoing_message_bubble: SelectorFamily::new(
                "outgoing_message_bubble",
                vec![
                    Selector::css("div.message-out"),
                    Selector::css("div[data-testid='msg-container'][data-outgoing='true']"),
                ],
            ),
            status_icon_clock: SelectorFamily::new(
                "status_icon_clock",
                vec![Selector::css("span[data-icon='msg-time']")],
            ),
            status_icon_single_check: SelectorFamily::new(
                "status_icon_single_check",
                vec![Selector::css("span[data-icon='msg-check']")],
            ),
            status_icon_double_check: SelectorFamily::new(
                "status_icon_double_check",
                vec![Selector::css("span[data-icon='msg-dblcheck']")],
            ),
            status_icon_double_check_blue: SelectorFamily::new(
                "status_icon_double_check_blue",
                vec![Selector::css("span[data-icon='msg-dblcheck-ack']")],
            ),
        }
    }
}
