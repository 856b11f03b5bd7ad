use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// The only return type used across the orchestrator and retry service.
/// Exactly one tag is ever populated; `Data` is meaningful only on `Success`.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult<T> {
    Success(T, String),
    Failure(String),
    Waiting(String),
    PendingQR(String),
    PendingNET(String),
}

impl<T> OperationResult<T> {
    pub fn message(&self) -> &str {
        match self {
            OperationResult::Success(_, m)
            | OperationResult::Failure(m)
            | OperationResult::Waiting(m)
            | OperationResult::PendingQR(m)
            | OperationResult::PendingNET(m) => m,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationResult::Waiting(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_, _))
    }

    /// Remap the `Success` payload, leaving every other tag untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationResult<U> {
        match self {
            OperationResult::Success(data, msg) => OperationResult::Success(f(data), msg),
            OperationResult::Failure(m) => OperationResult::Failure(m),
            OperationResult::Waiting(m) => OperationResult::Waiting(m),
            OperationResult::PendingQR(m) => OperationResult::PendingQR(m),
            OperationResult::PendingNET(m) => OperationResult::PendingNET(m),
        }
    }
}

/// The "truly exceptional" situations that propagate as real errors rather
/// than travelling inside an [`OperationResult`] - driver-missing, a
/// corrupt profile, a disposed session.
#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("browser binary missing or failed to launch: {0}")]
    LaunchFailed(String),
    #[error("browser profile directory is corrupt or unwritable: {0}")]
    ProfileCorrupt(String),
    #[error("session has already been disposed")]
    Disposed,
    #[error("navigation failed: {0}")]
    NavigationFailed(String),
    #[error("webdriver transport error: {0}")]
    Transport(String),
}

impl From<fantoccini::error::NewSessionError> for BrowserError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        BrowserError::LaunchFailed(err.to_string())
    }
}

impl From<fantoccini::error::CmdError> for BrowserError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        BrowserError::Transport(err.to_string())
    }
}

/// Errors surfaced while interacting with the WhatsApp Web DOM that are not
/// already modeled as an [`OperationResult`] tag (e.g. a malformed selector
/// configuration). Transient DOM races are not represented here - they are
/// classified by [`crate::retry::is_retryable_browser_error`] and retried.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppUiError {
    #[error("selector family '{0}' has no selectors configured")]
    EmptySelectorFamily(String),
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

/// Actix-facing error used only by the thin demo binary's routes - it never
/// appears in the CORE's public library API.
#[derive(Debug)]
pub enum AppError {
    InternalServerError(String),
    BadRequest(String),
    NotFound(String),
    WhatsAppError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::WhatsAppError(msg) => write!(f, "WhatsApp error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::InternalServerError(msg) => {
                HttpResponse::InternalServerError().json(json!({
                    "error": "internal_server_error",
                    "message": msg
                }))
            }
            AppError::BadRequest(msg) => HttpResponse::BadRequest().json(json!({
                "error": "bad_request",
                "message": msg
            })),
            AppError::NotFound(msg) => HttpResponse::NotFound().json(json!({
                "error": "not_found",
                "message": msg
            })),
            AppError::WhatsAppError(msg) => HttpResponse::BadGateway().json(json!({
                "error": "whatsapp_error",
                "message": msg
            })),
        }
    }
}

impl From<BrowserError> for AppError {
    fn from(err: BrowserError) -> Self {
        AppError::WhatsAppError(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}
