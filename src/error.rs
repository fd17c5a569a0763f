//! Error taxonomy for the session core.
//!
//! Only [`ProviderError`] crosses the public boundary of the session store.
//! [`ProfileLoadError`] and [`InitializationError`] are absorbed where they are
//! raised: they are logged and degrade state (no profile, no stored session).

use thiserror::Error;
use uuid::Uuid;

/// Message shown when nothing more specific is known about a failure.
pub const DEFAULT_ERROR_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Error raised by any delegated auth provider call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<String>,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            status: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Maps the error to a message fit for the login and reset forms.
    ///
    /// The machine code wins over the status, the status over the raw message.
    #[must_use]
    pub fn friendly_message(&self) -> String {
        if let Some(message) = self.code.as_deref().and_then(message_for_code) {
            return message.to_string();
        }
        if let Some(message) = self.status.and_then(message_for_status) {
            return message.to_string();
        }
        if self.message.trim().is_empty() {
            DEFAULT_ERROR_MESSAGE.to_string()
        } else {
            self.message.clone()
        }
    }
}

fn message_for_code(code: &str) -> Option<&'static str> {
    match code {
        "invalid_credentials" => Some("Invalid email or password."),
        "user_already_exists" => Some("A user with this email already exists."),
        "weak_password" => Some("The password is too weak. Try a more complex one."),
        "rate_limit_exceeded" | "over_request_rate_limit" | "over_email_send_rate_limit" => {
            Some("You have exceeded the request limit. Please try again later.")
        }
        "validation_failed" => Some("The submitted data is not valid."),
        _ => None,
    }
}

fn message_for_status(status: u16) -> Option<&'static str> {
    match status {
        400 => Some("Your request is not valid. Check the data you entered."),
        401 => Some("You are not authorized to perform this action."),
        404 => Some("The requested resource was not found."),
        422 => Some("The submitted data could not be processed."),
        429 => Some("Too many attempts. Try again in a moment."),
        500 => Some("A server error occurred. Please try again later."),
        _ => None,
    }
}

/// Failure of a key/value storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage contents are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raised while fetching a profile row; never propagated to callers.
#[derive(Debug, Error)]
pub enum ProfileLoadError {
    #[error("no profile row for user {0}")]
    NotFound(Uuid),
    #[error("profile request failed: {0}")]
    Request(String),
    #[error("profile row could not be decoded: {0}")]
    Decode(String),
}

/// Raised by a cold-start probe step; treated as "no session found here".
/// Adapter failures arrive through the provider as `storage_error`.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("probe provider call failed: {0}")]
    Provider(#[from] ProviderError),
}
