use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication required - please sign in")]
    AuthenticationRequired,

    #[error("Session expired - please sign in again")]
    SessionExpired,

    #[error("Request failed ({status}): {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Credential store error: {0:#}")]
    CredentialStore(#[source] anyhow::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Fields checked, in order, for a human-readable error message.
const MESSAGE_FIELDS: [&str; 3] = ["message", "detail", "error"];

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    /// Build a `RequestFailed` from a non-success status and its body.
    ///
    /// The message comes from the first string field among `message`,
    /// `detail` and `error`; bodies that are not a JSON object carrying one
    /// of those fall back to a generic message.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| {
                MESSAGE_FIELDS
                    .iter()
                    .find_map(|field| value.get(field)?.as_str().map(str::to_string))
            })
            .map(|m| Self::truncate_body(&m))
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));

        ApiError::RequestFailed {
            status: status.as_u16(),
            message,
        }
    }

    /// HTTP status of a failed request, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RequestFailed { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True for the failures after which the session is gone and the user
    /// must sign in again.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, ApiError::AuthenticationRequired | ApiError::SessionExpired)
    }
}
