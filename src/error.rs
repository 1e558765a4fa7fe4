use std::path::PathBuf;

use hyper::StatusCode;
use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Error types for the Gmail cleaner
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The OAuth client-secret descriptor could not be found
    #[error(
        "OAuth client secret not found at {path:?}. \
         Download an OAuth 2.0 desktop client JSON from https://console.cloud.google.com/ \
         (APIs & Services > Credentials, with the Gmail API enabled) and save it there, \
         or set GMAIL_CLIENT_ID and GMAIL_CLIENT_SECRET"
    )]
    MissingClientSecret { path: PathBuf },

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400), usually a malformed query
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl GmailError {
    /// Build an error from a non-success HTTP status
    pub fn from_status(status_code: u16) -> Self {
        let reason = StatusCode::from_u16(status_code)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        Self::classify(status_code, format!("HTTP {}: {}", status_code, reason))
    }

    /// Build an error from a Google API error body, `{"error": {"code", "message"}}`
    pub fn from_error_body(body: &serde_json::Value) -> Self {
        let detail = &body["error"];
        let message = detail["message"].as_str().unwrap_or_default();

        match detail["code"].as_u64().and_then(|c| u16::try_from(c).ok()) {
            Some(status_code) if message.is_empty() => Self::from_status(status_code),
            Some(status_code) => {
                Self::classify(status_code, format!("HTTP {}: {}", status_code, message))
            }
            None => GmailError::BadRequest(body.to_string()),
        }
    }

    fn classify(status_code: u16, message: String) -> Self {
        match status_code {
            429 => GmailError::RateLimited(message),
            404 => GmailError::MessageNotFound(message),
            400 => GmailError::BadRequest(message),
            403 => GmailError::Forbidden(message),
            401 => GmailError::AuthError(message),
            500..=599 => GmailError::ServerError {
                status: status_code,
                message,
            },
            _ => GmailError::ApiError(message),
        }
    }

    /// Whether the error means the credential lacks the scope for the call
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, GmailError::Forbidden(_))
    }

    /// Whether the error is fatal for the whole run rather than a single call
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GmailError::AuthError(_)
                | GmailError::MissingClientSecret { .. }
                | GmailError::ConfigError(_)
        )
    }

    /// Operator-facing hint for the error category, if there is one
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            GmailError::MissingClientSecret { .. } => {
                Some("Place credentials.json next to the binary or pass --credentials <PATH>.")
            }
            GmailError::AuthError(_) => Some(
                "Check that credentials.json is valid and the Gmail API is enabled. \
                 Try running again with --reauth.",
            ),
            GmailError::Forbidden(_) => Some(
                "The stored credential lacks the gmail.modify scope. \
                 Run with --reauth and grant every requested permission.",
            ),
            GmailError::BadRequest(_) => {
                Some("Check the filter syntax, e.g. 'from:someone@example.com' or 'is:unread'.")
            }
            GmailError::RateLimited(_) | GmailError::ServerError { .. } => {
                Some("This is usually temporary. Wait a moment and run the command again.")
            }
            GmailError::ConfigError(_) => Some("Check the configuration file for errors."),
            _ => None,
        }
    }
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                GmailError::from_status(response.status().as_u16())
            }
            // Non-2xx responses with a JSON body land here, whatever their status
            google_gmail1::Error::BadRequest(ref body) => GmailError::from_error_body(body),
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}
