use std::fmt;

use thiserror::Error;

use crate::models::Mailbox;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Error types for the Gmail rules engine
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - caller may retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Raw message could not be decoded into an email record
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Rule refers to a field the email record does not have
    #[error("Unknown field '{0}'")]
    UnknownField(String),

    /// Field exists but is neither text nor a timestamp
    #[error("Field '{0}' cannot be filtered: only string and datetime fields are supported")]
    UnsupportedFieldType(String),

    /// Operator name is not valid for the field's kind
    #[error("Filter condition '{predicate}' is not supported for {kind} field '{field}', use {valid}")]
    UnsupportedPredicate {
        field: String,
        predicate: String,
        kind: String,
        valid: String,
    },

    /// Temporal literal matched none of the accepted forms
    #[error(
        "Invalid date value '{0}'. Supported formats are '<n>d' or '<n> days', \
         '<n>m' or '<n> months', and '%Y-%m-%dT%H:%M:%S'"
    )]
    InvalidDateFormat(String),

    /// Ruleset document is not well formed
    #[error("Failed to parse ruleset: {0}")]
    RulesetParse(String),

    /// Ruleset is well formed but one or more rules are invalid
    #[error("Invalid ruleset:\n{}", format_violations(.0))]
    InvalidRuleset(Vec<RuleViolation>),

    /// Remote change succeeded but the local mirror could not record it
    #[error("Mirror diverged from Gmail for message {message_id}: {reason}")]
    MirrorDiverged { message_id: String, reason: String },

    /// Local mirror database error
    #[error("Mirror database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

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

/// A single reason a rule failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleViolation {
    pub rule: String,
    pub location: String,
    pub reason: String,
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule '{}' at {}: {}", self.rule, self.location, self.reason)
    }
}

fn format_violations(violations: &[RuleViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {}", v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Why a single action against a single message did not apply.
///
/// These are reported per action and never abort a ruleset run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFailure {
    /// Message id is not in the mirror
    NotFound,
    /// The mailbox move is not permitted from the current location
    IllegalTransition { from: Mailbox, to: Mailbox },
    /// The remote call failed; the mirror was left untouched
    Transport(String),
}

impl fmt::Display for ActionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionFailure::NotFound => write!(f, "EmailNotFound"),
            ActionFailure::IllegalTransition { from, to } => {
                write!(f, "CannotMoveEmail: {} -> {}", from, to)
            }
            ActionFailure::Transport(reason) => write!(f, "{}", reason),
        }
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// Accepts either delay-seconds or an HTTP-date. Falls back to 5 seconds
/// when the header is missing, invalid, or in the past.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    httpdate::parse_http_date(value)
        .ok()
        .and_then(|at| at.duration_since(std::time::SystemTime::now()).ok())
        .map(|d| d.as_secs())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => GmailError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => GmailError::MessageNotFound("Resource not found".to_string()),
                    400 => GmailError::BadRequest(message),
                    403 => GmailError::Forbidden(message),
                    500..=599 => GmailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => GmailError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => GmailError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}
