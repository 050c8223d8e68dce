//! Error types for video generation and task orchestration.

use std::time::Duration;

/// Errors that can occur while generating videos or tracking tasks.
#[derive(Debug, thiserror::Error)]
pub enum ClipForgeError {
    /// API key missing or invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// The provider's poll budget ran out before the remote job finished.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// The provider answered with a payload missing the fields we need.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Provider not available (feature disabled or not configured).
    #[error("provider not available: {0}")]
    ProviderNotAvailable(String),

    /// The remote job reported failure.
    #[error("video generation failed: {0}")]
    VideoGeneration(String),

    /// Placeholder rendering or encoding failed.
    #[error("video encoding failed: {0}")]
    Encode(String),

    /// No task is registered under the identifier.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A task with the identifier already exists.
    #[error("task already exists: {0}")]
    TaskConflict(String),

    /// The task already reached a terminal state.
    #[error("task already finished: {0}")]
    TaskAlreadyFinished(String),

    /// Settings could not be loaded or are inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a provider failure, used for log fields only.
///
/// The fallback chain treats every class the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection, TLS or body transfer problems.
    Transport,
    /// Non-success status code or remote job failure.
    RemoteFailure,
    /// Poll budget exhausted.
    Timeout,
    /// Response body lacked expected fields or could not be decoded.
    MalformedResponse,
    /// Missing credentials, disabled provider, local I/O.
    Local,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::RemoteFailure => write!(f, "remote_failure"),
            Self::Timeout => write!(f, "timeout"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl ClipForgeError {
    /// Classifies a provider error for logging.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network(e) if e.is_decode() => FailureKind::MalformedResponse,
            Self::Network(_) => FailureKind::Transport,
            Self::Api { .. }
            | Self::RateLimited { .. }
            | Self::ContentBlocked(_)
            | Self::VideoGeneration(_) => FailureKind::RemoteFailure,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Decode(_) | Self::UnexpectedResponse(_) | Self::Json(_) => {
                FailureKind::MalformedResponse
            }
            _ => FailureKind::Local,
        }
    }

    /// Returns true for registry lookups that found nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TaskNotFound(_))
    }
}

impl From<config::ConfigError> for ClipForgeError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for clipforge operations.
pub type Result<T> = std::result::Result<T, ClipForgeError>;

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Redacts credential-looking tokens and caps the length of a provider error body.
///
/// Provider responses sometimes echo the `Authorization` header or the key
/// itself; these messages end up in logs and in the task's error trail.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let redacted: Vec<String> = text
        .split_whitespace()
        .map(|word| {
            let bare = word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-');
            let looks_like_key = bare.starts_with("sk-")
                || bare.starts_with("hf_")
                || bare.starts_with("key_")
                || (bare.len() >= 32 && bare.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
            if looks_like_key {
                "[REDACTED]".to_string()
            } else {
                word.to_string()
            }
        })
        .collect();

    let mut joined = redacted.join(" ");
    if joined.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !joined.is_char_boundary(cut) {
            cut -= 1;
        }
        joined.truncate(cut);
        joined.push_str("...");
    }
    joined
}

/// Reads a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
