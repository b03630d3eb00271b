//! Error types for the ragchat client

use std::time::Duration;

use thiserror::Error;

/// Result type alias for ragchat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the chat client
#[derive(Debug, Error)]
pub enum Error {
    /// Backend unreachable or answered with an unusable payload
    #[error("network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status
    #[error("backend returned {status}{}", suffix(.detail))]
    Rejected {
        /// HTTP status code
        status: u16,
        /// `detail` field from the error body, when the backend sent one
        detail: Option<String>,
    },

    /// Action attempted without a selected session or without text
    #[error("{0}")]
    Precondition(String),

    /// Required local capability (microphone, speaker, STT key) is missing
    #[error("capability unavailable: {0}")]
    Capability(String),

    /// A required field is empty or malformed
    #[error("{0}")]
    Validation(String),

    /// Backend call did not complete in time
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or decoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Coarse classification used to decide how an error is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Precondition,
    Capability,
    Validation,
    Timeout,
    Internal,
}

impl Error {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::Rejected { .. } | Self::Http(_) | Self::Serialization(_) => {
                ErrorKind::Network
            }
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Capability(_) => ErrorKind::Capability,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Config(_) | Self::Audio(_) | Self::Stt(_) | Self::Io(_) | Self::Toml(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Backend-supplied failure reason, if any
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Rejected { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /// Whether this error must interrupt the user rather than scroll past
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Precondition | ErrorKind::Validation | ErrorKind::Capability
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_includes_detail() {
        let err = Error::Rejected {
            status: 400,
            detail: Some("Invalid URL".to_string()),
        };
        assert_eq!(err.to_string(), "backend returned 400: Invalid URL");
        assert_eq!(err.detail(), Some("Invalid URL"));

        let bare = Error::Rejected {
            status: 502,
            detail: None,
        };
        assert_eq!(bare.to_string(), "backend returned 502");
    }

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::Network("down".into()).kind(), ErrorKind::Network);
        assert_eq!(
            Error::Timeout(Duration::from_secs(30)).kind(),
            ErrorKind::Timeout
        );
        assert!(Error::Precondition("select a session first".into()).is_blocking());
        assert!(Error::Capability("no microphone".into()).is_blocking());
        assert!(!Error::Network("down".into()).is_blocking());
    }
}
