//! Error taxonomy
//!
//! Capture and AI failures are recovered inside the session and shown to the
//! user as error responses. Config errors are fatal at startup. Hotkey
//! registration errors only degrade the hotkey set.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Screen capture denied: {0}")]
    Denied(String),
    #[error("Screen capture unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to encode screenshot: {0}")]
    Encoding(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited by provider{}", .retry_after_secs.map(|s| format!(" (retry after {s}s)")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Request cancelled")]
    Cancelled,
    #[error("Request timed out")]
    Timeout,
}

/// Error carried by an error response record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Ai(#[from] AiError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HotkeyRegistrationError {
    #[error("No readable keyboard devices: {0}")]
    NoDevices(String),
    #[error("No keyboard device supports the key for '{action}' ({binding})")]
    UnsupportedKey { action: &'static str, binding: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_message_includes_retry_after() {
        let err = AiError::RateLimited {
            retry_after_secs: Some(12),
        };
        assert_eq!(err.to_string(), "Rate limited by provider (retry after 12s)");
        let err = AiError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "Rate limited by provider");
    }

    #[test]
    fn test_request_error_is_transparent() {
        let err: RequestError = AiError::Timeout.into();
        assert_eq!(err.to_string(), "Request timed out");
        let err: RequestError = CaptureError::Denied("BadMatch".into()).into();
        assert_eq!(err.to_string(), "Screen capture denied: BadMatch");
    }
}
