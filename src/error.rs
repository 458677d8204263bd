//! Error types for album-zip
//!
//! Errors are split by how far they are allowed to travel:
//! - [`FetchError`] - a single item could not be fetched; recorded and skipped
//! - [`ArchiveError`] - the output sink is broken; fatal for the whole job
//! - [`AlbumError`] - the album page or its item list could not be resolved
//! - [`Error`] - the crate-level error returned by public operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for album-zip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for album-zip
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "worker_count")
        key: Option<String>,
    },

    /// Archive sink failure (fatal for the running job)
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Album resolution failure
    #[error("album error: {0}")]
    Album(#[from] AlbumError),

    /// The destination sink could not be prepared before the job started
    #[error("setup error: {0}")]
    Setup(String),

    /// Operation not allowed in the job's current state
    #[error("cannot {operation} job in state {state}")]
    InvalidState {
        /// The operation that was attempted (e.g., "run")
        operation: String,
        /// The state that prevents the operation
        state: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

/// Item-level fetch failures.
///
/// These never abort a worker or the job: the item is left out of the
/// archive and reported in [`crate::types::JobReport::failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, TLS failure, etc.
    #[error("transport error for {url}: {reason}")]
    Transport {
        /// The URL being fetched
        url: String,
        /// Underlying transport error message
        reason: String,
    },

    /// The request exceeded the configured timeout
    #[error("timed out fetching {url}")]
    Timeout {
        /// The URL being fetched
        url: String,
    },

    /// The server answered with a non-2xx status
    #[error("HTTP {status} fetching {url}")]
    Status {
        /// HTTP status code returned by the server
        status: u16,
        /// The URL being fetched
        url: String,
    },

    /// The body ended before the advertised Content-Length
    #[error("truncated body for {url}: expected {expected} bytes, received {received}")]
    Truncated {
        /// The URL being fetched
        url: String,
        /// Bytes advertised by Content-Length
        expected: u64,
        /// Bytes actually received
        received: u64,
    },

    /// Reading the response body failed mid-stream
    #[error("failed to read body of {url}: {reason}")]
    Body {
        /// The URL being fetched
        url: String,
        /// Underlying error message
        reason: String,
    },
}

impl FetchError {
    /// Classify a reqwest error raised while talking to `url`.
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            FetchError::Timeout { url }
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                url,
            }
        } else if err.is_body() || err.is_decode() {
            FetchError::Body {
                url,
                reason: err.to_string(),
            }
        } else {
            FetchError::Transport {
                url,
                reason: err.to_string(),
            }
        }
    }
}

/// Output sink failures. Any of these stops the archive writer.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Could not open a new entry in the container
    #[error("failed to create entry {entry_name}: {reason}")]
    CreateEntry {
        /// Name of the entry being created
        entry_name: String,
        /// The reason creation failed
        reason: String,
    },

    /// Could not copy an item's bytes into its entry
    #[error("failed to write entry {entry_name}: {reason}")]
    WriteEntry {
        /// Name of the entry being written
        entry_name: String,
        /// The reason the write failed
        reason: String,
    },

    /// Writing the central directory / trailer failed
    #[error("failed to finalize archive: {reason}")]
    Finalize {
        /// The reason finalization failed
        reason: String,
    },

    /// The writer task panicked or was cancelled
    #[error("archive writer task terminated abnormally: {0}")]
    WriterPanicked(String),
}

/// Album resolution errors
#[derive(Debug, Error)]
pub enum AlbumError {
    /// The album page URL was empty or unparsable
    #[error("invalid url: {0:?}")]
    InvalidUrl(String),

    /// The page has no HTML5 player element carrying a data-xml attribute
    #[error("no HTML5 player instance found")]
    NoPlayerFound,

    /// The player XML could not be decoded
    #[error("invalid album XML: {0}")]
    Xml(String),

    /// The album page or XML answered with a non-2xx status
    #[error("HTTP {status} fetching {url}")]
    Http {
        /// HTTP status code returned by the server
        status: u16,
        /// The URL being fetched
        url: String,
    },

    /// Transport failure while resolving
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// API error response format
///
/// ```json
/// { "error": { "code": "no_player_found", "message": "album error: no HTML5 player instance found" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "invalid_url")
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - the album could not be resolved from the given URL
            Error::Album(AlbumError::InvalidUrl(_)) => 400,
            Error::Album(AlbumError::NoPlayerFound) => 400,
            Error::Album(AlbumError::Xml(_)) => 400,
            Error::Album(AlbumError::Http { .. }) => 400,
            Error::Album(AlbumError::Request(_)) => 400,
            Error::Config { .. } => 400,

            // 409 Conflict
            Error::InvalidState { .. } => 409,

            // 502 Bad Gateway - upstream failures
            Error::Network(_) => 502,

            // 500 Internal Server Error
            Error::Archive(_) => 500,
            Error::Setup(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Archive(_) => "archive_error",
            Error::Album(e) => match e {
                AlbumError::InvalidUrl(_) => "invalid_url",
                AlbumError::NoPlayerFound => "no_player_found",
                AlbumError::Xml(_) => "invalid_album_xml",
                AlbumError::Http { .. } => "album_http_error",
                AlbumError::Request(_) => "album_request_failed",
            },
            Error::Setup(_) => "setup_error",
            Error::InvalidState { .. } => "invalid_state",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError::new(error.error_code(), error.to_string())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn album_errors_map_to_bad_request() {
        let error = Error::Album(AlbumError::NoPlayerFound);
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), "no_player_found");

        let error = Error::Album(AlbumError::InvalidUrl(String::new()));
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), "invalid_url");
    }

    #[test]
    fn sink_errors_map_to_internal_error() {
        let error = Error::Archive(ArchiveError::CreateEntry {
            entry_name: "A - T.mp3".to_string(),
            reason: "disk full".to_string(),
        });
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.error_code(), "archive_error");

        let error = Error::Setup("no temp dir".to_string());
        assert_eq!(error.status_code(), 500);
    }

    #[test]
    fn api_error_carries_code_and_message() {
        let api: ApiError = Error::Album(AlbumError::NoPlayerFound).into();
        assert_eq!(api.error.code, "no_player_found");
        assert!(api.error.message.contains("no HTML5 player"));

        let json = serde_json::to_value(&api).unwrap();
        assert_eq!(json["error"]["code"], "no_player_found");
    }

    #[test]
    fn fetch_error_messages_name_the_url() {
        let err = FetchError::Status {
            status: 500,
            url: "http://host/t.mp3".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500 fetching http://host/t.mp3");

        let err = FetchError::Truncated {
            url: "http://host/t.mp3".to_string(),
            expected: 10,
            received: 4,
        };
        assert!(err.to_string().contains("expected 10 bytes, received 4"));
    }
}
