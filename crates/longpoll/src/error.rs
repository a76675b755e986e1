//! Error types for the long-poll transport.

use thiserror::Error;

/// Errors surfaced to callers of the transport lifecycle.
#[derive(Debug, Error)]
pub enum Error {
    /// `start()` was called while the loop is already running.
    #[error("long polling already started")]
    AlreadyStarted,

    /// `start()` was called before any update handler was registered.
    #[error("no update subscriber registered")]
    NoSubscriber,

    /// `start()` was called after `stop()` while the previous loop was still
    /// finishing its last cycle.
    #[error("previous poll loop is still finishing, try again")]
    Stopping,

    /// The initial session request failed.
    #[error("failed to acquire long-poll session: {0}")]
    Acquisition(#[from] AcquireError),

    #[error("{message}")]
    Message { message: String },
}

impl vkbridge_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

vkbridge_common::impl_context!();

/// Problem while requesting a long-poll server from the VK API.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// HTTP request failed.
    #[error("HTTP request error: {0}")]
    Http(reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API returned HTTP {0}")]
    Status(u16),

    /// The API answered with an `error` envelope.
    #[error("VK API error {code}: {message}")]
    Api { code: i64, message: String },

    /// The response body was not valid JSON.
    #[error("invalid API response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A required field was absent from the response.
    #[error("API response is missing `{0}`")]
    MissingField(&'static str),

    /// The returned server address could not be turned into a URL.
    #[error("invalid long-poll server address: {0}")]
    InvalidServer(String),

    /// The configured API base URL is unusable.
    #[error("invalid API URL: {0}")]
    InvalidApiUrl(String),
}

impl From<reqwest::Error> for AcquireError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the access token.
        Self::Http(err.without_url())
    }
}

/// Problem while fetching one batch from the long-poll server.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("long-poll request returned HTTP {0}")]
    Status(u16),

    /// The request exceeded its time budget and was aborted.
    #[error("long-poll request timed out")]
    Timeout,

    /// HTTP request failed.
    #[error("HTTP request error: {0}")]
    Http(reqwest::Error),

    /// The body was not valid JSON.
    #[error("invalid long-poll response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The body was JSON but not a response the protocol defines.
    #[error("malformed long-poll response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        // The poll URL carries the session key.
        Self::Http(err.without_url())
    }
}
