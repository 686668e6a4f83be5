//! Error types for the ResellerInterface API client.
//!
//! Only configuration and transport problems are errors. A decoded response
//! with `state >= 2000` is returned as a normal
//! [`ApiResponse`](crate::ApiResponse) whose
//! [`is_error`](crate::ApiResponse::is_error) is `true`.

use thiserror::Error;

/// Errors that can occur when configuring the client or issuing a request.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Version is not `stable`, `latest` or a positive integer.
    #[error("invalid API version: {0:?}")]
    InvalidVersion(String),

    /// Action does not consist of at least two non-empty segments,
    /// e.g. `reseller/login`.
    #[error("invalid request action: {0:?}")]
    InvalidAction(String),

    /// Unrecognized response mode name.
    #[error("invalid response mode: {0:?}")]
    InvalidMode(String),

    /// Unrecognized ip-resolve option (expected `ipv4`, `ipv6` or `any`).
    #[error("invalid ip resolve option: {0:?}")]
    InvalidIpResolve(String),

    /// Custom user agent cannot be sent as a header value.
    #[error("invalid user agent: {0:?}")]
    InvalidUserAgent(String),

    /// The underlying HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    /// The round-trip to the API failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Cause of a failed round-trip, carried by [`ApiError::Fetch`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, timeout, TLS failure, body stream error, etc.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-2xx status and no usable body.
    #[error("HTTP status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The session token cannot be sent as a cookie header value.
    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

/// Convenience alias for `Result<T, ApiError>`.
pub type Result<T> = std::result::Result<T, ApiError>;
