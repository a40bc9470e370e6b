use std::fmt::Debug;

use super::auth::AuthenticationError;

/// Errors that can occur when using the [`ApiClient`](super::ApiClient).
///
/// HTTP error statuses (4xx, 5xx) are never reported here: they come back as a normal
/// [`HttpResponse`](super::HttpResponse) for the caller to interpret.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum ApiClientError {
    /// The network call failed (connection refused, timeout, broken stream, ...).
    Transport(TransportError),

    /// The auth augmenter could not produce a usable credential.
    ///
    /// Raised from inside the interceptor chain and propagated unchanged.
    Authentication(AuthenticationError),

    /// URL parsing error when constructing request URLs.
    UrlError(url::ParseError),

    /// Invalid HTTP header name.
    InvalidHeaderName(http::header::InvalidHeaderName),

    /// Invalid HTTP header value.
    InvalidHeaderValue(http::header::InvalidHeaderValue),

    /// JSON serialization error for request bodies.
    JsonValueError(serde_json::Error),

    /// Query parameter serialization error.
    QuerySerializationError(serde_urlencoded::ser::Error),

    /// The response body is not what the caller expected.
    ///
    /// Occurs when the body is not valid JSON or lacks a required field.
    #[display("Malformed response: {reason}\n{body}")]
    #[from(skip)]
    MalformedResponse {
        /// Why the body was rejected.
        reason: String,
        /// The body that was rejected.
        body: String,
    },

    /// Invalid base path configuration.
    #[display("Invalid base path: {error}")]
    #[from(skip)]
    InvalidBasePath {
        /// Description of why the base path is invalid.
        error: String,
    },

    /// A request URL points outside of the client base URL origin.
    ///
    /// Requests are only built for the configured server, which receives the
    /// credential.
    #[display("Request URL {url} is not on the origin of {base_url}")]
    #[from(skip)]
    ForeignOrigin {
        /// The rejected URL.
        url: String,
        /// The client base URL.
        base_url: String,
    },

    /// The client configuration cannot be turned into a working client.
    #[display("Invalid client configuration: {reason}")]
    #[from(skip)]
    InvalidConfiguration {
        /// Description of the configuration issue.
        reason: String,
    },
}

impl From<reqwest::Error> for ApiClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(TransportError::Reqwest(value))
    }
}

impl ApiClientError {
    /// Returns `true` if this error comes from the network layer.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A failure at or below the network I/O boundary.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum TransportError {
    /// Error reported by the reqwest client.
    #[display("HTTP transport error: {_0}")]
    Reqwest(reqwest::Error),

    /// Raw I/O error, used by custom transports.
    #[display("I/O error: {_0}")]
    Io(std::io::Error),
}

impl TransportError {
    /// Returns `true` if the call was aborted by a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Reqwest(error) => error.is_timeout(),
            Self::Io(error) => error.kind() == std::io::ErrorKind::TimedOut,
        }
    }

    /// Returns `true` if no connection could be established.
    pub fn is_connect(&self) -> bool {
        match self {
            Self::Reqwest(error) => error.is_connect(),
            Self::Io(error) => matches!(
                error.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
        }
    }
}

impl From<std::io::Error> for ApiClientError {
    fn from(value: std::io::Error) -> Self {
        Self::Transport(TransportError::Io(value))
    }
}
