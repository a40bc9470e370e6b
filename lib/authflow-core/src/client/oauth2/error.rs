//! Token endpoint errors.

use crate::client::AuthenticationError;

/// Why the [`TokenManager`](super::TokenManager) has no token to give.
///
/// Reaches [`ApiClient`](crate::ApiClient) callers as
/// [`AuthenticationError::OAuth2Error`].
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum OAuth2Error {
    /// The token endpoint is not an absolute `http` or `https` URL.
    #[display("Invalid token endpoint URL '{url}': {reason}")]
    InvalidTokenEndpoint {
        /// The URL as given.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The token endpoint answered with an error status.
    #[display("Token acquisition failed: {reason}")]
    TokenAcquisitionFailed {
        /// OAuth2 error code and description, when the body carried them.
        reason: String,
    },

    /// The pre-acquired token expired and there is no refresh token.
    #[display("OAuth2 token has expired and cannot be renewed")]
    TokenExpired,

    /// A success answer of the token endpoint that is not a usable bearer token.
    #[display("Invalid OAuth2 token response: {reason}")]
    InvalidTokenResponse {
        /// What is wrong with the body.
        reason: String,
    },

    /// The token endpoint could not be reached, or its answer not read.
    #[display("Network error during OAuth2 request: {reason}")]
    NetworkError {
        /// The underlying I/O failure.
        reason: String,
    },

    /// The settings cannot work, see [`OAuth2ConfigBuilder::build`](super::OAuth2ConfigBuilder::build).
    #[display("OAuth2 configuration error: {reason}")]
    ConfigurationError {
        /// What is missing or invalid.
        reason: String,
    },
}

impl From<OAuth2Error> for AuthenticationError {
    fn from(value: OAuth2Error) -> Self {
        Self::OAuth2Error {
            message: value.to_string(),
        }
    }
}
