use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::HeaderValue;
use http::header::{AUTHORIZATION, HeaderName};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Errors raised by an auth augmenter while producing a credential.
///
/// They travel through the interceptor chain unchanged and reach the caller as
/// [`ApiClientError::Authentication`](super::ApiClientError::Authentication).
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum AuthenticationError {
    /// The credential cannot be written as an `Authorization` header value.
    #[display("{scheme} credential is not a valid header value: {message}")]
    InvalidCredential {
        /// Authorization scheme of the credential (`Bearer`, `Basic`).
        scheme: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// No credential is available and none can be obtained.
    #[display("No credential available: {reason}")]
    CredentialUnavailable {
        /// Why no credential could be produced.
        reason: String,
    },

    /// The token manager failed to acquire or refresh a token.
    #[display("OAuth2 error: {message}")]
    OAuth2Error {
        /// Description of the OAuth2 error.
        message: String,
    },
}

/// A string holding a secret, wiped from memory on drop.
///
/// `Debug` never shows the value, `Display` only shows its ends.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    /// Wraps `value`.
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// The secret. Avoid keeping the reference around.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the secret is `other`.
    pub fn equals_str(&self, other: &str) -> bool {
        self.0 == other
    }

    fn masked(&self) -> String {
        let count = self.0.chars().count();
        if count <= 8 {
            return "***".to_string();
        }
        let head = self.0.chars().take(4).collect::<String>();
        let tail = self.0.chars().skip(count - 4).collect::<String>();
        format!("{head}...{tail}")
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString([REDACTED])")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// A credential written to the `Authorization` header of outgoing requests.
///
/// An `Authentication` value is also the simplest
/// [`CredentialSource`](super::CredentialSource): a fixed credential that is never
/// refreshed.
///
/// ```rust
/// use authflow_core::Authentication;
///
/// let access_token = Authentication::Bearer("eyJhbGciOi...".into());
///
/// let client_auth = Authentication::Basic {
///     username: "haapi-public-client".to_string(),
///     password: "secret".into(),
/// };
/// ```
#[derive(Clone, PartialEq, Eq)]
pub enum Authentication {
    /// `Authorization: Bearer <token>` (RFC 6750).
    Bearer(SecureString),

    /// `Authorization: Basic <base64(username:password)>` (RFC 7617).
    Basic {
        /// User or client identifier, must not contain `:`.
        username: String,
        /// Password or client secret.
        password: SecureString,
    },
}

impl Authentication {
    /// The authorization scheme name.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "Bearer",
            Self::Basic { .. } => "Basic",
        }
    }

    /// Builds the `Authorization` header carrying this credential.
    ///
    /// The header value is marked sensitive.
    ///
    /// # Errors
    ///
    /// Fails if the credential contains characters not allowed in a header value, or if
    /// a Basic username contains `:`.
    pub fn to_header(&self) -> Result<(HeaderName, HeaderValue), AuthenticationError> {
        let scheme = self.scheme();
        let credential = match self {
            Self::Bearer(token) => token.as_str().to_string(),
            Self::Basic { username, password } => {
                if username.contains(':') {
                    return Err(AuthenticationError::InvalidCredential {
                        scheme,
                        message: "username cannot contain ':'".to_string(),
                    });
                }
                STANDARD.encode(format!("{username}:{}", password.as_str()))
            }
        };

        let mut value = HeaderValue::from_str(&format!("{scheme} {credential}")).map_err(|e| {
            AuthenticationError::InvalidCredential {
                scheme,
                message: e.to_string(),
            }
        })?;
        value.set_sensitive(true);
        Ok((AUTHORIZATION, value))
    }

    /// Returns `true` if this is a bearer token equal to `token`.
    pub fn is_bearer(&self, token: &str) -> bool {
        matches!(self, Self::Bearer(value) if value.equals_str(token))
    }
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(token) => f.debug_tuple("Bearer").field(token).finish(),
            Self::Basic { username, password } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", password)
                .finish(),
        }
    }
}

impl fmt::Display for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(token) => write!(f, "Bearer {token}"),
            Self::Basic { username, .. } => write!(f, "Basic {username}"),
        }
    }
}
