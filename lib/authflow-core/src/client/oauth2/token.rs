//! Issued tokens and where they are kept.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use oauth2::TokenResponse;
use oauth2::basic::{BasicTokenResponse, BasicTokenType};
use tokio::sync::RwLock;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::OAuth2Error;
use crate::client::Authentication;

/// An access token as issued by the token endpoint.
///
/// Token values are wiped from memory on drop and never shown by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct OAuth2Token {
    access_token: String,
    #[zeroize(skip)]
    expires_at: Option<Instant>,
    refresh_token: Option<String>,
    // space separated, as granted
    #[zeroize(skip)]
    scope: Option<String>,
}

impl OAuth2Token {
    /// A token with no known expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
            refresh_token: None,
            scope: None,
        }
    }

    /// A token expiring `expires_in` from now.
    ///
    /// A lifetime too large to be represented is treated as no expiry.
    pub fn with_expiry(access_token: impl Into<String>, expires_in: Duration) -> Self {
        let mut token = Self::new(access_token);
        token.expires_at = Instant::now().checked_add(expires_in);
        token
    }

    /// Converts a successful token endpoint answer.
    ///
    /// A refresh answer may omit the refresh token: `previous_refresh_token` is then
    /// kept.
    pub(crate) fn from_response(
        response: &BasicTokenResponse,
        previous_refresh_token: Option<&str>,
    ) -> Result<Self, OAuth2Error> {
        if *response.token_type() != BasicTokenType::Bearer {
            return Err(OAuth2Error::InvalidTokenResponse {
                reason: format!("unsupported token type {:?}", response.token_type()),
            });
        }
        let access_token = response.access_token().secret();
        if access_token.is_empty() {
            return Err(OAuth2Error::InvalidTokenResponse {
                reason: "empty access token".to_string(),
            });
        }

        let mut token = match response.expires_in() {
            Some(expires_in) => Self::with_expiry(access_token.as_str(), expires_in),
            None => Self::new(access_token.as_str()),
        };
        token.refresh_token = response
            .refresh_token()
            .map(|refresh_token| refresh_token.secret().clone())
            .or_else(|| previous_refresh_token.map(str::to_string));
        token.scope = response.scopes().map(|scopes| {
            scopes
                .iter()
                .map(|scope| scope.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        });
        Ok(token)
    }

    /// Attaches the refresh token that can renew this token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// The token value.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The refresh token, if the server issued one.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Scopes granted by the server, space separated.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// A token without expiry never expires.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }

    /// Returns `true` if the token expires within `threshold`.
    pub fn should_refresh(&self, threshold: Duration) -> bool {
        match self.expires_at {
            None => false,
            Some(_) => self
                .time_until_expiry()
                .is_none_or(|remaining| remaining <= threshold),
        }
    }

    /// Remaining lifetime, `None` if unknown or already expired.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at
            .and_then(|expires_at| expires_at.checked_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }

    /// The bearer credential carrying this token.
    pub fn to_authentication(&self) -> Authentication {
        Authentication::Bearer(self.access_token.as_str().into())
    }
}

impl fmt::Debug for OAuth2Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("OAuth2Token")
            .field("access_token", &"[REDACTED]")
            .field("expires_in", &self.time_until_expiry())
            .field("refresh_token", &redacted(&self.refresh_token))
            .field("scope", &self.scope)
            .finish()
    }
}

/// The current token, shared between tasks.
///
/// Clones see the same token.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<OAuth2Token>>>,
}

impl TokenCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding `token`.
    pub fn with_token(token: OAuth2Token) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(token))),
        }
    }

    /// The cached token, unless expired.
    pub async fn get(&self) -> Option<OAuth2Token> {
        let guard = self.inner.read().await;
        guard.as_ref().filter(|t| !t.is_expired()).cloned()
    }

    /// The cached token, expired or not. Its refresh token may still be usable.
    pub async fn current(&self) -> Option<OAuth2Token> {
        self.inner.read().await.clone()
    }

    /// Returns `true` if the cache is empty or its token expires within `threshold`.
    pub async fn should_refresh(&self, threshold: Duration) -> bool {
        let guard = self.inner.read().await;
        match guard.as_ref() {
            None => true,
            Some(token) => token.should_refresh(threshold),
        }
    }

    /// Replaces the cached token.
    pub async fn set(&self, token: OAuth2Token) {
        let mut guard = self.inner.write().await;
        *guard = Some(token);
    }

    /// Forgets the cached token.
    pub async fn clear(&self) {
        let mut guard = self.inner.write().await;
        *guard = None;
    }
}
