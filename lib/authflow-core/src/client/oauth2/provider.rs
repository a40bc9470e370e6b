//! Token acquisition and renewal.

use std::sync::Arc;

use futures::future::BoxFuture;
use oauth2::basic::BasicErrorResponse;
use oauth2::{RefreshToken, RequestTokenError, Scope};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::config::{OAuth2Config, OAuth2GrantType, TokenClient};
use super::error::OAuth2Error;
use super::token::{OAuth2Token, TokenCache};
use crate::client::{Authentication, AuthenticationError, CredentialSource};

/// Obtains, caches and renews OAuth2 access tokens.
///
/// Token endpoint calls go through an [`oauth2`] client with its own HTTP client,
/// outside of any interceptor chain. Acquisition and renewal are serialized:
/// concurrent callers wait for the first one and reuse the token it obtained.
///
/// Cloning shares the cache.
///
/// # Example
///
/// ```rust,no_run
/// use authflow_core::{ApiClient, OAuth2Config, TokenManager};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = OAuth2Config::client_credentials(
///     "haapi-client",
///     "secret",
///     "https://idsvr.example.com/oauth/v2/oauth-token",
/// )?
/// .add_scope("openid")
/// .build()?;
///
/// let client = ApiClient::builder()
///     .with_host("idsvr.example.com")
///     .with_credential_source(TokenManager::new(config)?)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenManager {
    inner: Arc<TokenManagerInner>,
}

#[derive(Debug)]
struct TokenManagerInner {
    config: OAuth2Config,
    oauth: TokenClient,
    http: oauth2::reqwest::Client,
    cache: TokenCache,
    renewal: Mutex<()>,
}

impl TokenManager {
    /// Creates a manager with its own HTTP client.
    ///
    /// The client uses the configured timeout and does not follow redirects.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be created.
    pub fn new(config: OAuth2Config) -> Result<Self, OAuth2Error> {
        let http = oauth2::reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(oauth2::reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OAuth2Error::ConfigurationError {
                reason: format!("cannot create token endpoint client: {e}"),
            })?;
        Ok(Self::with_http_client(config, http))
    }

    /// Creates a manager using `http` for token endpoint calls.
    ///
    /// Redirects followed by `http` would forward the client credentials, so it should
    /// not follow them.
    pub fn with_http_client(mut config: OAuth2Config, http: oauth2::reqwest::Client) -> Self {
        let oauth = config.token_client();
        let cache = match config.initial_token.take() {
            Some(token) => TokenCache::with_token(token),
            None => TokenCache::new(),
        };
        Self {
            inner: Arc::new(TokenManagerInner {
                config,
                oauth,
                http,
                cache,
                renewal: Mutex::new(()),
            }),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &OAuth2Config {
        &self.inner.config
    }

    /// The cached token, if any and not expired.
    pub async fn cached_token(&self) -> Option<OAuth2Token> {
        self.inner.cache.get().await
    }

    /// Returns a valid access token, acquiring a new one if needed.
    ///
    /// A cached token is reused until it gets within the refresh threshold of its
    /// expiry.
    ///
    /// # Errors
    ///
    /// Fails if no token is cached and none can be obtained.
    #[instrument(skip(self), fields(client_id = %self.inner.config.client_id))]
    pub async fn access_token(&self) -> Result<OAuth2Token, OAuth2Error> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _guard = self.inner.renewal.lock().await;
        // another caller may have renewed while we were waiting
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }
        self.renew().await
    }

    /// Renews the token after the server rejected `rejected`.
    ///
    /// Returns the cached token without calling the token endpoint when it already
    /// differs from the rejected one. Returns `None` when the token cannot be renewed.
    ///
    /// # Errors
    ///
    /// Fails if the token endpoint call fails.
    #[instrument(skip_all, fields(client_id = %self.inner.config.client_id))]
    pub async fn renew_rejected(&self, rejected: &str) -> Result<Option<OAuth2Token>, OAuth2Error> {
        let _guard = self.inner.renewal.lock().await;

        if let Some(token) = self.inner.cache.get().await
            && token.access_token() != rejected
        {
            debug!("token already renewed");
            return Ok(Some(token));
        }
        if !self.can_renew().await {
            debug!("token cannot be renewed");
            return Ok(None);
        }
        self.renew().await.map(Some)
    }

    async fn fresh_token(&self) -> Option<OAuth2Token> {
        let cache = &self.inner.cache;
        if cache.should_refresh(self.inner.config.refresh_threshold).await {
            return None;
        }
        cache.get().await
    }

    async fn can_renew(&self) -> bool {
        match self.inner.config.grant_type {
            OAuth2GrantType::ClientCredentials => true,
            OAuth2GrantType::PreAcquired => self
                .inner
                .cache
                .current()
                .await
                .is_some_and(|token| token.refresh_token().is_some()),
        }
    }

    /// Obtains a new token and caches it. Callers hold the renewal lock.
    async fn renew(&self) -> Result<OAuth2Token, OAuth2Error> {
        let current = self.inner.cache.current().await;
        let grant_type = self.inner.config.grant_type;

        let token = match (current.as_ref().and_then(OAuth2Token::refresh_token), grant_type) {
            (Some(refresh_token), _) => match self.refresh_token_grant(refresh_token).await {
                Ok(token) => token,
                Err(error) if grant_type == OAuth2GrantType::ClientCredentials => {
                    warn!(%error, "refresh token rejected, requesting a new token");
                    self.client_credentials_grant().await?
                }
                Err(error) => return Err(error),
            },
            (None, OAuth2GrantType::ClientCredentials) => self.client_credentials_grant().await?,
            (None, OAuth2GrantType::PreAcquired) => {
                return current
                    .as_ref()
                    .filter(|token| !token.is_expired())
                    .cloned()
                    .ok_or(OAuth2Error::TokenExpired);
            }
        };

        self.inner.cache.set(token.clone()).await;
        Ok(token)
    }

    #[instrument(skip(self), fields(token_url = %self.inner.config.token_url))]
    async fn client_credentials_grant(&self) -> Result<OAuth2Token, OAuth2Error> {
        let scopes = self.inner.config.scopes.iter().cloned().map(Scope::new);
        let response = self
            .inner
            .oauth
            .exchange_client_credentials()
            .add_scopes(scopes)
            .request_async(&self.inner.http)
            .await
            .map_err(token_error)?;

        let token = OAuth2Token::from_response(&response, None)?;
        debug!(expires_in = ?token.time_until_expiry(), "token acquired");
        Ok(token)
    }

    #[instrument(skip_all, fields(token_url = %self.inner.config.token_url))]
    async fn refresh_token_grant(&self, refresh_token: &str) -> Result<OAuth2Token, OAuth2Error> {
        let refresh = RefreshToken::new(refresh_token.to_string());
        let response = self
            .inner
            .oauth
            .exchange_refresh_token(&refresh)
            .request_async(&self.inner.http)
            .await
            .map_err(token_error)?;

        let token = OAuth2Token::from_response(&response, Some(refresh_token))?;
        debug!(expires_in = ?token.time_until_expiry(), "token refreshed");
        Ok(token)
    }
}

fn token_error<RE>(error: RequestTokenError<RE, BasicErrorResponse>) -> OAuth2Error
where
    RE: std::error::Error + 'static,
{
    match error {
        RequestTokenError::ServerResponse(response) => {
            let reason = match response.error_description() {
                Some(description) => format!("{}: {description}", response.error()),
                None => response.error().to_string(),
            };
            warn!(%reason, "token endpoint refused the request");
            OAuth2Error::TokenAcquisitionFailed { reason }
        }
        RequestTokenError::Request(error) => OAuth2Error::NetworkError {
            reason: error.to_string(),
        },
        RequestTokenError::Parse(error, _) => OAuth2Error::InvalidTokenResponse {
            reason: error.to_string(),
        },
        RequestTokenError::Other(reason) => OAuth2Error::TokenAcquisitionFailed { reason },
    }
}

impl CredentialSource for TokenManager {
    fn credential(&self) -> BoxFuture<'_, Result<Authentication, AuthenticationError>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            Ok(token.to_authentication())
        })
    }

    fn refresh<'a>(
        &'a self,
        rejected: &'a Authentication,
    ) -> BoxFuture<'a, Result<Option<Authentication>, AuthenticationError>> {
        Box::pin(async move {
            let Authentication::Bearer(rejected) = rejected else {
                return Ok(None);
            };
            let token = self.renew_rejected(rejected.as_str()).await?;
            Ok(token.map(|token| token.to_authentication()))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use oauth2::StandardErrorResponse;
    use oauth2::basic::BasicErrorResponseType;

    use super::*;

    const TOKEN_URL: &str = "http://127.0.0.1:9/oauth/v2/oauth-token";

    fn pre_acquired(token: &str) -> TokenManager {
        let config = OAuth2Config::pre_acquired("client-id", TOKEN_URL, token)
            .expect("Should create builder")
            .build()
            .expect("Should build config");
        TokenManager::new(config).expect("Should create manager")
    }

    #[tokio::test]
    async fn should_return_pre_acquired_token() {
        let manager = pre_acquired("pre-acquired-access-token");

        let token = manager.access_token().await.expect("Should get token");

        assert_eq!(token.access_token(), "pre-acquired-access-token");
    }

    #[tokio::test]
    async fn should_not_renew_pre_acquired_token_without_refresh_token() {
        let manager = pre_acquired("token");

        let renewed = manager.renew_rejected("token").await.expect("no failure");

        assert!(renewed.is_none());
    }

    #[tokio::test]
    async fn should_reuse_token_renewed_by_another_caller() {
        let manager = pre_acquired("new-token");

        let renewed = manager
            .renew_rejected("old-token")
            .await
            .expect("no failure")
            .expect("cached token");

        assert_eq!(renewed.access_token(), "new-token");
    }

    #[tokio::test]
    async fn should_fail_when_pre_acquired_token_expired() {
        let manager = pre_acquired("token");
        manager
            .inner
            .cache
            .set(OAuth2Token::with_expiry("token", Duration::ZERO))
            .await;

        let error = manager.access_token().await.expect_err("Should fail");

        assert_eq!(error, OAuth2Error::TokenExpired);
    }

    #[tokio::test]
    async fn should_expose_token_as_bearer_credential() {
        let manager = pre_acquired("abc");

        let credential = manager.credential().await.expect("credential");

        assert!(credential.is_bearer("abc"));
    }

    #[tokio::test]
    async fn should_not_refresh_non_bearer_credential() {
        let manager = pre_acquired("abc");
        let rejected = Authentication::Basic {
            username: "client-id".to_string(),
            password: "secret".into(),
        };

        let refreshed = manager.refresh(&rejected).await.expect("no failure");

        assert!(refreshed.is_none());
    }

    #[tokio::test]
    async fn should_report_network_error_when_endpoint_unreachable() {
        let config = OAuth2Config::client_credentials("client-id", "secret", TOKEN_URL)
            .expect("Should create builder")
            .with_timeout(Duration::from_secs(2))
            .build()
            .expect("Should build config");
        let manager = TokenManager::new(config).expect("Should create manager");

        let error = manager.access_token().await.expect_err("Should fail");

        assert!(matches!(error, OAuth2Error::NetworkError { .. }));
    }

    #[test]
    fn should_describe_refused_token_request() {
        let refused = StandardErrorResponse::new(
            BasicErrorResponseType::InvalidClient,
            Some("unknown client".to_string()),
            None,
        );

        let error = token_error::<std::io::Error>(RequestTokenError::ServerResponse(refused));

        assert_eq!(
            error,
            OAuth2Error::TokenAcquisitionFailed {
                reason: "invalid_client: unknown client".to_string(),
            }
        );
    }

    #[test]
    fn should_keep_reason_of_other_token_failures() {
        let error = token_error::<std::io::Error>(RequestTokenError::Other(
            "unexpected response content type".to_string(),
        ));

        assert!(matches!(
            error,
            OAuth2Error::TokenAcquisitionFailed { reason } if reason.contains("content type")
        ));
    }
}
