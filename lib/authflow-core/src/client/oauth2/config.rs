//! Token endpoint settings.

use std::time::Duration;

use oauth2::basic::BasicClient;
use oauth2::{AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, TokenUrl};
use url::Url;

use super::error::OAuth2Error;
use super::token::OAuth2Token;
use crate::client::SecureString;

/// Client of the token endpoint only.
pub(crate) type TokenClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// How the token manager gets its tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuth2GrantType {
    /// `client_credentials` grant, renewed on demand.
    ClientCredentials,
    /// Token obtained elsewhere. Renewed only if a refresh token comes with it.
    PreAcquired,
}

/// How the client authenticates to the token endpoint (RFC 6749 section 2.3.1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClientAuthMethod {
    /// `client_id` and `client_secret` in the form body.
    #[default]
    ClientSecretPost,
    /// HTTP Basic authentication with the client id and secret.
    ClientSecretBasic,
}

/// Settings of a [`TokenManager`](super::TokenManager).
///
/// Secrets are redacted from the `Debug` output.
#[derive(Debug, Clone)]
pub struct OAuth2Config {
    pub(crate) client_id: String,
    pub(crate) client_secret: Option<SecureString>,
    pub(crate) auth_method: ClientAuthMethod,
    pub(crate) token_url: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) grant_type: OAuth2GrantType,
    pub(crate) refresh_threshold: Duration,
    pub(crate) timeout: Duration,
    pub(crate) initial_token: Option<OAuth2Token>,
}

impl OAuth2Config {
    /// Starts a configuration using the `client_credentials` grant.
    ///
    /// # Errors
    ///
    /// Fails if `token_url` is not an `http` or `https` URL.
    pub fn client_credentials(
        client_id: impl Into<String>,
        client_secret: impl Into<SecureString>,
        token_url: impl AsRef<str>,
    ) -> Result<OAuth2ConfigBuilder, OAuth2Error> {
        let mut builder = OAuth2ConfigBuilder::new(client_id, token_url)?;
        builder.config.client_secret = Some(client_secret.into());
        Ok(builder)
    }

    /// Starts a configuration around an access token obtained elsewhere.
    ///
    /// Once rejected or expired, the token can only be renewed if a refresh token was
    /// given with [`OAuth2ConfigBuilder::with_refresh_token`].
    ///
    /// # Errors
    ///
    /// Fails if `token_url` is not an `http` or `https` URL.
    pub fn pre_acquired(
        client_id: impl Into<String>,
        token_url: impl AsRef<str>,
        access_token: impl Into<String>,
    ) -> Result<OAuth2ConfigBuilder, OAuth2Error> {
        let mut builder = OAuth2ConfigBuilder::new(client_id, token_url)?;
        builder.config.grant_type = OAuth2GrantType::PreAcquired;
        builder.config.initial_token = Some(OAuth2Token::new(access_token));
        Ok(builder)
    }

    /// The client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The token endpoint.
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Scopes requested with the `client_credentials` grant.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// The configured grant.
    pub fn grant_type(&self) -> OAuth2GrantType {
        self.grant_type
    }

    /// How the client secret is sent.
    pub fn auth_method(&self) -> ClientAuthMethod {
        self.auth_method
    }

    /// How long before expiry a token is renewed.
    pub fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    /// Timeout of a token endpoint call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The token endpoint client for these settings.
    pub(crate) fn token_client(&self) -> TokenClient {
        let client = BasicClient::new(ClientId::new(self.client_id.clone()))
            .set_token_uri(TokenUrl::from_url(self.token_url.clone()))
            .set_auth_type(self.auth_type());
        match &self.client_secret {
            Some(secret) => {
                client.set_client_secret(ClientSecret::new(secret.as_str().to_string()))
            }
            None => client,
        }
    }

    fn auth_type(&self) -> AuthType {
        match self.auth_method {
            ClientAuthMethod::ClientSecretPost => AuthType::RequestBody,
            ClientAuthMethod::ClientSecretBasic => AuthType::BasicAuth,
        }
    }
}

/// Builder of [`OAuth2Config`], see [`OAuth2Config::client_credentials`] and
/// [`OAuth2Config::pre_acquired`].
#[derive(Debug, Clone)]
pub struct OAuth2ConfigBuilder {
    config: OAuth2Config,
}

impl OAuth2ConfigBuilder {
    /// Creates a builder for the `client_credentials` grant, without a secret yet.
    ///
    /// # Errors
    ///
    /// Fails if `token_url` is not an `http` or `https` URL.
    pub fn new(
        client_id: impl Into<String>,
        token_url: impl AsRef<str>,
    ) -> Result<Self, OAuth2Error> {
        let raw = token_url.as_ref();
        let invalid = |reason: String| OAuth2Error::InvalidTokenEndpoint {
            url: raw.to_string(),
            reason,
        };
        let token_url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
        if !matches!(token_url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", token_url.scheme())));
        }

        let config = OAuth2Config {
            client_id: client_id.into(),
            client_secret: None,
            auth_method: ClientAuthMethod::default(),
            token_url,
            scopes: vec![],
            grant_type: OAuth2GrantType::ClientCredentials,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            timeout: DEFAULT_TOKEN_TIMEOUT,
            initial_token: None,
        };
        Ok(Self { config })
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<SecureString>) -> Self {
        self.config.client_secret = Some(secret.into());
        self
    }

    /// Sets how the client secret is sent, in the form body by default.
    #[must_use]
    pub fn with_auth_method(mut self, method: ClientAuthMethod) -> Self {
        self.config.auth_method = method;
        self
    }

    /// Adds a scope.
    #[must_use]
    pub fn add_scope(mut self, scope: impl Into<String>) -> Self {
        self.config.scopes.push(scope.into());
        self
    }

    /// Adds scopes.
    #[must_use]
    pub fn add_scopes(mut self, scopes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.config.scopes.extend(scopes.into_iter().map(Into::into));
        self
    }

    /// Renew tokens this long before they expire. Defaults to 60 seconds.
    #[must_use]
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.config.refresh_threshold = threshold;
        self
    }

    /// Timeout of token endpoint calls. Defaults to 30 seconds.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Attaches a refresh token to the pre-acquired token. Ignored otherwise.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.config.initial_token = self
            .config
            .initial_token
            .take()
            .map(|token| token.with_refresh_token(refresh_token));
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// Fails with [`OAuth2Error::ConfigurationError`] if:
    /// - the `client_credentials` grant has no client secret
    /// - Basic client authentication has no client secret
    /// - the timeout is zero
    pub fn build(self) -> Result<OAuth2Config, OAuth2Error> {
        let config = self.config;
        let reason = if config.client_secret.is_none()
            && config.grant_type == OAuth2GrantType::ClientCredentials
        {
            Some("the client_credentials grant requires a client secret")
        } else if config.client_secret.is_none()
            && config.auth_method == ClientAuthMethod::ClientSecretBasic
        {
            Some("client_secret_basic requires a client secret")
        } else if config.timeout.is_zero() {
            Some("the token endpoint timeout must be greater than zero")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(OAuth2Error::ConfigurationError {
                reason: reason.to_string(),
            }),
            None => Ok(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const TOKEN_URL: &str = "https://idsvr.example.com/oauth/v2/oauth-token";

    fn client_credentials() -> OAuth2ConfigBuilder {
        OAuth2Config::client_credentials("haapi-client", "s3cr3t-value", TOKEN_URL)
            .expect("valid token url")
    }

    #[test]
    fn should_default_client_credentials_config() {
        let config = client_credentials().build().expect("valid config");

        assert_eq!(config.client_id(), "haapi-client");
        assert_eq!(config.token_url().as_str(), TOKEN_URL);
        assert_eq!(config.grant_type(), OAuth2GrantType::ClientCredentials);
        assert_eq!(config.auth_method(), ClientAuthMethod::ClientSecretPost);
        assert_eq!(config.refresh_threshold(), Duration::from_secs(60));
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(matches!(config.auth_type(), AuthType::RequestBody));
        assert!(config.initial_token.is_none());
    }

    #[test]
    fn should_keep_refresh_token_of_pre_acquired_token() {
        let config = OAuth2Config::pre_acquired("haapi-client", TOKEN_URL, "pre-acquired")
            .expect("valid token url")
            .with_refresh_token("refresh")
            .build()
            .expect("valid config");

        assert_eq!(config.grant_type(), OAuth2GrantType::PreAcquired);
        let token = config.initial_token.expect("token");
        assert_eq!(token.access_token(), "pre-acquired");
        assert_eq!(token.refresh_token(), Some("refresh"));
    }

    #[test]
    fn should_send_secret_as_basic_credential() {
        let config = client_credentials()
            .with_auth_method(ClientAuthMethod::ClientSecretBasic)
            .build()
            .expect("valid config");

        assert!(matches!(config.auth_type(), AuthType::BasicAuth));
        assert_eq!(config.token_client().client_id().as_str(), "haapi-client");
    }

    #[rstest]
    #[case::not_a_url("not-a-url")]
    #[case::unsupported_scheme("ftp://idsvr.example.com/token")]
    fn should_reject_invalid_token_url(#[case] url: &str) {
        let error = OAuth2ConfigBuilder::new("haapi-client", url).expect_err("invalid url");

        assert!(matches!(
            error,
            OAuth2Error::InvalidTokenEndpoint { url: ref rejected, .. } if rejected == url
        ));
    }

    #[rstest]
    #[case::missing_secret(
        OAuth2ConfigBuilder::new("haapi-client", TOKEN_URL).expect("valid token url"),
        "client secret"
    )]
    #[case::basic_without_secret(
        OAuth2Config::pre_acquired("haapi-client", TOKEN_URL, "token")
            .expect("valid token url")
            .with_auth_method(ClientAuthMethod::ClientSecretBasic),
        "client_secret_basic"
    )]
    #[case::zero_timeout(client_credentials().with_timeout(Duration::ZERO), "timeout")]
    fn should_reject_incomplete_config(#[case] builder: OAuth2ConfigBuilder, #[case] hint: &str) {
        let error = builder.build().expect_err("invalid config");

        assert!(matches!(
            error,
            OAuth2Error::ConfigurationError { ref reason } if reason.contains(hint)
        ));
    }

    #[test]
    fn should_add_scopes() {
        let config = client_credentials()
            .add_scope("openid")
            .add_scopes(["profile", "email"])
            .build()
            .expect("valid config");

        assert_eq!(config.scopes(), ["openid", "profile", "email"]);
    }

    #[test]
    fn should_redact_secrets_in_debug() {
        let config = client_credentials().build().expect("valid config");

        let debug = format!("{config:?}");

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("s3cr3t-value"));
    }
}
