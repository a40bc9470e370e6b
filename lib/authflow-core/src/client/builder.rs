use std::fmt::Debug;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use http::uri::{PathAndQuery, Scheme};
use url::Url;

use super::augmenter::{AuthAugmenter, CredentialSource};
use super::interceptor::{Interceptor, InterceptorChain, Transport};
use super::transport::ReqwestTransport;
use super::{ApiClient, ApiClientError, Authentication};

/// Builder for [`ApiClient`] instances.
///
/// Defaults to `http://127.0.0.1/`, without timeouts, interceptors or auth augmenter.
///
/// # Interceptor order
///
/// Interceptors run in the order they are added, the first one being the outermost.
/// The auth augmenter, if any, always runs last, right before the network call: every
/// request sent carries the credential, whatever the other interceptors do.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
///
/// use authflow_core::{ApiClient, Authentication, DefaultHeaders, RequestLogger};
/// use http::uri::Scheme;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::builder()
///     .with_scheme(Scheme::HTTPS)
///     .with_host("idsvr.example.com")
///     .with_port(8443)
///     .with_base_path("/dev")?
///     .with_timeout(Duration::from_secs(10))
///     .with_interceptor(RequestLogger)
///     .with_interceptor(DefaultHeaders::auth_json())
///     .with_authentication(Authentication::Bearer("access-token".into()))
///     .build()?;
///
/// assert_eq!(client.base_url().as_str(), "https://idsvr.example.com:8443/dev/");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClientBuilder {
    client: Option<reqwest::Client>,
    transport: Option<Arc<dyn Transport>>,
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    base_path: Option<PathAndQuery>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    interceptors: InterceptorChain,
    augmenter: Option<AuthAugmenter>,
}

impl ApiClientBuilder {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Fails with [`ApiClientError::InvalidConfiguration`] if:
    /// - the host is empty
    /// - a timeout is zero
    /// - timeouts are set together with a custom `reqwest::Client` or [`Transport`]
    /// - the underlying `reqwest::Client` cannot be created
    ///
    /// Fails with [`ApiClientError::UrlError`] if the host and port do not form a URL.
    pub fn build(self) -> Result<ApiClient, ApiClientError> {
        let Self {
            client,
            transport,
            scheme,
            host,
            port,
            base_path,
            timeout,
            connect_timeout,
            interceptors,
            augmenter,
        } = self;

        let base_url = Self::base_url(&scheme, &host, port, base_path.as_ref())?;

        let has_timeouts = timeout.is_some() || connect_timeout.is_some();
        if [timeout, connect_timeout].into_iter().flatten().any(|it| it.is_zero()) {
            return Err(ApiClientError::InvalidConfiguration {
                reason: "timeouts must be greater than zero".to_string(),
            });
        }
        if has_timeouts && (client.is_some() || transport.is_some()) {
            return Err(ApiClientError::InvalidConfiguration {
                reason: "timeouts cannot be applied to a custom client or transport".to_string(),
            });
        }

        let transport = match (transport, client) {
            (Some(transport), _) => transport,
            (None, Some(client)) => Arc::new(ReqwestTransport::new(client)),
            (None, None) => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = timeout {
                    builder = builder.timeout(timeout);
                }
                if let Some(connect_timeout) = connect_timeout {
                    builder = builder.connect_timeout(connect_timeout);
                }
                let client = builder
                    .build()
                    .map_err(|err| ApiClientError::InvalidConfiguration {
                        reason: format!("cannot create HTTP client: {err}"),
                    })?;
                Arc::new(ReqwestTransport::new(client))
            }
        };

        let mut chain = interceptors;
        if let Some(augmenter) = augmenter {
            chain.push(Arc::new(augmenter));
        }

        Ok(ApiClient {
            base_url,
            chain,
            transport,
        })
    }

    fn base_url(
        scheme: &Scheme,
        host: &str,
        port: Option<u16>,
        base_path: Option<&PathAndQuery>,
    ) -> Result<Url, ApiClientError> {
        if host.is_empty() {
            return Err(ApiClientError::InvalidConfiguration {
                reason: "host cannot be empty".to_string(),
            });
        }
        let port = port.map(|port| format!(":{port}")).unwrap_or_default();
        let path = base_path.map(PathAndQuery::path).unwrap_or("/");
        let separator = if path.ends_with('/') { "" } else { "/" };

        let url = Url::parse(&format!("{scheme}://{host}{port}{path}{separator}"))?;
        Ok(url)
    }

    /// Sets the scheme, `http` by default.
    #[must_use]
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Sets the host name or IP address, `127.0.0.1` by default.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the port, the scheme's default port otherwise.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the base path every request path is resolved against.
    ///
    /// # Errors
    ///
    /// Fails with [`ApiClientError::InvalidBasePath`] if `base_path` is not a URI path.
    pub fn with_base_path<P>(self, base_path: P) -> Result<Self, ApiClientError>
    where
        P: TryInto<PathAndQuery>,
        P::Error: Debug + 'static,
    {
        let base_path = base_path
            .try_into()
            .map_err(|err| ApiClientError::InvalidBasePath {
                error: format!("{err:?}"),
            })?;
        Ok(Self {
            base_path: Some(base_path),
            ..self
        })
    }

    /// Sets the total timeout of a call, body included.
    ///
    /// An expired timeout fails the call with [`ApiClientError::Transport`].
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout of the connection phase.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Uses a preconfigured `reqwest::Client` for the network calls.
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Replaces the network stage.
    ///
    /// Takes precedence over [`with_client`](Self::with_client).
    #[must_use]
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Appends an interceptor.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Appends an interceptor shared with other clients.
    #[must_use]
    pub fn with_shared_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Sets the auth augmenter, replacing any previous one.
    #[must_use]
    pub fn with_auth_augmenter(mut self, augmenter: AuthAugmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    /// Attaches a fixed credential to every request.
    ///
    /// # Example
    ///
    /// ```rust
    /// use authflow_core::{ApiClient, Authentication};
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = ApiClient::builder()
    ///     .with_authentication(Authentication::Bearer("opaque-token".into()))
    ///     .build()?;
    ///
    /// assert_eq!(client.interceptor_names(), vec!["AuthAugmenter"]);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn with_authentication(self, authentication: Authentication) -> Self {
        self.with_auth_augmenter(AuthAugmenter::new(authentication))
    }

    /// Attaches the credential of `source` to every request, renewing it on `401`.
    #[must_use]
    pub fn with_credential_source(self, source: impl CredentialSource + 'static) -> Self {
        self.with_auth_augmenter(AuthAugmenter::new(source))
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            transport: None,
            scheme: Scheme::HTTP,
            host: Ipv4Addr::LOCALHOST.to_string(),
            port: None,
            base_path: None,
            timeout: None,
            connect_timeout: None,
            interceptors: InterceptorChain::new(),
            augmenter: None,
        }
    }
}
