use std::sync::Arc;

use http::Method;
use tracing::debug;
use url::Url;

mod builder;
pub use self::builder::ApiClientBuilder;

mod message;
pub use self::message::{
    BodyReadError, BodySource, EMPTY_BODY_FALLBACK, HttpRequest, HttpResponse, ResponseBody,
};

mod interceptor;
pub use self::interceptor::{
    AUTH_JSON_MEDIA_TYPE, DefaultHeaders, Interceptor, InterceptorChain, InterceptorFuture, Next,
    RequestLogger, Transport,
};

mod transport;
pub use self::transport::ReqwestTransport;

mod auth;
pub use self::auth::{Authentication, AuthenticationError, SecureString};

mod augmenter;
pub use self::augmenter::{AuthAugmenter, CredentialSource};

mod oauth2;
pub use self::oauth2::{
    ClientAuthMethod, OAuth2Config, OAuth2ConfigBuilder, OAuth2Error, OAuth2GrantType,
    OAuth2Token, TokenCache, TokenManager,
};

mod authorize;
pub use self::authorize::{
    AuthorizationStep, AuthorizeRequest, DEFAULT_AUTHORIZE_ENDPOINT, RepresentationType,
    extract_type,
};

mod error;
pub use self::error::{ApiClientError, TransportError};

/// HTTP client running every call through an interceptor chain.
///
/// `ApiClient` is cheap to clone and can be used from several tasks at once: clones
/// share the interceptors, the transport and the credential state. Use
/// [`ApiClientBuilder`] to create instances.
///
/// # Example
///
/// ```rust,no_run
/// use authflow_core::{ApiClient, DefaultHeaders};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::builder()
///     .with_host("idsvr.example.com")
///     .with_interceptor(DefaultHeaders::auth_json())
///     .build()?;
///
/// let request = client.get("/oauth/v2/oauth-authorize")?;
/// let mut response = client.execute(request).await?;
/// println!("{}: {}", response.status(), response.read_body_or_default().await);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: Url,
    chain: InterceptorChain,
    transport: Arc<dyn Transport>,
}

// Create
impl ApiClient {
    /// Creates a builder with the default configuration.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }
}

impl ApiClient {
    /// Runs `request` through the interceptors, then over the network.
    ///
    /// Completes once the whole chain has completed. Exactly one network call is made,
    /// unless the auth augmenter retries once after a `401`. Error statuses are returned
    /// as normal responses.
    ///
    /// # Errors
    ///
    /// - [`ApiClientError::Transport`] if the network call fails or times out
    /// - [`ApiClientError::Authentication`] if no credential can be attached
    /// - any error raised by an interceptor, unchanged
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiClientError> {
        debug!(method = %request.method(), url = %request.url(), "executing");
        self.chain.run(request, self.transport.as_ref()).await
    }

    /// Creates a request for `path`, resolved against the base URL.
    ///
    /// # Errors
    ///
    /// - [`ApiClientError::UrlError`] if `path` cannot be joined to the base URL
    /// - [`ApiClientError::ForeignOrigin`] if `path` is an absolute URL on another
    ///   origin
    pub fn request(&self, method: Method, path: &str) -> Result<HttpRequest, ApiClientError> {
        let url = resolve(&self.base_url, path)?;
        Ok(HttpRequest::new(method, url))
    }

    /// Creates a `GET` request for `path`.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::request`].
    pub fn get(&self, path: &str) -> Result<HttpRequest, ApiClientError> {
        self.request(Method::GET, path)
    }

    /// The base URL, always ending with `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Names of the interceptors, outermost first.
    pub fn interceptor_names(&self) -> Vec<&str> {
        self.chain.names()
    }
}

/// Joins `path` to `base_url`, refusing URLs on another origin.
pub(crate) fn resolve(base_url: &Url, path: &str) -> Result<Url, ApiClientError> {
    let url = base_url.join(path.trim_start_matches('/'))?;
    if url.origin() != base_url.origin() {
        return Err(ApiClientError::ForeignOrigin {
            url: url.to_string(),
            base_url: base_url.to_string(),
        });
    }
    Ok(url)
}
