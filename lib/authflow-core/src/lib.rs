//! # Authflow Core
//!
//! HTTP client for OAuth2 authorization flows, built around an interceptor chain.
//!
//! Every call made with an [`ApiClient`] goes through the interceptors registered on
//! it, in registration order, before reaching the network. An auth augmenter sits
//! right before the network call: it attaches the current credential to each request
//! and, when the server answers `401 Unauthorized`, renews the credential and retries
//! once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use authflow_core::{ApiClient, AuthorizeRequest, DefaultHeaders, RequestLogger};
//! use authflow_core::{OAuth2Config, TokenManager};
//! use http::uri::Scheme;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let oauth2 = OAuth2Config::client_credentials(
//!     "haapi-client",
//!     "secret",
//!     "https://idsvr.example.com/oauth/v2/oauth-token",
//! )?
//! .build()?;
//!
//! let client = ApiClient::builder()
//!     .with_scheme(Scheme::HTTPS)
//!     .with_host("idsvr.example.com")
//!     .with_interceptor(RequestLogger)
//!     .with_interceptor(DefaultHeaders::auth_json())
//!     .with_credential_source(TokenManager::new(oauth2)?)
//!     .build()?;
//!
//! let step = client
//!     .start_authorization(&AuthorizeRequest::new("haapi-client"))
//!     .await?;
//! println!("Response type  = {}", step.response_type);
//! # Ok(())
//! # }
//! ```
//!
//! ## Writing an interceptor
//!
//! An [`Interceptor`] gets the request and a [`Next`] handle. It can rewrite the
//! request, answer without calling `next`, or inspect the response:
//!
//! ```rust
//! use authflow_core::{ApiClientError, HttpRequest, Interceptor, InterceptorFuture, Next};
//! use http::StatusCode;
//!
//! #[derive(Debug)]
//! struct RejectServerErrors;
//!
//! impl Interceptor for RejectServerErrors {
//!     fn intercept<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> InterceptorFuture<'a> {
//!         Box::pin(async move {
//!             let response = next.run(request).await?;
//!             if response.status().is_server_error() {
//!                 return Err(ApiClientError::InvalidConfiguration {
//!                     reason: format!("server answered {}", response.status()),
//!                 });
//!             }
//!             Ok(response)
//!         })
//!     }
//! }
//! ```
//!
//! ## Errors
//!
//! - Network failures and timeouts: [`ApiClientError::Transport`]
//! - No usable credential: [`ApiClientError::Authentication`]
//! - Unexpected body shape: [`ApiClientError::MalformedResponse`]
//!
//! HTTP error statuses are not errors: they come back as a normal [`HttpResponse`].
//! A body that cannot be read is not an error either when using
//! [`HttpResponse::read_body_or_default`], which falls back to `"{}"`.

mod client;

pub use self::client::{
    AUTH_JSON_MEDIA_TYPE, ApiClient, ApiClientBuilder, ApiClientError, AuthAugmenter,
    Authentication, AuthenticationError, AuthorizationStep, AuthorizeRequest, BodyReadError,
    BodySource, ClientAuthMethod, CredentialSource, DEFAULT_AUTHORIZE_ENDPOINT, DefaultHeaders,
    EMPTY_BODY_FALLBACK, HttpRequest, HttpResponse, Interceptor, InterceptorChain,
    InterceptorFuture, Next, OAuth2Config, OAuth2ConfigBuilder, OAuth2Error, OAuth2GrantType,
    OAuth2Token, RepresentationType, RequestLogger, ReqwestTransport, ResponseBody,
    SecureString, TokenCache, TokenManager, Transport, TransportError, extract_type,
};
