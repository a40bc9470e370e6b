//! Attaches credentials to outgoing requests.
//!
//! The [`AuthAugmenter`] asks its [`CredentialSource`] for the current credential and
//! sets the matching header on every request. When the server answers `401
//! Unauthorized` and the source can refresh, the request is replayed once with the
//! new credential. The second response is returned as is, whatever its status.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use http::StatusCode;
use tracing::{debug, warn};

use super::auth::{Authentication, AuthenticationError};
use super::interceptor::{Interceptor, InterceptorFuture, Next};
use super::{ApiClientError, HttpRequest, HttpResponse};

/// Provides the credential attached by the [`AuthAugmenter`].
///
/// Implementations own the credential state and serialize their own updates.
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Returns the credential to attach to the next request.
    fn credential(&self) -> BoxFuture<'_, Result<Authentication, AuthenticationError>>;

    /// Returns a replacement for a credential rejected by the server.
    ///
    /// `Ok(None)` means the source cannot refresh; the rejection is then returned to
    /// the caller. The default implementation never refreshes.
    fn refresh<'a>(
        &'a self,
        rejected: &'a Authentication,
    ) -> BoxFuture<'a, Result<Option<Authentication>, AuthenticationError>> {
        let _ = rejected;
        Box::pin(async { Ok(None) })
    }
}

/// A fixed credential, without refresh capability.
impl CredentialSource for Authentication {
    fn credential(&self) -> BoxFuture<'_, Result<Authentication, AuthenticationError>> {
        let credential = self.clone();
        Box::pin(async move { Ok(credential) })
    }
}

impl<T> CredentialSource for Arc<T>
where
    T: CredentialSource + ?Sized,
{
    fn credential(&self) -> BoxFuture<'_, Result<Authentication, AuthenticationError>> {
        self.as_ref().credential()
    }

    fn refresh<'a>(
        &'a self,
        rejected: &'a Authentication,
    ) -> BoxFuture<'a, Result<Option<Authentication>, AuthenticationError>> {
        self.as_ref().refresh(rejected)
    }
}

/// Interceptor attaching a credential to every request.
///
/// Cloning shares the same credential source.
#[derive(Debug, Clone)]
pub struct AuthAugmenter {
    source: Arc<dyn CredentialSource>,
    retry_on_unauthorized: bool,
}

impl AuthAugmenter {
    /// Creates an augmenter over `source`, retrying once on `401`.
    pub fn new(source: impl CredentialSource + 'static) -> Self {
        Self::from_shared(Arc::new(source))
    }

    /// Creates an augmenter over an already shared source.
    pub fn from_shared(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            retry_on_unauthorized: true,
        }
    }

    /// Enables or disables the single retry on `401 Unauthorized`.
    #[must_use]
    pub fn with_retry_on_unauthorized(mut self, retry: bool) -> Self {
        self.retry_on_unauthorized = retry;
        self
    }

    /// Returns `true` if a `401` triggers a refresh and a retry.
    pub fn retry_on_unauthorized(&self) -> bool {
        self.retry_on_unauthorized
    }

    /// The shared credential source.
    pub fn source(&self) -> &Arc<dyn CredentialSource> {
        &self.source
    }

    fn authorize(
        request: HttpRequest,
        credential: &Authentication,
    ) -> Result<HttpRequest, ApiClientError> {
        let (name, value) = credential.to_header()?;
        Ok(request.with_header(name, value))
    }

    async fn handle(
        &self,
        request: HttpRequest,
        next: Next<'_>,
    ) -> Result<HttpResponse, ApiClientError> {
        let credential = self.source.credential().await?;

        if !self.retry_on_unauthorized {
            return next.run(Self::authorize(request, &credential)?).await;
        }

        let response = next.run(Self::authorize(request.clone(), &credential)?).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(refreshed) = self.source.refresh(&credential).await? else {
            debug!(url = %request.url(), "credential rejected, no refresh available");
            return Ok(response);
        };

        warn!(url = %request.url(), "credential rejected, retrying once with a refreshed one");
        drop(response);
        next.run(Self::authorize(request, &refreshed)?).await
    }
}

impl Interceptor for AuthAugmenter {
    fn intercept<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> InterceptorFuture<'a> {
        Box::pin(self.handle(request, next))
    }

    fn name(&self) -> &str {
        "AuthAugmenter"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::header::AUTHORIZATION;
    use url::Url;

    use super::*;
    use crate::client::interceptor::{InterceptorChain, Transport};
    use crate::client::TransportError;

    /// Answers with the queued statuses and records the authorization headers it saw.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        statuses: Mutex<VecDeque<StatusCode>>,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedTransport {
        fn answering(statuses: impl IntoIterator<Item = StatusCode>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into_iter().collect()),
                seen: Mutex::default(),
            }
        }

        fn seen(&self) -> Vec<Option<String>> {
            self.seen.lock().map(|it| it.clone()).unwrap_or_default()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: HttpRequest) -> InterceptorFuture<'_> {
            Box::pin(async move {
                let header = request
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                self.seen.lock().expect("lock").push(header);

                let status = self
                    .statuses
                    .lock()
                    .expect("lock")
                    .pop_front()
                    .unwrap_or(StatusCode::OK);
                Ok(HttpResponse::new(status).with_body(status.as_str().to_string()))
            })
        }
    }

    #[derive(Debug)]
    struct BrokenTransport;

    impl Transport for BrokenTransport {
        fn send(&self, _request: HttpRequest) -> InterceptorFuture<'_> {
            Box::pin(async {
                Err(ApiClientError::Transport(TransportError::Io(
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                )))
            })
        }
    }

    /// Hands out `token-<n>`, bumping `n` on every refresh.
    #[derive(Debug, Default)]
    struct RotatingSource {
        generation: AtomicUsize,
        refreshes: AtomicUsize,
    }

    impl RotatingSource {
        fn current(&self) -> Authentication {
            let generation = self.generation.load(Ordering::SeqCst);
            Authentication::Bearer(format!("token-{generation}").into())
        }
    }

    impl CredentialSource for RotatingSource {
        fn credential(&self) -> BoxFuture<'_, Result<Authentication, AuthenticationError>> {
            Box::pin(async move { Ok(self.current()) })
        }

        fn refresh<'a>(
            &'a self,
            _rejected: &'a Authentication,
        ) -> BoxFuture<'a, Result<Option<Authentication>, AuthenticationError>> {
            Box::pin(async move {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                self.generation.fetch_add(1, Ordering::SeqCst);
                Ok(Some(self.current()))
            })
        }
    }

    #[derive(Debug)]
    struct UnavailableSource;

    impl CredentialSource for UnavailableSource {
        fn credential(&self) -> BoxFuture<'_, Result<Authentication, AuthenticationError>> {
            Box::pin(async {
                Err(AuthenticationError::CredentialUnavailable {
                    reason: "token endpoint down".to_string(),
                })
            })
        }
    }

    fn request() -> HttpRequest {
        let url = Url::parse("http://127.0.0.1/oauth/v2/oauth-authorize").expect("valid url");
        HttpRequest::get(url)
    }

    #[tokio::test]
    async fn should_attach_credential() {
        let chain = InterceptorChain::new()
            .with(AuthAugmenter::new(Authentication::Bearer("abc".into())));
        let transport = ScriptedTransport::default();

        let response = chain.run(request(), &transport).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.seen(), vec![Some("Bearer abc".to_string())]);
    }

    #[tokio::test]
    async fn should_replace_existing_authorization_header() {
        let chain = InterceptorChain::new()
            .with(AuthAugmenter::new(Authentication::Bearer("abc".into())));
        let transport = ScriptedTransport::default();
        let request = request()
            .try_with_header("authorization", "Bearer stale")
            .expect("valid header");

        chain.run(request, &transport).await.expect("response");

        assert_eq!(transport.seen(), vec![Some("Bearer abc".to_string())]);
    }

    #[tokio::test]
    async fn should_retry_once_with_refreshed_credential() {
        let source = Arc::new(RotatingSource::default());
        let chain = InterceptorChain::new().with(AuthAugmenter::from_shared(source.clone()));
        let transport = ScriptedTransport::answering([StatusCode::UNAUTHORIZED, StatusCode::OK]);

        let response = chain.run(request(), &transport).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            transport.seen(),
            vec![
                Some("Bearer token-0".to_string()),
                Some("Bearer token-1".to_string())
            ]
        );
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_return_second_unauthorized_unmodified() {
        let source = Arc::new(RotatingSource::default());
        let chain = InterceptorChain::new().with(AuthAugmenter::from_shared(source.clone()));
        let transport = ScriptedTransport::answering([
            StatusCode::UNAUTHORIZED,
            StatusCode::UNAUTHORIZED,
            StatusCode::OK,
        ]);

        let mut response = chain.run(request(), &transport).await.expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.read_body_or_default().await, "401");
        assert_eq!(transport.seen().len(), 2);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn should_not_retry_without_refresh_capability() {
        let chain = InterceptorChain::new()
            .with(AuthAugmenter::new(Authentication::Bearer("abc".into())));
        let transport = ScriptedTransport::answering([StatusCode::UNAUTHORIZED]);

        let response = chain.run(request(), &transport).await.expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(transport.seen().len(), 1);
    }

    #[tokio::test]
    async fn should_not_retry_when_disabled() {
        let source = Arc::new(RotatingSource::default());
        let augmenter =
            AuthAugmenter::from_shared(source.clone()).with_retry_on_unauthorized(false);
        let chain = InterceptorChain::new().with(augmenter);
        let transport = ScriptedTransport::answering([StatusCode::UNAUTHORIZED]);

        let response = chain.run(request(), &transport).await.expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn should_not_retry_on_forbidden() {
        let source = Arc::new(RotatingSource::default());
        let chain = InterceptorChain::new().with(AuthAugmenter::from_shared(source.clone()));
        let transport = ScriptedTransport::answering([StatusCode::FORBIDDEN]);

        let response = chain.run(request(), &transport).await.expect("response");

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn should_propagate_credential_failure() {
        let chain = InterceptorChain::new().with(AuthAugmenter::new(UnavailableSource));
        let transport = ScriptedTransport::default();

        let error = chain
            .run(request(), &transport)
            .await
            .expect_err("augmenter should fail");

        assert!(matches!(
            error,
            ApiClientError::Authentication(AuthenticationError::CredentialUnavailable { .. })
        ));
        assert!(transport.seen().is_empty());
    }

    #[tokio::test]
    async fn should_propagate_transport_failure() {
        let chain = InterceptorChain::new()
            .with(AuthAugmenter::new(Authentication::Bearer("abc".into())));

        let error = chain
            .run(request(), &BrokenTransport)
            .await
            .expect_err("transport should fail");

        assert!(error.is_transport());
    }
}
