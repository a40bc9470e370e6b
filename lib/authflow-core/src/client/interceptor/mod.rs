//! Interceptor chain wrapped around the network call.
//!
//! An [`Interceptor`] receives the request and a [`Next`] handle on the rest of the
//! chain. It may rewrite the request, call `next` (once, several times, or not at
//! all) and rewrite the response. Interceptors run in registration order, the first
//! registered being the outermost. The innermost stage is the [`Transport`].
//!
//! ```text
//! request → interceptor 1 → interceptor 2 → ... → transport
//! response ←            ←               ←       ←
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::{ApiClientError, HttpRequest, HttpResponse};

mod headers;
pub use self::headers::{AUTH_JSON_MEDIA_TYPE, DefaultHeaders};

mod logging;
pub use self::logging::RequestLogger;

/// Future returned by every stage of the chain.
pub type InterceptorFuture<'a> = BoxFuture<'a, Result<HttpResponse, ApiClientError>>;

/// A request/response transform wrapped around the inner stages.
///
/// Errors returned by `next` must be propagated, not swallowed.
///
/// # Example
///
/// ```rust
/// use authflow_core::{HttpRequest, Interceptor, InterceptorFuture, Next};
/// use http::header::{HeaderName, HeaderValue};
///
/// #[derive(Debug)]
/// struct CorrelationId;
///
/// impl Interceptor for CorrelationId {
///     fn intercept<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> InterceptorFuture<'a> {
///         let request = request.with_header(
///             HeaderName::from_static("x-correlation-id"),
///             HeaderValue::from_static("42"),
///         );
///         next.run(request)
///     }
/// }
/// ```
pub trait Interceptor: Send + Sync + fmt::Debug {
    /// Handles the request, delegating to `next` for the inner stages.
    fn intercept<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> InterceptorFuture<'a>;

    /// Name used in logs, the type name without path nor generic arguments.
    fn name(&self) -> &str {
        let full = std::any::type_name::<Self>();
        let path = full.split_once('<').map_or(full, |(path, _)| path);
        path.rsplit("::").next().unwrap_or("interceptor")
    }
}

/// The terminal stage: performs the actual network I/O.
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends the request over the network.
    fn send(&self, request: HttpRequest) -> InterceptorFuture<'_>;
}

impl<T> Interceptor for Arc<T>
where
    T: Interceptor + ?Sized,
{
    fn intercept<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> InterceptorFuture<'a> {
        self.as_ref().intercept(request, next)
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }
}

/// Handle on the remaining stages of the chain.
///
/// `Next` is `Copy`: an interceptor may run the inner stages more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    /// Runs the next stage with `request`.
    pub fn run(self, request: HttpRequest) -> InterceptorFuture<'a> {
        match self.interceptors.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    interceptors: rest,
                    transport: self.transport,
                };
                current.intercept(request, next)
            }
            None => self.transport.send(request),
        }
    }

    /// Number of interceptors left before the transport.
    pub fn remaining(&self) -> usize {
        self.interceptors.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.interceptors.len())
            .field("transport", &self.transport)
            .finish()
    }
}

/// Ordered list of interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an interceptor; it becomes the innermost one so far.
    #[must_use]
    pub fn with(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.push(Arc::new(interceptor));
        self
    }

    /// Appends a shared interceptor.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Number of registered interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns `true` if no interceptor is registered.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Interceptor names, outermost first.
    pub fn names(&self) -> Vec<&str> {
        self.interceptors.iter().map(|it| it.name()).collect()
    }

    /// Runs `request` through every interceptor, then through `terminal`.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an interceptor or by the terminal stage.
    pub async fn run(
        &self,
        request: HttpRequest,
        terminal: &dyn Transport,
    ) -> Result<HttpResponse, ApiClientError> {
        let next = Next {
            interceptors: &self.interceptors,
            transport: terminal,
        };
        next.run(request).await
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
