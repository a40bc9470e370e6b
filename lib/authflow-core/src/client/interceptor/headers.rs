use http::HeaderMap;
use http::header::{ACCEPT, HeaderName, HeaderValue};

use super::{Interceptor, InterceptorFuture, Next};
use crate::client::{ApiClientError, HttpRequest};

/// Media type of the identity server's hypermedia authentication API.
pub const AUTH_JSON_MEDIA_TYPE: &str = "application/vnd.auth+json";

/// Adds headers to requests that do not already carry them.
///
/// Headers set by the caller win over the defaults.
#[derive(Debug, Clone, Default)]
pub struct DefaultHeaders {
    headers: HeaderMap,
}

impl DefaultHeaders {
    /// Creates an interceptor without any header.
    pub fn new() -> Self {
        Self::default()
    }

    /// `Accept: application/vnd.auth+json`, the representation the identity server expects.
    pub fn auth_json() -> Self {
        Self::new().with(ACCEPT, HeaderValue::from_static(AUTH_JSON_MEDIA_TYPE))
    }

    /// Adds a default header.
    #[must_use]
    pub fn with(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Adds a default header from string parts.
    ///
    /// # Errors
    ///
    /// Fails if the name or the value is not a valid header.
    pub fn try_with(self, name: &str, value: &str) -> Result<Self, ApiClientError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        Ok(self.with(name, value))
    }

    fn apply(&self, mut request: HttpRequest) -> HttpRequest {
        for (name, value) in &self.headers {
            if !request.headers().contains_key(name) {
                request = request.with_header(name.clone(), value.clone());
            }
        }
        request
    }
}

impl Interceptor for DefaultHeaders {
    fn intercept<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> InterceptorFuture<'a> {
        next.run(self.apply(request))
    }

    fn name(&self) -> &str {
        "DefaultHeaders"
    }
}
