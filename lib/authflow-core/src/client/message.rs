//! HTTP requests and responses as plain values.
//!
//! [`HttpRequest`] is what callers build and what interceptors rewrite. It is
//! `Clone`, so a stage of the chain can replay it. [`HttpResponse`] carries a
//! read-once [`ResponseBody`] that is pulled chunk by chunk from a [`BodySource`].

use std::fmt;
use std::io;
use std::string::FromUtf8Error;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::ApiClientError;

/// Text returned by [`HttpResponse::read_body_or_default`] when no body can be read.
pub const EMPTY_BODY_FALLBACK: &str = "{}";

/// An outgoing HTTP request.
///
/// Header keys are unique and case-insensitive. Builder methods consume the request
/// and return a new one, so a request is never mutated behind the back of a stage
/// that already observed it.
#[derive(Clone, derive_more::Debug)]
pub struct HttpRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    #[debug(skip)]
    body: Option<Bytes>,
}

impl HttpRequest {
    /// Creates a request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Sets a header, replacing any previous value for the same name.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Removes every value of a header.
    #[must_use]
    pub fn without_header(mut self, name: &HeaderName) -> Self {
        self.headers.remove(name);
        self
    }

    /// Sets a header from string parts.
    ///
    /// # Errors
    ///
    /// Fails if the name or the value is not a valid header.
    pub fn try_with_header(self, name: &str, value: &str) -> Result<Self, ApiClientError> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        Ok(self.with_header(name, value))
    }

    /// Sets the raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the JSON body and sets the `content-type` header.
    ///
    /// # Errors
    ///
    /// Fails if the value cannot be serialized.
    pub fn with_json<T>(self, value: &T) -> Result<Self, ApiClientError>
    where
        T: Serialize + ?Sized,
    {
        let data = serde_json::to_vec(value)?;
        Ok(self
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(data))
    }

    /// The HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The request body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Method, Url, HeaderMap, Option<Bytes>) {
        (self.method, self.url, self.headers, self.body)
    }
}

/// A source of body chunks.
///
/// `Ok(None)` marks the end of the body.
pub trait BodySource: Send {
    /// Pulls the next chunk.
    fn next_chunk(&mut self) -> BoxFuture<'_, io::Result<Option<Bytes>>>;
}

impl BodySource for reqwest::Response {
    fn next_chunk(&mut self) -> BoxFuture<'_, io::Result<Option<Bytes>>> {
        Box::pin(async move { self.chunk().await.map_err(io::Error::other) })
    }
}

#[derive(Debug)]
struct InMemory(Option<Bytes>);

impl BodySource for InMemory {
    fn next_chunk(&mut self) -> BoxFuture<'_, io::Result<Option<Bytes>>> {
        let chunk = self.0.take();
        Box::pin(async move { Ok(chunk) })
    }
}

/// Errors raised while reading a response body.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum BodyReadError {
    /// The body stream failed.
    #[display("failed to read response body: {_0}")]
    Io(io::Error),

    /// The body is not valid UTF-8.
    #[display("response body is not valid UTF-8: {_0}")]
    InvalidUtf8(FromUtf8Error),
}

/// A read-once response body.
///
/// Reading consumes the value: a body can only be read once.
pub struct ResponseBody {
    source: Box<dyn BodySource>,
}

impl ResponseBody {
    /// Wraps a chunk source.
    pub fn new(source: impl BodySource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    /// Creates a body already held in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(InMemory(Some(bytes.into())))
    }

    /// Reads the whole body.
    ///
    /// # Errors
    ///
    /// Fails if the underlying source fails.
    pub async fn bytes(mut self) -> Result<Bytes, BodyReadError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.source.next_chunk().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }

    /// Reads the whole body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Fails if the underlying source fails or the body is not UTF-8.
    pub async fn text(self) -> Result<String, BodyReadError> {
        let bytes = self.bytes().await?;
        let text = String::from_utf8(bytes.to_vec())?;
        Ok(text)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody { .. }")
    }
}

impl From<String> for ResponseBody {
    fn from(value: String) -> Self {
        Self::from_bytes(value)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::from_bytes(value)
    }
}

/// An HTTP response.
///
/// Error statuses are ordinary responses: interpreting them is up to the caller.
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<ResponseBody>,
}

impl HttpResponse {
    /// Creates a response without headers or body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Sets a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<ResponseBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub(crate) fn from_parts(
        status: StatusCode,
        headers: HeaderMap,
        body: Option<ResponseBody>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns `true` while the body has not been taken.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Moves the body out of the response.
    ///
    /// Returns `None` if there is no body or it was already taken.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    /// Reads the body as text, falling back to `"{}"`.
    ///
    /// The fallback is returned when the response has no body, when the body was
    /// already consumed, or when reading it fails. This method never fails.
    pub async fn read_body_or_default(&mut self) -> String {
        let Some(body) = self.take_body() else {
            debug!(status = %self.status, "no response body, using fallback");
            return EMPTY_BODY_FALLBACK.to_string();
        };

        match body.text().await {
            Ok(text) => text,
            Err(error) => {
                debug!(%error, status = %self.status, "unreadable response body, using fallback");
                EMPTY_BODY_FALLBACK.to_string()
            }
        }
    }
}
