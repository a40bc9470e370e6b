use http::{Method, StatusCode};
use reqwest::{Body, Request};
use tracing::debug;

use super::interceptor::{InterceptorFuture, Transport};
use super::{HttpRequest, HttpResponse, ResponseBody};

/// Terminal stage backed by a [`reqwest::Client`].
///
/// Connection, timeout and body errors surface as
/// [`ApiClientError::Transport`]. The connection is taken from reqwest's pool when
/// the request is sent and returned to it once the response body is read or dropped.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing reqwest client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_request(request: HttpRequest) -> Request {
        let (method, url, headers, body) = request.into_parts();
        let mut result = Request::new(method, url);
        *result.headers_mut() = headers;
        if let Some(body) = body {
            *result.body_mut() = Some(Body::from(body));
        }
        result
    }

    fn has_body(method: &Method, status: StatusCode) -> bool {
        *method != Method::HEAD
            && status != StatusCode::NO_CONTENT
            && status != StatusCode::NOT_MODIFIED
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> InterceptorFuture<'_> {
        Box::pin(async move {
            let method = request.method().clone();
            let request = Self::build_request(request);

            let response = self.client.execute(request).await?;
            debug!(status = %response.status(), url = %response.url(), "response received");

            let status = response.status();
            let headers = response.headers().clone();
            let body = Self::has_body(&method, status).then(|| ResponseBody::new(response));

            Ok(HttpResponse::from_parts(status, headers, body))
        })
    }
}

impl From<reqwest::Client> for ReqwestTransport {
    fn from(client: reqwest::Client) -> Self {
        Self::new(client)
    }
}
