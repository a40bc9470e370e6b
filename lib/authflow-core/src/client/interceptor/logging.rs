use std::time::Instant;

use tracing::{debug, warn};

use super::{Interceptor, InterceptorFuture, Next};
use crate::client::HttpRequest;

/// Logs every exchange that goes through it.
///
/// Requests are logged as they are seen at this position of the chain: register the
/// logger before the auth augmenter and credentials never reach the logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

impl Interceptor for RequestLogger {
    fn intercept<'a>(&'a self, request: HttpRequest, next: Next<'a>) -> InterceptorFuture<'a> {
        Box::pin(async move {
            let method = request.method().clone();
            let url = request.url().clone();
            debug!(%method, %url, headers = ?request.headers(), "sending...");

            let start = Instant::now();
            let result = next.run(request).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(response) => {
                    debug!(%method, %url, status = %response.status(), ?elapsed, "...receiving");
                }
                Err(error) => {
                    warn!(%method, %url, %error, ?elapsed, "request failed");
                }
            }
            result
        })
    }

    fn name(&self) -> &str {
        "RequestLogger"
    }
}
