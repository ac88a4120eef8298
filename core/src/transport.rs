//! Blocking execution of `HttpRequest` values.

use std::time::Duration;

use tracing::debug;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Fixed per-request timeout. Not configurable; a request that exceeds it is
/// a failed request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Executes one HTTP round-trip.
///
/// Implementations must return non-2xx responses as data. Only failures that
/// produce no response at all map to `Err`.
pub trait Transport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).execute(request)
    }
}

/// `Transport` backed by a `ureq` agent.
///
/// Cookies are not stored by the agent; the client sends the session cookie
/// explicitly on each request.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        debug!(method = ?request.method, url = %redact_query(&request.url), "sending request");

        let result = match (request.method, request.body) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(&request.url), &request.headers).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(&request.url), &request.headers).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => with_headers(self.agent.post(&request.url), &request.headers).send_empty(),
        };
        let mut response = result.map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        debug!(status, "received response");
        Ok(HttpResponse { status, headers, body })
    }
}

fn with_headers<B>(builder: ureq::RequestBuilder<B>, headers: &[(String, String)]) -> ureq::RequestBuilder<B> {
    headers
        .iter()
        .fold(builder, |builder, (name, value)| builder.header(name.as_str(), value.as_str()))
}

/// Strip the query string, which carries the device secret, before logging.
pub(crate) fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
