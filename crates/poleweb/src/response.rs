//! HTTP response type.

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

use crate::error::RouterError;

/// Content type of plain text bodies.
pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
/// Content type of HTML bodies.
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
/// Content type of JSON bodies.
pub const APPLICATION_JSON: &str = "application/json; charset=utf-8";

/// An HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a new response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a 200 OK response.
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Creates a response with plain text content.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN))
            .body(body.into())
    }

    /// Creates a response with HTML content.
    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .header(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_HTML))
            .body(body.into())
    }

    /// Creates a response with JSON content.
    pub fn json<T: serde::Serialize>(status: StatusCode, data: &T) -> Self {
        match serde_json::to_vec(data) {
            Ok(body) => Self::new(status)
                .header(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))
                .body(body),
            Err(_) => Self::internal_server_error(),
        }
    }

    /// 404 naming the requested URI.
    pub fn not_found(uri: &str) -> Self {
        Self::text(StatusCode::NOT_FOUND, format!("{uri} not found\n"))
    }

    /// 405 naming the method and URI.
    pub fn method_not_allowed(method: &str, uri: &str) -> Self {
        Self::text(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("{uri} {method} not allowed\n"),
        )
    }

    /// The response a dispatch error turns into: 404 and 405 for routing
    /// misses, a bare 500 for everything else.
    pub fn from_error(err: &RouterError) -> Self {
        match err {
            RouterError::NotFound { uri, .. } => Self::not_found(uri),
            RouterError::MethodNotAllowed { method, uri } => Self::method_not_allowed(method, uri),
            _ => Self::internal_server_error(),
        }
    }

    /// 413 for bodies over the configured limit.
    pub fn payload_too_large() -> Self {
        Self::text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large\n")
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_server_error() -> Self {
        Self::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Sets the status code.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Gets a header value.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.to_vec()).ok()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

impl From<Response> for http::Response<http_body_util::Full<Bytes>> {
    fn from(res: Response) -> Self {
        let mut out = Self::new(http_body_util::Full::new(res.body));
        *out.status_mut() = res.status;
        *out.headers_mut() = res.headers;
        out
    }
}
