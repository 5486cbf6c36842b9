//! HTTP request type.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};

/// Multi-valued `key → values` map used for query strings and form bodies.
pub type Values = HashMap<String, Vec<String>>;

/// Path parameters extracted from the URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: HashMap<String, String>,
}

impl PathParams {
    /// Creates new empty path params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a parameter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Gets a parameter value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parses a parameter as a specific type.
    pub fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Returns an iterator over the parameters.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of captured parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Removes every parameter, keeping the allocation.
    pub fn clear(&mut self) {
        self.params.clear();
    }
}

/// An HTTP request, fully buffered.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Request path, without the query string.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
    /// Peer address, when known.
    pub remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Creates a new request. `target` may carry a query string.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method,
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    /// Creates a GET request.
    pub fn get(target: &str) -> Self {
        Self::new(Method::GET, target)
    }

    /// Creates a POST request.
    pub fn post(target: &str) -> Self {
        Self::new(Method::POST, target)
    }

    /// Sets a header. Invalid names or values are ignored.
    #[must_use]
    pub fn header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
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

    /// The `Content-Type` without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.get_header("content-type").map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }

    /// Path plus query string, as the client sent it.
    pub fn request_uri(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.to_vec()).ok()
    }

    /// Parses a urlencoded string (`a=1&a=2&b=x`) into a multi-valued map.
    pub fn parse_urlencoded(input: &[u8]) -> Values {
        let mut values = Values::new();
        for (key, value) in form_urlencoded::parse(input) {
            values
                .entry(key.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        values
    }
}

/// Collects `prefix[key]=value` entries of `values` into `key → value`,
/// taking the first value of each. Returns `None` when no entry matched.
pub(crate) fn bracket_map(values: &Values, prefix: &str) -> Option<HashMap<String, String>> {
    let mut dict = HashMap::new();
    for (key, value) in values {
        let Some(open) = key.find('[') else { continue };
        if open == 0 || &key[..open] != prefix {
            continue;
        }
        let rest = &key[open + 1..];
        let Some(close) = rest.find(']') else { continue };
        if close == 0 {
            continue;
        }
        if let Some(first) = value.first() {
            dict.insert(rest[..close].to_string(), first.clone());
        }
    }
    (!dict.is_empty()).then_some(dict)
}
