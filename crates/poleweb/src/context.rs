//! Per-request context handed to every handler and middleware.

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::binding::{BindError, Binder, FormBinder, JsonBinder, Schema, XmlBinder};
use crate::error::{Result, RouterError};
use crate::middleware::Handler;
use crate::render::{self, Formatted, Render};
use crate::request::{bracket_map, PathParams, Request, Values};
use crate::response::{Response, APPLICATION_JSON, TEXT_HTML, TEXT_PLAIN};
use crate::static_files;
use crate::template::Templates;

/// Request data plus the response being built and the position in the
/// handler chain.
///
/// Contexts are pooled by the engine; nothing set on one survives into the
/// next request.
pub struct Context {
    request: Request,
    params: PathParams,
    query_cache: OnceCell<Values>,
    form_cache: OnceCell<Values>,
    keys: HashMap<String, serde_json::Value>,
    status: StatusCode,
    written: bool,
    headers: HeaderMap,
    body: Vec<u8>,
    chain: Vec<Handler>,
    index: usize,
    aborted: bool,
    templates: Option<Arc<dyn Templates>>,
}

impl Context {
    /// A context for `request` with no route, chain or templates. Mostly
    /// useful for calling a handler directly in tests.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            params: PathParams::new(),
            query_cache: OnceCell::new(),
            form_cache: OnceCell::new(),
            keys: HashMap::new(),
            status: StatusCode::OK,
            written: false,
            headers: HeaderMap::new(),
            body: Vec::new(),
            chain: Vec::new(),
            index: 0,
            aborted: false,
            templates: None,
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Request::new(Method::GET, "/"))
    }

    pub(crate) fn prepare(
        &mut self,
        request: Request,
        params: PathParams,
        templates: Option<Arc<dyn Templates>>,
    ) {
        self.request = request;
        self.params = params;
        self.templates = templates;
        self.index = 0;
        self.aborted = false;
    }

    pub(crate) fn chain_mut(&mut self) -> &mut Vec<Handler> {
        &mut self.chain
    }

    /// Drops everything request-specific, keeping allocations.
    pub(crate) fn reset(&mut self) {
        self.request.method = Method::GET;
        self.request.path.clear();
        self.request.query = None;
        self.request.headers.clear();
        self.request.body = Bytes::new();
        self.request.remote_addr = None;
        self.params.clear();
        self.query_cache.take();
        self.form_cache.take();
        self.keys.clear();
        self.status = StatusCode::OK;
        self.written = false;
        self.headers.clear();
        self.body.clear();
        self.chain.clear();
        self.index = 0;
        self.aborted = false;
        self.templates = None;
    }

    /// Moves the buffered response out of the context.
    pub fn take_response(&mut self) -> Response {
        let response = Response {
            status: self.status,
            headers: std::mem::take(&mut self.headers),
            body: Bytes::copy_from_slice(&self.body),
        };
        self.body.clear();
        response
    }

    // ----- request -----

    /// The underlying request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.request.method
    }

    /// Request path, without the query string.
    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Path plus query string.
    pub fn request_uri(&self) -> String {
        self.request.request_uri()
    }

    /// Peer address, when served over a socket.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.request.remote_addr
    }

    /// A captured path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Every captured path parameter.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// A request header.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request.get_header(name)
    }

    /// Raw request body.
    pub fn body(&self) -> &[u8] {
        &self.request.body
    }

    fn query_values(&self) -> &Values {
        self.query_cache.get_or_init(|| {
            self.request
                .query
                .as_deref()
                .map(|q| Request::parse_urlencoded(q.as_bytes()))
                .unwrap_or_default()
        })
    }

    /// First value of query parameter `key`.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_values()
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Like [`Context::query`], falling back to `default`.
    pub fn default_query<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.query(key).unwrap_or(default)
    }

    /// Every value of query parameter `key`.
    pub fn query_array(&self, key: &str) -> &[String] {
        self.query_values()
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Query parameters of the form `key[name]=value`, as `name → value`.
    pub fn query_map(&self, key: &str) -> Option<HashMap<String, String>> {
        bracket_map(self.query_values(), key)
    }

    fn form_values(&self) -> &Values {
        self.form_cache.get_or_init(|| {
            if FormBinder.accepts(self.request.content_type().as_deref().unwrap_or_default()) {
                Request::parse_urlencoded(&self.request.body)
            } else {
                Values::new()
            }
        })
    }

    /// First value of urlencoded form field `key`.
    pub fn post_form(&self, key: &str) -> Option<&str> {
        self.form_values()
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Like [`Context::post_form`], falling back to `default`.
    pub fn default_post_form<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.post_form(key).unwrap_or(default)
    }

    /// Every value of form field `key`.
    pub fn post_form_array(&self, key: &str) -> &[String] {
        self.form_values()
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Form fields of the form `key[name]=value`, as `name → value`.
    pub fn post_form_map(&self, key: &str) -> Option<HashMap<String, String>> {
        bracket_map(self.form_values(), key)
    }

    // ----- request-scoped keys -----

    /// Stores a value for later handlers in the chain.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.keys.insert(key.into(), value.into());
    }

    /// A value stored with [`Context::set`].
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.keys.get(key)
    }

    // ----- binding -----

    /// Binds the body with the binder matching its `Content-Type`.
    /// A request without one is treated as JSON.
    ///
    /// # Errors
    ///
    /// [`BindError::UnsupportedContentType`] or whatever the binder returns.
    pub fn bind<T: DeserializeOwned>(&self, schema: &Schema) -> std::result::Result<T, BindError> {
        let content_type = self.request.content_type().unwrap_or_default();
        if content_type.is_empty() || JsonBinder.accepts(&content_type) {
            self.should_bind_with(&JsonBinder, schema)
        } else if XmlBinder.accepts(&content_type) {
            self.should_bind_with(&XmlBinder, schema)
        } else if FormBinder.accepts(&content_type) {
            self.should_bind_with(&FormBinder, schema)
        } else {
            Err(BindError::UnsupportedContentType(content_type))
        }
    }

    /// Binds a JSON body.
    ///
    /// # Errors
    ///
    /// See [`Binder::bind`].
    pub fn bind_json<T: DeserializeOwned>(&self, schema: &Schema) -> std::result::Result<T, BindError> {
        self.should_bind_with(&JsonBinder, schema)
    }

    /// Binds an XML body.
    ///
    /// # Errors
    ///
    /// See [`Binder::bind`].
    pub fn bind_xml<T: DeserializeOwned>(&self, schema: &Schema) -> std::result::Result<T, BindError> {
        self.should_bind_with(&XmlBinder, schema)
    }

    /// Binds a urlencoded form body.
    ///
    /// # Errors
    ///
    /// See [`Binder::bind`].
    pub fn bind_form<T: DeserializeOwned>(&self, schema: &Schema) -> std::result::Result<T, BindError> {
        self.should_bind_with(&FormBinder, schema)
    }

    /// Binds the body with an explicit binder, whatever the content type.
    ///
    /// # Errors
    ///
    /// See [`Binder::bind`].
    pub fn should_bind_with<T, B>(&self, binder: &B, schema: &Schema) -> std::result::Result<T, BindError>
    where
        T: DeserializeOwned,
        B: Binder + ?Sized,
    {
        binder.bind(&self.request.body, schema)
    }

    // ----- response -----

    /// The response status so far.
    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// True once the status has been written.
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Writes the response status. Only the first write counts; later ones
    /// are logged and ignored.
    pub fn status(&mut self, code: StatusCode) {
        if self.written {
            if code != self.status {
                warn!(
                    current = self.status.as_u16(),
                    ignored = code.as_u16(),
                    path = %self.request.path,
                    "superfluous status write"
                );
            }
            return;
        }
        self.status = code;
        self.written = true;
    }

    /// Sets a response header. Ignored with a warning once the status has
    /// been written.
    ///
    /// # Errors
    ///
    /// The name or value is not a valid header.
    pub fn set_header(&mut self, key: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(RouterError::fault)?;
        let value = HeaderValue::from_str(value).map_err(RouterError::fault)?;
        if self.written {
            warn!(header = %name, path = %self.request.path, "header set after status was written");
            return Ok(());
        }
        self.headers.insert(name, value);
        Ok(())
    }

    /// A response header set so far.
    pub fn response_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Appends raw bytes to the body, writing the current status first if
    /// needed.
    pub fn write(&mut self, bytes: &[u8]) {
        let status = self.status;
        self.status(status);
        self.body.extend_from_slice(bytes);
    }

    fn emit(&mut self, code: StatusCode, content_type: &str, bytes: &[u8]) {
        if !self.written && !self.headers.contains_key(header::CONTENT_TYPE) {
            if let Ok(value) = HeaderValue::from_str(content_type) {
                self.headers.insert(header::CONTENT_TYPE, value);
            }
        }
        self.status(code);
        self.body.extend_from_slice(bytes);
    }

    /// Renders `r` as the response body. Nothing is written if rendering
    /// fails.
    ///
    /// # Errors
    ///
    /// The renderer's error.
    pub fn render<R: Render + ?Sized>(&mut self, code: StatusCode, r: &R) -> Result<()> {
        let mut out = Vec::new();
        r.render(&mut out)?;
        self.emit(code, r.content_type(), &out);
        Ok(())
    }

    /// Plain text body.
    pub fn string(&mut self, code: StatusCode, body: &str) {
        self.emit(code, TEXT_PLAIN, body.as_bytes());
    }

    /// Plain text body from `format_args!`.
    ///
    /// # Errors
    ///
    /// A `Display` implementation failed.
    pub fn string_fmt(&mut self, code: StatusCode, args: fmt::Arguments<'_>) -> Result<()> {
        self.render(code, &Formatted(args))
    }

    /// HTML body.
    pub fn html(&mut self, code: StatusCode, body: &str) {
        self.emit(code, TEXT_HTML, body.as_bytes());
    }

    /// JSON body.
    ///
    /// # Errors
    ///
    /// `data` fails to serialize.
    pub fn json<T: Serialize + ?Sized>(&mut self, code: StatusCode, data: &T) -> Result<()> {
        let body = serde_json::to_vec(data)?;
        self.emit(code, APPLICATION_JSON, &body);
        Ok(())
    }

    /// Renders template `name` from the engine's templates.
    ///
    /// # Errors
    ///
    /// No templates are configured, or rendering failed.
    pub fn template<T: Serialize + ?Sized>(&mut self, code: StatusCode, name: &str, data: &T) -> Result<()> {
        let Some(templates) = self.templates.clone() else {
            return Err(RouterError::Template("no templates configured".to_string()));
        };
        let page = render::template(templates.as_ref(), name, data)?;
        self.render(code, &page)
    }

    /// Stops the chain and responds with `{"message": message}`.
    pub fn fail(&mut self, code: StatusCode, message: &str) {
        self.abort();
        let body = serde_json::json!({ "message": message }).to_string();
        self.emit(code, APPLICATION_JSON, body.as_bytes());
    }

    /// Redirects to `location`.
    ///
    /// # Errors
    ///
    /// `code` is not a 3xx or 201, or `location` is not a valid header value.
    pub fn redirect(&mut self, code: StatusCode, location: &str) -> Result<()> {
        if !code.is_redirection() && code != StatusCode::CREATED {
            return Err(RouterError::fault(format_args!(
                "cannot redirect with status {code}"
            )));
        }
        self.set_header(header::LOCATION.as_str(), location)?;
        self.status(code);
        Ok(())
    }

    /// Serves `rel` from the directory `root`, or a 404 naming the URI when
    /// there is no such file (or `rel` climbs out of `root`).
    ///
    /// # Errors
    ///
    /// An I/O failure other than a missing file.
    pub fn file(&mut self, root: impl AsRef<Path>, rel: &str) -> Result<()> {
        match static_files::load(root.as_ref(), rel)? {
            Some(file) => self.emit(StatusCode::OK, &file.content_type, &file.body),
            None => {
                let body = format!("{} not found\n", self.request_uri());
                self.emit(StatusCode::NOT_FOUND, TEXT_PLAIN, body.as_bytes());
            }
        }
        Ok(())
    }

    // ----- chain control -----

    /// Runs the rest of the chain. Middleware call this to pass control
    /// inward; whatever follows the call runs after the inner handlers
    /// return.
    ///
    /// # Errors
    ///
    /// The first error returned by an inner handler.
    pub fn next(&mut self) -> Result<()> {
        if self.aborted {
            return Ok(());
        }
        let Some(handler) = self.chain.get(self.index).cloned() else {
            return Ok(());
        };
        self.index += 1;
        (*handler)(self)
    }

    /// Prevents any further handler in the chain from running.
    pub fn abort(&mut self) {
        self.aborted = true;
        self.index = self.chain.len();
    }

    /// True after [`Context::abort`] or [`Context::fail`].
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("params", &self.params)
            .field("status", &self.status)
            .field("written", &self.written)
            .field("index", &self.index)
            .field("chain", &self.chain.len())
            .field("aborted", &self.aborted)
            .finish_non_exhaustive()
    }
}
