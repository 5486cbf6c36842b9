//! The engine: route registration and request dispatch.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use http::Method;
use tracing::{debug, error};

use crate::config::{ServerConfig, DEFAULT_MAX_BODY_BYTES};
use crate::context::Context;
use crate::error::{Result, RouterError};
use crate::middleware::{handler, Handler};
use crate::pool::{ContextPool, DEFAULT_MAX_IDLE};
use crate::request::Request;
use crate::response::Response;
use crate::table::{Route, RouteMethod, RouteTable};
use crate::template::{JinjaTemplates, Templates};
use crate::trie::normalize;

/// Identifies a group in an engine's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

impl GroupId {
    /// The engine's root group, prefix `""`.
    pub const ROOT: Self = Self(0);
}

struct GroupEntry {
    prefix: String,
    middleware: Vec<Handler>,
    parent: Option<usize>,
}

/// How a dispatched request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The chain ran to the end.
    Completed,
    /// A handler aborted the chain.
    Aborted,
    /// A handler failed or panicked; the client got a 500.
    Recovered,
    /// No route matched.
    NotFound,
    /// The path exists under another method.
    MethodNotAllowed,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Recovered => "recovered",
            Self::NotFound => "not_found",
            Self::MethodNotAllowed => "method_not_allowed",
        })
    }
}

/// Routes, groups, middleware and the context pool.
///
/// Build it with `&mut` access, then share it (the server wraps it in an
/// `Arc`) and call [`Engine::handle_request`] per request.
///
/// ```ignore
/// let mut engine = Engine::new();
/// engine.middleware(logger());
/// engine.get("/hello/:name", |ctx| {
///     let body = format!("hello {}\n", ctx.param("name").unwrap_or_default());
///     ctx.string(StatusCode::OK, &body);
///     Ok(())
/// })?;
///
/// let mut v1 = engine.group("/v1");
/// v1.get("/ping", |ctx| {
///     ctx.string(StatusCode::OK, "pong");
///     Ok(())
/// })?;
/// ```
pub struct Engine {
    table: RouteTable,
    groups: Vec<GroupEntry>,
    pool: ContextPool,
    templates: Option<Arc<dyn Templates>>,
    max_body_bytes: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with no routes and default limits.
    pub fn new() -> Self {
        Self {
            table: RouteTable::new(),
            groups: vec![GroupEntry {
                prefix: String::new(),
                middleware: Vec::new(),
                parent: None,
            }],
            pool: ContextPool::new(DEFAULT_MAX_IDLE),
            templates: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// An engine sized by `config`, loading templates from its
    /// `template_dir` when set.
    pub fn with_config(config: &ServerConfig) -> Self {
        let mut engine = Self::new();
        engine.pool = ContextPool::new(config.max_idle_contexts);
        engine.max_body_bytes = config.max_body_bytes;
        if let Some(dir) = &config.template_dir {
            engine.load_templates(dir);
        }
        engine
    }

    /// Request bodies above this size are refused by the server.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// The context pool.
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// Uses `templates` for [`Context::template`].
    pub fn set_templates(&mut self, templates: impl Templates + 'static) -> &mut Self {
        self.templates = Some(Arc::new(templates));
        self
    }

    /// Loads templates from files under `dir`.
    pub fn load_templates(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.set_templates(JinjaTemplates::from_dir(dir.as_ref()))
    }

    /// Every registered `(method, pattern)` pair.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.table.routes()
    }

    /// A handle on the root group.
    pub fn root(&mut self) -> RouteGroup<'_> {
        self.group_mut(GroupId::ROOT)
    }

    /// A handle on a group created earlier.
    ///
    /// # Panics
    ///
    /// `id` comes from another engine.
    pub fn group_mut(&mut self, id: GroupId) -> RouteGroup<'_> {
        assert!(id.0 < self.groups.len(), "unknown group {id:?}");
        RouteGroup {
            engine: self,
            index: id.0,
        }
    }

    /// Creates a top-level group under `prefix`.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        let index = self.add_group(0, prefix);
        RouteGroup {
            engine: self,
            index,
        }
    }

    /// Adds engine-wide middleware.
    pub fn middleware<F>(&mut self, mw: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.groups[0].middleware.push(handler(mw));
        self
    }

    /// Registers a route at the root. See [`RouteGroup::handle`].
    ///
    /// # Errors
    ///
    /// The pattern is invalid or already registered for this method.
    pub fn handle<F>(&mut self, method: impl Into<RouteMethod>, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.root().handle(method, pattern, h)?;
        Ok(self)
    }

    /// Registers a route with route-level middleware at the root.
    ///
    /// # Errors
    ///
    /// The pattern is invalid or already registered for this method.
    pub fn handle_with<F>(
        &mut self,
        method: impl Into<RouteMethod>,
        pattern: &str,
        middleware: Vec<Handler>,
        h: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.root().handle_with(method, pattern, middleware, h)?;
        Ok(self)
    }

    /// Registers a GET route at the root.
    ///
    /// # Errors
    ///
    /// See [`Engine::handle`].
    pub fn get<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::GET, pattern, h)
    }

    /// Registers a POST route at the root.
    ///
    /// # Errors
    ///
    /// See [`Engine::handle`].
    pub fn post<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::POST, pattern, h)
    }

    /// Registers a PUT route at the root.
    ///
    /// # Errors
    ///
    /// See [`Engine::handle`].
    pub fn put<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::PUT, pattern, h)
    }

    /// Registers a PATCH route at the root.
    ///
    /// # Errors
    ///
    /// See [`Engine::handle`].
    pub fn patch<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::PATCH, pattern, h)
    }

    /// Registers a DELETE route at the root.
    ///
    /// # Errors
    ///
    /// See [`Engine::handle`].
    pub fn delete<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::DELETE, pattern, h)
    }

    /// Registers a route for any method at the root.
    ///
    /// # Errors
    ///
    /// See [`Engine::handle`].
    pub fn any<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(RouteMethod::Any, pattern, h)
    }

    /// Serves files under `root` at `prefix/*filepath`.
    ///
    /// # Errors
    ///
    /// See [`Engine::handle`].
    pub fn static_dir(&mut self, prefix: &str, root: impl Into<PathBuf>) -> Result<&mut Self> {
        self.root().static_dir(prefix, root)?;
        Ok(self)
    }

    fn add_group(&mut self, parent: usize, prefix: &str) -> usize {
        let joined = join(&self.groups[parent].prefix, prefix);
        let prefix = if joined.is_empty() {
            joined
        } else {
            normalize(&joined)
        };
        debug!(prefix = %prefix, "group created");
        self.groups.push(GroupEntry {
            prefix,
            middleware: Vec::new(),
            parent: Some(parent),
        });
        self.groups.len() - 1
    }

    /// Group middleware is picked by the matched pattern, so the raw request
    /// path (`//v3/x`, `/users/5`) never decides membership.
    fn collect_chain(&self, route: &Route, chain: &mut Vec<Handler>) {
        for group in &self.groups {
            if covers(&group.prefix, &route.pattern) {
                chain.extend(group.middleware.iter().cloned());
            }
        }
        chain.extend(route.middleware.iter().cloned());
        chain.push(Arc::clone(&route.handler));
    }

    /// Dispatches one request.
    ///
    /// Never fails: routing misses become 404/405, and a handler that returns
    /// an error or panics becomes a 500 with its partial output discarded.
    pub fn handle_request(&self, request: Request) -> Response {
        let started = Instant::now();
        let method = request.method.clone();
        let uri = request.request_uri();

        let resolution = self.table.resolve(&request.method, &request.path);
        let (route, params) = match resolution.into_route(&method, &uri) {
            Ok(found) => found,
            Err(err) => {
                let outcome = match err {
                    RouterError::MethodNotAllowed { .. } => Outcome::MethodNotAllowed,
                    _ => Outcome::NotFound,
                };
                let response = Response::from_error(&err);
                log_dispatch(&method, &uri, &response, outcome, started);
                return response;
            }
        };

        let mut ctx = self.pool.acquire();
        self.collect_chain(route, ctx.chain_mut());
        ctx.prepare(request, params, self.templates.clone());

        let result = panic::catch_unwind(AssertUnwindSafe(|| ctx.next()));
        let outcome = match result {
            Ok(Ok(())) if ctx.is_aborted() => Outcome::Aborted,
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(err)) => {
                error!(%method, %uri, pattern = %route.pattern, error = %err, "handler failed");
                Outcome::Recovered
            }
            Err(payload) => {
                error!(
                    %method,
                    %uri,
                    pattern = %route.pattern,
                    panic = %panic_message(payload.as_ref()),
                    "handler panicked"
                );
                Outcome::Recovered
            }
        };

        let response = match outcome {
            Outcome::Recovered => Response::internal_server_error(),
            _ => ctx.take_response(),
        };
        log_dispatch(&method, &uri, &response, outcome, started);
        response
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("routes", &self.table.routes())
            .field(
                "groups",
                &self.groups.iter().map(|g| g.prefix.as_str()).collect::<Vec<_>>(),
            )
            .field("pool", &self.pool)
            .field("templates", &self.templates.is_some())
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

/// A handle for registering routes and middleware on one group.
///
/// Handles borrow the engine; several groups are built one after another,
/// and [`RouteGroup::id`] plus [`Engine::group_mut`] get a handle back later.
pub struct RouteGroup<'e> {
    engine: &'e mut Engine,
    index: usize,
}

impl RouteGroup<'_> {
    /// This group's id.
    pub fn id(&self) -> GroupId {
        GroupId(self.index)
    }

    /// Absolute prefix, `""` for the root.
    pub fn prefix(&self) -> &str {
        &self.engine.groups[self.index].prefix
    }

    /// The enclosing group, `None` for the root.
    pub fn parent(&self) -> Option<GroupId> {
        self.engine.groups[self.index].parent.map(GroupId)
    }

    /// Creates a child group whose prefix extends this one.
    pub fn group(&mut self, prefix: &str) -> RouteGroup<'_> {
        let index = self.engine.add_group(self.index, prefix);
        RouteGroup {
            engine: &mut *self.engine,
            index,
        }
    }

    /// Appends middleware to this group. It runs for every request whose
    /// path falls under the group's prefix, whenever the route was
    /// registered.
    pub fn middleware<F>(&mut self, mw: F) -> &mut Self
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.engine.groups[self.index].middleware.push(handler(mw));
        self
    }

    /// Registers `h` for `method` at `pattern`, relative to the group prefix.
    ///
    /// # Errors
    ///
    /// The pattern is invalid or already registered for this method.
    pub fn handle<F>(&mut self, method: impl Into<RouteMethod>, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle_with(method, pattern, Vec::new(), h)
    }

    /// Like [`RouteGroup::handle`], with middleware that runs for this route
    /// only, after the group middleware.
    ///
    /// # Errors
    ///
    /// The pattern is invalid or already registered for this method.
    pub fn handle_with<F>(
        &mut self,
        method: impl Into<RouteMethod>,
        pattern: &str,
        middleware: Vec<Handler>,
        h: F,
    ) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        let full = join(self.prefix(), pattern);
        self.engine
            .table
            .register(method.into(), &full, handler(h), middleware)?;
        Ok(self)
    }

    /// GET route.
    ///
    /// # Errors
    ///
    /// See [`RouteGroup::handle`].
    pub fn get<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::GET, pattern, h)
    }

    /// POST route.
    ///
    /// # Errors
    ///
    /// See [`RouteGroup::handle`].
    pub fn post<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::POST, pattern, h)
    }

    /// PUT route.
    ///
    /// # Errors
    ///
    /// See [`RouteGroup::handle`].
    pub fn put<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::PUT, pattern, h)
    }

    /// PATCH route.
    ///
    /// # Errors
    ///
    /// See [`RouteGroup::handle`].
    pub fn patch<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::PATCH, pattern, h)
    }

    /// DELETE route.
    ///
    /// # Errors
    ///
    /// See [`RouteGroup::handle`].
    pub fn delete<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(Method::DELETE, pattern, h)
    }

    /// Route for any method without a more specific route.
    ///
    /// # Errors
    ///
    /// See [`RouteGroup::handle`].
    pub fn any<F>(&mut self, pattern: &str, h: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
    {
        self.handle(RouteMethod::Any, pattern, h)
    }

    /// Serves files under `root` at `prefix/*filepath`.
    ///
    /// # Errors
    ///
    /// See [`RouteGroup::handle`].
    pub fn static_dir(&mut self, prefix: &str, root: impl Into<PathBuf>) -> Result<&mut Self> {
        let root = root.into();
        let pattern = format!("{}/*filepath", prefix.trim_end_matches('/'));
        self.get(&pattern, move |ctx| {
            let rel = ctx.param("filepath").unwrap_or_default().to_string();
            ctx.file(&root, &rel)
        })
    }
}

/// Joins a group prefix and a relative prefix or pattern: one `/` between
/// them, none at the end.
fn join(prefix: &str, suffix: &str) -> String {
    let suffix = suffix.trim_matches('/');
    if suffix.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{suffix}")
    }
}

/// True if the route `pattern` lies under the group `prefix`, segment by
/// segment. A `:param` or `*wildcard` segment of the prefix matches a
/// segment of the same kind whatever its name.
fn covers(prefix: &str, pattern: &str) -> bool {
    let mut route = pattern.split('/').filter(|s| !s.is_empty());
    prefix
        .split('/')
        .filter(|s| !s.is_empty())
        .all(|seg| route.next().is_some_and(|r| same_segment(seg, r)))
}

fn same_segment(a: &str, b: &str) -> bool {
    a == b
        || (a.starts_with(':') && b.starts_with(':'))
        || (a.starts_with('*') && b.starts_with('*'))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn log_dispatch(method: &Method, uri: &str, response: &Response, outcome: Outcome, started: Instant) {
    debug!(
        %method,
        uri,
        status = response.status.as_u16(),
        %outcome,
        elapsed = ?started.elapsed(),
        "dispatched"
    );
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    fn ok(ctx: &mut Context) -> Result<()> {
        ctx.string(StatusCode::OK, "ok");
        Ok(())
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "/v1"), "/v1");
        assert_eq!(join("", "v1/"), "/v1");
        assert_eq!(join("/v1", "/admin"), "/v1/admin");
        assert_eq!(join("/v1", "/"), "/v1");
        assert_eq!(join("", "/"), "");
    }

    #[test]
    fn test_covers_is_segment_aware() {
        assert!(covers("", "/anything"));
        assert!(covers("/v1", "/v1"));
        assert!(covers("/v1", "/v1/hello"));
        assert!(!covers("/v1", "/v10/hello"));
        assert!(!covers("/v1", "/"));
    }

    #[test]
    fn test_covers_matches_param_segments_by_kind() {
        assert!(covers("/users/:id", "/users/:id/profile"));
        assert!(covers("/users/:id", "/users/:uid"));
        assert!(!covers("/users/:id", "/users/me"));
        assert!(!covers("/users/me", "/users/:id"));
        assert!(covers("/files/*rest", "/files/*rest"));
    }

    #[test]
    fn test_group_prefixes_are_normalized() {
        let mut engine = Engine::new();
        let mut v1 = engine.group("//v1//");
        assert_eq!(v1.prefix(), "/v1");
        assert_eq!(v1.group("admin//users").prefix(), "/v1/admin/users");
        assert_eq!(engine.group("/").prefix(), "");
    }

    #[test]
    fn test_nested_group_prefixes() {
        let mut engine = Engine::new();
        let mut v1 = engine.group("v1");
        assert_eq!(v1.prefix(), "/v1");
        assert_eq!(v1.parent(), Some(GroupId::ROOT));
        let v1_id = v1.id();

        let mut admin = v1.group("/admin/");
        assert_eq!(admin.prefix(), "/v1/admin");
        admin.get("/users/:id", ok).unwrap();
        assert_eq!(admin.parent(), Some(v1_id));

        assert_eq!(engine.root().parent(), None);
        assert_eq!(engine.group_mut(v1_id).prefix(), "/v1");
        assert_eq!(
            engine.routes(),
            vec![("GET".to_string(), "/v1/admin/users/:id".to_string())]
        );
    }

    #[test]
    fn test_group_index_route() {
        let mut engine = Engine::new();
        engine.group("/v1").get("/", ok).unwrap();
        let res = engine.handle_request(Request::get("/v1"));
        assert_eq!(res.status, StatusCode::OK);
        let res = engine.handle_request(Request::get("/v1/"));
        assert_eq!(res.status, StatusCode::OK);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut engine = Engine::new();
        engine.get("/hello", ok).unwrap();
        let err = engine.get("/hello/", ok).unwrap_err();
        assert!(matches!(err, RouterError::RouteConflict { .. }));
        engine.post("/hello", ok).unwrap();
    }

    #[test]
    fn test_middleware_added_after_routes_still_runs() {
        let mut engine = Engine::new();
        let mut v1 = engine.group("/v1");
        v1.get("/x", ok).unwrap();
        v1.middleware(|ctx| {
            ctx.set_header("x-group", "v1")?;
            ctx.next()
        });
        let res = engine.handle_request(Request::get("/v1/x"));
        assert_eq!(res.get_header("x-group"), Some("v1"));
    }

    #[test]
    fn test_with_config() {
        let config = ServerConfig {
            max_body_bytes: 10,
            max_idle_contexts: 1,
            ..ServerConfig::default()
        };
        let engine = Engine::with_config(&config);
        assert_eq!(engine.max_body_bytes(), 10);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::MethodNotAllowed.to_string(), "method_not_allowed");
        assert_eq!(Outcome::Recovered.to_string(), "recovered");
    }
}
