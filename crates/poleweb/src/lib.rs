//! # poleweb
//!
//! A minimal HTTP server toolkit: a trie router, route groups with their own
//! middleware, a pooled per-request [`Context`] and a recovery boundary that
//! turns handler failures into clean 500 responses.
//!
//! This crate provides:
//! - Path patterns with literal segments, `:name` parameters and a trailing
//!   `*name` wildcard
//! - One route table per HTTP method plus an `ANY` fallback
//! - Route groups with prefixes and group-scoped middleware
//! - Request helpers (query, form, body binding) and response renderers
//!   (text, HTML, JSON, templates, static files)
//! - An HTTP/1.1 server on tokio and hyper
//!
//! ## Quick Start
//!
//! ```ignore
//! use poleweb::{logger, Engine, StatusCode};
//!
//! let mut engine = Engine::new();
//! engine.middleware(logger());
//!
//! engine.get("/hello/:name", |ctx| {
//!     let body = format!("hello {}, you're at {}\n", ctx.param("name").unwrap_or_default(), ctx.path());
//!     ctx.string(StatusCode::OK, &body);
//!     Ok(())
//! })?;
//!
//! engine.run("127.0.0.1:1018").await?;
//! ```
//!
//! ## Path Parameters
//!
//! Routes can include `:name` parameters and one trailing `*name` wildcard:
//!
//! ```ignore
//! engine.get("/users/:id", show_user)?;
//! engine.get("/assets/*filepath", serve_asset)?;
//! ```
//!
//! Literal segments win over parameters, which win over wildcards, so
//! `/users/me` can live next to `/users/:id`. A wildcard keeps the slashes
//! of what it captured: `/assets/css/a.css` gives `filepath = "css/a.css"`.
//!
//! ## Middleware
//!
//! Middleware is a handler that calls [`Context::next`]:
//!
//! ```ignore
//! let mut v3 = engine.group("/v3");
//! v3.middleware(|ctx| {
//!     ctx.fail(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
//!     Ok(())
//! });
//! ```
//!
//! For a request, the middleware of every group whose prefix covers the path
//! runs outermost first, then the route's own middleware, then the handler.
//!
//! ## Binding
//!
//! ```ignore
//! let schema = Schema::new().required(["name", "email"]);
//! let user: User = ctx.bind(&schema)?;
//! ```

mod binding;
mod config;
mod context;
mod engine;
mod error;
mod middleware;
mod pool;
mod render;
mod request;
mod response;
mod server;
mod static_files;
mod table;
mod template;
mod trie;

pub use binding::{BindError, Binder, FormBinder, JsonBinder, Schema, ValidationError, XmlBinder};
pub use config::{ConfigError, ServerConfig, DEFAULT_BIND_ADDRESS, DEFAULT_MAX_BODY_BYTES};
pub use context::Context;
pub use engine::{Engine, GroupId, Outcome, RouteGroup};
pub use error::{Result, RouterError};
pub use http::{Method, StatusCode};
pub use middleware::{handler, logger, Handler};
pub use pool::{ContextPool, PooledContext, DEFAULT_MAX_IDLE};
pub use render::{Formatted, Html, Json, Render, Template, Text};
pub use request::{PathParams, Request, Values};
pub use response::{Response, APPLICATION_JSON, TEXT_HTML, TEXT_PLAIN};
pub use server::{serve, shutdown_signal};
pub use static_files::StaticFile;
pub use table::{Resolution, Route, RouteMethod, RouteTable};
pub use template::{JinjaTemplates, Templates};
pub use trie::{PathTrie, Segment, TrieMatch, TrieNode};
