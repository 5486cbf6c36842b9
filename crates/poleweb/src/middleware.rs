//! Handlers and built-in middleware.
//!
//! There is no separate middleware type: a middleware is a handler that calls
//! [`Context::next`] somewhere in its body. Code before the call runs on the
//! way in, code after it on the way out. Returning without calling `next`
//! short-circuits the rest of the chain.
//!
//! # Example
//!
//! ```ignore
//! engine.middleware(|ctx: &mut Context| {
//!     if ctx.request_header("authorization").is_none() {
//!         ctx.fail(StatusCode::UNAUTHORIZED, "missing credentials");
//!         return Ok(());
//!     }
//!     ctx.next()
//! });
//! ```

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::context::Context;
use crate::error::Result;

/// A type-erased handler or middleware.
pub type Handler = Arc<dyn Fn(&mut Context) -> Result<()> + Send + Sync>;

/// Boxes a closure or function as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Logs one line per request with status, method, URI and latency.
///
/// Install it first so the latency covers the whole chain.
pub fn logger() -> impl Fn(&mut Context) -> Result<()> + Send + Sync + 'static {
    |ctx: &mut Context| {
        let started = Instant::now();
        let result = ctx.next();
        info!(
            status = ctx.status_code().as_u16(),
            method = %ctx.method(),
            uri = %ctx.request_uri(),
            elapsed = ?started.elapsed(),
            "request"
        );
        result
    }
}
