//! Reusable request contexts.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::context::Context;

/// Default number of idle contexts kept for reuse.
pub const DEFAULT_MAX_IDLE: usize = 256;

/// A free list of [`Context`] values.
///
/// Contexts are reset when they come back, so a checkout never sees state
/// from a previous request. At most `max_idle` contexts are kept; extras are
/// dropped.
pub struct ContextPool {
    idle: Mutex<Vec<Box<Context>>>,
    max_idle: usize,
    created: AtomicUsize,
}

impl ContextPool {
    /// Creates an empty pool.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
            created: AtomicUsize::new(0),
        }
    }

    /// Checks out a context, allocating one if none is idle.
    pub fn acquire(&self) -> PooledContext<'_> {
        let reused = self.idle.lock().pop();
        let ctx = reused.unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            Box::new(Context::empty())
        });
        PooledContext {
            pool: self,
            ctx: Some(ctx),
        }
    }

    fn release(&self, mut ctx: Box<Context>) {
        ctx.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(ctx);
        }
    }

    /// Contexts allocated over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Contexts currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE)
    }
}

impl fmt::Debug for ContextPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextPool")
            .field("idle", &self.idle())
            .field("max_idle", &self.max_idle)
            .field("created", &self.created())
            .finish()
    }
}

/// A checked-out context; goes back to its pool on drop.
pub struct PooledContext<'a> {
    pool: &'a ContextPool,
    ctx: Option<Box<Context>>,
}

impl Deref for PooledContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx.as_deref().expect("context is held until drop")
    }
}

impl DerefMut for PooledContext<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx.as_deref_mut().expect("context is held until drop")
    }
}

impl Drop for PooledContext<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.pool.release(ctx);
        }
    }
}
