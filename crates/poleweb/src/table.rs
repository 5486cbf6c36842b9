//! Per-method route tables.

use std::collections::HashMap;
use std::fmt;

use http::Method;
use tracing::debug;

use crate::error::{Result, RouterError};
use crate::middleware::Handler;
use crate::request::PathParams;
use crate::trie::{normalize, PathTrie};

/// The method a route answers to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteMethod {
    /// Every method without a more specific route.
    Any,
    /// Exactly this method.
    Exact(Method),
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("ANY"),
            Self::Exact(method) => f.write_str(method.as_str()),
        }
    }
}

impl From<Method> for RouteMethod {
    fn from(method: Method) -> Self {
        Self::Exact(method)
    }
}

/// A registered route.
pub struct Route {
    /// Method the route was registered under.
    pub method: RouteMethod,
    /// Full normalized pattern, group prefix included.
    pub pattern: String,
    /// Middleware that runs after group middleware, for this route only.
    pub middleware: Vec<Handler>,
    /// The terminal handler.
    pub handler: Handler,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("middleware", &self.middleware.len())
            .finish_non_exhaustive()
    }
}

/// Outcome of resolving a request against the table.
#[derive(Debug)]
pub enum Resolution<'a> {
    /// A route matched.
    Found {
        /// The matched route.
        route: &'a Route,
        /// Captured path parameters.
        params: PathParams,
    },
    /// The path matches under some other method only.
    MethodNotAllowed,
    /// Nothing matches the path.
    NotFound,
}

impl<'a> Resolution<'a> {
    /// The matched route and its parameters, or the routing error for a
    /// miss.
    ///
    /// # Errors
    ///
    /// [`RouterError::MethodNotAllowed`] or [`RouterError::NotFound`].
    pub fn into_route(self, method: &Method, uri: &str) -> Result<(&'a Route, PathParams)> {
        match self {
            Self::Found { route, params } => Ok((route, params)),
            Self::MethodNotAllowed => Err(RouterError::MethodNotAllowed {
                method: method.to_string(),
                uri: uri.to_string(),
            }),
            Self::NotFound => Err(RouterError::NotFound {
                method: method.to_string(),
                uri: uri.to_string(),
            }),
        }
    }
}

/// One trie per method, plus one for routes registered under ANY.
///
/// An exact-method route always wins over an ANY route for the same path.
#[derive(Debug)]
pub struct RouteTable {
    tries: HashMap<Method, PathTrie<Route>>,
    any: PathTrie<Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            tries: HashMap::new(),
            any: PathTrie::new("ANY"),
        }
    }

    /// Registers a route under `method` and `pattern`.
    ///
    /// Returns the normalized pattern.
    ///
    /// # Errors
    ///
    /// See [`PathTrie::insert`].
    pub fn register(
        &mut self,
        method: RouteMethod,
        pattern: &str,
        handler: Handler,
        middleware: Vec<Handler>,
    ) -> Result<String> {
        let route = Route {
            method: method.clone(),
            pattern: normalize(pattern),
            middleware,
            handler,
        };
        let trie = match &method {
            RouteMethod::Any => &mut self.any,
            RouteMethod::Exact(m) => self
                .tries
                .entry(m.clone())
                .or_insert_with(|| PathTrie::new(m.as_str())),
        };
        let normalized = trie.insert(pattern, route)?;
        debug!(method = %method, pattern = %normalized, "route registered");
        Ok(normalized)
    }

    /// Resolves `method` and `path` to a route.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_> {
        let found = self
            .tries
            .get(method)
            .and_then(|trie| trie.lookup(path))
            .or_else(|| self.any.lookup(path));

        if let Some(found) = found {
            let route = found.value;
            return Resolution::Found {
                route,
                params: found.params,
            };
        }

        if self
            .tries
            .iter()
            .any(|(m, trie)| m != method && trie.matches(path))
        {
            Resolution::MethodNotAllowed
        } else {
            Resolution::NotFound
        }
    }

    /// Every registered `(method, pattern)` pair, sorted.
    pub fn routes(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .tries
            .iter()
            .flat_map(|(method, trie)| {
                trie.patterns()
                    .into_iter()
                    .map(move |p| (method.to_string(), p.to_string()))
            })
            .chain(
                self.any
                    .patterns()
                    .into_iter()
                    .map(|p| ("ANY".to_string(), p.to_string())),
            )
            .collect();
        out.sort();
        out
    }

    /// True if no route has been registered.
    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.tries.values().all(PathTrie::is_empty)
    }
}
