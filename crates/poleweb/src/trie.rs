//! Segment trie used for route lookup.
//!
//! Patterns are split on `/`; empty segments are ignored, so `/users/` and
//! `/users` are the same route and `/` is the root node. Each node has any
//! number of literal children, at most one `:param` child and at most one
//! trailing `*wildcard` child. Lookup walks one level per path segment and
//! prefers literal, then parameter, then wildcard children, backtracking when
//! a branch dead-ends.

use std::collections::BTreeMap;

use crate::error::{Result, RouterError};
use crate::request::PathParams;

/// Sigil introducing a named single-segment parameter.
pub const PARAM_SIGIL: char = ':';
/// Sigil introducing a trailing catch-all parameter.
pub const WILDCARD_SIGIL: char = '*';

/// A parsed pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A literal segment.
    Static(String),
    /// A parameter segment (e.g. `:id`).
    Param(String),
    /// A wildcard segment (e.g. `*filepath`), matching the rest of the path.
    Wildcard(String),
}

impl Segment {
    fn parse(raw: &str, pattern: &str) -> Result<Self> {
        if let Some(name) = raw.strip_prefix(PARAM_SIGIL) {
            if name.is_empty() {
                return Err(RouterError::invalid(pattern, "parameter name is empty"));
            }
            Ok(Self::Param(name.to_string()))
        } else if let Some(name) = raw.strip_prefix(WILDCARD_SIGIL) {
            if name.is_empty() {
                return Err(RouterError::invalid(pattern, "wildcard name is empty"));
            }
            Ok(Self::Wildcard(name.to_string()))
        } else {
            Ok(Self::Static(raw.to_string()))
        }
    }

    /// Returns the parameter name, if this is a parameter or wildcard.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Static(_) => None,
            Self::Param(name) | Self::Wildcard(name) => Some(name),
        }
    }
}

/// Splits a path into its non-empty segments together with their byte
/// offsets in the original string.
fn segments(path: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut offset = 0;
    for part in path.split('/') {
        if !part.is_empty() {
            out.push((offset, part));
        }
        offset += part.len() + 1;
    }
    out
}

/// Canonical form of a pattern or path: one leading `/`, no empty segments,
/// no trailing `/`.
pub fn normalize(pattern: &str) -> String {
    let mut out = String::new();
    for (_, part) in segments(pattern) {
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// One node of the trie.
#[derive(Debug)]
pub struct TrieNode<T> {
    segment: Segment,
    children: BTreeMap<String, TrieNode<T>>,
    param: Option<Box<TrieNode<T>>>,
    wildcard: Option<Box<TrieNode<T>>>,
    full_pattern: Option<String>,
    value: Option<T>,
}

impl<T> TrieNode<T> {
    fn new(segment: Segment) -> Self {
        Self {
            segment,
            children: BTreeMap::new(),
            param: None,
            wildcard: None,
            full_pattern: None,
            value: None,
        }
    }

    /// The segment this node stands for.
    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// True if a registered pattern ends here.
    pub fn is_terminal(&self) -> bool {
        self.value.is_some()
    }

    /// The registered pattern ending at this node, reconstructed from the root.
    pub fn full_pattern(&self) -> Option<&str> {
        self.full_pattern.as_deref()
    }

    fn find<'a>(
        &'a self,
        path: &str,
        segs: &[(usize, &str)],
        depth: usize,
        captured: &mut Vec<(&'a str, String)>,
    ) -> Option<&'a Self> {
        let Some(&(offset, segment)) = segs.get(depth) else {
            return self.is_terminal().then_some(self);
        };

        if let Some(child) = self.children.get(segment) {
            if let Some(found) = child.find(path, segs, depth + 1, captured) {
                return Some(found);
            }
        }

        if let Some(child) = &self.param {
            let name = child.segment.name().unwrap_or_default();
            captured.push((name, segment.to_string()));
            if let Some(found) = child.find(path, segs, depth + 1, captured) {
                return Some(found);
            }
            captured.pop();
        }

        if let Some(child) = &self.wildcard {
            if child.is_terminal() {
                let name = child.segment.name().unwrap_or_default();
                let rest = path[offset..].trim_end_matches('/');
                captured.push((name, rest.to_string()));
                return Some(child);
            }
        }

        None
    }

    fn collect_patterns<'a>(&'a self, out: &mut Vec<&'a str>) {
        if let Some(pattern) = &self.full_pattern {
            out.push(pattern);
        }
        for child in self.children.values() {
            child.collect_patterns(out);
        }
        if let Some(child) = &self.param {
            child.collect_patterns(out);
        }
        if let Some(child) = &self.wildcard {
            child.collect_patterns(out);
        }
    }
}

/// A successful trie lookup.
#[derive(Debug)]
pub struct TrieMatch<'a, T> {
    /// The value bound at the terminal node.
    pub value: &'a T,
    /// The registered pattern that matched.
    pub pattern: &'a str,
    /// Captured parameters.
    pub params: PathParams,
}

/// A prefix tree of path segments.
#[derive(Debug)]
pub struct PathTrie<T> {
    label: String,
    root: TrieNode<T>,
}

impl<T> PathTrie<T> {
    /// Creates an empty trie. `label` names the trie in conflict errors
    /// (usually the HTTP method).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            root: TrieNode::new(Segment::Static(String::new())),
        }
    }

    /// Inserts `pattern`, binding `value` at its terminal node.
    ///
    /// Returns the normalized pattern.
    ///
    /// # Errors
    ///
    /// [`RouterError::RouteConflict`] if the pattern is already bound, or if a
    /// parameter/wildcard at the same position is registered under another
    /// name. [`RouterError::InvalidPattern`] if a wildcard is not the last
    /// segment or a parameter name is empty.
    pub fn insert(&mut self, pattern: &str, value: T) -> Result<String> {
        let parts = segments(pattern);
        let mut node = &mut self.root;
        let mut full = String::new();

        for (i, &(_, raw)) in parts.iter().enumerate() {
            full.push('/');
            full.push_str(raw);

            node = match Segment::parse(raw, pattern)? {
                Segment::Static(text) => node
                    .children
                    .entry(text.clone())
                    .or_insert_with(|| TrieNode::new(Segment::Static(text))),
                segment @ Segment::Param(_) => {
                    let child = node
                        .param
                        .get_or_insert_with(|| Box::new(TrieNode::new(segment.clone())));
                    if child.segment != segment {
                        return Err(RouterError::conflict(
                            &self.label,
                            pattern,
                            format!("parameter {raw} collides with {}", display(&child.segment)),
                        ));
                    }
                    child.as_mut()
                }
                segment @ Segment::Wildcard(_) => {
                    if i + 1 != parts.len() {
                        return Err(RouterError::invalid(
                            pattern,
                            "wildcard must be the last segment",
                        ));
                    }
                    let child = node
                        .wildcard
                        .get_or_insert_with(|| Box::new(TrieNode::new(segment.clone())));
                    if child.segment != segment {
                        return Err(RouterError::conflict(
                            &self.label,
                            pattern,
                            format!("wildcard {raw} collides with {}", display(&child.segment)),
                        ));
                    }
                    child.as_mut()
                }
            };
        }

        if full.is_empty() {
            full.push('/');
        }
        if node.is_terminal() {
            return Err(RouterError::conflict(
                &self.label,
                pattern,
                format!("{full} is already registered"),
            ));
        }
        node.value = Some(value);
        node.full_pattern = Some(full.clone());
        Ok(full)
    }

    /// Looks up `path`, returning the bound value and captured parameters.
    pub fn lookup(&self, path: &str) -> Option<TrieMatch<'_, T>> {
        let segs = segments(path);
        let mut captured = Vec::new();
        let node = self.root.find(path, &segs, 0, &mut captured)?;

        let mut params = PathParams::new();
        for (name, value) in captured {
            params.insert(name, value);
        }
        Some(TrieMatch {
            value: node.value.as_ref()?,
            pattern: node.full_pattern.as_deref().unwrap_or("/"),
            params,
        })
    }

    /// Returns true if `path` resolves to a bound node.
    pub fn matches(&self, path: &str) -> bool {
        let segs = segments(path);
        self.root.find(path, &segs, 0, &mut Vec::new()).is_some()
    }

    /// Lists every registered pattern, literal branches first.
    pub fn patterns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.root.collect_patterns(&mut out);
        out
    }

    /// True if nothing has been inserted.
    pub fn is_empty(&self) -> bool {
        self.patterns().is_empty()
    }
}

fn display(segment: &Segment) -> String {
    match segment {
        Segment::Static(text) => text.clone(),
        Segment::Param(name) => format!("{PARAM_SIGIL}{name}"),
        Segment::Wildcard(name) => format!("{WILDCARD_SIGIL}{name}"),
    }
}
