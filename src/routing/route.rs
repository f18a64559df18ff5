//! Route definitions: options, tables, registered layers and the
//! registration context that scopes a module's routes to a group and tag.

use std::fmt;

use axum::http::Method;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::routing::handler::BoxedHandler;

/// Which request methods a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    /// Registered as `ALL`; matches every method.
    Any,
    Only(Method),
}

impl MethodFilter {
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            Self::Any => true,
            Self::Only(expected) => expected == method,
        }
    }

    /// Parse `GET`, `post`, `ALL`, ...
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return None;
        }
        if upper == "ALL" {
            return Some(Self::Any);
        }
        Method::from_bytes(upper.as_bytes()).ok().map(Self::Only)
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        Self::Only(method)
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("ALL"),
            Self::Only(method) => f.write_str(method.as_str()),
        }
    }
}

impl Serialize for MethodFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Route metadata. Only `method` and `name` are required for registration;
/// the rest feeds documentation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    pub method: Option<MethodFilter>,
    pub param: Option<Value>,
    pub result: Option<Value>,
    pub deprecated: bool,
    pub legacy: Option<String>,
    pub access: Option<String>,
}

impl RouteOptions {
    pub fn new(method: impl Into<MethodFilter>, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            method: Some(method.into()),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn param(mut self, param: Value) -> Self {
        self.param = Some(param);
        self
    }

    pub fn result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn legacy(mut self, legacy: impl Into<String>) -> Self {
        self.legacy = Some(legacy.into());
        self
    }

    pub fn access(mut self, policy: impl Into<String>) -> Self {
        self.access = Some(policy.into());
        self
    }
}

/// One entry of a route table, as supplied by a route module.
#[derive(Clone, Default)]
pub struct RouteSpec {
    pub options: RouteOptions,
    pub handler: Option<BoxedHandler>,
}

impl fmt::Debug for RouteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSpec")
            .field("options", &self.options)
            .field("handler", &self.handler.as_ref().map(|_| "..."))
            .finish()
    }
}

/// Ordered `path → spec` mapping handed to [`Router::register`](crate::routing::Router::register).
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<(String, RouteSpec)>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fully specified route.
    pub fn route(self, path: impl Into<String>, options: RouteOptions, handler: BoxedHandler) -> Self {
        self.entry(
            path,
            RouteSpec {
                options,
                handler: Some(handler),
            },
        )
    }

    /// Add a raw entry. Incomplete entries are accepted here and skipped at registration.
    pub fn entry(mut self, path: impl Into<String>, spec: RouteSpec) -> Self {
        self.entries.push((path.into(), spec));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for RouteTable {
    type Item = (String, RouteSpec);
    type IntoIter = std::vec::IntoIter<(String, RouteSpec)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A registered route: one (method, path) with its metadata and handler.
#[derive(Clone)]
pub struct RouteLayer {
    pub group: String,
    pub tag: String,
    pub method: MethodFilter,
    /// Path as registered, before lower-casing.
    pub path: String,
    pub options: RouteOptions,
    pub handler: BoxedHandler,
}

impl fmt::Debug for RouteLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteLayer")
            .field("group", &self.group)
            .field("tag", &self.tag)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Group and tag that routes registered in one module pass are filed under.
///
/// Passed explicitly to every registration call; there is no ambient
/// "current module" state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationContext {
    pub group: String,
    pub tag: String,
}

impl RegistrationContext {
    pub fn new(group: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            tag: tag.into(),
        }
    }

    /// Derive display names from a module's folder and file name:
    /// `("user-center", "aAccount")` → `("User Center", "Account")`.
    pub fn from_module(folder: &str, file: &str) -> Self {
        Self {
            group: start_case(folder),
            tag: start_case(strip_order_prefix(file)),
        }
    }

    /// Context for built-in routes. An empty group turns off access logging.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn is_system(&self) -> bool {
        self.group.is_empty()
    }
}

/// Module files may carry a lowercase `a` before an upper-case name purely
/// to control ordering (`aUser`).
fn strip_order_prefix(file: &str) -> &str {
    match file.strip_prefix('a') {
        Some(rest) if rest.starts_with(|c: char| c.is_uppercase()) => rest,
        _ => file,
    }
}

/// `user_adminPanel` → `User Admin Panel`
pub fn start_case(raw: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in raw.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
