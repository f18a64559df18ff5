//! Route registry and lookup.
//!
//! # Responsibilities
//! - Store registered route layers keyed by lower-cased path
//! - Resolve (method, url) to a handler with path and query parameters
//! - Expose the registry read-only for documentation
//!
//! # Design Decisions
//! - Built once at startup, immutable afterwards (shared behind `Arc`, no locks)
//! - O(1) exact lookup, then one O(1) wildcard probe on the last segment
//! - Later registrations at the same path replace earlier ones
//! - Method mismatch is reported separately from a missing path

use std::collections::HashMap;

use axum::http::Method;
use serde_json::Value;

use crate::error::GatewayError;
use crate::routing::handler::BoxedHandler;
use crate::routing::route::{MethodFilter, RegistrationContext, RouteLayer, RouteOptions, RouteTable};

/// Parameters extracted while resolving a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    /// Wildcard captures, original case preserved. At most one element.
    pub path: Vec<String>,
    /// Query string, last value wins on repeated keys.
    pub query: HashMap<String, String>,
}

/// Result of a successful lookup.
#[derive(Clone)]
pub struct RouteMatch {
    pub handler: BoxedHandler,
    pub params: RouteParams,
    pub group: String,
    /// Path the matched layer was registered under.
    pub path: String,
}

impl std::fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteMatch")
            .field("params", &self.params)
            .field("group", &self.group)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// In-memory route registry.
#[derive(Debug, Default)]
pub struct Router {
    base_url: String,
    layers: HashMap<String, RouteLayer>,
    tags: HashMap<String, String>,
    doc_configs: HashMap<String, Value>,
}

impl Router {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register every complete entry of `routes` under `ctx`.
    ///
    /// Entries missing a path, a method, a name or a handler are skipped; the rest
    /// still register. `name` is the display name recorded for `ctx.tag`.
    /// Returns the number of layers registered.
    pub fn register(&mut self, ctx: &RegistrationContext, name: &str, routes: RouteTable) -> usize {
        if !ctx.tag.is_empty() {
            self.tags.insert(ctx.tag.clone(), name.to_string());
        }

        let mut registered = 0;
        for (path, spec) in routes {
            let complete = !path.is_empty() && spec.options.name.is_some();
            let (Some(method), true, Some(handler)) = (spec.options.method.clone(), complete, spec.handler)
            else {
                tracing::debug!(path = %path, group = %ctx.group, "Skipping incomplete route entry");
                continue;
            };
            self.on(ctx, method, &path, handler, spec.options);
            registered += 1;
        }
        registered
    }

    /// Register a single layer. Relative paths get the base URL prepended.
    pub fn on(
        &mut self,
        ctx: &RegistrationContext,
        method: MethodFilter,
        path: &str,
        handler: BoxedHandler,
        options: RouteOptions,
    ) {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        };

        let layer = RouteLayer {
            group: ctx.group.clone(),
            tag: ctx.tag.clone(),
            method,
            path: path.clone(),
            options,
            handler,
        };

        if self.layers.insert(path.to_lowercase(), layer).is_some() {
            tracing::debug!(path = %path, "Route replaced by later registration");
        }
    }

    /// Attach documentation config to the group in `ctx`.
    pub fn set_doc_config(&mut self, ctx: &RegistrationContext, config: Value) {
        self.doc_configs.insert(ctx.group.clone(), config);
    }

    /// Resolve a request.
    ///
    /// Tries the lower-cased path exactly; on a miss, replaces the text after
    /// the last `/` or `.` with `*` and tries once more, capturing that text.
    pub fn lookup(&self, method: &Method, url: &str) -> Result<RouteMatch, GatewayError> {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (url, None),
        };

        let mut captures = Vec::new();
        let layer = match self.layers.get(&path.to_lowercase()) {
            Some(layer) => layer,
            None => {
                let sep = path
                    .rfind(|c| c == '/' || c == '.')
                    .ok_or(GatewayError::NotFound)?;
                let tail = &path[sep + 1..];
                if tail.is_empty() {
                    return Err(GatewayError::NotFound);
                }
                let wildcard = format!("{}*", path[..=sep].to_lowercase());
                let layer = self.layers.get(&wildcard).ok_or(GatewayError::NotFound)?;
                captures.push(tail.to_string());
                layer
            }
        };

        if !layer.method.matches(method) {
            return Err(GatewayError::MethodNotAllowed);
        }

        Ok(RouteMatch {
            handler: layer.handler.clone(),
            params: RouteParams {
                path: captures,
                query: query.map(parse_query).unwrap_or_default(),
            },
            group: layer.group.clone(),
            path: layer.path.clone(),
        })
    }

    /// Registered layers keyed by lower-cased path.
    pub fn layers(&self) -> &HashMap<String, RouteLayer> {
        &self.layers
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    pub fn doc_configs(&self) -> &HashMap<String, Value> {
        &self.doc_configs
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}
