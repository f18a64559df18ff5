//! Gateway assembly.
//!
//! # Responsibilities
//! - Register the built-in system routes
//! - Mount statically declared route modules under a group and tag
//! - Freeze the router and build the dispatcher and server from config
//!
//! # Design Decisions
//! - Route modules are functions or closures taking a [`Registrar`]; there is no directory scanning
//! - The registration context travels inside the [`Registrar`], never as global state
//! - System routes are registered first, so modules may override them

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::body::BodyReader;
use crate::config::GatewayConfig;
use crate::context::SessionCodec;
use crate::dispatch::{Dispatcher, Interceptor};
use crate::http::GatewayServer;
use crate::routing::{
    handler_fn, BoxedHandler, MethodFilter, RegistrationContext, Reply, RouteOptions, RouteTable,
    Router,
};

/// Registration handle given to a route module. Everything registered
/// through it lands under the module's group and tag.
pub struct Registrar<'a> {
    router: &'a mut Router,
    ctx: RegistrationContext,
}

impl<'a> Registrar<'a> {
    pub fn new(router: &'a mut Router, ctx: RegistrationContext) -> Self {
        Self { router, ctx }
    }

    pub fn context(&self) -> &RegistrationContext {
        &self.ctx
    }

    /// Register a route table; `name` is the tag's display name.
    pub fn register(&mut self, name: &str, routes: RouteTable) -> usize {
        self.router.register(&self.ctx, name, routes)
    }

    pub fn on(&mut self, method: MethodFilter, path: &str, handler: BoxedHandler, options: RouteOptions) {
        self.router.on(&self.ctx, method, path, handler, options);
    }

    pub fn set_doc_config(&mut self, config: Value) {
        self.router.set_doc_config(&self.ctx, config);
    }
}

/// Builder for a running gateway.
pub struct Gateway {
    config: GatewayConfig,
    router: Router,
    interceptor: Option<Arc<dyn Interceptor>>,
    session_codec: Option<Arc<dyn SessionCodec>>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let mut router = Router::new(config.gateway.base_url.clone());
        register_system_routes(&mut router, &config.gateway.version);
        Self {
            config,
            router,
            interceptor: None,
            session_codec: None,
        }
    }

    /// Mount `module` under the group and tag derived from `group` and `tag`
    /// (`"user-center"`, `"aAccount"` → `"User Center"`, `"Account"`).
    /// `module` is any `FnOnce(&mut Registrar)`, so it may capture state.
    pub fn mount<M>(mut self, group: &str, tag: &str, module: M) -> Self
    where
        M: FnOnce(&mut Registrar<'_>),
    {
        let ctx = RegistrationContext::from_module(group, tag);
        tracing::debug!(group = %ctx.group, tag = %ctx.tag, "Mounting route module");
        module(&mut Registrar::new(&mut self.router, ctx));
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_session_codec(mut self, codec: Arc<dyn SessionCodec>) -> Self {
        self.session_codec = Some(codec);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Freeze the router and build the request dispatcher.
    pub fn into_dispatcher(self) -> Dispatcher {
        let pipeline = &self.config.gateway;
        let read_timeout = match pipeline.body_read_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let reader = BodyReader::new(pipeline.max_body_size).with_read_timeout(read_timeout);

        tracing::info!(
            routes = self.router.layers().len(),
            base_url = %self.router.base_url(),
            max_body_size = pipeline.max_body_size,
            "Router ready"
        );

        let mut dispatcher = Dispatcher::new(Arc::new(self.router), reader)
            .with_handler_timeout(pipeline.handler_timeout_secs.map(Duration::from_secs));
        if let Some(interceptor) = self.interceptor {
            dispatcher = dispatcher.with_interceptor(interceptor);
        }
        if let Some(codec) = self.session_codec {
            dispatcher = dispatcher.with_session_codec(codec);
        }
        dispatcher
    }

    /// Build the server. Bind a [`Listener`](crate::net::Listener) separately
    /// and pass it to [`GatewayServer::run`].
    pub fn into_server(self) -> GatewayServer {
        let grace = Duration::from_secs(self.config.listener.shutdown_grace_secs);
        GatewayServer::new(Arc::new(self.into_dispatcher()), grace)
    }
}

/// Version, root, health and favicon routes. Registered without a group,
/// which keeps them out of the access log.
fn register_system_routes(router: &mut Router, version: &str) {
    let system = RegistrationContext::system();
    let version = version.to_string();

    router.on(
        &system,
        MethodFilter::Only(axum::http::Method::GET),
        "version",
        handler_fn(move |_ctx| {
            let result = json!({ "result": version });
            Box::pin(async move { Ok(Reply::Json(result)) })
        }),
        RouteOptions::new(axum::http::Method::GET, "Version"),
    );

    let empty = || handler_fn(|_ctx| Box::pin(async { Ok(Reply::html("")) }));
    router.on(&system, MethodFilter::Any, "/", empty(), RouteOptions::new(MethodFilter::Any, "Root"));
    for (path, name) in [("/health", "Health"), ("/favicon.ico", "Favicon")] {
        router.on(
            &system,
            MethodFilter::Only(axum::http::Method::GET),
            path,
            empty(),
            RouteOptions::new(axum::http::Method::GET, name),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn shop(r: &mut Registrar<'_>) {
        r.set_doc_config(json!({"title": "Shop"}));
        r.register(
            "Orders",
            RouteTable::new().route(
                "shop/order",
                RouteOptions::new(Method::GET, "Get order"),
                handler_fn(|_ctx| Box::pin(async { Ok(Reply::Empty) })),
            ),
        );
    }

    #[test]
    fn system_routes_are_registered() {
        let gateway = Gateway::new(GatewayConfig::default());
        let router = gateway.router();

        let version = router.lookup(&Method::GET, "/api/version").unwrap();
        assert!(version.group.is_empty());
        assert!(router.lookup(&Method::PATCH, "/").is_ok());
        assert!(router.lookup(&Method::GET, "/health").is_ok());
        assert!(router.lookup(&Method::GET, "/favicon.ico").is_ok());
    }

    #[test]
    fn mounted_module_gets_normalized_context() {
        let gateway = Gateway::new(GatewayConfig::default()).mount("online-shop", "aOrder", shop);
        let router = gateway.router();

        let layer = &router.layers()["/api/shop/order"];
        assert_eq!(layer.group, "Online Shop");
        assert_eq!(layer.tag, "Order");
        assert_eq!(router.tags()["Order"], "Orders");
        assert_eq!(router.doc_configs()["Online Shop"]["title"], "Shop");
    }
}
