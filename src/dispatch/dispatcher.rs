//! Per-request lifecycle.
//!
//! ```text
//! Routing → BodyDecoding → request hook → Handling → response hook → Responding
//!     any failure ──────────────────────────────────→ ErrorMapping → Responding
//! ```
//!
//! Every error is caught once here and written as a status-200 JSON
//! envelope. The only request that gets no response at all is one whose
//! connection was destroyed while reading the body.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, Response, StatusCode};
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use hyper::body::Body as HttpBody;
use serde_json::Value;

use crate::body::{decode, BodyReader};
use crate::context::{DisabledSessionCodec, RequestContext, SessionCodec};
use crate::dispatch::interceptor::{Interceptor, NoopInterceptor};
use crate::error::{ErrorEnvelope, GatewayError};
use crate::http::request::content_length;
use crate::http::response::into_response;
use crate::net::ConnectionHandle;
use crate::observability::{metrics, ACCESS_LOG_TARGET};
use crate::routing::{BoxedHandler, Reply, Router};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Runs requests through routing, body decoding, hooks and the handler.
pub struct Dispatcher {
    router: Arc<Router>,
    reader: BodyReader,
    handler_timeout: Option<Duration>,
    interceptor: Arc<dyn Interceptor>,
    session_codec: Arc<dyn SessionCodec>,
}

impl Dispatcher {
    pub fn new(router: Arc<Router>, reader: BodyReader) -> Self {
        Self {
            router,
            reader,
            handler_timeout: None,
            interceptor: Arc::new(NoopInterceptor),
            session_codec: Arc::new(DisabledSessionCodec),
        }
    }

    /// Abort handlers that run longer than `timeout`. Off by default.
    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = interceptor;
        self
    }

    pub fn with_session_codec(mut self, codec: Arc<dyn SessionCodec>) -> Self {
        self.session_codec = codec;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Serve one request.
    ///
    /// Returns `None` when the connection was destroyed and nothing may be
    /// written to it.
    pub async fn dispatch<B>(
        &self,
        req: Request<B>,
        conn: &ConnectionHandle,
        peer_addr: Option<SocketAddr>,
    ) -> Option<Response<Body>>
    where
        B: HttpBody,
        B::Error: Into<BoxError>,
    {
        let (head, body) = req.into_parts();
        let declared = content_length(&head.headers);
        let mut ctx = RequestContext::new(head, peer_addr, Arc::clone(&self.session_codec));

        let code = match self.run(&mut ctx, body, declared, conn).await {
            Ok(()) => None,
            Err(err) => Some(self.map_error(&mut ctx, err).await),
        };
        metrics::record_request(
            ctx.method().as_str(),
            code.as_deref().unwrap_or("ok"),
            ctx.runtime.start_at,
        );

        if conn.is_destroyed() {
            tracing::debug!(
                connection_id = %conn.id(),
                method = %ctx.method(),
                url = %ctx.url(),
                "Connection destroyed, dropping response"
            );
            return None;
        }

        if !ctx.response.respond {
            return Some(
                ctx.response
                    .custom
                    .take()
                    .unwrap_or_else(|| Response::new(Body::empty())),
            );
        }

        let method = ctx.method().clone();
        let url = ctx.url().to_string();
        let response = into_response(std::mem::take(&mut ctx.response));

        if ctx.runtime.access_log {
            let elapsed_ms = ctx.runtime.start_at.elapsed().as_secs_f64() * 1000.0;
            tracing::info!(
                target: ACCESS_LOG_TARGET,
                method = %method,
                url = %url,
                elapsed_ms,
                request_id = ctx.runtime.request_id.as_deref().unwrap_or("-"),
                "[{method}] {url} - {elapsed_ms:.3}ms"
            );
        }
        Some(response)
    }

    async fn run<B>(
        &self,
        ctx: &mut RequestContext,
        body: B,
        declared: Option<u64>,
        conn: &ConnectionHandle,
    ) -> Result<(), GatewayError>
    where
        B: HttpBody,
        B::Error: Into<BoxError>,
    {
        let matched = self.router.lookup(ctx.method(), ctx.url())?;

        let raw = self.reader.read(body, declared, conn).await?;
        let decoded = decode(&raw, ctx.header(CONTENT_TYPE.as_str()))?;

        ctx.request.raw_body = raw;
        ctx.request.body = decoded.body;
        ctx.request.files = decoded.files;
        ctx.request.path = matched.params.path;
        ctx.request.query = matched.params.query;
        if matched.group.is_empty() {
            ctx.runtime.access_log = false;
        }

        let interceptor = &self.interceptor;
        let hooked = &mut *ctx;
        contained(move || interceptor.request(hooked)).await?;

        let reply = self.invoke(&matched.handler, ctx).await?;
        let (hooked, current) = (&mut *ctx, &reply);
        let replaced = contained(move || interceptor.response(hooked, current)).await?;
        let reply = replaced.unwrap_or(reply);

        match reply {
            Reply::Json(value) => ctx.json(&value),
            Reply::Html(content) => ctx.html(content),
            Reply::Empty if ctx.response.respond => ctx.html(""),
            Reply::Empty => {}
        }
        Ok(())
    }

    async fn invoke(
        &self,
        handler: &BoxedHandler,
        ctx: &mut RequestContext,
    ) -> Result<Reply, GatewayError> {
        let call = contained(move || handler.call(ctx));
        match self.handler_timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| GatewayError::HandlerTimeout(timeout.as_millis() as u64))?,
            None => call.await,
        }
    }

    /// Log, envelope and write `err`. Returns the envelope code.
    async fn map_error(&self, ctx: &mut RequestContext, err: GatewayError) -> String {
        let envelope = ErrorEnvelope::from(&err);
        let code = envelope.error.code.clone();

        if !err.is_silent() {
            tracing::error!(code = %code, error = %err, "Request failed");
        }
        if err.is_body_error() {
            metrics::record_body_rejected(&code);
        }

        let interceptor = &self.interceptor;
        let replaced = AssertUnwindSafe(future::lazy(|_| interceptor.response_error(&envelope, &err)).flatten())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                tracing::error!(panic = %panic_message(panic.as_ref()), "Error interceptor panicked");
                None
            });
        let value = replaced.unwrap_or_else(|| envelope.to_value());
        ctx.response.status = StatusCode::OK;
        ctx.json(&value);

        let body = Value::Object(ctx.request.body.clone());
        tracing::warn!(
            method = %ctx.method(),
            url = %ctx.url(),
            body = %body,
            "# request"
        );
        tracing::warn!(response = %value, "# response");
        code
    }
}

/// Run a hook so that a panic anywhere in it, including the synchronous
/// part that builds the future, becomes `Gateway.HandlerError`.
async fn contained<'a, T, F>(hook: F) -> Result<T, GatewayError>
where
    F: FnOnce() -> BoxFuture<'a, Result<T, GatewayError>>,
{
    AssertUnwindSafe(future::lazy(|_| hook()).flatten())
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(GatewayError::HandlerError(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::routing::{handler_fn, MethodFilter, RegistrationContext, RouteOptions};
    use axum::http::header::CACHE_CONTROL;
    use axum::http::Method;
    use bytes::Bytes;
    use futures_util::future::BoxFuture;
    use futures_util::stream;
    use http_body_util::{Full, StreamBody};
    use hyper::body::Frame;
    use serde_json::json;

    fn group() -> RegistrationContext {
        RegistrationContext::new("Debug", "Test")
    }

    fn router() -> Router {
        let mut router = Router::new("/api/");
        router.on(
            &group(),
            Method::POST.into(),
            "/api/echo/*",
            handler_fn(|ctx| {
                Box::pin(async move {
                    Ok(json!({
                        "path": ctx.request.path,
                        "query": ctx.request.query,
                        "body": ctx.request.body,
                        "files": ctx.request.files.len(),
                    })
                    .into())
                })
            }),
            RouteOptions::default(),
        );
        router.on(
            &group(),
            Method::GET.into(),
            "/api/page",
            handler_fn(|_ctx| Box::pin(async { Ok(Reply::html("<h1>page</h1>")) })),
            RouteOptions::default(),
        );
        router.on(
            &group(),
            MethodFilter::Any,
            "/api/fail",
            handler_fn(|ctx| {
                Box::pin(async move {
                    match ctx.get_str("kind").as_deref() {
                        Some("context") => Err(GatewayError::context("Token", "bad token")),
                        Some("panic") => panic!("handler exploded"),
                        _ => Err(GatewayError::coded("Order.Closed", "order closed").silent()),
                    }
                })
            }),
            RouteOptions::default(),
        );
        router.on(
            &group(),
            Method::GET.into(),
            "/api/eager",
            handler_fn(|ctx| {
                if ctx.get_str("now").is_some() {
                    panic!("panicked before the future");
                }
                Box::pin(async { Ok(Reply::Empty) })
            }),
            RouteOptions::default(),
        );
        router.on(
            &group(),
            Method::GET.into(),
            "/api/slow",
            handler_fn(|_ctx| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Reply::Empty)
                })
            }),
            RouteOptions::default(),
        );
        router.on(
            &group(),
            Method::GET.into(),
            "/api/custom",
            handler_fn(|ctx| {
                Box::pin(async move {
                    ctx.custom((StatusCode::IM_A_TEAPOT, "short and stout"));
                    Ok(Reply::Empty)
                })
            }),
            RouteOptions::default(),
        );
        router
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(router()), BodyReader::new(64))
    }

    fn request(method: Method, uri: &str, content_type: Option<&str>, body: &'static str) -> Request<Full<Bytes>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-length", body.len());
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap()
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn json_reply_gets_params_and_headers() {
        let conn = ConnectionHandle::detached();
        let req = request(
            Method::POST,
            "/api/echo/Item-7?x=1",
            Some("application/json"),
            r#"{"name":"gw"}"#,
        );
        let response = dispatcher().dispatch(req, &conn, None).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json; charset=utf-8");
        assert_eq!(response.headers()[CACHE_CONTROL], "no-cache");
        assert_eq!(
            json_body(response).await,
            json!({"path": ["Item-7"], "query": {"x": "1"}, "body": {"name": "gw"}, "files": 0})
        );
    }

    #[tokio::test]
    async fn string_reply_is_html() {
        let conn = ConnectionHandle::detached();
        let response = dispatcher()
            .dispatch(request(Method::GET, "/api/page", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
    }

    #[tokio::test]
    async fn routing_failures_do_not_read_the_body() {
        let conn = ConnectionHandle::detached();
        let never = StreamBody::new(stream::pending::<Result<Frame<Bytes>, io::Error>>());
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/nowhere")
            .header("content-length", "10")
            .body(never)
            .unwrap();

        let response = tokio::time::timeout(Duration::from_secs(1), dispatcher().dispatch(req, &conn, None))
            .await
            .expect("routing failure must not wait for the body")
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["error"]["code"], "Gateway.NotFound");

        let response = dispatcher()
            .dispatch(request(Method::DELETE, "/api/page", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(json_body(response).await["error"]["code"], "Gateway.MethodNotAllowed");
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error() {
        let conn = ConnectionHandle::detached();
        let req = request(Method::POST, "/api/echo/x", Some("application/json"), "{oops");
        let response = dispatcher().dispatch(req, &conn, None).await.unwrap();
        assert_eq!(
            json_body(response).await["error"]["code"],
            "Gateway.BodyDataParseError"
        );
    }

    #[tokio::test]
    async fn oversized_declaration_destroys_without_calling_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut router = Router::new("/api/");
        router.on(
            &group(),
            Method::POST.into(),
            "/api/upload",
            handler_fn(move |_ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Ok(Reply::Empty) })
            }),
            RouteOptions::default(),
        );
        let dispatcher = Dispatcher::new(Arc::new(router), BodyReader::new(64));

        let conn = ConnectionHandle::detached();
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/upload")
            .header("content-length", "1000")
            .body(Full::new(Bytes::from_static(b"x")))
            .unwrap();

        assert!(dispatcher.dispatch(req, &conn, None).await.is_none());
        assert!(conn.is_destroyed());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_errors_are_coded() {
        let conn = ConnectionHandle::detached();
        let cases = [
            ("/api/fail", "Order.Closed"),
            ("/api/fail?kind=context", "Context.Error.Token"),
            ("/api/fail?kind=panic", "Gateway.HandlerError"),
        ];
        for (uri, code) in cases {
            let response = dispatcher()
                .dispatch(request(Method::GET, uri, None, ""), &conn, None)
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            assert_eq!(body["error"]["code"], code, "{uri}");
        }
    }

    #[tokio::test]
    async fn panic_message_is_reported() {
        let conn = ConnectionHandle::detached();
        let response = dispatcher()
            .dispatch(request(Method::GET, "/api/fail?kind=panic", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(json_body(response).await["error"]["message"], "handler exploded");
    }

    #[tokio::test]
    async fn panic_while_building_future_is_contained() {
        let conn = ConnectionHandle::detached();
        let response = dispatcher()
            .dispatch(request(Method::GET, "/api/eager?now=1", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"error": {"code": "Gateway.HandlerError", "message": "panicked before the future"}})
        );
    }

    #[tokio::test]
    async fn empty_reply_is_empty_html() {
        let conn = ConnectionHandle::detached();
        let response = dispatcher()
            .dispatch(request(Method::GET, "/api/eager", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn handler_timeout_is_opt_in() {
        let conn = ConnectionHandle::detached();
        let dispatcher = dispatcher().with_handler_timeout(Some(Duration::from_millis(100)));
        let response = dispatcher
            .dispatch(request(Method::GET, "/api/slow", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(json_body(response).await["error"]["code"], "Gateway.HandlerTimeout");
    }

    #[tokio::test]
    async fn custom_response_passes_through() {
        let conn = ConnectionHandle::detached();
        let response = dispatcher()
            .dispatch(request(Method::GET, "/api/custom", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert!(response.headers().get(CACHE_CONTROL).is_none());
    }

    struct Guard;

    impl Interceptor for Guard {
        fn request<'a>(&'a self, ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), GatewayError>> {
            Box::pin(async move {
                if ctx.header("x-deny").is_some() {
                    return Err(GatewayError::coded("Auth.Denied", "denied"));
                }
                Ok(())
            })
        }

        fn response<'a>(
            &'a self,
            _ctx: &'a mut RequestContext,
            reply: &'a Reply,
        ) -> BoxFuture<'a, Result<Option<Reply>, GatewayError>> {
            Box::pin(async move {
                Ok(match reply {
                    Reply::Json(value) => Some(Reply::Json(json!({ "result": value }))),
                    _ => None,
                })
            })
        }

        fn response_error<'a>(
            &'a self,
            envelope: &'a ErrorEnvelope,
            _error: &'a GatewayError,
        ) -> BoxFuture<'a, Option<Value>> {
            Box::pin(async move { Some(json!({ "failed": envelope.error.code })) })
        }
    }

    #[tokio::test]
    async fn interceptors_wrap_handler() {
        let conn = ConnectionHandle::detached();
        let dispatcher = dispatcher().with_interceptor(Arc::new(Guard));

        let response = dispatcher
            .dispatch(request(Method::POST, "/api/echo/a", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(json_body(response).await["result"]["path"], json!(["a"]));

        let mut req = request(Method::POST, "/api/echo/a", None, "");
        req.headers_mut().insert("x-deny", "1".parse().unwrap());
        let response = dispatcher.dispatch(req, &conn, None).await.unwrap();
        assert_eq!(json_body(response).await, json!({"failed": "Auth.Denied"}));
    }

    struct Faulty;

    impl Interceptor for Faulty {
        fn request<'a>(&'a self, _ctx: &'a mut RequestContext) -> BoxFuture<'a, Result<(), GatewayError>> {
            panic!("interceptor fault")
        }

        fn response_error<'a>(
            &'a self,
            _envelope: &'a ErrorEnvelope,
            _error: &'a GatewayError,
        ) -> BoxFuture<'a, Option<Value>> {
            panic!("error hook fault")
        }
    }

    #[tokio::test]
    async fn panicking_interceptor_still_gets_an_envelope() {
        let conn = ConnectionHandle::detached();
        let dispatcher = dispatcher().with_interceptor(Arc::new(Faulty));
        let response = dispatcher
            .dispatch(request(Method::GET, "/api/page", None, ""), &conn, None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"error": {"code": "Gateway.HandlerError", "message": "interceptor fault"}})
        );
    }
}
