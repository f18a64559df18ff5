//! Gateway runtime binary.
//!
//! ```text
//! CLI + config file
//!     → logging / metrics
//!     → Gateway (system routes + route modules)
//!     → Listener (bounded accept)
//!     → GatewayServer::run until SIGINT/SIGTERM
//! ```

use std::path::PathBuf;

use axum::http::Method;
use clap::Parser;
use serde_json::json;

use gateway_runtime::config::{load_config, GatewayConfig};
use gateway_runtime::lifecycle::{wait_for_signal, Shutdown};
use gateway_runtime::net::Listener;
use gateway_runtime::observability::{init_logging, metrics};
use gateway_runtime::routing::MethodFilter;
use gateway_runtime::{handler_fn, Gateway, Registrar, Reply, RouteOptions, RouteTable};

#[derive(Debug, Parser)]
#[command(name = "gateway-runtime", version, about = "Minimal HTTP gateway runtime")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(short, long, env = "GATEWAY_PORT")]
    port: Option<u16>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

/// Debug routes: a greeting and an echo of everything the gateway decoded.
fn debug_routes(r: &mut Registrar<'_>) {
    r.register(
        "Debug",
        RouteTable::new()
            .route(
                "debug/hello",
                RouteOptions::new(Method::GET, "Say hello").param(json!({"name": "who to greet"})),
                handler_fn(|ctx| {
                    Box::pin(async move {
                        let name = ctx.get_str("name").unwrap_or_else(|| "world".to_string());
                        Ok(json!({ "hello": name }).into())
                    })
                }),
            )
            .route(
                "debug/echo/*",
                RouteOptions::new(MethodFilter::Any, "Echo request")
                    .description("Returns path params, query, body and uploaded files"),
                handler_fn(|ctx| {
                    Box::pin(async move {
                        let files: Vec<_> = ctx
                            .request
                            .files
                            .iter()
                            .map(|f| {
                                json!({
                                    "field": f.field_name,
                                    "filename": f.filename,
                                    "mime_type": f.mime_type,
                                    "size": f.data.len(),
                                })
                            })
                            .collect();
                        Ok(Reply::Json(json!({
                            "path": ctx.request.path,
                            "query": ctx.request.query,
                            "body": ctx.request.body,
                            "files": files,
                            "ip": ctx.real_ip(),
                        })))
                    })
                }),
            ),
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.override_port(port);
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gateway-runtime starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = Gateway::new(config)
        .mount("debug", "aDebug", debug_routes)
        .into_server();

    let shutdown = Shutdown::new();
    let stop = shutdown.subscribe();
    tokio::spawn(wait_for_signal(shutdown));

    server.run(listener, stop).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
