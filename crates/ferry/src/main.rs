//! Ferry server binary: echo application over the protocol engine.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use ferry_core::config::EngineConfig;
use ferry_server::engine::Engine;
use ferry_server::handler::EchoHandler;
use ferry_server::{metrics, routes, scheduler};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Persistent bidirectional messaging over HTTP and WebSocket.
#[derive(Parser, Debug)]
#[command(name = "ferry", version)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:8081")]
    listen: SocketAddr,

    /// Heartbeat period in milliseconds.
    #[arg(long, default_value_t = 25_000)]
    heartbeat_interval_ms: u64,

    /// Idle timeout before a receiver-less session is closed, in
    /// milliseconds.
    #[arg(long, default_value_t = 5_000)]
    idle_timeout_ms: u64,

    /// Streaming response limit in bytes.
    #[arg(long, default_value_t = 128 * 1024)]
    streaming_response_limit: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = EngineConfig {
        heartbeat_interval_ms: args.heartbeat_interval_ms,
        idle_timeout_ms: args.idle_timeout_ms,
        streaming_response_limit: args.streaming_response_limit,
        ..EngineConfig::default()
    };

    let prometheus = metrics::install_recorder();
    let engine = Engine::new(config, Arc::new(EchoHandler));
    let _sweeps = scheduler::spawn(engine.clone());

    let app = Router::new()
        .route(
            "/metrics",
            get(move || {
                let handle = prometheus.clone();
                async move { metrics::render(&handle) }
            }),
        )
        .merge(routes::router(engine));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(addr = %args.listen, "ferry listening");
    axum::serve(listener, app)
        .await
        .context("server terminated")?;
    Ok(())
}
