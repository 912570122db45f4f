//! Main entry point for the gateway binary
//!
//! Serves an in-memory [`DocumentHost`] over HTTP and, optionally, the
//! legacy line socket. Accepts `--host`/`--port` so the supervisor can run
//! it as a managed role.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use gateway::{
    serve_legacy_socket, shutdown_signal, spawn_host_thread, DocumentHost, GatewayError, Host, RpcGateway,
    RpcServer,
};
use shared::{component_info, logging, ComponentId};

/// RPC gateway for the host automation bridge
#[derive(Parser, Debug)]
#[command(name = "gateway")]
#[command(about = "Serve host automation calls through a cooperative task queue")]
struct Args {
    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// RPC (HTTP) port
    #[arg(long, default_value = "9875")]
    port: u16,

    /// Also serve the line-oriented legacy socket on this port
    #[arg(long)]
    legacy_port: Option<u16>,

    /// Cooperative tick period in milliseconds
    #[arg(long, default_value = "500")]
    tick_ms: u64,

    /// Shorthand for --log-level debug
    #[arg(long)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Image served for a view, as NAME=PATH (repeatable)
    #[arg(long = "view-image", value_name = "NAME=PATH")]
    view_images: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ComponentId::init_gateway();
    let level = if args.debug { "debug" } else { args.log_level.as_str() };
    logging::init_tracing(Some(level));

    let mut host = DocumentHost::new();
    for spec in &args.view_images {
        let (view, path) = spec
            .split_once('=')
            .with_context(|| format!("--view-image expects NAME=PATH, got {spec}"))?;
        host.load_view_image(view, &PathBuf::from(path))
            .with_context(|| format!("reading view image {path}"))?;
    }

    let interval = Duration::from_millis(args.tick_ms.max(1));
    let (gateway, ticker) = RpcGateway::channel(interval);
    let host_thread = spawn_host_thread(host, ticker, interval)?;

    let rpc_addr = format!("{}:{}", args.host, args.port);
    let rpc_listener = TcpListener::bind(&rpc_addr)
        .await
        .map_err(|e| GatewayError::startup(&rpc_addr, e))?;

    let legacy_listener = match args.legacy_port {
        Some(port) => {
            let addr = format!("{}:{}", args.host, port);
            Some(
                TcpListener::bind(&addr)
                    .await
                    .map_err(|e| GatewayError::startup(&addr, e))?,
            )
        }
        None => None,
    };

    logging::log_startup(
        ComponentId::current(),
        &format!("gateway on {rpc_addr}, tick every {interval:?}"),
    );

    let (stop, stopped) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        logging::log_shutdown(ComponentId::current(), "Received shutdown signal");
        let _ = stop.send(true);
    });

    let legacy = legacy_listener.map(|listener| {
        tokio::spawn(serve_legacy_socket(listener, gateway.clone(), stop_requested(stopped.clone())))
    });

    RpcServer::new(gateway)
        .serve(rpc_listener, stop_requested(stopped))
        .await?;

    if let Some(legacy) = legacy {
        legacy.await??;
    }

    let host = host_thread.shutdown()?;
    component_info!(
        ComponentId::current(),
        "👋 Gateway stopped with {} open documents",
        host.list_documents().len()
    );
    Ok(())
}

async fn stop_requested(mut stopped: watch::Receiver<bool>) {
    // A dropped sender also means stop
    let _ = stopped.wait_for(|stop| *stop).await;
}
