mod config;
mod error;
mod http_server;
mod node;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use config::{Args, NodeConfig};
use node::Node;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config = NodeConfig::load(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&config.log_level))
        .init();

    tracing::info!(node_id = config.node_id, db_path = %config.db_path.display(), "booting node");

    let node = Arc::new(Node::start(config).await?);

    spawn_snapshot_timer(node.clone());

    let addr = std::net::SocketAddr::new(
        node.config.http_server_address.parse()?,
        node.config.http_server_port,
    );
    let app = http_server::router(node.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http surface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down, taking a best-effort final snapshot");
    if let Err(err) = node.take_snapshot() {
        tracing::error!(%err, "final snapshot failed");
    }

    Ok(())
}

/// Periodic snapshot timer, modeled as a cooperative task rather than a
/// detached unkillable thread: it simply stops being polled once the
/// owning `Arc<Node>` drops and nothing else holds the runtime open.
fn spawn_snapshot_timer(node: Arc<Node>) {
    let interval = Duration::from_secs(node.config.snapshot_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = node.take_snapshot() {
                tracing::error!(%err, "periodic snapshot failed");
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
