//! Tether Worker Binary
//!
//! Serves the demonstration object over stdin/stdout until the parent
//! releases it or hangs up.

use anyhow::Result;
use tether::{Exposer, StreamEndpoint};
use tracing::info;

use tether_worker::demo;

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries frames, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tether worker");

    let endpoint = StreamEndpoint::stdio();
    let exposure = Exposer::new(demo::root()).expose(endpoint.clone());

    endpoint.closed().await;
    if exposure.is_released() {
        info!("Root released by parent");
    } else {
        info!("Parent hung up");
    }

    endpoint.shutdown().await;
    info!("Worker shutting down");

    // The blocking stdin read cannot be cancelled; leave without waiting for it
    std::process::exit(0)
}
