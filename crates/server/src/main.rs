//! shellcache entry point.
//!
//! Boots the worker for the configured build version and serves the HTTP
//! front. Logs go to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use shellcache_client::{FetchClient, FetchConfig, Network};
use shellcache_core::{AppConfig, CacheDb, Scope};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod worker;

use worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    let scope = Scope::from_config(&config)?;
    let db = CacheDb::open(&config.db_path).await?;
    let network: Arc<dyn Network> = Arc::new(FetchClient::new(FetchConfig::from(&config))?);

    tracing::info!(
        version = %config.version,
        scope = %scope.root,
        db_path = %config.db_path.display(),
        "starting shellcache"
    );

    let worker = Arc::new(Worker::new(db, network, scope, config.version.clone()));
    worker.restore().await?;

    let mut states = worker.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::info!(%state, "worker state changed");
        }
    });

    let lifecycle = Arc::clone(&worker);
    tokio::spawn(async move {
        match lifecycle.run_lifecycle().await {
            Ok(Some(report)) => tracing::info!(
                version = %report.version,
                assets = report.manifest.len(),
                precached = report.precached,
                "worker ready"
            ),
            Ok(None) => tracing::info!(version = lifecycle.version(), "worker ready"),
            Err(e) => tracing::error!(
                version = lifecycle.version(),
                error = %e,
                "install failed, previous version keeps serving"
            ),
        }
    });

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "listening");

    axum::serve(listener, handler::router(worker)).await?;

    Ok(())
}
