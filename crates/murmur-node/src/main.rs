//! Murmur Node - real-time messaging backend.
//!
//! This is the main entry point for running a Murmur server.

use anyhow::Context;
use clap::Parser;
use murmur_node::api::{create_router, AppState};
use murmur_node::config::{Args, NodeConfig, StorageConfig};
use murmur_node::observability::init_logging;
use murmur_storage::{MemoryStore, MessageStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = NodeConfig::from_args(&args)?;

    init_logging(&config.log_level, config.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Murmur node");
    tracing::info!(
        listen_addr = %config.listen_addr,
        storage = ?args.storage,
        outbound_capacity = config.hub.outbound_capacity,
        max_frame_size = config.connection.max_frame_size,
        pong_wait_secs = config.connection.pong_wait.as_secs(),
        "Node configuration"
    );

    let backend = open_store(&config.storage).await?;
    let state = AppState::new(backend.store(), config.hub.clone(), config.connection.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(addr = %config.listen_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    backend.close().await;
    tracing::info!("Murmur node stopped");

    Ok(())
}

/// The opened message store, kept so it can be shut down cleanly.
enum Backend {
    Memory(Arc<MemoryStore>),
    #[cfg(feature = "postgres")]
    Postgres(Arc<murmur_storage::PostgresStore>),
}

impl Backend {
    fn store(&self) -> Arc<dyn MessageStore> {
        match self {
            Backend::Memory(store) => store.clone(),
            #[cfg(feature = "postgres")]
            Backend::Postgres(store) => store.clone(),
        }
    }

    async fn close(&self) {
        match self {
            Backend::Memory(_) => {}
            #[cfg(feature = "postgres")]
            Backend::Postgres(store) => store.close().await,
        }
    }
}

async fn open_store(storage: &StorageConfig) -> anyhow::Result<Backend> {
    match storage {
        StorageConfig::Memory => {
            tracing::info!("Using in-memory message store");
            Ok(Backend::Memory(Arc::new(MemoryStore::new())))
        }
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres { url } => {
            let store = murmur_storage::PostgresStore::connect(
                url,
                &murmur_storage::PostgresOptions::default(),
            )
            .await
            .context("failed to connect to PostgreSQL")?;
            Ok(Backend::Postgres(Arc::new(store)))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => {
            anyhow::bail!("postgres storage requires the `postgres` feature")
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
