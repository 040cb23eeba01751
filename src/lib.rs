pub mod api;
pub mod config;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export pipeline types
pub use logic::{
    ActionHandler, AtomicOutcome, AtomicPipeline, ExecutionMode, HandlerError, HandlerRegistry,
    ResourceHandler, SchemaHandler,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{MemoryStore, PostgresStore, ResourceStore, StoreTransaction};

use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};

/// Router serving the atomic operations endpoint on top of `store`.
pub fn build_app<S: ResourceStore + 'static>(
    store: Arc<S>,
    registry: HandlerRegistry,
    config: &AppConfig,
) -> axum::Router {
    let pipeline = AtomicPipeline::new(store, Arc::new(registry), config.executor.mode);
    routes::create_router::<S>(config.server.max_body_bytes).with_state(Arc::new(pipeline))
}

/// Connects the configured store backend and serves until shutdown.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    use anyhow::Context;

    let load_seed = std::env::var("LOAD_SEED_DATA").unwrap_or_default() == "true";

    let app = match config.store.backend {
        StoreBackend::Memory => {
            log::info!("Using in-memory store");
            let store = Arc::new(MemoryStore::new());
            if load_seed {
                seed::load_seed_data(&*store).await?;
            }
            build_app(store, seed::demo_registry(), &config)
        }
        StoreBackend::Postgres => {
            log::info!("Connecting to PostgreSQL...");
            let database_url = config.database_url()?;
            let store = PostgresStore::new(&database_url, config.max_connections())
                .await
                .context("failed to connect to PostgreSQL")?;
            store.migrate().await.context("failed to run migrations")?;
            let store = Arc::new(store);
            if load_seed {
                seed::load_seed_data(&*store).await?;
            }
            build_app(store, seed::demo_registry(), &config)
        }
    };

    let bind_address = config.server_address();
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;
    log::info!(
        "Atomic operations server running on http://{} ({:?} mode)",
        bind_address,
        config.executor.mode
    );

    axum::serve(listener, app).await?;

    Ok(())
}
