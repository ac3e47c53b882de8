//! Operations Platform RBAC API Server

use opsplatform_rbac::{EngineConfig, InMemoryStore, RbacEngine, RbacStore};
use opsplatform_rbac_api::{build_router, ApiConfig, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},opsplatform_rbac=debug", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store = open_store(&config).await?;
    let engine = Arc::new(RbacEngine::new(EngineConfig::from_env(), store).await?);

    let app = build_router(AppState::new(engine));
    let bind_addr = config.bind_address();

    tracing::info!("RBAC API server listening on http://{}", bind_addr);
    tracing::info!("OpenAPI document: http://{}/api-docs/openapi.json", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn open_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn RbacStore>> {
    match &config.database_url {
        Some(url) => {
            let store = opsplatform_rbac::PostgresStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("Using PostgreSQL store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_store(config: &ApiConfig) -> anyhow::Result<Arc<dyn RbacStore>> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL ignored: built without the postgres feature");
    }
    Ok(Arc::new(InMemoryStore::new()))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
