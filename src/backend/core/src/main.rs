//! Bastion Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use bastion_core::{
    api::{self, AppState},
    config::{Config, StoreBackend},
    db::Database,
    observability::{self, metrics},
    store::{AdminStore, InMemoryStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    observability::init("bastion-server", &config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.database.backend,
        "Starting Bastion Server"
    );

    let store: Arc<dyn AdminStore> = match config.database.backend {
        StoreBackend::Postgres => {
            let db = Database::new(&config.database).await?;
            tracing::info!("Connected to database");
            if config.database.run_migrations {
                db.migrate().await?;
                tracing::info!("Database migrations applied");
            }
            Arc::new(db)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on shutdown");
            Arc::new(InMemoryStore::new())
        }
    };

    let mut app_state = AppState::new(store, config.auth.session_cookie.clone());
    if config.observability.prometheus_enabled {
        app_state = app_state.with_metrics(metrics::install_prometheus_recorder()?);
    }

    let app = api::build_router(app_state);

    let addr: SocketAddr = config.bind_address().parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    observability::shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
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
