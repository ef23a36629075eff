use crate::config::{AppConfig, ConfigError, StoreBackend};
use crate::core::AppState;
use db::services::{
    clock::SystemClock,
    notifier::LogNotifier,
    otp::OtpService,
    pg_store::PgOtpStore,
    store::{MemoryOtpStore, OtpStore},
};
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// Declare the modules we created.
mod api;
mod app;
mod config;
mod core;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from a .env file.
    dotenv().ok();
    // Use a JSON logger for production-ready structured logging
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Configuration ---
    let app_config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    // --- OTP Store ---
    let store = build_store(&app_config).await?;

    // --- Shared Application State (for Axum) ---
    let otp = OtpService::new(
        store,
        Arc::new(LogNotifier::new(app_config.log_codes)),
        Arc::new(SystemClock),
        app_config.policy,
    );
    let app_state = AppState { otp: otp.clone() };

    // Background cleanup task
    if app_config.sweep_interval_secs > 0 {
        let period = Duration::from_secs(app_config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match otp.purge_expired().await {
                    Ok(deleted) if deleted > 0 => {
                        info!("Cleanup: deleted {} expired OTP records", deleted)
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Cleanup failed: {}", e),
                }
            }
        });
    } else {
        info!("Expiry sweep disabled; expired codes are removed only when presented.");
    }

    // --- Start HTTP Server ---
    // Bind to 0.0.0.0 to be reachable in a container
    let addr = SocketAddr::from(([0, 0, 0, 0], app_config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("HTTP Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            return Err(e.into());
        }
    };

    let server =
        axum::serve(listener, app::router(app_state)).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        error!("Server error: {}", e);
    }

    info!("Server stopped.");
    Ok(())
}

async fn build_store(
    app_config: &AppConfig,
) -> Result<Arc<dyn OtpStore>, Box<dyn std::error::Error>> {
    match app_config.store {
        StoreBackend::Memory => {
            warn!("Using the in-memory OTP store; codes are lost on restart.");
            Ok(Arc::new(MemoryOtpStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = app_config
                .database_url
                .as_deref()
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            let pool =
                match db::init_pool(database_url, app_config.database_max_connections).await {
                    Ok(pool) => pool,
                    Err(e) => {
                        error!("Failed to create database pool: {}", e);
                        return Err(e.into());
                    }
                };
            db::run_migrations(pool).await?;
            Ok(Arc::new(PgOtpStore::new(pool.clone())))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
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
                error!("Failed to listen for SIGTERM: {}", e);
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
    info!("Shutdown signal received.");
}
