//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the clinic REST API on its own, without the workspace's `clinic-run` wrapper.
//!
//! ## Intended use
//! Useful for development and debugging against a local store. The schema must already be
//! migrated (`clinic migrate`); the server only verifies it.

use api_rest::{router, AppState};
use clinic_core::config::{busy_timeout_from_env_value, database_path_from_env_value};
use clinic_core::{ClinicService, CoreConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the clinic REST API server
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CLINIC_DB_PATH`: SQLite database file (default: "clinic.db")
/// - `CLINIC_BUSY_TIMEOUT_MS`: Lock wait bound in milliseconds (default: 5000)
/// - `API_KEY`: Key every request must send in `x-api-key`
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid or `API_KEY` is unset,
/// - the store is not at the expected schema version,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("clinic_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("CLINIC_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::new(
        database_path_from_env_value(std::env::var("CLINIC_DB_PATH").ok()),
        busy_timeout_from_env_value(std::env::var("CLINIC_BUSY_TIMEOUT_MS").ok())?,
    )?);
    let api_key = std::env::var("API_KEY")
        .map_err(|_| anyhow::anyhow!("API_KEY must be set for the REST server"))?;

    let service = ClinicService::new(cfg.clone());
    service.database().verify_schema()?;

    tracing::info!(
        "-- Starting clinic REST API on {} (store {})",
        addr,
        cfg.database_path().display()
    );

    let app = router(AppState::new(service, api_key));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
