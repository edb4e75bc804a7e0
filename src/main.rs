use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::{AppState, router};
use clinic_core::config::{busy_timeout_from_env_value, database_path_from_env_value};
use clinic_core::{ClinicService, CoreConfig};

/// Main entry point for the clinic application
///
/// Resolves configuration once, checks the store's schema version and serves the REST API.
/// Every request must carry the `API_KEY` value in the `x-api-key` header and a role in
/// `x-clinic-role`.
///
/// # Environment Variables
/// - `CLINIC_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `CLINIC_DB_PATH`: SQLite database file (default: "clinic.db")
/// - `CLINIC_BUSY_TIMEOUT_MS`: Lock wait bound in milliseconds (default: 5000)
/// - `API_KEY`: API key for REST authentication
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, schema verification or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("clinic=info".parse()?)
                .add_directive("clinic_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("CLINIC_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = Arc::new(CoreConfig::new(
        database_path_from_env_value(std::env::var("CLINIC_DB_PATH").ok()),
        busy_timeout_from_env_value(std::env::var("CLINIC_BUSY_TIMEOUT_MS").ok())?,
    )?);
    let api_key = std::env::var("API_KEY")
        .map_err(|_| anyhow::anyhow!("API_KEY must be set"))?;

    let service = ClinicService::new(cfg.clone());
    if let Err(e) = service.database().verify_schema() {
        tracing::error!("Store at {} is not ready: {}", cfg.database_path().display(), e);
        return Err(e.into());
    }

    tracing::info!("++ Starting clinic REST on {}", rest_addr);

    let app = router(AppState::new(service, api_key));
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
