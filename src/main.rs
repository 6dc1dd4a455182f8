//! Numismatics API server
//!
//! Serves the collection database over HTTP: sortable JSON listings and
//! streamed CSV exports behind Basic authentication.

use anyhow::Result;
use numismatics::config::AppConfig;
use numismatics::server::ServerBuilder;
use numismatics::storage::postgres::{self, PostgresIdentityProvider, PostgresStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;
    let resources = config.load_resources()?;

    tracing::info!(
        resources = resources.resources.len(),
        export_buffer = config.export_buffer,
        statement_timeout_secs = config.statement_timeout_secs,
        "configuration loaded"
    );

    let pool = postgres::connect(&config).await?;
    tracing::info!("connected to the collection database");

    ServerBuilder::new()
        .with_resources(resources)
        .with_store(PostgresStore::new(pool.clone(), config.export_buffer))
        .with_identity_provider(PostgresIdentityProvider::new(pool))
        .serve(config.bind_addr)
        .await
}
