//! Saga Gateway - Main entry point.

use anyhow::Result;
use saga_common::config::Config;
use saga_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    let config = Config::load_with_env()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Saga Gateway v{}", env!("CARGO_PKG_VERSION"));

    saga_gateway::start_server(&config).await
}
