//! Quill Gateway - Main entry point.

use anyhow::Result;
use quill_common::config::Config;
use quill_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // File first, then QUILL_* / provider key overrides
    let config = Config::load_with_env()?;

    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("Quill Gateway v{}", env!("CARGO_PKG_VERSION"));

    quill_gateway::start_server(&config).await
}
