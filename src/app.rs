use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::domain::error::Result;
use crate::infrastructure::bootstrap::build_state;
use crate::infrastructure::config::AppConfig;
use crate::interfaces::http::start_server;

pub async fn run() -> Result<()> {
    let config = AppConfig::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let state = build_state(&config).await?;

    let server = start_server(state, &config.server).map_err(|err| {
        error!(
            error = %err,
            host = %config.server.host,
            port = config.server.port,
            "Failed to start HTTP server"
        );
        err
    })?;
    server.await?;

    info!("HTTP server stopped");
    Ok(())
}
