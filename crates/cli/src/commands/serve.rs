use super::{bootstrap, log_config_sources, Startup};
use anyhow::Context;
use std::net::SocketAddr;
use strata_core::{AppConfig, AppConfigTrait, ConfigSource};
use strata_http::{build_router, start_server};

/// Serve `POST /internal/migrations` until Ctrl+C or SIGTERM
pub async fn run(mut config: AppConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut sources = config.config_sources();
    if let Some(host) = host {
        config.host = host;
        sources.insert("host".to_string(), ConfigSource::Flag("--host".to_string()));
    }
    if let Some(port) = port {
        config.port = port;
        sources.insert("port".to_string(), ConfigSource::Flag("--port".to_string()));
    }
    log_config_sources(&sources);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_address()))?;

    let orchestrator = bootstrap(&config, Startup::Initialize).await?;
    tracing::info!(
        target_index = orchestrator.catalog().target_index(),
        "Starting migration service on {}",
        addr
    );

    start_server(addr, build_router(orchestrator)).await?;
    Ok(())
}
