use anyhow::Result;
use clap::Parser;

use logwarden_core::config::LogwardenConfig;
use logwarden_daemon::cli::DaemonCli;
use logwarden_daemon::logging;
use logwarden_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = LogwardenConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    if cli.validate {
        print!("{}", toml::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %cli.config.display(),
        monitors = config.monitors.len(),
        "logwarden-daemon starting"
    );
    tracing::debug!(config = ?config.redacted(), "effective configuration");

    let orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await
}
