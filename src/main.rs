//! Hearth Gateway - sharded Discord client process using Twilight
//!
//! - Loads configuration, writing a template on first run
//! - Connects the shard range this process owns
//! - Loads modules from the module directory
//! - Exposes health/ready/metrics endpoints
//! - Shuts down in reverse on SIGINT/SIGTERM

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use hearth_gateway::build_info::BuildInfo;
use hearth_gateway::cli::{Cli, Commands, LogFormat};
use hearth_gateway::health;
use hearth_gateway::metrics::GatewayMetrics;
use hearth_gateway::{Collaborators, Lifecycle, LifecycleOptions, StartOutcome};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if let Commands::BuildInfo { json } = cli.action() {
        let info = BuildInfo::current();
        if json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            println!("{info}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    init_tracing(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "Starting Hearth Gateway"
    );

    let metrics = GatewayMetrics::install().context("failed to install Prometheus recorder")?;
    info!("Prometheus metrics initialized");

    let options = LifecycleOptions {
        config_path: cli.config.clone(),
        module_dir: cli.modules.clone(),
        handle_signals: true,
    };
    let mut lifecycle = Lifecycle::new(options, Collaborators::discord(metrics.clone()), metrics.clone());

    match lifecycle.start().await {
        Ok(StartOutcome::Running) => {}
        Ok(StartOutcome::Unconfigured(reason)) => {
            info!(%reason, "Exiting");
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            error!(error = %e, source = ?std::error::Error::source(&e), "Gateway failed to start");
            return Ok(ExitCode::FAILURE);
        }
    }

    let http_server = match lifecycle.state().instance().and_then(|i| i.config().http.port) {
        Some(port) => {
            let addr: SocketAddr = ([0, 0, 0, 0], port).into();
            Some(health::serve(&mut lifecycle, metrics.clone(), addr).await?)
        }
        None => {
            info!("No [http] port configured, health server disabled");
            None
        }
    };

    let trigger = lifecycle.shutdown_requested().await;
    let report = lifecycle.shutdown(trigger).await?;
    for step in report.failures() {
        warn!(subsystem = step.subsystem, outcome = ?step.outcome, "Teardown step failed");
    }

    if let Some(server) = http_server {
        server.abort();
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("hearth_gateway={}", cli.log_level).parse()?)
        .add_directive("twilight_gateway=info".parse()?)
        .add_directive("twilight_http=warn".parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match cli.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
    Ok(())
}
