mod admin;
mod bootstrap;

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;
use marvin_core::config::{AppConfig, LoadOptions};

const POSTER_DRAIN: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "marvin-server", about = "Slack RTM bot runtime")]
struct Args {
    #[arg(long, help = "Path to a marvin.toml config file")]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    use marvin_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Args::parse()).await
}

async fn run(args: Args) -> Result<()> {
    // A missing credential stops the process here, before anything connects.
    let require_file = args.config.is_some();
    let config = AppConfig::load(LoadOptions {
        config_path: args.config,
        require_file,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config)?;

    let server = &app.config.server;
    let admin =
        admin::spawn(&server.bind_address, server.admin_port, app.connection.clone()).await?;

    // Handshake failures are not fatal; the admin reconnect route can retry.
    if let Err(error) = app.connection.establish().await {
        tracing::warn!(
            event_name = "system.server.initial_connect_failed",
            error = %error,
            "initial rtm connection failed; use POST /reconnect to retry"
        );
    }

    tracing::info!(event_name = "system.server.started", "marvin-server started");
    wait_for_shutdown().await?;
    tracing::info!(event_name = "system.server.stopping", "marvin-server stopping");

    // The admin router holds a manager handle; it must go before the poster can drain.
    admin.abort();
    let _ = admin.await;
    app.shutdown(POSTER_DRAIN).await;
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
