mod bootstrap;
mod health;
mod registry;
mod scheduler;
mod services;
mod stores;
#[cfg(test)]
mod test_support;
mod workflow;

use anyhow::Result;
use muster_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;

fn init_logging(config: &AppConfig) {
    use muster_core::config::LogFormat::*;
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
    run().await
}

pub async fn run() -> Result<()> {
    // Logging needs the config, so load it before anything else.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let socket_connected = app.slack_runner.connection_status();
    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
        socket_connected,
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(app.scheduler.run(shutdown_rx));

    let slack_runner = app.slack_runner;
    let mut socket = tokio::spawn(async move { slack_runner.start().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        channel_id = %app.config.slack.channel_id,
        "musterbot started"
    );

    // The process stops when the socket runner ends.
    let socket_outcome = tokio::select! {
        signal = wait_for_shutdown() => {
            signal?;
            None
        }
        joined = &mut socket => Some(joined),
    };

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "musterbot stopping"
    );

    let _ = shutdown_tx.send(true);
    socket.abort();
    if let Err(error) = scheduler.await {
        tracing::warn!(correlation_id = "shutdown", error = %error, "scheduler task ended abnormally");
    }
    app.db_pool.close().await;

    match socket_outcome {
        None => Ok(()),
        Some(Ok(Ok(()))) => {
            tracing::warn!(
                event_name = "system.server.socket_closed",
                correlation_id = "socket",
                "socket mode runner stopped"
            );
            Ok(())
        }
        Some(Ok(Err(error))) => {
            tracing::error!(
                event_name = "system.server.socket_failed",
                correlation_id = "socket",
                error = %error,
                "socket mode runner stopped"
            );
            Err(error)
        }
        Some(Err(join_error)) => Err(join_error.into()),
    }
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
