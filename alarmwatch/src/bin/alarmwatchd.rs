//! Alarm monitor daemon.
//!
//! Polls the trap collector's `active_alarms` table and forwards debounced
//! ALERT/CLEAR messages to the web messaging gateway. Configured entirely
//! through `ALARMWATCH_*` environment variables; see
//! [`alarmwatch::config`].

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use alarmwatch::config::MonitorConfig;
use alarmwatch::monitor::Monitor;
use alarmwatch::notify::WebGatewayNotifier;
use alarmwatch::source::PgSnapshotSource;
use alarmwatch::tracing::init_journald_or_stdout;
use alarmwatch::tracing::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Config comes first: its debug flag sets the default log filter.
    let config = MonitorConfig::from_env().context("Failed to load configuration")?;
    init_journald_or_stdout(config.debug);
    config.validate().context("Invalid configuration")?;
    config.log_banner();

    let source = match PgSnapshotSource::connect(
        &config.database_url,
        config.watched_codes.clone(),
    )
    .await
    {
        Ok(source) => {
            info!("Database connected");
            source
        }
        Err(e) => {
            error!(error = %e, "Database connection failed");
            return Err(e.into());
        }
    };
    let pool = source.pool();

    let notifier = WebGatewayNotifier::new(config.gateway_url.clone(), config.notify_timeout)
        .context("Failed to build gateway client")?;

    let running = CancellationToken::new();
    let monitor = Monitor::new(&config, source, notifier);
    let monitor_task = tokio::spawn(monitor.run(running.clone()));

    shutdown_signal().await;
    info!("Shutdown requested");
    running.cancel();

    monitor_task.await.context("Monitor task panicked")?;
    pool.close().await;
    info!("Database connection closed");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
}
