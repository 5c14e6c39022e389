mod batch;
mod config;
mod epoch;
mod error;
mod influx;
mod merge;
mod model;
mod provider;
mod sync;
mod watermark;

use crate::config::Config;
use crate::influx::InfluxSink;
use crate::provider::WirelessTagClient;
use anyhow::Result;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tokio::time::MissedTickBehavior;

const MEMORY_REPORT_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sensor_grabber=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

/// Periodic resident-memory log line. Diagnostics only; shares no state with
/// the sync pipeline.
fn spawn_memory_reporter() {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return;
    };
    tokio::spawn(async move {
        let mut system = System::new();
        let mut ticker = tokio::time::interval(MEMORY_REPORT_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                tracing::debug!(rss_mb = process.memory() / 1024 / 1024, "process memory");
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing()?;

    let http = reqwest::Client::new();
    let provider = WirelessTagClient::new(
        http.clone(),
        config.provider_url.clone(),
        config.provider_token.clone(),
        config.provider_tz,
    );
    let sink = InfluxSink::new(
        http,
        &config.influx_host,
        config.influx_db.clone(),
        config.influx_user.clone(),
        config.influx_password.clone(),
    );

    spawn_memory_reporter();
    tracing::info!(
        provider = %config.provider_url,
        database = %config.influx_db,
        lookback_hours = config.lookback_hours,
        poll_interval_secs = config.poll_interval_secs,
        "sensor-grabber starting"
    );

    tokio::select! {
        result = sync::run(&provider, &sink, &config) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    }
}
