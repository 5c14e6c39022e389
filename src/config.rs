use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use std::env;
use std::time::Duration;
use url::Url;

const DEFAULT_PROVIDER_URL: &str = "https://www.mytaglist.com";
const DEFAULT_TIMEZONE: &str = "Pacific/Auckland";

/// Everything the pipeline needs, validated up front. A missing or invalid
/// required setting is fatal at startup; nothing here is re-read mid-run.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider_url: String,
    pub provider_token: String,
    pub provider_tz: Tz,
    pub influx_host: String,
    pub influx_user: String,
    pub influx_password: String,
    pub influx_db: String,
    pub lookback_hours: u64,
    pub poll_interval_secs: u64,
    pub max_batch: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let provider_token = env_required("GRABBER_TAG_TOKEN")?;
        let provider_url = env_string("GRABBER_TAG_URL", DEFAULT_PROVIDER_URL);
        let tz_name = env_string("GRABBER_TAG_TIMEZONE", DEFAULT_TIMEZONE);
        let provider_tz: Tz = tz_name
            .parse()
            .map_err(|_| anyhow!("invalid GRABBER_TAG_TIMEZONE '{tz_name}'"))?;

        let influx_host = env_required("GRABBER_INFLUX_HOST")?;
        Url::parse(&influx_host).context("invalid GRABBER_INFLUX_HOST")?;
        let influx_user = env_required("GRABBER_INFLUX_USER")?;
        let influx_password = env_required("GRABBER_INFLUX_PASSWORD")?;
        let influx_db = env_required("GRABBER_INFLUX_DB")?;

        let lookback_hours = env_u64("GRABBER_LOOKBACK_HOURS", 24)?;
        let poll_interval_secs = env_u64("GRABBER_POLL_INTERVAL_SECONDS", 60)?;
        let max_batch = env_u64("GRABBER_MAX_BATCH", 1000)? as usize;
        if max_batch == 0 {
            bail!("GRABBER_MAX_BATCH must be at least 1");
        }
        if poll_interval_secs == 0 {
            bail!("GRABBER_POLL_INTERVAL_SECONDS must be at least 1");
        }

        Ok(Self {
            provider_url,
            provider_token,
            provider_tz,
            influx_host,
            influx_user,
            influx_password,
            influx_db,
            lookback_hours,
            poll_interval_secs,
            max_batch,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours as i64)
    }
}

fn env_required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("missing env var {key}"))
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}
