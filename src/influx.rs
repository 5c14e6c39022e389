use crate::model::Point;
use anyhow::{Context, Result};
use reqwest::Client;

const MEASUREMENT: &str = "sensors";

/// Storage capability: one all-or-nothing bulk write per call.
pub trait MetricSink {
    async fn write(&self, points: &[Point]) -> Result<()>;
}

/// InfluxDB 1.x sink: line protocol POSTed to `/write` at millisecond
/// precision with basic auth.
pub struct InfluxSink {
    http: Client,
    write_url: String,
    database: String,
    username: String,
    password: String,
}

impl InfluxSink {
    pub fn new(
        http: Client,
        host: &str,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            http,
            write_url: format!("{}/write", host.trim_end_matches('/')),
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl MetricSink for InfluxSink {
    async fn write(&self, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for point in points {
            encode_line(&mut body, point);
        }

        self.http
            .post(&self.write_url)
            .query(&[("db", self.database.as_str()), ("precision", "ms")])
            .basic_auth(&self.username, Some(&self.password))
            .body(body)
            .send()
            .await
            .context("influx write request failed")?
            .error_for_status()
            .context("influx rejected batch")?;
        Ok(())
    }
}

fn encode_line(out: &mut String, point: &Point) {
    out.push_str(MEASUREMENT);
    for (key, value) in &point.labels {
        out.push(',');
        push_escaped(out, key);
        out.push('=');
        push_escaped(out, value);
    }
    out.push(' ');
    let mut first = true;
    for (field, value) in &point.fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(field);
        out.push('=');
        out.push_str(&value.to_string());
    }
    out.push(' ');
    out.push_str(&point.at.timestamp_millis().to_string());
    out.push('\n');
}

/// Tag keys and values escape commas, equals and spaces per line protocol.
fn push_escaped(out: &mut String, raw: &str) {
    for ch in raw.chars() {
        if matches!(ch, ',' | '=' | ' ') {
            out.push('\\');
        }
        out.push(ch);
    }
}
