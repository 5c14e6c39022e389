use crate::batch::BatchWriter;
use crate::config::Config;
use crate::error::SyncError;
use crate::influx::MetricSink;
use crate::merge::{effective_since, ReadingMerger};
use crate::model::{MetricKind, Point, SensorId};
use crate::provider::SensorProvider;
use crate::watermark::Watermark;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::time::MissedTickBehavior;

/// Orchestrates one sync cycle: list sensors, fetch each supported kind,
/// merge, label, and deliver in bounded batches.
pub struct SyncCoordinator<'a, P, S> {
    provider: &'a P,
    sink: &'a S,
    max_batch: usize,
}

impl<'a, P: SensorProvider, S: MetricSink> SyncCoordinator<'a, P, S> {
    pub fn new(provider: &'a P, sink: &'a S, max_batch: usize) -> Self {
        Self {
            provider,
            sink,
            max_batch,
        }
    }

    /// Runs one fetch -> merge -> batch -> deliver pass for everything at or
    /// after `since`. A kind that fails to fetch or decode is skipped for this
    /// cycle while the remaining kinds still merge and deliver; the first such
    /// error (or a delivery failure) is returned so the caller knows not to
    /// advance the watermark. `Ok` carries the number of records delivered.
    pub async fn run_cycle(&self, since: DateTime<Utc>) -> Result<usize, SyncError> {
        let sensors = self.provider.list_sensors().await?;
        let since = effective_since(since, &sensors);

        let mut merger = ReadingMerger::new(since);
        let mut first_error: Option<SyncError> = None;
        for kind in MetricKind::ALL {
            let ids: Vec<SensorId> = sensors
                .iter()
                .filter(|sensor| sensor.supports(kind))
                .map(|sensor| sensor.id)
                .collect();
            if ids.is_empty() {
                continue;
            }
            match self.provider.fetch_readings(kind, &ids, since).await {
                Ok(readings) => merger.absorb(readings),
                Err(err) => {
                    tracing::warn!(kind = %kind, error = %err, "skipping metric kind this cycle");
                    first_error.get_or_insert(err);
                }
            }
        }

        let labels: BTreeMap<SensorId, _> = sensors
            .iter()
            .map(|sensor| (sensor.id, sensor.labels()))
            .collect();

        let records = merger.finish();
        let delivered = records.len();
        let mut writer = BatchWriter::new(self.sink, self.max_batch);
        for record in records {
            let Some(labels) = labels.get(&record.sensor) else {
                continue;
            };
            let fields = record
                .values
                .iter()
                .map(|(kind, value)| (kind.field_name(), *value))
                .collect();
            writer
                .append(Point {
                    labels: labels.clone(),
                    fields,
                    at: record.at,
                })
                .await?;
        }
        writer.flush().await?;
        tracing::debug!(delivered, since = %since, "cycle delivery finished");

        match first_error {
            None => Ok(delivered),
            Some(err) => Err(err),
        }
    }
}

/// Scheduler: one cycle immediately at startup covering the configured
/// lookback, then one per poll interval, forever. Cycles run to completion and
/// never overlap. The watermark advances to the cycle's start time only after
/// a fully clean cycle, so a failed cycle is refetched rather than lost.
pub async fn run<P: SensorProvider, S: MetricSink>(
    provider: &P,
    sink: &S,
    config: &Config,
) -> anyhow::Result<()> {
    let coordinator = SyncCoordinator::new(provider, sink, config.max_batch);
    let mut watermark = Watermark::new(Utc::now() - config.lookback());

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let cycle_start = Utc::now();
        match coordinator.run_cycle(watermark.current()).await {
            Ok(delivered) => {
                tracing::info!(delivered, since = %watermark.current(), "sync cycle complete");
                watermark.advance(cycle_start);
            }
            Err(err) => {
                tracing::warn!(error = %err, since = %watermark.current(), "sync cycle failed; watermark held");
            }
        }
    }
}
