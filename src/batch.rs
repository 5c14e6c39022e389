use crate::error::SyncError;
use crate::influx::MetricSink;
use crate::model::Point;
use anyhow::anyhow;
use rand::Rng;
use std::time::Duration;

const MAX_ATTEMPTS: usize = 15;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF_MS: u64 = 10_000;

/// Accumulates points into size-bounded batches and flushes each batch through
/// the sink with bounded, jittered backoff. A batch whose retry budget is
/// exhausted is dropped; the caller keeps the watermark back so the next cycle
/// refetches it.
pub struct BatchWriter<'a, S> {
    sink: &'a S,
    max_batch: usize,
    buffer: Vec<Point>,
}

impl<'a, S: MetricSink> BatchWriter<'a, S> {
    pub fn new(sink: &'a S, max_batch: usize) -> Self {
        Self {
            sink,
            max_batch,
            buffer: Vec::with_capacity(max_batch),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Adds one entry. When the batch reaches the configured maximum it is
    /// flushed before returning; `Ok(true)` tells the caller a fresh batch has
    /// begun.
    pub async fn append(&mut self, point: Point) -> Result<bool, SyncError> {
        self.buffer.push(point);
        if self.buffer.len() >= self.max_batch {
            self.flush().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Delivers the current batch. Empty batch is a no-op success. Retries up
    /// to 15 attempts with jittered truncated-quadratic backoff; on permanent
    /// failure the batch contents are lost and a delivery error is surfaced.
    pub async fn flush(&mut self) -> Result<(), SyncError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let points = std::mem::take(&mut self.buffer);
        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.sink.write(&points).await {
                Ok(()) => {
                    tracing::debug!(len = points.len(), attempt, "flushed batch");
                    return Ok(());
                }
                Err(err) => {
                    tracing::warn!(error = %err, attempt, "batch write failed");
                    last_error = Some(err);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(SyncError::delivery(
            MAX_ATTEMPTS,
            last_error.unwrap_or_else(|| anyhow!("batch write never attempted")),
        ))
    }
}

/// Jittered truncated-quadratic backoff: base grows as 100ms * n^2 capped at
/// 10s, and the actual sleep is uniform in [base/2, base] so concurrent
/// processes do not hammer the backend in lockstep.
fn backoff_delay(attempt: usize) -> Duration {
    let base = INITIAL_BACKOFF_MS
        .saturating_mul((attempt * attempt) as u64)
        .min(MAX_BACKOFF_MS);
    let jittered = rand::thread_rng().gen_range(base / 2..=base);
    Duration::from_millis(jittered)
}
