use chrono::{DateTime, TimeZone, Utc};

/// Milliseconds between 1601-01-01 UTC (the provider's epoch) and
/// 1970-01-01 UTC.
const EPOCH_OFFSET_MS: i64 = 116_444_736_000_000;

/// Converts the provider's native timestamp (100 ns ticks since 1601-01-01
/// UTC) to a UTC instant. Ticks are reduced to milliseconds before the epoch
/// offset is subtracted, so values stay well inside i64 range past year 2100.
/// Resolution below one millisecond is truncated.
pub fn instant_from_ticks(ticks: i64) -> DateTime<Utc> {
    let ms = ticks / 10_000 - EPOCH_OFFSET_MS;
    let secs = ms.div_euclid(1000);
    let nanos = (ms.rem_euclid(1000) * 1_000_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .unwrap_or_else(Utc::now)
}
