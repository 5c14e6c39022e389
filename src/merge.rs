use crate::model::{MetricKind, MetricRecord, Reading, SensorId, SensorInfo};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Folds per-kind reading sequences into unified per-sensor-per-instant
/// records. Within one cycle at most one record exists per (sensor, instant)
/// pair; absorbing the same kind twice for a pair is last-write-wins.
pub struct ReadingMerger {
    since: DateTime<Utc>,
    records: BTreeMap<(SensorId, DateTime<Utc>), BTreeMap<MetricKind, f64>>,
}

impl ReadingMerger {
    pub fn new(since: DateTime<Utc>) -> Self {
        Self {
            since,
            records: BTreeMap::new(),
        }
    }

    /// Merges one kind's readings. Readings strictly before `since` are
    /// discarded; the provider returns whole calendar days, so the head of
    /// each response overlaps the previous cycle.
    pub fn absorb(&mut self, readings: Vec<Reading>) {
        for reading in readings {
            if reading.at < self.since {
                continue;
            }
            self.records
                .entry((reading.sensor, reading.at))
                .or_default()
                .insert(reading.kind, reading.value);
        }
    }

    pub fn finish(self) -> Vec<MetricRecord> {
        self.records
            .into_iter()
            .map(|((sensor, at), values)| MetricRecord { sensor, at, values })
            .collect()
    }
}

/// Clock-drift guard: the fetch boundary is lowered to the earliest "last
/// communication" instant across all sensors, so a tag whose clock (or the
/// provider's) trails ours is not silently skipped.
pub fn effective_since(watermark: DateTime<Utc>, sensors: &[SensorInfo]) -> DateTime<Utc> {
    sensors
        .iter()
        .map(|sensor| sensor.last_seen)
        .fold(watermark, |earliest, seen| earliest.min(seen))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, minute, 0).unwrap()
    }

    fn reading(sensor: u16, minute: u32, kind: MetricKind, value: f64) -> Reading {
        Reading {
            sensor: SensorId(sensor),
            at: at(minute),
            kind,
            value,
        }
    }

    #[test]
    fn disjoint_kinds_merge_into_one_record_per_sensor_instant() {
        let mut merger = ReadingMerger::new(at(0));
        merger.absorb(vec![
            reading(1, 5, MetricKind::Temperature, 19.0),
            reading(1, 10, MetricKind::Temperature, 19.5),
            reading(2, 5, MetricKind::Temperature, 21.0),
        ]);
        merger.absorb(vec![
            reading(1, 5, MetricKind::Humidity, 55.0),
            reading(2, 5, MetricKind::Humidity, 60.0),
        ]);

        let records = merger.finish();
        assert_eq!(records.len(), 3);

        let merged = records
            .iter()
            .find(|r| r.sensor == SensorId(1) && r.at == at(5))
            .unwrap();
        assert_eq!(merged.values.get(&MetricKind::Temperature), Some(&19.0));
        assert_eq!(merged.values.get(&MetricKind::Humidity), Some(&55.0));
        assert_eq!(merged.values.len(), 2);

        let temp_only = records
            .iter()
            .find(|r| r.sensor == SensorId(1) && r.at == at(10))
            .unwrap();
        assert!(!temp_only.values.contains_key(&MetricKind::Humidity));
    }

    #[test]
    fn readings_before_since_are_discarded() {
        let mut merger = ReadingMerger::new(at(10));
        merger.absorb(vec![
            reading(1, 5, MetricKind::Temperature, 18.0),
            reading(1, 10, MetricKind::Temperature, 19.0),
            reading(1, 15, MetricKind::Temperature, 20.0),
        ]);

        let records = merger.finish();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.at >= at(10)));
    }

    #[test]
    fn duplicate_kind_for_same_key_is_last_write_wins() {
        let mut merger = ReadingMerger::new(at(0));
        merger.absorb(vec![reading(1, 5, MetricKind::Lux, 100.0)]);
        merger.absorb(vec![reading(1, 5, MetricKind::Lux, 250.0)]);

        let records = merger.finish();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].values.get(&MetricKind::Lux), Some(&250.0));
    }

    #[test]
    fn effective_since_drops_to_earliest_sensor_last_seen() {
        let watermark = at(30);
        let sensors = vec![
            SensorInfo {
                id: SensorId(1),
                name: "a".to_string(),
                tag_type: 13,
                last_seen: at(45),
                annotation: String::new(),
            },
            SensorInfo {
                id: SensorId(2),
                name: "b".to_string(),
                tag_type: 13,
                last_seen: at(30) - Duration::hours(2),
                annotation: String::new(),
            },
        ];

        assert_eq!(effective_since(watermark, &sensors), at(30) - Duration::hours(2));
        assert_eq!(effective_since(watermark, &sensors[..1]), watermark);
        assert_eq!(effective_since(watermark, &[]), watermark);
    }
}
