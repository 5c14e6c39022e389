use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// Slave id of a physical tag; stable across sync cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorId(pub u16);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    Temperature,
    Humidity,
    Lux,
    Motion,
    Battery,
    Signal,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::Temperature,
        MetricKind::Humidity,
        MetricKind::Lux,
        MetricKind::Motion,
        MetricKind::Battery,
        MetricKind::Signal,
    ];

    /// The `type` value the provider's stats endpoint expects for this kind.
    pub fn api_name(self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::Humidity => "cap",
            MetricKind::Lux => "light",
            MetricKind::Motion => "motion",
            MetricKind::Battery => "batteryVolt",
            MetricKind::Signal => "signal",
        }
    }

    /// Field name used when the value is written to storage.
    pub fn field_name(self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::Humidity => "humidity",
            MetricKind::Lux => "lux",
            MetricKind::Motion => "motion",
            MetricKind::Battery => "battery",
            MetricKind::Signal => "signal",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// One raw sample from the provider.
#[derive(Debug, Clone)]
pub struct Reading {
    pub sensor: SensorId,
    pub at: DateTime<Utc>,
    pub kind: MetricKind,
    pub value: f64,
}

/// All kinds sampled by one sensor at one instant, merged.
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub sensor: SensorId,
    pub at: DateTime<Utc>,
    pub values: BTreeMap<MetricKind, f64>,
}

/// One batch entry handed to the storage sink.
#[derive(Debug, Clone)]
pub struct Point {
    pub labels: BTreeMap<String, String>,
    pub fields: BTreeMap<&'static str, f64>,
    pub at: DateTime<Utc>,
}

/// A sensor as reported by the provider's tag list.
#[derive(Debug, Clone)]
pub struct SensorInfo {
    pub id: SensorId,
    pub name: String,
    pub tag_type: i32,
    pub last_seen: DateTime<Utc>,
    pub annotation: String,
}

impl SensorInfo {
    /// Which metric kinds this tag hardware can report. Temperature, humidity,
    /// lux and motion depend on the tag type; battery voltage and radio signal
    /// are reported by every tag.
    pub fn supports(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Temperature => !matches!(self.tag_type, 82 | 92),
            MetricKind::Humidity => matches!(self.tag_type, 13 | 21 | 26 | 52 | 72),
            MetricKind::Lux => self.tag_type == 26,
            MetricKind::Motion => matches!(self.tag_type, 12 | 13 | 21),
            MetricKind::Battery | MetricKind::Signal => true,
        }
    }

    /// Labels attached to every record for this sensor. `name` and `id` are
    /// always present; extra labels come from the free-form annotation field
    /// (`key1=value1,key2=value2`, whitespace tolerated, malformed segments
    /// skipped). `name` and `id` win over annotation entries.
    pub fn labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        for segment in self.annotation.split(',') {
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            labels.insert(key.to_string(), value.trim().to_string());
        }
        labels.insert("name".to_string(), self.name.clone());
        labels.insert("id".to_string(), self.id.to_string());
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(tag_type: i32, annotation: &str) -> SensorInfo {
        SensorInfo {
            id: SensorId(7),
            name: "garage".to_string(),
            tag_type,
            last_seen: Utc::now(),
            annotation: annotation.to_string(),
        }
    }

    #[test]
    fn labels_always_contain_name_and_id() {
        let labels = sensor(13, "").labels();
        assert_eq!(labels.get("name").map(String::as_str), Some("garage"));
        assert_eq!(labels.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn labels_parse_annotation_key_values_with_whitespace() {
        let labels = sensor(13, "zone=A, floor=2").labels();
        assert_eq!(labels.get("zone").map(String::as_str), Some("A"));
        assert_eq!(labels.get("floor").map(String::as_str), Some("2"));
        assert_eq!(labels.len(), 4);
    }

    #[test]
    fn labels_skip_segments_without_equals() {
        let labels = sensor(13, "zone=A, not a pair, =nokey").labels();
        assert_eq!(labels.get("zone").map(String::as_str), Some("A"));
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn labels_never_let_annotation_override_name_or_id() {
        let labels = sensor(13, "name=spoofed,id=999").labels();
        assert_eq!(labels.get("name").map(String::as_str), Some("garage"));
        assert_eq!(labels.get("id").map(String::as_str), Some("7"));
    }

    #[test]
    fn support_tables_follow_tag_type() {
        let htu = sensor(13, "");
        assert!(htu.supports(MetricKind::Temperature));
        assert!(htu.supports(MetricKind::Humidity));
        assert!(htu.supports(MetricKind::Motion));
        assert!(!htu.supports(MetricKind::Lux));

        let ambient_light = sensor(26, "");
        assert!(ambient_light.supports(MetricKind::Lux));
        assert!(!ambient_light.supports(MetricKind::Motion));

        let no_temp = sensor(82, "");
        assert!(!no_temp.supports(MetricKind::Temperature));
        assert!(no_temp.supports(MetricKind::Battery));
        assert!(no_temp.supports(MetricKind::Signal));
    }
}
