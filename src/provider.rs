use crate::epoch::instant_from_ticks;
use crate::error::SyncError;
use crate::model::{MetricKind, Reading, SensorId, SensorInfo};
use anyhow::anyhow;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Fetch capability: the provider side of a sync cycle.
pub trait SensorProvider {
    async fn list_sensors(&self) -> Result<Vec<SensorInfo>, SyncError>;

    /// Fetches one kind's readings for the given sensors, from `since` to now.
    /// The provider works in calendar days of its local timezone, so responses
    /// cover whole days and the caller filters the overlap.
    async fn fetch_readings(
        &self,
        kind: MetricKind,
        ids: &[SensorId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, SyncError>;
}

/// HTTP client for the Wireless Tag cloud API.
pub struct WirelessTagClient {
    http: Client,
    base_url: String,
    token: String,
    tz: Tz,
}

#[derive(Deserialize)]
struct TagListEnvelope {
    d: Vec<TagRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TagRecord {
    name: String,
    slave_id: u16,
    tag_type: i32,
    last_comm: i64,
    #[serde(default)]
    comment: String,
}

#[derive(Serialize)]
struct StatsRequest<'a> {
    ids: &'a [u16],
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(rename = "fromDate")]
    from_date: String,
    #[serde(rename = "toDate")]
    to_date: String,
}

#[derive(Deserialize)]
struct StatsEnvelope {
    d: StatsPayload,
}

#[derive(Deserialize)]
struct StatsPayload {
    #[serde(default)]
    stats: Vec<DayStats>,
}

/// One provider-local calendar day of samples. `ids[i]` owns `tods[i]`
/// (seconds past local midnight) and `values[i]`, pairwise.
#[derive(Deserialize)]
struct DayStats {
    date: String,
    #[serde(default)]
    ids: Vec<u16>,
    #[serde(default)]
    values: Vec<Vec<f64>>,
    #[serde(default)]
    tods: Vec<Vec<i64>>,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(rename = "Message", default)]
    message: String,
}

impl WirelessTagClient {
    pub fn new(http: Client, base_url: String, token: String, tz: Tz) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            tz,
        }
    }

    /// Provider request dates are non-padded month/day/year in its local
    /// timezone, never UTC days.
    fn format_day(&self, at: DateTime<Utc>) -> String {
        let local = at.with_timezone(&self.tz);
        format!("{}/{}/{}", local.month(), local.day(), local.year())
    }

    fn decode_stats(&self, kind: MetricKind, payload: StatsPayload) -> Result<Vec<Reading>, SyncError> {
        let mut readings = Vec::new();
        for day in payload.stats {
            let date = NaiveDate::parse_from_str(&day.date, "%m/%d/%Y").map_err(|err| {
                SyncError::merge(
                    kind.field_name(),
                    anyhow!("bad stats date {:?}: {err}", day.date),
                )
            })?;
            let day_start = self
                .tz
                .from_local_datetime(&date.and_time(NaiveTime::MIN))
                .earliest()
                .ok_or_else(|| {
                    SyncError::merge(
                        kind.field_name(),
                        anyhow!("date {} has no midnight in {}", day.date, self.tz),
                    )
                })?;
            for ((sensor, tods), values) in day.ids.iter().zip(&day.tods).zip(&day.values) {
                for (tod, value) in tods.iter().zip(values) {
                    let at = (day_start + Duration::seconds(*tod)).with_timezone(&Utc);
                    readings.push(Reading {
                        sensor: SensorId(*sensor),
                        at,
                        kind,
                        value: *value,
                    });
                }
            }
        }
        Ok(readings)
    }
}

impl SensorProvider for WirelessTagClient {
    async fn list_sensors(&self) -> Result<Vec<SensorInfo>, SyncError> {
        let url = format!("{}/ethClient.asmx/GetTagList2", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| SyncError::fetch("sensor list", err))?;

        let envelope: TagListEnvelope = response
            .json()
            .await
            .map_err(|err| SyncError::merge("sensor list", err))?;

        Ok(envelope
            .d
            .into_iter()
            .map(|tag| SensorInfo {
                id: SensorId(tag.slave_id),
                name: tag.name,
                tag_type: tag.tag_type,
                last_seen: instant_from_ticks(tag.last_comm),
                annotation: tag.comment,
            })
            .collect())
    }

    async fn fetch_readings(
        &self,
        kind: MetricKind,
        ids: &[SensorId],
        since: DateTime<Utc>,
    ) -> Result<Vec<Reading>, SyncError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let raw_ids: Vec<u16> = ids.iter().map(|id| id.0).collect();
        let request = StatsRequest {
            ids: &raw_ids,
            kind: kind.api_name(),
            from_date: self.format_day(since),
            to_date: self.format_day(Utc::now()),
        };

        let url = format!("{}/ethLogs.asmx/GetMultiTagStatsRaw", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await
            .map_err(|err| SyncError::fetch(kind.field_name(), err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiMessage>(&body)
                .map(|m| m.message)
                .unwrap_or(body);
            return Err(SyncError::fetch(
                kind.field_name(),
                anyhow!("status {status}: {message}"),
            ));
        }

        let envelope: StatsEnvelope = response
            .json()
            .await
            .map_err(|err| SyncError::merge(kind.field_name(), err))?;

        self.decode_stats(kind, envelope.d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Pacific::Auckland;

    fn client() -> WirelessTagClient {
        WirelessTagClient::new(
            Client::new(),
            "https://example.invalid".to_string(),
            "token".to_string(),
            Auckland,
        )
    }

    #[test]
    fn request_days_use_provider_local_dates() {
        // 2024-06-01 23:30 UTC is already June 2nd in Auckland (UTC+12).
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap();
        assert_eq!(client().format_day(at), "6/2/2024");
    }

    #[test]
    fn stats_timestamps_are_local_midnight_plus_tod() {
        let payload = StatsPayload {
            stats: vec![DayStats {
                date: "6/2/2024".to_string(),
                ids: vec![3],
                values: vec![vec![19.5]],
                tods: vec![vec![3_600]],
            }],
        };
        let readings = client()
            .decode_stats(MetricKind::Temperature, payload)
            .unwrap();
        assert_eq!(readings.len(), 1);
        // 1am June 2nd NZST == 13:00 June 1st UTC.
        assert_eq!(
            readings[0].at,
            Utc.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).unwrap()
        );
        assert_eq!(readings[0].sensor, SensorId(3));
        assert_eq!(readings[0].value, 19.5);
    }

    #[test]
    fn stats_rows_pair_ids_with_their_sample_columns() {
        let payload = StatsPayload {
            stats: vec![DayStats {
                date: "1/31/2024".to_string(),
                ids: vec![1, 2],
                values: vec![vec![10.0, 11.0], vec![20.0]],
                tods: vec![vec![0, 60], vec![120]],
            }],
        };
        let readings = client().decode_stats(MetricKind::Lux, payload).unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(
            readings
                .iter()
                .filter(|r| r.sensor == SensorId(1))
                .count(),
            2
        );
        assert_eq!(
            readings
                .iter()
                .filter(|r| r.sensor == SensorId(2))
                .count(),
            1
        );
    }

    #[test]
    fn malformed_stats_date_reports_merge_error() {
        let payload = StatsPayload {
            stats: vec![DayStats {
                date: "not-a-date".to_string(),
                ids: vec![1],
                values: vec![vec![1.0]],
                tods: vec![vec![0]],
            }],
        };
        let err = client()
            .decode_stats(MetricKind::Humidity, payload)
            .unwrap_err();
        assert!(matches!(err, SyncError::Merge { .. }));
    }

    #[test]
    fn tag_list_envelope_decodes_provider_shape() {
        let raw = r#"{"d":[{"name":"garage","slaveId":3,"tagType":13,
            "lastComm":133600000000000000,"comment":"zone=A","alive":true,
            "temperature":19.2,"unknownField":null}]}"#;
        let envelope: TagListEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.d.len(), 1);
        let tag = &envelope.d[0];
        assert_eq!(tag.slave_id, 3);
        assert_eq!(tag.tag_type, 13);
        assert_eq!(tag.comment, "zone=A");
    }
}
