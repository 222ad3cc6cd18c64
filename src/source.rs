use crate::errors::SourceError;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;

const DEVICE_LIST_PATH: &str = "/api/Hydrometers/GetHydrometers";
const TELEMETRY_PATH: &str = "/api/Hydrometers/GetTelemetry";
const TELEMETRY_WINDOW_HOURS: i64 = 1;
// The source wants seconds-precision ISO-8601 with no offset suffix.
const TELEMETRY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone)]
pub struct Device {
    pub id: String,
}

/// One telemetry reading as retained per cycle: only the newest sample in the
/// trailing window survives.
#[derive(Debug, Clone)]
pub struct TelemetrySample {
    pub device_id: String,
    pub observed_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub specific_gravity_raw: i64,
    pub rssi: i64,
    pub battery_voltage: f64,
    pub firmware_version: String,
}

#[derive(Debug, Deserialize)]
struct WireSample {
    #[serde(rename = "createdOn")]
    created_on: NaiveDateTime,
    temperature: f64,
    // Specific gravity scaled by 1000; the wire sometimes carries it with a
    // fractional part, so accept a float and round to the raw integer.
    gravity: f64,
    #[serde(default)]
    rssi: i64,
    #[serde(default)]
    battery: f64,
    #[serde(default)]
    version: String,
}

pub trait SourceApi {
    async fn list_devices(&self, token: &str) -> Result<Vec<Device>, SourceError>;
    async fn latest_sample(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<TelemetrySample, SourceError>;
}

/// Typed client for the hydrometer cloud API. Holds a clone of the
/// process-wide reqwest client; timeouts come from the client builder.
pub struct SourceClient {
    http: Client,
    base_url: String,
}

impl SourceClient {
    pub fn new(http: Client, base_url: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl SourceApi for SourceClient {
    async fn list_devices(&self, token: &str) -> Result<Vec<Device>, SourceError> {
        let url = format!("{}{DEVICE_LIST_PATH}", self.base_url);
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(SourceError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(SourceError::Transport)?;
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint: "GetHydrometers",
                status,
            });
        }
        let listed: Vec<JsonValue> = serde_json::from_str(&body).map_err(SourceError::Decode)?;
        Ok(device_ids(&listed)
            .into_iter()
            .map(|id| Device { id })
            .collect())
    }

    async fn latest_sample(
        &self,
        token: &str,
        device_id: &str,
    ) -> Result<TelemetrySample, SourceError> {
        let end = Utc::now();
        let start = end - Duration::hours(TELEMETRY_WINDOW_HOURS);
        let form = [
            ("hydrometerId", device_id.to_string()),
            ("startDate", start.format(TELEMETRY_DATE_FORMAT).to_string()),
            ("endDate", end.format(TELEMETRY_DATE_FORMAT).to_string()),
        ];

        let url = format!("{}{TELEMETRY_PATH}", self.base_url);
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .form(&form)
            .send()
            .await
            .map_err(SourceError::Transport)?;
        let status = response.status();
        let body = response.text().await.map_err(SourceError::Transport)?;
        if !status.is_success() {
            return Err(SourceError::Status {
                endpoint: "GetTelemetry",
                status,
            });
        }
        let samples: Vec<WireSample> = serde_json::from_str(&body).map_err(SourceError::Decode)?;
        newest_sample(device_id, samples).ok_or(SourceError::NoSamples)
    }
}

/// Collect the string-typed `id` at the top level of each listed object.
/// Entries with no `id`, or a non-string one, are skipped without comment;
/// that is the observed source contract.
fn device_ids(listed: &[JsonValue]) -> Vec<String> {
    listed
        .iter()
        .filter_map(|entry| entry.get("id"))
        .filter_map(JsonValue::as_str)
        .map(str::to_string)
        .collect()
}

/// Maximum `createdOn` wins; on a tie the first-encountered sample is kept.
fn newest_sample(device_id: &str, samples: Vec<WireSample>) -> Option<TelemetrySample> {
    let mut newest: Option<WireSample> = None;
    for sample in samples {
        let replace = newest
            .as_ref()
            .map(|current| sample.created_on > current.created_on)
            .unwrap_or(true);
        if replace {
            newest = Some(sample);
        }
    }
    let newest = newest?;
    Some(TelemetrySample {
        device_id: device_id.to_string(),
        observed_at: Utc.from_utc_datetime(&newest.created_on),
        temperature_c: newest.temperature,
        specific_gravity_raw: newest.gravity.round() as i64,
        rssi: newest.rssi,
        battery_voltage: newest.battery,
        firmware_version: newest.version,
    })
}
