// HTTP repository implementation against the sensor backend
use crate::application::sensor_repository::{PrimaryReadings, SensorRepository};
use crate::domain::comparison::PrimaryDevice;
use crate::domain::sample::{RawSample, RawTimestamp};
use crate::domain::site::Site;
use crate::domain::timeline::TimeRange;
use crate::infrastructure::config::UpstreamSettings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const BACKOFF_BASE_SECS: f64 = 1.2;

#[derive(Debug, Clone)]
pub struct HttpSensorRepository {
    client: reqwest::Client,
    base_url: String,
    primary_path: String,
    reference_path: String,
    precipitation_path: String,
    api_token: Option<String>,
    rain_location_id: i64,
    max_retries: u32,
    backoff_base: f64,
}

/// Body of every time-ranged query sent to the backend
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RangeRequest<'a> {
    start_time: String,
    end_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrimaryPayload {
    #[serde(default)]
    device_id: Option<Value>,
    #[serde(default)]
    last_water_level_in: Option<f64>,
    #[serde(default)]
    last_fill_percent: Option<f64>,
    #[serde(default)]
    time_series: Vec<PrimaryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrimaryPoint {
    t: Value,
    #[serde(default)]
    level_in: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ReferencePayload {
    #[serde(default)]
    data: Vec<ReferencePoint>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferencePoint {
    date_time: Value,
    #[serde(default)]
    reading: Option<f64>,
    #[serde(default)]
    quality: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RainPayload {
    #[serde(default)]
    data: Vec<RainPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RainPoint {
    t: Value,
    #[serde(default)]
    rain_in: Option<f64>,
}

/// Numbers are epoch seconds; anything else is kept as text and left to
/// the validity filter.
fn raw_timestamp(value: &Value) -> RawTimestamp {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(RawTimestamp::UnixSeconds)
            .unwrap_or_else(|| RawTimestamp::Text(n.to_string())),
        Value::String(s) => RawTimestamp::Text(s.clone()),
        other => RawTimestamp::Text(other.to_string()),
    }
}

impl PrimaryPayload {
    fn into_readings(self, site: &Site) -> PrimaryReadings {
        let device_id = match self.device_id {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => site.mhm_id.clone(),
            Some(other) => other.to_string(),
        };
        let samples = self
            .time_series
            .iter()
            .map(|p| RawSample::new(raw_timestamp(&p.t), p.level_in, None))
            .collect();

        PrimaryReadings {
            device: PrimaryDevice {
                device_id,
                last_water_level_in: self.last_water_level_in,
                last_fill_percent: self.last_fill_percent,
            },
            samples,
        }
    }
}

impl HttpSensorRepository {
    pub fn new(settings: &UpstreamSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            primary_path: settings.primary_path.clone(),
            reference_path: settings.reference_path.clone(),
            precipitation_path: settings.precipitation_path.clone(),
            api_token: settings.api_token.clone(),
            rain_location_id: settings.rain_location_id,
            max_retries: settings.max_retries,
            backoff_base: BACKOFF_BASE_SECS,
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn range_request<'a>(
        range: &TimeRange,
        device_id: Option<&'a str>,
        location_id: Option<i64>,
    ) -> RangeRequest<'a> {
        RangeRequest {
            start_time: range.start().to_rfc3339_opts(SecondsFormat::Secs, true),
            end_time: range.end().to_rfc3339_opts(SecondsFormat::Secs, true),
            device_id,
            location_id,
        }
    }

    /// POST a range query, retrying transport errors and 5xx responses with
    /// exponential backoff. Other error statuses fail immediately.
    async fn execute_query<T: DeserializeOwned>(&self, path: &str, body: &RangeRequest<'_>) -> Result<T> {
        let url = self.build_url(path);

        for attempt in 0..=self.max_retries {
            let mut request = self
                .client
                .post(&url)
                .header("Accept", "application/json")
                .json(body);
            if let Some(token) = &self.api_token {
                request = request.header("Authorization", format!("Token {}", token));
            }

            let can_retry = attempt < self.max_retries;
            match request.send().await {
                Ok(response) if response.status().is_server_error() && can_retry => {
                    tracing::warn!(
                        "Backend {} returned {}, retrying (attempt {})",
                        url,
                        response.status(),
                        attempt + 1
                    );
                }
                Ok(response) if !response.status().is_success() => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    anyhow::bail!("Backend query failed with status {}: {}", status, body);
                }
                Ok(response) => {
                    return response
                        .json::<T>()
                        .await
                        .with_context(|| format!("Failed to parse response from {}", url));
                }
                Err(e) if can_retry => {
                    tracing::warn!("Request to {} failed: {}, retrying (attempt {})", url, e, attempt + 1);
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to send request to {}", url));
                }
            }

            let delay = self.backoff_base.powi(attempt as i32);
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }

        anyhow::bail!("Backend query to {} exhausted its retries", url)
    }
}

#[async_trait]
impl SensorRepository for HttpSensorRepository {
    async fn fetch_primary(&self, site: &Site, range: &TimeRange) -> Result<PrimaryReadings> {
        let body = Self::range_request(range, Some(site.mhm_id.as_str()), None);
        tracing::debug!("Fetching primary stream for device {}", site.mhm_id);

        let payload: PrimaryPayload = self.execute_query(&self.primary_path, &body).await?;
        Ok(payload.into_readings(site))
    }

    async fn fetch_reference(&self, site: &Site, range: &TimeRange) -> Result<Vec<RawSample>> {
        let body = Self::range_request(range, None, Some(site.ref_loc_id));
        tracing::debug!("Fetching reference stream for location {}", site.ref_loc_id);

        let payload: ReferencePayload = self.execute_query(&self.reference_path, &body).await?;
        if let Some(error) = payload.error {
            anyhow::bail!("Reference source error: {}", error);
        }

        Ok(payload
            .data
            .iter()
            .map(|p| RawSample::new(raw_timestamp(&p.date_time), p.reading, p.quality))
            .collect())
    }

    async fn fetch_precipitation(&self, _site: &Site, range: &TimeRange) -> Result<Vec<RawSample>> {
        let body = Self::range_request(range, None, Some(self.rain_location_id));
        tracing::debug!("Fetching rainfall for gauge {}", self.rain_location_id);

        let payload: RainPayload = self.execute_query(&self.precipitation_path, &body).await?;
        Ok(payload
            .data
            .iter()
            .map(|p| RawSample::new(raw_timestamp(&p.t), p.rain_in, None))
            .collect())
    }
}
