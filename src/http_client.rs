//! reqwest-backed control-plane and weather collaborators.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};
use reqwest::Client;
use snafu::ResultExt;

use crate::collaborators::{GradientClient, ReportedStatePublisher, SchedulePolicySource, ZoneDirectorySource};
use crate::error::{ControlPlaneContractSnafu, DirectoryCacheParseSnafu, HttpSnafu, Result, ZoneInfoUnavailableSnafu};
use crate::gradient::{GradientSample, GradientTable, GradientTableRow};
use crate::schedule::{FullSchedule, ScheduleEntry, SchedulePolicy, TargetOverride, ZoneId};
use crate::sensor::{Sensor, Zone};
use crate::weather::WeatherProvider;
use crate::zone::DeviceReportedState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Talks to the scheduling/zone-directory/gradient control plane described
/// in §4.11 and §6. Optional HTTP basic credentials, applied to every call.
pub struct ControlPlaneClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
    directory_cache_path: PathBuf,
}

impl ControlPlaneClient {
    pub fn new(base_url: String, credentials: Option<(String, String)>, directory_cache_path: PathBuf) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(HttpSnafu { url: base_url.clone() })?;

        Ok(Self { client, base_url, credentials, directory_cache_path })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url);
        if let Some((user, pass)) = &self.credentials {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    fn post_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url);
        if let Some((user, pass)) = &self.credentials {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    async fn write_directory_cache(&self, zones: &[Zone], sensors: &[Sensor]) {
        #[derive(serde::Serialize)]
        struct Cache<'a> {
            zones: &'a [Zone],
            sensors: &'a [Sensor],
        }
        let cache = Cache { zones, sensors };
        if let Ok(body) = serde_json::to_vec_pretty(&cache) {
            if let Err(e) = tokio::fs::write(&self.directory_cache_path, body).await {
                log::warn!("failed to write zone/sensor directory cache: {}", e);
            }
        }
    }

    async fn read_directory_cache(&self) -> Result<(Vec<Zone>, Vec<Sensor>)> {
        #[derive(serde::Deserialize)]
        struct Cache {
            zones: Vec<Zone>,
            sensors: Vec<Sensor>,
        }

        match tokio::fs::read(&self.directory_cache_path).await {
            Ok(bytes) => {
                let cache: Cache = serde_json::from_slice(&bytes)
                    .context(DirectoryCacheParseSnafu { path: self.directory_cache_path.clone() })?;
                Ok((cache.zones, cache.sensors))
            }
            Err(_) => ZoneInfoUnavailableSnafu { cache_path: self.directory_cache_path.clone() }.fail(),
        }
    }
}

/// Wire shape of `GET /schedule`: a day-of-week-keyed dictionary ("0".."6")
/// of time-grouped per-zone targets, plus a flat list of overrides.
#[derive(serde::Deserialize)]
struct ScheduleResponse {
    schedule: HashMap<String, Vec<DayEntry>>,
    target_override: Vec<OverrideEntry>,
}

#[derive(serde::Deserialize)]
struct DayEntry {
    when: String,
    zones: Vec<ZoneTarget>,
}

#[derive(serde::Deserialize)]
struct ZoneTarget {
    zone: ZoneId,
    temp: f64,
}

#[derive(serde::Deserialize)]
struct OverrideEntry {
    zone: ZoneId,
    temp: f64,
    until: String,
}

fn parse_schedule_response(url: &str, response: ScheduleResponse) -> Result<SchedulePolicy> {
    let mut entries = Vec::new();
    for (day_str, day_entries) in response.schedule {
        let day: u8 = day_str.parse().map_err(|_| {
            ControlPlaneContractSnafu { url: url.to_owned(), reason: format!("invalid day of week {:?}", day_str) }
                .build()
        })?;
        for day_entry in day_entries {
            let start = NaiveTime::parse_from_str(&day_entry.when, "%H:%M").map_err(|_| {
                ControlPlaneContractSnafu {
                    url: url.to_owned(),
                    reason: format!("invalid schedule time {:?}", day_entry.when),
                }
                .build()
            })?;
            for zone_target in &day_entry.zones {
                entries.push(ScheduleEntry { day, start, zone: zone_target.zone, target: zone_target.temp });
            }
        }
    }

    let mut overrides = Vec::new();
    for o in response.target_override {
        let naive = NaiveDateTime::parse_from_str(&o.until, "%Y-%m-%dT%H:%M").map_err(|_| {
            ControlPlaneContractSnafu { url: url.to_owned(), reason: format!("invalid override end {:?}", o.until) }
                .build()
        })?;
        overrides.push(TargetOverride { zone: o.zone, end: DateTime::<Utc>::from_utc(naive, Utc), target: o.temp });
    }

    Ok(SchedulePolicy::new(FullSchedule::new(entries), overrides))
}

#[async_trait]
impl SchedulePolicySource for ControlPlaneClient {
    async fn fetch_policy(&self) -> Result<SchedulePolicy> {
        let url = format!("{}/schedule", self.base_url);
        let response = self
            .request(&url)
            .send()
            .await
            .context(HttpSnafu { url: url.clone() })?
            .error_for_status()
            .context(HttpSnafu { url: url.clone() })?
            .json::<ScheduleResponse>()
            .await
            .context(HttpSnafu { url: url.clone() })?;

        parse_schedule_response(&url, response)
    }
}

#[async_trait]
impl ZoneDirectorySource for ControlPlaneClient {
    async fn fetch_zones(&self) -> Result<Vec<Zone>> {
        let url = format!("{}/zones", self.base_url);
        match self.request(&url).send().await.and_then(|r| r.error_for_status()) {
            Ok(response) => {
                let zones: Vec<Zone> = response.json().await.context(HttpSnafu { url })?;
                let sensors = self.fetch_sensors_uncached().await.unwrap_or_default();
                self.write_directory_cache(&zones, &sensors).await;
                Ok(zones)
            }
            Err(_) => {
                let (zones, _) = self.read_directory_cache().await?;
                Ok(zones)
            }
        }
    }

    async fn fetch_sensors(&self) -> Result<Vec<Sensor>> {
        match self.fetch_sensors_uncached().await {
            Ok(sensors) => Ok(sensors),
            Err(_) => {
                let (_, sensors) = self.read_directory_cache().await?;
                Ok(sensors)
            }
        }
    }
}

impl ControlPlaneClient {
    async fn fetch_sensors_uncached(&self) -> Result<Vec<Sensor>> {
        let url = format!("{}/sensor", self.base_url);
        self.request(&url)
            .send()
            .await
            .context(HttpSnafu { url: url.clone() })?
            .error_for_status()
            .context(HttpSnafu { url: url.clone() })?
            .json::<Vec<Sensor>>()
            .await
            .context(HttpSnafu { url })
    }
}

#[async_trait]
impl GradientClient for ControlPlaneClient {
    async fn fetch_table(&self, zone: ZoneId) -> Result<GradientTable> {
        #[derive(serde::Deserialize)]
        struct Row {
            delta: f64,
            gradient: f64,
            npoints: usize,
        }

        let url = format!("{}/zones/{}/gradients", self.base_url, zone);
        let rows: Vec<Row> = self
            .request(&url)
            .send()
            .await
            .context(HttpSnafu { url: url.clone() })?
            .error_for_status()
            .context(HttpSnafu { url: url.clone() })?
            .json()
            .await
            .context(HttpSnafu { url })?;

        let rows = rows
            .into_iter()
            .map(|r| GradientTableRow { delta: r.delta, mean_gradient: r.gradient, count: r.npoints })
            .collect();

        Ok(GradientTable::from_rows(rows))
    }

    async fn post_sample(&self, zone: ZoneId, when: DateTime<Utc>, sample: GradientSample) -> Result<()> {
        #[derive(serde::Serialize)]
        struct Body {
            when: String,
            delta: f64,
            gradient: f64,
        }

        let url = format!("{}/zones/{}/gradient_measurements", self.base_url, zone);
        let body = Body { when: when.to_rfc3339(), delta: sample.delta, gradient: sample.gradient };
        self.post_request(&url)
            .json(&body)
            .send()
            .await
            .context(HttpSnafu { url: url.clone() })?
            .error_for_status()
            .context(HttpSnafu { url })?;
        Ok(())
    }
}

#[async_trait]
impl ReportedStatePublisher for ControlPlaneClient {
    async fn publish(&self, state: &DeviceReportedState) -> Result<()> {
        let url = format!("{}/zones/{}/reported_state", self.base_url, state.zone);
        self.post_request(&url)
            .json(state)
            .send()
            .await
            .context(HttpSnafu { url: url.clone() })?
            .error_for_status()
            .context(HttpSnafu { url })?;
        Ok(())
    }
}

/// `GET api.openweathermap.org/data/2.5/weather`.
pub struct OpenWeatherClient {
    client: Client,
    api_key: String,
    location: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: String, location: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(HttpSnafu { url: "api.openweathermap.org".to_owned() })?;
        Ok(Self { client, api_key, location })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current_temperature(&self) -> Result<f64> {
        #[derive(serde::Deserialize)]
        struct Main {
            temp: f64,
        }
        #[derive(serde::Deserialize)]
        struct Response {
            main: Main,
        }

        let url = "https://api.openweathermap.org/data/2.5/weather".to_owned();
        let response: Response = self
            .client
            .get(&url)
            .query(&[
                ("q", self.location.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .context(HttpSnafu { url: url.clone() })?
            .error_for_status()
            .context(HttpSnafu { url: url.clone() })?
            .json()
            .await
            .context(HttpSnafu { url })?;

        Ok(response.main.temp)
    }
}
