//! Owns the set of per-zone controllers and the shared schedule snapshot,
//! and drives them from a single outer tick.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::collaborators::{
    BoilerSink, GradientClient, ReportedStatePublisher, SchedulePolicySource, ZoneDirectorySource,
};
use crate::schedule::{SchedulePolicy, ZoneId};
use crate::sensor::{Sensor, SensorId, SensorPayload, Zone};
use crate::thermostat::TempReading;
use crate::weather::WeatherSource;
use crate::zone::ZoneController;

pub const SCHEDULER_UPDATE_INTERVAL: Duration = Duration::from_secs(60);
pub const DIRECTORY_UPDATE_INTERVAL: Duration = Duration::from_secs(3600);

pub struct MultiZoneController {
    zones: HashMap<ZoneId, ZoneController>,
    sensor_zone: HashMap<SensorId, ZoneId>,
    sensor_locator: HashMap<String, SensorId>,
    relay_zone: HashMap<String, ZoneId>,
    policy: ArcSwap<SchedulePolicy>,
    last_policy_refresh: Option<DateTime<Utc>>,
    last_directory_refresh: Option<DateTime<Utc>>,
}

impl MultiZoneController {
    /// `now` is the instant the caller already fetched `zones`/`sensors` at,
    /// so the first periodic directory refresh is scheduled from there
    /// rather than immediately repeating the fetch the caller just did.
    pub fn new(zones: Vec<Zone>, sensors: Vec<Sensor>, now: DateTime<Utc>) -> Self {
        let sensor_zone = zones.iter().map(|z| (z.sensor_id, z.zone_id)).collect();
        let sensor_locator = sensors.iter().map(|s| (s.locator.clone(), s.sensor_id)).collect();
        let relay_zone = zones.iter().map(|z| (z.boiler_relay.clone(), z.zone_id)).collect();
        let controllers = zones.into_iter().map(|z| (z.zone_id, ZoneController::new(z))).collect();

        Self {
            zones: controllers,
            sensor_zone,
            sensor_locator,
            relay_zone,
            policy: ArcSwap::from_pointee(SchedulePolicy::default()),
            last_policy_refresh: None,
            last_directory_refresh: Some(now),
        }
    }

    /// Handles an inbound `sensor.<locator>` message. Unknown locators and
    /// payloads without a temperature are logged and ignored (§7): one
    /// malformed reading must never block the rest of the fleet.
    pub async fn on_sensor_message(
        &mut self,
        locator: &str,
        payload: &SensorPayload,
        now: DateTime<Utc>,
        gradient_client: &dyn GradientClient,
    ) {
        let Some(temperature) = payload.temperature else {
            warn!("sensor {}: payload has no temperature, ignoring", locator);
            return;
        };

        let Some(sensor_id) = self.sensor_locator.get(locator) else {
            warn!("sensor {}: no known sensor for this locator", locator);
            return;
        };

        let Some(zone_id) = self.sensor_zone.get(sensor_id) else {
            warn!("sensor {}: no zone maps to sensor {}", locator, sensor_id);
            return;
        };

        if let Some(zone) = self.zones.get_mut(zone_id) {
            zone.on_sensor_reading(TempReading { when: now, value: temperature }, gradient_client).await;
        }
    }

    /// Handles an inbound `heating.info/<relay>` message: the real relay
    /// telemetry that feeds the gradient monitor's boiler on/off timing.
    /// Unknown relays are logged and ignored.
    pub fn on_boiler_info(&mut self, relay: &str, cmd: &str, now: DateTime<Utc>) {
        let Some(zone_id) = self.relay_zone.get(relay) else {
            warn!("relay {}: no zone maps to this boiler relay", relay);
            return;
        };

        if let Some(zone) = self.zones.get_mut(zone_id) {
            zone.on_boiler_info(cmd, now);
        }
    }

    /// Forces the next `iteration` to refresh the schedule snapshot
    /// regardless of [`SCHEDULER_UPDATE_INTERVAL`], for
    /// `thermostat.schedule_changed` and `thermostat.status` ("online").
    pub fn request_policy_refresh(&mut self) {
        self.last_policy_refresh = None;
    }

    fn policy_needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.last_policy_refresh {
            None => true,
            Some(last) => now - last > chrono::Duration::from_std(SCHEDULER_UPDATE_INTERVAL).unwrap(),
        }
    }

    fn directory_needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.last_directory_refresh {
            None => true,
            Some(last) => now - last > chrono::Duration::from_std(DIRECTORY_UPDATE_INTERVAL).unwrap(),
        }
    }

    /// Refreshes the shared schedule snapshot and the zone/sensor directory
    /// if either is due, then drives every zone's tick against the current
    /// snapshot.
    #[allow(clippy::too_many_arguments)]
    pub async fn iteration(
        &mut self,
        now: DateTime<Utc>,
        schedule_source: &dyn SchedulePolicySource,
        directory_source: &dyn ZoneDirectorySource,
        gradient_client: &dyn GradientClient,
        weather: &dyn WeatherSource,
        boiler_sink: &dyn BoilerSink,
        state_publisher: &dyn ReportedStatePublisher,
    ) {
        if self.directory_needs_refresh(now) {
            if let Err(e) = self.refresh_directory(directory_source).await {
                warn!("directory refresh failed, keeping the current directory: {}", e);
            } else {
                self.last_directory_refresh = Some(now);
            }
        }

        if self.policy_needs_refresh(now) {
            match schedule_source.fetch_policy().await {
                Ok(policy) => {
                    self.policy.store(Arc::new(policy));
                    self.last_policy_refresh = Some(now);
                }
                Err(e) => warn!("schedule refresh failed, keeping the last snapshot: {}", e),
            }
        }

        let policy = self.policy.load();
        for zone in self.zones.values_mut() {
            zone.tick(now, &policy, gradient_client, weather, boiler_sink, state_publisher).await;
        }
    }

    /// Rebuilds the zone/sensor directory from the control plane, falling
    /// back to whatever directory source already did the local-cache dance.
    pub async fn refresh_directory(&mut self, directory: &dyn ZoneDirectorySource) -> crate::error::Result<()> {
        let zones = directory.fetch_zones().await?;
        let sensors = directory.fetch_sensors().await?;

        info!("directory refresh: {} zones, {} sensors", zones.len(), sensors.len());

        self.sensor_zone = zones.iter().map(|z| (z.sensor_id, z.zone_id)).collect();
        self.sensor_locator = sensors.iter().map(|s| (s.locator.clone(), s.sensor_id)).collect();
        self.relay_zone = zones.iter().map(|z| (z.boiler_relay.clone(), z.zone_id)).collect();

        let mut controllers = std::mem::take(&mut self.zones);
        self.zones = zones
            .into_iter()
            .map(|z| {
                let controller = controllers.remove(&z.zone_id).unwrap_or_else(|| ZoneController::new(z.clone()));
                (z.zone_id, controller)
            })
            .collect();

        Ok(())
    }
}
