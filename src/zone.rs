//! Per-zone orchestrator: pulls a target from the schedule, drives the
//! thermostat, keeps the gradient table and weather fresh, and publishes
//! the reported state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::collaborators::{BoilerSink, GradientClient, ReportedStatePublisher};
use crate::debounce::Debouncer;
use crate::gradient::{GradientMonitor, GradientTable};
use crate::schedule::{SchedulePolicy, ZoneId};
use crate::sensor::Zone;
use crate::thermostat::{Mode, TempReading, Thermostat};
use crate::time_to_target;
use crate::weather::WeatherSource;

pub const GRADIENT_TABLE_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReportedState {
    pub when: DateTime<Utc>,
    pub zone: ZoneId,
    pub mode: Mode,
    pub target: Option<f64>,
    pub current_temp: Option<f64>,
    pub outside_temp: Option<f64>,
    pub duty_cycle: f64,
    pub time_to_target_secs: Option<u64>,
    pub target_overridden: bool,
}

impl DeviceReportedState {
    /// Equality ignoring the timestamp, used to decide whether a fresh
    /// publish is warranted.
    fn same_content(&self, other: &Self) -> bool {
        self.zone == other.zone
            && self.mode == other.mode
            && self.target == other.target
            && self.current_temp == other.current_temp
            && self.outside_temp == other.outside_temp
            && self.duty_cycle == other.duty_cycle
            && self.time_to_target_secs == other.time_to_target_secs
            && self.target_overridden == other.target_overridden
    }
}

pub struct ZoneController {
    zone: Zone,
    thermostat: Thermostat,
    debouncer: Debouncer,
    gradient_monitor: GradientMonitor,
    gradient_table: GradientTable,
    last_gradient_refresh: Option<DateTime<Utc>>,
    outside_temp: Option<f64>,
    last_published: Option<DeviceReportedState>,
}

impl ZoneController {
    pub fn new(zone: Zone) -> Self {
        Self {
            zone,
            thermostat: Thermostat::new(),
            debouncer: Debouncer::new(),
            gradient_monitor: GradientMonitor::new(),
            gradient_table: GradientTable::default(),
            last_gradient_refresh: None,
            outside_temp: None,
            last_published: None,
        }
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone.zone_id
    }

    /// Out-of-band sensor update. Folds the reading into the thermostat and
    /// (best-effort) feeds the gradient monitor and posts any resulting
    /// sample. Errors here are logged, never propagated — a failure to post
    /// a gradient sample must not disturb delivery of the next message.
    pub async fn on_sensor_reading(
        &mut self,
        reading: TempReading,
        gradient_client: &dyn GradientClient,
    ) {
        self.thermostat.update_reading(reading);

        if let Some(outside) = self.outside_temp {
            self.gradient_monitor.set_outside_temperature(outside);
        }

        if let Some(sample) = self.gradient_monitor.temperature_update(reading.value, reading.when) {
            debug!("zone {}: new gradient sample {:?}", self.zone.zone_id, sample);
            if let Err(e) = gradient_client.post_sample(self.zone.zone_id, reading.when, sample).await {
                warn!("zone {}: failed to post gradient sample: {}", self.zone.zone_id, e);
            }
        }
    }

    /// Relay telemetry from `heating.info/<relay>`: the only source of truth
    /// for whether the boiler is actually on, used to time the gradient
    /// monitor's warm-up window. `cmd` is the reported hardware state, `"ON"`
    /// or `"OFF"`; anything else is ignored.
    pub fn on_boiler_info(&mut self, cmd: &str, now: DateTime<Utc>) {
        match cmd {
            "ON" => self.gradient_monitor.boiler_on(now),
            "OFF" => self.gradient_monitor.boiler_off(now),
            _ => warn!("zone {}: unrecognized relay state {:?}", self.zone.zone_id, cmd),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn tick(
        &mut self,
        now: DateTime<Utc>,
        policy: &SchedulePolicy,
        gradient_client: &dyn GradientClient,
        weather: &dyn WeatherSource,
        boiler_sink: &dyn BoilerSink,
        state_publisher: &dyn ReportedStatePublisher,
    ) {
        let target = policy.target(now, self.zone.zone_id);
        let target_overridden = policy.target_overridden(now, self.zone.zone_id);

        if self.thermostat.current_target() != target {
            info!(
                "zone {}: target {:?} -> {:?}",
                self.zone.zone_id,
                self.thermostat.current_target(),
                target
            );
            self.thermostat.set_target_temperature(target);
        }

        // The gradient table refresh and the weather poll are independent
        // network calls; run them concurrently rather than back to back.
        let want_gradient_refresh = self.gradient_table_needs_refresh(now);
        let zone_id = self.zone.zone_id;
        let gradient_fetch = async move {
            if want_gradient_refresh {
                Some(gradient_client.fetch_table(zone_id).await)
            } else {
                None
            }
        };
        let weather_fetch = weather.current_temperature(now);
        let (gradient_result, weather_result) = futures::join!(gradient_fetch, weather_fetch);

        if let Some(result) = gradient_result {
            match result {
                Ok(table) => {
                    self.gradient_table = table;
                    self.last_gradient_refresh = Some(now);
                }
                Err(e) => warn!("zone {}: gradient table refresh failed: {}", self.zone.zone_id, e),
            }
        }

        if let Ok(outside) = weather_result {
            self.outside_temp = Some(outside);
        }

        let (state, command) = self.thermostat.interval_elapsed(now);

        let eta = self.outside_temp.and_then(|outside| {
            self.thermostat.last_reading().and_then(|reading| {
                target.and_then(|t| {
                    time_to_target::estimate(state.mode, t, reading.value, outside, &self.gradient_table)
                })
            })
        });

        let reported = DeviceReportedState {
            when: now,
            zone: self.zone.zone_id,
            mode: state.mode,
            target,
            current_temp: self.thermostat.last_reading().map(|r| r.value),
            outside_temp: self.outside_temp,
            duty_cycle: state.duty_cycle,
            time_to_target_secs: eta.map(|d| d.as_secs()),
            target_overridden,
        };

        if self.debouncer.maybe_publish(command, now).is_some() {
            if let Err(e) = boiler_sink.send(&self.zone.boiler_relay, command.into()).await {
                warn!("zone {}: failed to send boiler command: {}", self.zone.zone_id, e);
            }
        }

        let changed = match &self.last_published {
            Some(prev) => !prev.same_content(&reported),
            None => true,
        };
        if changed {
            if let Err(e) = state_publisher.publish(&reported).await {
                warn!("zone {}: failed to publish reported state: {}", self.zone.zone_id, e);
            }
            self.last_published = Some(reported);
        }
    }

    fn gradient_table_needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self.last_gradient_refresh {
            None => true,
            Some(last) => {
                now - last > chrono::Duration::from_std(GRADIENT_TABLE_REFRESH_INTERVAL).unwrap()
            }
        }
    }
}
