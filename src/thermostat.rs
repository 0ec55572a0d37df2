//! Per-zone thermostat state machine: bang-bang far from target, PID-driven
//! PWM near it, fail-safe off when data is missing or stale.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::pid::PidState;
use crate::pwm::PwmState;

/// A sensor reading, no older than a few minutes or it's considered stale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempReading {
    pub when: DateTime<Utc>,
    pub value: f64,
}

/// A sensor reading is stale once it is older than this.
pub const STALE_PERIOD: Duration = Duration::from_secs(600);
/// Width of the bang-bang-free zone around a target, in PWM mode.
pub const PWM_PERIOD: Duration = Duration::from_secs(600);
pub const DEFAULT_ZONE_WIDTH: f64 = 0.6;

#[derive(Debug, Clone, Copy)]
pub struct TemperatureSetting {
    pub center: f64,
    pub width: f64,
}

impl TemperatureSetting {
    pub fn new(center: f64) -> Self {
        Self::with_width(center, DEFAULT_ZONE_WIDTH)
    }

    pub fn with_width(center: f64, width: f64) -> Self {
        Self { center, width }
    }

    pub fn zone_min(&self) -> f64 {
        self.center - self.width / 2.0
    }

    pub fn zone_max(&self) -> f64 {
        self.center + self.width / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum Mode {
    Stale,
    On,
    Off,
    Pwm,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermostatState {
    pub mode: Mode,
    pub duty_cycle: f64,
}

/// What the thermostat wants the boiler relay to do this tick. The actual
/// publish/debounce decision is made by [`crate::debounce::Debouncer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoilerCommand {
    On,
    Off,
}

pub struct Thermostat {
    pid: PidState,
    pwm: PwmState,
    target: Option<TemperatureSetting>,
    reading: Option<TempReading>,
    measurement_begin: Option<DateTime<Utc>>,
    state: Option<ThermostatState>,
    on_change: Option<Box<dyn FnMut(Mode, f64) + Send>>,
}

impl Thermostat {
    pub fn new() -> Self {
        Self {
            pid: PidState::new(0.0),
            pwm: PwmState::new(0.0, PWM_PERIOD),
            target: None,
            reading: None,
            measurement_begin: None,
            state: None,
            on_change: None,
        }
    }

    pub fn on_state_change<F>(&mut self, callback: F)
    where
        F: FnMut(Mode, f64) + Send + 'static,
    {
        self.on_change = Some(Box::new(callback));
    }

    /// Current target in degrees C, or `None` if no target is set.
    pub fn current_target(&self) -> Option<f64> {
        self.target.map(|t| t.center)
    }

    /// No-op if unchanged; otherwise resets the PID with the new setpoint.
    pub fn set_target_temperature(&mut self, target: Option<f64>) {
        if target == self.current_target() {
            return;
        }

        self.target = target.map(TemperatureSetting::new);
        if let Some(t) = target {
            self.pid.reset(t);
        }
        // Force the next PWM entry to re-run the PID rather than reuse a
        // stale measurement window from before the setpoint changed.
        self.measurement_begin = None;
    }

    pub fn update_reading(&mut self, reading: TempReading) {
        self.reading = Some(reading);
    }

    pub fn last_state(&self) -> Option<ThermostatState> {
        self.state
    }

    pub fn last_reading(&self) -> Option<TempReading> {
        self.reading
    }

    /// Run the state machine for this tick and return the new state plus the
    /// boiler command the debouncer should consider.
    pub fn interval_elapsed(&mut self, now: DateTime<Utc>) -> (ThermostatState, BoilerCommand) {
        let stale = self.reading.is_none()
            || self.target.is_none()
            || self.reading.unwrap().when
                < now - chrono::Duration::from_std(STALE_PERIOD).unwrap();

        let (mode, duty, command) = if stale {
            self.measurement_begin = None;
            (Mode::Stale, 0.0, BoilerCommand::Off)
        } else {
            let reading = self.reading.unwrap().value;
            let target = self.target.unwrap();

            if reading < target.zone_min() {
                self.measurement_begin = None;
                (Mode::On, 1.0, BoilerCommand::On)
            } else if reading > target.zone_max() {
                self.measurement_begin = None;
                (Mode::Off, 0.0, BoilerCommand::Off)
            } else {
                let fresh_window = match self.measurement_begin {
                    None => true,
                    Some(begin) => begin + chrono::Duration::from_std(PWM_PERIOD).unwrap() < now,
                };
                if fresh_window {
                    self.measurement_begin = Some(now);
                    let duty = self.pid.update(reading);
                    self.pwm.set_duty_cycle(duty);
                }
                let active = self.pwm.update(now);
                let command = if active { BoilerCommand::On } else { BoilerCommand::Off };
                (Mode::Pwm, self.pwm.duty_cycle(), command)
            }
        };

        let new_state = ThermostatState { mode, duty_cycle: duty };
        if self.state != Some(new_state) {
            if let Some(cb) = self.on_change.as_mut() {
                cb(mode, duty);
            }
        }
        self.state = Some(new_state);

        (new_state, command)
    }
}

impl Default for Thermostat {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn no_target_forces_stale() {
        let mut thermo = Thermostat::new();
        thermo.update_reading(TempReading { when: t(0), value: 20.0 });
        let (state, cmd) = thermo.interval_elapsed(t(0));
        assert_eq!(state.mode, Mode::Stale);
        assert_eq!(cmd, BoilerCommand::Off);
    }

    #[test]
    fn stale_reading_overrides_everything() {
        let mut thermo = Thermostat::new();
        thermo.set_target_temperature(Some(20.0));
        thermo.update_reading(TempReading { when: t(0), value: 10.0 });
        let (state, cmd) = thermo.interval_elapsed(t(700));
        assert_eq!(state.mode, Mode::Stale);
        assert_eq!(cmd, BoilerCommand::Off);
    }

    #[test]
    fn below_zone_min_is_bang_bang_on() {
        let mut thermo = Thermostat::new();
        thermo.set_target_temperature(Some(20.0));
        thermo.update_reading(TempReading { when: t(0), value: 10.0 });
        let (state, cmd) = thermo.interval_elapsed(t(0));
        assert_eq!(state.mode, Mode::On);
        assert_eq!(state.duty_cycle, 1.0);
        assert_eq!(cmd, BoilerCommand::On);
    }

    #[test]
    fn above_zone_max_is_bang_bang_off() {
        let mut thermo = Thermostat::new();
        thermo.set_target_temperature(Some(20.0));
        thermo.update_reading(TempReading { when: t(0), value: 30.0 });
        let (state, cmd) = thermo.interval_elapsed(t(0));
        assert_eq!(state.mode, Mode::Off);
        assert_eq!(cmd, BoilerCommand::Off);
    }

    #[test]
    fn exact_zone_min_reading_enters_pwm_not_on() {
        // Open question resolved per spec: treat the PWM range as closed.
        let mut thermo = Thermostat::new();
        thermo.set_target_temperature(Some(20.0));
        thermo.update_reading(TempReading { when: t(0), value: 19.7 }); // zone_min at width 0.6
        let (state, _) = thermo.interval_elapsed(t(0));
        assert_eq!(state.mode, Mode::Pwm);
    }

    #[test]
    fn fresh_reading_at_target_enters_pwm_with_fresh_measurement_window() {
        let mut thermo = Thermostat::new();
        thermo.set_target_temperature(Some(20.0));
        thermo.update_reading(TempReading { when: t(0), value: 20.0 });
        let (state, _) = thermo.interval_elapsed(t(0));
        assert_eq!(state.mode, Mode::Pwm);
        assert_eq!(thermo.measurement_begin, Some(t(0)));
    }

    #[test]
    fn state_change_callback_fires_on_transition() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(vec![]));
        let seen2 = seen.clone();

        let mut thermo = Thermostat::new();
        thermo.on_state_change(move |mode, duty| seen2.lock().unwrap().push((mode, duty)));
        thermo.set_target_temperature(Some(20.0));

        thermo.update_reading(TempReading { when: t(0), value: 10.0 });
        thermo.interval_elapsed(t(0));
        thermo.update_reading(TempReading { when: t(1), value: 10.0 });
        thermo.interval_elapsed(t(1));
        thermo.update_reading(TempReading { when: t(2), value: 30.0 });
        thermo.interval_elapsed(t(2));

        let recorded = seen.lock().unwrap();
        assert_eq!(recorded.len(), 2); // On, then Off; the repeat tick is suppressed.
        assert_eq!(recorded[0].0, Mode::On);
        assert_eq!(recorded[1].0, Mode::Off);
    }
}
