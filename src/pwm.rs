//! Duty-cycle modulator driving a bound on/off actuator over a fixed period.

use std::time::Duration;

use chrono::{DateTime, Utc};

fn scale(period: Duration, duty: f64) -> Duration {
    Duration::from_secs_f64(period.as_secs_f64() * duty)
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::zero())
}

#[derive(Debug, Clone)]
pub struct PwmState {
    duty: f64,
    period: Duration,
    on_period: Duration,
    cycle_start: Option<DateTime<Utc>>,
    active: bool,
}

impl PwmState {
    pub fn new(duty: f64, period: Duration) -> Self {
        let duty = clamp_duty(duty);
        Self {
            duty,
            period,
            on_period: scale(period, duty),
            cycle_start: None,
            active: false,
        }
    }

    pub fn duty_cycle(&self) -> f64 {
        self.duty
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Changing the duty cycle mid-cycle forces a fresh cycle on the next
    /// `update`.
    pub fn set_duty_cycle(&mut self, duty: f64) {
        self.duty = clamp_duty(duty);
        self.cycle_start = None;
    }

    /// Advance the modulator and return whether the actuator should be on.
    pub fn update(&mut self, now: DateTime<Utc>) -> bool {
        let needs_new_cycle = match self.cycle_start {
            None => true,
            Some(start) => start + chrono_duration(self.period) <= now,
        };

        if needs_new_cycle {
            self.on_period = scale(self.period, self.duty);
            self.cycle_start = Some(now);
            self.active = self.on_period > Duration::ZERO;
        } else if self.active {
            let on_end = self.cycle_start.unwrap() + chrono_duration(self.on_period);
            if on_end <= now {
                self.active = false;
            }
        }

        self.active
    }
}

/// Outputs below 0.15 collapse to zero; the rest is clamped to [0, 1].
fn clamp_duty(duty: f64) -> f64 {
    let clamped = duty.clamp(0.0, 1.0);
    if clamped < 0.15 {
        0.0
    } else {
        clamped
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
    fn zero_duty_never_turns_on() {
        let mut pwm = PwmState::new(0.0, Duration::from_secs(600));
        for s in (0..1200).step_by(50) {
            assert!(!pwm.update(t(s)));
        }
    }

    #[test]
    fn full_duty_stays_on_for_whole_period() {
        let mut pwm = PwmState::new(1.0, Duration::from_secs(600));
        assert!(pwm.update(t(0)));
        assert!(pwm.update(t(599)));
    }

    #[test]
    fn half_duty_turns_off_halfway_through_the_period() {
        let mut pwm = PwmState::new(0.5, Duration::from_secs(600));
        assert!(pwm.update(t(0)));
        assert!(pwm.update(t(200)));
        assert!(!pwm.update(t(300)));
        assert!(!pwm.update(t(599)));
        // New cycle begins.
        assert!(pwm.update(t(600)));
    }

    #[test]
    fn changing_duty_mid_cycle_forces_a_fresh_cycle() {
        // duty 0.15 -> a 90s on-period within the 600s cycle.
        let mut pwm = PwmState::new(0.15, Duration::from_secs(600));
        assert!(pwm.update(t(0)));
        assert!(!pwm.update(t(100)));
        pwm.set_duty_cycle(1.0);
        assert!(pwm.update(t(150)));
    }

    #[test]
    fn below_minimum_output_collapses_to_zero() {
        let pwm = PwmState::new(0.1, Duration::from_secs(600));
        assert_eq!(pwm.duty_cycle(), 0.0);
    }
}
