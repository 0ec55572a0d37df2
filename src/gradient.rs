//! Learns how fast a zone warms up (°C/h) as a function of the
//! indoor-outdoor temperature delta, while the boiler is on.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

const WARMUP: Duration = Duration::from_secs(600);
const CAPTURE_INTERVAL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    CaptureFirst,
    CaptureInterval,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradientSample {
    pub delta: f64,
    pub gradient: f64,
}

pub struct GradientMonitor {
    mode: Mode,
    boiler_on_time: Option<DateTime<Utc>>,
    first_temp: Option<f64>,
    first_time: Option<DateTime<Utc>>,
    outside_temperature: Option<f64>,
}

impl GradientMonitor {
    pub fn new() -> Self {
        Self {
            mode: Mode::CaptureFirst,
            boiler_on_time: None,
            first_temp: None,
            first_time: None,
            outside_temperature: None,
        }
    }

    pub fn set_outside_temperature(&mut self, value: f64) {
        self.outside_temperature = Some(value);
    }

    pub fn boiler_on(&mut self, when: DateTime<Utc>) {
        if self.boiler_on_time.is_none() {
            self.boiler_on_time = Some(when);
        }
    }

    pub fn boiler_off(&mut self, _when: DateTime<Utc>) {
        self.boiler_on_time = None;
    }

    /// Feed a new indoor temperature reading; returns a sample when a full
    /// warm-up + capture window has elapsed.
    pub fn temperature_update(&mut self, temp: f64, when: DateTime<Utc>) -> Option<GradientSample> {
        let boiler_on_time = self.boiler_on_time?;
        let outside = self.outside_temperature?;

        match self.mode {
            Mode::CaptureFirst => {
                if when - boiler_on_time > chrono::Duration::from_std(WARMUP).unwrap() {
                    self.first_temp = Some(temp);
                    self.first_time = Some(when);
                    self.mode = Mode::CaptureInterval;
                }
                None
            }
            Mode::CaptureInterval => {
                let first_time = self.first_time?;
                if when - first_time > chrono::Duration::minutes(CAPTURE_INTERVAL_MINUTES) {
                    let first_temp = self.first_temp?;
                    let delta_temp = temp - first_temp;
                    let delta_hours = (when - first_time).num_seconds() as f64 / 3600.0;
                    self.mode = Mode::CaptureFirst;
                    Some(GradientSample {
                        delta: first_temp - outside,
                        gradient: delta_temp / delta_hours,
                    })
                } else {
                    None
                }
            }
        }
    }
}

impl Default for GradientMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// One row of the table built from persisted samples for a zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientTableRow {
    pub delta: f64,
    pub mean_gradient: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GradientTable {
    rows: Vec<GradientTableRow>,
}

/// `round(2·delta)/2`.
pub fn bucket(delta: f64) -> f64 {
    (2.0 * delta).round() / 2.0
}

impl GradientTable {
    /// Pre-aggregated rows, as served by the control plane's gradient
    /// endpoint rather than recomputed locally from raw samples.
    pub fn from_rows(rows: Vec<GradientTableRow>) -> Self {
        Self { rows }
    }

    pub fn from_samples(samples: &[GradientSample]) -> Self {
        let mut buckets: Vec<(f64, Vec<f64>)> = Vec::new();
        for sample in samples {
            let key = bucket(sample.delta);
            match buckets.iter_mut().find(|(b, _)| *b == key) {
                Some((_, gradients)) => gradients.push(sample.gradient),
                None => buckets.push((key, vec![sample.gradient])),
            }
        }
        buckets.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let rows = buckets
            .into_iter()
            .map(|(delta, gradients)| {
                let count = gradients.len();
                let mean_gradient = gradients.iter().sum::<f64>() / count as f64;
                GradientTableRow { delta, mean_gradient, count }
            })
            .collect();

        Self { rows }
    }

    pub fn rows(&self) -> &[GradientTableRow] {
        &self.rows
    }

    /// Row whose bucket is closest to `delta_t`, ties broken by first
    /// occurrence.
    pub fn closest(&self, delta_t: f64) -> Option<&GradientTableRow> {
        self.rows
            .iter()
            .min_by(|a, b| (a.delta - delta_t).abs().partial_cmp(&(b.delta - delta_t).abs()).unwrap())
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
    fn no_boiler_on_time_or_outside_temp_yields_nothing() {
        let mut monitor = GradientMonitor::new();
        assert_eq!(monitor.temperature_update(20.0, t(0)), None);

        monitor.boiler_on(t(0));
        assert_eq!(monitor.temperature_update(20.0, t(0)), None); // still no outside temp
    }

    #[test]
    fn full_warmup_and_capture_cycle_emits_a_sample() {
        let mut monitor = GradientMonitor::new();
        monitor.set_outside_temperature(10.0);
        monitor.boiler_on(t(0));

        assert_eq!(monitor.temperature_update(20.0, t(0)), None);
        // Still within warmup (60s here is well under 600s).
        assert_eq!(monitor.temperature_update(21.0, t(120)), None);
        // Crosses the 600s warmup boundary: captures the first reading.
        assert_eq!(monitor.temperature_update(21.0, t(601)), None);

        // 20 minutes later (well past the 10 minute capture interval).
        let sample = monitor.temperature_update(23.0, t(601 + 1200)).unwrap();
        assert_eq!(sample.delta, 11.0); // 21 - 10
        assert!((sample.gradient - 6.0).abs() < 1e-9); // (23-21) over 20 minutes -> 6 C/h
    }

    #[test]
    fn boiler_off_clears_the_on_time() {
        let mut monitor = GradientMonitor::new();
        monitor.set_outside_temperature(10.0);
        monitor.boiler_on(t(0));
        monitor.boiler_off(t(10));
        assert_eq!(monitor.temperature_update(20.0, t(700)), None);
    }

    #[test]
    fn bucket_rounds_to_nearest_half_degree() {
        assert_eq!(bucket(5.1), 5.0);
        assert_eq!(bucket(5.26), 5.5);
        assert_eq!(bucket(-2.3), -2.5);
    }

    #[test]
    fn table_groups_samples_by_bucket_and_averages() {
        let samples = vec![
            GradientSample { delta: 5.1, gradient: 1.0 },
            GradientSample { delta: 4.9, gradient: 3.0 },
            GradientSample { delta: 10.2, gradient: 2.0 },
        ];
        let table = GradientTable::from_samples(&samples);
        assert_eq!(table.rows().len(), 2);
        assert_eq!(table.rows()[0].delta, 5.0);
        assert_eq!(table.rows()[0].count, 2);
        assert_eq!(table.rows()[0].mean_gradient, 2.0);
        assert_eq!(table.rows()[1].delta, 10.0);
    }
}
