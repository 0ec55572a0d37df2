//! Uses the learned gradient table to give an (honestly-overestimated)
//! time-to-target: it assumes the starting gradient holds for the whole
//! climb, which a real thermal model would not.

use std::time::Duration;

use crate::gradient::GradientTable;
use crate::thermostat::Mode;

/// `None` unless the thermostat is actively heating, the target is above
/// the current reading, and the gradient table has at least one row.
pub fn estimate(
    mode: Mode,
    target: f64,
    reading: f64,
    outside_temp: f64,
    table: &GradientTable,
) -> Option<Duration> {
    let heating = matches!(mode, Mode::On | Mode::Pwm);
    if !heating || target <= reading {
        return None;
    }

    let delta_t = reading - outside_temp;
    let row = table.closest(delta_t)?;
    if row.mean_gradient <= 0.0 {
        return None;
    }

    let hours = (target - reading) / row.mean_gradient;
    Some(Duration::from_secs_f64(hours * 3600.0))
}
