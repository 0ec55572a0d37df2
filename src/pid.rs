//! Textbook PID controller, tuned for a slow thermal plant.
//!
//! The derivative term is taken on the process value rather than on the
//! error so that a setpoint change never produces a derivative spike.

/// Default proportional gain.
pub const DEFAULT_KP: f64 = 2.8;
/// Default integral gain.
pub const DEFAULT_KI: f64 = 0.3;
/// Default derivative gain.
pub const DEFAULT_KD: f64 = 1.8;
/// Outputs below this collapse to zero; otherwise the output is clamped to
/// `[MIN_OUTPUT, 1]`.
pub const MIN_OUTPUT: f64 = 0.15;

#[derive(Debug, Clone, Copy)]
pub struct PidState {
    kp: f64,
    ki: f64,
    kd: f64,
    min_output: f64,
    setpoint: f64,
    integral: f64,
    last_pv: Option<f64>,
}

impl PidState {
    pub fn new(setpoint: f64) -> Self {
        Self::with_gains(setpoint, DEFAULT_KP, DEFAULT_KI, DEFAULT_KD, MIN_OUTPUT)
    }

    pub fn with_gains(setpoint: f64, kp: f64, ki: f64, kd: f64, min_output: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            min_output,
            setpoint,
            integral: 0.0,
            last_pv: None,
        }
    }

    /// Set a new setpoint and zero the integrator. `last_pv` is deliberately
    /// left alone so the derivative term stays continuous across the change.
    pub fn reset(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
        self.integral = 0.0;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Run one control update and return the duty cycle in `{0} ∪ [min_output, 1]`.
    pub fn update(&mut self, pv: f64) -> f64 {
        let last_pv = self.last_pv.unwrap_or(pv);
        let error = self.setpoint - pv;

        self.integral = (self.integral + self.ki * error).clamp(-1.0, 1.0);
        let diff = pv - last_pv;
        let raw = self.kp * error + self.integral - self.kd * diff;

        self.last_pv = Some(pv);

        if raw < self.min_output {
            0.0
        } else {
            raw.min(1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_in_dead_zone_or_clamped_range() {
        let mut pid = PidState::new(20.0);
        for pv in [0.0, 10.0, 19.0, 19.9, 20.0, 20.1, 25.0, 100.0] {
            let out = pid.update(pv);
            assert!(out == 0.0 || (MIN_OUTPUT..=1.0).contains(&out), "out={out} for pv={pv}");
        }
    }

    #[test]
    fn first_update_has_zero_derivative() {
        let mut pid = PidState::with_gains(20.0, 0.0, 0.0, 10.0, 0.0);
        // With kp=ki=0, only the derivative term contributes. On the first
        // sample there is no prior pv, so the derivative must be zero.
        assert_eq!(pid.update(15.0), 0.0);
    }

    #[test]
    fn reset_keeps_last_pv_but_zeroes_integral() {
        let mut pid = PidState::new(20.0);
        pid.update(18.0);
        pid.update(18.5);
        assert!(pid.integral != 0.0);

        pid.reset(22.0);
        assert_eq!(pid.integral, 0.0);
        assert_eq!(pid.setpoint(), 22.0);
        // last_pv survived the reset: a pv equal to the last one yields a
        // zero derivative contribution again.
        assert_eq!(pid.last_pv, Some(18.5));
    }

    #[test]
    fn integral_is_clamped_against_windup() {
        let mut pid = PidState::new(100.0);
        for _ in 0..1000 {
            pid.update(0.0);
        }
        assert!(pid.integral <= 1.0);
    }
}
