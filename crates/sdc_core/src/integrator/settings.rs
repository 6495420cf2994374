//! Configuration for an integrator batch.

use crate::error::{SdcError, SdcResult};
use crate::quadrature::SdcOrder;
use crate::traits::{lit, Scalar};
use serde::{Deserialize, Serialize};

/// Adaptive step-size control band.
///
/// The proposed step is `safety * dt_est`, then clamped to
/// `[dt / growth, dt * growth]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepControl {
    pub safety: f64,
    pub growth: f64,
}

impl Default for StepControl {
    fn default() -> Self {
        Self {
            safety: 0.9,
            growth: 4.0,
        }
    }
}

impl StepControl {
    /// Next step size for fourth-order error control.
    ///
    /// `dt_est = dt * |tolerance / newton_error|^0.2`, scaled by `safety`, kept
    /// within the growth band and never past `remaining`.
    pub fn next_time_step<T: Scalar>(&self, dt: T, tolerance: T, newton_error: T, remaining: T) -> T {
        let growth = lit::<T>(self.growth);
        let dt_est = dt * (tolerance / newton_error).abs().powf(lit(0.2));
        (lit::<T>(self.safety) * dt_est)
            .max(dt / growth)
            .min(dt * growth)
            .min(remaining)
    }
}

/// Settings shared by every lane of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdcSettings {
    pub start_time: f64,
    pub end_time: f64,
    /// Initial step size; zero selects a tenth of the time window.
    pub time_step: f64,
    pub tolerance: f64,
    pub maximum_newton: usize,
    pub fail_if_maximum_newton: bool,
    pub maximum_steps: usize,
    /// Floor added to norms and used for the end-time comparison.
    pub small: f64,
    pub use_adaptive_timestep: bool,
    pub order: SdcOrder,
    pub step_control: StepControl,
}

impl Default for SdcSettings {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 1.0,
            time_step: 0.0,
            tolerance: 1e-6,
            maximum_newton: 100,
            fail_if_maximum_newton: true,
            maximum_steps: 1_000_000,
            small: 2.5e-16,
            use_adaptive_timestep: true,
            order: SdcOrder::Fourth,
            step_control: StepControl::default(),
        }
    }
}

impl SdcSettings {
    pub fn validate(&self) -> SdcResult<()> {
        let invalid = |msg: String| Err(SdcError::InvalidSettings(msg));
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return invalid("start and end times must be finite".into());
        }
        if self.end_time <= self.start_time {
            return invalid(format!(
                "end_time ({}) must be greater than start_time ({})",
                self.end_time, self.start_time
            ));
        }
        if !(self.time_step >= 0.0) {
            return invalid(format!("time_step must be non-negative, got {}", self.time_step));
        }
        if !(self.tolerance > 0.0) {
            return invalid(format!("tolerance must be positive, got {}", self.tolerance));
        }
        if !(self.small > 0.0) {
            return invalid(format!("small must be positive, got {}", self.small));
        }
        if !(self.step_control.safety > 0.0) {
            return invalid(format!(
                "step_control.safety must be positive, got {}",
                self.step_control.safety
            ));
        }
        if !(self.step_control.growth >= 1.0) {
            return invalid(format!(
                "step_control.growth must be at least 1, got {}",
                self.step_control.growth
            ));
        }
        Ok(())
    }

    /// Step size used for the first step.
    pub fn initial_time_step(&self) -> f64 {
        if self.time_step == 0.0 {
            (self.end_time - self.start_time) / 10.0
        } else {
            self.time_step
        }
    }
}
