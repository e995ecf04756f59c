//! Numeric clamping and step snapping.

use super::{Bounds, Helper, NumberBounds};
use crate::outcome::{Outcome, Presence};

/// Limits a numeric value to a range and an optional step grid.
///
/// Limiting clamps the candidate into `[min, max]`, snaps it to the
/// nearest multiple of `step` offset by `step_start` (ties round
/// half-up, stepping back inward when a snap would cross an off-grid
/// bound), and rounds to `decimals` digits. When `decimals` is not
/// given it is derived from the decimal widths of `step` and
/// `step_start`, so snapped values print exactly.
#[derive(Debug, Clone, Default)]
pub struct NumberHelper {
    min: Option<f64>,
    max: Option<f64>,
    unit: Option<String>,
    decimals: Option<u32>,
    step: Option<f64>,
    step_start: Option<f64>,
}

impl NumberHelper {
    /// Creates a helper with no bounds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the acceptable range.
    #[must_use]
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    /// Sets the minimum acceptable value.
    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Sets the maximum acceptable value.
    #[must_use]
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Sets the display unit.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Sets the number of digits kept after the decimal point.
    #[must_use]
    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// Sets the step grid spacing. `0.1` accepts 0, 0.1, 0.2, ...
    #[must_use]
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    /// Sets the step grid offset. With step 2 and start 0.5 the grid is
    /// 0.5, 2.5, 4.5, ...
    #[must_use]
    pub fn with_step_start(mut self, start: f64) -> Self {
        self.step_start = Some(start);
        self
    }

    /// The decimal width used for rounding snapped values.
    fn effective_decimals(&self) -> u32 {
        if let Some(d) = self.decimals {
            return d;
        }
        let step_width = self.step.map_or(0, decimal_width);
        let start_width = self.step_start.map_or(0, decimal_width);
        step_width.max(start_width)
    }
}

/// Number of significant decimal places in the shortest representation
/// of `x`, e.g. `0.13` → 2, `2.5e-5` → 6, `13` → 0.
fn decimal_width(x: f64) -> u32 {
    let repr = format!("{x}");
    let (mantissa, exponent) = match repr.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (repr.as_str(), 0),
    };
    let fraction = mantissa
        .split_once('.')
        .map_or(0, |(_, frac)| frac.len() as i32);
    (fraction - exponent).max(0) as u32
}

/// Rounds half-up, toward positive infinity on ties.
fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Rounds to `decimals` digits the way a panel would print the value.
fn round_to_decimals(x: f64, decimals: u32) -> f64 {
    format!("{:.*}", decimals as usize, x).parse().unwrap_or(x)
}

impl Helper<f64> for NumberHelper {
    fn limit(&self, value: f64) -> Outcome<f64> {
        let clamp = |x: f64| {
            let mut x = x;
            if let Some(max) = self.max {
                x = x.min(max);
            }
            if let Some(min) = self.min {
                x = x.max(min);
            }
            x
        };
        let mut v = clamp(value);
        if let Some(step) = self.step.filter(|s| *s != 0.0) {
            let start = self.step_start.unwrap_or(0.0);
            let decimals = self.effective_decimals();
            let mut snapped = round_to_decimals(
                round_half_up((v - start + f64::EPSILON) / step) * step + start,
                decimals,
            );
            // Snapping may cross a bound when the bound is off the step
            // grid; step back toward the inside of the range.
            if self.max.is_some_and(|max| snapped > max) {
                snapped = round_to_decimals(snapped - step, decimals);
            } else if self.min.is_some_and(|min| snapped < min) {
                snapped = round_to_decimals(snapped + step, decimals);
            }
            // A range narrower than one step holds no grid point at all;
            // settle on the upper bound so every candidate limits to the
            // same value.
            if self.min.is_some_and(|min| snapped < min)
                || self.max.is_some_and(|max| snapped > max)
            {
                snapped = self.max.unwrap_or(snapped);
            }
            v = clamp(snapped);
        }
        Outcome::Valid(v)
    }

    fn check(&self, value: &f64) -> Presence<String> {
        if let Some(max) = self.max {
            if *value > max {
                return Presence::Present(format!("{value} is bigger than the limit of {max}"));
            }
        }
        if let Some(min) = self.min {
            if *value < min {
                return Presence::Present(format!("{value} is smaller than the limit of {min}"));
            }
        }
        Presence::Absent
    }

    fn related(&self) -> Presence<Bounds> {
        Presence::Present(Bounds::Number(NumberBounds {
            min: self.min,
            max: self.max,
            unit: self.unit.clone(),
            decimals: self.decimals.or_else(|| {
                self.step.is_some().then(|| self.effective_decimals())
            }),
            step: self.step,
            step_start: self.step_start,
        }))
    }
}
