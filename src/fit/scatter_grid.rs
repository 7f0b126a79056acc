//! Scatter grid generation.
//!
//! The intrinsic scatter is searched on a grid that is uniform in
//! `ln(scatter)`, starting at `ln(1e-4)` and stepping by 0.5 up to (but not
//! including) `ln(1) = 0`. That gives 19 candidates from `1e-4` to ~0.81.

use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Smallest scatter probed by default.
pub const DEFAULT_MIN_SCATTER: f64 = 1e-4;

/// Log-uniform grid over candidate scatter values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterGrid {
    /// First `ln(scatter)` value (inclusive).
    pub ln_min: f64,
    /// Upper `ln(scatter)` bound (exclusive).
    pub ln_max: f64,
    pub ln_step: f64,
}

impl Default for ScatterGrid {
    fn default() -> Self {
        Self {
            ln_min: DEFAULT_MIN_SCATTER.ln(),
            ln_max: 0.0,
            ln_step: 0.5,
        }
    }
}

impl ScatterGrid {
    /// Grid from scatter bounds rather than log bounds.
    pub fn from_scatter_range(min: f64, max: f64, ln_step: f64) -> Result<Self, TrainError> {
        if !(min.is_finite() && max.is_finite() && min > 0.0 && max > min) {
            return Err(TrainError::InvalidInput(format!(
                "invalid scatter range: min={min}, max={max} (must be finite, >0, and max>min)"
            )));
        }
        let grid = Self {
            ln_min: min.ln(),
            ln_max: max.ln(),
            ln_step,
        };
        grid.ln_values()?;
        Ok(grid)
    }

    /// The `ln(scatter)` candidates, in increasing order.
    pub fn ln_values(&self) -> Result<Vec<f64>, TrainError> {
        ln_arange(self.ln_min, self.ln_max, self.ln_step)
    }
}

/// `start, start + step, ...` strictly below `stop`.
///
/// The count is `ceil((stop - start) / step)`, the half-open range convention.
/// At least three points are required so an interior minimum can exist.
pub fn ln_arange(start: f64, stop: f64, step: f64) -> Result<Vec<f64>, TrainError> {
    if !(start.is_finite() && stop.is_finite() && step.is_finite() && step > 0.0 && stop > start) {
        return Err(TrainError::InvalidInput(format!(
            "invalid scatter grid: start={start}, stop={stop}, step={step}"
        )));
    }
    let n = ((stop - start) / step).ceil() as usize;
    if n < 3 {
        return Err(TrainError::InvalidInput(format!(
            "scatter grid needs at least 3 points, got {n}"
        )));
    }
    Ok((0..n).map(|i| start + step * i as f64).collect())
}
