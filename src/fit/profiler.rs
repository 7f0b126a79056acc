//! Per-pixel intrinsic scatter search.
//!
//! The likelihood surface over the scatter has no closed form, so we:
//!
//! 1. solve the weighted regression at every point of a log-uniform grid and
//!    score each with `chi^2 - ln det Cinv` (lower is better)
//! 2. pick the grid minimum (first occurrence on ties)
//! 3. refine an interior minimum by the vertex of the parabola through the
//!    minimum and its two neighbours, in `ln(scatter)`
//! 4. solve once more at the chosen scatter
//!
//! Fallbacks, applied instead of refinement:
//! - any NaN score: use the largest grid scatter
//! - minimum on the first or last grid point: use that grid scatter

use nalgebra::{DMatrix, DVector};

use crate::domain::ScatterOutcome;
use crate::error::TrainError;
use crate::math::{Regression, solve_at_scatter};

/// Final regression of one pixel and the scatter it was solved at.
#[derive(Debug, Clone)]
pub struct ScatterFit {
    pub regression: Regression,
    pub scatter: f64,
    pub outcome: ScatterOutcome,
}

/// Which `ln(scatter)` to solve at, and how it was chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterChoice {
    pub ln_scatter: f64,
    pub outcome: ScatterOutcome,
}

/// Scan `ln_grid`, pick a scatter, and return the regression at that scatter.
///
/// Any regression failure on the grid is returned as-is.
pub fn optimize(
    fluxes: &DVector<f64>,
    ivars: &DVector<f64>,
    lvec: &DMatrix<f64>,
    ln_grid: &[f64],
) -> Result<ScatterFit, TrainError> {
    let objectives = ln_grid
        .iter()
        .map(|&ln_s| solve_at_scatter(fluxes, ivars, lvec, ln_s.exp()).map(|r| r.objective()))
        .collect::<Result<Vec<f64>, TrainError>>()?;

    let choice = choose_ln_scatter(ln_grid, &objectives);
    let scatter = choice.ln_scatter.exp();
    let regression = solve_at_scatter(fluxes, ivars, lvec, scatter)?;

    Ok(ScatterFit {
        regression,
        scatter,
        outcome: choice.outcome,
    })
}

/// Apply the grid-minimum / fallback / refinement rules to a scored grid.
///
/// # Panics
/// Panics if `ln_grid` is empty or the slices differ in length.
pub fn choose_ln_scatter(ln_grid: &[f64], objectives: &[f64]) -> ScatterChoice {
    assert_eq!(ln_grid.len(), objectives.len(), "one objective per grid point");
    let last = ln_grid.len() - 1;

    if objectives.iter().any(|v| v.is_nan()) {
        return ScatterChoice {
            ln_scatter: ln_grid[last],
            outcome: ScatterOutcome::NanObjective,
        };
    }

    let mut lowest = 0;
    for (i, &v) in objectives.iter().enumerate().skip(1) {
        if v < objectives[lowest] {
            lowest = i;
        }
    }

    if lowest == 0 {
        return ScatterChoice {
            ln_scatter: ln_grid[0],
            outcome: ScatterOutcome::LowerBoundary,
        };
    }
    if lowest == last {
        return ScatterChoice {
            ln_scatter: ln_grid[last],
            outcome: ScatterOutcome::UpperBoundary,
        };
    }

    let xs = [ln_grid[lowest - 1], ln_grid[lowest], ln_grid[lowest + 1]];
    let ys = [objectives[lowest - 1], objectives[lowest], objectives[lowest + 1]];
    let ln_scatter = parabola_vertex(xs, ys).unwrap_or(ln_grid[lowest]);

    ScatterChoice {
        ln_scatter,
        outcome: ScatterOutcome::Interior,
    }
}

/// Stationary point of the quadratic through three points.
///
/// `None` when the points do not bend upwards.
pub fn parabola_vertex(xs: [f64; 3], ys: [f64; 3]) -> Option<f64> {
    // Newton divided differences: y = a x^2 + b x + c.
    let d01 = (ys[1] - ys[0]) / (xs[1] - xs[0]);
    let d12 = (ys[2] - ys[1]) / (xs[2] - xs[1]);
    let a = (d12 - d01) / (xs[2] - xs[0]);
    if !(a > 0.0) {
        return None;
    }
    let b = d01 - a * (xs[0] + xs[1]);
    let vertex = -b / (2.0 * a);
    vertex.is_finite().then_some(vertex)
}
