//! Training orchestration.
//!
//! - `train_pixel`: one pixel, pure function of its column and the shared label vector
//! - `train`: every pixel, sequentially or on a rayon pool, under a failure policy
//!
//! Pixels never share mutable state. Results are collected by index, so the
//! model is the same whichever execution mode is used.

use std::time::Instant;

use log::{debug, error, info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{
    Execution, FailurePolicy, PixelFit, PixelResult, SkippedPixel, TrainConfig, TrainedModel,
    TrainingSet, clamp_ivars,
};
use crate::error::TrainError;
use crate::fit::assemble::{ModelLayout, assemble};
use crate::fit::profiler::optimize;
use crate::math::label_vector;

/// Fit one pixel: scatter search, then the coefficient covariance.
///
/// `ivars` are clamped to `ivar_floor` on a copy; the caller's data is untouched.
pub fn train_pixel(
    wavelength: f64,
    fluxes: &DVector<f64>,
    ivars: &DVector<f64>,
    lvec: &DMatrix<f64>,
    ln_grid: &[f64],
    ivar_floor: f64,
) -> Result<PixelFit, TrainError> {
    let ivars = clamp_ivars(ivars, ivar_floor);
    let fit = optimize(fluxes, &ivars, lvec, ln_grid)?;

    let covariance = fit
        .regression
        .inverse_covariance
        .clone()
        .try_inverse()
        .ok_or(TrainError::SingularSystem {
            scatter: fit.scatter,
        })?;

    Ok(PixelFit {
        wavelength,
        coefficients: fit.regression.coefficients,
        inverse_covariance: fit.regression.inverse_covariance,
        covariance,
        scatter: fit.scatter,
        chi: fit.regression.chi,
        logdet_cinv: fit.regression.logdet_cinv,
        outcome: fit.outcome,
    })
}

/// Train a model on every pixel of `set`.
pub fn train(set: &TrainingSet, config: &TrainConfig) -> Result<TrainedModel, TrainError> {
    set.validate()?;
    if !(config.ivar_floor.is_finite() && config.ivar_floor > 0.0) {
        return Err(TrainError::InvalidInput(format!(
            "ivar floor must be finite and > 0, got {}",
            config.ivar_floor
        )));
    }
    let ln_grid = config.scatter_grid.ln_values()?;

    let started = Instant::now();
    let lv = label_vector::build(&set.labels);
    info!(
        "Training {} pixels on {} stars with {} labels ({} coefficients per pixel, {} scatter candidates)",
        set.n_pixels(),
        set.n_stars(),
        set.n_labels(),
        lv.width(),
        ln_grid.len()
    );

    let run_pixel = |m: usize| -> Result<PixelResult, TrainError> {
        let wavelength = set.wavelengths[m];
        let (fluxes, ivars) = set.pixel(m);
        match train_pixel(wavelength, &fluxes, &ivars, &lv.lvec, &ln_grid, config.ivar_floor) {
            Ok(fit) => {
                if fit.outcome.is_degenerate() {
                    debug!(
                        "pixel {m} ({wavelength}): scatter search hit {}, scatter={:.3e}",
                        fit.outcome.display_name(),
                        fit.scatter
                    );
                }
                Ok(PixelResult::Fitted(fit))
            }
            Err(err) => match config.failure_policy {
                FailurePolicy::Abort => {
                    error!(
                        "pixel {m} ({wavelength}) failed: {err}; fluxes = {:?}",
                        fluxes.as_slice()
                    );
                    Err(TrainError::pixel(m, wavelength, err))
                }
                FailurePolicy::Skip => {
                    warn!(
                        "skipping pixel {m} ({wavelength}): {err}; fluxes = {:?}",
                        fluxes.as_slice()
                    );
                    Ok(PixelResult::Skipped(SkippedPixel {
                        index: m,
                        wavelength,
                        reason: err.to_string(),
                    }))
                }
            },
        }
    };

    let n_pixels = set.n_pixels();
    if let (Execution::Sequential, Some(threads)) = (config.execution, config.threads) {
        warn!("{threads} worker threads requested but execution is sequential; ignoring thread count");
    }
    let results: Vec<PixelResult> = match (config.execution, config.threads) {
        (Execution::Sequential, _) => (0..n_pixels)
            .map(run_pixel)
            .collect::<Result<Vec<PixelResult>, TrainError>>()?,
        (Execution::Parallel, None) => (0..n_pixels)
            .into_par_iter()
            .map(run_pixel)
            .collect::<Result<Vec<PixelResult>, TrainError>>()?,
        (Execution::Parallel, Some(threads)) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| TrainError::InvalidInput(format!("failed to build thread pool: {e}")))?;
            pool.install(|| {
                (0..n_pixels)
                    .into_par_iter()
                    .map(run_pixel)
                    .collect::<Result<Vec<PixelResult>, TrainError>>()
            })?
        }
    };

    let layout = ModelLayout {
        label_names: set.label_names.clone(),
        wavelengths: set.wavelengths.clone(),
        star_ids: set.ids.clone(),
    };
    let model = assemble(results, &lv.pivots, layout)?;

    let diag = &model.diagnostics;
    if diag.n_degenerate > 0 {
        warn!(
            "{} of {} pixels have a poorly constrained scatter (boundary or NaN optimum)",
            diag.n_degenerate, n_pixels
        );
    }
    if diag.n_skipped > 0 {
        warn!("{} of {} pixels were skipped", diag.n_skipped, n_pixels);
    }
    info!(
        "Done training: total chi^2 = {:.3}, elapsed {:.2?}",
        diag.total,
        started.elapsed()
    );

    Ok(model)
}
