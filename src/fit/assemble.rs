//! Model assembly: per-pixel results -> model-wide arrays.
//!
//! No fitting happens here. We only check that the caller handed over one
//! result per pixel with consistent shapes, lay the results out in pixel
//! order and compute chi-squared summaries.

use nalgebra::{DMatrix, DVector};

use crate::domain::types::check_len;
use crate::domain::{ChiSquaredDiagnostics, PixelResult, ScatterOutcome, SkippedPixel, TrainedModel};
use crate::error::TrainError;
use crate::math::lvec_width;

/// Names and sizes the assembled model is laid out against.
#[derive(Debug, Clone)]
pub struct ModelLayout {
    pub label_names: Vec<String>,
    pub wavelengths: Vec<f64>,
    pub star_ids: Vec<String>,
}

/// Collect per-pixel results (in pixel order) into a `TrainedModel`.
pub fn assemble(
    results: Vec<PixelResult>,
    pivots: &DVector<f64>,
    layout: ModelLayout,
) -> Result<TrainedModel, TrainError> {
    let n_pixels = layout.wavelengths.len();
    let n_stars = layout.star_ids.len();
    let width = lvec_width(pivots.len());

    check_len("pixel results", n_pixels, results.len())?;
    check_len("label names", pivots.len(), layout.label_names.len())?;

    let mut coefficients = DMatrix::<f64>::zeros(n_pixels, width);
    let mut scatters = DVector::<f64>::zeros(n_pixels);
    let mut covariances = Vec::with_capacity(n_pixels);
    let mut chisqs = DMatrix::<f64>::zeros(n_pixels, n_stars);
    let mut outcomes: Vec<Option<ScatterOutcome>> = Vec::with_capacity(n_pixels);
    let mut skipped: Vec<SkippedPixel> = Vec::new();

    for (m, result) in results.into_iter().enumerate() {
        match result {
            PixelResult::Fitted(fit) => {
                check_len("coefficients", width, fit.coefficients.len())?;
                check_len("covariance rows", width, fit.covariance.nrows())?;
                check_len("covariance columns", width, fit.covariance.ncols())?;
                check_len("chi", n_stars, fit.chi.len())?;
                if !fit.coefficients.iter().all(|c| c.is_finite()) {
                    return Err(TrainError::pixel(
                        m,
                        fit.wavelength,
                        TrainError::NonFiniteCoefficients {
                            scatter: fit.scatter,
                        },
                    ));
                }

                coefficients.row_mut(m).tr_copy_from(&fit.coefficients);
                scatters[m] = fit.scatter;
                for (n, chi) in fit.chi.iter().enumerate() {
                    chisqs[(m, n)] = chi * chi;
                }
                covariances.push(fit.covariance);
                outcomes.push(Some(fit.outcome));
            }
            PixelResult::Skipped(skip) => {
                covariances.push(DMatrix::zeros(width, width));
                outcomes.push(None);
                skipped.push(skip);
            }
        }
    }

    let per_star: Vec<f64> = chisqs.column_iter().map(|c| c.sum()).collect();
    let per_pixel: Vec<f64> = chisqs.row_iter().map(|r| r.sum()).collect();
    let diagnostics = ChiSquaredDiagnostics {
        total: per_pixel.iter().sum(),
        per_star,
        per_pixel,
        n_degenerate: outcomes
            .iter()
            .flatten()
            .filter(|o| o.is_degenerate())
            .count(),
        n_skipped: skipped.len(),
    };

    Ok(TrainedModel {
        label_names: layout.label_names,
        wavelengths: layout.wavelengths,
        star_ids: layout.star_ids,
        pivots: pivots.clone(),
        coefficients,
        scatters,
        covariances,
        chisqs,
        outcomes,
        skipped,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PixelFit;

    fn fit(wavelength: f64, c0: f64, outcome: ScatterOutcome) -> PixelResult {
        // One label -> width 3; two stars.
        PixelResult::Fitted(PixelFit {
            wavelength,
            coefficients: DVector::from_vec(vec![c0, 0.5, -0.1]),
            inverse_covariance: DMatrix::identity(3, 3),
            covariance: DMatrix::identity(3, 3) * 2.0,
            scatter: 0.01,
            chi: DVector::from_vec(vec![1.0, -2.0]),
            logdet_cinv: 3.0,
            outcome,
        })
    }

    fn layout(n_pixels: usize) -> ModelLayout {
        ModelLayout {
            label_names: vec!["teff".into()],
            wavelengths: (0..n_pixels).map(|i| 4000.0 + i as f64).collect(),
            star_ids: vec!["a".into(), "b".into()],
        }
    }

    #[test]
    fn preserves_pixel_order_and_squares_chi() {
        let results = vec![
            fit(4000.0, 1.0, ScatterOutcome::Interior),
            fit(4001.0, 2.0, ScatterOutcome::LowerBoundary),
            fit(4002.0, 3.0, ScatterOutcome::Interior),
        ];
        let pivots = DVector::from_vec(vec![5000.0]);
        let model = assemble(results, &pivots, layout(3)).unwrap();

        assert_eq!(model.coefficients.column(0).iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        assert_eq!(model.chisqs.row(1).iter().copied().collect::<Vec<_>>(), vec![1.0, 4.0]);
        assert_eq!(model.diagnostics.per_star, vec![3.0, 12.0]);
        assert_eq!(model.diagnostics.total, 15.0);
        assert_eq!(model.diagnostics.n_degenerate, 1);
        assert_eq!(model.covariances[2][(1, 1)], 2.0);
    }

    #[test]
    fn count_mismatch_is_a_contract_violation() {
        let results = vec![fit(4000.0, 1.0, ScatterOutcome::Interior)];
        let err = assemble(results, &DVector::from_vec(vec![0.0]), layout(2)).unwrap_err();
        assert!(matches!(
            err,
            TrainError::ShapeMismatch {
                what: "pixel results",
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn non_finite_coefficients_never_reach_the_model() {
        let results = vec![
            fit(4000.0, 1.0, ScatterOutcome::Interior),
            fit(4001.0, f64::INFINITY, ScatterOutcome::Interior),
        ];
        let err = assemble(results, &DVector::from_vec(vec![0.0]), layout(2)).unwrap_err();
        assert!(matches!(err, TrainError::Pixel { index: 1, .. }));
    }

    #[test]
    fn skipped_pixels_are_zero_filled() {
        let results = vec![
            PixelResult::Skipped(SkippedPixel {
                index: 0,
                wavelength: 4000.0,
                reason: "singular".into(),
            }),
            fit(4001.0, 2.0, ScatterOutcome::Interior),
        ];
        let model = assemble(results, &DVector::from_vec(vec![0.0]), layout(2)).unwrap();
        assert_eq!(model.outcomes[0], None);
        assert_eq!(model.diagnostics.n_skipped, 1);
        assert_eq!(model.diagnostics.per_pixel, vec![0.0, 5.0]);
        assert!(model.coefficients.row(0).iter().all(|&c| c == 0.0));
    }
}
