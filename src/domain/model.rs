//! Per-pixel fits and the assembled model.
//!
//! `TrainedModel` is the in-memory result of a training run and is read-only
//! after assembly. `ModelFile` is its portable JSON form.

use chrono::{DateTime, Utc};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::types::check_len;
use crate::error::TrainError;
use crate::math::label_vector;

/// How the scatter search settled on its final scatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScatterOutcome {
    /// Interior grid minimum, refined by quadratic interpolation.
    Interior,
    /// Minimum at the smallest grid scatter.
    LowerBoundary,
    /// Minimum at the largest grid scatter.
    UpperBoundary,
    /// At least one grid objective was NaN; the largest grid scatter was used.
    NanObjective,
}

impl ScatterOutcome {
    pub const ALL: [ScatterOutcome; 4] = [
        ScatterOutcome::Interior,
        ScatterOutcome::LowerBoundary,
        ScatterOutcome::UpperBoundary,
        ScatterOutcome::NanObjective,
    ];

    /// Whether the scatter is poorly constrained for this pixel.
    pub fn is_degenerate(self) -> bool {
        self != ScatterOutcome::Interior
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ScatterOutcome::Interior => "interior",
            ScatterOutcome::LowerBoundary => "lower boundary",
            ScatterOutcome::UpperBoundary => "upper boundary",
            ScatterOutcome::NanObjective => "nan objective",
        }
    }
}

/// Fit of a single pixel.
#[derive(Debug, Clone)]
pub struct PixelFit {
    pub wavelength: f64,
    pub coefficients: DVector<f64>,
    pub inverse_covariance: DMatrix<f64>,
    pub covariance: DMatrix<f64>,
    pub scatter: f64,
    /// Signed whitened residual per star.
    pub chi: DVector<f64>,
    pub logdet_cinv: f64,
    pub outcome: ScatterOutcome,
}

/// A pixel left out of the model under `FailurePolicy::Skip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPixel {
    pub index: usize,
    pub wavelength: f64,
    pub reason: String,
}

/// Outcome of training one pixel, in pixel order.
#[derive(Debug, Clone)]
pub enum PixelResult {
    Fitted(PixelFit),
    Skipped(SkippedPixel),
}

/// Chi-squared summaries over the trained pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquaredDiagnostics {
    pub total: f64,
    /// Sum over trained pixels, per star.
    pub per_star: Vec<f64>,
    /// Sum over stars, per pixel (0 for skipped pixels).
    pub per_pixel: Vec<f64>,
    pub n_degenerate: usize,
    pub n_skipped: usize,
}

/// The assembled model: everything inference needs, in wavelength order.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub label_names: Vec<String>,
    pub wavelengths: Vec<f64>,
    /// Reference star ids, in training order.
    pub star_ids: Vec<String>,
    pub pivots: DVector<f64>,
    /// `n_pixels x width`; skipped pixels are zero rows.
    pub coefficients: DMatrix<f64>,
    pub scatters: DVector<f64>,
    /// Per pixel, `width x width` coefficient covariance.
    pub covariances: Vec<DMatrix<f64>>,
    /// `n_pixels x n_stars` squared chi.
    pub chisqs: DMatrix<f64>,
    /// `None` marks a skipped pixel.
    pub outcomes: Vec<Option<ScatterOutcome>>,
    pub skipped: Vec<SkippedPixel>,
    pub diagnostics: ChiSquaredDiagnostics,
}

impl TrainedModel {
    pub fn n_pixels(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn n_labels(&self) -> usize {
        self.pivots.len()
    }

    pub fn width(&self) -> usize {
        self.coefficients.ncols()
    }

    pub fn is_trained(&self, pixel: usize) -> bool {
        self.outcomes.get(pixel).is_some_and(|o| o.is_some())
    }

    /// Number of pixels per scatter-search outcome.
    pub fn outcome_counts(&self) -> Vec<(ScatterOutcome, usize)> {
        ScatterOutcome::ALL
            .iter()
            .map(|&kind| {
                let n = self.outcomes.iter().filter(|o| **o == Some(kind)).count();
                (kind, n)
            })
            .collect()
    }

    /// Model spectrum for one set of labels.
    ///
    /// Skipped pixels evaluate to NaN.
    pub fn predict_flux(&self, labels: &[f64]) -> Result<DVector<f64>, TrainError> {
        if labels.len() != self.n_labels() {
            return Err(TrainError::ShapeMismatch {
                what: "labels",
                expected: self.n_labels(),
                actual: labels.len(),
            });
        }
        let centered: Vec<f64> = labels.iter().zip(self.pivots.iter()).map(|(l, p)| l - p).collect();
        let row = label_vector::design_row(&centered);
        let mut flux = &self.coefficients * row;
        for (m, f) in flux.iter_mut().enumerate() {
            if !self.is_trained(m) {
                *f = f64::NAN;
            }
        }
        Ok(flux)
    }
}

/// Portable JSON representation of a `TrainedModel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub label_names: Vec<String>,
    pub wavelengths: Vec<f64>,
    pub star_ids: Vec<String>,
    pub pivots: Vec<f64>,
    /// One row per pixel.
    pub coefficients: Vec<Vec<f64>>,
    pub scatters: Vec<f64>,
    /// Row-major `width x width` per pixel.
    pub covariances: Vec<Vec<f64>>,
    /// One row per pixel.
    pub chisqs: Vec<Vec<f64>>,
    pub outcomes: Vec<Option<ScatterOutcome>>,
    pub skipped: Vec<SkippedPixel>,
    pub diagnostics: ChiSquaredDiagnostics,
}

impl ModelFile {
    pub fn from_model(model: &TrainedModel) -> Self {
        Self {
            tool: "cannon".to_string(),
            created: Utc::now(),
            label_names: model.label_names.clone(),
            wavelengths: model.wavelengths.clone(),
            star_ids: model.star_ids.clone(),
            pivots: model.pivots.iter().copied().collect(),
            coefficients: rows_of(&model.coefficients),
            scatters: model.scatters.iter().copied().collect(),
            covariances: model
                .covariances
                .iter()
                .map(|c| c.transpose().iter().copied().collect())
                .collect(),
            chisqs: rows_of(&model.chisqs),
            outcomes: model.outcomes.clone(),
            skipped: model.skipped.clone(),
            diagnostics: model.diagnostics.clone(),
        }
    }

    /// Rebuild the in-memory model, checking array shapes.
    pub fn into_model(self) -> Result<TrainedModel, TrainError> {
        let n_pixels = self.wavelengths.len();
        let n_labels = self.pivots.len();
        let width = label_vector::lvec_width(n_labels);
        let n_stars = self.star_ids.len();

        check_len("label names", n_labels, self.label_names.len())?;
        check_len("scatters", n_pixels, self.scatters.len())?;
        check_len("covariances", n_pixels, self.covariances.len())?;
        check_len("outcomes", n_pixels, self.outcomes.len())?;
        check_len("per-star chi-squared", n_stars, self.diagnostics.per_star.len())?;

        let coefficients = matrix_from_rows("coefficient rows", &self.coefficients, n_pixels, width)?;
        let chisqs = matrix_from_rows("chi-squared rows", &self.chisqs, n_pixels, n_stars)?;
        let covariances = self
            .covariances
            .iter()
            .map(|c| {
                check_len("covariance entries", width * width, c.len())?;
                Ok(DMatrix::from_row_slice(width, width, c))
            })
            .collect::<Result<Vec<_>, TrainError>>()?;

        Ok(TrainedModel {
            label_names: self.label_names,
            wavelengths: self.wavelengths,
            star_ids: self.star_ids,
            pivots: DVector::from_vec(self.pivots),
            coefficients,
            scatters: DVector::from_vec(self.scatters),
            covariances,
            chisqs,
            outcomes: self.outcomes,
            skipped: self.skipped,
            diagnostics: self.diagnostics,
        })
    }
}

fn rows_of(m: &DMatrix<f64>) -> Vec<Vec<f64>> {
    m.row_iter().map(|r| r.iter().copied().collect()).collect()
}

fn matrix_from_rows(
    what: &'static str,
    rows: &[Vec<f64>],
    nrows: usize,
    ncols: usize,
) -> Result<DMatrix<f64>, TrainError> {
    check_len(what, nrows, rows.len())?;
    for r in rows {
        check_len(what, ncols, r.len())?;
    }
    Ok(DMatrix::from_fn(nrows, ncols, |i, j| rows[i][j]))
}
