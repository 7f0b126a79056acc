//! Shared domain types: the training set, run configuration and policy enums.
//!
//! The training set owns its arrays; the core only ever reads them. Every
//! transform (label subset, star subset, ivar floor) returns new data.

use clap::ValueEnum;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::TrainError;
use crate::fit::scatter_grid::ScatterGrid;
use crate::math::lvec_width;

/// Default inverse-variance floor applied before any fit.
///
/// An ivar of (near) zero makes the normal equations singular.
pub const DEFAULT_IVAR_FLOOR: f64 = 0.01;

/// How pixels are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Execution {
    /// One pixel after another on the calling thread.
    Sequential,
    /// Rayon parallel map over pixels.
    Parallel,
}

/// What to do when a single pixel cannot be fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop the run and return the pixel's error.
    Abort,
    /// Record the pixel as skipped and keep going.
    Skip,
}

/// Training run configuration.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub ivar_floor: f64,
    pub scatter_grid: ScatterGrid,
    pub execution: Execution,
    /// Worker threads for `Execution::Parallel` (`None` = rayon's global pool).
    pub threads: Option<usize>,
    pub failure_policy: FailurePolicy,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            ivar_floor: DEFAULT_IVAR_FLOOR,
            scatter_grid: ScatterGrid::default(),
            execution: Execution::Parallel,
            threads: None,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

/// Reference stars with labels and spectra on a common wavelength grid.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub ids: Vec<String>,
    pub label_names: Vec<String>,
    pub wavelengths: Vec<f64>,
    /// `n_stars x n_labels`.
    pub labels: DMatrix<f64>,
    /// `n_stars x n_pixels`.
    pub fluxes: DMatrix<f64>,
    /// `n_stars x n_pixels`.
    pub ivars: DMatrix<f64>,
}

impl TrainingSet {
    /// Build a training set, validating shapes and label values.
    pub fn new(
        ids: Vec<String>,
        label_names: Vec<String>,
        wavelengths: Vec<f64>,
        labels: DMatrix<f64>,
        fluxes: DMatrix<f64>,
        ivars: DMatrix<f64>,
    ) -> Result<Self, TrainError> {
        let set = Self {
            ids,
            label_names,
            wavelengths,
            labels,
            fluxes,
            ivars,
        };
        set.validate()?;
        Ok(set)
    }

    pub fn n_stars(&self) -> usize {
        self.labels.nrows()
    }

    pub fn n_labels(&self) -> usize {
        self.labels.ncols()
    }

    pub fn n_pixels(&self) -> usize {
        self.wavelengths.len()
    }

    /// Check that every array agrees on star/label/pixel counts.
    pub fn validate(&self) -> Result<(), TrainError> {
        let n_stars = self.n_stars();
        let n_labels = self.n_labels();
        let n_pixels = self.n_pixels();

        if n_stars == 0 {
            return Err(TrainError::InvalidInput("training set has no stars".into()));
        }
        if n_labels == 0 {
            return Err(TrainError::InvalidInput("training set has no labels".into()));
        }
        if n_pixels == 0 {
            return Err(TrainError::InvalidInput("training set has no pixels".into()));
        }
        check_len("star ids", n_stars, self.ids.len())?;
        check_len("label names", n_labels, self.label_names.len())?;
        check_len("flux rows", n_stars, self.fluxes.nrows())?;
        check_len("flux columns", n_pixels, self.fluxes.ncols())?;
        check_len("ivar rows", n_stars, self.ivars.nrows())?;
        check_len("ivar columns", n_pixels, self.ivars.ncols())?;

        if let Some((idx, _)) = self.labels.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            // Column-major storage.
            let (star, label) = (idx % n_stars, idx / n_stars);
            return Err(TrainError::InvalidInput(format!(
                "label '{}' of star '{}' is not finite",
                self.label_names[label], self.ids[star]
            )));
        }

        let width = lvec_width(n_labels);
        if n_stars < width {
            return Err(TrainError::InvalidInput(format!(
                "{n_stars} stars cannot constrain a quadratic model in {n_labels} labels ({width} coefficients)"
            )));
        }
        Ok(())
    }

    /// Keep only the labels at `cols`, in the given order.
    pub fn choose_labels(&self, cols: &[usize]) -> Result<Self, TrainError> {
        if let Some(&bad) = cols.iter().find(|&&c| c >= self.n_labels()) {
            return Err(TrainError::InvalidInput(format!(
                "label column {bad} out of range (have {})",
                self.n_labels()
            )));
        }
        Ok(Self {
            label_names: cols.iter().map(|&c| self.label_names[c].clone()).collect(),
            labels: self.labels.select_columns(cols),
            ..self.clone()
        })
    }

    /// Keep only the stars where `mask` is true.
    pub fn choose_objects(&self, mask: &[bool]) -> Result<Self, TrainError> {
        check_len("star mask", self.n_stars(), mask.len())?;
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();
        Ok(Self {
            ids: keep.iter().map(|&i| self.ids[i].clone()).collect(),
            label_names: self.label_names.clone(),
            wavelengths: self.wavelengths.clone(),
            labels: self.labels.select_rows(&keep),
            fluxes: self.fluxes.select_rows(&keep),
            ivars: self.ivars.select_rows(&keep),
        })
    }

    /// Per-star signal-to-noise: median of the nonzero `flux * sqrt(ivar)`.
    ///
    /// Stars without any usable entry get 0.
    pub fn snrs(&self) -> Vec<f64> {
        self.fluxes
            .row_iter()
            .zip(self.ivars.row_iter())
            .map(|(flux, ivar)| {
                let mut values: Vec<f64> = flux
                    .iter()
                    .zip(ivar.iter())
                    .map(|(f, iv)| f * iv.sqrt())
                    .filter(|v| v.is_finite() && *v != 0.0)
                    .collect();
                median(&mut values).unwrap_or(0.0)
            })
            .collect()
    }

    /// Per-star number of pixels with `ivar > 0`.
    pub fn usable_pixel_counts(&self) -> Vec<usize> {
        self.ivars
            .row_iter()
            .map(|row| row.iter().filter(|&&v| v > 0.0).count())
            .collect()
    }

    /// Flux and inverse-variance columns for one pixel.
    pub fn pixel(&self, m: usize) -> (DVector<f64>, DVector<f64>) {
        (self.fluxes.column(m).into_owned(), self.ivars.column(m).into_owned())
    }
}

/// Clamp inverse variances to `floor`, returning a new vector.
///
/// Non-finite entries (NaN, +/-inf) are treated as unusable and also become `floor`.
pub fn clamp_ivars(ivars: &DVector<f64>, floor: f64) -> DVector<f64> {
    ivars.map(|v| if v.is_finite() { v.max(floor) } else { floor })
}

/// Median (mean of the two middle values for an even count); sorts in place.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some(0.5 * (values[mid - 1] + values[mid]))
    } else {
        Some(values[mid])
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), TrainError> {
    if expected != actual {
        return Err(TrainError::ShapeMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_set() -> TrainingSet {
        // 6 stars, 2 labels, 3 pixels.
        let labels = DMatrix::from_fn(6, 2, |i, j| (i as f64) * (j as f64 + 1.0) + (i * i) as f64 * 0.1);
        let fluxes = DMatrix::from_fn(6, 3, |i, j| 1.0 - 0.01 * (i + j) as f64);
        let ivars = DMatrix::from_element(6, 3, 100.0);
        TrainingSet::new(
            (0..6).map(|i| format!("star-{i}")).collect(),
            vec!["teff".into(), "logg".into()],
            vec![15000.0, 15000.5, 15001.0],
            labels,
            fluxes,
            ivars,
        )
        .unwrap()
    }

    #[test]
    fn clamp_is_pure_and_floors_small_values() {
        let raw = DVector::from_vec(vec![0.0, 0.005, 0.5, f64::NAN, 20.0, f64::INFINITY, f64::NEG_INFINITY]);
        let clamped = clamp_ivars(&raw, DEFAULT_IVAR_FLOOR);
        assert_eq!(clamped.as_slice(), &[0.01, 0.01, 0.5, 0.01, 20.0, 0.01, 0.01]);
        assert_eq!(raw[0], 0.0);
    }

    #[test]
    fn snr_is_median_of_nonzero_weighted_flux() {
        let mut set = tiny_set();
        // Star 0: fluxes 1.0, 0.99, 0.98 at ivar 100 -> 10, 9.9, 9.8.
        assert!((set.snrs()[0] - 9.9).abs() < 1e-12);

        // Zero-ivar entries are excluded; an even count averages the middle pair.
        set.ivars[(1, 0)] = 0.0;
        let expected = 0.5 * (0.98 + 0.97) * 10.0;
        assert!((set.snrs()[1] - expected).abs() < 1e-12);

        set.ivars.row_mut(2).fill(0.0);
        assert_eq!(set.snrs()[2], 0.0);
        assert_eq!(set.usable_pixel_counts(), vec![3, 2, 0, 3, 3, 3]);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let set = tiny_set();
        let err = TrainingSet::new(
            set.ids.clone(),
            set.label_names.clone(),
            vec![1.0, 2.0],
            set.labels.clone(),
            set.fluxes.clone(),
            set.ivars.clone(),
        )
        .unwrap_err();
        assert!(matches!(err, TrainError::ShapeMismatch { what: "flux columns", .. }));
    }

    #[test]
    fn too_few_stars_for_quadratic_model() {
        let set = tiny_set();
        let few = set.choose_objects(&[true, true, true, true, true, false]).unwrap();
        assert!(matches!(few.validate(), Err(TrainError::InvalidInput(_))));
    }

    #[test]
    fn non_finite_label_is_named() {
        let mut set = tiny_set();
        set.labels[(2, 1)] = f64::NAN;
        let err = set.validate().unwrap_err().to_string();
        assert!(err.contains("logg") && err.contains("star-2"), "{err}");
    }

    #[test]
    fn choose_labels_and_objects_subset_consistently() {
        let set = tiny_set();
        let one = set.choose_labels(&[1]).unwrap();
        assert_eq!(one.label_names, vec!["logg".to_string()]);
        assert_eq!(one.labels.column(0), set.labels.column(1));

        let mask = [true, false, true, true, false, true];
        let sub = set.choose_objects(&mask).unwrap();
        assert_eq!(sub.n_stars(), 4);
        assert_eq!(sub.ids, vec!["star-0", "star-2", "star-3", "star-5"]);
        assert_eq!(sub.fluxes.row(1), set.fluxes.row(2));
        assert!(set.choose_labels(&[5]).is_err());
    }
}
