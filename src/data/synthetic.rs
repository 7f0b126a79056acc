//! Synthetic reference sets drawn from a known quadratic model.
//!
//! Labels are Gaussian around typical giant-star values, every pixel gets a
//! random true coefficient vector and a true intrinsic scatter, and fluxes are
//! `lvec . c + N(0, 1/ivar + s^2)`. A small fraction of entries can be marked
//! bad (ivar = 0, flux = 1), which exercises the ivar floor.
//!
//! The generator is fully deterministic given the seed.

use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::TrainingSet;
use crate::error::TrainError;
use crate::math::label_vector;

/// `(name, center, spread)` for the first few labels.
const LABEL_TEMPLATES: [(&str, f64, f64); 4] = [
    ("teff", 4750.0, 250.0),
    ("logg", 2.5, 0.5),
    ("feh", -0.2, 0.3),
    ("alpha_fe", 0.08, 0.08),
];

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub n_stars: usize,
    pub n_pixels: usize,
    pub n_labels: usize,
    pub seed: u64,
    /// True scatters are drawn uniformly from `[0, max_scatter]`.
    pub max_scatter: f64,
    /// Per-pixel signal-to-noise ratio; ivar = snr^2.
    pub snr: f64,
    /// Fraction of (star, pixel) entries flagged bad.
    pub bad_fraction: f64,
    pub wavelength_start: f64,
    pub wavelength_step: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_stars: 200,
            n_pixels: 50,
            n_labels: 3,
            seed: 42,
            max_scatter: 0.02,
            snr: 100.0,
            bad_fraction: 0.0,
            wavelength_start: 15_100.0,
            wavelength_step: 0.25,
        }
    }
}

/// A generated set with the truth it was drawn from.
#[derive(Debug, Clone)]
pub struct SyntheticSet {
    pub set: TrainingSet,
    /// `n_pixels x width`, against the training-set pivots.
    pub true_coefficients: DMatrix<f64>,
    pub true_scatters: DVector<f64>,
}

pub fn generate(config: &SyntheticConfig) -> Result<SyntheticSet, TrainError> {
    if config.n_stars == 0 || config.n_pixels == 0 || config.n_labels == 0 {
        return Err(TrainError::InvalidInput(
            "synthetic set needs at least one star, pixel and label".into(),
        ));
    }
    if !(config.snr.is_finite() && config.snr > 0.0) {
        return Err(TrainError::InvalidInput(format!("invalid snr {}", config.snr)));
    }
    if !(config.max_scatter.is_finite() && config.max_scatter >= 0.0) {
        return Err(TrainError::InvalidInput(format!(
            "invalid max scatter {}",
            config.max_scatter
        )));
    }
    if !(0.0..1.0).contains(&config.bad_fraction) {
        return Err(TrainError::InvalidInput(format!(
            "bad fraction must be in [0, 1), got {}",
            config.bad_fraction
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let unit = Normal::new(0.0, 1.0)
        .map_err(|e| TrainError::InvalidInput(format!("noise distribution error: {e}")))?;

    let spreads: Vec<f64> = (0..config.n_labels).map(|i| label_template(i).2).collect();
    let labels = DMatrix::from_fn(config.n_stars, config.n_labels, |_, j| {
        let (_, center, spread) = label_template(j);
        center + spread * unit.sample(&mut rng)
    });
    let lv = label_vector::build(&labels);
    let width = lv.width();
    let pairs = label_vector::quadratic_pairs(config.n_labels);

    // Coefficients scaled so every term moves the flux by a few percent over
    // one label spread.
    let mut true_coefficients = DMatrix::<f64>::zeros(config.n_pixels, width);
    for m in 0..config.n_pixels {
        true_coefficients[(m, 0)] = 1.0 - rng.gen_range(0.0..0.3);
        for (i, spread) in spreads.iter().enumerate() {
            true_coefficients[(m, 1 + i)] = 0.05 * unit.sample(&mut rng) / spread;
        }
        for (c, &(j, k)) in pairs.iter().enumerate() {
            true_coefficients[(m, 1 + config.n_labels + c)] =
                0.01 * unit.sample(&mut rng) / (spreads[j] * spreads[k]);
        }
    }
    let true_scatters = DVector::from_fn(config.n_pixels, |_, _| {
        if config.max_scatter > 0.0 {
            rng.gen_range(0.0..=config.max_scatter)
        } else {
            0.0
        }
    });

    let ivar = config.snr * config.snr;
    let truth = &lv.lvec * true_coefficients.transpose();
    let mut fluxes = DMatrix::<f64>::zeros(config.n_stars, config.n_pixels);
    let mut ivars = DMatrix::<f64>::from_element(config.n_stars, config.n_pixels, ivar);
    for m in 0..config.n_pixels {
        let sigma = (1.0 / ivar + true_scatters[m].powi(2)).sqrt();
        for n in 0..config.n_stars {
            if config.bad_fraction > 0.0 && rng.gen_bool(config.bad_fraction) {
                fluxes[(n, m)] = 1.0;
                ivars[(n, m)] = 0.0;
            } else {
                fluxes[(n, m)] = truth[(n, m)] + sigma * unit.sample(&mut rng);
            }
        }
    }

    let set = TrainingSet::new(
        (0..config.n_stars).map(|i| format!("synth-{:04}", i + 1)).collect(),
        (0..config.n_labels).map(|i| label_template(i).0).collect(),
        (0..config.n_pixels)
            .map(|m| config.wavelength_start + config.wavelength_step * m as f64)
            .collect(),
        labels,
        fluxes,
        ivars,
    )?;

    Ok(SyntheticSet {
        set,
        true_coefficients,
        true_scatters,
    })
}

fn label_template(i: usize) -> (String, f64, f64) {
    match LABEL_TEMPLATES.get(i) {
        Some(&(name, center, spread)) => (name.to_string(), center, spread),
        None => (format!("label_{i}"), 0.0, 1.0),
    }
}
