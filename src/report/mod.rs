//! Reporting utilities: post-training diagnostics and formatted terminal output.

use nalgebra::DMatrix;

use crate::domain::TrainedModel;
use crate::domain::types::check_len;
use crate::error::TrainError;

pub mod format;

pub use format::*;

/// A reference star whose total chi-squared stands out from the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedStar {
    pub index: usize,
    pub id: String,
    pub chisq: f64,
    /// Distance above the mean, in standard deviations.
    pub sigma: f64,
}

/// Stars whose chi-squared summed over pixels exceeds `mean + n_sigma * std`.
///
/// Sorted worst first.
pub fn flag_outlier_stars(model: &TrainedModel, n_sigma: f64) -> Vec<FlaggedStar> {
    let per_star = &model.diagnostics.per_star;
    let Some((mean, std)) = mean_std(per_star) else {
        return Vec::new();
    };
    if std <= 0.0 {
        return Vec::new();
    }

    let mut flagged: Vec<FlaggedStar> = per_star
        .iter()
        .enumerate()
        .filter(|&(_, &chisq)| chisq > mean + n_sigma * std)
        .map(|(index, &chisq)| FlaggedStar {
            index,
            id: model
                .star_ids
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("#{index}")),
            chisq,
            sigma: (chisq - mean) / std,
        })
        .collect();
    flagged.sort_by(|a, b| b.chisq.partial_cmp(&a.chisq).unwrap_or(std::cmp::Ordering::Equal));
    flagged
}

/// For each label, the rows of `labels` more than `n_sigma` standard
/// deviations from the `reference` mean of that label.
///
/// Both matrices are `stars x labels` with the same label columns.
pub fn labels_outside_reference(
    reference: &DMatrix<f64>,
    labels: &DMatrix<f64>,
    n_sigma: f64,
) -> Result<Vec<Vec<usize>>, TrainError> {
    check_len("label columns", reference.ncols(), labels.ncols())?;
    if reference.nrows() == 0 {
        return Err(TrainError::InvalidInput("reference label set is empty".into()));
    }

    Ok(reference
        .column_iter()
        .zip(labels.column_iter())
        .map(|(ref_col, col)| {
            let ref_values: Vec<f64> = ref_col.iter().copied().collect();
            let (mean, std) = mean_std(&ref_values).unwrap_or((0.0, 0.0));
            col.iter()
                .enumerate()
                .filter(|&(_, &v)| (v - mean).abs() > n_sigma * std)
                .map(|(i, _)| i)
                .collect()
        })
        .collect())
}

/// Mean and population standard deviation; `None` for an empty input.
fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChiSquaredDiagnostics;
    use nalgebra::DVector;

    fn model_with_star_chisq(per_star: Vec<f64>) -> TrainedModel {
        let n_stars = per_star.len();
        TrainedModel {
            label_names: vec!["teff".into()],
            wavelengths: vec![5000.0],
            star_ids: (0..n_stars).map(|i| format!("s{i}")).collect(),
            pivots: DVector::from_vec(vec![0.0]),
            coefficients: DMatrix::zeros(1, 3),
            scatters: DVector::from_vec(vec![0.01]),
            covariances: vec![DMatrix::zeros(3, 3)],
            chisqs: DMatrix::from_row_slice(1, n_stars, &per_star),
            outcomes: vec![Some(crate::domain::ScatterOutcome::Interior)],
            skipped: Vec::new(),
            diagnostics: ChiSquaredDiagnostics {
                total: per_star.iter().sum(),
                per_pixel: vec![per_star.iter().sum()],
                per_star,
                n_degenerate: 0,
                n_skipped: 0,
            },
        }
    }

    #[test]
    fn flags_only_stars_far_above_the_mean() {
        let mut chisq = vec![1.0; 20];
        chisq[7] = 50.0;
        chisq[3] = 1.5;
        let model = model_with_star_chisq(chisq);

        let flagged = flag_outlier_stars(&model, 3.0);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].index, 7);
        assert_eq!(flagged[0].id, "s7");
        assert!(flagged[0].sigma > 3.0);
    }

    #[test]
    fn identical_stars_are_never_flagged() {
        let model = model_with_star_chisq(vec![2.0; 10]);
        assert!(flag_outlier_stars(&model, 0.0).is_empty());
    }

    #[test]
    fn labels_outside_reference_per_label() {
        // Reference: teff mean 5000 std 100, logg mean 2.5 std 0.5.
        let reference = DMatrix::from_row_slice(2, 2, &[4900.0, 2.0, 5100.0, 3.0]);
        let labels = DMatrix::from_row_slice(3, 2, &[5000.0, 2.5, 5350.0, 2.6, 4990.0, 0.5]);

        let out = labels_outside_reference(&reference, &labels, 2.0).unwrap();
        assert_eq!(out, vec![vec![1], vec![2]]);
    }

    #[test]
    fn labels_outside_reference_checks_columns() {
        let reference = DMatrix::zeros(2, 2);
        let labels = DMatrix::zeros(2, 3);
        assert!(labels_outside_reference(&reference, &labels, 1.0).is_err());
    }
}
