//! Weighted least squares at a fixed intrinsic scatter.
//!
//! For one pixel, with per-star flux `f_n`, inverse variance `ivar_n` and
//! design row `l_n`, a fixed scatter `s` gives the effective precision
//!
//! ```text
//! Cinv_n = ivar_n / (1 + ivar_n * s^2)
//! ```
//!
//! and the coefficients solve the normal equations
//!
//! ```text
//! (L^T Cinv L) c = L^T Cinv f
//! ```
//!
//! The design width is small (`1 + L + L(L+1)/2`), so we form the normal
//! matrix directly and factorize it with LU. The normal matrix is also the
//! inverse covariance of the coefficients, which the caller keeps.

use nalgebra::{DMatrix, DVector};

use crate::error::TrainError;

/// Result of one weighted regression.
#[derive(Debug, Clone, PartialEq)]
pub struct Regression {
    pub coefficients: DVector<f64>,
    /// `lvec^T diag(Cinv) lvec`.
    pub inverse_covariance: DMatrix<f64>,
    /// Whitened signed residuals, one per star.
    pub chi: DVector<f64>,
    /// `sum_n ln(Cinv_n)`.
    pub logdet_cinv: f64,
}

impl Regression {
    pub fn chi_squared(&self) -> f64 {
        self.chi.norm_squared()
    }

    /// Score minimized by the scatter search: `chi^2 - ln det Cinv`.
    pub fn objective(&self) -> f64 {
        self.chi_squared() - self.logdet_cinv
    }
}

/// Effective inverse variance once intrinsic scatter is folded in.
pub fn effective_ivar(ivar: f64, scatter: f64) -> f64 {
    ivar / (1.0 + ivar * scatter * scatter)
}

/// Solve the weighted normal equations at a fixed scatter.
pub fn solve_at_scatter(
    fluxes: &DVector<f64>,
    ivars: &DVector<f64>,
    lvec: &DMatrix<f64>,
    scatter: f64,
) -> Result<Regression, TrainError> {
    let cinv = ivars.map(|ivar| effective_ivar(ivar, scatter));

    // Row-scale L by Cinv, then L^T (Cinv L) and L^T (Cinv f).
    let mut weighted = lvec.clone();
    for (mut row, &w) in weighted.row_iter_mut().zip(cinv.iter()) {
        row *= w;
    }
    let inverse_covariance = lvec.tr_mul(&weighted);
    let rhs = lvec.tr_mul(&cinv.component_mul(fluxes));

    let coefficients = inverse_covariance
        .clone()
        .lu()
        .solve(&rhs)
        .ok_or(TrainError::SingularSystem { scatter })?;

    if !coefficients.iter().all(|c| c.is_finite()) {
        return Err(TrainError::NonFiniteCoefficients { scatter });
    }

    let residual = fluxes - lvec * &coefficients;
    let chi = cinv.map(f64::sqrt).component_mul(&residual);
    let logdet_cinv = cinv.iter().map(|w| w.ln()).sum();

    Ok(Regression {
        coefficients,
        inverse_covariance,
        chi,
        logdet_cinv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_scatter_unit_weights_is_ordinary_least_squares() {
        // Fit y = a + b x on x = [0, 1, 2, 3], y = [1, 3, 4, 8].
        // Closed form: b = Sxy / Sxx = 11 / 5 = 2.2, a = ybar - b xbar = 4 - 3.3 = 0.7.
        let lvec = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let y = DVector::from_vec(vec![1.0, 3.0, 4.0, 8.0]);
        let ivar = DVector::from_element(4, 1.0);

        let fit = solve_at_scatter(&y, &ivar, &lvec, 0.0).unwrap();
        assert!((fit.coefficients[0] - 0.7).abs() < 1e-10);
        assert!((fit.coefficients[1] - 2.2).abs() < 1e-10);
        assert!(fit.logdet_cinv.abs() < 1e-15);

        let expected_chi = [0.3, 0.1, -1.1, 0.7];
        for (c, e) in fit.chi.iter().zip(expected_chi) {
            assert!((c - e).abs() < 1e-10);
        }
    }

    #[test]
    fn exact_data_has_zero_chi() {
        let lvec = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_vec(vec![2.0, 5.0, 8.0]);
        let ivar = DVector::from_element(3, 4.0);
        let fit = solve_at_scatter(&y, &ivar, &lvec, 0.1).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-10);
        assert!((fit.coefficients[1] - 3.0).abs() < 1e-10);
        assert!(fit.chi.amax() < 1e-9);
    }

    #[test]
    fn inverse_covariance_and_logdet_use_effective_ivar() {
        let lvec = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
        let y = DVector::from_vec(vec![1.0, 3.0]);
        let ivar = DVector::from_vec(vec![1.0, 3.0]);
        let scatter = 1.0;
        // Cinv = [1/2, 3/4].
        let fit = solve_at_scatter(&y, &ivar, &lvec, scatter).unwrap();
        assert!((fit.inverse_covariance[(0, 0)] - 1.25).abs() < 1e-10);
        assert!((fit.logdet_cinv - (0.5f64.ln() + 0.75f64.ln())).abs() < 1e-10);
        // Weighted mean: (0.5*1 + 0.75*3) / 1.25 = 2.2.
        assert!((fit.coefficients[0] - 2.2).abs() < 1e-10);
    }

    #[test]
    fn singular_design_is_reported() {
        // Two identical columns.
        let lvec = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let ivar = DVector::from_element(3, 1.0);
        let err = solve_at_scatter(&y, &ivar, &lvec, 0.0).unwrap_err();
        assert!(matches!(
            err,
            TrainError::SingularSystem { .. } | TrainError::NonFiniteCoefficients { .. }
        ));
    }

    #[test]
    fn nan_flux_yields_invalid_coefficients() {
        let lvec = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_vec(vec![1.0, f64::NAN, 3.0]);
        let ivar = DVector::from_element(3, 1.0);
        let err = solve_at_scatter(&y, &ivar, &lvec, 0.0).unwrap_err();
        assert!(matches!(err, TrainError::NonFiniteCoefficients { .. }));
    }

    #[test]
    fn effective_ivar_is_monotone_and_bounded() {
        let scatter = 0.05;
        let bound = 1.0 / (scatter * scatter);
        let mut prev = 0.0;
        for ivar in [0.01, 0.1, 1.0, 10.0, 100.0, 1e4, 1e8] {
            let w = effective_ivar(ivar, scatter);
            assert!(w >= prev, "weight must not drop as ivar grows");
            assert!(w <= bound);
            prev = w;
        }
        assert_eq!(effective_ivar(7.0, 0.0), 7.0);
    }
}
