//! Quadratic label vector (design matrix) and its label derivatives.
//!
//! For `L` labels and a star with centered labels `x = labels - pivots`, the
//! design row is:
//!
//! ```text
//! [1, x_0, .., x_{L-1}, x_0*x_0, x_0*x_1, .., x_0*x_{L-1}, x_1*x_1, .., x_{L-1}*x_{L-1}]
//! ```
//!
//! i.e. bias, linear terms in label order, then the upper triangle (diagonal
//! included) of `x x^T` in row-major order. The width is `1 + L + L(L+1)/2`.
//!
//! Building this is done once per training run and shared by every pixel.

use nalgebra::{DMatrix, DVector};

/// Design matrix plus everything derived alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelVector {
    /// Per-label mean of the training labels.
    pub pivots: DVector<f64>,
    /// `n_stars x width` design matrix.
    pub lvec: DMatrix<f64>,
    /// Per star, a `width x n_labels` matrix of d(column)/d(label).
    pub derivs: Vec<DMatrix<f64>>,
}

impl LabelVector {
    pub fn n_stars(&self) -> usize {
        self.lvec.nrows()
    }

    pub fn n_labels(&self) -> usize {
        self.pivots.len()
    }

    pub fn width(&self) -> usize {
        self.lvec.ncols()
    }
}

/// Number of design columns for `n_labels` labels.
pub fn lvec_width(n_labels: usize) -> usize {
    1 + n_labels + n_labels * (n_labels + 1) / 2
}

/// Label index pairs `(j, k)`, `j <= k`, in quadratic column order.
pub fn quadratic_pairs(n_labels: usize) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(n_labels * (n_labels + 1) / 2);
    for j in 0..n_labels {
        for k in j..n_labels {
            out.push((j, k));
        }
    }
    out
}

/// Column-wise mean of a `n_stars x n_labels` matrix.
pub fn label_pivots(labels: &DMatrix<f64>) -> DVector<f64> {
    let n = labels.nrows().max(1) as f64;
    DVector::from_iterator(
        labels.ncols(),
        labels.column_iter().map(|col| col.sum() / n),
    )
}

/// Build the label vector using the mean of `labels` as pivots.
pub fn build(labels: &DMatrix<f64>) -> LabelVector {
    let pivots = label_pivots(labels);
    build_with_pivots(labels, &pivots)
}

/// Build the label vector against externally supplied pivots.
///
/// A consumer of a trained model needs this to evaluate design rows for new
/// labels: the pivots must be the training pivots, not the new mean.
pub fn build_with_pivots(labels: &DMatrix<f64>, pivots: &DVector<f64>) -> LabelVector {
    let n_stars = labels.nrows();
    let n_labels = labels.ncols();
    let pairs = quadratic_pairs(n_labels);
    let width = lvec_width(n_labels);

    let mut lvec = DMatrix::<f64>::zeros(n_stars, width);
    let mut derivs = Vec::with_capacity(n_stars);
    let mut centered = vec![0.0; n_labels];
    let mut row = vec![0.0; width];

    for n in 0..n_stars {
        for (i, x) in centered.iter_mut().enumerate() {
            *x = labels[(n, i)] - pivots[i];
        }
        fill_row(&centered, &pairs, &mut row);
        for (c, &v) in row.iter().enumerate() {
            lvec[(n, c)] = v;
        }
        derivs.push(row_derivatives(&centered, &pairs));
    }

    LabelVector {
        pivots: pivots.clone(),
        lvec,
        derivs,
    }
}

/// Design row for a single centered label vector.
pub fn design_row(centered: &[f64]) -> DVector<f64> {
    let pairs = quadratic_pairs(centered.len());
    let mut row = vec![0.0; lvec_width(centered.len())];
    fill_row(centered, &pairs, &mut row);
    DVector::from_vec(row)
}

/// Rebuild the symmetric `L x L` matrix from a quadratic block.
pub fn unpack_quadratic(block: &[f64], n_labels: usize) -> DMatrix<f64> {
    let mut out = DMatrix::<f64>::zeros(n_labels, n_labels);
    for (&(j, k), &v) in quadratic_pairs(n_labels).iter().zip(block) {
        out[(j, k)] = v;
        out[(k, j)] = v;
    }
    out
}

fn fill_row(centered: &[f64], pairs: &[(usize, usize)], out: &mut [f64]) {
    let n_labels = centered.len();
    out[0] = 1.0;
    out[1..=n_labels].copy_from_slice(centered);
    for (c, &(j, k)) in pairs.iter().enumerate() {
        out[1 + n_labels + c] = centered[j] * centered[k];
    }
}

fn row_derivatives(centered: &[f64], pairs: &[(usize, usize)]) -> DMatrix<f64> {
    let n_labels = centered.len();
    let mut d = DMatrix::<f64>::zeros(lvec_width(n_labels), n_labels);

    for i in 0..n_labels {
        d[(1 + i, i)] = 1.0;
    }

    // d(x_j x_k)/dx_m = [m == j] x_k + [m == k] x_j, so the diagonal term gets 2 x_j.
    let offset = 1 + n_labels;
    for (c, &(j, k)) in pairs.iter().enumerate() {
        d[(offset + c, j)] += centered[k];
        d[(offset + c, k)] += centered[j];
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_labels() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            4,
            3,
            &[
                4800.0, 2.5, -0.3, //
                5100.0, 3.1, 0.1, //
                4650.0, 2.2, -0.8, //
                5020.0, 3.4, 0.2,
            ],
        )
    }

    #[test]
    fn width_matches_label_count() {
        for n_labels in 1..6 {
            let labels = DMatrix::from_fn(5, n_labels, |i, j| (i * 7 + j * 3) as f64 * 0.1);
            let lv = build(&labels);
            assert_eq!(lv.width(), 1 + n_labels + n_labels * (n_labels + 1) / 2);
            assert_eq!(lv.derivs[0].shape(), (lv.width(), n_labels));
        }
    }

    #[test]
    fn build_is_deterministic() {
        let labels = sample_labels();
        let a = build(&labels);
        let b = build(&labels);
        assert_eq!(a, b);
    }

    #[test]
    fn pivots_are_column_means_and_rows_centered() {
        let labels = sample_labels();
        let lv = build(&labels);
        assert!((lv.pivots[0] - 4892.5).abs() < 1e-9);
        for i in 0..3 {
            let s: f64 = lv.lvec.column(1 + i).iter().sum();
            assert!(s.abs() < 1e-9, "linear column {i} should sum to 0, got {s}");
        }
        assert!(lv.lvec.column(0).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn quadratic_block_is_centered_outer_product() {
        let labels = sample_labels();
        let lv = build(&labels);
        let n_labels = 3;
        for n in 0..labels.nrows() {
            let row: Vec<f64> = lv.lvec.row(n).iter().copied().collect();
            let x = DVector::from_column_slice(&row[1..=n_labels]);
            let sym = unpack_quadratic(&row[1 + n_labels..], n_labels);
            let outer = &x * x.transpose();
            assert!((sym - outer).abs().max() < 1e-9);
        }
    }

    #[test]
    fn quadratic_column_order_is_row_major_upper_triangle() {
        assert_eq!(
            quadratic_pairs(3),
            vec![(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)]
        );
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let labels = sample_labels();
        let lv = build(&labels);
        let h = 1e-6;
        for n in 0..labels.nrows() {
            let x: Vec<f64> = (0..3).map(|i| labels[(n, i)] - lv.pivots[i]).collect();
            for m in 0..3 {
                let mut up = x.clone();
                let mut down = x.clone();
                up[m] += h;
                down[m] -= h;
                let numeric = (design_row(&up) - design_row(&down)) / (2.0 * h);
                for c in 0..lv.width() {
                    let analytic = lv.derivs[n][(c, m)];
                    assert!(
                        (numeric[c] - analytic).abs() < 1e-4 * (1.0 + analytic.abs()),
                        "star {n} column {c} label {m}: numeric {} vs analytic {analytic}",
                        numeric[c]
                    );
                }
            }
        }
    }

    #[test]
    fn diagonal_derivative_is_twice_the_offset() {
        let labels = DMatrix::from_row_slice(2, 1, &[1.0, 3.0]);
        let lv = build(&labels);
        // Pivot 2.0, star 1 offset 1.0: d(x^2)/dx = 2.
        assert_eq!(lv.derivs[1][(2, 0)], 2.0);
        assert_eq!(lv.derivs[1][(0, 0)], 0.0);
        assert_eq!(lv.derivs[1][(1, 0)], 1.0);
    }

    #[test]
    fn external_pivots_are_used_verbatim() {
        let labels = DMatrix::from_row_slice(1, 2, &[5.0, 1.0]);
        let pivots = DVector::from_vec(vec![4.0, 0.0]);
        let lv = build_with_pivots(&labels, &pivots);
        let row: Vec<f64> = lv.lvec.row(0).iter().copied().collect();
        assert_eq!(row, vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
    }
}
