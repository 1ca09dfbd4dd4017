//! Weighted linear least squares with parameter covariance.
//!
//! Every fit in this crate ends in the same linear-algebra step: given a design
//! matrix whose rows are already divided by `σ_i`, solve
//!
//! ```text
//! minimize Σ ((y_i - x_i^T β) / σ_i)^2
//! ```
//!
//! and report `Σ_β = (X_w^T X_w)^{-1}`.
//!
//! Implementation choices:
//! - SVD of the weighted design matrix, so the solve also works on tall systems
//!   (Nalgebra's `QR::solve` is intended for square systems).
//! - The covariance is assembled as `V S^{-2} V^T` from the same decomposition,
//!   which keeps it symmetric positive semi-definite by construction.
//! - Columns are equilibrated to unit norm first. Diode parameters span many
//!   decades (`I0 ~ 1e-9`, `η ~ 50`), and the rank test below must not mistake
//!   bad units for collinearity.
//! - A relative singular-value floor decides rank deficiency instead of letting
//!   a near-singular system return a meaningless minimum-norm solution.

use nalgebra::{DMatrix, DVector};

/// Smallest accepted ratio `s_min / s_max`.
const RANK_TOL: f64 = 1e-12;

/// Solution of a weighted least squares problem.
#[derive(Debug, Clone)]
pub struct LinearSolution {
    pub beta: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

/// Solve `X_w β ≈ y_w` and return β with its covariance.
///
/// Returns `None` if the design matrix is rank deficient or the result is not finite.
pub fn solve_weighted(xw: &DMatrix<f64>, yw: &DVector<f64>) -> Option<LinearSolution> {
    if xw.nrows() < xw.ncols() || xw.nrows() != yw.len() {
        return None;
    }
    let (scaled, scale) = equilibrate(xw)?;
    let svd = scaled.svd(true, true);
    if !singular_values_ok(&svd.singular_values) {
        return None;
    }

    let beta_scaled = svd.solve(yw, 0.0).ok()?;
    let beta = beta_scaled.component_mul(&scale);
    if !beta.iter().all(|v| v.is_finite()) {
        return None;
    }

    let covariance = covariance_from_svd(&svd.singular_values, svd.v_t.as_ref()?, &scale)?;
    Some(LinearSolution { beta, covariance })
}

/// `(J^T J)^{-1}` for a weighted Jacobian `J`.
///
/// Used for the Gauss–Newton covariance at the optimum of a nonlinear fit.
pub fn covariance_from_design(j: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if j.nrows() < j.ncols() {
        return None;
    }
    let (scaled, scale) = equilibrate(j)?;
    let svd = scaled.svd(false, true);
    if !singular_values_ok(&svd.singular_values) {
        return None;
    }
    covariance_from_svd(&svd.singular_values, svd.v_t.as_ref()?, &scale)
}

/// Divide each column by its norm. Returns the scaled matrix and `1/‖col‖`.
fn equilibrate(x: &DMatrix<f64>) -> Option<(DMatrix<f64>, DVector<f64>)> {
    let mut scaled = x.clone();
    let mut scale = DVector::<f64>::zeros(x.ncols());
    for k in 0..x.ncols() {
        let norm = x.column(k).norm();
        if !(norm.is_finite() && norm > 0.0) {
            return None;
        }
        scale[k] = 1.0 / norm;
        scaled.column_mut(k).scale_mut(scale[k]);
    }
    Some((scaled, scale))
}

fn singular_values_ok(s: &DVector<f64>) -> bool {
    if s.is_empty() || !s.iter().all(|v| v.is_finite()) {
        return false;
    }
    let s_max = s.max();
    let s_min = s.min();
    s_max > 0.0 && s_min > s_max * RANK_TOL
}

/// `D (V S^{-2} V^T) D` with `D = diag(scale)`.
fn covariance_from_svd(s: &DVector<f64>, v_t: &DMatrix<f64>, scale: &DVector<f64>) -> Option<DMatrix<f64>> {
    let p = s.len();
    let mut inv_s2 = DMatrix::<f64>::zeros(p, p);
    for i in 0..p {
        inv_s2[(i, i)] = 1.0 / (s[i] * s[i]);
    }
    let d = DMatrix::from_diagonal(scale);
    let cov = &d * (v_t.transpose() * inv_s2 * v_t) * &d;
    let cov = (&cov + cov.transpose()) * 0.5;
    if cov.iter().all(|v| v.is_finite()) {
        Some(cov)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let sol = solve_weighted(&x, &y).unwrap();
        assert!((sol.beta[0] - 2.0).abs() < 1e-10);
        assert!((sol.beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn covariance_matches_normal_equation_inverse() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 4.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 2.5, 5.0]);
        let sol = solve_weighted(&x, &y).unwrap();

        let expected = (x.transpose() * &x).try_inverse().unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(sol.covariance[(i, j)], expected[(i, j)], epsilon = 1e-12);
            }
        }
        assert_eq!(sol.covariance[(0, 1)], sol.covariance[(1, 0)]);
    }

    #[test]
    fn identical_columns_are_rejected() {
        // Every x equal: intercept and slope columns are collinear.
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 5.0, 1.0, 5.0, 1.0, 5.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert!(solve_weighted(&x, &y).is_none());
        assert!(covariance_from_design(&x).is_none());
    }
}
