//! Dense linear algebra helpers for Levenberg–Marquardt (spec.md §4.8 step 2):
//! building the damped normal equations and solving them with a Cholesky
//! factorization of the symmetric positive-definite augmented matrix.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::optim::options::DampingMode;

/// Builds `JᵀJ`, `Jᵀr`, and `diag(JᵀJ)` from a row-major Jacobian.
pub fn normal_equations(jacobian: &[Vec<f64>], residuals: &[f64]) -> (DMatrix<f64>, DVector<f64>, DVector<f64>) {
    let m = jacobian.len();
    let n = if m > 0 { jacobian[0].len() } else { 0 };

    let mut j = DMatrix::<f64>::zeros(m, n);
    for (row, values) in jacobian.iter().enumerate() {
        for (col, &v) in values.iter().enumerate() {
            j[(row, col)] = v;
        }
    }
    let r = DVector::from_row_slice(residuals);

    let jtj = j.transpose() * &j;
    let jtr = j.transpose() * &r;
    let diag = DVector::from_iterator(n, (0..n).map(|i| jtj[(i, i)]));
    (jtj, jtr, diag)
}

/// Solves `(JᵀJ + λ·damping) Δ = −Jᵀr` for `Δ` via Cholesky. Returns `None`
/// on a non-positive-definite augmented matrix (spec.md §4.8 step 2's
/// "on numerical failure" case), leaving the caller to grow λ and retry.
pub fn solve_damped(
    jtj: &DMatrix<f64>,
    jtr: &DVector<f64>,
    diag: &DVector<f64>,
    lambda: f64,
    mode: DampingMode,
) -> Option<DVector<f64>> {
    let n = jtj.nrows();
    let mut augmented = jtj.clone();
    for i in 0..n {
        let add = match mode {
            DampingMode::Marquardt => lambda * diag[i].max(f64::EPSILON),
            DampingMode::Levenberg => lambda,
        };
        augmented[(i, i)] += add;
    }
    let neg_jtr = -jtr;
    Cholesky::new(augmented).map(|chol| chol.solve(&neg_jtr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_equations_match_hand_computation() {
        let jacobian = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let residuals = vec![2.0, 3.0];
        let (jtj, jtr, diag) = normal_equations(&jacobian, &residuals);
        assert_eq!(jtj[(0, 0)], 1.0);
        assert_eq!(jtj[(1, 1)], 1.0);
        assert_eq!(jtr[0], 2.0);
        assert_eq!(jtr[1], 3.0);
        assert_eq!(diag[0], 1.0);
    }

    #[test]
    fn damped_solve_recovers_exact_solution_for_identity_jacobian() {
        let jacobian = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let residuals = vec![2.0, 3.0];
        let (jtj, jtr, diag) = normal_equations(&jacobian, &residuals);
        let delta = solve_damped(&jtj, &jtr, &diag, 0.0, DampingMode::Marquardt).unwrap();
        assert!((delta[0] - (-2.0)).abs() < 1e-12);
        assert!((delta[1] - (-3.0)).abs() < 1e-12);
    }
}
