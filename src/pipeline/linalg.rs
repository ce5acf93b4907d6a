//! Small dense least-squares solves shared by the baseline fit and the
//! Savitzky–Golay kernel.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SpectraError};

/// Smallest accepted |pivot| relative to the largest one.
const PIVOT_RTOL: f64 = 1e-14;

/// Solve `a · s = b` by LU decomposition with partial pivoting.
///
/// Fails with `SingularMatrix` on a zero, vanishing or non-finite pivot, or a
/// non-finite solution.
pub fn solve_dense(a: DMatrix<f64>, b: &DVector<f64>, context: &str) -> Result<DVector<f64>> {
    let n = a.nrows();
    if n == 0 || n != a.ncols() || n != b.len() {
        return Err(SpectraError::SingularMatrix(format!(
            "{}: cannot solve a {}x{} system with {} right-hand values",
            context,
            a.nrows(),
            a.ncols(),
            b.len()
        )));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(SpectraError::SingularMatrix(format!(
            "{}: system matrix contains non-finite entries",
            context
        )));
    }

    let lu = a.lu();
    let pivots: Vec<f64> = lu.u().diagonal().iter().map(|p| p.abs()).collect();
    let max_pivot = pivots.iter().cloned().fold(0.0f64, f64::max);
    let min_pivot = pivots.iter().cloned().fold(f64::INFINITY, f64::min);
    if !(max_pivot > 0.0) || !min_pivot.is_finite() || min_pivot <= max_pivot * PIVOT_RTOL {
        return Err(SpectraError::SingularMatrix(format!(
            "{}: pivot {:.3e} is zero or negligible against {:.3e}",
            context, min_pivot, max_pivot
        )));
    }

    let solution = lu.solve(b).ok_or_else(|| {
        SpectraError::SingularMatrix(format!("{}: LU solve found a zero pivot", context))
    })?;
    if solution.iter().any(|v| !v.is_finite()) {
        return Err(SpectraError::SingularMatrix(format!(
            "{}: solution is not finite",
            context
        )));
    }
    Ok(solution)
}

/// Solve the normal equations `(AᵗA) c = Aᵗy` for the least-squares coefficients.
pub fn solve_normal_equations(
    design: &DMatrix<f64>,
    rhs: &DVector<f64>,
    context: &str,
) -> Result<DVector<f64>> {
    let at = design.transpose();
    let ata = &at * design;
    let aty = &at * rhs;
    solve_dense(ata, &aty, context)
}

/// Vandermonde design matrix with columns `t^0 .. t^order`.
pub fn vandermonde(t: &[f64], order: usize) -> DMatrix<f64> {
    DMatrix::from_fn(t.len(), order + 1, |row, col| t[row].powi(col as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_small_system() {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 2.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![4.0, 3.0]);
        let s = solve_dense(a, &b, "test").unwrap();
        assert!((s[0] - 1.0).abs() < 1e-12);
        assert!((s[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_system() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let err = solve_dense(a, &b, "rank one").unwrap_err();
        assert!(matches!(err, SpectraError::SingularMatrix(_)));
        assert!(err.to_string().contains("rank one"));
    }

    #[test]
    fn test_normal_equations_recover_line() {
        let t = [0.0, 1.0, 2.0, 3.0];
        let y = DVector::from_iterator(4, t.iter().map(|v| 2.0 + 0.5 * v));
        let c = solve_normal_equations(&vandermonde(&t, 1), &y, "line").unwrap();
        assert!((c[0] - 2.0).abs() < 1e-12);
        assert!((c[1] - 0.5).abs() < 1e-12);
    }
}
