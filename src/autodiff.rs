//! Jacobians of discretised systems.
//!
//! Columns are computed exactly with forward-mode dual numbers from
//! `num-dual`: the system is evaluated once per state with that state seeded
//! as the independent variable. Without the `autodiff` feature this module is
//! absent and [`jacobian_fd`](crate::discretisation::jacobian_fd) is used.
//!
//! # Example
//!
//! ```
//! use num_dual::Dual64;
//! use voltaic::autodiff::jacobian;
//!
//! // f(x, y) = [x^2, xy]
//! let f = |v: &[Dual64]| vec![v[0] * v[0], v[0] * v[1]];
//! let jac = jacobian(f, &[2.0, 3.0]);
//! assert_eq!(jac[(1, 0)], 3.0);
//! ```

use nalgebra::DMatrix;
use num_dual::Dual64;

/// Exact Jacobian `df/dx` at `x` by forward-mode automatic differentiation.
pub fn jacobian<F>(f: F, x: &[f64]) -> DMatrix<f64>
where
    F: Fn(&[Dual64]) -> Vec<Dual64>,
{
    let n = x.len();
    let mut seeded: Vec<Dual64> = x.iter().map(|&v| Dual64::from(v)).collect();
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(n);
    for j in 0..n {
        seeded[j] = Dual64::from(x[j]).derivative();
        columns.push(f(&seeded).iter().map(|r| r.eps).collect());
        seeded[j] = Dual64::from(x[j]);
    }
    let rows = columns.first().map_or(0, Vec::len);
    DMatrix::from_fn(rows, n, |i, j| columns[j][i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretisation::jacobian_fd;

    #[test]
    fn test_dual_jacobian_matches_fd() {
        use num_dual::DualNum;

        let point = [0.3, -1.2, 2.0];
        let dual = jacobian(
            |v: &[Dual64]| vec![v[0].exp() * v[1], v[1] * v[2] - v[0], v[2].sqrt()],
            &point,
        );
        let fd = jacobian_fd(|v: &[f64]| vec![v[0].exp() * v[1], v[1] * v[2] - v[0], v[2].sqrt()], &point);
        assert_eq!(dual.shape(), (3, 3));
        for (a, b) in dual.iter().zip(fd.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
