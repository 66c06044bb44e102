//! Sparse-matrix helpers shared by the mesh and the discretisation.

use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::scalar::Scalar;

pub(crate) fn from_triplets(
    nrows: usize,
    ncols: usize,
    triplets: impl IntoIterator<Item = (usize, usize, f64)>,
) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(nrows, ncols);
    for (i, j, v) in triplets {
        coo.push(i, j, v);
    }
    CsrMatrix::from(&coo)
}

pub(crate) fn identity(n: usize) -> CsrMatrix<f64> {
    CsrMatrix::identity(n)
}

/// Column of ones, `n x 1`.
pub(crate) fn ones_column(n: usize) -> CsrMatrix<f64> {
    from_triplets(n, 1, (0..n).map(|i| (i, 0, 1.0)))
}

/// Kronecker product `a ⊗ b`.
pub(crate) fn kron(a: &CsrMatrix<f64>, b: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    let (br, bc) = (b.nrows(), b.ncols());
    let mut triplets = Vec::with_capacity(a.nnz() * b.nnz());
    for (ia, ja, va) in a.triplet_iter() {
        for (ib, jb, vb) in b.triplet_iter() {
            triplets.push((ia * br + ib, ja * bc + jb, va * vb));
        }
    }
    from_triplets(a.nrows() * br, a.ncols() * bc, triplets)
}

/// Repeats `op` block-diagonally `blocks` times.
pub(crate) fn block_diagonal(blocks: usize, op: &CsrMatrix<f64>) -> CsrMatrix<f64> {
    if blocks == 1 {
        return op.clone();
    }
    kron(&identity(blocks), op)
}

/// `y = A x` for any scalar type.
pub(crate) fn mul_vec<T: Scalar>(a: &CsrMatrix<f64>, x: &[T]) -> Vec<T> {
    a.row_iter()
        .map(|row| {
            row.col_indices()
                .iter()
                .zip(row.values())
                .fold(T::from(0.0), |acc, (&j, &v)| acc + x[j].clone() * v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kron_with_identity() {
        let a = from_triplets(1, 2, vec![(0, 0, -1.0), (0, 1, 1.0)]);
        let k = block_diagonal(2, &a);
        assert_eq!((k.nrows(), k.ncols()), (2, 4));
        let y = mul_vec(&k, &[1.0, 3.0, 2.0, 7.0]);
        assert_eq!(y, vec![2.0, 5.0]);
    }

    #[test]
    fn test_ones_column() {
        let o = kron(&identity(2), &ones_column(3));
        let y = mul_vec(&o, &[4.0, 5.0]);
        assert_eq!(y, vec![4.0, 4.0, 4.0, 5.0, 5.0, 5.0]);
    }
}
