//! Square complex matrices for unitary operators, Kraus channels,
//! and Hermitian observables.
//!
//! Matrices are stored row-major. Dimensions are powers of two (one
//! row/column per basis state of the targeted qubits).

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};

/// Tolerance for floating point comparisons.
const EPSILON: f64 = 1e-10;

/// A square complex matrix in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    /// Number of rows (= columns).
    dim: usize,
    /// Row-major elements, `data[row * dim + col]`.
    data: Vec<Complex64>,
}

impl Matrix {
    /// Create a matrix from row-major data.
    ///
    /// The length of `data` must be a perfect square whose root is a
    /// power of two.
    pub fn from_rows(rows: Vec<Vec<Complex64>>) -> IrResult<Self> {
        let dim = rows.len();
        if dim == 0 || !dim.is_power_of_two() {
            return Err(IrError::InvalidMatrix(format!(
                "matrix dimension {dim} is not a positive power of two"
            )));
        }
        let mut data = Vec::with_capacity(dim * dim);
        for row in &rows {
            if row.len() != dim {
                return Err(IrError::InvalidMatrix(format!(
                    "matrix row has {} entries, expected {dim}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self { dim, data })
    }

    /// Create an identity matrix of the given dimension.
    pub fn identity(dim: usize) -> Self {
        let mut data = vec![Complex64::new(0.0, 0.0); dim * dim];
        for i in 0..dim {
            data[i * dim + i] = Complex64::new(1.0, 0.0);
        }
        Self { dim, data }
    }

    /// The matrix dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of qubits this matrix acts on (log2 of the dimension).
    #[inline]
    pub fn num_qubits(&self) -> u32 {
        self.dim.trailing_zeros()
    }

    /// Element at `(row, col)`.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Complex64 {
        self.data[row * self.dim + col]
    }

    /// Row-major element slice.
    pub fn as_slice(&self) -> &[Complex64] {
        &self.data
    }

    /// Matrix product `self * other`.
    pub fn mul(&self, other: &Self) -> Self {
        debug_assert_eq!(self.dim, other.dim);
        let n = self.dim;
        let mut data = vec![Complex64::new(0.0, 0.0); n * n];
        for i in 0..n {
            for k in 0..n {
                let a = self.data[i * n + k];
                if a.norm_sqr() == 0.0 {
                    continue;
                }
                for j in 0..n {
                    data[i * n + j] += a * other.data[k * n + j];
                }
            }
        }
        Self { dim: n, data }
    }

    /// Conjugate transpose.
    pub fn dagger(&self) -> Self {
        let n = self.dim;
        let mut data = vec![Complex64::new(0.0, 0.0); n * n];
        for i in 0..n {
            for j in 0..n {
                data[j * n + i] = self.data[i * n + j].conj();
            }
        }
        Self { dim: n, data }
    }

    /// Integer power. Negative exponents use the adjoint (valid for
    /// unitary matrices, which is the only place this is called).
    pub fn pow_int(&self, exponent: i64) -> Self {
        let base = if exponent < 0 { self.dagger() } else { self.clone() };
        let mut result = Self::identity(self.dim);
        for _ in 0..exponent.unsigned_abs() {
            result = result.mul(&base);
        }
        result
    }

    /// Check whether `self * self† = I` within tolerance.
    pub fn is_unitary(&self) -> bool {
        self.mul(&self.dagger()).is_identity()
    }

    /// Check whether the matrix equals its conjugate transpose.
    pub fn is_hermitian(&self) -> bool {
        let n = self.dim;
        for i in 0..n {
            for j in 0..n {
                let delta = self.data[i * n + j] - self.data[j * n + i].conj();
                if delta.norm() > EPSILON {
                    return false;
                }
            }
        }
        true
    }

    /// Check whether the matrix is the identity within tolerance.
    pub fn is_identity(&self) -> bool {
        let n = self.dim;
        for i in 0..n {
            for j in 0..n {
                let expected = if i == j { 1.0 } else { 0.0 };
                let delta = self.data[i * n + j] - Complex64::new(expected, 0.0);
                if delta.norm() > EPSILON {
                    return false;
                }
            }
        }
        true
    }

    /// Check that a set of Kraus operators forms a trace-preserving
    /// channel: Σ Kᵢ† Kᵢ = I.
    pub fn is_cptp(operators: &[Matrix]) -> bool {
        let Some(first) = operators.first() else {
            return false;
        };
        let n = first.dim;
        if operators.iter().any(|m| m.dim != n) {
            return false;
        }
        let mut sum = Matrix {
            dim: n,
            data: vec![Complex64::new(0.0, 0.0); n * n],
        };
        for k in operators {
            let product = k.dagger().mul(k);
            for (s, p) in sum.data.iter_mut().zip(product.data.iter()) {
                *s += p;
            }
        }
        sum.is_identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    fn hadamard() -> Matrix {
        let s = 1.0 / 2.0_f64.sqrt();
        Matrix::from_rows(vec![vec![c(s, 0.0), c(s, 0.0)], vec![c(s, 0.0), c(-s, 0.0)]]).unwrap()
    }

    #[test]
    fn test_dimension_checks() {
        assert!(Matrix::from_rows(vec![vec![c(1.0, 0.0); 3]; 3]).is_err());
        assert!(Matrix::from_rows(vec![vec![c(1.0, 0.0); 2], vec![c(1.0, 0.0); 3]]).is_err());
        assert!(Matrix::from_rows(vec![]).is_err());
    }

    #[test]
    fn test_hadamard_unitary() {
        let h = hadamard();
        assert!(h.is_unitary());
        assert!(h.is_hermitian());
        assert!(h.mul(&h).is_identity());
        assert_eq!(h.num_qubits(), 1);
    }

    #[test]
    fn test_pow_int() {
        let h = hadamard();
        assert!(h.pow_int(2).is_identity());
        assert!(h.pow_int(0).is_identity());
        // H is self-adjoint, so H^-1 = H.
        assert_eq!(h.pow_int(-1), h.dagger());
    }

    #[test]
    fn test_cptp() {
        let p: f64 = 0.3;
        let k0 = Matrix::from_rows(vec![
            vec![c((1.0 - p).sqrt(), 0.0), c(0.0, 0.0)],
            vec![c(0.0, 0.0), c((1.0 - p).sqrt(), 0.0)],
        ])
        .unwrap();
        let k1 = Matrix::from_rows(vec![
            vec![c(0.0, 0.0), c(p.sqrt(), 0.0)],
            vec![c(p.sqrt(), 0.0), c(0.0, 0.0)],
        ])
        .unwrap();
        assert!(Matrix::is_cptp(&[k0.clone(), k1]));
        assert!(!Matrix::is_cptp(&[k0]));
    }

    #[test]
    fn test_not_unitary() {
        let m = Matrix::from_rows(vec![
            vec![c(1.0, 0.0), c(0.0, 0.0)],
            vec![c(0.0, 0.0), c(0.5, 0.0)],
        ])
        .unwrap();
        assert!(!m.is_unitary());
    }
}
