//! Result requests attached to a circuit.
//!
//! A result request tells the downstream simulator what to report
//! after evolving the state: the full state vector, amplitudes of
//! selected basis states, measurement probabilities, a reduced density
//! matrix, or the expectation/variance/samples of an observable.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::matrix::Matrix;
use crate::qubit::QubitId;

/// A single-qubit or tensor-product observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Observable {
    /// Pauli-I.
    I,
    /// Pauli-X.
    X,
    /// Pauli-Y.
    Y,
    /// Pauli-Z.
    Z,
    /// Hadamard.
    H,
    /// An explicit Hermitian matrix.
    Hermitian(Matrix),
    /// A tensor product of observables, leftmost factor first.
    Tensor(Vec<Observable>),
}

impl Observable {
    /// Create a Hermitian observable, checking hermiticity.
    pub fn hermitian(matrix: Matrix) -> IrResult<Self> {
        if matrix.is_hermitian() {
            Ok(Observable::Hermitian(matrix))
        } else {
            Err(IrError::NotHermitian)
        }
    }

    /// Number of qubits this observable measures.
    pub fn num_qubits(&self) -> usize {
        match self {
            Observable::Hermitian(m) => m.num_qubits() as usize,
            Observable::Tensor(factors) => factors.iter().map(Observable::num_qubits).sum(),
            _ => 1,
        }
    }
}

impl std::fmt::Display for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Observable::I => write!(f, "i"),
            Observable::X => write!(f, "x"),
            Observable::Y => write!(f, "y"),
            Observable::Z => write!(f, "z"),
            Observable::H => write!(f, "h"),
            Observable::Hermitian(m) => write!(f, "hermitian[{}x{0}]", m.dim()),
            Observable::Tensor(factors) => {
                let parts: Vec<String> = factors.iter().map(|o| format!("{o}")).collect();
                write!(f, "{}", parts.join(" @ "))
            }
        }
    }
}

/// A request for a value the simulator should report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultRequest {
    /// The full state vector.
    StateVector,

    /// Amplitudes of the named computational basis states.
    Amplitude {
        /// Basis-state bitstrings, e.g. `"0101"`.
        states: Vec<String>,
    },

    /// Measurement probabilities. `None` targets all qubits.
    Probability {
        /// Targeted qubits, in request order.
        targets: Option<Vec<QubitId>>,
    },

    /// Reduced density matrix. `None` targets all qubits.
    DensityMatrix {
        /// Targeted qubits, in request order.
        targets: Option<Vec<QubitId>>,
    },

    /// Expectation value of an observable.
    Expectation {
        /// The observable.
        observable: Observable,
        /// Targeted qubits; `None` means all.
        targets: Option<Vec<QubitId>>,
    },

    /// Variance of an observable.
    Variance {
        /// The observable.
        observable: Observable,
        /// Targeted qubits; `None` means all.
        targets: Option<Vec<QubitId>>,
    },

    /// Per-shot samples of an observable.
    Sample {
        /// The observable.
        observable: Observable,
        /// Targeted qubits; `None` means all.
        targets: Option<Vec<QubitId>>,
    },
}

impl ResultRequest {
    /// The request's name as written in pragma source.
    pub fn name(&self) -> &'static str {
        match self {
            ResultRequest::StateVector => "state_vector",
            ResultRequest::Amplitude { .. } => "amplitude",
            ResultRequest::Probability { .. } => "probability",
            ResultRequest::DensityMatrix { .. } => "density_matrix",
            ResultRequest::Expectation { .. } => "expectation",
            ResultRequest::Variance { .. } => "variance",
            ResultRequest::Sample { .. } => "sample",
        }
    }

    /// Targeted qubits, if the request carries an explicit target list.
    pub fn targets(&self) -> Option<&[QubitId]> {
        match self {
            ResultRequest::Probability { targets }
            | ResultRequest::DensityMatrix { targets }
            | ResultRequest::Expectation { targets, .. }
            | ResultRequest::Variance { targets, .. }
            | ResultRequest::Sample { targets, .. } => targets.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_observable_arity() {
        assert_eq!(Observable::X.num_qubits(), 1);
        let t = Observable::Tensor(vec![Observable::X, Observable::Z]);
        assert_eq!(t.num_qubits(), 2);
        assert_eq!(format!("{t}"), "x @ z");
    }

    #[test]
    fn test_hermitian_check() {
        let c = Complex64::new;
        let ok = Matrix::from_rows(vec![
            vec![c(1.0, 0.0), c(0.0, -1.0)],
            vec![c(0.0, 1.0), c(-1.0, 0.0)],
        ])
        .unwrap();
        assert!(Observable::hermitian(ok).is_ok());

        let bad = Matrix::from_rows(vec![
            vec![c(1.0, 0.0), c(1.0, 0.0)],
            vec![c(0.0, 0.0), c(1.0, 0.0)],
        ])
        .unwrap();
        assert!(Observable::hermitian(bad).is_err());
    }

    #[test]
    fn test_request_targets() {
        let r = ResultRequest::Probability {
            targets: Some(vec![QubitId(1), QubitId(0)]),
        };
        assert_eq!(r.name(), "probability");
        assert_eq!(r.targets(), Some(&[QubitId(1), QubitId(0)][..]));

        let all = ResultRequest::StateVector;
        assert_eq!(all.targets(), None);
    }
}
