//! Error types for the IR crate.

use crate::qubit::QubitId;
use thiserror::Error;

/// Errors that can occur in IR operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IrError {
    /// Qubit target outside the circuit's allocated range.
    #[error("Qubit {qubit} out of range for circuit with {qubit_count} qubits")]
    QubitOutOfRange {
        /// The offending target.
        qubit: QubitId,
        /// Number of qubits the circuit declares.
        qubit_count: usize,
    },

    /// Matrix with inconsistent or non-power-of-two shape.
    #[error("Invalid matrix: {0}")]
    InvalidMatrix(String),

    /// Matrix supplied as a unitary operator fails the unitarity check.
    #[error("Matrix is not unitary within tolerance")]
    NotUnitary,

    /// Kraus operators do not form a trace-preserving channel.
    #[error("Kraus operators do not satisfy the completeness relation")]
    NotCompletelyPositive,

    /// Observable matrix is not Hermitian.
    #[error("Observable matrix is not Hermitian")]
    NotHermitian,

    /// Noise channel probability outside `[0, 1]`.
    #[error("Noise parameter {value} for '{channel}' is outside [0, 1]")]
    InvalidProbability {
        /// Channel name.
        channel: &'static str,
        /// The offending value.
        value: f64,
    },

    /// Fractional power requested for an operator that only supports
    /// integer powers.
    #[error("Operator '{0}' only supports integer powers")]
    FractionalPower(String),

    /// Gate modifier applied to an operator kind that cannot carry it.
    #[error("Modifier '{modifier}' cannot apply to operator '{operator}'")]
    UnsupportedModifier {
        /// The modifier name.
        modifier: &'static str,
        /// The operator name.
        operator: String,
    },
}

/// Result type for IR operations.
pub type IrResult<T> = Result<T, IrError>;
