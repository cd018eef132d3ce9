//! Noise channel operators.
//!
//! Channels are carried through the IR as data; the numerical
//! application of a channel to a density matrix belongs to the
//! downstream simulator. The front-end validates parameters
//! (probabilities in range, Kraus completeness) at construction.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::matrix::Matrix;

/// A noise channel applied to one or two qubits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum NoiseChannel {
    /// Flips |0⟩ ↔ |1⟩ with probability `p`.
    BitFlip {
        /// Flip probability.
        p: f64,
    },

    /// Applies Z with probability `p`.
    PhaseFlip {
        /// Flip probability.
        p: f64,
    },

    /// Applies X, Y, Z with independent probabilities.
    PauliChannel {
        /// X probability.
        px: f64,
        /// Y probability.
        py: f64,
        /// Z probability.
        pz: f64,
    },

    /// Single-qubit depolarizing channel.
    Depolarizing {
        /// Error probability.
        p: f64,
    },

    /// Two-qubit depolarizing channel.
    TwoQubitDepolarizing {
        /// Error probability.
        p: f64,
    },

    /// Two-qubit dephasing channel.
    TwoQubitDephasing {
        /// Error probability.
        p: f64,
    },

    /// Energy relaxation (T1 decay).
    AmplitudeDamping {
        /// Damping parameter.
        gamma: f64,
    },

    /// Amplitude damping towards a thermal state.
    GeneralizedAmplitudeDamping {
        /// Damping parameter.
        gamma: f64,
        /// Excited-state population.
        p: f64,
    },

    /// Dephasing without energy loss (T2 decay).
    PhaseDamping {
        /// Dephasing parameter.
        gamma: f64,
    },

    /// Explicit Kraus operators.
    Kraus {
        /// The Kraus matrices, all of equal dimension.
        matrices: Vec<Matrix>,
    },
}

impl NoiseChannel {
    /// The channel's canonical name (matches the pragma grammar).
    pub fn name(&self) -> &'static str {
        match self {
            NoiseChannel::BitFlip { .. } => "bit_flip",
            NoiseChannel::PhaseFlip { .. } => "phase_flip",
            NoiseChannel::PauliChannel { .. } => "pauli_channel",
            NoiseChannel::Depolarizing { .. } => "depolarizing",
            NoiseChannel::TwoQubitDepolarizing { .. } => "two_qubit_depolarizing",
            NoiseChannel::TwoQubitDephasing { .. } => "two_qubit_dephasing",
            NoiseChannel::AmplitudeDamping { .. } => "amplitude_damping",
            NoiseChannel::GeneralizedAmplitudeDamping { .. } => "generalized_amplitude_damping",
            NoiseChannel::PhaseDamping { .. } => "phase_damping",
            NoiseChannel::Kraus { .. } => "kraus",
        }
    }

    /// Number of qubits this channel acts on.
    pub fn num_qubits(&self) -> usize {
        match self {
            NoiseChannel::TwoQubitDepolarizing { .. } | NoiseChannel::TwoQubitDephasing { .. } => 2,
            NoiseChannel::Kraus { matrices } => matrices
                .first()
                .map_or(0, |m| m.num_qubits() as usize),
            _ => 1,
        }
    }

    /// The channel's numeric parameters, in declaration order.
    pub fn params(&self) -> Vec<f64> {
        match self {
            NoiseChannel::BitFlip { p }
            | NoiseChannel::PhaseFlip { p }
            | NoiseChannel::Depolarizing { p }
            | NoiseChannel::TwoQubitDepolarizing { p }
            | NoiseChannel::TwoQubitDephasing { p } => vec![*p],
            NoiseChannel::PauliChannel { px, py, pz } => vec![*px, *py, *pz],
            NoiseChannel::AmplitudeDamping { gamma } | NoiseChannel::PhaseDamping { gamma } => {
                vec![*gamma]
            }
            NoiseChannel::GeneralizedAmplitudeDamping { gamma, p } => vec![*gamma, *p],
            NoiseChannel::Kraus { .. } => vec![],
        }
    }

    /// Validate channel parameters.
    ///
    /// Probabilities must lie in `[0, 1]` (and sum to at most 1 for
    /// the Pauli channel); Kraus operators must be dimensionally
    /// consistent and satisfy the completeness relation.
    pub fn validate(&self) -> IrResult<()> {
        let check = |value: f64| -> IrResult<()> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(IrError::InvalidProbability {
                    channel: self.name(),
                    value,
                })
            }
        };

        match self {
            NoiseChannel::PauliChannel { px, py, pz } => {
                check(*px)?;
                check(*py)?;
                check(*pz)?;
                check(px + py + pz)
            }
            NoiseChannel::GeneralizedAmplitudeDamping { gamma, p } => {
                check(*gamma)?;
                check(*p)
            }
            NoiseChannel::Kraus { matrices } => {
                if Matrix::is_cptp(matrices) {
                    Ok(())
                } else {
                    Err(IrError::NotCompletelyPositive)
                }
            }
            other => check(other.params()[0]),
        }
    }
}

impl std::fmt::Display for NoiseChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoiseChannel::Kraus { matrices } => {
                write!(f, "kraus[{} operators]", matrices.len())
            }
            other => {
                let params: Vec<String> =
                    other.params().iter().map(|p| format!("{p}")).collect();
                write!(f, "{}({})", other.name(), params.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_names_and_arity() {
        assert_eq!(NoiseChannel::BitFlip { p: 0.5 }.name(), "bit_flip");
        assert_eq!(NoiseChannel::BitFlip { p: 0.5 }.num_qubits(), 1);
        assert_eq!(
            NoiseChannel::TwoQubitDephasing { p: 0.1 }.num_qubits(),
            2
        );
    }

    #[test]
    fn test_probability_validation() {
        assert!(NoiseChannel::Depolarizing { p: 0.5 }.validate().is_ok());
        assert!(NoiseChannel::Depolarizing { p: 1.5 }.validate().is_err());
        assert!(NoiseChannel::PauliChannel {
            px: 0.5,
            py: 0.5,
            pz: 0.5
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_kraus_validation() {
        let c = Complex64::new;
        let p: f64 = 0.2;
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

        let channel = NoiseChannel::Kraus {
            matrices: vec![k0.clone(), k1],
        };
        assert!(channel.validate().is_ok());
        assert_eq!(channel.num_qubits(), 1);

        let incomplete = NoiseChannel::Kraus { matrices: vec![k0] };
        assert!(incomplete.validate().is_err());
    }

    #[test]
    fn test_display() {
        let ch = NoiseChannel::GeneralizedAmplitudeDamping { gamma: 0.2, p: 0.3 };
        assert_eq!(format!("{ch}"), "generalized_amplitude_damping(0.2, 0.3)");
    }
}
