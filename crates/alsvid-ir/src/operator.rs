//! Circuit operators.
//!
//! An operator is what an instruction applies to its targets: a named
//! gate from the standard library (resolved parameters, algebraic
//! exponent), a control wrapper around another operator, an explicit
//! unitary matrix, or a noise channel.
//!
//! Gate powers are algebraic: `pow(x)` scales the gate's exponent, so
//! `pow(a) @ pow(b) @ g` and `pow(a*b) @ g` produce identical
//! operators, and `inv` is exponent negation. The downstream simulator
//! looks the gate's matrix up by name and applies the exponent
//! numerically.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::matrix::Matrix;
use crate::noise::NoiseChannel;

/// A named gate with fully-resolved parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOp {
    /// Gate name in the standard library.
    pub name: String,
    /// Resolved numeric parameters.
    pub params: Vec<f64>,
    /// Algebraic exponent. `1.0` is the plain gate, `-1.0` its
    /// adjoint, `0.5` its square root.
    pub exponent: f64,
}

impl GateOp {
    /// Create a gate operator with exponent 1.
    pub fn new(name: impl Into<String>, params: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            params,
            exponent: 1.0,
        }
    }
}

/// An explicit unitary matrix operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitaryOp {
    /// The matrix, validated unitary at construction.
    pub matrix: Matrix,
}

impl UnitaryOp {
    /// Create a unitary operator, checking unitarity.
    pub fn new(matrix: Matrix) -> IrResult<Self> {
        if matrix.is_unitary() {
            Ok(Self { matrix })
        } else {
            Err(IrError::NotUnitary)
        }
    }
}

/// An operator applied by a circuit instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    /// A named gate.
    Gate(GateOp),
    /// A control wrapper. `pattern[i]` is the control state (1 = ctrl,
    /// 0 = negctrl) of the i-th prepended target qubit.
    Controlled {
        /// The wrapped operator.
        inner: Box<Operator>,
        /// Per-control-qubit activation bits, outermost first.
        pattern: Vec<u8>,
    },
    /// An explicit unitary matrix.
    Unitary(UnitaryOp),
    /// A noise channel.
    Noise(NoiseChannel),
}

impl Operator {
    /// Create a named gate operator.
    pub fn gate(name: impl Into<String>, params: Vec<f64>) -> Self {
        Operator::Gate(GateOp::new(name, params))
    }

    /// The operator's display name.
    pub fn name(&self) -> &str {
        match self {
            Operator::Gate(g) => &g.name,
            Operator::Controlled { inner, .. } => inner.name(),
            Operator::Unitary(_) => "unitary",
            Operator::Noise(n) => n.name(),
        }
    }

    /// Number of control qubits wrapped around the base operator.
    pub fn num_controls(&self) -> usize {
        match self {
            Operator::Controlled { pattern, .. } => pattern.len(),
            _ => 0,
        }
    }

    /// Resolved numeric parameters of the base operator.
    pub fn params(&self) -> Vec<f64> {
        match self {
            Operator::Gate(g) => g.params.clone(),
            Operator::Controlled { inner, .. } => inner.params(),
            Operator::Unitary(_) => vec![],
            Operator::Noise(n) => n.params(),
        }
    }

    /// Raise the operator to a power.
    ///
    /// Named gates accumulate the exponent algebraically. Explicit
    /// unitaries are powered by repeated product and therefore accept
    /// integer exponents only. Control wrappers delegate to the
    /// wrapped operator (`C(U)^x = C(U^x)`).
    pub fn powered(self, exponent: f64) -> IrResult<Self> {
        match self {
            Operator::Gate(mut g) => {
                g.exponent *= exponent;
                Ok(Operator::Gate(g))
            }
            Operator::Controlled { inner, pattern } => Ok(Operator::Controlled {
                inner: Box::new(inner.powered(exponent)?),
                pattern,
            }),
            Operator::Unitary(u) => {
                if exponent.fract() != 0.0 {
                    return Err(IrError::FractionalPower("unitary".into()));
                }
                #[allow(clippy::cast_possible_truncation)]
                let matrix = u.matrix.pow_int(exponent as i64);
                Ok(Operator::Unitary(UnitaryOp { matrix }))
            }
            Operator::Noise(n) => Err(IrError::UnsupportedModifier {
                modifier: "pow",
                operator: n.name().to_string(),
            }),
        }
    }

    /// The adjoint operator.
    pub fn adjoint(self) -> IrResult<Self> {
        match self {
            Operator::Gate(mut g) => {
                g.exponent = -g.exponent;
                Ok(Operator::Gate(g))
            }
            Operator::Controlled { inner, pattern } => Ok(Operator::Controlled {
                inner: Box::new(inner.adjoint()?),
                pattern,
            }),
            Operator::Unitary(u) => Ok(Operator::Unitary(UnitaryOp {
                matrix: u.matrix.dagger(),
            })),
            Operator::Noise(n) => Err(IrError::UnsupportedModifier {
                modifier: "inv",
                operator: n.name().to_string(),
            }),
        }
    }

    /// Wrap the operator in one further control layer.
    ///
    /// The new control becomes the outermost prepended target. Nested
    /// wrappers collapse into a single pattern.
    pub fn controlled(self, bit: u8) -> Self {
        match self {
            Operator::Controlled { inner, mut pattern } => {
                pattern.insert(0, bit);
                Operator::Controlled { inner, pattern }
            }
            other => Operator::Controlled {
                inner: Box::new(other),
                pattern: vec![bit],
            },
        }
    }

    /// Check whether this is a noise channel.
    pub fn is_noise(&self) -> bool {
        matches!(self, Operator::Noise(_))
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::Gate(g) => {
                write!(f, "{}", g.name)?;
                if !g.params.is_empty() {
                    let params: Vec<String> = g.params.iter().map(|p| format!("{p}")).collect();
                    write!(f, "({})", params.join(", "))?;
                }
                if (g.exponent - 1.0).abs() > f64::EPSILON {
                    write!(f, "^{}", g.exponent)?;
                }
                Ok(())
            }
            Operator::Controlled { inner, pattern } => {
                for bit in pattern {
                    if *bit == 1 {
                        write!(f, "ctrl @ ")?;
                    } else {
                        write!(f, "negctrl @ ")?;
                    }
                }
                write!(f, "{inner}")
            }
            Operator::Unitary(u) => write!(f, "unitary[{}x{0}]", u.matrix.dim()),
            Operator::Noise(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_pow_composes() {
        let g = Operator::gate("x", vec![]);
        let powered = g.powered(0.5).unwrap().powered(4.0).unwrap();
        match powered {
            Operator::Gate(g) => assert!((g.exponent - 2.0).abs() < 1e-12),
            other => panic!("expected Gate, got {other:?}"),
        }
    }

    #[test]
    fn test_double_adjoint_is_identity() {
        let g = Operator::gate("s", vec![]);
        let back = g.clone().adjoint().unwrap().adjoint().unwrap();
        assert_eq!(g, back);
    }

    #[test]
    fn test_control_nesting_collapses() {
        let g = Operator::gate("x", vec![]);
        let cc = g.controlled(1).controlled(0);
        match &cc {
            Operator::Controlled { pattern, .. } => assert_eq!(pattern, &vec![0, 1]),
            other => panic!("expected Controlled, got {other:?}"),
        }
        assert_eq!(cc.num_controls(), 2);
        assert_eq!(cc.name(), "x");
    }

    #[test]
    fn test_unitary_rejects_fractional_power() {
        let c = Complex64::new;
        let x = Matrix::from_rows(vec![
            vec![c(0.0, 0.0), c(1.0, 0.0)],
            vec![c(1.0, 0.0), c(0.0, 0.0)],
        ])
        .unwrap();
        let u = Operator::Unitary(UnitaryOp::new(x).unwrap());
        assert!(u.clone().powered(2.0).is_ok());
        assert!(u.powered(0.5).is_err());
    }

    #[test]
    fn test_display() {
        let op = Operator::gate("rx", vec![1.5]).controlled(1);
        assert_eq!(format!("{op}"), "ctrl @ rx(1.5)");
    }
}
