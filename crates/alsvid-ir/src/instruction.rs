//! Circuit instructions combining operators with targets.

use serde::{Deserialize, Serialize};

use crate::noise::NoiseChannel;
use crate::operator::Operator;
use crate::qubit::QubitId;

/// A complete instruction: an operator applied to concrete targets.
///
/// For control-wrapped operators the control qubits are the leading
/// entries of `targets`, in pattern order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The operator to apply.
    pub operator: Operator,
    /// Qubit targets, controls first.
    pub targets: Vec<QubitId>,
}

impl Instruction {
    /// Create an instruction.
    pub fn new(operator: Operator, targets: impl IntoIterator<Item = QubitId>) -> Self {
        Self {
            operator,
            targets: targets.into_iter().collect(),
        }
    }

    /// Create a named-gate instruction.
    pub fn gate(
        name: impl Into<String>,
        params: Vec<f64>,
        targets: impl IntoIterator<Item = QubitId>,
    ) -> Self {
        Self::new(Operator::gate(name, params), targets)
    }

    /// Create a noise-channel instruction.
    pub fn noise(channel: NoiseChannel, targets: impl IntoIterator<Item = QubitId>) -> Self {
        Self::new(Operator::Noise(channel), targets)
    }

    /// Check whether this instruction applies a noise channel.
    pub fn is_noise(&self) -> bool {
        self.operator.is_noise()
    }

    /// The operator's display name.
    pub fn name(&self) -> &str {
        self.operator.name()
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let targets: Vec<String> = self.targets.iter().map(|q| format!("{q}")).collect();
        write!(f, "{} {}", self.operator, targets.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_instruction() {
        let inst = Instruction::gate("h", vec![], [QubitId(0)]);
        assert_eq!(inst.name(), "h");
        assert!(!inst.is_noise());
        assert_eq!(format!("{inst}"), "h q0");
    }

    #[test]
    fn test_noise_instruction() {
        let inst = Instruction::noise(NoiseChannel::BitFlip { p: 0.5 }, [QubitId(1)]);
        assert!(inst.is_noise());
        assert_eq!(inst.name(), "bit_flip");
    }

    #[test]
    fn test_controlled_targets() {
        let op = Operator::gate("x", vec![]).controlled(1);
        let inst = Instruction::new(op, [QubitId(0), QubitId(1)]);
        assert_eq!(inst.targets, vec![QubitId(0), QubitId(1)]);
        assert_eq!(format!("{inst}"), "ctrl @ x q0, q1");
    }
}
