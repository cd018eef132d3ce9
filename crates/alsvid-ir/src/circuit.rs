//! The flat circuit record produced by the front-end.

use serde::{Deserialize, Serialize};

use crate::error::{IrError, IrResult};
use crate::instruction::Instruction;
use crate::qubit::QubitId;
use crate::result::ResultRequest;

/// A fully-elaborated circuit: an ordered instruction stream over
/// integer-indexed qubits, plus the result requests and measured
/// qubits recorded during elaboration.
///
/// Instructions appear in source-visible execution order. Every target
/// index is in `[0, qubit_count)` once [`validate`] has passed.
///
/// [`validate`]: Circuit::validate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Circuit {
    /// Total number of allocated qubits.
    pub qubit_count: usize,
    /// The instruction stream, in execution order.
    pub instructions: Vec<Instruction>,
    /// Result requests, in source order.
    pub results: Vec<ResultRequest>,
    /// Qubits named by `measure` statements, in encounter order.
    pub measured_qubits: Vec<QubitId>,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Check whether the circuit has no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Append an instruction, checking its targets against the
    /// allocated qubit range.
    pub fn push(&mut self, instruction: Instruction) -> IrResult<()> {
        if let Some(&bad) = instruction
            .targets
            .iter()
            .find(|q| q.index() >= self.qubit_count)
        {
            return Err(IrError::QubitOutOfRange {
                qubit: bad,
                qubit_count: self.qubit_count,
            });
        }
        self.instructions.push(instruction);
        Ok(())
    }

    /// Append a result request.
    pub fn push_result(&mut self, result: ResultRequest) {
        self.results.push(result);
    }

    /// Record a measured qubit.
    pub fn record_measurement(&mut self, qubit: QubitId) {
        self.measured_qubits.push(qubit);
    }

    /// Re-check every instruction and result target against the
    /// allocated qubit range.
    pub fn validate(&self) -> IrResult<()> {
        let in_range = |q: QubitId| q.index() < self.qubit_count;

        for instruction in &self.instructions {
            if let Some(&bad) = instruction.targets.iter().find(|&&q| !in_range(q)) {
                return Err(IrError::QubitOutOfRange {
                    qubit: bad,
                    qubit_count: self.qubit_count,
                });
            }
        }
        for result in &self.results {
            if let Some(targets) = result.targets() {
                if let Some(&bad) = targets.iter().find(|&&q| !in_range(q)) {
                    return Err(IrError::QubitOutOfRange {
                        qubit: bad,
                        qubit_count: self.qubit_count,
                    });
                }
            }
        }
        for &qubit in &self.measured_qubits {
            if !in_range(qubit) {
                return Err(IrError::QubitOutOfRange {
                    qubit,
                    qubit_count: self.qubit_count,
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "circuit[{} qubits]", self.qubit_count)?;
        for instruction in &self.instructions {
            writeln!(f, "  {instruction}")?;
        }
        for result in &self.results {
            writeln!(f, "  #result {}", result.name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_range_check() {
        let mut circuit = Circuit {
            qubit_count: 2,
            ..Circuit::default()
        };
        assert!(circuit
            .push(Instruction::gate("h", vec![], [QubitId(0)]))
            .is_ok());
        assert!(circuit
            .push(Instruction::gate("h", vec![], [QubitId(2)]))
            .is_err());
        assert_eq!(circuit.len(), 1);
    }

    #[test]
    fn test_validate_result_targets() {
        let mut circuit = Circuit {
            qubit_count: 1,
            ..Circuit::default()
        };
        circuit.push_result(ResultRequest::Probability {
            targets: Some(vec![QubitId(3)]),
        });
        assert!(circuit.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut circuit = Circuit {
            qubit_count: 2,
            ..Circuit::default()
        };
        circuit
            .push(Instruction::gate("rx", vec![0.5], [QubitId(1)]))
            .unwrap();
        circuit.push_result(ResultRequest::StateVector);
        circuit.record_measurement(QubitId(0));

        let json = serde_json::to_string(&circuit).unwrap();
        let back: Circuit = serde_json::from_str(&json).unwrap();
        assert_eq!(circuit, back);
    }
}
