//! Property-based tests for gate-modifier lowering and target
//! broadcasting.
//!
//! The gate-equivalence laws hold exactly because `pow` lowers to an
//! algebraic exponent on the emitted operator and `inv` to exponent
//! negation plus sequence reversal.

use std::collections::HashMap;

use alsvid_ir::{Circuit, Operator};
use alsvid_qasm3::compile;
use proptest::prelude::*;

fn build(source: &str) -> Circuit {
    compile(source, HashMap::new()).expect("elaboration failed")
}

/// A small pool of single-qubit gates to modify.
fn arb_gate() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("x"),
        Just("y"),
        Just("z"),
        Just("h"),
        Just("s"),
        Just("t"),
        Just("v"),
    ]
}

/// Exponents that stay well away from float-precision edge cases.
fn arb_exponent() -> impl Strategy<Value = f64> {
    (-8i32..=8).prop_filter("zero exponents collapse gates", |&n| n != 0).prop_map(|n| f64::from(n) / 2.0)
}

proptest! {
    /// inv @ inv @ g produces the same operator as g alone.
    #[test]
    fn test_double_inverse_is_identity(gate in arb_gate()) {
        let plain = build(&format!("qubit q; {gate} q;"));
        let doubled = build(&format!("qubit q; inv @ inv @ {gate} q;"));
        prop_assert_eq!(&plain.instructions, &doubled.instructions);
    }

    /// pow(1) @ g produces the same operator as g alone.
    #[test]
    fn test_pow_one_is_identity(gate in arb_gate()) {
        let plain = build(&format!("qubit q; {gate} q;"));
        let powered = build(&format!("qubit q; pow(1) @ {gate} q;"));
        prop_assert_eq!(&plain.instructions, &powered.instructions);
    }

    /// pow(a) @ pow(b) @ g composes multiplicatively.
    #[test]
    fn test_pow_composes(gate in arb_gate(), a in arb_exponent(), b in arb_exponent()) {
        let chained = build(&format!("qubit q; pow({a}) @ pow({b}) @ {gate} q;"));
        let fused = build(&format!("qubit q; pow({}) @ {gate} q;", a * b));

        prop_assert_eq!(chained.len(), 1);
        let exponent_of = |circuit: &Circuit| match &circuit.instructions[0].operator {
            Operator::Gate(g) => g.exponent,
            other => panic!("expected a gate, got {other:?}"),
        };
        let delta = (exponent_of(&chained) - exponent_of(&fused)).abs();
        prop_assert!(delta < 1e-9, "exponent mismatch: {delta}");
    }

    /// inv distributes over pow as exponent negation.
    #[test]
    fn test_inv_pow_commute(gate in arb_gate(), a in arb_exponent()) {
        let inv_pow = build(&format!("qubit q; inv @ pow({a}) @ {gate} q;"));
        let pow_inv = build(&format!("qubit q; pow({a}) @ inv @ {gate} q;"));
        prop_assert_eq!(&inv_pow.instructions, &pow_inv.instructions);
    }

    /// Applying a single-qubit gate to a register of L qubits emits
    /// exactly L instructions, the i-th targeting element i.
    #[test]
    fn test_broadcast_law(gate in arb_gate(), size in 1u32..=12) {
        let circuit = build(&format!("qubit[{size}] q; {gate} q;"));
        prop_assert_eq!(circuit.len(), size as usize);
        for (i, instruction) in circuit.instructions.iter().enumerate() {
            prop_assert_eq!(instruction.targets.len(), 1);
            prop_assert_eq!(instruction.targets[0].index(), i);
        }
    }

    /// inv reverses a definition body's instruction sequence.
    #[test]
    fn test_inverse_reverses_body(size in 1u32..=6) {
        let source = format!(
            "gate prep a {{ h a; t a; s a; }} qubit[{size}] q; inv @ prep q;"
        );
        let circuit = build(&source);
        prop_assert_eq!(circuit.len(), 3 * size as usize);
        // Each broadcast copy runs the body reversed: s, t, h.
        let names: Vec<&str> = circuit.instructions[..3]
            .iter()
            .map(alsvid_ir::Instruction::name)
            .collect();
        prop_assert_eq!(names, vec!["s", "t", "h"]);
    }
}
