//! End-to-end elaboration tests: source text in, circuit IR out.

use std::collections::HashMap;
use std::f64::consts::PI;

use alsvid_ir::{Circuit, NoiseChannel, Observable, Operator, QubitId, ResultRequest};
use alsvid_qasm3::{compile, ElaborationError, InputValue, QasmError};

fn build(source: &str) -> Circuit {
    compile(source, HashMap::new()).expect("elaboration failed")
}

fn build_with(source: &str, inputs: &[(&str, InputValue)]) -> Circuit {
    let inputs = inputs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect();
    compile(source, inputs).expect("elaboration failed")
}

fn gate_parts(op: &Operator) -> (&str, Vec<f64>, f64, Vec<u8>) {
    match op {
        Operator::Gate(g) => (g.name.as_str(), g.params.clone(), g.exponent, vec![]),
        Operator::Controlled { inner, pattern } => {
            let (name, params, exponent, _) = gate_parts(inner);
            (name, params, exponent, pattern.clone())
        }
        other => panic!("expected a gate operator, got {other:?}"),
    }
}

#[test]
fn test_power_control_inverse_composition() {
    let source = r"
        OPENQASM 3.0;
        gate x a { U(π, 0, π) a; }
        gate cx c, a { pow(1) @ ctrl @ x c, a; }
        qubit q1;
        qubit q2;
        pow(1/2) @ x q1;
        pow(1/2) @ x q1;
        cx q1, q2;
        s q1;
        s q1;
        inv @ z q1;
    ";
    let circuit = build(source);

    assert_eq!(circuit.qubit_count, 2);
    assert_eq!(circuit.len(), 6);

    let (name, params, exponent, pattern) = gate_parts(&circuit.instructions[0].operator);
    assert_eq!(name, "U");
    assert_eq!(params, vec![PI, 0.0, PI]);
    assert!((exponent - 0.5).abs() < 1e-12);
    assert!(pattern.is_empty());

    // The custom cx expands to a control-wrapped U with both targets.
    let (name, _, exponent, pattern) = gate_parts(&circuit.instructions[2].operator);
    assert_eq!(name, "U");
    assert!((exponent - 1.0).abs() < 1e-12);
    assert_eq!(pattern, vec![1]);
    assert_eq!(
        circuit.instructions[2].targets,
        vec![QubitId(0), QubitId(1)]
    );

    let (name, _, exponent, _) = gate_parts(&circuit.instructions[5].operator);
    assert_eq!(name, "z");
    assert!((exponent + 1.0).abs() < 1e-12);
}

#[test]
fn test_noise_pragmas() {
    let source = r#"
        OPENQASM 3.0;
        qubit[2] qs;
        #pragma braket noise bit_flip(.5) qs[1]
        #pragma braket noise phase_flip(.5) qs[0]
        #pragma braket noise pauli_channel(.1, .2, .3) qs[0]
        #pragma braket noise depolarizing(.5) qs[0]
        #pragma braket noise two_qubit_depolarizing(.9) qs
        #pragma braket noise two_qubit_depolarizing(.7) qs[1], qs[0]
        #pragma braket noise two_qubit_dephasing(.6) qs
        #pragma braket noise amplitude_damping(.2) qs[0]
        #pragma braket noise generalized_amplitude_damping(.2, .3) qs[1]
        #pragma braket noise phase_damping(.4) qs[0]
        #pragma braket noise kraus([[0.9486832980505138, 0], [0, 0.9486832980505138]], [[0, 0.31622776601683794], [0.31622776601683794, 0]]) qs[0]
        #pragma braket noise kraus([[0.9486832980505138, 0, 0, 0], [0, 0.9486832980505138, 0, 0], [0, 0, 0.9486832980505138, 0], [0, 0, 0, 0.9486832980505138]], [[0, 0.31622776601683794, 0, 0], [0.31622776601683794, 0, 0, 0], [0, 0, 0, 0.31622776601683794], [0, 0, 0.31622776601683794, 0]]) qs[0], qs[1]
    "#;
    let circuit = build(source);

    assert_eq!(circuit.len(), 12);
    assert!(circuit.instructions.iter().all(alsvid_ir::Instruction::is_noise));

    let targets: Vec<Vec<u32>> = circuit
        .instructions
        .iter()
        .map(|i| i.targets.iter().map(|q| q.0).collect())
        .collect();
    assert_eq!(
        targets,
        vec![
            vec![1],
            vec![0],
            vec![0],
            vec![0],
            vec![0, 1],
            vec![1, 0],
            vec![0, 1],
            vec![0],
            vec![1],
            vec![0],
            vec![0],
            vec![0, 1],
        ]
    );

    match &circuit.instructions[2].operator {
        Operator::Noise(NoiseChannel::PauliChannel { px, py, pz }) => {
            assert_eq!((*px, *py, *pz), (0.1, 0.2, 0.3));
        }
        other => panic!("expected pauli_channel, got {other:?}"),
    }
    match &circuit.instructions[11].operator {
        Operator::Noise(NoiseChannel::Kraus { matrices }) => {
            assert_eq!(matrices.len(), 2);
            assert_eq!(matrices[0].dim(), 4);
        }
        other => panic!("expected kraus, got {other:?}"),
    }
}

#[test]
fn test_noise_probability_out_of_range() {
    let source = r"
        qubit q;
        #pragma braket noise bit_flip(1.5) q
    ";
    let err = compile(source, HashMap::new()).unwrap_err();
    assert!(matches!(err, QasmError::Elaboration(_)), "got {err:?}");
}

#[test]
fn test_unitary_pragma_and_gphase() {
    let source = r"
        OPENQASM 3.0;
        qubit[3] q;
        x q[0];
        h q[1];
        #pragma braket unitary([[1, 0], [0, 0.70710678118654752 + 0.70710678118654752im]]) q[0]
        ti q[0];
        #pragma braket unitary([[0.70710678118654752im, 0.70710678118654752im], [0.70710678118654752im, -0.70710678118654752im]]) q[1]
        gphase(-π/2) q[1];
        h q[1];
        #pragma braket unitary([[1, 0, 0, 0, 0, 0, 0, 0], [0, 1, 0, 0, 0, 0, 0, 0], [0, 0, 1, 0, 0, 0, 0, 0], [0, 0, 0, 1, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0, 0, 0], [0, 0, 0, 0, 0, 1, 0, 0], [0, 0, 0, 0, 0, 0, 0, 1], [0, 0, 0, 0, 0, 0, 1, 0]]) q
    ";
    let circuit = build(source);

    assert_eq!(circuit.qubit_count, 3);
    assert_eq!(circuit.len(), 8);

    // The global phase targets every allocated qubit regardless of
    // the written operand.
    let gphase = &circuit.instructions[5];
    let (name, params, _, _) = gate_parts(&gphase.operator);
    assert_eq!(name, "gphase");
    assert!((params[0] + PI / 2.0).abs() < 1e-12);
    assert_eq!(
        gphase.targets,
        vec![QubitId(0), QubitId(1), QubitId(2)]
    );

    match &circuit.instructions[7].operator {
        Operator::Unitary(u) => assert_eq!(u.matrix.dim(), 8),
        other => panic!("expected unitary, got {other:?}"),
    }
    assert_eq!(circuit.instructions[7].targets.len(), 3);
}

#[test]
fn test_non_unitary_pragma_matrix_rejected() {
    let source = r"
        qubit q;
        #pragma braket unitary([[1, 0], [0, 0.5]]) q
    ";
    assert!(compile(source, HashMap::new()).is_err());
}

const ADDER: &str = r#"
    OPENQASM 3.0;
    input uint[4] a_in;
    input uint[4] b_in;
    gate majority a, b, c { cnot c, b; cnot c, a; ccnot a, b, c; }
    gate unmaj a, b, c { ccnot a, b, c; cnot c, a; cnot a, b; }
    qubit cin;
    qubit[4] a;
    qubit[4] b;
    qubit cout;
    for int[8] i in [0: 3] {
        if (a_in[i] == 1) { x a[i]; }
        if (b_in[i] == 1) { x b[i]; }
    }
    majority cin, b[3], a[3];
    majority a[3], b[2], a[2];
    majority a[2], b[1], a[1];
    majority a[1], b[0], a[0];
    cnot a[0], cout;
    unmaj a[1], b[0], a[0];
    unmaj a[2], b[1], a[1];
    unmaj a[3], b[2], a[2];
    unmaj cin, b[3], a[3];
    #pragma braket result probability cout, b
    #pragma braket result probability cout
    #pragma braket result probability b
"#;

#[test]
fn test_ripple_carry_adder() {
    let circuit = build_with(
        ADDER,
        &[("a_in", InputValue::Int(3)), ("b_in", InputValue::Int(7))],
    );

    assert_eq!(circuit.qubit_count, 10);
    // 9 gate-definition calls of 3 instructions each, one cnot, plus
    // one x per set input bit (2 + 3).
    assert_eq!(circuit.len(), 9 * 3 + 1 + 5);

    assert_eq!(circuit.results.len(), 3);
    match &circuit.results[0] {
        ResultRequest::Probability { targets: Some(ids) } => {
            assert_eq!(
                ids.iter().map(|q| q.0).collect::<Vec<_>>(),
                vec![9, 5, 6, 7, 8]
            );
        }
        other => panic!("expected probability, got {other:?}"),
    }
    match &circuit.results[2] {
        ResultRequest::Probability { targets: Some(ids) } => {
            assert_eq!(ids.len(), 4);
        }
        other => panic!("expected probability, got {other:?}"),
    }
}

#[test]
fn test_adder_instruction_count_is_input_independent() {
    let a = build_with(
        ADDER,
        &[("a_in", InputValue::Int(3)), ("b_in", InputValue::Int(7))],
    );
    let b = build_with(
        ADDER,
        &[("a_in", InputValue::Int(0)), ("b_in", InputValue::Int(0))],
    );
    // The x-preparation count varies with the inputs; the adder core
    // (9 expanded gate calls + carry cnot) does not.
    assert_eq!(a.len() - 5, b.len());
}

#[test]
fn test_const_feeds_gate_power() {
    let source = r"
        OPENQASM 3.0;
        gate x a { U(π, 0, π) a; }
        gate cx c, a { ctrl @ x c, a; }
        int[8] two = 2;
        gate cxx c, a { pow(two) @ cx c, a; }
        qubit q1;
        qubit q2;
        cxx q1, q2;
    ";
    let circuit = build(source);

    assert_eq!(circuit.len(), 1);
    let (name, _, exponent, pattern) = gate_parts(&circuit.instructions[0].operator);
    assert_eq!(name, "U");
    assert!((exponent - 2.0).abs() < 1e-12);
    assert_eq!(pattern, vec![1]);
}

#[test]
fn test_missing_input_binding_names_variable() {
    let err = compile("input int[8] n; qubit q;", HashMap::new()).unwrap_err();
    match err {
        QasmError::Elaboration(ElaborationError::MissingInput(name)) => {
            assert_eq!(name, "n");
        }
        other => panic!("expected MissingInput, got {other:?}"),
    }
}

#[test]
fn test_broadcast_law() {
    let circuit = build("qubit[5] q; h q;");
    assert_eq!(circuit.len(), 5);
    for (i, instruction) in circuit.instructions.iter().enumerate() {
        assert_eq!(instruction.targets, vec![QubitId(i as u32)]);
    }
}

#[test]
fn test_broadcast_two_qubit_registers() {
    let circuit = build("qubit[3] a; qubit[3] b; cnot a, b;");
    assert_eq!(circuit.len(), 3);
    assert_eq!(circuit.instructions[1].targets, vec![QubitId(1), QubitId(4)]);
}

#[test]
fn test_broadcast_unit_target_replicates() {
    let circuit = build("qubit c; qubit[3] t; cnot c, t;");
    assert_eq!(circuit.len(), 3);
    for (i, instruction) in circuit.instructions.iter().enumerate() {
        assert_eq!(
            instruction.targets,
            vec![QubitId(0), QubitId(1 + i as u32)]
        );
    }
}

#[test]
fn test_broadcast_length_mismatch() {
    let err = compile("qubit[2] a; qubit[3] b; cnot a, b;", HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::BroadcastMismatch { .. })
    ));
}

#[test]
fn test_range_law() {
    let circuit = build("qubit[8] q; x q[0:2:6];");
    let targets: Vec<u32> = circuit
        .instructions
        .iter()
        .map(|i| i.targets[0].0)
        .collect();
    assert_eq!(targets, vec![0, 2, 4, 6]);

    // A missing stop resolves to the declared size minus one.
    let circuit = build("qubit[8] q; x q[5:];");
    let targets: Vec<u32> = circuit
        .instructions
        .iter()
        .map(|i| i.targets[0].0)
        .collect();
    assert_eq!(targets, vec![5, 6, 7]);
}

#[test]
fn test_const_immutability() {
    let err = compile("const int[8] n = 4; n = 5;", HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::ConstAssignment(_))
    ));

    let err = compile("input int[8] n; n += 1;", HashMap::new());
    assert!(err.is_err());
}

#[test]
fn test_for_scope_hygiene() {
    let source = r"
        qubit[2] q;
        for int i in [0:1] { x q[i]; }
        int[8] y = i;
    ";
    let err = compile(source, HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::UndefinedVariable(name)) if name == "i"
    ));
}

#[test]
fn test_while_and_compound_assignment() {
    let source = r"
        qubit[4] q;
        int[8] i = 0;
        while (i < 4) {
            x q[i];
            i += 1;
        }
    ";
    let circuit = build(source);
    assert_eq!(circuit.len(), 4);
}

#[test]
fn test_switch_selects_matching_arm() {
    let source = r"
        qubit q;
        int[8] n = 2;
        switch (n) {
            case 0, 1 { x q; }
            case 2 { y q; }
            default { z q; }
        }
    ";
    let circuit = build(source);
    assert_eq!(circuit.len(), 1);
    assert_eq!(circuit.instructions[0].name(), "y");
}

#[test]
fn test_switch_default_arm() {
    let source = r"
        qubit q;
        int[8] n = 9;
        switch (n) {
            case 0 { x q; }
            default { z q; }
        }
    ";
    assert_eq!(build(source).instructions[0].name(), "z");
}

#[test]
fn test_function_emits_at_call_site() {
    let source = r"
        OPENQASM 3.0;
        def bell(qubit a, qubit b) {
            h a;
            cnot a, b;
        }
        qubit[4] q;
        bell(q[0], q[1]);
        bell(q[2], q[3]);
    ";
    let circuit = build(source);
    assert_eq!(circuit.len(), 4);
    assert_eq!(circuit.instructions[2].targets, vec![QubitId(2)]);
    assert_eq!(circuit.instructions[3].targets, vec![QubitId(2), QubitId(3)]);
}

#[test]
fn test_function_return_value() {
    let source = r"
        qubit[4] q;
        def pick() -> int[8] { return 2; }
        int[8] n = pick();
        x q[n];
    ";
    let circuit = build(source);
    assert_eq!(circuit.instructions[0].targets, vec![QubitId(2)]);
}

#[test]
fn test_measure_records_targets() {
    let source = r"
        qubit[3] q;
        bit[3] c;
        h q[0];
        c = measure q;
    ";
    let circuit = build(source);
    assert_eq!(circuit.len(), 1);
    assert_eq!(
        circuit.measured_qubits,
        vec![QubitId(0), QubitId(1), QubitId(2)]
    );
}

#[test]
fn test_result_pragmas_in_source_order() {
    let source = r#"
        qubit[2] q;
        h q[0];
        #pragma braket result state_vector
        #pragma braket result amplitude "00", "11"
        #pragma braket result expectation x @ y q[0], q[1]
        #pragma braket result variance hermitian([[1, 0], [0, -1]]) q[0]
        #pragma braket result sample z q[1]
        #pragma braket result density_matrix
    "#;
    let circuit = build(source);
    assert_eq!(circuit.results.len(), 6);
    assert!(matches!(circuit.results[0], ResultRequest::StateVector));
    match &circuit.results[1] {
        ResultRequest::Amplitude { states } => assert_eq!(states, &["00", "11"]),
        other => panic!("expected amplitude, got {other:?}"),
    }
    match &circuit.results[2] {
        ResultRequest::Expectation {
            observable: Observable::Tensor(factors),
            targets: Some(ids),
        } => {
            assert_eq!(factors.len(), 2);
            assert_eq!(ids.len(), 2);
        }
        other => panic!("expected tensor expectation, got {other:?}"),
    }
    match &circuit.results[5] {
        ResultRequest::DensityMatrix { targets: None } => {}
        other => panic!("expected all-qubit density matrix, got {other:?}"),
    }
}

#[test]
fn test_amplitude_length_mismatch() {
    let source = r#"
        qubit[2] q;
        #pragma braket result amplitude "000"
    "#;
    assert!(compile(source, HashMap::new()).is_err());
}

#[test]
fn test_hardware_qubits_grow_allocation() {
    let circuit = build("h $2;");
    assert_eq!(circuit.qubit_count, 3);
    assert_eq!(circuit.instructions[0].targets, vec![QubitId(2)]);
}

#[test]
fn test_negctrl_pattern_bits() {
    let source = r"
        qubit[3] q;
        negctrl @ ctrl @ x q[0], q[1], q[2];
    ";
    let circuit = build(source);
    let (name, _, _, pattern) = gate_parts(&circuit.instructions[0].operator);
    assert_eq!(name, "x");
    assert_eq!(pattern, vec![0, 1]);
    assert_eq!(
        circuit.instructions[0].targets,
        vec![QubitId(0), QubitId(1), QubitId(2)]
    );
}

#[test]
fn test_counted_ctrl_modifier() {
    let circuit = build("qubit[3] q; ctrl(2) @ x q[0], q[1], q[2];");
    let (_, _, _, pattern) = gate_parts(&circuit.instructions[0].operator);
    assert_eq!(pattern, vec![1, 1]);
}

#[test]
fn test_ctrl_count_must_be_positive_integer() {
    let err = compile("qubit[2] q; ctrl(0) @ x q[0], q[1];", HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::InvalidModifierArgument { .. })
    ));
}

#[test]
fn test_controlled_gphase_targets_control_only() {
    let circuit = build("qubit[2] q; ctrl @ gphase(0.25) q[1];");
    assert_eq!(circuit.len(), 1);
    let (name, params, _, pattern) = gate_parts(&circuit.instructions[0].operator);
    assert_eq!(name, "gphase");
    assert_eq!(params, vec![0.25]);
    assert_eq!(pattern, vec![1]);
    assert_eq!(circuit.instructions[0].targets, vec![QubitId(1)]);
}

#[test]
fn test_unknown_gate_is_elaboration_error() {
    let err = compile("qubit q; frobnicate q;", HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::UnknownGate(name)) if name == "frobnicate"
    ));
}

#[test]
fn test_gate_arity_errors() {
    let err = compile("qubit q; rx q;", HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::GateParameterCount { .. })
    ));

    let err = compile("qubit q; cnot q;", HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::GateQubitCount { .. })
    ));
}

#[test]
fn test_output_declaration_rejected() {
    let err = compile("output int[8] n;", HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::Unsupported(_))
    ));
}

#[test]
fn test_end_stops_elaboration() {
    let source = r"
        qubit[2] q;
        x q[0];
        end;
        x q[1];
    ";
    let circuit = build(source);
    assert_eq!(circuit.len(), 1);
}

#[test]
fn test_box_body_elaborates() {
    let circuit = build("qubit q; box { x q; z q; }");
    assert_eq!(circuit.len(), 2);
}

#[test]
fn test_index_sanity_invariant() {
    let circuit = build_with(
        ADDER,
        &[("a_in", InputValue::Int(9)), ("b_in", InputValue::Int(5))],
    );
    assert!(circuit.validate().is_ok());
    for instruction in &circuit.instructions {
        for target in &instruction.targets {
            assert!(target.index() < circuit.qubit_count);
        }
    }
}

#[test]
fn test_serde_roundtrip_of_compiled_circuit() {
    let circuit = build("qubit[2] q; h q[0]; cnot q[0], q[1]; #pragma braket result probability");
    let json = serde_json::to_string(&circuit).unwrap();
    let back: Circuit = serde_json::from_str(&json).unwrap();
    assert_eq!(circuit, back);
}

#[test]
fn test_qubit_out_of_range() {
    let err = compile("qubit[2] q; x q[5];", HashMap::new()).unwrap_err();
    assert!(matches!(
        err,
        QasmError::Elaboration(ElaborationError::IndexOutOfRange { .. })
    ));
}

#[test]
fn test_bitstring_input_binding() {
    let source = r"
        input bit[4] flags;
        qubit[4] q;
        for int i in [0:3] { if (flags[i]) { x q[i]; } }
    ";
    let circuit = build_with(source, &[("flags", InputValue::String("1010".into()))]);
    let targets: Vec<u32> = circuit
        .instructions
        .iter()
        .map(|i| i.targets[0].0)
        .collect();
    assert_eq!(targets, vec![0, 2]);
}
