//! Builtin gate and function tables.
//!
//! The standard gate library itself (name → unitary matrix) lives in
//! the downstream simulator; the front-end only needs each gate's
//! arity to validate calls and drive broadcasting.

use crate::error::{ElabResult, ElaborationError};
use crate::types::Value;

/// Arity of a builtin gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateSpec {
    /// Number of classical parameters.
    pub num_params: usize,
    /// Number of qubit targets.
    pub num_qubits: usize,
}

/// Look up a builtin gate by name.
pub fn builtin_gate(name: &str) -> Option<GateSpec> {
    let spec = |num_params, num_qubits| GateSpec {
        num_params,
        num_qubits,
    };
    Some(match name {
        // Global phase applies to every allocated qubit.
        "gphase" => spec(1, 0),

        // One-qubit gates ("stdgates.inc" spellings included).
        "h" | "i" | "id" | "x" | "y" | "z" | "s" | "si" | "sdg" | "t" | "ti" | "tdg" | "v"
        | "vi" | "sx" | "sxdg" => spec(0, 1),
        "rx" | "ry" | "rz" | "phaseshift" | "p" | "u1" | "gpi" | "gpi2" => spec(1, 1),
        "prx" | "u2" => spec(2, 1),
        "U" | "u" | "u3" => spec(3, 1),

        // Two-qubit gates.
        "cnot" | "cx" | "cy" | "cz" | "ch" | "swap" | "iswap" | "ecr" => spec(0, 2),
        "cphaseshift" | "cphaseshift00" | "cphaseshift01" | "cphaseshift10" | "cp" | "crx"
        | "cry" | "crz" | "pswap" | "xy" | "xx" | "yy" | "zz" | "rxx" | "ryy" | "rzz" => {
            spec(1, 2)
        }
        "ms" => spec(3, 2),

        // Three-qubit gates.
        "ccnot" | "ccx" | "cswap" => spec(0, 3),

        _ => return None,
    })
}

/// Arity of a builtin noise channel, `(params, qubits)`. Kraus is
/// handled separately (its arity follows from its matrices).
pub fn noise_channel_arity(name: &str) -> Option<(usize, usize)> {
    Some(match name {
        "bit_flip" | "phase_flip" | "depolarizing" | "amplitude_damping" | "phase_damping" => {
            (1, 1)
        }
        "pauli_channel" => (3, 1),
        "generalized_amplitude_damping" => (2, 1),
        "two_qubit_depolarizing" | "two_qubit_dephasing" => (1, 2),
        _ => return None,
    })
}

/// Invoke a builtin function, or return `None` when the name is not
/// a builtin (the caller then tries user-defined functions).
///
/// Every numeric builtin takes scalars; `sizeof` takes an aggregate
/// plus an optional dimension index; `rotl`/`rotr` operate on sized
/// bit vectors.
pub fn builtin_function(name: &str, args: &[Value]) -> Option<ElabResult<Value>> {
    let result = match name {
        "arccos" => unary_float(name, args, f64::acos),
        "arcsin" => unary_float(name, args, f64::asin),
        "arctan" => unary_float(name, args, f64::atan),
        "cos" => unary_float(name, args, f64::cos),
        "sin" => unary_float(name, args, f64::sin),
        "tan" => unary_float(name, args, f64::tan),
        "exp" => unary_float(name, args, f64::exp),
        "log" => unary_float(name, args, f64::ln),
        "sqrt" => unary_float(name, args, f64::sqrt),
        "ceiling" => unary_to_int(name, args, f64::ceil),
        "floor" => unary_to_int(name, args, f64::floor),
        "mod" => binary_mod(args),
        "pow" => binary_pow(args),
        "popcount" => popcount(args),
        "rotl" => rotate(name, args, true),
        "rotr" => rotate(name, args, false),
        "sizeof" => sizeof(args),
        _ => return None,
    };
    Some(result)
}

fn expect_arity(name: &str, args: &[Value], expected: usize) -> ElabResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ElaborationError::FunctionArgumentCount {
            function: name.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn unary_float(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> ElabResult<Value> {
    expect_arity(name, args, 1)?;
    Ok(Value::Float(f(args[0].as_f64()?)))
}

fn unary_to_int(name: &str, args: &[Value], f: impl Fn(f64) -> f64) -> ElabResult<Value> {
    expect_arity(name, args, 1)?;
    #[allow(clippy::cast_possible_truncation)]
    let v = f(args[0].as_f64()?) as i64;
    Ok(Value::Int(v))
}

fn binary_mod(args: &[Value]) -> ElabResult<Value> {
    expect_arity("mod", args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Float(_), _) | (_, Value::Float(_)) => {
            let b = args[1].as_f64()?;
            if b == 0.0 {
                return Err(ElaborationError::DivisionByZero);
            }
            Ok(Value::Float(args[0].as_f64()? % b))
        }
        _ => {
            let b = args[1].as_int()?;
            if b == 0 {
                return Err(ElaborationError::DivisionByZero);
            }
            Ok(Value::Int(args[0].as_int()? % b))
        }
    }
}

fn binary_pow(args: &[Value]) -> ElabResult<Value> {
    expect_arity("pow", args, 2)?;
    let both_int = matches!(args[0], Value::Int(_) | Value::Uint(_))
        && matches!(args[1], Value::Int(_) | Value::Uint(_));
    if both_int {
        let exp = args[1].as_int()?;
        if exp >= 0 {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            return Ok(Value::Int(args[0].as_int()?.pow(exp as u32)));
        }
    }
    Ok(Value::Float(args[0].as_f64()?.powf(args[1].as_f64()?)))
}

fn popcount(args: &[Value]) -> ElabResult<Value> {
    expect_arity("popcount", args, 1)?;
    match &args[0] {
        Value::Bits(bits) => Ok(Value::Uint(bits.iter().filter(|&&b| b).count() as u64)),
        Value::Uint(v) => Ok(Value::Uint(u64::from(v.count_ones()))),
        other => {
            let v = other.as_int()?;
            #[allow(clippy::cast_sign_loss)]
            let bits = (v as u64).count_ones();
            Ok(Value::Uint(u64::from(bits)))
        }
    }
}

fn rotate(name: &str, args: &[Value], left: bool) -> ElabResult<Value> {
    expect_arity(name, args, 2)?;
    let Value::Bits(bits) = &args[0] else {
        return Err(ElaborationError::Type(format!(
            "{name} requires a sized bit operand, got {}",
            args[0].kind()
        )));
    };
    if bits.is_empty() {
        return Ok(Value::Bits(vec![]));
    }
    let distance = args[1].as_int()?.rem_euclid(bits.len() as i64) as usize;
    let mut rotated = bits.clone();
    if left {
        rotated.rotate_left(distance);
    } else {
        rotated.rotate_right(distance);
    }
    Ok(Value::Bits(rotated))
}

/// `sizeof(aggregate)` or `sizeof(aggregate, dim)`. The aggregate
/// argument is passed unflattened.
fn sizeof(args: &[Value]) -> ElabResult<Value> {
    if args.is_empty() || args.len() > 2 {
        return Err(ElaborationError::FunctionArgumentCount {
            function: "sizeof".into(),
            expected: 1,
            got: args.len(),
        });
    }

    let mut current = &args[0];
    let dim = if args.len() == 2 { args[1].as_int()? } else { 0 };
    for _ in 0..dim {
        match current {
            Value::Array(items) if !items.is_empty() => current = &items[0],
            _ => {
                return Err(ElaborationError::Type(format!(
                    "sizeof dimension {dim} exceeds array depth"
                )));
            }
        }
    }
    match current {
        Value::Array(items) => Ok(Value::Uint(items.len() as u64)),
        Value::Bits(bits) => Ok(Value::Uint(bits.len() as u64)),
        other => Err(ElaborationError::Type(format!(
            "sizeof requires an array, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_registry() {
        assert_eq!(builtin_gate("h"), Some(GateSpec { num_params: 0, num_qubits: 1 }));
        assert_eq!(builtin_gate("ms"), Some(GateSpec { num_params: 3, num_qubits: 2 }));
        assert_eq!(builtin_gate("ccnot"), Some(GateSpec { num_params: 0, num_qubits: 3 }));
        assert_eq!(builtin_gate("gphase"), Some(GateSpec { num_params: 1, num_qubits: 0 }));
        assert!(builtin_gate("nonsense").is_none());
    }

    #[test]
    fn test_noise_arity() {
        assert_eq!(noise_channel_arity("pauli_channel"), Some((3, 1)));
        assert_eq!(noise_channel_arity("two_qubit_dephasing"), Some((1, 2)));
        assert!(noise_channel_arity("kraus").is_none());
    }

    #[test]
    fn test_trig() {
        let v = builtin_function("cos", &[Value::Float(0.0)]).unwrap().unwrap();
        assert_eq!(v, Value::Float(1.0));
    }

    #[test]
    fn test_floor_ceiling() {
        assert_eq!(
            builtin_function("floor", &[Value::Float(1.7)]).unwrap().unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            builtin_function("ceiling", &[Value::Float(1.2)]).unwrap().unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn test_pow_int() {
        assert_eq!(
            builtin_function("pow", &[Value::Int(2), Value::Int(10)]).unwrap().unwrap(),
            Value::Int(1024)
        );
    }

    #[test]
    fn test_popcount() {
        assert_eq!(
            builtin_function("popcount", &[Value::Uint(0b1011)]).unwrap().unwrap(),
            Value::Uint(3)
        );
    }

    #[test]
    fn test_rotl() {
        let bits = Value::Bits(vec![true, false, false]);
        assert_eq!(
            builtin_function("rotl", &[bits, Value::Int(1)]).unwrap().unwrap(),
            Value::Bits(vec![false, false, true])
        );
    }

    #[test]
    fn test_sizeof() {
        let arr = Value::Array(vec![
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            Value::Array(vec![Value::Int(4), Value::Int(5), Value::Int(6)]),
        ]);
        assert_eq!(
            builtin_function("sizeof", &[arr.clone()]).unwrap().unwrap(),
            Value::Uint(2)
        );
        assert_eq!(
            builtin_function("sizeof", &[arr, Value::Int(1)]).unwrap().unwrap(),
            Value::Uint(3)
        );
    }

    #[test]
    fn test_unknown_builtin() {
        assert!(builtin_function("frobnicate", &[]).is_none());
    }
}
