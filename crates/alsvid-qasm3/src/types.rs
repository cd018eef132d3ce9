//! Sized classical types and value storage.
//!
//! Bit widths matter for slice semantics: indexing an `int[n]` or
//! `uint[n]` at position *i* reads the *i*-th most-significant bit,
//! while `bit[n]` registers and arrays index by element from 0.

use alsvid_ir::ParameterExpression;
use num_complex::Complex64;
use serde::Deserialize;

use crate::error::{ElabResult, ElaborationError};

/// Default bit width for `int` / `uint` with no explicit size.
pub const DEFAULT_INT_WIDTH: u32 = 32;
/// Default bit width for `float` / `angle` / `complex` components.
pub const DEFAULT_FLOAT_WIDTH: u32 = 64;

/// A fully-resolved classical type: every size is concrete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassicalType {
    /// `bit` (scalar) or `bit[n]`.
    Bit {
        /// Register width; `None` is a scalar bit.
        size: Option<u32>,
    },
    /// `int[n]`.
    Int {
        /// Bit width.
        size: u32,
    },
    /// `uint[n]`.
    Uint {
        /// Bit width.
        size: u32,
    },
    /// `float[n]`.
    Float {
        /// Bit width.
        size: u32,
    },
    /// `angle[n]`.
    Angle {
        /// Bit width.
        size: u32,
    },
    /// `complex[float[n]]`.
    Complex {
        /// Component bit width.
        size: u32,
    },
    /// `bool`.
    Bool,
    /// `array[T, d0, d1, …]`.
    Array {
        /// Element type.
        elem: Box<ClassicalType>,
        /// Dimension extents, outermost first.
        dims: Vec<u32>,
    },
}

impl ClassicalType {
    /// The default value for a fresh declaration: bit registers are
    /// zero-filled, arrays take their shape with uninitialized
    /// elements, everything else is the uninitialized sentinel.
    pub fn default_value(&self) -> Value {
        match self {
            ClassicalType::Bit { size: Some(n) } => Value::Bits(vec![false; *n as usize]),
            ClassicalType::Array { elem, dims } => {
                fn build(elem: &ClassicalType, dims: &[u32]) -> Value {
                    match dims.split_first() {
                        Some((first, rest)) => Value::Array(
                            (0..*first).map(|_| build(elem, rest)).collect(),
                        ),
                        None => elem.default_value(),
                    }
                }
                build(elem, dims)
            }
            _ => Value::Uninit,
        }
    }

    /// Declared bit width, when the type has one.
    pub fn width(&self) -> Option<u32> {
        match self {
            ClassicalType::Bit { size } => *size,
            ClassicalType::Int { size }
            | ClassicalType::Uint { size }
            | ClassicalType::Float { size }
            | ClassicalType::Angle { size }
            | ClassicalType::Complex { size } => Some(*size),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClassicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassicalType::Bit { size: None } => write!(f, "bit"),
            ClassicalType::Bit { size: Some(n) } => write!(f, "bit[{n}]"),
            ClassicalType::Int { size } => write!(f, "int[{size}]"),
            ClassicalType::Uint { size } => write!(f, "uint[{size}]"),
            ClassicalType::Float { size } => write!(f, "float[{size}]"),
            ClassicalType::Angle { size } => write!(f, "angle[{size}]"),
            ClassicalType::Complex { size } => write!(f, "complex[float[{size}]]"),
            ClassicalType::Bool => write!(f, "bool"),
            ClassicalType::Array { elem, dims } => {
                write!(f, "array[{elem}")?;
                for d in dims {
                    write!(f, ", {d}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// A runtime classical value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Signed integer (width tracked by the variable's type).
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Floating-point number (also used for `angle`).
    Float(f64),
    /// Complex number.
    Complex(Complex64),
    /// Boolean (also a scalar bit).
    Bool(bool),
    /// Packed bit vector, most-significant bit first.
    Bits(Vec<bool>),
    /// Nested row-major array.
    Array(Vec<Value>),
    /// A materialized range triple (inclusive stop). A `None` stop is
    /// resolved against the indexed variable's size.
    Range {
        /// First element.
        start: i64,
        /// Stride.
        step: i64,
        /// Last element (inclusive); `None` until resolved.
        stop: Option<i64>,
    },
    /// Qubit index list (identifier resolved via the qubit registry).
    Qubits(Vec<u32>),
    /// Symbolic value inside a gate definition.
    Param(ParameterExpression),
    /// Declared but not yet assigned.
    Uninit,
}

impl Value {
    /// Short kind name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Float(_) => "float",
            Value::Complex(_) => "complex",
            Value::Bool(_) => "bool",
            Value::Bits(_) => "bit[]",
            Value::Array(_) => "array",
            Value::Range { .. } => "range",
            Value::Qubits(_) => "qubit",
            Value::Param(_) => "free parameter",
            Value::Uninit => "uninitialized",
        }
    }

    /// Interpret as a signed integer.
    pub fn as_int(&self) -> ElabResult<i64> {
        match self {
            Value::Int(v) => Ok(*v),
            #[allow(clippy::cast_possible_wrap)]
            Value::Uint(v) => Ok(*v as i64),
            Value::Bool(b) => Ok(i64::from(*b)),
            Value::Float(v) if v.fract() == 0.0 => {
                #[allow(clippy::cast_possible_truncation)]
                let v = *v as i64;
                Ok(v)
            }
            Value::Bits(bits) => Ok(pack_bits(bits)),
            other => Err(ElaborationError::Type(format!(
                "expected an integer, got {}",
                other.kind()
            ))),
        }
    }

    /// Interpret as a float.
    pub fn as_f64(&self) -> ElabResult<f64> {
        match self {
            Value::Int(v) => {
                #[allow(clippy::cast_precision_loss)]
                let v = *v as f64;
                Ok(v)
            }
            Value::Uint(v) => {
                #[allow(clippy::cast_precision_loss)]
                let v = *v as f64;
                Ok(v)
            }
            Value::Float(v) => Ok(*v),
            Value::Bool(b) => Ok(f64::from(*b)),
            other => Err(ElaborationError::Type(format!(
                "expected a real number, got {}",
                other.kind()
            ))),
        }
    }

    /// Interpret as a complex number.
    pub fn as_complex(&self) -> ElabResult<Complex64> {
        match self {
            Value::Complex(c) => Ok(*c),
            other => Ok(Complex64::new(other.as_f64()?, 0.0)),
        }
    }

    /// Truthiness: a value is true when it is greater than zero; a
    /// bit vector is true when any bit is set.
    pub fn truthy(&self) -> ElabResult<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            Value::Int(v) => Ok(*v > 0),
            Value::Uint(v) => Ok(*v > 0),
            Value::Float(v) => Ok(*v > 0.0),
            Value::Bits(bits) => Ok(bits.iter().any(|&b| b)),
            other => Err(ElaborationError::Type(format!(
                "expected a condition, got {}",
                other.kind()
            ))),
        }
    }

    /// Interpret as a symbolic parameter expression. Concrete numbers
    /// become constants.
    pub fn as_param(&self) -> ElabResult<ParameterExpression> {
        match self {
            Value::Param(p) => Ok(p.clone()),
            other => Ok(ParameterExpression::constant(other.as_f64()?)),
        }
    }

    /// Materialize a range into its elements. The stop bound must be
    /// resolved.
    pub fn collect_range(&self) -> ElabResult<Vec<i64>> {
        match self {
            Value::Range {
                start,
                step,
                stop: Some(stop),
            } => {
                if *step == 0 {
                    return Err(ElaborationError::Type("range step cannot be zero".into()));
                }
                let mut items = Vec::new();
                let mut current = *start;
                while (*step > 0 && current <= *stop) || (*step < 0 && current >= *stop) {
                    items.push(current);
                    current += *step;
                }
                Ok(items)
            }
            Value::Range { stop: None, .. } => Err(ElaborationError::Type(
                "range stop cannot be inferred here".into(),
            )),
            other => Err(ElaborationError::Type(format!(
                "expected a range, got {}",
                other.kind()
            ))),
        }
    }

    /// Coerce into the given declared type.
    pub fn coerce_to(&self, ty: &ClassicalType) -> ElabResult<Value> {
        let mismatch = |ty: &ClassicalType, value: &Value| {
            Err(ElaborationError::Type(format!(
                "cannot store {} in {ty}",
                value.kind()
            )))
        };

        match ty {
            ClassicalType::Int { size } => {
                let v = self.as_int()?;
                Ok(Value::Int(truncate_signed(v, *size)))
            }
            ClassicalType::Uint { size } => {
                #[allow(clippy::cast_sign_loss)]
                let v = self.as_int()? as u64;
                Ok(Value::Uint(truncate_unsigned(v, *size)))
            }
            ClassicalType::Float { .. } | ClassicalType::Angle { .. } => {
                Ok(Value::Float(self.as_f64()?))
            }
            ClassicalType::Complex { .. } => Ok(Value::Complex(self.as_complex()?)),
            ClassicalType::Bool => Ok(Value::Bool(self.truthy()?)),
            ClassicalType::Bit { size: None } => match self {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Bits(bits) if bits.len() == 1 => Ok(Value::Bool(bits[0])),
                Value::Int(0 | 1) | Value::Uint(0 | 1) => Ok(Value::Bool(self.as_int()? == 1)),
                other => mismatch(ty, other),
            },
            ClassicalType::Bit { size: Some(n) } => {
                let n = *n as usize;
                match self {
                    Value::Bits(bits) if bits.len() == n => Ok(self.clone()),
                    Value::Int(_) | Value::Uint(_) => {
                        #[allow(clippy::cast_sign_loss)]
                        let v = self.as_int()? as u64;
                        Ok(Value::Bits(unpack_bits(v, n)))
                    }
                    // Scalar broadcast; covers the measurement
                    // placeholder landing in a bit register.
                    Value::Bool(b) => Ok(Value::Bits(vec![*b; n])),
                    other => mismatch(ty, other),
                }
            }
            ClassicalType::Array { elem, dims } => match self {
                Value::Array(items) => {
                    let Some((first, rest)) = dims.split_first() else {
                        return mismatch(ty, self);
                    };
                    if items.len() != *first as usize {
                        return Err(ElaborationError::Type(format!(
                            "array initializer has {} elements, expected {first}",
                            items.len()
                        )));
                    }
                    let inner = if rest.is_empty() {
                        (**elem).clone()
                    } else {
                        ClassicalType::Array {
                            elem: elem.clone(),
                            dims: rest.to_vec(),
                        }
                    };
                    let coerced: ElabResult<Vec<Value>> =
                        items.iter().map(|v| v.coerce_to(&inner)).collect();
                    Ok(Value::Array(coerced?))
                }
                other => mismatch(ty, other),
            },
        }
    }
}

/// Pack a most-significant-bit-first vector into an integer.
pub fn pack_bits(bits: &[bool]) -> i64 {
    bits.iter().fold(0_i64, |acc, &b| (acc << 1) | i64::from(b))
}

/// Unpack the low `n` bits of an integer, most significant first.
pub fn unpack_bits(value: u64, n: usize) -> Vec<bool> {
    (0..n).rev().map(|i| (value >> i) & 1 == 1).collect()
}

/// Keep the low `size` bits, sign-extended.
fn truncate_signed(value: i64, size: u32) -> i64 {
    if size >= 64 {
        return value;
    }
    let shift = 64 - size;
    (value << shift) >> shift
}

/// Keep the low `size` bits.
fn truncate_unsigned(value: u64, size: u32) -> u64 {
    if size >= 64 {
        return value;
    }
    value & ((1 << size) - 1)
}

/// A classical variable: declared type, storage, const flag.
#[derive(Debug, Clone)]
pub struct Variable {
    /// The resolved declared type.
    pub ty: ClassicalType,
    /// Current storage.
    pub value: Value,
    /// Whether further assignment is an error.
    pub is_const: bool,
}

impl Variable {
    /// Create a variable with the type's default storage.
    pub fn new(ty: ClassicalType) -> Self {
        let value = ty.default_value();
        Self {
            ty,
            value,
            is_const: false,
        }
    }
}

/// A caller-supplied input binding, deserializable from JSON-shaped
/// data. The declared `input` type dictates the final coercion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Float.
    Float(f64),
    /// Bitstring, e.g. `"0101"`.
    String(String),
    /// Array (possibly nested).
    Array(Vec<InputValue>),
}

impl InputValue {
    /// Convert the binding into a [`Value`] of the declared type.
    pub fn into_value(self, name: &str, ty: &ClassicalType) -> ElabResult<Value> {
        let coercion_error = |reason: String| ElaborationError::InputCoercion {
            name: name.to_string(),
            ty: ty.to_string(),
            reason,
        };

        let raw = match self {
            InputValue::Bool(b) => Value::Bool(b),
            InputValue::Int(v) => Value::Int(v),
            InputValue::Float(v) => Value::Float(v),
            InputValue::String(s) => {
                let bits: Option<Vec<bool>> = s
                    .chars()
                    .map(|c| match c {
                        '0' => Some(false),
                        '1' => Some(true),
                        _ => None,
                    })
                    .collect();
                Value::Bits(bits.ok_or_else(|| {
                    coercion_error(format!("'{s}' is not a bitstring"))
                })?)
            }
            InputValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| v.into_raw_value(name))
                    .collect::<ElabResult<_>>()?,
            ),
        };

        raw.coerce_to(ty)
            .map_err(|e| coercion_error(e.to_string()))
    }

    fn into_raw_value(self, name: &str) -> ElabResult<Value> {
        Ok(match self {
            InputValue::Bool(b) => Value::Bool(b),
            InputValue::Int(v) => Value::Int(v),
            InputValue::Float(v) => Value::Float(v),
            InputValue::String(s) => {
                let bits: Option<Vec<bool>> = s
                    .chars()
                    .map(|c| match c {
                        '0' => Some(false),
                        '1' => Some(true),
                        _ => None,
                    })
                    .collect();
                Value::Bits(bits.ok_or_else(|| ElaborationError::InputCoercion {
                    name: name.to_string(),
                    ty: "bit[]".into(),
                    reason: format!("'{s}' is not a bitstring"),
                })?)
            }
            InputValue::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|v| v.into_raw_value(name))
                    .collect::<ElabResult<_>>()?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let bits = ClassicalType::Bit { size: Some(4) }.default_value();
        assert_eq!(bits, Value::Bits(vec![false; 4]));

        assert_eq!(ClassicalType::Int { size: 8 }.default_value(), Value::Uninit);

        let arr = ClassicalType::Array {
            elem: Box::new(ClassicalType::Int { size: 8 }),
            dims: vec![2, 3],
        }
        .default_value();
        match arr {
            Value::Array(rows) => {
                assert_eq!(rows.len(), 2);
                assert!(matches!(&rows[0], Value::Array(cols) if cols.len() == 3));
            }
            other => panic!("expected Array, got {other:?}"),
        }
    }

    #[test]
    fn test_truncation() {
        let v = Value::Int(300).coerce_to(&ClassicalType::Int { size: 8 }).unwrap();
        assert_eq!(v, Value::Int(44));

        let v = Value::Int(-1).coerce_to(&ClassicalType::Uint { size: 4 }).unwrap();
        assert_eq!(v, Value::Uint(15));
    }

    #[test]
    fn test_bit_packing() {
        assert_eq!(pack_bits(&[true, false, true]), 5);
        assert_eq!(unpack_bits(5, 4), vec![false, true, false, true]);

        let v = Value::Uint(6)
            .coerce_to(&ClassicalType::Bit { size: Some(3) })
            .unwrap();
        assert_eq!(v, Value::Bits(vec![true, true, false]));
    }

    #[test]
    fn test_bool_cast_semantics() {
        assert_eq!(Value::Int(3).coerce_to(&ClassicalType::Bool).unwrap(), Value::Bool(true));
        assert_eq!(Value::Int(0).coerce_to(&ClassicalType::Bool).unwrap(), Value::Bool(false));
        assert_eq!(
            Value::Int(-2).coerce_to(&ClassicalType::Bool).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_range_collect() {
        let r = Value::Range {
            start: 0,
            step: 2,
            stop: Some(6),
        };
        assert_eq!(r.collect_range().unwrap(), vec![0, 2, 4, 6]);

        let down = Value::Range {
            start: 3,
            step: -1,
            stop: Some(1),
        };
        assert_eq!(down.collect_range().unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn test_input_bitstring() {
        let v = InputValue::String("0101".into())
            .into_value("x", &ClassicalType::Bit { size: Some(4) })
            .unwrap();
        assert_eq!(
            v,
            Value::Bits(vec![false, true, false, true])
        );
    }

    #[test]
    fn test_input_narrowing() {
        let v = InputValue::Int(7)
            .into_value("a_in", &ClassicalType::Uint { size: 4 })
            .unwrap();
        assert_eq!(v, Value::Uint(7));
    }

    #[test]
    fn test_input_mismatch_names_reason() {
        let err = InputValue::String("abc".into())
            .into_value("n", &ClassicalType::Bit { size: Some(3) })
            .unwrap_err();
        assert!(err.to_string().contains('n'));
    }
}
