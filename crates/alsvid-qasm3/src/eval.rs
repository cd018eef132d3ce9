//! Expression evaluation.
//!
//! Dispatch on the expression node against the elaborator's scope
//! stack. Evaluation is pure except for the three documented side
//! effects: hardware qubits grow the qubit counter, `measure` records
//! its targets, and user function calls may emit instructions.
//!
//! Inside gate definitions, values built from free parameters stay
//! symbolic: arithmetic over [`Value::Param`] produces
//! `ParameterExpression` trees that call sites later bind.

use alsvid_ir::ParameterExpression;
use num_complex::Complex64;

use crate::ast::{BinaryOp, Expression, UnaryOp};
use crate::builtins::builtin_function;
use crate::error::{ElabResult, ElaborationError};
use crate::types::{ClassicalType, Value};
use crate::visitor::Elaborator;

impl Elaborator {
    /// Evaluate an expression to a value.
    pub(crate) fn eval(&mut self, expr: &Expression) -> ElabResult<Value> {
        match expr {
            Expression::IntLiteral(v) => Ok(Value::Int(*v)),
            Expression::FloatLiteral(v) => Ok(Value::Float(*v)),
            Expression::ImaginaryLiteral(v) => Ok(Value::Complex(Complex64::new(0.0, *v))),
            Expression::BoolLiteral(b) => Ok(Value::Bool(*b)),
            Expression::BitstringLiteral(bits) => Ok(Value::Bits(bits.clone())),
            Expression::StringLiteral(s) => Err(ElaborationError::Type(format!(
                "string literal \"{s}\" is not a value"
            ))),
            Expression::Irrational(c) => Ok(Value::Float(c.value())),
            Expression::Identifier(name) => self.eval_identifier(name),
            Expression::HardwareQubit(n) => {
                self.touch_hardware_qubit(*n);
                Ok(Value::Qubits(vec![*n]))
            }
            Expression::Index { target, indices } => self.eval_index(target, indices),
            Expression::Range { start, step, stop } => {
                let start = match start {
                    Some(e) => self.eval(e)?.as_int()?,
                    None => 0,
                };
                let step = match step {
                    Some(e) => self.eval(e)?.as_int()?,
                    None => 1,
                };
                let stop = match stop {
                    Some(e) => Some(self.eval(e)?.as_int()?),
                    None => None,
                };
                Ok(Value::Range { start, step, stop })
            }
            Expression::ArrayLiteral(elements) => {
                let values: ElabResult<Vec<Value>> =
                    elements.iter().map(|e| self.eval(e)).collect();
                Ok(Value::Array(values?))
            }
            Expression::Unary { op, operand } => {
                let value = self.eval(operand)?;
                apply_unary(*op, &value)
            }
            Expression::Binary { op, lhs, rhs } => {
                let left = self.eval(lhs)?;
                // Short-circuit logical operators.
                match op {
                    BinaryOp::And if !left.truthy()? => return Ok(Value::Bool(false)),
                    BinaryOp::Or if left.truthy()? => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let right = self.eval(rhs)?;
                apply_binary(*op, &left, &right)
            }
            Expression::Cast { ty, operand } => {
                let value = self.eval(operand)?;
                let ty = self.resolve_type(ty)?;
                value.coerce_to(&ty)
            }
            Expression::Call { name, args } => self.eval_call(name, args),
            Expression::Measure(target) => {
                let qubits = self.resolve_qubit_targets(target)?;
                for q in qubits {
                    self.record_measurement(q);
                }
                // Measurement outcomes do not feed back into classical
                // state; the evaluator yields a placeholder.
                Ok(Value::Bool(false))
            }
        }
    }

    /// Evaluate an identifier: classical scope first, then the qubit
    /// registry.
    fn eval_identifier(&mut self, name: &str) -> ElabResult<Value> {
        if let Some(var) = self.lookup(name) {
            return match &var.value {
                Value::Uninit => Err(ElaborationError::Uninitialized(name.to_string())),
                value => Ok(value.clone()),
            };
        }
        if let Some(indices) = self.qubit_indices(name) {
            return Ok(Value::Qubits(indices));
        }
        Err(ElaborationError::UndefinedVariable(name.to_string()))
    }

    /// Evaluate a call: builtin functions first, then user functions.
    fn eval_call(&mut self, name: &str, args: &[Expression]) -> ElabResult<Value> {
        let values: ElabResult<Vec<Value>> = args.iter().map(|a| self.eval(a)).collect();
        let values = values?;

        if values.iter().any(|v| matches!(v, Value::Param(_))) {
            return Err(ElaborationError::Type(format!(
                "cannot call '{name}' with symbolic arguments"
            )));
        }
        if let Some(result) = builtin_function(name, &values) {
            return result;
        }
        self.call_function(name, args, values)
    }

    /// Evaluate an index expression.
    fn eval_index(&mut self, target: &Expression, indices: &[Expression]) -> ElabResult<Value> {
        if let Expression::Identifier(name) = target {
            // Qubit registers index into their resolved id lists.
            if self.lookup(name).is_none() {
                if let Some(ids) = self.qubit_indices(name) {
                    let index = self.eval_single_index(indices, name)?;
                    let picked = select_indices(&ids, &index, name)?;
                    return Ok(Value::Qubits(picked));
                }
            }

            let var = self
                .lookup(name)
                .ok_or_else(|| ElaborationError::UndefinedVariable(name.to_string()))?;
            let ty = var.ty.clone();
            let value = var.value.clone();

            // Sized integers slice by most-significant-bit offset.
            if let ClassicalType::Int { size } | ClassicalType::Uint { size } = ty {
                let index = self.eval_single_index(indices, name)?;
                return extract_int_bits(&value, size, &index, name);
            }

            let index_values: ElabResult<Vec<Value>> =
                indices.iter().map(|e| self.eval(e)).collect();
            return index_value(&value, &index_values?, name);
        }

        let value = self.eval(target)?;
        let index_values: ElabResult<Vec<Value>> = indices.iter().map(|e| self.eval(e)).collect();
        index_value(&value, &index_values?, "expression")
    }

    /// Evaluate an index group that must contain exactly one item.
    fn eval_single_index(&mut self, indices: &[Expression], name: &str) -> ElabResult<Value> {
        if indices.len() != 1 {
            return Err(ElaborationError::Type(format!(
                "'{name}' takes a single index, got {}",
                indices.len()
            )));
        }
        self.eval(&indices[0])
    }
}

/// Select elements of a qubit id list by index value.
fn select_indices(ids: &[u32], index: &Value, name: &str) -> ElabResult<Vec<u32>> {
    let positions = index_positions(index, ids.len(), name)?;
    Ok(positions.into_iter().map(|p| ids[p]).collect())
}

/// Normalize an index value into concrete element positions for a
/// container of the given length. A range's missing stop resolves to
/// `len - 1`.
pub(crate) fn index_positions(index: &Value, len: usize, name: &str) -> ElabResult<Vec<usize>> {
    let check = |i: i64| -> ElabResult<usize> {
        let in_range = usize::try_from(i).ok().filter(|&p| p < len);
        in_range.ok_or_else(|| ElaborationError::IndexOutOfRange {
            name: name.to_string(),
            index: i,
            size: len,
        })
    };

    match index {
        Value::Range { start, step, stop } => {
            #[allow(clippy::cast_possible_wrap)]
            let resolved = Value::Range {
                start: *start,
                step: *step,
                stop: Some(stop.unwrap_or(len as i64 - 1)),
            };
            resolved.collect_range()?.into_iter().map(check).collect()
        }
        Value::Array(items) => items.iter().map(|v| check(v.as_int()?)).collect(),
        scalar => Ok(vec![check(scalar.as_int()?)?]),
    }
}

/// Whether an index value selects a single element (a slice index
/// keeps the container shape instead).
pub(crate) fn is_scalar_index(index: &Value) -> bool {
    !matches!(index, Value::Range { .. } | Value::Array(_))
}

/// Bit-extract from a sized integer: position 0 is the most
/// significant bit of the declared width.
fn extract_int_bits(value: &Value, size: u32, index: &Value, name: &str) -> ElabResult<Value> {
    let v = value.as_int()?;
    let positions = index_positions(index, size as usize, name)?;
    let bit_at = |p: usize| (v >> (size as usize - 1 - p)) & 1 == 1;

    if is_scalar_index(index) {
        Ok(Value::Bool(bit_at(positions[0])))
    } else {
        Ok(Value::Bits(positions.into_iter().map(bit_at).collect()))
    }
}

/// Index into a bit vector or array value, applying the remaining
/// index items to nested elements.
fn index_value(value: &Value, indices: &[Value], name: &str) -> ElabResult<Value> {
    let Some((index, rest)) = indices.split_first() else {
        return Ok(value.clone());
    };

    match value {
        Value::Bits(bits) => {
            if !rest.is_empty() {
                return Err(ElaborationError::Type(format!(
                    "too many indices for '{name}'"
                )));
            }
            let positions = index_positions(index, bits.len(), name)?;
            if is_scalar_index(index) {
                Ok(Value::Bool(bits[positions[0]]))
            } else {
                Ok(Value::Bits(positions.into_iter().map(|p| bits[p]).collect()))
            }
        }
        Value::Array(items) => {
            let positions = index_positions(index, items.len(), name)?;
            if is_scalar_index(index) {
                index_value(&items[positions[0]], rest, name)
            } else {
                let selected: ElabResult<Vec<Value>> = positions
                    .into_iter()
                    .map(|p| index_value(&items[p], rest, name))
                    .collect();
                Ok(Value::Array(selected?))
            }
        }
        other => Err(ElaborationError::Type(format!(
            "cannot index into {} '{name}'",
            other.kind()
        ))),
    }
}

/// Apply a unary operator.
pub(crate) fn apply_unary(op: UnaryOp, value: &Value) -> ElabResult<Value> {
    if let Value::Param(p) = value {
        return match op {
            UnaryOp::Neg => Ok(Value::Param(-p.clone())),
            _ => Err(ElaborationError::Type(
                "only negation applies to free parameters".into(),
            )),
        };
    }

    match op {
        UnaryOp::Neg => match value {
            Value::Int(v) => Ok(Value::Int(-v)),
            Value::Uint(_) => Ok(Value::Int(-value.as_int()?)),
            Value::Float(v) => Ok(Value::Float(-v)),
            Value::Complex(c) => Ok(Value::Complex(-c)),
            other => Err(type_error("-", other)),
        },
        UnaryOp::Not => match value {
            // `!` on a bit vector asks whether no bit is set.
            Value::Bits(bits) => Ok(Value::Bool(!bits.iter().any(|&b| b))),
            other => Ok(Value::Bool(!other.truthy()?)),
        },
        UnaryOp::BitNot => match value {
            Value::Int(v) => Ok(Value::Int(!v)),
            Value::Uint(v) => Ok(Value::Uint(!v)),
            Value::Bits(bits) => Ok(Value::Bits(bits.iter().map(|b| !b).collect())),
            other => Err(type_error("~", other)),
        },
    }
}

/// Apply a binary operator with numeric promotion.
pub(crate) fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> ElabResult<Value> {
    // Symbolic propagation inside gate definitions.
    if matches!(left, Value::Param(_)) || matches!(right, Value::Param(_)) {
        return apply_symbolic(op, left, right);
    }

    // Element-wise bit-vector operators.
    if let (Value::Bits(a), Value::Bits(b)) = (left, right) {
        match op {
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                if a.len() != b.len() {
                    return Err(ElaborationError::Type(format!(
                        "bit vector length mismatch: {} vs {}",
                        a.len(),
                        b.len()
                    )));
                }
                let combined = a
                    .iter()
                    .zip(b.iter())
                    .map(|(&x, &y)| match op {
                        BinaryOp::BitAnd => x && y,
                        BinaryOp::BitOr => x || y,
                        _ => x != y,
                    })
                    .collect();
                return Ok(Value::Bits(combined));
            }
            BinaryOp::Eq => return Ok(Value::Bool(a == b)),
            BinaryOp::NotEq => return Ok(Value::Bool(a != b)),
            _ => {}
        }
    }

    // Shifting a bit vector moves its bits.
    if let Value::Bits(bits) = left {
        if matches!(op, BinaryOp::LShift | BinaryOp::RShift) {
            let distance = right.as_int()?.max(0).min(bits.len() as i64);
            #[allow(clippy::cast_sign_loss)]
            let distance = distance as usize;
            let mut shifted = vec![false; bits.len()];
            match op {
                BinaryOp::LShift => {
                    shifted[..bits.len() - distance].copy_from_slice(&bits[distance..]);
                }
                _ => {
                    shifted[distance..].copy_from_slice(&bits[..bits.len() - distance]);
                }
            }
            return Ok(Value::Bits(shifted));
        }
    }

    match op {
        BinaryOp::And => Ok(Value::Bool(left.truthy()? && right.truthy()?)),
        BinaryOp::Or => Ok(Value::Bool(left.truthy()? || right.truthy()?)),

        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt
        | BinaryOp::GtEq => compare(op, left, right),

        BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::LShift
        | BinaryOp::RShift => integer_bitop(op, left, right),

        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        | BinaryOp::Pow => arithmetic(op, left, right),
    }
}

/// Build a symbolic parameter expression from an operator over at
/// least one free-parameter operand.
fn apply_symbolic(op: BinaryOp, left: &Value, right: &Value) -> ElabResult<Value> {
    let l = left.as_param()?;
    let r = right.as_param()?;
    let combined = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => l / r,
        BinaryOp::Pow => l.pow_expr(r),
        other => {
            return Err(ElaborationError::Type(format!(
                "operator {other:?} cannot apply to free parameters"
            )));
        }
    };
    Ok(Value::Param(combined))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> ElabResult<Value> {
    if matches!(left, Value::Complex(_)) || matches!(right, Value::Complex(_)) {
        let (a, b) = (left.as_complex()?, right.as_complex()?);
        return match op {
            BinaryOp::Eq => Ok(Value::Bool(a == b)),
            BinaryOp::NotEq => Ok(Value::Bool(a != b)),
            other => Err(ElaborationError::Type(format!(
                "cannot order complex values with {other:?}"
            ))),
        };
    }

    let (a, b) = (left.as_f64()?, right.as_f64()?);
    let result = match op {
        BinaryOp::Eq => a == b,
        BinaryOp::NotEq => a != b,
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        _ => a >= b,
    };
    Ok(Value::Bool(result))
}

fn integer_bitop(op: BinaryOp, left: &Value, right: &Value) -> ElabResult<Value> {
    let (a, b) = (left.as_int()?, right.as_int()?);
    let distance = u32::try_from(b).unwrap_or(u32::MAX);
    let result = match op {
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        // Over-wide shifts saturate instead of wrapping.
        BinaryOp::LShift => a.checked_shl(distance).unwrap_or(0),
        _ => a
            .checked_shr(distance)
            .unwrap_or(if a < 0 { -1 } else { 0 }),
    };
    Ok(Value::Int(result))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> ElabResult<Value> {
    // Complex contaminates.
    if matches!(left, Value::Complex(_)) || matches!(right, Value::Complex(_)) {
        let (a, b) = (left.as_complex()?, right.as_complex()?);
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => {
                if b == Complex64::new(0.0, 0.0) {
                    return Err(ElaborationError::DivisionByZero);
                }
                a / b
            }
            BinaryOp::Pow => a.powc(b),
            BinaryOp::Mod => {
                return Err(ElaborationError::Type("'%' is not defined for complex".into()));
            }
            _ => unreachable!("arithmetic called with non-arithmetic operator"),
        };
        return Ok(Value::Complex(result));
    }

    let integral = matches!(left, Value::Int(_) | Value::Uint(_) | Value::Bool(_))
        && matches!(right, Value::Int(_) | Value::Uint(_) | Value::Bool(_));

    if integral {
        let (a, b) = (left.as_int()?, right.as_int()?);
        return match op {
            BinaryOp::Add => Ok(Value::Int(a + b)),
            BinaryOp::Sub => Ok(Value::Int(a - b)),
            BinaryOp::Mul => Ok(Value::Int(a * b)),
            // Integer division promotes to float so that expressions
            // like pow(1/2) keep their fractional value.
            BinaryOp::Div => {
                if b == 0 {
                    return Err(ElaborationError::DivisionByZero);
                }
                #[allow(clippy::cast_precision_loss)]
                let quotient = a as f64 / b as f64;
                Ok(Value::Float(quotient))
            }
            BinaryOp::Mod => {
                if b == 0 {
                    return Err(ElaborationError::DivisionByZero);
                }
                Ok(Value::Int(a % b))
            }
            BinaryOp::Pow => {
                if b >= 0 {
                    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                    let exp = b as u32;
                    Ok(Value::Int(a.pow(exp)))
                } else {
                    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                    let result = (a as f64).powi(b as i32);
                    Ok(Value::Float(result))
                }
            }
            _ => unreachable!("arithmetic called with non-arithmetic operator"),
        };
    }

    let (a, b) = (left.as_f64()?, right.as_f64()?);
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(ElaborationError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Mod => a % b,
        BinaryOp::Pow => a.powf(b),
        _ => unreachable!("arithmetic called with non-arithmetic operator"),
    };
    Ok(Value::Float(result))
}

fn type_error(op: &str, value: &Value) -> ElaborationError {
    ElaborationError::Type(format!("'{op}' is not defined for {}", value.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_division_promotes() {
        let v = apply_binary(BinaryOp::Div, &Value::Int(1), &Value::Int(2)).unwrap();
        assert_eq!(v, Value::Float(0.5));
    }

    #[test]
    fn test_bitvec_elementwise() {
        let a = Value::Bits(vec![true, true, false]);
        let b = Value::Bits(vec![true, false, false]);
        assert_eq!(
            apply_binary(BinaryOp::BitXor, &a, &b).unwrap(),
            Value::Bits(vec![false, true, false])
        );
    }

    #[test]
    fn test_not_on_bits_means_none_set() {
        assert_eq!(
            apply_unary(UnaryOp::Not, &Value::Bits(vec![false, false])).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            apply_unary(UnaryOp::Not, &Value::Bits(vec![false, true])).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_symbolic_propagation() {
        let theta = Value::Param(ParameterExpression::symbol("theta"));
        let v = apply_binary(BinaryOp::Div, &theta, &Value::Int(2)).unwrap();
        match v {
            Value::Param(p) => {
                let bound = p.bind("theta", 3.0);
                assert_eq!(bound.as_f64(), Some(1.5));
            }
            other => panic!("expected Param, got {other:?}"),
        }
    }

    #[test]
    fn test_complex_arithmetic() {
        let a = Value::Float(1.0);
        let b = Value::Complex(Complex64::new(0.0, 2.0));
        let v = apply_binary(BinaryOp::Add, &a, &b).unwrap();
        assert_eq!(v, Value::Complex(Complex64::new(1.0, 2.0)));
    }

    #[test]
    fn test_comparison_chain_types() {
        assert_eq!(
            apply_binary(BinaryOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_division_by_zero() {
        assert!(matches!(
            apply_binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)),
            Err(ElaborationError::DivisionByZero)
        ));
    }

    #[test]
    fn test_index_positions_open_range() {
        let range = Value::Range {
            start: 1,
            step: 1,
            stop: None,
        };
        assert_eq!(index_positions(&range, 4, "q").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_extract_int_bits_msb_first() {
        // 0b1010 as int[4]: position 0 is the MSB (1).
        let v = Value::Int(0b1010);
        assert_eq!(
            extract_int_bits(&v, 4, &Value::Int(0), "x").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            extract_int_bits(&v, 4, &Value::Int(3), "x").unwrap(),
            Value::Bool(false)
        );
    }
}
