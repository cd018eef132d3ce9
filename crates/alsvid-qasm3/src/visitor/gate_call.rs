//! The gate-call engine: argument binding, modifier lowering, target
//! broadcasting, and emission.
//!
//! A gate body is a template of parametric instructions whose targets
//! are *positions* into the call's target list and whose parameters
//! may be free. A call site resolves its target positions to concrete
//! qubit lists, binds arguments by name, lowers the modifier chain
//! innermost-first, broadcasts over register-valued targets, and
//! appends the resulting copies in order.

use alsvid_ir::{GateOp, NoiseChannel, Operator, ParameterExpression, UnitaryOp};
use tracing::debug;

use crate::ast::{Expression, GateModifier};
use crate::builtins::builtin_gate;
use crate::error::{ElabResult, ElaborationError};
use crate::types::Value;
use crate::visitor::Elaborator;

/// A parametric instruction: an operator whose parameters may be
/// symbolic, over template-local qubit targets.
#[derive(Debug, Clone)]
pub(crate) struct Emitted {
    /// The operator.
    pub op: TemplateOperator,
    /// Target qubits. Inside templates these are positions into the
    /// call's target list; after broadcasting they are concrete
    /// indices.
    pub targets: Vec<u32>,
}

/// Operator forms that can appear in a parametric instruction.
#[derive(Debug, Clone)]
pub(crate) enum TemplateOperator {
    /// A named gate.
    Gate {
        /// Gate name.
        name: String,
        /// Parameters, possibly symbolic.
        params: Vec<ParameterExpression>,
        /// Accumulated algebraic exponent.
        exponent: f64,
        /// Control bits, outermost first; controls occupy the leading
        /// targets.
        ctrl_pattern: Vec<u8>,
    },
    /// A global phase. Uncontrolled, it targets every allocated qubit
    /// at emission; controlled, the control qubits are its only
    /// targets.
    GPhase {
        /// The phase angle, possibly symbolic.
        angle: ParameterExpression,
        /// Accumulated algebraic exponent.
        exponent: f64,
        /// Control bits, outermost first.
        ctrl_pattern: Vec<u8>,
    },
    /// An explicit unitary (pragma-emitted; never inside templates).
    Unitary(UnitaryOp),
    /// A noise channel (pragma-emitted; never inside templates).
    Noise(NoiseChannel),
}

impl TemplateOperator {
    /// Multiply the algebraic exponent (the `pow` modifier).
    fn scale_exponent(&mut self, factor: f64) -> ElabResult<()> {
        match self {
            TemplateOperator::Gate { exponent, .. }
            | TemplateOperator::GPhase { exponent, .. } => {
                *exponent *= factor;
                Ok(())
            }
            TemplateOperator::Unitary(_) | TemplateOperator::Noise(_) => {
                Err(ElaborationError::Unsupported(
                    "'pow' modifier on a non-gate operator".into(),
                ))
            }
        }
    }

    /// Negate the exponent (the `inv` modifier).
    fn invert(&mut self) -> ElabResult<()> {
        self.scale_exponent(-1.0)
    }

    /// Prepend one control layer.
    fn add_control(&mut self, bit: u8) -> ElabResult<()> {
        match self {
            TemplateOperator::Gate { ctrl_pattern, .. }
            | TemplateOperator::GPhase { ctrl_pattern, .. } => {
                ctrl_pattern.insert(0, bit);
                Ok(())
            }
            TemplateOperator::Unitary(_) | TemplateOperator::Noise(_) => {
                Err(ElaborationError::Unsupported(
                    "control modifier on a non-gate operator".into(),
                ))
            }
        }
    }

    /// Bind a free parameter by name.
    fn subst(&mut self, name: &str, replacement: &ParameterExpression) {
        match self {
            TemplateOperator::Gate { params, .. } => {
                for p in params.iter_mut() {
                    *p = p.subst(name, replacement);
                }
            }
            TemplateOperator::GPhase { angle, .. } => {
                *angle = angle.subst(name, replacement);
            }
            TemplateOperator::Unitary(_) | TemplateOperator::Noise(_) => {}
        }
    }

    /// Resolve into an IR operator. Fails if any parameter is still
    /// symbolic.
    pub(crate) fn into_operator(self) -> ElabResult<Operator> {
        let resolve = |p: &ParameterExpression| -> ElabResult<f64> {
            p.as_f64().ok_or_else(|| {
                ElaborationError::Type(format!("unresolved free parameter in '{p}'"))
            })
        };

        match self {
            TemplateOperator::Gate {
                name,
                params,
                exponent,
                ctrl_pattern,
            } => {
                let params: ElabResult<Vec<f64>> = params.iter().map(resolve).collect();
                let base = Operator::Gate(GateOp {
                    name,
                    params: params?,
                    exponent,
                });
                Ok(wrap_controls(base, ctrl_pattern))
            }
            TemplateOperator::GPhase {
                angle,
                exponent,
                ctrl_pattern,
            } => {
                let base = Operator::Gate(GateOp {
                    name: "gphase".into(),
                    params: vec![resolve(&angle)?],
                    exponent,
                });
                Ok(wrap_controls(base, ctrl_pattern))
            }
            TemplateOperator::Unitary(u) => Ok(Operator::Unitary(u)),
            TemplateOperator::Noise(channel) => Ok(Operator::Noise(channel)),
        }
    }
}

fn wrap_controls(base: Operator, pattern: Vec<u8>) -> Operator {
    if pattern.is_empty() {
        base
    } else {
        Operator::Controlled {
            inner: Box::new(base),
            pattern,
        }
    }
}

/// A registered gate definition: a template body over positions
/// `0..num_qubits` with free parameters named by `params`.
#[derive(Debug, Clone)]
pub(crate) struct GateDefinition {
    /// Free parameter names.
    pub params: Vec<String>,
    /// Number of qubit parameters.
    pub num_qubits: usize,
    /// The pre-elaborated body.
    pub body: Vec<Emitted>,
}

/// One lowering step derived from the modifier chain.
enum Lowering {
    Pow(f64),
    Inv,
    Ctrl(u8),
}

impl Elaborator {
    /// Elaborate a gate call.
    pub(crate) fn handle_gate_call(
        &mut self,
        modifiers: &[GateModifier],
        name: &str,
        params: &[Expression],
        qubits: &[Expression],
    ) -> ElabResult<()> {
        let lowerings = self.lower_modifiers(modifiers)?;
        let num_controls = lowerings
            .iter()
            .filter(|l| matches!(l, Lowering::Ctrl(_)))
            .count();

        // Resolve each target position to its concrete qubit list.
        let mut positions: Vec<Vec<u32>> = Vec::with_capacity(qubits.len());
        for q in qubits {
            positions.push(self.resolve_qubit_targets(q)?);
        }

        // Bind the template.
        let (mut body, num_qubits) = self.bind_template(name, params, num_controls)?;

        // gphase ignores written targets: it applies to every
        // allocated qubit unless controls narrow it.
        if name == "gphase" && num_controls == 0 {
            positions.clear();
        }

        if positions.len() != num_controls + num_qubits {
            return Err(ElaborationError::GateQubitCount {
                gate: name.to_string(),
                expected: num_controls + num_qubits,
                got: positions.len(),
            });
        }

        // Apply modifiers innermost-first. Control layers consume the
        // leading target positions from the inside out, so the chain
        // `ctrl @ negctrl @ g c1, c2, t` gives c1 the outermost bit.
        let mut next_ctrl = num_controls;
        for lowering in lowerings.iter().rev() {
            match lowering {
                Lowering::Pow(x) => {
                    for e in &mut body {
                        e.op.scale_exponent(*x)?;
                    }
                }
                Lowering::Inv => {
                    for e in &mut body {
                        e.op.invert()?;
                    }
                    body.reverse();
                }
                Lowering::Ctrl(bit) => {
                    next_ctrl -= 1;
                    for e in &mut body {
                        e.op.add_control(*bit)?;
                        #[allow(clippy::cast_possible_truncation)]
                        e.targets.insert(0, next_ctrl as u32);
                    }
                }
            }
        }

        // Broadcast over register-valued targets.
        let copies = self.broadcast_width(name, &positions)?;
        debug!(gate = name, copies, instructions = body.len(), "expanding gate call");
        for copy in 0..copies {
            for e in &body {
                let targets = e
                    .targets
                    .iter()
                    .map(|&p| {
                        let list = &positions[p as usize];
                        if list.len() == 1 { list[0] } else { list[copy] }
                    })
                    .collect();
                self.push_emitted(Emitted {
                    op: e.op.clone(),
                    targets,
                })?;
            }
        }
        Ok(())
    }

    /// Evaluate a modifier chain into lowering steps, expanding
    /// counted controls into single layers.
    fn lower_modifiers(&mut self, modifiers: &[GateModifier]) -> ElabResult<Vec<Lowering>> {
        let mut lowerings = Vec::new();
        for modifier in modifiers {
            match modifier {
                GateModifier::Inv => lowerings.push(Lowering::Inv),
                GateModifier::Pow(expr) => {
                    let value = self.eval(expr)?;
                    let exponent = value.as_f64().map_err(|_| {
                        ElaborationError::InvalidModifierArgument {
                            modifier: "pow",
                            requirement: "a numeric exponent",
                            got: value.kind().to_string(),
                        }
                    })?;
                    lowerings.push(Lowering::Pow(exponent));
                }
                GateModifier::Ctrl(count) | GateModifier::NegCtrl(count) => {
                    let bit = u8::from(matches!(modifier, GateModifier::Ctrl(_)));
                    let n = match count {
                        Some(expr) => {
                            let value = self.eval(expr)?;
                            match value {
                                Value::Int(n) if n > 0 => n,
                                Value::Uint(n) if n > 0 => i64::try_from(n).unwrap_or(i64::MAX),
                                other => {
                                    return Err(ElaborationError::InvalidModifierArgument {
                                        modifier: if bit == 1 { "ctrl" } else { "negctrl" },
                                        requirement: "a positive integer count",
                                        got: format!("{other:?}"),
                                    });
                                }
                            }
                        }
                        None => 1,
                    };
                    for _ in 0..n {
                        lowerings.push(Lowering::Ctrl(bit));
                    }
                }
            }
        }
        Ok(lowerings)
    }

    /// Look up the called gate and bind its classical arguments,
    /// producing a body whose targets are positions offset past the
    /// control qubits. Returns the body and the template's qubit
    /// parameter count.
    fn bind_template(
        &mut self,
        name: &str,
        params: &[Expression],
        num_controls: usize,
    ) -> ElabResult<(Vec<Emitted>, usize)> {
        let check_params = |expected: usize| -> ElabResult<()> {
            if params.len() == expected {
                Ok(())
            } else {
                Err(ElaborationError::GateParameterCount {
                    gate: name.to_string(),
                    expected,
                    got: params.len(),
                })
            }
        };

        if name == "gphase" {
            check_params(1)?;
            let angle = self.eval(&params[0])?.as_param()?;
            return Ok((
                vec![Emitted {
                    op: TemplateOperator::GPhase {
                        angle,
                        exponent: 1.0,
                        ctrl_pattern: vec![],
                    },
                    targets: vec![],
                }],
                0,
            ));
        }

        if let Some(def) = self.gate_definition(name) {
            check_params(def.params.len())?;
            let mut args = Vec::with_capacity(params.len());
            for p in params {
                args.push(self.eval(p)?.as_param()?);
            }

            let mut body = def.body;
            for e in &mut body {
                for (param_name, arg) in def.params.iter().zip(args.iter()) {
                    e.op.subst(param_name, arg);
                }
                for t in &mut e.targets {
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        *t += num_controls as u32;
                    }
                }
            }
            return Ok((body, def.num_qubits));
        }

        if let Some(spec) = builtin_gate(name) {
            check_params(spec.num_params)?;
            let mut args = Vec::with_capacity(params.len());
            for p in params {
                args.push(self.eval(p)?.as_param()?);
            }
            #[allow(clippy::cast_possible_truncation)]
            let targets = (0..spec.num_qubits)
                .map(|j| (num_controls + j) as u32)
                .collect();
            return Ok((
                vec![Emitted {
                    op: TemplateOperator::Gate {
                        name: name.to_string(),
                        params: args,
                        exponent: 1.0,
                        ctrl_pattern: vec![],
                    },
                    targets,
                }],
                spec.num_qubits,
            ));
        }

        Err(ElaborationError::UnknownGate(name.to_string()))
    }

    /// Compute the broadcast width and check non-unit lengths agree.
    fn broadcast_width(&self, name: &str, positions: &[Vec<u32>]) -> ElabResult<usize> {
        let mut width = 1;
        for list in positions {
            if list.len() > 1 {
                if width > 1 && list.len() != width {
                    let mut lengths: Vec<usize> =
                        positions.iter().map(Vec::len).filter(|&l| l > 1).collect();
                    lengths.dedup();
                    return Err(ElaborationError::BroadcastMismatch {
                        gate: name.to_string(),
                        lengths,
                    });
                }
                width = list.len();
            }
        }
        Ok(width)
    }
}
