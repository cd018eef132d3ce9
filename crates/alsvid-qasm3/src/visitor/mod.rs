//! Statement-level elaboration.
//!
//! The [`Elaborator`] owns the input bindings, the classical scope
//! stack, the gate and function registries, the qubit registry, and
//! the emission buffers. Walking the program unrolls control flow,
//! expands gate definitions through the gate-call engine, and handles
//! pragmas; the result is a flat [`Circuit`].
//!
//! Child elaboration contexts reuse the same struct by swapping
//! buffers: a gate definition walks its body against a fresh local
//! qubit space and keeps the emissions as its template; a function
//! call does the same and then remaps the emitted qubit indices into
//! caller coordinates.

mod gate_call;

pub(crate) use gate_call::{Emitted, GateDefinition, TemplateOperator};

use std::collections::HashMap;

use alsvid_ir::{Circuit, Instruction, Matrix, NoiseChannel, Observable, ParameterExpression,
    QubitId, ResultRequest, UnitaryOp};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ast::{
    AssignOp, Expression, FunctionArg, ObservableAst, Pragma, Program, Statement, SwitchCase,
    TypeAnnotation,
};
use crate::builtins::noise_channel_arity;
use crate::error::{ElabResult, ElaborationError};
use crate::eval::apply_binary;
use crate::types::{
    ClassicalType, InputValue, Value, Variable, DEFAULT_FLOAT_WIDTH, DEFAULT_INT_WIDTH,
};

/// Control-flow signal produced by a statement.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Option<Value>),
}

/// How a scope behaves during name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    /// Lexical block: lookups fall through to the parent.
    Block,
    /// Function boundary: lookups past it only see global constants.
    Function,
}

#[derive(Debug)]
struct Scope {
    vars: FxHashMap<String, Variable>,
    kind: ScopeKind,
}

/// Qubit registers declared so far: name → (first id, size).
#[derive(Debug, Clone, Default)]
struct QubitTable {
    registers: FxHashMap<String, (u32, u32)>,
}

/// A registered function definition. Bodies stay as syntax and are
/// re-elaborated per call site.
#[derive(Debug, Clone)]
struct FunctionDefinition {
    args: Vec<FunctionArg>,
    return_type: Option<TypeAnnotation>,
    body: Vec<Statement>,
}

/// Buffers swapped when entering a child elaboration context.
struct SavedContext {
    qubits: QubitTable,
    qubit_count: u32,
    instructions: Vec<Emitted>,
    measured: Vec<u32>,
}

/// Statement-level elaborator producing a [`Circuit`].
pub struct Elaborator {
    inputs: HashMap<String, InputValue>,
    scopes: Vec<Scope>,
    gates: FxHashMap<String, GateDefinition>,
    functions: FxHashMap<String, FunctionDefinition>,
    qubits: QubitTable,
    qubit_count: u32,
    instructions: Vec<Emitted>,
    results: Vec<ResultRequest>,
    measured: Vec<u32>,
    context_depth: usize,
    loop_depth: usize,
    function_depth: usize,
    halted: bool,
}

impl Elaborator {
    /// Create an elaborator with the given input bindings.
    pub fn new(inputs: HashMap<String, InputValue>) -> Self {
        Self {
            inputs,
            scopes: vec![Scope {
                vars: FxHashMap::default(),
                kind: ScopeKind::Block,
            }],
            gates: FxHashMap::default(),
            functions: FxHashMap::default(),
            qubits: QubitTable::default(),
            qubit_count: 0,
            instructions: Vec::new(),
            results: Vec::new(),
            measured: Vec::new(),
            context_depth: 0,
            loop_depth: 0,
            function_depth: 0,
            halted: false,
        }
    }

    /// Elaborate a parsed program into a circuit.
    pub fn elaborate(mut self, program: &Program) -> ElabResult<Circuit> {
        self.walk_statements(&program.statements)?;
        self.finalize()
    }

    fn finalize(self) -> ElabResult<Circuit> {
        let mut circuit = Circuit {
            qubit_count: self.qubit_count as usize,
            ..Circuit::default()
        };
        for emitted in self.instructions {
            let targets: Vec<QubitId> = emitted.targets.iter().map(|&q| QubitId(q)).collect();
            let operator = emitted.op.into_operator()?;
            circuit.push(Instruction::new(operator, targets))?;
        }
        circuit.results = self.results;
        circuit.measured_qubits = self.measured.into_iter().map(QubitId).collect();
        circuit.validate()?;
        Ok(circuit)
    }

    // ---- scopes -------------------------------------------------------

    fn push_scope(&mut self, kind: ScopeKind) {
        self.scopes.push(Scope {
            vars: FxHashMap::default(),
            kind,
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: impl Into<String>, var: Variable) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .vars
            .insert(name.into(), var);
    }

    /// Look up a variable for reading. A function boundary hides
    /// everything outside it except global constants.
    pub(crate) fn lookup(&self, name: &str) -> Option<&Variable> {
        for scope in self.scopes.iter().rev() {
            if let Some(var) = scope.vars.get(name) {
                return Some(var);
            }
            if scope.kind == ScopeKind::Function {
                return self
                    .scopes
                    .first()
                    .and_then(|global| global.vars.get(name))
                    .filter(|var| var.is_const);
            }
        }
        None
    }

    /// Look up a variable for writing. Writes never cross a function
    /// boundary.
    fn lookup_mut(&mut self, name: &str) -> Option<&mut Variable> {
        let mut found = None;
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if scope.vars.contains_key(name) {
                found = Some(i);
                break;
            }
            if scope.kind == ScopeKind::Function {
                break;
            }
        }
        found.and_then(move |i| self.scopes[i].vars.get_mut(name))
    }

    // ---- qubits -------------------------------------------------------

    /// Resolved indices of a declared register.
    pub(crate) fn qubit_indices(&self, name: &str) -> Option<Vec<u32>> {
        let (start, size) = self.qubits.registers.get(name)?;
        Some((*start..start + size).collect())
    }

    /// Using `$n` allocates hardware qubits up to and including `n`.
    pub(crate) fn touch_hardware_qubit(&mut self, n: u32) {
        self.qubit_count = self.qubit_count.max(n + 1);
    }

    /// Record a measured qubit (local coordinates; remapped when a
    /// function context exits).
    pub(crate) fn record_measurement(&mut self, qubit: u32) {
        self.measured.push(qubit);
    }

    /// Evaluate a gate-target expression to concrete qubit indices.
    pub(crate) fn resolve_qubit_targets(&mut self, expr: &Expression) -> ElabResult<Vec<u32>> {
        match self.eval(expr)? {
            Value::Qubits(ids) => Ok(ids),
            other => Err(ElaborationError::Type(format!(
                "expected a qubit target, got {}",
                other.kind()
            ))),
        }
    }

    /// Clone a registered gate definition.
    pub(crate) fn gate_definition(&self, name: &str) -> Option<GateDefinition> {
        self.gates.get(name).cloned()
    }

    /// Append a parametric instruction to the current buffer. At the
    /// top level an uncontrolled global phase expands to every qubit
    /// allocated so far.
    pub(crate) fn push_emitted(&mut self, mut emitted: Emitted) -> ElabResult<()> {
        if self.context_depth == 0 {
            if let TemplateOperator::GPhase { ctrl_pattern, .. } = &emitted.op {
                if ctrl_pattern.is_empty() && emitted.targets.is_empty() {
                    emitted.targets = (0..self.qubit_count).collect();
                }
            }
        }
        self.instructions.push(emitted);
        Ok(())
    }

    // ---- statement walking --------------------------------------------

    fn walk_statements(&mut self, statements: &[Statement]) -> ElabResult<Flow> {
        for statement in statements {
            if self.halted {
                break;
            }
            match self.walk_statement(statement)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    #[allow(clippy::too_many_lines)]
    fn walk_statement(&mut self, statement: &Statement) -> ElabResult<Flow> {
        match statement {
            Statement::Include(_) => Ok(Flow::Normal),

            Statement::Pragma(pragma) => {
                if self.context_depth > 0 {
                    return Err(ElaborationError::Unsupported(
                        "pragma inside a definition".into(),
                    ));
                }
                self.handle_pragma(pragma)?;
                Ok(Flow::Normal)
            }

            Statement::ClassicalDecl {
                ty,
                name,
                init,
                is_const,
            } => {
                self.handle_classical_decl(ty, name, init.as_ref(), *is_const)?;
                Ok(Flow::Normal)
            }

            Statement::InputDecl { ty, name } => {
                let ty = self.resolve_type(ty)?;
                let binding = self
                    .inputs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ElaborationError::MissingInput(name.clone()))?;
                let value = binding.into_value(name, &ty)?;
                debug!(name, %ty, "bound input");
                self.declare(
                    name,
                    Variable {
                        ty,
                        value,
                        is_const: true,
                    },
                );
                Ok(Flow::Normal)
            }

            Statement::OutputDecl { name, .. } => Err(ElaborationError::Unsupported(format!(
                "output declaration '{name}'"
            ))),

            Statement::QubitDecl { name, size } => {
                if self.context_depth > 0 {
                    return Err(ElaborationError::Unsupported(
                        "qubit declaration inside a definition".into(),
                    ));
                }
                let size = match size {
                    Some(expr) => {
                        let n = self.eval(expr)?.as_int()?;
                        u32::try_from(n).ok().filter(|&n| n > 0).ok_or_else(|| {
                            ElaborationError::Type(format!(
                                "qubit register size must be positive, got {n}"
                            ))
                        })?
                    }
                    None => 1,
                };
                self.qubits
                    .registers
                    .insert(name.clone(), (self.qubit_count, size));
                self.qubit_count += size;
                debug!(name, size, total = self.qubit_count, "declared qubits");
                Ok(Flow::Normal)
            }

            Statement::GateDef {
                name,
                params,
                qubits,
                body,
            } => {
                self.handle_gate_def(name, params, qubits, body)?;
                Ok(Flow::Normal)
            }

            Statement::FunctionDef {
                name,
                args,
                return_type,
                body,
            } => {
                self.functions.insert(
                    name.clone(),
                    FunctionDefinition {
                        args: args.clone(),
                        return_type: return_type.clone(),
                        body: body.clone(),
                    },
                );
                Ok(Flow::Normal)
            }

            Statement::Assignment { target, op, value } => {
                self.handle_assignment(target, *op, value)?;
                Ok(Flow::Normal)
            }

            Statement::GateCall {
                modifiers,
                name,
                params,
                qubits,
            } => {
                self.handle_gate_call(modifiers, name, params, qubits)?;
                Ok(Flow::Normal)
            }

            Statement::Measure { qubits, target: _ } => {
                // Measurement is a terminal annotation: outcomes are
                // not fed back into classical storage.
                let ids = self.resolve_qubit_targets(qubits)?;
                for q in ids {
                    self.record_measurement(q);
                }
                Ok(Flow::Normal)
            }

            Statement::If {
                condition,
                then_body,
                else_body,
            } => {
                let branch = if self.eval(condition)?.truthy()? {
                    Some(then_body)
                } else {
                    else_body.as_ref()
                };
                match branch {
                    Some(body) => self.walk_block(body),
                    None => Ok(Flow::Normal),
                }
            }

            Statement::For {
                ty,
                variable,
                iterable,
                body,
            } => self.handle_for(ty, variable, iterable, body),

            Statement::While { condition, body } => {
                self.loop_depth += 1;
                let mut flow = Flow::Normal;
                while self.eval(condition)?.truthy()? {
                    match self.walk_block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        other => {
                            flow = other;
                            break;
                        }
                    }
                    if self.halted {
                        break;
                    }
                }
                self.loop_depth -= 1;
                Ok(flow)
            }

            Statement::Switch {
                scrutinee,
                cases,
                default,
            } => self.handle_switch(scrutinee, cases, default.as_ref()),

            Statement::Break => {
                if self.loop_depth == 0 {
                    return Err(ElaborationError::ControlFlowOutsideLoop("break"));
                }
                Ok(Flow::Break)
            }

            Statement::Continue => {
                if self.loop_depth == 0 {
                    return Err(ElaborationError::ControlFlowOutsideLoop("continue"));
                }
                Ok(Flow::Continue)
            }

            Statement::Return(value) => {
                if self.function_depth == 0 {
                    return Err(ElaborationError::Unsupported(
                        "'return' outside of a def".into(),
                    ));
                }
                let value = match value {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                Ok(Flow::Return(value))
            }

            Statement::Box(body) => self.walk_block(body),

            Statement::End => {
                self.halted = true;
                Ok(Flow::Normal)
            }

            Statement::Expr(expr) => {
                // Function-call statement: evaluated for its emitted
                // instructions, return value discarded.
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
        }
    }

    /// Walk statements in a fresh block scope.
    fn walk_block(&mut self, statements: &[Statement]) -> ElabResult<Flow> {
        self.push_scope(ScopeKind::Block);
        let flow = self.walk_statements(statements);
        self.pop_scope();
        flow
    }

    // ---- declarations -------------------------------------------------

    fn handle_classical_decl(
        &mut self,
        ty: &TypeAnnotation,
        name: &str,
        init: Option<&Expression>,
        is_const: bool,
    ) -> ElabResult<()> {
        let ty = self.resolve_type(ty)?;
        if is_const && init.is_none() {
            return Err(ElaborationError::Type(format!(
                "const declaration of '{name}' requires an initializer"
            )));
        }

        let value = match init {
            Some(expr) => {
                let v = self.eval(expr)?;
                if matches!(v, Value::Param(_)) {
                    v
                } else {
                    v.coerce_to(&ty)?
                }
            }
            None => ty.default_value(),
        };
        self.declare(
            name,
            Variable {
                ty,
                value,
                is_const,
            },
        );
        Ok(())
    }

    /// Evaluate an optional width expression, requiring a positive
    /// integer.
    fn eval_width(&mut self, size: Option<&Expression>, default: u32) -> ElabResult<u32> {
        match size {
            Some(expr) => {
                let n = self.eval(expr)?.as_int()?;
                u32::try_from(n).ok().filter(|&n| n > 0).ok_or_else(|| {
                    ElaborationError::Type(format!("type width must be positive, got {n}"))
                })
            }
            None => Ok(default),
        }
    }

    /// Resolve a type annotation by evaluating its size expressions.
    pub(crate) fn resolve_type(&mut self, annotation: &TypeAnnotation) -> ElabResult<ClassicalType> {
        Ok(match annotation {
            TypeAnnotation::Bit { size: None } => ClassicalType::Bit { size: None },
            TypeAnnotation::Bit { size: Some(expr) } => ClassicalType::Bit {
                size: Some(self.eval_width(Some(expr), 0)?),
            },
            TypeAnnotation::Int { size } => ClassicalType::Int {
                size: self.eval_width(size.as_deref(), DEFAULT_INT_WIDTH)?,
            },
            TypeAnnotation::Uint { size } => ClassicalType::Uint {
                size: self.eval_width(size.as_deref(), DEFAULT_INT_WIDTH)?,
            },
            TypeAnnotation::Float { size } => ClassicalType::Float {
                size: self.eval_width(size.as_deref(), DEFAULT_FLOAT_WIDTH)?,
            },
            TypeAnnotation::Angle { size } => ClassicalType::Angle {
                size: self.eval_width(size.as_deref(), DEFAULT_FLOAT_WIDTH)?,
            },
            TypeAnnotation::Complex { size } => ClassicalType::Complex {
                size: self.eval_width(size.as_deref(), DEFAULT_FLOAT_WIDTH)?,
            },
            TypeAnnotation::Bool => ClassicalType::Bool,
            TypeAnnotation::Array { elem, dims } => {
                let elem = Box::new(self.resolve_type(elem)?);
                let mut extents = Vec::with_capacity(dims.len());
                for dim in dims {
                    let n = self.eval(dim)?.as_int()?;
                    extents.push(u32::try_from(n).ok().filter(|&n| n > 0).ok_or_else(
                        || {
                            ElaborationError::Type(format!(
                                "array dimension must be positive, got {n}"
                            ))
                        },
                    )?);
                }
                ClassicalType::Array {
                    elem,
                    dims: extents,
                }
            }
            TypeAnnotation::ArrayReference { .. } => {
                return Err(ElaborationError::Type(
                    "array references are only valid in def signatures".into(),
                ));
            }
        })
    }

    // ---- assignment ---------------------------------------------------

    fn handle_assignment(
        &mut self,
        target: &Expression,
        op: AssignOp,
        value_expr: &Expression,
    ) -> ElabResult<()> {
        let rhs = self.eval(value_expr)?;
        let value = match op {
            AssignOp::Assign => rhs,
            AssignOp::Compound(binary) => {
                let current = self.eval(target)?;
                apply_binary(binary, &current, &rhs)?
            }
        };

        match target {
            Expression::Identifier(name) => {
                let Some(var) = self.lookup(name) else {
                    return Err(ElaborationError::UndefinedVariable(name.clone()));
                };
                if var.is_const {
                    return Err(ElaborationError::ConstAssignment(name.clone()));
                }
                let ty = var.ty.clone();
                let coerced = value.coerce_to(&ty)?;
                let var = self
                    .lookup_mut(name)
                    .ok_or_else(|| ElaborationError::UndefinedVariable(name.clone()))?;
                var.value = coerced;
                Ok(())
            }
            Expression::Index { target, indices } => {
                let Expression::Identifier(name) = target.as_ref() else {
                    return Err(ElaborationError::Type(
                        "assignment target must be a variable".into(),
                    ));
                };
                let index_values: ElabResult<Vec<Value>> =
                    indices.iter().map(|e| self.eval(e)).collect();
                self.write_indexed(name, &index_values?, value)
            }
            _ => Err(ElaborationError::Type(
                "assignment target must be a variable".into(),
            )),
        }
    }

    /// Write through an indexed target, broadcasting a scalar over a
    /// slice.
    fn write_indexed(&mut self, name: &str, indices: &[Value], value: Value) -> ElabResult<()> {
        let Some(var) = self.lookup(name) else {
            return Err(ElaborationError::UndefinedVariable(name.to_string()));
        };
        if var.is_const {
            return Err(ElaborationError::ConstAssignment(name.to_string()));
        }

        let mut storage = var.value.clone();
        write_value(&mut storage, indices, &value, name)?;
        let var = self
            .lookup_mut(name)
            .ok_or_else(|| ElaborationError::UndefinedVariable(name.to_string()))?;
        var.value = storage;
        Ok(())
    }

    // ---- control flow -------------------------------------------------

    fn handle_for(
        &mut self,
        ty: &TypeAnnotation,
        variable: &str,
        iterable: &Expression,
        body: &[Statement],
    ) -> ElabResult<Flow> {
        let ty = self.resolve_type(ty)?;
        let items: Vec<Value> = match self.eval(iterable)? {
            range @ Value::Range { .. } => {
                range.collect_range()?.into_iter().map(Value::Int).collect()
            }
            Value::Array(items) => items,
            Value::Bits(bits) => bits.into_iter().map(Value::Bool).collect(),
            other => {
                return Err(ElaborationError::Type(format!(
                    "cannot iterate over {}",
                    other.kind()
                )));
            }
        };

        // The induction variable lives in a child scope and vanishes
        // with it when the loop completes.
        self.push_scope(ScopeKind::Block);
        self.loop_depth += 1;
        let result = self.run_for(&ty, variable, items, body);
        self.loop_depth -= 1;
        self.pop_scope();
        result
    }

    fn run_for(
        &mut self,
        ty: &ClassicalType,
        variable: &str,
        items: Vec<Value>,
        body: &[Statement],
    ) -> ElabResult<Flow> {
        self.declare(variable, Variable::new(ty.clone()));
        for item in items {
            let coerced = item.coerce_to(ty)?;
            if let Some(var) = self.lookup_mut(variable) {
                var.value = coerced;
            }
            match self.walk_statements(body)? {
                Flow::Normal | Flow::Continue => {}
                Flow::Break => break,
                other => return Ok(other),
            }
            if self.halted {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    fn handle_switch(
        &mut self,
        scrutinee: &Expression,
        cases: &[SwitchCase],
        default: Option<&Vec<Statement>>,
    ) -> ElabResult<Flow> {
        let needle = self.eval(scrutinee)?.as_int()?;
        for case in cases {
            for label in &case.labels {
                if self.eval(label)?.as_int()? == needle {
                    return self.walk_block(&case.body);
                }
            }
        }
        match default {
            Some(body) => self.walk_block(body),
            None => Ok(Flow::Normal),
        }
    }

    // ---- definitions --------------------------------------------------

    fn enter_context(&mut self, kind: ScopeKind) -> SavedContext {
        self.push_scope(kind);
        self.context_depth += 1;
        SavedContext {
            qubits: std::mem::take(&mut self.qubits),
            qubit_count: std::mem::replace(&mut self.qubit_count, 0),
            instructions: std::mem::take(&mut self.instructions),
            measured: std::mem::take(&mut self.measured),
        }
    }

    /// Restore the parent context; returns the child's emissions and
    /// measured qubits.
    fn exit_context(&mut self, saved: SavedContext) -> (Vec<Emitted>, Vec<u32>) {
        let instructions = std::mem::replace(&mut self.instructions, saved.instructions);
        let measured = std::mem::replace(&mut self.measured, saved.measured);
        self.qubits = saved.qubits;
        self.qubit_count = saved.qubit_count;
        self.context_depth -= 1;
        self.pop_scope();
        (instructions, measured)
    }

    /// Build a gate template: parameters become free symbols, qubit
    /// parameters take local indices `0..k`, and the body's emissions
    /// become the template.
    fn handle_gate_def(
        &mut self,
        name: &str,
        params: &[String],
        qubits: &[String],
        body: &[Statement],
    ) -> ElabResult<()> {
        let saved = self.enter_context(ScopeKind::Block);
        for param in params {
            self.declare(
                param,
                Variable {
                    ty: ClassicalType::Angle {
                        size: DEFAULT_FLOAT_WIDTH,
                    },
                    value: Value::Param(ParameterExpression::symbol(param.clone())),
                    is_const: true,
                },
            );
        }
        #[allow(clippy::cast_possible_truncation)]
        for (i, qubit) in qubits.iter().enumerate() {
            self.qubits.registers.insert(qubit.clone(), (i as u32, 1));
        }
        self.qubit_count = qubits.len() as u32;

        let result = self.walk_statements(body);
        let (template, _) = self.exit_context(saved);
        result?;

        debug!(gate = name, instructions = template.len(), "registered gate definition");
        self.gates.insert(
            name.to_string(),
            GateDefinition {
                params: params.to_vec(),
                num_qubits: qubits.len(),
                body: template,
            },
        );
        Ok(())
    }

    /// Elaborate a user function call. Arguments were already
    /// evaluated in caller scope; emissions are remapped into caller
    /// coordinates on exit and mutated array arguments are copied
    /// back.
    pub(crate) fn call_function(
        &mut self,
        name: &str,
        arg_exprs: &[Expression],
        arg_values: Vec<Value>,
    ) -> ElabResult<Value> {
        let Some(def) = self.functions.get(name).cloned() else {
            return Err(ElaborationError::UnknownFunction(name.to_string()));
        };
        if def.args.len() != arg_values.len() {
            return Err(ElaborationError::FunctionArgumentCount {
                function: name.to_string(),
                expected: def.args.len(),
                got: arg_values.len(),
            });
        }

        // Local-to-caller qubit map, concatenated over quantum args.
        let mut qubit_map: Vec<u32> = Vec::new();
        for (arg, value) in def.args.iter().zip(arg_values.iter()) {
            if let FunctionArg::Quantum { name: arg_name, .. } = arg {
                match value {
                    Value::Qubits(ids) => qubit_map.extend(ids),
                    other => {
                        return Err(ElaborationError::Type(format!(
                            "argument '{arg_name}' expects qubits, got {}",
                            other.kind()
                        )));
                    }
                }
            }
        }

        let saved = self.enter_context(ScopeKind::Function);
        self.function_depth += 1;
        let saved_loop_depth = std::mem::replace(&mut self.loop_depth, 0);
        #[allow(clippy::cast_possible_truncation)]
        {
            self.qubit_count = qubit_map.len() as u32;
        }

        let call_result = self.bind_and_run_function(&def, arg_values);

        // Capture mutated array arguments before the scope goes away.
        let writebacks = match &call_result {
            Ok(_) => self.collect_array_writebacks(&def, arg_exprs),
            Err(_) => Vec::new(),
        };

        self.loop_depth = saved_loop_depth;
        self.function_depth -= 1;
        let (instructions, measured) = self.exit_context(saved);
        let returned = call_result?;

        for mut emitted in instructions {
            for t in &mut emitted.targets {
                *t = qubit_map[*t as usize];
            }
            self.push_emitted(emitted)?;
        }
        for q in measured {
            self.record_measurement(qubit_map[q as usize]);
        }
        for (caller_name, value) in writebacks {
            if let Some(var) = self.lookup_mut(&caller_name) {
                var.value = value;
            }
        }
        Ok(returned)
    }

    fn bind_and_run_function(
        &mut self,
        def: &FunctionDefinition,
        arg_values: Vec<Value>,
    ) -> ElabResult<Value> {
        let mut local_qubit = 0_u32;
        for (arg, value) in def.args.iter().zip(arg_values.into_iter()) {
            match arg {
                FunctionArg::Quantum { name, size } => {
                    let Value::Qubits(ids) = &value else {
                        unreachable!("checked in call_function");
                    };
                    #[allow(clippy::cast_possible_truncation)]
                    let len = ids.len() as u32;
                    if let Some(size_expr) = size {
                        let declared = self.eval(size_expr)?.as_int()?;
                        if declared != i64::from(len) {
                            return Err(ElaborationError::Type(format!(
                                "argument '{name}' expects {declared} qubits, got {len}"
                            )));
                        }
                    }
                    self.qubits
                        .registers
                        .insert(name.clone(), (local_qubit, len));
                    local_qubit += len;
                }
                FunctionArg::Classical { ty, name } => {
                    let (ty, stored) = match ty {
                        TypeAnnotation::ArrayReference { .. } => {
                            // References adopt the caller's value
                            // unchanged; shape is the caller's.
                            (infer_array_type(&value), value)
                        }
                        other => {
                            let resolved = self.resolve_type(other)?;
                            let coerced = value.coerce_to(&resolved)?;
                            (resolved, coerced)
                        }
                    };
                    self.declare(
                        name,
                        Variable {
                            ty,
                            value: stored,
                            is_const: false,
                        },
                    );
                }
            }
        }

        let flow = self.walk_statements(&def.body)?;
        let returned = match flow {
            Flow::Return(Some(value)) => value,
            _ => Value::Uninit,
        };
        match &def.return_type {
            Some(annotation) if !matches!(returned, Value::Uninit) => {
                let ty = self.resolve_type(annotation)?;
                returned.coerce_to(&ty)
            }
            _ => Ok(returned),
        }
    }

    /// Mutable array-reference arguments copy their final value back
    /// to the caller variable (identifier arguments only).
    fn collect_array_writebacks(
        &self,
        def: &FunctionDefinition,
        arg_exprs: &[Expression],
    ) -> Vec<(String, Value)> {
        let mut writebacks = Vec::new();
        for (arg, expr) in def.args.iter().zip(arg_exprs.iter()) {
            if let FunctionArg::Classical {
                ty: TypeAnnotation::ArrayReference { mutable: true, .. },
                name,
            } = arg
            {
                if let Expression::Identifier(caller_name) = expr {
                    if let Some(var) = self
                        .scopes
                        .last()
                        .and_then(|scope| scope.vars.get(name))
                    {
                        writebacks.push((caller_name.clone(), var.value.clone()));
                    }
                }
            }
        }
        writebacks
    }

    // ---- pragmas ------------------------------------------------------

    fn handle_pragma(&mut self, pragma: &Pragma) -> ElabResult<()> {
        match pragma {
            Pragma::StateVector => {
                self.results.push(ResultRequest::StateVector);
                Ok(())
            }
            Pragma::Amplitude(states) => {
                for state in states {
                    if state.len() != self.qubit_count as usize {
                        return Err(ElaborationError::Type(format!(
                            "basis state \"{state}\" has {} bits, circuit has {} qubits",
                            state.len(),
                            self.qubit_count
                        )));
                    }
                }
                self.results.push(ResultRequest::Amplitude {
                    states: states.clone(),
                });
                Ok(())
            }
            Pragma::Probability(targets) => {
                let targets = self.resolve_result_targets(targets)?;
                self.results.push(ResultRequest::Probability { targets });
                Ok(())
            }
            Pragma::DensityMatrix(targets) => {
                let targets = self.resolve_result_targets(targets)?;
                self.results.push(ResultRequest::DensityMatrix { targets });
                Ok(())
            }
            Pragma::Expectation {
                observable,
                targets,
            } => {
                let request = self.observable_request(observable, targets)?;
                self.results.push(ResultRequest::Expectation {
                    observable: request.0,
                    targets: request.1,
                });
                Ok(())
            }
            Pragma::Variance {
                observable,
                targets,
            } => {
                let request = self.observable_request(observable, targets)?;
                self.results.push(ResultRequest::Variance {
                    observable: request.0,
                    targets: request.1,
                });
                Ok(())
            }
            Pragma::Sample {
                observable,
                targets,
            } => {
                let request = self.observable_request(observable, targets)?;
                self.results.push(ResultRequest::Sample {
                    observable: request.0,
                    targets: request.1,
                });
                Ok(())
            }
            Pragma::Unitary { matrix, targets } => {
                let matrix = self.eval_matrix(matrix)?;
                let op = UnitaryOp::new(matrix).map_err(ElaborationError::from)?;
                let ids = self.flatten_targets(targets)?;
                if ids.len() != op.matrix.num_qubits() as usize {
                    return Err(ElaborationError::Type(format!(
                        "unitary acts on {} qubits, got {} targets",
                        op.matrix.num_qubits(),
                        ids.len()
                    )));
                }
                self.push_emitted(Emitted {
                    op: TemplateOperator::Unitary(op),
                    targets: ids,
                })
            }
            Pragma::Noise {
                channel,
                args,
                targets,
            } => self.handle_noise(channel, args, targets),
            Pragma::Kraus { matrices, targets } => {
                let mut evaluated = Vec::with_capacity(matrices.len());
                for m in matrices {
                    evaluated.push(self.eval_matrix(m)?);
                }
                let channel = NoiseChannel::Kraus {
                    matrices: evaluated,
                };
                channel.validate().map_err(ElaborationError::from)?;
                let ids = self.flatten_targets(targets)?;
                if ids.len() != channel.num_qubits() {
                    return Err(ElaborationError::Type(format!(
                        "kraus operators act on {} qubits, got {} targets",
                        channel.num_qubits(),
                        ids.len()
                    )));
                }
                self.push_emitted(Emitted {
                    op: TemplateOperator::Noise(channel),
                    targets: ids,
                })
            }
            Pragma::Verbatim => {
                debug!("verbatim pragma recorded");
                Ok(())
            }
        }
    }

    fn handle_noise(
        &mut self,
        channel: &str,
        args: &[Expression],
        targets: &[Expression],
    ) -> ElabResult<()> {
        let Some((num_params, num_qubits)) = noise_channel_arity(channel) else {
            return Err(ElaborationError::UnknownName {
                kind: "noise channel",
                name: channel.to_string(),
            });
        };
        if args.len() != num_params {
            return Err(ElaborationError::GateParameterCount {
                gate: channel.to_string(),
                expected: num_params,
                got: args.len(),
            });
        }
        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            params.push(self.eval(arg)?.as_f64()?);
        }

        let model = match channel {
            "bit_flip" => NoiseChannel::BitFlip { p: params[0] },
            "phase_flip" => NoiseChannel::PhaseFlip { p: params[0] },
            "pauli_channel" => NoiseChannel::PauliChannel {
                px: params[0],
                py: params[1],
                pz: params[2],
            },
            "depolarizing" => NoiseChannel::Depolarizing { p: params[0] },
            "two_qubit_depolarizing" => NoiseChannel::TwoQubitDepolarizing { p: params[0] },
            "two_qubit_dephasing" => NoiseChannel::TwoQubitDephasing { p: params[0] },
            "amplitude_damping" => NoiseChannel::AmplitudeDamping { gamma: params[0] },
            "generalized_amplitude_damping" => NoiseChannel::GeneralizedAmplitudeDamping {
                gamma: params[0],
                p: params[1],
            },
            _ => NoiseChannel::PhaseDamping { gamma: params[0] },
        };
        model.validate().map_err(ElaborationError::from)?;

        let ids = self.flatten_targets(targets)?;
        if num_qubits == 1 && ids.len() > 1 {
            // One-qubit channels broadcast across their targets.
            for id in ids {
                self.push_emitted(Emitted {
                    op: TemplateOperator::Noise(model.clone()),
                    targets: vec![id],
                })?;
            }
            return Ok(());
        }
        if ids.len() != num_qubits {
            return Err(ElaborationError::GateQubitCount {
                gate: channel.to_string(),
                expected: num_qubits,
                got: ids.len(),
            });
        }
        self.push_emitted(Emitted {
            op: TemplateOperator::Noise(model),
            targets: ids,
        })
    }

    fn observable_request(
        &mut self,
        observable: &ObservableAst,
        targets: &[Expression],
    ) -> ElabResult<(Observable, Option<Vec<QubitId>>)> {
        let observable = self.build_observable(observable)?;
        let targets = self.resolve_result_targets(targets)?;
        if let Some(ids) = &targets {
            let expected = observable.num_qubits();
            if ids.len() != expected {
                return Err(ElaborationError::Type(format!(
                    "observable acts on {expected} qubits, got {} targets",
                    ids.len()
                )));
            }
        }
        Ok((observable, targets))
    }

    fn build_observable(&mut self, ast: &ObservableAst) -> ElabResult<Observable> {
        match ast {
            ObservableAst::Named(name) => Ok(match name.as_str() {
                "x" => Observable::X,
                "y" => Observable::Y,
                "z" => Observable::Z,
                "h" => Observable::H,
                _ => Observable::I,
            }),
            ObservableAst::Hermitian(matrix) => {
                let matrix = self.eval_matrix(matrix)?;
                Observable::hermitian(matrix).map_err(ElaborationError::from)
            }
            ObservableAst::Tensor(factors) => {
                let built: ElabResult<Vec<Observable>> =
                    factors.iter().map(|f| self.build_observable(f)).collect();
                Ok(Observable::Tensor(built?))
            }
        }
    }

    /// Evaluate matrix entry expressions into a complex matrix.
    fn eval_matrix(&mut self, rows: &[Vec<Expression>]) -> ElabResult<Matrix> {
        let mut evaluated = Vec::with_capacity(rows.len());
        for row in rows {
            let mut entries = Vec::with_capacity(row.len());
            for entry in row {
                entries.push(self.eval(entry)?.as_complex()?);
            }
            evaluated.push(entries);
        }
        Matrix::from_rows(evaluated).map_err(ElaborationError::from)
    }

    /// Resolve pragma targets; an empty list means "all qubits".
    fn resolve_result_targets(
        &mut self,
        targets: &[Expression],
    ) -> ElabResult<Option<Vec<QubitId>>> {
        if targets.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            self.flatten_targets(targets)?
                .into_iter()
                .map(QubitId)
                .collect(),
        ))
    }

    /// Resolve and concatenate target expressions.
    fn flatten_targets(&mut self, targets: &[Expression]) -> ElabResult<Vec<u32>> {
        let mut ids = Vec::new();
        for target in targets {
            ids.extend(self.resolve_qubit_targets(target)?);
        }
        Ok(ids)
    }
}

/// Infer a storage type for an array-reference argument from the
/// caller's value.
fn infer_array_type(value: &Value) -> ClassicalType {
    match value {
        Value::Array(items) => {
            #[allow(clippy::cast_possible_truncation)]
            let len = items.len() as u32;
            let elem = items.first().map_or(
                ClassicalType::Int {
                    size: DEFAULT_INT_WIDTH,
                },
                |v| infer_array_type(v),
            );
            ClassicalType::Array {
                elem: Box::new(elem),
                dims: vec![len],
            }
        }
        Value::Bits(bits) => ClassicalType::Bit {
            size: Some(bits.len() as u32),
        },
        Value::Float(_) => ClassicalType::Float {
            size: DEFAULT_FLOAT_WIDTH,
        },
        Value::Bool(_) => ClassicalType::Bool,
        _ => ClassicalType::Int {
            size: DEFAULT_INT_WIDTH,
        },
    }
}

/// Recursive indexed write with scalar-to-slice broadcast at the
/// final dimension.
fn write_value(
    container: &mut Value,
    indices: &[Value],
    value: &Value,
    name: &str,
) -> ElabResult<()> {
    use crate::eval::{index_positions, is_scalar_index};

    let Some((index, rest)) = indices.split_first() else {
        *container = value.clone();
        return Ok(());
    };

    match container {
        Value::Bits(bits) => {
            if !rest.is_empty() {
                return Err(ElaborationError::Type(format!(
                    "too many indices for '{name}'"
                )));
            }
            let positions = index_positions(index, bits.len(), name)?;
            if is_scalar_index(index) {
                bits[positions[0]] = value.truthy()?;
            } else {
                match value {
                    Value::Bits(src) if src.len() == positions.len() => {
                        for (slot, &bit) in positions.into_iter().zip(src.iter()) {
                            bits[slot] = bit;
                        }
                    }
                    // Scalar broadcast over the slice.
                    scalar => {
                        let bit = scalar.truthy()?;
                        for slot in positions {
                            bits[slot] = bit;
                        }
                    }
                }
            }
            Ok(())
        }
        Value::Array(items) => {
            let positions = index_positions(index, items.len(), name)?;
            if is_scalar_index(index) {
                write_value(&mut items[positions[0]], rest, value, name)
            } else {
                match value {
                    Value::Array(src) if src.len() == positions.len() => {
                        for (slot, item) in positions.into_iter().zip(src.iter()) {
                            write_value(&mut items[slot], rest, item, name)?;
                        }
                        Ok(())
                    }
                    scalar => {
                        for slot in positions {
                            write_value(&mut items[slot], rest, scalar, name)?;
                        }
                        Ok(())
                    }
                }
            }
        }
        other => Err(ElaborationError::Type(format!(
            "cannot assign through an index into {} '{name}'",
            other.kind()
        ))),
    }
}
