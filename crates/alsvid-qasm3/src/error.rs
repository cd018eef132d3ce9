//! Error types for the QASM3 front-end.
//!
//! Two error families, matching the two pipeline halves: parse errors
//! carry a byte offset into the source; elaboration errors carry a
//! human-readable message about the failing construct.

use thiserror::Error;

/// Errors raised by the lexer and parser.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Lexer error (unrecognized bytes).
    #[error("Lexer error at offset {offset}: {message}")]
    Lexer {
        /// Byte offset of the offending span.
        offset: usize,
        /// What the lexer saw.
        message: String,
    },

    /// Unexpected token.
    #[error("Unexpected token at offset {offset}: expected {expected}, found {found}")]
    UnexpectedToken {
        /// Byte offset of the token.
        offset: usize,
        /// What the parser was looking for.
        expected: String,
        /// What it found instead.
        found: String,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of input: expected {0}")]
    UnexpectedEof(String),

    /// Invalid version statement.
    #[error("Invalid OPENQASM version: {0}")]
    InvalidVersion(String),

    /// Reserved keyword with no supported semantics.
    #[error("Reserved keyword '{keyword}' at offset {offset} is not supported")]
    ReservedKeyword {
        /// The keyword.
        keyword: String,
        /// Byte offset of the keyword.
        offset: usize,
    },

    /// Include of a file the front-end cannot resolve.
    #[error("Cannot include '{0}': only \"stdgates.inc\" is recognized")]
    UnresolvedInclude(String),

    /// Unknown pragma kind.
    #[error("Unknown pragma: '{0}'")]
    UnknownPragma(String),

    /// Unbalanced braces, brackets, or parentheses.
    #[error("Unmatched '{delimiter}' at offset {offset}")]
    UnmatchedDelimiter {
        /// The delimiter character.
        delimiter: char,
        /// Byte offset of the opener.
        offset: usize,
    },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised during elaboration (visitor and evaluator).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ElaborationError {
    /// Reference to an undeclared variable.
    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    /// Read of a declared but never assigned variable.
    #[error("Variable '{0}' used before initialization")]
    Uninitialized(String),

    /// Reference to an unknown gate.
    #[error("Unknown gate: {0}")]
    UnknownGate(String),

    /// Reference to an unknown function.
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Assignment to a `const` variable.
    #[error("Cannot assign to const variable '{0}'")]
    ConstAssignment(String),

    /// `input` variable with no binding supplied.
    #[error("Missing input binding for '{0}'")]
    MissingInput(String),

    /// Supplied input value does not fit the declared type.
    #[error("Input '{name}' cannot be coerced to {ty}: {reason}")]
    InputCoercion {
        /// The input variable.
        name: String,
        /// The declared type.
        ty: String,
        /// Why coercion failed.
        reason: String,
    },

    /// Gate called with the wrong number of classical parameters.
    #[error("Gate '{gate}' expects {expected} parameters, got {got}")]
    GateParameterCount {
        /// Gate name.
        gate: String,
        /// Expected count.
        expected: usize,
        /// Supplied count.
        got: usize,
    },

    /// Gate called with too few qubit targets.
    #[error("Gate '{gate}' expects {expected} qubits, got {got}")]
    GateQubitCount {
        /// Gate name.
        gate: String,
        /// Expected count.
        expected: usize,
        /// Supplied count.
        got: usize,
    },

    /// Function called with the wrong number of arguments.
    #[error("Function '{function}' expects {expected} arguments, got {got}")]
    FunctionArgumentCount {
        /// Function name.
        function: String,
        /// Expected count.
        expected: usize,
        /// Supplied count.
        got: usize,
    },

    /// Index outside a register or array extent.
    #[error("Index {index} out of range for '{name}' of size {size}")]
    IndexOutOfRange {
        /// The indexed variable.
        name: String,
        /// The offending index.
        index: i64,
        /// The declared size.
        size: usize,
    },

    /// Broadcast over registers of mismatched lengths.
    #[error("Cannot broadcast gate '{gate}' over target lengths {lengths:?}")]
    BroadcastMismatch {
        /// Gate name.
        gate: String,
        /// The distinct non-unit target lengths.
        lengths: Vec<usize>,
    },

    /// Modifier argument with the wrong type or range.
    #[error("Modifier '{modifier}' requires {requirement}, got {got}")]
    InvalidModifierArgument {
        /// The modifier.
        modifier: &'static str,
        /// What it requires.
        requirement: &'static str,
        /// What was supplied.
        got: String,
    },

    /// Type mismatch in an expression or assignment.
    #[error("Type error: {0}")]
    Type(String),

    /// Division by zero during constant evaluation.
    #[error("Division by zero")]
    DivisionByZero,

    /// Unknown builtin or noise channel name.
    #[error("Unknown {kind}: {name}")]
    UnknownName {
        /// What kind of name (e.g. "noise channel").
        kind: &'static str,
        /// The name.
        name: String,
    },

    /// Construct the front-end refuses to elaborate.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// `break` or `continue` outside a loop.
    #[error("'{0}' outside of a loop")]
    ControlFlowOutsideLoop(&'static str),

    /// IR-level validation failure.
    #[error(transparent)]
    Ir(#[from] alsvid_ir::IrError),
}

/// Result type for elaboration operations.
pub type ElabResult<T> = Result<T, ElaborationError>;

/// Any front-end failure: the single exception surface the caller
/// sees.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QasmError {
    /// A lexer/parser failure.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// An elaboration failure.
    #[error(transparent)]
    Elaboration(#[from] ElaborationError),
}

/// Result type spanning the whole front-end.
pub type QasmResult<T> = Result<T, QasmError>;
