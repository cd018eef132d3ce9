//! Pragma parsing.
//!
//! Pragmas are line-terminated, so the lexer hands the parser the
//! whole directive body as one token. The body is re-tokenized here
//! and parsed with its own small grammar.

use super::Parser;
use crate::ast::{Expression, ObservableAst, Pragma};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

impl Parser {
    /// Parse the body of a `#pragma` directive.
    pub(crate) fn parse_pragma(&mut self, body: &str, offset: usize) -> ParseResult<Pragma> {
        let mut sub = Parser::new(body).map_err(|_| ParseError::UnknownPragma(body.into()))?;

        if sub.parse_identifier().ok().as_deref() != Some("braket") {
            return Err(ParseError::UnknownPragma(body.into()));
        }

        let kind = sub.parse_identifier().map_err(|_| ParseError::UnknownPragma(body.into()))?;
        let pragma = match kind.as_str() {
            "result" => sub.parse_result_pragma(body)?,
            "unitary" => sub.parse_unitary_pragma()?,
            "noise" => sub.parse_noise_pragma()?,
            "verbatim" => Pragma::Verbatim,
            _ => return Err(ParseError::UnknownPragma(body.into())),
        };

        if !sub.is_eof() {
            return Err(ParseError::UnexpectedToken {
                offset: offset + sub.offset(),
                expected: "end of pragma".into(),
                found: sub.peek().map_or_else(String::new, ToString::to_string),
            });
        }
        Ok(pragma)
    }

    /// Parse a `result …` pragma body.
    fn parse_result_pragma(&mut self, body: &str) -> ParseResult<Pragma> {
        let kind = self
            .parse_identifier()
            .map_err(|_| ParseError::UnknownPragma(body.into()))?;

        match kind.as_str() {
            "state_vector" => Ok(Pragma::StateVector),
            "probability" => Ok(Pragma::Probability(self.parse_pragma_targets()?)),
            "density_matrix" => Ok(Pragma::DensityMatrix(self.parse_pragma_targets()?)),
            "amplitude" => Ok(Pragma::Amplitude(self.parse_basis_states()?)),
            "expectation" => {
                let (observable, targets) = self.parse_observable_spec()?;
                Ok(Pragma::Expectation {
                    observable,
                    targets,
                })
            }
            "variance" => {
                let (observable, targets) = self.parse_observable_spec()?;
                Ok(Pragma::Variance {
                    observable,
                    targets,
                })
            }
            "sample" => {
                let (observable, targets) = self.parse_observable_spec()?;
                Ok(Pragma::Sample {
                    observable,
                    targets,
                })
            }
            _ => Err(ParseError::UnknownPragma(body.into())),
        }
    }

    /// Parse a `unitary(MATRIX) targets` pragma body.
    fn parse_unitary_pragma(&mut self) -> ParseResult<Pragma> {
        self.expect(Token::LParen)?;
        let matrix = self.parse_matrix()?;
        self.expect(Token::RParen)?;
        let targets = self.parse_pragma_targets()?;
        Ok(Pragma::Unitary { matrix, targets })
    }

    /// Parse a `noise <channel>(args) targets` pragma body.
    fn parse_noise_pragma(&mut self) -> ParseResult<Pragma> {
        let channel = self.parse_identifier()?;
        self.expect(Token::LParen)?;

        if channel == "kraus" {
            let mut matrices = vec![self.parse_matrix()?];
            while self.consume(&Token::Comma) {
                matrices.push(self.parse_matrix()?);
            }
            self.expect(Token::RParen)?;
            let targets = self.parse_pragma_targets()?;
            return Ok(Pragma::Kraus { matrices, targets });
        }

        let args = self.parse_call_arguments()?;
        self.expect(Token::RParen)?;
        let targets = self.parse_pragma_targets()?;
        Ok(Pragma::Noise {
            channel,
            args,
            targets,
        })
    }

    /// Parse an observable chain with optional trailing targets:
    /// `OBS [@ OBS …] [targets]`.
    fn parse_observable_spec(&mut self) -> ParseResult<(ObservableAst, Vec<Expression>)> {
        let mut factors = vec![self.parse_observable()?];
        while self.consume(&Token::At) {
            factors.push(self.parse_observable()?);
        }
        let observable = if factors.len() == 1 {
            factors.pop().expect("one factor")
        } else {
            ObservableAst::Tensor(factors)
        };

        let targets = self.parse_pragma_targets()?;
        Ok((observable, targets))
    }

    /// Parse one observable: a named single-qubit operator or
    /// `hermitian(MATRIX)`.
    fn parse_observable(&mut self) -> ParseResult<ObservableAst> {
        let name = self.parse_identifier()?;
        match name.as_str() {
            "x" | "y" | "z" | "i" | "h" => Ok(ObservableAst::Named(name)),
            "hermitian" => {
                self.expect(Token::LParen)?;
                let matrix = self.parse_matrix()?;
                self.expect(Token::RParen)?;
                Ok(ObservableAst::Hermitian(matrix))
            }
            other => Err(ParseError::UnexpectedToken {
                offset: self.offset(),
                expected: "observable (x, y, z, i, h, hermitian)".into(),
                found: other.into(),
            }),
        }
    }

    /// Parse the comma-separated qubit targets trailing a pragma.
    /// An empty list means "all qubits".
    fn parse_pragma_targets(&mut self) -> ParseResult<Vec<Expression>> {
        if self.is_eof() {
            return Ok(vec![]);
        }
        let mut targets = vec![self.parse_expression()?];
        while self.consume(&Token::Comma) {
            targets.push(self.parse_expression()?);
        }
        Ok(targets)
    }

    /// Parse the basis-state bitstrings of an amplitude pragma.
    fn parse_basis_states(&mut self) -> ParseResult<Vec<String>> {
        let mut states = vec![self.parse_basis_state()?];
        while self.consume(&Token::Comma) {
            states.push(self.parse_basis_state()?);
        }
        Ok(states)
    }

    fn parse_basis_state(&mut self) -> ParseResult<String> {
        match self.advance() {
            Some(Token::BitstringLiteral(bits)) => Ok(bits
                .iter()
                .map(|&b| if b { '1' } else { '0' })
                .collect()),
            Some(other) => Err(ParseError::UnexpectedToken {
                offset: self.offset(),
                expected: "basis-state bitstring".into(),
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEof("basis-state bitstring".into())),
        }
    }

    /// Parse a matrix: rows of bracketed comma lists. Entries are
    /// full expressions (they may contain `im` and arithmetic).
    fn parse_matrix(&mut self) -> ParseResult<Vec<Vec<Expression>>> {
        self.expect(Token::LBracket)?;
        let mut rows = vec![self.parse_matrix_row()?];
        while self.consume(&Token::Comma) {
            rows.push(self.parse_matrix_row()?);
        }
        self.expect(Token::RBracket)?;
        Ok(rows)
    }

    fn parse_matrix_row(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect(Token::LBracket)?;
        let mut entries = vec![self.parse_expression()?];
        while self.consume(&Token::Comma) {
            entries.push(self.parse_expression()?);
        }
        self.expect(Token::RBracket)?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Statement;
    use crate::parser::parse;

    fn parse_single_pragma(line: &str) -> Pragma {
        let program = parse(line).unwrap();
        match &program.statements[0] {
            Statement::Pragma(p) => p.clone(),
            other => panic!("expected pragma, got {other:?}"),
        }
    }

    #[test]
    fn test_state_vector() {
        assert_eq!(
            parse_single_pragma("#pragma braket result state_vector"),
            Pragma::StateVector
        );
    }

    #[test]
    fn test_probability_all_qubits() {
        match parse_single_pragma("#pragma braket result probability") {
            Pragma::Probability(targets) => assert!(targets.is_empty()),
            other => panic!("expected probability, got {other:?}"),
        }
    }

    #[test]
    fn test_probability_with_targets() {
        match parse_single_pragma("#pragma braket result probability cout, b") {
            Pragma::Probability(targets) => assert_eq!(targets.len(), 2),
            other => panic!("expected probability, got {other:?}"),
        }
    }

    #[test]
    fn test_amplitude() {
        match parse_single_pragma("#pragma braket result amplitude \"00\", \"11\"") {
            Pragma::Amplitude(states) => assert_eq!(states, vec!["00", "11"]),
            other => panic!("expected amplitude, got {other:?}"),
        }
    }

    #[test]
    fn test_expectation_tensor() {
        match parse_single_pragma("#pragma braket result expectation x @ y q[0], q[1]") {
            Pragma::Expectation { observable, targets } => {
                assert!(matches!(observable, ObservableAst::Tensor(ref f) if f.len() == 2));
                assert_eq!(targets.len(), 2);
            }
            other => panic!("expected expectation, got {other:?}"),
        }
    }

    #[test]
    fn test_hermitian_observable() {
        let line = "#pragma braket result variance hermitian([[1, 0], [0, -1]]) q[0]";
        match parse_single_pragma(line) {
            Pragma::Variance { observable, .. } => {
                assert!(matches!(observable, ObservableAst::Hermitian(ref m) if m.len() == 2));
            }
            other => panic!("expected variance, got {other:?}"),
        }
    }

    #[test]
    fn test_unitary_with_complex_entries() {
        let line =
            "#pragma braket unitary([[1, 0], [0, 0.70710678 + 0.70710678im]]) q[0]";
        match parse_single_pragma(line) {
            Pragma::Unitary { matrix, targets } => {
                assert_eq!(matrix.len(), 2);
                assert_eq!(matrix[1].len(), 2);
                assert_eq!(targets.len(), 1);
            }
            other => panic!("expected unitary, got {other:?}"),
        }
    }

    #[test]
    fn test_noise_channel() {
        match parse_single_pragma("#pragma braket noise pauli_channel(.1, .2, .3) q[0]") {
            Pragma::Noise { channel, args, targets } => {
                assert_eq!(channel, "pauli_channel");
                assert_eq!(args.len(), 3);
                assert_eq!(targets.len(), 1);
            }
            other => panic!("expected noise, got {other:?}"),
        }
    }

    #[test]
    fn test_kraus() {
        let line = "#pragma braket noise kraus([[0.9486832980505138, 0], [0, 0.9486832980505138]], [[0, 0.31622776601683794], [0.31622776601683794, 0]]) q[0]";
        match parse_single_pragma(line) {
            Pragma::Kraus { matrices, targets } => {
                assert_eq!(matrices.len(), 2);
                assert_eq!(targets.len(), 1);
            }
            other => panic!("expected kraus, got {other:?}"),
        }
    }

    #[test]
    fn test_verbatim() {
        assert_eq!(parse_single_pragma("#pragma braket verbatim"), Pragma::Verbatim);
    }

    #[test]
    fn test_unknown_pragma_rejected() {
        assert!(matches!(
            parse("#pragma braket frobnicate q[0]").unwrap_err(),
            ParseError::UnknownPragma(_)
        ));
        assert!(matches!(
            parse("#pragma openqasm result state_vector").unwrap_err(),
            ParseError::UnknownPragma(_)
        ));
    }
}
