//! Parser for `OpenQASM` 3.

mod expression;
mod pragma;
mod statement;

use crate::ast::{Program, Statement};
use crate::error::{ParseError, ParseResult};
use crate::lexer::{SpannedToken, Token, tokenize};

/// Parse a QASM3 source string into an AST program.
pub fn parse(source: &str) -> ParseResult<Program> {
    let mut parser = Parser::new(source)?;
    parser.parse_program()
}

/// Parser state.
pub(crate) struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    /// Create a new parser from source, failing fast on the first
    /// lexer error.
    pub(crate) fn new(source: &str) -> ParseResult<Self> {
        let token_results = tokenize(source);
        let mut tokens = Vec::new();

        for result in token_results {
            match result {
                Ok(t) => tokens.push(t),
                Err((span, message)) => {
                    return Err(ParseError::Lexer {
                        offset: span.start,
                        message,
                    });
                }
            }
        }

        Ok(Self { tokens, pos: 0 })
    }

    /// Check if we've reached the end.
    pub(crate) fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Byte offset of the current token (or the end of input).
    pub(crate) fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or_else(|| self.tokens.last().map_or(0, |t| t.span.end), |t| t.span.start)
    }

    /// Peek at the current token.
    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Peek one token ahead of the current one.
    pub(crate) fn peek_second(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|t| &t.token)
    }

    /// Advance and return the current token.
    pub(crate) fn advance(&mut self) -> Option<Token> {
        if self.is_eof() {
            return None;
        }
        let token = self.tokens[self.pos].token.clone();
        self.pos += 1;
        Some(token)
    }

    /// Expect a specific token kind.
    #[allow(clippy::needless_pass_by_value)]
    pub(crate) fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let offset = self.offset();
        let found = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof(format!("expected {expected}")))?;

        if std::mem::discriminant(&found) != std::mem::discriminant(&expected) {
            return Err(ParseError::UnexpectedToken {
                offset,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Check if the current token matches the given kind.
    pub(crate) fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    /// Consume the current token if it matches.
    pub(crate) fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Build an unexpected-token error at the current position.
    pub(crate) fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        match self.peek() {
            Some(found) => ParseError::UnexpectedToken {
                offset: self.offset(),
                expected: expected.into(),
                found: found.to_string(),
            },
            None => ParseError::UnexpectedEof(expected.into()),
        }
    }

    /// Parse the entire program.
    fn parse_program(&mut self) -> ParseResult<Program> {
        let version = if self.check(&Token::OpenQasm) {
            self.advance();
            let version = self.parse_version()?;
            self.expect(Token::Semicolon)?;
            Some(version)
        } else {
            None
        };

        let mut statements = Vec::new();
        while !self.is_eof() {
            statements.push(self.parse_statement()?);
        }

        Ok(Program {
            version,
            statements,
        })
    }

    /// Parse a version number.
    fn parse_version(&mut self) -> ParseResult<String> {
        match self.advance() {
            Some(Token::FloatLiteral(v)) => Ok(format!("{v}")),
            Some(Token::IntLiteral(v)) => Ok(format!("{v}.0")),
            Some(other) => Err(ParseError::InvalidVersion(other.to_string())),
            None => Err(ParseError::UnexpectedEof("version number".into())),
        }
    }

    /// Parse an identifier.
    pub(crate) fn parse_identifier(&mut self) -> ParseResult<String> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Identifier(s)) => Ok(s),
            Some(other) => Err(ParseError::UnexpectedToken {
                offset,
                expected: "identifier".into(),
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEof("identifier".into())),
        }
    }

    /// Parse a comma-separated identifier list.
    pub(crate) fn parse_identifier_list(&mut self) -> ParseResult<Vec<String>> {
        let mut ids = vec![self.parse_identifier()?];
        while self.consume(&Token::Comma) {
            ids.push(self.parse_identifier()?);
        }
        Ok(ids)
    }

    /// Parse a `{ … }` statement block, reporting the opener's offset
    /// if the closing brace never arrives.
    pub(crate) fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        let opener = self.offset();
        self.expect(Token::LBrace)?;
        let mut statements = Vec::new();
        loop {
            if self.consume(&Token::RBrace) {
                return Ok(statements);
            }
            if self.is_eof() {
                return Err(ParseError::UnmatchedDelimiter {
                    delimiter: '{',
                    offset: opener,
                });
            }
            statements.push(self.parse_statement()?);
        }
    }

    /// Parse either a braced block or a single statement.
    pub(crate) fn parse_block_or_statement(&mut self) -> ParseResult<Vec<Statement>> {
        if self.check(&Token::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, Statement};

    #[test]
    fn test_parse_version_and_decls() {
        let program = parse("OPENQASM 3.0; qubit[2] q; bit[2] c;").unwrap();
        assert_eq!(program.version.as_deref(), Some("3"));
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_version_is_optional() {
        let program = parse("qubit q;").unwrap();
        assert!(program.version.is_none());
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_malformed_version() {
        let err = parse("OPENQASM three;").unwrap_err();
        assert!(matches!(err, ParseError::InvalidVersion(_)));
    }

    #[test]
    fn test_unmatched_brace() {
        let err = parse("gate g a { x a;").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnmatchedDelimiter { delimiter: '{', .. }
        ));
    }

    #[test]
    fn test_gate_call_statement() {
        let program = parse("h q[0];").unwrap();
        match &program.statements[0] {
            Statement::GateCall { name, qubits, .. } => {
                assert_eq!(name, "h");
                assert_eq!(qubits.len(), 1);
                assert!(matches!(qubits[0], Expression::Index { .. }));
            }
            other => panic!("expected gate call, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_semicolon() {
        assert!(parse("qubit q").is_err());
    }
}
