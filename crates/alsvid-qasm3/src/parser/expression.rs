//! Expression parsing for QASM3.
//!
//! Precedence climbing over the standard C-family operator table;
//! `**` is right-associative.

use super::Parser;
use crate::ast::{BinaryOp, Expression, Irrational, TypeAnnotation, UnaryOp};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

impl Parser {
    /// Parse an expression.
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_binary_expr(0)
    }

    /// Parse a binary expression with precedence climbing.
    fn parse_binary_expr(&mut self, min_prec: u8) -> ParseResult<Expression> {
        let mut left = self.parse_unary_expr()?;

        while let Some(op) = self.peek_binary_op() {
            let prec = op_precedence(op);
            if prec < min_prec {
                break;
            }
            self.advance();

            let next_min = if op == BinaryOp::Pow { prec } else { prec + 1 };
            let right = self.parse_binary_expr(next_min)?;
            left = Expression::Binary {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse a unary expression.
    fn parse_unary_expr(&mut self) -> ParseResult<Expression> {
        let op = match self.peek() {
            Some(Token::Minus) => Some(UnaryOp::Neg),
            Some(Token::Not) => Some(UnaryOp::Not),
            Some(Token::Tilde) => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            // `**` binds tighter than a unary operator: -x ** 2 is
            // -(x ** 2), so the operand parses at power precedence.
            let operand = self.parse_binary_expr(POW_PRECEDENCE)?;
            return Ok(Expression::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix_expr()
    }

    /// Parse a primary expression with trailing index groups.
    fn parse_postfix_expr(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_primary_expr()?;

        while self.check(&Token::LBracket) {
            self.advance();
            let mut indices = vec![self.parse_index_item()?];
            while self.consume(&Token::Comma) {
                indices.push(self.parse_index_item()?);
            }
            self.expect(Token::RBracket)?;
            expr = Expression::Index {
                target: Box::new(expr),
                indices,
            };
        }

        Ok(expr)
    }

    /// Parse a primary expression.
    fn parse_primary_expr(&mut self) -> ParseResult<Expression> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| ParseError::UnexpectedEof("expression".into()))?;

        if token.is_type_keyword() {
            let ty = self.parse_type_annotation()?;
            self.expect(Token::LParen)?;
            let operand = self.parse_expression()?;
            self.expect(Token::RParen)?;
            return Ok(Expression::Cast {
                ty,
                operand: Box::new(operand),
            });
        }

        match token {
            Token::IntLiteral(v) => {
                self.advance();
                // u64 to i64 wraps only past i64::MAX, which no real
                // program's literal reaches.
                #[allow(clippy::cast_possible_wrap)]
                let value = v as i64;
                Ok(Expression::IntLiteral(value))
            }
            Token::FloatLiteral(v) => {
                self.advance();
                Ok(Expression::FloatLiteral(v))
            }
            Token::ImaginaryLiteral(v) => {
                self.advance();
                Ok(Expression::ImaginaryLiteral(v))
            }
            Token::True => {
                self.advance();
                Ok(Expression::BoolLiteral(true))
            }
            Token::False => {
                self.advance();
                Ok(Expression::BoolLiteral(false))
            }
            Token::BitstringLiteral(bits) => {
                self.advance();
                Ok(Expression::BitstringLiteral(bits))
            }
            Token::StringLiteral(s) => {
                self.advance();
                Ok(Expression::StringLiteral(s))
            }
            Token::Pi => {
                self.advance();
                Ok(Expression::Irrational(Irrational::Pi))
            }
            Token::Tau => {
                self.advance();
                Ok(Expression::Irrational(Irrational::Tau))
            }
            Token::Euler => {
                self.advance();
                Ok(Expression::Irrational(Irrational::Euler))
            }
            Token::HardwareQubit(n) => {
                self.advance();
                Ok(Expression::HardwareQubit(n))
            }
            Token::Identifier(name) => {
                self.advance();
                if self.consume(&Token::LParen) {
                    let args = self.parse_call_arguments()?;
                    self.expect(Token::RParen)?;
                    Ok(Expression::Call { name, args })
                } else {
                    Ok(Expression::Identifier(name))
                }
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::LBrace => {
                self.advance();
                let mut elements = Vec::new();
                if !self.check(&Token::RBrace) {
                    elements.push(self.parse_expression()?);
                    while self.consume(&Token::Comma) {
                        elements.push(self.parse_expression()?);
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expression::ArrayLiteral(elements))
            }
            Token::Measure => {
                self.advance();
                let target = self.parse_postfix_expr()?;
                Ok(Expression::Measure(Box::new(target)))
            }
            // `pow` doubles as the builtin power function; in
            // expression position it is always the function.
            Token::Pow => {
                self.advance();
                self.expect(Token::LParen)?;
                let args = self.parse_call_arguments()?;
                self.expect(Token::RParen)?;
                Ok(Expression::Call {
                    name: "pow".into(),
                    args,
                })
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Parse one entry of an index group: a plain expression or a
    /// range `start : step : stop` with any bound omitted.
    pub(crate) fn parse_index_item(&mut self) -> ParseResult<Expression> {
        let start = if self.check(&Token::Colon) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        if !self.consume(&Token::Colon) {
            return Ok(*start.expect("expression before ':' or range"));
        }

        let second = if self.range_bound_follows() {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };

        if self.consume(&Token::Colon) {
            let stop = if self.range_bound_follows() {
                Some(Box::new(self.parse_expression()?))
            } else {
                None
            };
            Ok(Expression::Range {
                start,
                step: second,
                stop,
            })
        } else {
            Ok(Expression::Range {
                start,
                step: None,
                stop: second,
            })
        }
    }

    /// Whether the next token can begin a range bound.
    fn range_bound_follows(&self) -> bool {
        !matches!(
            self.peek(),
            None | Some(
                Token::Colon | Token::RBracket | Token::RBrace | Token::RParen | Token::Comma
            )
        )
    }

    /// Parse a call argument list (the caller consumes the parens).
    pub(crate) fn parse_call_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        if self.check(&Token::RParen) {
            return Ok(vec![]);
        }
        let mut args = vec![self.parse_expression()?];
        while self.consume(&Token::Comma) {
            args.push(self.parse_expression()?);
        }
        Ok(args)
    }

    /// Peek at a binary operator without consuming it.
    fn peek_binary_op(&self) -> Option<BinaryOp> {
        match self.peek()? {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Mod),
            Token::DoubleStar => Some(BinaryOp::Pow),
            Token::EqEq => Some(BinaryOp::Eq),
            Token::NotEq => Some(BinaryOp::NotEq),
            Token::Lt => Some(BinaryOp::Lt),
            Token::LtEq => Some(BinaryOp::LtEq),
            Token::Gt => Some(BinaryOp::Gt),
            Token::GtEq => Some(BinaryOp::GtEq),
            Token::AndAnd => Some(BinaryOp::And),
            Token::OrOr => Some(BinaryOp::Or),
            Token::Ampersand => Some(BinaryOp::BitAnd),
            Token::Pipe => Some(BinaryOp::BitOr),
            Token::Caret => Some(BinaryOp::BitXor),
            Token::LShift => Some(BinaryOp::LShift),
            Token::RShift => Some(BinaryOp::RShift),
            _ => None,
        }
    }

    /// Parse a classical type annotation.
    pub(crate) fn parse_type_annotation(&mut self) -> ParseResult<TypeAnnotation> {
        let token = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof("type".into()))?;

        match token {
            Token::Bit => Ok(TypeAnnotation::Bit {
                size: self.parse_optional_size()?,
            }),
            Token::Int => Ok(TypeAnnotation::Int {
                size: self.parse_optional_size()?,
            }),
            Token::Uint => Ok(TypeAnnotation::Uint {
                size: self.parse_optional_size()?,
            }),
            Token::Float => Ok(TypeAnnotation::Float {
                size: self.parse_optional_size()?,
            }),
            Token::Angle => Ok(TypeAnnotation::Angle {
                size: self.parse_optional_size()?,
            }),
            Token::Bool => Ok(TypeAnnotation::Bool),
            Token::Complex => {
                // complex[float[n]] or complex[n]
                let size = if self.consume(&Token::LBracket) {
                    let size = if self.consume(&Token::Float) {
                        self.parse_optional_size()?
                    } else {
                        Some(Box::new(self.parse_expression()?))
                    };
                    self.expect(Token::RBracket)?;
                    size
                } else {
                    None
                };
                Ok(TypeAnnotation::Complex { size })
            }
            Token::Array => {
                self.expect(Token::LBracket)?;
                let elem = Box::new(self.parse_type_annotation()?);
                let mut dims = Vec::new();
                while self.consume(&Token::Comma) {
                    dims.push(self.parse_expression()?);
                }
                self.expect(Token::RBracket)?;
                Ok(TypeAnnotation::Array { elem, dims })
            }
            other => Err(ParseError::UnexpectedToken {
                offset: self.offset(),
                expected: "classical type".into(),
                found: other.to_string(),
            }),
        }
    }

    /// Parse an optional `[size]` suffix.
    fn parse_optional_size(&mut self) -> ParseResult<Option<Box<Expression>>> {
        if self.consume(&Token::LBracket) {
            let size = self.parse_expression()?;
            self.expect(Token::RBracket)?;
            Ok(Some(Box::new(size)))
        } else {
            Ok(None)
        }
    }
}

const POW_PRECEDENCE: u8 = 11;

/// Get operator precedence. Larger binds tighter.
fn op_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::BitOr => 3,
        BinaryOp::BitXor => 4,
        BinaryOp::BitAnd => 5,
        BinaryOp::Eq | BinaryOp::NotEq => 6,
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => 7,
        BinaryOp::LShift | BinaryOp::RShift => 8,
        BinaryOp::Add | BinaryOp::Sub => 9,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 10,
        BinaryOp::Pow => POW_PRECEDENCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(source: &str) -> Expression {
        let mut parser = Parser::new(source).unwrap();
        parser.parse_expression().unwrap()
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse_expr("1 + 2 * 3");
        match expr {
            Expression::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expression::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("expected Add at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_power_right_assoc() {
        // 2 ** 3 ** 2 parses as 2 ** (3 ** 2)
        let expr = parse_expr("2 ** 3 ** 2");
        match expr {
            Expression::Binary { op: BinaryOp::Pow, rhs, .. } => {
                assert!(matches!(*rhs, Expression::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("expected Pow at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_shift_precedence() {
        // 1 << 2 + 3 parses as 1 << (2 + 3)
        let expr = parse_expr("1 << 2 + 3");
        assert!(matches!(
            expr,
            Expression::Binary { op: BinaryOp::LShift, .. }
        ));
    }

    #[test]
    fn test_range_index() {
        let expr = parse_expr("q[0:2:6]");
        match expr {
            Expression::Index { indices, .. } => {
                assert!(matches!(indices[0], Expression::Range { .. }));
            }
            other => panic!("expected Index, got {other:?}"),
        }
    }

    #[test]
    fn test_open_ended_range() {
        let expr = parse_expr("q[1:]");
        match expr {
            Expression::Index { indices, .. } => match &indices[0] {
                Expression::Range { start, step, stop } => {
                    assert!(start.is_some());
                    assert!(step.is_none());
                    assert!(stop.is_none());
                }
                other => panic!("expected Range, got {other:?}"),
            },
            other => panic!("expected Index, got {other:?}"),
        }
    }

    #[test]
    fn test_cast() {
        let expr = parse_expr("bool(x)");
        assert!(matches!(expr, Expression::Cast { ty: TypeAnnotation::Bool, .. }));

        let expr = parse_expr("int[8](2.0)");
        assert!(matches!(expr, Expression::Cast { ty: TypeAnnotation::Int { .. }, .. }));
    }

    #[test]
    fn test_set_literal() {
        let expr = parse_expr("{1, 2, 3}");
        match expr {
            Expression::ArrayLiteral(elems) => assert_eq!(elems.len(), 3),
            other => panic!("expected ArrayLiteral, got {other:?}"),
        }
    }

    #[test]
    fn test_measure_expression() {
        let expr = parse_expr("measure q[0]");
        assert!(matches!(expr, Expression::Measure(_)));
    }

    #[test]
    fn test_unary_binds_below_power() {
        // -x ** 2 parses as -(x ** 2)
        let expr = parse_expr("-x ** 2");
        match expr {
            Expression::Unary { op: UnaryOp::Neg, operand } => {
                assert!(matches!(*operand, Expression::Binary { op: BinaryOp::Pow, .. }));
            }
            other => panic!("expected Neg at the root, got {other:?}"),
        }
    }

    #[test]
    fn test_complex_literal_tail() {
        let expr = parse_expr("0.70710678 + 0.70710678im");
        assert!(matches!(expr, Expression::Binary { op: BinaryOp::Add, .. }));
    }
}
