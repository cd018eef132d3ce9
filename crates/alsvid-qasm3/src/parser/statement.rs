//! Statement parsing for QASM3.

use super::Parser;
use crate::ast::{
    AssignOp, BinaryOp, Expression, FunctionArg, GateModifier, Statement, SwitchCase,
    TypeAnnotation,
};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

impl Parser {
    /// Parse a statement.
    pub(crate) fn parse_statement(&mut self) -> ParseResult<Statement> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| ParseError::UnexpectedEof("statement".into()))?;

        if token.is_reserved() {
            return Err(ParseError::ReservedKeyword {
                keyword: token.to_string(),
                offset: self.offset(),
            });
        }

        match token {
            Token::Pragma(body) => {
                let offset = self.offset();
                self.advance();
                let pragma = self.parse_pragma(&body, offset)?;
                Ok(Statement::Pragma(pragma))
            }
            Token::Include => self.parse_include(),
            Token::Qubit => self.parse_qubit_decl(),
            Token::Const => self.parse_classical_decl(true),
            Token::Input | Token::Output => self.parse_io_decl(),
            Token::Gate => self.parse_gate_def(),
            Token::Def => self.parse_function_def(),
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            Token::While => self.parse_while(),
            Token::Switch => self.parse_switch(),
            Token::Break => {
                self.advance();
                self.expect(Token::Semicolon)?;
                Ok(Statement::Break)
            }
            Token::Continue => {
                self.advance();
                self.expect(Token::Semicolon)?;
                Ok(Statement::Continue)
            }
            Token::Return => self.parse_return(),
            Token::End => {
                self.advance();
                self.expect(Token::Semicolon)?;
                Ok(Statement::End)
            }
            Token::Box => self.parse_box(),
            Token::Measure => self.parse_measure(),
            Token::GPhase => self.parse_modified_gate_call(vec![]),
            Token::Ctrl | Token::NegCtrl | Token::Inv | Token::Pow => {
                let modifiers = self.parse_modifier_chain()?;
                self.parse_modified_gate_call(modifiers)
            }
            Token::Identifier(_) => self.parse_identifier_statement(),
            _ if token.is_type_keyword() => self.parse_classical_decl(false),
            _ => Err(self.unexpected("statement")),
        }
    }

    /// Parse an include statement. Only `"stdgates.inc"` is
    /// recognized; the builtin gate registry already provides its
    /// contents, so the include elaborates to nothing.
    fn parse_include(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Include)?;
        let path = match self.advance() {
            Some(Token::StringLiteral(s)) => s,
            Some(other) => {
                return Err(ParseError::UnexpectedToken {
                    offset: self.offset(),
                    expected: "include path".into(),
                    found: other.to_string(),
                });
            }
            None => return Err(ParseError::UnexpectedEof("include path".into())),
        };
        self.expect(Token::Semicolon)?;

        if path != "stdgates.inc" {
            return Err(ParseError::UnresolvedInclude(path));
        }
        Ok(Statement::Include(path))
    }

    /// Parse a qubit declaration.
    fn parse_qubit_decl(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Qubit)?;

        let size = if self.consume(&Token::LBracket) {
            let size = self.parse_expression()?;
            self.expect(Token::RBracket)?;
            Some(size)
        } else {
            None
        };

        let name = self.parse_identifier()?;
        self.expect(Token::Semicolon)?;

        Ok(Statement::QubitDecl { name, size })
    }

    /// Parse a classical declaration (optionally `const`).
    fn parse_classical_decl(&mut self, is_const: bool) -> ParseResult<Statement> {
        if is_const {
            self.expect(Token::Const)?;
        }
        let ty = self.parse_type_annotation()?;
        let name = self.parse_identifier()?;

        let init = if self.consume(&Token::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;

        Ok(Statement::ClassicalDecl {
            ty,
            name,
            init,
            is_const,
        })
    }

    /// Parse an `input` or `output` declaration.
    fn parse_io_decl(&mut self) -> ParseResult<Statement> {
        let is_input = match self.advance() {
            Some(Token::Input) => true,
            Some(Token::Output) => false,
            _ => unreachable!("caller checked for input/output"),
        };
        let ty = self.parse_type_annotation()?;
        let name = self.parse_identifier()?;
        self.expect(Token::Semicolon)?;

        Ok(if is_input {
            Statement::InputDecl { ty, name }
        } else {
            Statement::OutputDecl { ty, name }
        })
    }

    /// Parse a gate definition.
    fn parse_gate_def(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Gate)?;
        let name = self.parse_identifier()?;

        let params = if self.consume(&Token::LParen) {
            let p = self.parse_identifier_list()?;
            self.expect(Token::RParen)?;
            p
        } else {
            vec![]
        };

        let qubits = self.parse_identifier_list()?;
        let body = self.parse_block()?;

        Ok(Statement::GateDef {
            name,
            params,
            qubits,
            body,
        })
    }

    /// Parse a function definition.
    fn parse_function_def(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Def)?;
        let name = self.parse_identifier()?;

        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            args.push(self.parse_function_arg()?);
            while self.consume(&Token::Comma) {
                args.push(self.parse_function_arg()?);
            }
        }
        self.expect(Token::RParen)?;

        let return_type = if self.consume(&Token::Arrow) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(Statement::FunctionDef {
            name,
            args,
            return_type,
            body,
        })
    }

    /// Parse one typed argument of a `def` signature.
    fn parse_function_arg(&mut self) -> ParseResult<FunctionArg> {
        if self.consume(&Token::Qubit) {
            let size = if self.consume(&Token::LBracket) {
                let size = self.parse_expression()?;
                self.expect(Token::RBracket)?;
                Some(size)
            } else {
                None
            };
            let name = self.parse_identifier()?;
            return Ok(FunctionArg::Quantum { name, size });
        }

        if self.check(&Token::Mutable) || self.check(&Token::Readonly) {
            let mutable = matches!(self.advance(), Some(Token::Mutable));
            self.expect(Token::Array)?;
            self.expect(Token::LBracket)?;
            let elem = Box::new(self.parse_type_annotation()?);
            self.expect(Token::Comma)?;
            self.expect(Token::Dim)?;
            self.expect(Token::Eq)?;
            let num_dims = match self.advance() {
                Some(Token::IntLiteral(n)) => n as usize,
                _ => return Err(self.unexpected("#dim count")),
            };
            self.expect(Token::RBracket)?;
            let name = self.parse_identifier()?;
            return Ok(FunctionArg::Classical {
                ty: TypeAnnotation::ArrayReference {
                    elem,
                    num_dims,
                    mutable,
                },
                name,
            });
        }

        let ty = self.parse_type_annotation()?;
        let name = self.parse_identifier()?;
        Ok(FunctionArg::Classical { ty, name })
    }

    /// Parse an if statement.
    fn parse_if(&mut self) -> ParseResult<Statement> {
        self.expect(Token::If)?;
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;

        let then_body = self.parse_block_or_statement()?;
        let else_body = if self.consume(&Token::Else) {
            Some(self.parse_block_or_statement()?)
        } else {
            None
        };

        Ok(Statement::If {
            condition,
            then_body,
            else_body,
        })
    }

    /// Parse a for loop: `for T x in iterable { … }`. The parenthesized
    /// form `for (T x in iterable)` is accepted too.
    fn parse_for(&mut self) -> ParseResult<Statement> {
        self.expect(Token::For)?;
        let parenthesized = self.consume(&Token::LParen);

        let ty = self.parse_type_annotation()?;
        let variable = self.parse_identifier()?;
        self.expect(Token::In)?;
        let iterable = self.parse_for_iterable()?;

        if parenthesized {
            self.expect(Token::RParen)?;
        }
        let body = self.parse_block_or_statement()?;

        Ok(Statement::For {
            ty,
            variable,
            iterable,
            body,
        })
    }

    /// Parse a for-loop iterable: a bracketed range, a set literal,
    /// or any expression evaluating to an aggregate.
    fn parse_for_iterable(&mut self) -> ParseResult<Expression> {
        if self.consume(&Token::LBracket) {
            let item = self.parse_index_item()?;
            self.expect(Token::RBracket)?;
            Ok(item)
        } else {
            self.parse_expression()
        }
    }

    /// Parse a while loop.
    fn parse_while(&mut self) -> ParseResult<Statement> {
        self.expect(Token::While)?;
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let body = self.parse_block_or_statement()?;

        Ok(Statement::While { condition, body })
    }

    /// Parse a switch statement.
    fn parse_switch(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Switch)?;
        self.expect(Token::LParen)?;
        let scrutinee = self.parse_expression()?;
        self.expect(Token::RParen)?;

        self.expect(Token::LBrace)?;
        let mut cases = Vec::new();
        let mut default = None;
        loop {
            if self.consume(&Token::RBrace) {
                break;
            }
            if self.consume(&Token::Case) {
                let mut labels = vec![self.parse_expression()?];
                while self.consume(&Token::Comma) {
                    labels.push(self.parse_expression()?);
                }
                let body = self.parse_block()?;
                cases.push(SwitchCase { labels, body });
            } else if self.consume(&Token::Default) {
                default = Some(self.parse_block()?);
            } else {
                return Err(self.unexpected("'case', 'default', or '}'"));
            }
        }

        Ok(Statement::Switch {
            scrutinee,
            cases,
            default,
        })
    }

    /// Parse a return statement.
    fn parse_return(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Return)?;
        let value = if self.check(&Token::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect(Token::Semicolon)?;
        Ok(Statement::Return(value))
    }

    /// Parse a box statement. A bracketed duration hint is skipped.
    fn parse_box(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Box)?;
        if self.consume(&Token::LBracket) {
            while !self.consume(&Token::RBracket) {
                if self.advance().is_none() {
                    return Err(ParseError::UnexpectedEof("']' closing box hint".into()));
                }
            }
        }
        let body = self.parse_block()?;
        Ok(Statement::Box(body))
    }

    /// Parse a measure statement: `measure q;` or `measure q -> c;`.
    fn parse_measure(&mut self) -> ParseResult<Statement> {
        self.expect(Token::Measure)?;
        let qubits = self.parse_expression()?;

        let target = if self.consume(&Token::Arrow) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;

        Ok(Statement::Measure { qubits, target })
    }

    /// Parse a chain of gate modifiers terminated by the gate name.
    fn parse_modifier_chain(&mut self) -> ParseResult<Vec<GateModifier>> {
        let mut modifiers = Vec::new();
        loop {
            let modifier = match self.peek() {
                Some(Token::Inv) => {
                    self.advance();
                    GateModifier::Inv
                }
                Some(Token::Pow) => {
                    self.advance();
                    self.expect(Token::LParen)?;
                    let exponent = self.parse_expression()?;
                    self.expect(Token::RParen)?;
                    GateModifier::Pow(exponent)
                }
                Some(Token::Ctrl) => {
                    self.advance();
                    GateModifier::Ctrl(self.parse_modifier_count()?)
                }
                Some(Token::NegCtrl) => {
                    self.advance();
                    GateModifier::NegCtrl(self.parse_modifier_count()?)
                }
                _ => break,
            };
            modifiers.push(modifier);
            self.expect(Token::At)?;
        }
        Ok(modifiers)
    }

    /// Parse the optional `(count)` of a ctrl/negctrl modifier.
    fn parse_modifier_count(&mut self) -> ParseResult<Option<Expression>> {
        if self.consume(&Token::LParen) {
            let count = self.parse_expression()?;
            self.expect(Token::RParen)?;
            Ok(Some(count))
        } else {
            Ok(None)
        }
    }

    /// Parse the gate call following a (possibly empty) modifier
    /// chain. The gate may be a named gate or `gphase`.
    fn parse_modified_gate_call(
        &mut self,
        modifiers: Vec<GateModifier>,
    ) -> ParseResult<Statement> {
        let name = match self.advance() {
            Some(Token::Identifier(s)) => s,
            Some(Token::GPhase) => "gphase".to_string(),
            Some(other) => {
                return Err(ParseError::UnexpectedToken {
                    offset: self.offset(),
                    expected: "gate name".into(),
                    found: other.to_string(),
                });
            }
            None => return Err(ParseError::UnexpectedEof("gate name".into())),
        };

        let params = if self.consume(&Token::LParen) {
            let p = self.parse_call_arguments()?;
            self.expect(Token::RParen)?;
            p
        } else {
            vec![]
        };

        let qubits = if self.check(&Token::Semicolon) {
            vec![]
        } else {
            self.parse_gate_targets()?
        };
        self.expect(Token::Semicolon)?;

        Ok(Statement::GateCall {
            modifiers,
            name,
            params,
            qubits,
        })
    }

    /// Parse a statement that starts with an identifier: a gate call,
    /// a classical assignment, or a function-call statement.
    fn parse_identifier_statement(&mut self) -> ParseResult<Statement> {
        let name = self.parse_identifier()?;

        // `name(args) …` — function-call statement or parameterized
        // gate call, disambiguated by what follows the parens.
        if self.consume(&Token::LParen) {
            let args = self.parse_call_arguments()?;
            self.expect(Token::RParen)?;

            if self.consume(&Token::Semicolon) {
                return Ok(Statement::Expr(Expression::Call { name, args }));
            }
            let qubits = self.parse_gate_targets()?;
            self.expect(Token::Semicolon)?;
            return Ok(Statement::GateCall {
                modifiers: vec![],
                name,
                params: args,
                qubits,
            });
        }

        // `name[…] op= …` or `name op= …` — classical assignment.
        let mut target = Expression::Identifier(name.clone());
        if self.check(&Token::LBracket) {
            self.advance();
            let mut indices = vec![self.parse_index_item()?];
            while self.consume(&Token::Comma) {
                indices.push(self.parse_index_item()?);
            }
            self.expect(Token::RBracket)?;
            target = Expression::Index {
                target: Box::new(target),
                indices,
            };
        }

        if let Some(op) = self.peek_assign_op() {
            self.advance();
            let value = self.parse_expression()?;
            self.expect(Token::Semicolon)?;
            return Ok(Statement::Assignment { target, op, value });
        }

        // Otherwise it's an unparameterized gate call; the expression
        // parsed so far was actually the gate name.
        match target {
            Expression::Identifier(_) => {}
            _ => return Err(self.unexpected("assignment operator")),
        }
        let qubits = self.parse_gate_targets()?;
        self.expect(Token::Semicolon)?;
        Ok(Statement::GateCall {
            modifiers: vec![],
            name,
            params: vec![],
            qubits,
        })
    }

    /// Peek at an assignment operator without consuming it.
    fn peek_assign_op(&self) -> Option<AssignOp> {
        match self.peek()? {
            Token::Eq => Some(AssignOp::Assign),
            Token::PlusEq => Some(AssignOp::Compound(BinaryOp::Add)),
            Token::MinusEq => Some(AssignOp::Compound(BinaryOp::Sub)),
            Token::StarEq => Some(AssignOp::Compound(BinaryOp::Mul)),
            Token::SlashEq => Some(AssignOp::Compound(BinaryOp::Div)),
            Token::CaretEq => Some(AssignOp::Compound(BinaryOp::BitXor)),
            Token::AmpersandEq => Some(AssignOp::Compound(BinaryOp::BitAnd)),
            Token::PipeEq => Some(AssignOp::Compound(BinaryOp::BitOr)),
            Token::LShiftEq => Some(AssignOp::Compound(BinaryOp::LShift)),
            Token::RShiftEq => Some(AssignOp::Compound(BinaryOp::RShift)),
            _ => None,
        }
    }

    /// Parse a comma-separated list of qubit target expressions.
    fn parse_gate_targets(&mut self) -> ParseResult<Vec<Expression>> {
        let mut targets = vec![self.parse_expression()?];
        while self.consume(&Token::Comma) {
            targets.push(self.parse_expression()?);
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_gate_definition() {
        let program = parse("gate majority a, b, c { cnot c, b; cnot c, a; ccnot a, b, c; }")
            .unwrap();
        match &program.statements[0] {
            Statement::GateDef { name, params, qubits, body } => {
                assert_eq!(name, "majority");
                assert!(params.is_empty());
                assert_eq!(qubits, &["a", "b", "c"]);
                assert_eq!(body.len(), 3);
            }
            other => panic!("expected gate def, got {other:?}"),
        }
    }

    #[test]
    fn test_modifier_chain() {
        let program = parse("pow(1/2) @ inv @ ctrl @ x c, a;").unwrap();
        match &program.statements[0] {
            Statement::GateCall { modifiers, name, qubits, .. } => {
                assert_eq!(modifiers.len(), 3);
                assert!(matches!(modifiers[0], GateModifier::Pow(_)));
                assert!(matches!(modifiers[1], GateModifier::Inv));
                assert!(matches!(modifiers[2], GateModifier::Ctrl(None)));
                assert_eq!(name, "x");
                assert_eq!(qubits.len(), 2);
            }
            other => panic!("expected gate call, got {other:?}"),
        }
    }

    #[test]
    fn test_gphase_call() {
        let program = parse("gphase(-pi/2) q[1];").unwrap();
        match &program.statements[0] {
            Statement::GateCall { name, params, .. } => {
                assert_eq!(name, "gphase");
                assert_eq!(params.len(), 1);
            }
            other => panic!("expected gate call, got {other:?}"),
        }
    }

    #[test]
    fn test_const_declaration() {
        let program = parse("const int[8] n = 4;").unwrap();
        assert!(matches!(
            &program.statements[0],
            Statement::ClassicalDecl { is_const: true, init: Some(_), .. }
        ));
    }

    #[test]
    fn test_input_declaration() {
        let program = parse("input uint[4] a_in;").unwrap();
        assert!(matches!(
            &program.statements[0],
            Statement::InputDecl { name, .. } if name == "a_in"
        ));
    }

    #[test]
    fn test_reserved_keyword_rejected() {
        for source in ["reset q;", "barrier q;", "delay[100] q;", "stretch s;"] {
            let err = parse(source).unwrap_err();
            assert!(
                matches!(err, ParseError::ReservedKeyword { .. }),
                "{source} should be rejected"
            );
        }
    }

    #[test]
    fn test_output_parses() {
        assert!(parse("output int[8] n;").is_ok());
    }

    #[test]
    fn test_include_stdgates_only() {
        assert!(parse("include \"stdgates.inc\";").is_ok());
        assert!(matches!(
            parse("include \"other.inc\";").unwrap_err(),
            ParseError::UnresolvedInclude(_)
        ));
    }

    #[test]
    fn test_compound_assignment() {
        let program = parse("x += 2; y <<= 1; b[0] = 1;").unwrap();
        assert!(matches!(
            &program.statements[0],
            Statement::Assignment { op: AssignOp::Compound(BinaryOp::Add), .. }
        ));
        assert!(matches!(
            &program.statements[1],
            Statement::Assignment { op: AssignOp::Compound(BinaryOp::LShift), .. }
        ));
        assert!(matches!(
            &program.statements[2],
            Statement::Assignment { target: Expression::Index { .. }, .. }
        ));
    }

    #[test]
    fn test_measure_forms() {
        let program = parse("measure q; measure q -> c; c = measure q;").unwrap();
        assert!(matches!(&program.statements[0], Statement::Measure { target: None, .. }));
        assert!(matches!(
            &program.statements[1],
            Statement::Measure { target: Some(_), .. }
        ));
        assert!(matches!(
            &program.statements[2],
            Statement::Assignment { value: Expression::Measure(_), .. }
        ));
    }

    #[test]
    fn test_for_loop_forms() {
        assert!(parse("for uint[8] i in [0:9] { x q; }").is_ok());
        assert!(parse("for (int i in {1, 2, 3}) x q;").is_ok());
    }

    #[test]
    fn test_switch() {
        let program =
            parse("switch (n) { case 0, 1 { x q; } case 2 { y q; } default { z q; } }").unwrap();
        match &program.statements[0] {
            Statement::Switch { cases, default, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(cases[0].labels.len(), 2);
                assert!(default.is_some());
            }
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn test_function_def_with_array_ref() {
        let source = "def sum(readonly array[int[8], #dim = 1] xs) -> int[8] { return xs[0]; }";
        let program = parse(source).unwrap();
        match &program.statements[0] {
            Statement::FunctionDef { args, return_type, .. } => {
                assert_eq!(args.len(), 1);
                assert!(matches!(
                    &args[0],
                    FunctionArg::Classical {
                        ty: TypeAnnotation::ArrayReference { mutable: false, num_dims: 1, .. },
                        ..
                    }
                ));
                assert!(return_type.is_some());
            }
            other => panic!("expected function def, got {other:?}"),
        }
    }

    #[test]
    fn test_function_call_statement() {
        let program = parse("flip(0);").unwrap();
        assert!(matches!(
            &program.statements[0],
            Statement::Expr(Expression::Call { .. })
        ));
    }
}
