use crate::frontend::parser::Parser;
use crate::frontend::token::Token;
use crate::frontend::token::TokenKind;
use crate::ir::Argument;
use crate::ir::BinaryOp;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::UnaryOp;
use anyhow::Result;
use std::sync::Arc;

fn binary_op(token: &Token) -> Option<BinaryOp> {
    match token.kind {
        TokenKind::Star
        | TokenKind::Slash
        | TokenKind::Percent
        | TokenKind::Plus
        | TokenKind::Minus
        | TokenKind::LessLess
        | TokenKind::GreaterGreater
        | TokenKind::Less
        | TokenKind::LessEqual
        | TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::EqualEqual
        | TokenKind::NotEqual
        | TokenKind::Amp
        | TokenKind::Caret
        | TokenKind::Pipe
        | TokenKind::AmpAmp
        | TokenKind::PipePipe => BinaryOp::from_symbol(&token.lexeme),
        _ => None,
    }
}

fn unary_op(kind: TokenKind) -> Option<UnaryOp> {
    let op = match kind {
        TokenKind::Minus => UnaryOp::Neg,
        TokenKind::Plus => UnaryOp::Plus,
        TokenKind::Exclamation => UnaryOp::Not,
        TokenKind::Tilde => UnaryOp::BitNot,
        TokenKind::Amp => UnaryOp::AddrOf,
        TokenKind::Star => UnaryOp::Deref,
        TokenKind::PlusPlus => UnaryOp::PreInc,
        TokenKind::MinusMinus => UnaryOp::PreDec,
        _ => return None,
    };
    Some(op)
}

/// Parse `42`, `10u` or `7UL`.
fn integer(lexeme: &str) -> Option<i64> {
    lexeme
        .trim_end_matches(&['u', 'U', 'l', 'L'][..])
        .parse::<i64>()
        .ok()
}

impl Parser {
    /// Parse an assignment expression.
    pub(super) fn expression(&mut self) -> Result<ExprRef> {
        let lhs = self.conditional()?;
        if self.matches(TokenKind::Equal) {
            let rhs = self.expression()?;
            return Ok(Arc::new(Expr::Assign { op: None, lhs, rhs }));
        }
        if self.check(TokenKind::CompoundAssign) {
            let token = self.advance().clone();
            let op = BinaryOp::from_symbol(token.lexeme.trim_end_matches('='));
            let op = match op {
                Some(op) => op,
                None => return self.fail(&token, "Unknown assignment operator"),
            };
            let rhs = self.expression()?;
            return Ok(Arc::new(Expr::Assign {
                op: Some(op),
                lhs,
                rhs,
            }));
        }
        Ok(lhs)
    }
    fn conditional(&mut self) -> Result<ExprRef> {
        let cond = self.binary(BinaryOp::Or.precedence())?;
        if !self.matches(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.expression()?;
        self.expect(TokenKind::Colon)?;
        let otherwise = self.conditional()?;
        Ok(Arc::new(Expr::Conditional {
            cond,
            then,
            otherwise,
        }))
    }
    /// Precedence climbing over the binary operators.
    fn binary(&mut self, min: u8) -> Result<ExprRef> {
        let mut lhs = self.unary()?;
        loop {
            let op = match binary_op(self.peek()) {
                Some(op) if op.precedence() >= min => op,
                _ => break,
            };
            self.advance();
            let rhs = self.binary(op.precedence() + 1)?;
            lhs = Arc::new(Expr::Binary { op, lhs, rhs });
        }
        Ok(lhs)
    }
    fn unary(&mut self) -> Result<ExprRef> {
        let token = self.peek().clone();
        if let Some(op) = unary_op(token.kind) {
            self.advance();
            let operand = self.unary()?;
            if let (UnaryOp::Neg, Expr::Int(value)) = (op, operand.as_ref()) {
                return Ok(Arc::new(Expr::Int(-value)));
            }
            return Ok(Arc::new(Expr::Unary { op, operand }));
        }
        if token.is_identifier("sizeof") {
            self.advance();
            if self.check(TokenKind::LParen) && self.is_type_start(self.peek_n(1)) {
                self.advance();
                let typ = self.type_name()?;
                self.expect(TokenKind::RParen)?;
                return Ok(Arc::new(Expr::SizeofType(typ)));
            }
            let operand = self.unary()?;
            return Ok(Arc::new(Expr::SizeofExpr(operand)));
        }
        if token.is_identifier("__alignof__") || token.is_identifier("_Alignof") {
            self.advance();
            self.expect(TokenKind::LParen)?;
            let typ = self.type_name()?;
            self.expect(TokenKind::RParen)?;
            return Ok(Arc::new(Expr::AlignofType(typ)));
        }
        if token.kind == TokenKind::LParen && self.is_type_start(self.peek_n(1)) {
            self.advance();
            let typ = self.type_name()?;
            self.expect(TokenKind::RParen)?;
            if self.check(TokenKind::LBrace) {
                return self.fail(self.peek(), "Compound literals are not supported");
            }
            let operand = self.unary()?;
            return Ok(Arc::new(Expr::Cast { typ, operand }));
        }
        self.postfix()
    }
    fn postfix(&mut self) -> Result<ExprRef> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(TokenKind::LBracket) {
                expr = self.subscript(expr)?;
            } else if self.matches(TokenKind::LParen) {
                let args = self.arguments()?;
                expr = Arc::new(Expr::Call { callee: expr, args });
            } else if self.check(TokenKind::Dot) || self.check(TokenKind::Arrow) {
                let arrow = self.advance().kind == TokenKind::Arrow;
                let field = self.expect(TokenKind::Identifier)?.lexeme;
                expr = Arc::new(Expr::Member {
                    base: expr,
                    field,
                    arrow,
                });
            } else if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
                let op = if self.advance().kind == TokenKind::PlusPlus {
                    UnaryOp::PostInc
                } else {
                    UnaryOp::PostDec
                };
                expr = Arc::new(Expr::Unary { op, operand: expr });
            } else {
                break;
            }
        }
        Ok(expr)
    }
    /// Parse `[i]` or an array section `[lower:length]` after its `[`.
    fn subscript(&mut self, base: ExprRef) -> Result<ExprRef> {
        let lower = if self.check(TokenKind::Colon) {
            None
        } else {
            Some(self.expression()?)
        };
        if self.matches(TokenKind::Colon) {
            let length = if self.check(TokenKind::RBracket) {
                None
            } else {
                Some(self.expression()?)
            };
            self.expect(TokenKind::RBracket)?;
            return Ok(Arc::new(Expr::Section {
                base,
                lower,
                length,
            }));
        }
        self.expect(TokenKind::RBracket)?;
        match lower {
            Some(index) => Ok(Arc::new(Expr::Subscript { base, index })),
            None => self.fail(self.previous(), "Expected an index"),
        }
    }
    /// Parse call arguments after the `(`; `.name = value` passes an
    /// argument by parameter name.
    fn arguments(&mut self) -> Result<Vec<Argument>> {
        let mut args = vec![];
        while !self.check(TokenKind::RParen) {
            let keyword = if self.check(TokenKind::Dot)
                && self.peek_n(1).kind == TokenKind::Identifier
                && self.peek_n(2).kind == TokenKind::Equal
            {
                self.advance();
                let name = self.advance().lexeme.clone();
                self.advance();
                Some(name)
            } else {
                None
            };
            let value = self.expression()?;
            args.push(Argument { keyword, value });
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }
    fn primary(&mut self) -> Result<ExprRef> {
        let token = self.peek().clone();
        let expr = match token.kind {
            TokenKind::Integer => match integer(&token.lexeme) {
                Some(value) => Expr::Int(value),
                None => return self.fail(&token, "Invalid integer literal"),
            },
            TokenKind::FloatLiteral => Expr::Float(token.lexeme.clone()),
            TokenKind::String => Expr::Str(token.lexeme.clone()),
            TokenKind::Character => Expr::Char(token.lexeme.clone()),
            TokenKind::Identifier => match self.lookup(&token.lexeme) {
                Some(symbol) => Expr::Symbol(symbol),
                None => Expr::Name(token.lexeme.clone()),
            },
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(TokenKind::RParen)?;
                return Ok(expr);
            }
            _ => return self.fail(&token, "Expected an expression"),
        };
        self.advance();
        Ok(Arc::new(expr))
    }
    /// An initializer: an expression or a brace-enclosed list.
    pub(super) fn initializer(&mut self) -> Result<ExprRef> {
        if !self.matches(TokenKind::LBrace) {
            return self.expression();
        }
        let mut items = vec![];
        while !self.check(TokenKind::RBrace) {
            items.push(self.initializer()?);
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Arc::new(Expr::Init(items)))
    }
}

#[cfg(test)]
mod tests {
    use crate::frontend::Parser;
    use crate::ir::Item;

    fn global_init(src: &str) -> String {
        let unit = Parser::parse(src).unwrap();
        match unit.items.last() {
            Some(Item::Global(global)) => global.init.as_ref().unwrap().to_string(),
            _ => panic!("expected a global"),
        }
    }

    #[test]
    fn test_precedence() {
        assert_eq!(global_init("int x = 1 + 2 * 3;"), "1 + 2 * 3");
        assert_eq!(global_init("int x = (1 + 2) * 3;"), "(1 + 2) * 3");
        assert_eq!(global_init("int x = 1 - (2 - 3);"), "1 - (2 - 3)");
        assert_eq!(global_init("int x = 1 < 2 && 3 ? 4 : 5;"), "1 < 2 && 3 ? 4 : 5");
        assert_eq!(global_init("long x = -1 + sizeof(int);"), "-1 + sizeof(int)");
        assert_eq!(global_init("int a[3] = {1, 2, 3,};"), "{1, 2, 3}");
    }

    #[test]
    fn test_sections() {
        let src = "float a[10][20];\nint n;\nfloat *p = &a[1:n][:];";
        assert_eq!(global_init(src), "&a[1:n][:]");
        let src = "float a[10];\nfloat *p = (float *) a;";
        assert_eq!(global_init(src), "(float *) a");
    }
}
