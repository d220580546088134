use crate::frontend::parser::Parser;
use crate::frontend::token::TokenKind;
use crate::ir::Clause;
use crate::ir::ClauseKind;
use crate::ir::Directionality;
use crate::ir::ExprRef;
use crate::ir::Symbol;
use anyhow::Result;

/// Map the dependency spellings, including the OmpSs ones, to their intent.
fn directionality(word: &str) -> Option<Directionality> {
    let directionality = match word {
        "in" | "input" => Directionality::IN,
        "out" | "output" => Directionality::OUT,
        "inout" => Directionality::INOUT,
        "concurrent" => Directionality::CONCURRENT,
        _ => return None,
    };
    Some(directionality)
}

impl Parser {
    /// Parse the clauses of a `#pragma omp` line, up to and including the
    /// end of the line.
    pub(super) fn clauses(&mut self) -> Result<Vec<Clause>> {
        let mut clauses = vec![];
        loop {
            self.matches(TokenKind::Comma);
            if self.check(TokenKind::PragmaEnd) || self.is_at_end() {
                break;
            }
            clauses.push(self.clause()?);
        }
        self.expect(TokenKind::PragmaEnd)?;
        Ok(clauses)
    }
    fn clause(&mut self) -> Result<Clause> {
        let token = self.expect(TokenKind::Identifier)?;
        let word = token.lexeme.as_str();
        let kind = match word {
            "shared" => ClauseKind::Shared(self.symbol_list()?),
            "private" => ClauseKind::Private(self.symbol_list()?),
            "firstprivate" => ClauseKind::Firstprivate(self.symbol_list()?),
            "depend" => {
                self.expect(TokenKind::LParen)?;
                let kind = self.expect(TokenKind::Identifier)?;
                let directionality = match directionality(&kind.lexeme) {
                    Some(directionality) if kind.lexeme != "concurrent" => directionality,
                    _ => return self.fail(&kind, "Expected `in`, `out` or `inout`"),
                };
                self.expect(TokenKind::Colon)?;
                let exprs = self.expression_list()?;
                ClauseKind::Depend {
                    directionality,
                    exprs,
                }
            }
            _ if directionality(word).is_some() => {
                let directionality = directionality(word).unwrap_or_default();
                self.expect(TokenKind::LParen)?;
                let exprs = self.expression_list()?;
                ClauseKind::Depend {
                    directionality,
                    exprs,
                }
            }
            "reduction" => {
                self.expect(TokenKind::LParen)?;
                let operator = self.advance().lexeme.clone();
                self.expect(TokenKind::Colon)?;
                let symbols = self.symbols_until_rparen()?;
                ClauseKind::Reduction { operator, symbols }
            }
            "if" => ClauseKind::If(self.parenthesized()?),
            "final" => ClauseKind::Final(self.parenthesized()?),
            "priority" => ClauseKind::Priority(self.parenthesized()?),
            "num_threads" => ClauseKind::NumThreads(self.parenthesized()?),
            "untied" => ClauseKind::Untied,
            _ => return self.fail(&token, "Unsupported clause"),
        };
        Ok(Clause {
            kind,
            loc: token.location,
        })
    }
    fn parenthesized(&mut self) -> Result<ExprRef> {
        self.expect(TokenKind::LParen)?;
        let expr = self.expression()?;
        self.expect(TokenKind::RParen)?;
        Ok(expr)
    }
    /// Comma-separated expressions up to and including the `)`.
    fn expression_list(&mut self) -> Result<Vec<ExprRef>> {
        let mut exprs = vec![self.expression()?];
        while self.matches(TokenKind::Comma) {
            exprs.push(self.expression()?);
        }
        self.expect(TokenKind::RParen)?;
        Ok(exprs)
    }
    fn symbol_list(&mut self) -> Result<Vec<Symbol>> {
        self.expect(TokenKind::LParen)?;
        self.symbols_until_rparen()
    }
    fn symbols_until_rparen(&mut self) -> Result<Vec<Symbol>> {
        let mut symbols = vec![];
        loop {
            let name = self.expect(TokenKind::Identifier)?;
            match self.lookup(&name.lexeme) {
                Some(symbol) => symbols.push(symbol),
                None => return self.fail(&name, "Unknown variable in clause"),
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use crate::frontend::Parser;
    use crate::ir::Construct;
    use crate::ir::Stmt;

    fn clauses(pragma: &str) -> String {
        let src = format!("void f(int n, int *p) {{\n  int x;\n  {pragma}\n  x = n;\n}}");
        let unit = Parser::parse(&src).unwrap();
        let body = &unit.functions().next().unwrap().body;
        match &body[1] {
            Stmt::Construct(construct) => match construct.as_ref() {
                Construct::Task(directive) | Construct::Parallel(directive) => directive
                    .clauses
                    .iter()
                    .map(|clause| clause.to_string())
                    .collect::<Vec<String>>()
                    .join(" "),
                Construct::DeferredCall(_) => panic!("expected a directive"),
            },
            _ => panic!("expected a construct"),
        }
    }

    #[test]
    fn test_clauses() {
        assert_eq!(
            clauses("#pragma omp task shared(x) firstprivate(n) untied"),
            "shared(x) firstprivate(n) untied"
        );
        assert_eq!(
            clauses("#pragma omp task inout(p[0:n]), concurrent(x) priority(n + 1)"),
            "depend(inout: p[0:n]) concurrent(x) priority(n + 1)"
        );
        assert_eq!(
            clauses("#pragma omp parallel if(n > 1) num_threads(4) reduction(+: x)"),
            "if(n > 1) num_threads(4) reduction(+: x)"
        );
    }

    #[test]
    fn test_unknown_clause() {
        let src = "void f(void) {\n  #pragma omp task bogus\n  ;\n}";
        let err = Parser::parse(src).unwrap_err().to_string();
        assert!(err.contains("Unsupported clause"));
    }
}
