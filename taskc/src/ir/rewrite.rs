use crate::ir::Argument;
use crate::ir::ArraySize;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::Stmt;
use crate::ir::Symbol;
use crate::ir::SymbolId;
use crate::ir::Type;
use crate::ir::VarDecl;
use std::collections::HashMap;
use std::sync::Arc;

/// A bottom-up rewrite of expression trees.
///
/// Leaves that reference a mapped symbol are replaced wholesale, and so are
/// subtrees that are structurally equal to a mapped expression. All other
/// nodes are rebuilt only when one of their children changed; untouched
/// subtrees are returned as the same [Arc].
#[derive(Clone, Debug, Default)]
pub struct Substitution {
    symbols: HashMap<SymbolId, ExprRef>,
    exprs: Vec<(ExprRef, ExprRef)>,
}

fn same(a: &ExprRef, b: &ExprRef) -> bool {
    Arc::ptr_eq(a, b)
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.exprs.is_empty()
    }
    pub fn map_symbol(&mut self, from: &Symbol, to: ExprRef) {
        self.symbols.insert(from.id(), to);
    }
    pub fn map_expr(&mut self, from: ExprRef, to: ExprRef) {
        self.exprs.push((from, to));
    }
    pub fn get(&self, symbol: &Symbol) -> Option<&ExprRef> {
        self.symbols.get(&symbol.id())
    }
    fn apply_opt(&self, expr: &Option<ExprRef>) -> Option<ExprRef> {
        expr.as_ref().map(|expr| self.apply(expr))
    }
    pub fn apply(&self, expr: &ExprRef) -> ExprRef {
        if let Some((_, to)) = self.exprs.iter().find(|(from, _)| **from == **expr) {
            return to.clone();
        }
        match expr.as_ref() {
            Expr::Int(_)
            | Expr::Float(_)
            | Expr::Str(_)
            | Expr::Char(_)
            | Expr::Name(_) => expr.clone(),
            Expr::Symbol(symbol) => match self.get(symbol) {
                Some(to) => to.clone(),
                None => expr.clone(),
            },
            Expr::Unary { op, operand } => {
                let new = self.apply(operand);
                if same(&new, operand) {
                    return expr.clone();
                }
                Arc::new(Expr::Unary {
                    op: *op,
                    operand: new,
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let (l, r) = (self.apply(lhs), self.apply(rhs));
                if same(&l, lhs) && same(&r, rhs) {
                    return expr.clone();
                }
                Arc::new(Expr::Binary {
                    op: *op,
                    lhs: l,
                    rhs: r,
                })
            }
            Expr::Assign { op, lhs, rhs } => {
                let (l, r) = (self.apply(lhs), self.apply(rhs));
                if same(&l, lhs) && same(&r, rhs) {
                    return expr.clone();
                }
                Arc::new(Expr::Assign {
                    op: *op,
                    lhs: l,
                    rhs: r,
                })
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let (c, t, o) = (self.apply(cond), self.apply(then), self.apply(otherwise));
                if same(&c, cond) && same(&t, then) && same(&o, otherwise) {
                    return expr.clone();
                }
                Arc::new(Expr::Conditional {
                    cond: c,
                    then: t,
                    otherwise: o,
                })
            }
            Expr::Subscript { base, index } => {
                let (b, i) = (self.apply(base), self.apply(index));
                if same(&b, base) && same(&i, index) {
                    return expr.clone();
                }
                Arc::new(Expr::Subscript { base: b, index: i })
            }
            Expr::Section {
                base,
                lower,
                length,
            } => {
                let b = self.apply(base);
                let l = self.apply_opt(lower);
                let n = self.apply_opt(length);
                let unchanged = |new: &Option<ExprRef>, old: &Option<ExprRef>| match (new, old) {
                    (Some(new), Some(old)) => same(new, old),
                    _ => true,
                };
                if same(&b, base) && unchanged(&l, lower) && unchanged(&n, length) {
                    return expr.clone();
                }
                Arc::new(Expr::Section {
                    base: b,
                    lower: l,
                    length: n,
                })
            }
            Expr::Member { base, field, arrow } => {
                let b = self.apply(base);
                if same(&b, base) {
                    return expr.clone();
                }
                Arc::new(Expr::Member {
                    base: b,
                    field: field.clone(),
                    arrow: *arrow,
                })
            }
            Expr::Call { callee, args } => {
                let c = self.apply(callee);
                let new_args = args
                    .iter()
                    .map(|arg| Argument {
                        keyword: arg.keyword.clone(),
                        value: self.apply(&arg.value),
                    })
                    .collect::<Vec<Argument>>();
                let unchanged = same(&c, callee)
                    && new_args
                        .iter()
                        .zip(args)
                        .all(|(new, old)| same(&new.value, &old.value));
                if unchanged {
                    return expr.clone();
                }
                Arc::new(Expr::Call {
                    callee: c,
                    args: new_args,
                })
            }
            Expr::Cast { typ, operand } => {
                let (t, o) = (self.apply_type(typ), self.apply(operand));
                if t == *typ && same(&o, operand) {
                    return expr.clone();
                }
                Arc::new(Expr::Cast { typ: t, operand: o })
            }
            Expr::SizeofType(typ) => {
                let t = self.apply_type(typ);
                if t == *typ {
                    return expr.clone();
                }
                Arc::new(Expr::SizeofType(t))
            }
            Expr::SizeofExpr(inner) => {
                let new = self.apply(inner);
                if same(&new, inner) {
                    return expr.clone();
                }
                Arc::new(Expr::SizeofExpr(new))
            }
            Expr::AlignofType(typ) => {
                let t = self.apply_type(typ);
                if t == *typ {
                    return expr.clone();
                }
                Arc::new(Expr::AlignofType(t))
            }
            Expr::Init(items) => {
                let new = items.iter().map(|item| self.apply(item)).collect::<Vec<_>>();
                if new.iter().zip(items).all(|(new, old)| same(new, old)) {
                    return expr.clone();
                }
                Arc::new(Expr::Init(new))
            }
        }
    }
    /// Rewrite the runtime extents inside a type.
    pub fn apply_type(&self, typ: &Type) -> Type {
        match typ {
            Type::Pointer(pointee) => self.apply_type(pointee).pointer(),
            Type::Array { element, size } => {
                let size = match size {
                    ArraySize::Variable(expr) => ArraySize::Variable(self.apply(expr)),
                    size => size.clone(),
                };
                self.apply_type(element).array(size)
            }
            Type::Function { ret, params } => Type::Function {
                ret: Box::new(self.apply_type(ret)),
                params: params.iter().map(|param| self.apply_type(param)).collect(),
            },
            _ => typ.clone(),
        }
    }
    pub fn apply_stmt(&self, stmt: &Stmt) -> Stmt {
        let boxed = |stmt: &Stmt| Box::new(self.apply_stmt(stmt));
        match stmt {
            Stmt::Expr(expr) => Stmt::Expr(self.apply(expr)),
            Stmt::Decl(decl) => Stmt::Decl(VarDecl {
                symbol: decl.symbol.clone(),
                typ: self.apply_type(&decl.typ),
                init: self.apply_opt(&decl.init),
            }),
            Stmt::Compound(stmts) => {
                Stmt::Compound(stmts.iter().map(|stmt| self.apply_stmt(stmt)).collect())
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => Stmt::If {
                cond: self.apply(cond),
                then: boxed(then),
                otherwise: otherwise.as_ref().map(|stmt| boxed(stmt)),
            },
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => Stmt::For {
                init: init.as_ref().map(|stmt| boxed(stmt)),
                cond: self.apply_opt(cond),
                step: self.apply_opt(step),
                body: boxed(body),
            },
            Stmt::While { cond, body } => Stmt::While {
                cond: self.apply(cond),
                body: boxed(body),
            },
            Stmt::Return(expr) => Stmt::Return(self.apply_opt(expr)),
            // Constructs are lowered before their enclosing construct is
            // outlined, so none are left at this point.
            Stmt::Construct(_)
            | Stmt::Break
            | Stmt::Continue
            | Stmt::Comment(_)
            | Stmt::Empty => stmt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinaryOp;
    use crate::ir::Primitive;
    use crate::ir::SymbolKind;
    use crate::ir::SymbolTable;

    #[test]
    fn test_unchanged_is_shared() {
        let mut table = SymbolTable::new();
        let int = Type::Primitive(Primitive::Int);
        let n = table.new_symbol("n", int.clone(), SymbolKind::Parameter);
        let m = table.new_symbol("m", int, SymbolKind::Local);
        let expr = Arc::new(Expr::Binary {
            op: BinaryOp::Add,
            lhs: Arc::new(Expr::Symbol(m.clone())),
            rhs: Arc::new(Expr::Int(1)),
        });
        let mut subst = Substitution::new();
        subst.map_symbol(&n, Arc::new(Expr::Int(10)));
        let result = subst.apply(&expr);
        assert!(Arc::ptr_eq(&result, &expr));
    }

    #[test]
    fn test_structural() {
        let mut table = SymbolTable::new();
        let int = Type::Primitive(Primitive::Int);
        let s = table.new_symbol("s", int, SymbolKind::Local);
        let member = |s: &Symbol| {
            Arc::new(Expr::Member {
                base: Arc::new(Expr::Symbol(s.clone())),
                field: "x".to_string(),
                arrow: false,
            })
        };
        let mut subst = Substitution::new();
        let to = Arc::new(Expr::Name("p".to_string()));
        subst.map_expr(member(&s), to.clone());
        // A different allocation of the same tree still matches.
        let expr = Arc::new(Expr::Assign {
            op: None,
            lhs: member(&s),
            rhs: Arc::new(Expr::Int(1)),
        });
        let result = subst.apply(&expr);
        assert_eq!(result.to_string(), "p = 1");
    }
}
