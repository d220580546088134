use crate::ir::spaces;
use crate::ir::Construct;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::Symbol;
use crate::ir::Type;
use std::fmt::Display;
use std::fmt::Formatter;

/// A local variable declaration.
///
/// The declared type is kept next to the symbol so that rewriting can change
/// the runtime extents of a variable-length array without creating a new
/// symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    pub symbol: Symbol,
    pub typ: Type,
    pub init: Option<ExprRef>,
}

impl VarDecl {
    pub fn new(symbol: &Symbol, init: Option<ExprRef>) -> Self {
        Self {
            symbol: symbol.clone(),
            typ: symbol.typ().clone(),
            init,
        }
    }
}

impl Display for VarDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.typ.declare(self.symbol.name()))?;
        if let Some(init) = &self.init {
            write!(f, " = {init}")?;
        }
        write!(f, ";")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Expr(ExprRef),
    Decl(VarDecl),
    Compound(Vec<Stmt>),
    If {
        cond: ExprRef,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<ExprRef>,
        step: Option<ExprRef>,
        body: Box<Stmt>,
    },
    While {
        cond: ExprRef,
        body: Box<Stmt>,
    },
    Return(Option<ExprRef>),
    Break,
    Continue,
    Construct(Box<Construct>),
    Comment(String),
    Empty,
}

impl Stmt {
    pub fn expr(expr: Expr) -> Stmt {
        Stmt::Expr(std::sync::Arc::new(expr))
    }
    fn display_branch(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        match self {
            Stmt::Compound(_) => {
                write!(f, " ")?;
                self.display(f, indent)
            }
            _ => {
                write!(f, "\n{}", spaces(indent + 1))?;
                self.display(f, indent + 1)
            }
        }
    }
    /// Print the statement; the caller has already written the indentation
    /// of the first line.
    pub fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        match self {
            Stmt::Expr(expr) => write!(f, "{expr};"),
            Stmt::Decl(decl) => write!(f, "{decl}"),
            Stmt::Compound(stmts) => {
                writeln!(f, "{{")?;
                for stmt in stmts {
                    write!(f, "{}", spaces(indent + 1))?;
                    stmt.display(f, indent + 1)?;
                    writeln!(f)?;
                }
                write!(f, "{}}}", spaces(indent))
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                write!(f, "if ({cond})")?;
                then.display_branch(f, indent)?;
                if let Some(otherwise) = otherwise {
                    if matches!(**then, Stmt::Compound(_)) {
                        write!(f, " else")?;
                    } else {
                        write!(f, "\n{}else", spaces(indent))?;
                    }
                    if matches!(**otherwise, Stmt::If { .. }) {
                        write!(f, " ")?;
                        otherwise.display(f, indent)?;
                    } else {
                        otherwise.display_branch(f, indent)?;
                    }
                }
                Ok(())
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                write!(f, "for (")?;
                match init {
                    Some(init) => init.display(f, indent)?,
                    None => write!(f, ";")?,
                }
                if let Some(cond) = cond {
                    write!(f, " {cond}")?;
                }
                write!(f, ";")?;
                if let Some(step) = step {
                    write!(f, " {step}")?;
                }
                write!(f, ")")?;
                body.display_branch(f, indent)
            }
            Stmt::While { cond, body } => {
                write!(f, "while ({cond})")?;
                body.display_branch(f, indent)
            }
            Stmt::Return(Some(expr)) => write!(f, "return {expr};"),
            Stmt::Return(None) => write!(f, "return;"),
            Stmt::Break => write!(f, "break;"),
            Stmt::Continue => write!(f, "continue;"),
            Stmt::Construct(construct) => construct.display(f, indent),
            Stmt::Comment(text) => write!(f, "/* {text} */"),
            Stmt::Empty => write!(f, ";"),
        }
    }
    /// Visit every expression in the statement, including the runtime
    /// extents of declared types.
    pub fn walk_exprs(&self, visit: &mut dyn FnMut(&Expr)) {
        match self {
            Stmt::Expr(expr) | Stmt::Return(Some(expr)) => expr.walk(visit),
            Stmt::Decl(decl) => {
                for size in decl.typ.vla_sizes() {
                    size.walk(visit);
                }
                if let Some(init) = &decl.init {
                    init.walk(visit);
                }
            }
            Stmt::Compound(stmts) => {
                for stmt in stmts {
                    stmt.walk_exprs(visit);
                }
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                cond.walk(visit);
                then.walk_exprs(visit);
                if let Some(otherwise) = otherwise {
                    otherwise.walk_exprs(visit);
                }
            }
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    init.walk_exprs(visit);
                }
                if let Some(cond) = cond {
                    cond.walk(visit);
                }
                if let Some(step) = step {
                    step.walk(visit);
                }
                body.walk_exprs(visit);
            }
            Stmt::While { cond, body } => {
                cond.walk(visit);
                body.walk_exprs(visit);
            }
            Stmt::Construct(construct) => construct.walk_exprs(visit),
            Stmt::Return(None) | Stmt::Break | Stmt::Continue | Stmt::Comment(_) | Stmt::Empty => {}
        }
    }
    /// Symbols declared anywhere inside the statement.
    pub fn declared_symbols(&self) -> Vec<Symbol> {
        let mut symbols = vec![];
        self.collect_declared(&mut symbols);
        symbols
    }
    fn collect_declared(&self, symbols: &mut Vec<Symbol>) {
        match self {
            Stmt::Decl(decl) => symbols.push(decl.symbol.clone()),
            Stmt::Compound(stmts) => {
                for stmt in stmts {
                    stmt.collect_declared(symbols);
                }
            }
            Stmt::If {
                then, otherwise, ..
            } => {
                then.collect_declared(symbols);
                if let Some(otherwise) = otherwise {
                    otherwise.collect_declared(symbols);
                }
            }
            Stmt::For { init, body, .. } => {
                if let Some(init) = init {
                    init.collect_declared(symbols);
                }
                body.collect_declared(symbols);
            }
            Stmt::While { body, .. } => body.collect_declared(symbols),
            Stmt::Construct(construct) => match construct.as_ref() {
                Construct::Task(directive) | Construct::Parallel(directive) => {
                    directive.body.collect_declared(symbols)
                }
                Construct::DeferredCall(_) => (),
            },
            _ => (),
        }
    }
}

impl Construct {
    fn walk_exprs(&self, visit: &mut dyn FnMut(&Expr)) {
        match self {
            Construct::Task(directive) | Construct::Parallel(directive) => {
                directive.body.walk_exprs(visit)
            }
            Construct::DeferredCall(call) => {
                for arg in &call.args {
                    arg.value.walk(visit);
                }
            }
        }
    }
}

impl Display for Stmt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f, 0)
    }
}
