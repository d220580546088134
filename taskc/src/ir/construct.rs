use crate::frontend::Location;
use crate::ir::Argument;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::Stmt;
use crate::ir::Symbol;
use bitflags::bitflags;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

bitflags! {
    /// Read/write intent of a dependency.
    ///
    /// The empty set means no dependency.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Directionality: u8 {
        const IN = 1 << 0;
        const OUT = 1 << 1;
        const INOUT = Self::IN.bits() | Self::OUT.bits();
        const CONCURRENT = 1 << 2;
    }
}

impl Directionality {
    pub fn clause_name(&self) -> &'static str {
        if self.contains(Directionality::CONCURRENT) {
            "concurrent"
        } else if self.contains(Directionality::INOUT) {
            "inout"
        } else if self.contains(Directionality::OUT) {
            "out"
        } else {
            "in"
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClauseKind {
    Shared(Vec<Symbol>),
    Private(Vec<Symbol>),
    Firstprivate(Vec<Symbol>),
    Depend {
        directionality: Directionality,
        exprs: Vec<ExprRef>,
    },
    Reduction {
        operator: String,
        symbols: Vec<Symbol>,
    },
    If(ExprRef),
    Final(ExprRef),
    Untied,
    Priority(ExprRef),
    NumThreads(ExprRef),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub loc: Location,
}

fn join<T: Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ClauseKind::Shared(symbols) => write!(f, "shared({})", join(symbols)),
            ClauseKind::Private(symbols) => write!(f, "private({})", join(symbols)),
            ClauseKind::Firstprivate(symbols) => write!(f, "firstprivate({})", join(symbols)),
            ClauseKind::Depend {
                directionality,
                exprs,
            } => {
                if directionality.contains(Directionality::CONCURRENT) {
                    write!(f, "concurrent({})", join(exprs))
                } else {
                    write!(f, "depend({}: {})", directionality.clause_name(), join(exprs))
                }
            }
            ClauseKind::Reduction { operator, symbols } => {
                write!(f, "reduction({operator}: {})", join(symbols))
            }
            ClauseKind::If(expr) => write!(f, "if({expr})"),
            ClauseKind::Final(expr) => write!(f, "final({expr})"),
            ClauseKind::Untied => write!(f, "untied"),
            ClauseKind::Priority(expr) => write!(f, "priority({expr})"),
            ClauseKind::NumThreads(expr) => write!(f, "num_threads({expr})"),
        }
    }
}

fn write_clauses(f: &mut Formatter<'_>, clauses: &[Clause]) -> std::fmt::Result {
    for clause in clauses {
        write!(f, " {clause}")?;
    }
    Ok(())
}

/// A `#pragma omp task` or `#pragma omp parallel` and the statement it
/// annotates.
#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    pub clauses: Vec<Clause>,
    pub body: Stmt,
    pub loc: Location,
}

/// A function whose declaration is annotated with `#pragma omp task`.
///
/// The clauses name the function's parameters. Every call to the function is
/// a [DeferredCall].
#[derive(Clone, Debug, PartialEq)]
pub struct TaskFunction {
    pub function: Symbol,
    pub params: Vec<Symbol>,
    pub clauses: Vec<Clause>,
    pub loc: Location,
}

impl Display for TaskFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#pragma omp task")?;
        write_clauses(f, &self.clauses)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeferredCall {
    pub task: Arc<TaskFunction>,
    pub args: Vec<Argument>,
    pub loc: Location,
}

impl DeferredCall {
    pub fn call(&self) -> Expr {
        Expr::Call {
            callee: Arc::new(Expr::Symbol(self.task.function.clone())),
            args: self.args.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Construct {
    Task(Directive),
    Parallel(Directive),
    DeferredCall(DeferredCall),
}

impl Construct {
    pub fn name(&self) -> &'static str {
        match self {
            Construct::Task(_) => "task",
            Construct::Parallel(_) => "parallel",
            Construct::DeferredCall(_) => "deferred call",
        }
    }
    pub fn loc(&self) -> Location {
        match self {
            Construct::Task(directive) | Construct::Parallel(directive) => directive.loc,
            Construct::DeferredCall(call) => call.loc,
        }
    }
    pub fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        match self {
            Construct::Task(directive) | Construct::Parallel(directive) => {
                write!(f, "#pragma omp {}", self.name())?;
                write_clauses(f, &directive.clauses)?;
                writeln!(f)?;
                write!(f, "{}", crate::ir::spaces(indent))?;
                directive.body.display(f, indent)
            }
            Construct::DeferredCall(call) => write!(f, "{};", call.call()),
        }
    }
}
