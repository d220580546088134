//! Lowering of `task` and `parallel` constructs, and of calls to task
//! functions, into calls of a parallel runtime.
//!
//! Each construct is classified into an [OutlineInfo], given a capture
//! structure and an outlined function, and then replaced by a block that
//! fills the capture structure and hands it to the runtime. Nested constructs
//! are lowered before the construct that contains them.

mod call_site;
pub mod dependency;
mod kmp;
pub mod layout;
mod nanos;
mod outline;
pub mod outline_info;
pub mod strategy;

pub use call_site::parameters_info;
pub use call_site::rewrite_call;
pub use call_site::RewrittenCall;
pub use outline_info::classify;
pub use outline_info::ConstructKind;
pub use outline_info::DataItem;
pub use outline_info::OutlineInfo;
pub use outline_info::Sharing;
pub use strategy::RuntimeAbi;
pub use strategy::SerializationStrategy;

use crate::config::LowerOptions;
use crate::config::Runtime;
use crate::diagnostic::Diagnostics;
use crate::frontend::Location;
use crate::ir::spaces;
use crate::ir::Clause;
use crate::ir::ClauseKind;
use crate::ir::Construct;
use crate::ir::DeferredCall;
use crate::ir::Directive;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::FunctionDecl;
use crate::ir::FunctionDef;
use crate::ir::Item;
use crate::ir::Stmt;
use crate::ir::Symbol;
use crate::ir::SymbolKind;
use crate::ir::SymbolTable;
use crate::ir::TranslationUnit;
use crate::ir::Type;
use crate::shared::SharedExt;
use anyhow::Result;
use std::collections::HashSet;
use tracing::debug;

pub enum RewriteResult<T> {
    Changed(T),
    Unchanged,
}

impl<T> RewriteResult<T> {
    pub fn is_changed(&self) -> Option<&T> {
        match self {
            RewriteResult::Changed(value) => Some(value),
            RewriteResult::Unchanged => None,
        }
    }
}

/// A rewrite that replaces one construct by the statement that lowers it.
pub trait Rewrite: Send + Sync {
    fn name(&self) -> &'static str;
    fn is_match(&self, construct: &Construct) -> Result<bool>;
    fn rewrite(
        &self,
        cx: &mut LoweringContext,
        construct: &Construct,
    ) -> Result<RewriteResult<Stmt>>;
}

/// A pass over a whole translation unit, selected on the command line by
/// its [Pass::NAME].
pub trait Pass {
    const NAME: &'static str;
    fn convert(unit: &mut TranslationUnit, options: &LowerOptions) -> Result<RewriteResult<()>>;
}

/// State that lowering threads through one translation unit.
///
/// Generated file-scope items are collected here and inserted before the
/// function that is being lowered.
pub struct LoweringContext<'a> {
    unit: &'a mut TranslationUnit,
    strategy: SerializationStrategy,
    function: String,
    tags: HashSet<String>,
    generated: Vec<Item>,
    lowered: usize,
}

impl<'a> LoweringContext<'a> {
    pub fn new(unit: &'a mut TranslationUnit, strategy: SerializationStrategy) -> Self {
        let tags = unit
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Struct(def) => Some(def.tag.clone()),
                _ => None,
            })
            .collect();
        Self {
            unit,
            strategy,
            function: String::new(),
            tags,
            generated: vec![],
            lowered: 0,
        }
    }
    pub fn strategy(&self) -> &SerializationStrategy {
        &self.strategy
    }
    /// Name of the function that contains the constructs being lowered.
    pub fn function(&self) -> &str {
        &self.function
    }
    pub fn set_function(&mut self, name: &str) {
        self.function = name.to_string();
    }
    pub fn symbols(&mut self) -> &mut SymbolTable {
        &mut self.unit.symbols
    }
    pub fn diagnostics(&mut self) -> &mut Diagnostics {
        &mut self.unit.diagnostics
    }
    fn is_taken(&self, name: &str) -> bool {
        self.tags.contains(name) || self.unit.global.rd().contains(name)
    }
    /// `<prefix>_<n><suffix>` for the next `n` of `prefix` whose name is
    /// free at file scope.
    pub fn fresh(&mut self, prefix: &str, suffix: &str) -> String {
        loop {
            let n = self.unit.counters.next(prefix);
            let name = format!("{prefix}_{n}{suffix}");
            if !self.is_taken(&name) {
                return name;
            }
        }
    }
    pub fn unique_name(&mut self, prefix: &str) -> String {
        self.fresh(prefix, "")
    }
    /// Declare a file-scope symbol so that later lowering does not reuse
    /// its name.
    pub fn declare(&mut self, name: &str, typ: Type, kind: SymbolKind) -> Symbol {
        let symbol = self.unit.symbols.new_symbol(name, typ, kind);
        self.unit.global.wr().insert(symbol.clone());
        symbol
    }
    /// Add a generated item before the current function.
    pub fn emit(&mut self, item: Item) {
        if let Item::Struct(def) = &item {
            self.tags.insert(def.tag.clone());
        }
        self.generated.push(item);
    }
    /// Define a static outlined function before the current function.
    pub fn define_outline(
        &mut self,
        name: &str,
        ret: Type,
        params: Vec<Symbol>,
        body: Vec<Stmt>,
    ) -> Symbol {
        let typ = Type::Function {
            ret: Box::new(ret.clone()),
            params: params.iter().map(|param| param.typ().clone()).collect(),
        };
        let symbol = self.declare(name, typ, SymbolKind::Function);
        let decl = FunctionDecl {
            symbol: symbol.clone(),
            ret,
            params,
            is_static: true,
            task: None,
        };
        self.emit(Item::Function(FunctionDef { decl, body }));
        symbol
    }
    fn take_generated(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.generated)
    }
    /// Classify a directive after dropping the clauses that do not apply
    /// to its kind.
    fn parts(&mut self, kind: ConstructKind, directive: &Directive) -> ConstructParts {
        let clauses = placed_clauses(kind, &directive.clauses, self.diagnostics());
        let info = classify(kind, &clauses, &directive.body, self.diagnostics());
        ConstructParts::new(kind, info, clauses, directive.body.clone(), directive.loc)
    }
}

fn placed_clauses(kind: ConstructKind, clauses: &[Clause], diagnostics: &mut Diagnostics) -> Vec<Clause> {
    let mut placed = vec![];
    for clause in clauses {
        let misplaced = match (&clause.kind, kind) {
            (ClauseKind::NumThreads(_), ConstructKind::Task) => Some("num_threads"),
            (ClauseKind::Final(_), ConstructKind::Parallel) => Some("final"),
            (ClauseKind::Priority(_), ConstructKind::Parallel) => Some("priority"),
            (ClauseKind::Untied, ConstructKind::Parallel) => Some("untied"),
            _ => None,
        };
        match misplaced {
            Some(name) => {
                let msg = format!(
                    "`{name}` does not apply to a {} construct; the clause is ignored",
                    kind.name()
                );
                diagnostics.warning(clause.loc, &msg);
            }
            None => placed.push(clause.clone()),
        }
    }
    placed
}

/// A classified construct, ready to be emitted for one runtime.
pub struct ConstructParts {
    pub kind: ConstructKind,
    pub info: OutlineInfo,
    pub clauses: Vec<Clause>,
    pub body: Stmt,
    pub loc: Location,
    /// Names the construct refers to; generated locals avoid them.
    reserved: HashSet<String>,
}

impl ConstructParts {
    pub fn new(
        kind: ConstructKind,
        info: OutlineInfo,
        clauses: Vec<Clause>,
        body: Stmt,
        loc: Location,
    ) -> Self {
        let mut reserved: HashSet<String> = info
            .iter()
            .map(|item| item.symbol.name().to_string())
            .collect();
        for symbol in body.declared_symbols() {
            reserved.insert(symbol.name().to_string());
        }
        let mut collect = |e: &Expr| {
            if let Expr::Symbol(symbol) = e {
                reserved.insert(symbol.name().to_string());
            }
        };
        body.walk_exprs(&mut collect);
        for clause in &clauses {
            for expr in clause_exprs(clause) {
                expr.walk(&mut collect);
            }
        }
        Self {
            kind,
            info,
            clauses,
            body,
            loc,
            reserved,
        }
    }
    fn clause(&self, select: impl Fn(&ClauseKind) -> Option<&ExprRef>) -> Option<ExprRef> {
        self.clauses
            .iter()
            .find_map(|clause| select(&clause.kind))
            .cloned()
    }
    pub fn if_condition(&self) -> Option<ExprRef> {
        self.clause(|kind| match kind {
            ClauseKind::If(expr) => Some(expr),
            _ => None,
        })
    }
    pub fn final_condition(&self) -> Option<ExprRef> {
        self.clause(|kind| match kind {
            ClauseKind::Final(expr) => Some(expr),
            _ => None,
        })
    }
    pub fn priority(&self) -> Option<ExprRef> {
        self.clause(|kind| match kind {
            ClauseKind::Priority(expr) => Some(expr),
            _ => None,
        })
    }
    pub fn num_threads(&self) -> Option<ExprRef> {
        self.clause(|kind| match kind {
            ClauseKind::NumThreads(expr) => Some(expr),
            _ => None,
        })
    }
    pub fn is_untied(&self) -> bool {
        self.clauses
            .iter()
            .any(|clause| clause.kind == ClauseKind::Untied)
    }
    /// A generated local called `name`, or `name_<k>` when the construct
    /// already refers to something called `name`.
    pub fn local(&self, symbols: &mut SymbolTable, name: &str, typ: Type) -> Symbol {
        self.locals(symbols).local(name, typ)
    }
    pub fn locals<'a>(&'a self, symbols: &'a mut SymbolTable) -> Locals<'a> {
        Locals::new(symbols, &self.reserved)
    }
}

/// Declares generated locals under names that a construct does not use.
pub struct Locals<'a> {
    symbols: &'a mut SymbolTable,
    reserved: &'a HashSet<String>,
}

impl<'a> Locals<'a> {
    pub fn new(symbols: &'a mut SymbolTable, reserved: &'a HashSet<String>) -> Self {
        Self { symbols, reserved }
    }
    pub fn local(&mut self, name: &str, typ: Type) -> Symbol {
        let mut candidate = name.to_string();
        let mut suffix = 1;
        while self.reserved.contains(&candidate) {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }
        self.symbols.new_symbol(&candidate, typ, SymbolKind::Synthetic)
    }
}

fn clause_exprs(clause: &Clause) -> Vec<&ExprRef> {
    match &clause.kind {
        ClauseKind::Depend { exprs, .. } => exprs.iter().collect(),
        ClauseKind::If(expr)
        | ClauseKind::Final(expr)
        | ClauseKind::Priority(expr)
        | ClauseKind::NumThreads(expr) => vec![expr],
        _ => vec![],
    }
}

fn emit_task(cx: &mut LoweringContext, parts: ConstructParts) -> Result<Stmt> {
    cx.lowered += 1;
    match cx.strategy.runtime {
        Runtime::Kmp => kmp::task(cx, parts),
        Runtime::Nanos => nanos::task(cx, parts),
    }
}

/// Replace a `task` construct by the code that spawns it.
pub fn lower_task(cx: &mut LoweringContext, directive: &Directive) -> Result<Stmt> {
    let parts = cx.parts(ConstructKind::Task, directive);
    emit_task(cx, parts)
}

/// Replace a `parallel` construct by the code that runs it on a team.
pub fn lower_parallel(cx: &mut LoweringContext, directive: &Directive) -> Result<Stmt> {
    let parts = cx.parts(ConstructKind::Parallel, directive);
    cx.lowered += 1;
    match cx.strategy.runtime {
        Runtime::Kmp => kmp::parallel(cx, parts),
        Runtime::Nanos => nanos::parallel(cx, parts),
    }
}

/// Replace a call of a task function by a task over copies of the
/// arguments.
///
/// A call whose arguments do not match the parameters stays a plain call.
pub fn lower_deferred_call(cx: &mut LoweringContext, call: &DeferredCall) -> Result<Stmt> {
    let rewritten = {
        let unit = &mut *cx.unit;
        rewrite_call(
            call,
            &mut unit.symbols,
            &mut unit.counters,
            &mut unit.diagnostics,
        )?
    };
    let Some(rewritten) = rewritten else {
        return Ok(Stmt::expr(call.call()));
    };
    let parts = ConstructParts::new(
        ConstructKind::Task,
        rewritten.info,
        rewritten.clauses,
        rewritten.body,
        call.loc,
    );
    let mut stmts = rewritten.arguments;
    stmts.push(emit_task(cx, parts)?);
    Ok(Stmt::Compound(stmts))
}

pub struct LowerTask;

impl Rewrite for LowerTask {
    fn name(&self) -> &'static str {
        "lower::LowerTask"
    }
    fn is_match(&self, construct: &Construct) -> Result<bool> {
        Ok(matches!(construct, Construct::Task(_)))
    }
    fn rewrite(
        &self,
        cx: &mut LoweringContext,
        construct: &Construct,
    ) -> Result<RewriteResult<Stmt>> {
        match construct {
            Construct::Task(directive) => Ok(RewriteResult::Changed(lower_task(cx, directive)?)),
            _ => Ok(RewriteResult::Unchanged),
        }
    }
}

pub struct LowerParallel;

impl Rewrite for LowerParallel {
    fn name(&self) -> &'static str {
        "lower::LowerParallel"
    }
    fn is_match(&self, construct: &Construct) -> Result<bool> {
        Ok(matches!(construct, Construct::Parallel(_)))
    }
    fn rewrite(
        &self,
        cx: &mut LoweringContext,
        construct: &Construct,
    ) -> Result<RewriteResult<Stmt>> {
        match construct {
            Construct::Parallel(directive) => {
                Ok(RewriteResult::Changed(lower_parallel(cx, directive)?))
            }
            _ => Ok(RewriteResult::Unchanged),
        }
    }
}

pub struct LowerDeferredCall;

impl Rewrite for LowerDeferredCall {
    fn name(&self) -> &'static str {
        "lower::LowerDeferredCall"
    }
    fn is_match(&self, construct: &Construct) -> Result<bool> {
        Ok(matches!(construct, Construct::DeferredCall(_)))
    }
    fn rewrite(
        &self,
        cx: &mut LoweringContext,
        construct: &Construct,
    ) -> Result<RewriteResult<Stmt>> {
        match construct {
            Construct::DeferredCall(call) => {
                Ok(RewriteResult::Changed(lower_deferred_call(cx, call)?))
            }
            _ => Ok(RewriteResult::Unchanged),
        }
    }
}

fn apply_rewrites(
    cx: &mut LoweringContext,
    construct: &Construct,
    rewrites: &[&dyn Rewrite],
    indent: i32,
) -> Result<RewriteResult<Stmt>> {
    for rewrite in rewrites {
        debug!(
            "{}Matching {} with {}",
            spaces(indent),
            construct.name(),
            rewrite.name()
        );
        if rewrite.is_match(construct)? {
            debug!("{}--> Success", spaces(indent));
            let result = rewrite.rewrite(cx, construct)?;
            if result.is_changed().is_some() {
                debug!("{}----> Changed", spaces(indent));
                return Ok(result);
            }
        }
    }
    Ok(RewriteResult::Unchanged)
}

fn lower_boxed(
    cx: &mut LoweringContext,
    stmt: Box<Stmt>,
    rewrites: &[&dyn Rewrite],
    indent: i32,
) -> Result<Box<Stmt>> {
    Ok(Box::new(lower_stmt(cx, *stmt, rewrites, indent)?))
}

/// Lower the constructs inside `stmt`, innermost first.
fn lower_stmt(
    cx: &mut LoweringContext,
    stmt: Stmt,
    rewrites: &[&dyn Rewrite],
    indent: i32,
) -> Result<Stmt> {
    let stmt = match stmt {
        Stmt::Compound(stmts) => Stmt::Compound(
            stmts
                .into_iter()
                .map(|stmt| lower_stmt(cx, stmt, rewrites, indent + 1))
                .collect::<Result<Vec<Stmt>>>()?,
        ),
        Stmt::If {
            cond,
            then,
            otherwise,
        } => Stmt::If {
            cond,
            then: lower_boxed(cx, then, rewrites, indent + 1)?,
            otherwise: match otherwise {
                Some(otherwise) => Some(lower_boxed(cx, otherwise, rewrites, indent + 1)?),
                None => None,
            },
        },
        Stmt::For {
            init,
            cond,
            step,
            body,
        } => Stmt::For {
            init,
            cond,
            step,
            body: lower_boxed(cx, body, rewrites, indent + 1)?,
        },
        Stmt::While { cond, body } => Stmt::While {
            cond,
            body: lower_boxed(cx, body, rewrites, indent + 1)?,
        },
        Stmt::Construct(construct) => {
            let construct = match *construct {
                Construct::Task(mut directive) => {
                    directive.body = lower_stmt(cx, directive.body, rewrites, indent + 1)?;
                    Construct::Task(directive)
                }
                Construct::Parallel(mut directive) => {
                    directive.body = lower_stmt(cx, directive.body, rewrites, indent + 1)?;
                    Construct::Parallel(directive)
                }
                call @ Construct::DeferredCall(_) => call,
            };
            match apply_rewrites(cx, &construct, rewrites, indent)? {
                RewriteResult::Changed(stmt) => stmt,
                RewriteResult::Unchanged => Stmt::Construct(Box::new(construct)),
            }
        }
        stmt => stmt,
    };
    Ok(stmt)
}

/// Lower every construct of the unit for the runtime of `strategy`.
pub fn lower_unit(
    unit: &mut TranslationUnit,
    strategy: SerializationStrategy,
) -> Result<RewriteResult<()>> {
    let rewrites: [&dyn Rewrite; 3] = [&LowerTask, &LowerParallel, &LowerDeferredCall];
    let mut cx = LoweringContext::new(unit, strategy);
    let items = std::mem::take(&mut cx.unit.items);
    let mut lowered = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Item::Function(mut def) => {
                cx.set_function(def.decl.symbol.name());
                debug!("Lowering constructs in {}", def.decl.symbol);
                let body = std::mem::take(&mut def.body);
                def.body = body
                    .into_iter()
                    .map(|stmt| lower_stmt(&mut cx, stmt, &rewrites, 0))
                    .collect::<Result<Vec<Stmt>>>()?;
                def.decl.task = None;
                lowered.extend(cx.take_generated());
                lowered.push(Item::Function(def));
            }
            Item::Prototype(mut decl) => {
                decl.task = None;
                lowered.push(Item::Prototype(decl));
            }
            item => lowered.push(item),
        }
    }
    let changed = cx.lowered > 0;
    cx.unit.items = lowered;
    if changed {
        Ok(RewriteResult::Changed(()))
    } else {
        Ok(RewriteResult::Unchanged)
    }
}

pub struct LowerOmpToKmp;

impl Pass for LowerOmpToKmp {
    const NAME: &'static str = "lower-omp-to-kmp";
    fn convert(unit: &mut TranslationUnit, options: &LowerOptions) -> Result<RewriteResult<()>> {
        lower_unit(unit, SerializationStrategy::select(Runtime::Kmp, options))
    }
}

pub struct LowerOmpToNanos;

impl Pass for LowerOmpToNanos {
    const NAME: &'static str = "lower-omp-to-nanos";
    fn convert(unit: &mut TranslationUnit, options: &LowerOptions) -> Result<RewriteResult<()>> {
        lower_unit(unit, SerializationStrategy::select(Runtime::Nanos, options))
    }
}
