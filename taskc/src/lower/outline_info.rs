//! Classification of the variables that a construct captures.

use crate::diagnostic::Diagnostics;
use crate::frontend::Location;
use crate::ir::build;
use crate::ir::Clause;
use crate::ir::ClauseKind;
use crate::ir::Directionality;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::Stmt;
use crate::ir::Symbol;
use crate::ir::SymbolId;
use crate::ir::Type;
use std::collections::HashSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sharing {
    /// The value is copied into the capture block when the task is created.
    Capture,
    /// The address of an lvalue expression (not of the whole variable) is
    /// captured.
    CaptureAddress,
    /// The address of the variable is captured, so writes reach the caller.
    Shared,
    /// Fresh storage in the outlined function; nothing is captured.
    Private,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationPolicy {
    Normal,
    /// The bytes are stored after the fixed-size part of the capture block.
    Overallocated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstructKind {
    Task,
    Parallel,
}

impl ConstructKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConstructKind::Task => "task",
            ConstructKind::Parallel => "parallel",
        }
    }
    /// Sharing of automatic variables that no clause names.
    fn implicit_sharing(&self) -> Sharing {
        match self {
            ConstructKind::Task => Sharing::Capture,
            ConstructKind::Parallel => Sharing::Shared,
        }
    }
}

/// One region expression of a dependency clause.
#[derive(Clone, Debug, PartialEq)]
pub struct Dependency {
    pub directionality: Directionality,
    pub expr: ExprRef,
    pub loc: Location,
}

/// One variable captured by a construct.
#[derive(Clone, Debug, PartialEq)]
pub struct DataItem {
    pub symbol: Symbol,
    pub sharing: Sharing,
    /// Union of the directionality of all dependencies.
    pub directionality: Directionality,
    pub allocation_policy: AllocationPolicy,
    /// Unique name in the capture structure.
    pub field_name: String,
    /// `None` for private items, which have no field.
    pub field_type: Option<Type>,
    pub dependencies: Vec<Dependency>,
    /// The object whose address is captured for [Sharing::CaptureAddress].
    pub shared_expression: Option<ExprRef>,
}

impl DataItem {
    pub fn new(symbol: &Symbol, sharing: Sharing) -> Self {
        Self {
            symbol: symbol.clone(),
            sharing,
            directionality: Directionality::empty(),
            allocation_policy: AllocationPolicy::Normal,
            field_name: symbol.name().to_string(),
            field_type: None,
            dependencies: vec![],
            shared_expression: None,
        }
    }
    pub fn is_vla(&self) -> bool {
        self.symbol.typ().is_vla()
    }
    pub fn is_overallocated(&self) -> bool {
        self.allocation_policy == AllocationPolicy::Overallocated
    }
    pub fn add_dependency(&mut self, dependency: Dependency) {
        self.directionality |= dependency.directionality;
        self.dependencies.push(dependency);
    }
    /// Widen a capture-by-address to sharing the whole variable.
    fn widen(&mut self) {
        self.sharing = Sharing::Shared;
        self.shared_expression = None;
    }
    fn compute_field_type(&self) -> Option<Type> {
        let opaque = Type::Void.pointer();
        let typ = self.symbol.typ();
        match self.sharing {
            Sharing::Private => None,
            Sharing::Capture | Sharing::Shared if self.is_vla() => Some(opaque),
            Sharing::Capture => Some(typ.clone()),
            Sharing::Shared => Some(typ.clone().pointer()),
            Sharing::CaptureAddress => {
                let object = match &self.shared_expression {
                    Some(object) => object.typ(),
                    None => typ.clone(),
                };
                if object.is_vla() {
                    Some(opaque)
                } else {
                    Some(object.pointer())
                }
            }
        }
    }
}

/// The data items of one construct, in insertion order and unique by symbol.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutlineInfo {
    items: Vec<DataItem>,
}

impl OutlineInfo {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn items(&self) -> &[DataItem] {
        &self.items
    }
    pub fn iter(&self) -> impl Iterator<Item = &DataItem> {
        self.items.iter()
    }
    fn position(&self, symbol: &Symbol) -> Option<usize> {
        self.items.iter().position(|item| item.symbol == *symbol)
    }
    pub fn get(&self, symbol: &Symbol) -> Option<&DataItem> {
        self.position(symbol).map(|i| &self.items[i])
    }
    pub fn get_mut(&mut self, symbol: &Symbol) -> Option<&mut DataItem> {
        self.position(symbol).map(|i| &mut self.items[i])
    }
    /// Insert the item unless its symbol is already present; return the
    /// item that is kept.
    pub fn insert(&mut self, item: DataItem) -> &mut DataItem {
        let i = match self.position(&item.symbol) {
            Some(i) => i,
            None => {
                self.items.push(item);
                self.items.len() - 1
            }
        };
        &mut self.items[i]
    }
    pub fn has_dependencies(&self) -> bool {
        self.items.iter().any(|item| !item.dependencies.is_empty())
    }
    /// Every dependency, by item and then by clause order.
    pub fn dependencies(&self) -> impl Iterator<Item = (&DataItem, &Dependency)> {
        self.items
            .iter()
            .flat_map(|item| item.dependencies.iter().map(move |dep| (item, dep)))
    }
    pub fn dependency_count(&self) -> usize {
        self.items.iter().map(|item| item.dependencies.len()).sum()
    }
    /// Assign unique field names, field types and allocation policies.
    ///
    /// The field name an item already has is used as the base name.
    pub fn finish(&mut self) {
        let mut taken: HashSet<String> = HashSet::new();
        for item in self.items.iter_mut() {
            let base = item.field_name.clone();
            let mut name = base.clone();
            let mut suffix = 1;
            while taken.contains(&name) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }
            taken.insert(name.clone());
            item.field_name = name;
            item.field_type = item.compute_field_type();
            item.allocation_policy = if item.sharing == Sharing::Capture && item.is_vla() {
                AllocationPolicy::Overallocated
            } else {
                AllocationPolicy::Normal
            };
        }
    }
}

pub(crate) fn contains_section(expr: &Expr) -> bool {
    let mut found = false;
    expr.walk(&mut |e| {
        if matches!(e, Expr::Section { .. }) {
            found = true;
        }
    });
    found
}

/// The first element of a region: `a[2:n][:]` starts at `a[2][0]`.
///
/// Expressions without array sections denote a single object and are
/// returned as is.
pub fn object_start(expr: &ExprRef) -> ExprRef {
    if !contains_section(expr) {
        return expr.clone();
    }
    match expr.as_ref() {
        Expr::Section { base, lower, .. } => {
            let lower = lower.clone().unwrap_or_else(|| build::int(0));
            build::subscript(object_start(base), lower)
        }
        Expr::Subscript { base, index } => build::subscript(object_start(base), index.clone()),
        Expr::Member { base, field, arrow } => {
            let base = object_start(base);
            if *arrow {
                build::arrow(base, field)
            } else {
                build::member(base, field)
            }
        }
        _ => expr.clone(),
    }
}

fn count_symbol(expr: &Expr, symbol: &Symbol) -> usize {
    let mut count = 0;
    expr.walk(&mut |e| {
        if e.as_symbol() == Some(symbol) {
            count += 1;
        }
    });
    count
}

/// Whether `body` refers to `symbol` other than through `object`.
fn uses_outside(body: &Stmt, symbol: &Symbol, object: &Expr) -> bool {
    let per_object = count_symbol(object, symbol);
    let mut total = 0;
    let mut inside = 0;
    body.walk_exprs(&mut |e| {
        if e.as_symbol() == Some(symbol) {
            total += 1;
        }
        if e == object {
            inside += per_object;
        }
    });
    total > inside
}

/// Builds the [OutlineInfo] of a construct from its clauses and body.
pub struct Classifier<'a> {
    kind: ConstructKind,
    info: OutlineInfo,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Classifier<'a> {
    pub fn new(kind: ConstructKind, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            kind,
            info: OutlineInfo::new(),
            diagnostics,
        }
    }
    /// Apply `firstprivate`, `shared` and `private` in clause order.
    ///
    /// The first clause that names a variable decides its sharing.
    pub fn sharing_clauses(&mut self, clauses: &[Clause]) {
        for clause in clauses {
            let (symbols, sharing) = match &clause.kind {
                ClauseKind::Firstprivate(symbols) => (symbols, Sharing::Capture),
                ClauseKind::Shared(symbols) => (symbols, Sharing::Shared),
                ClauseKind::Private(symbols) => (symbols, Sharing::Private),
                ClauseKind::Reduction { .. } => {
                    self.diagnostics
                        .warning(clause.loc, "reduction is not supported; the clause is ignored");
                    continue;
                }
                _ => continue,
            };
            for symbol in symbols {
                self.info.insert(DataItem::new(symbol, sharing));
            }
        }
    }
    pub fn default_sharing(&mut self, symbols: &[Symbol], sharing: Sharing) {
        for symbol in symbols {
            self.info.insert(DataItem::new(symbol, sharing));
        }
    }
    fn dependency(&mut self, directionality: Directionality, expr: &ExprRef, loc: Location) {
        let symbol = match expr.base_symbol() {
            Some(symbol) if expr.is_lvalue() => symbol,
            _ => {
                let msg = format!("`{expr}` is not an addressable object; the dependency is ignored");
                self.diagnostics.warning(loc, &msg);
                return;
            }
        };
        let object = object_start(expr);
        let is_bare = expr.as_symbol().is_some();
        let index = match self.info.position(&symbol) {
            Some(index) => {
                let item = &mut self.info.items[index];
                match item.sharing {
                    Sharing::Private => {
                        let msg = format!("dependency on private variable `{symbol}` is ignored");
                        self.diagnostics.warning(loc, &msg);
                        return;
                    }
                    Sharing::CaptureAddress => {
                        let same = item
                            .shared_expression
                            .as_ref()
                            .is_some_and(|captured| **captured == *object);
                        if is_bare || !same {
                            item.widen();
                        }
                    }
                    Sharing::Capture | Sharing::Shared => {}
                }
                index
            }
            None => {
                let item = if is_bare {
                    DataItem::new(&symbol, Sharing::Shared)
                } else {
                    let mut item = DataItem::new(&symbol, Sharing::CaptureAddress);
                    item.shared_expression = Some(object);
                    item
                };
                self.info.items.push(item);
                self.info.items.len() - 1
            }
        };
        self.info.items[index].add_dependency(Dependency {
            directionality,
            expr: expr.clone(),
            loc,
        });
    }
    /// Attach dependency clauses to their base variables.
    pub fn dependencies(&mut self, clauses: &[Clause]) {
        for clause in clauses {
            let ClauseKind::Depend {
                directionality,
                exprs,
            } = &clause.kind
            else {
                continue;
            };
            if self.kind == ConstructKind::Parallel {
                let msg = "dependencies on a parallel construct are not supported; the clause is ignored";
                self.diagnostics.warning(clause.loc, msg);
                continue;
            }
            for expr in exprs {
                self.dependency(*directionality, expr, clause.loc);
            }
        }
    }
    /// Classify the automatic variables that the body uses but no clause
    /// names, and widen captured addresses whose variable is used otherwise.
    pub fn implicit(&mut self, body: &Stmt) {
        let declared: HashSet<SymbolId> = body
            .declared_symbols()
            .iter()
            .map(|symbol| symbol.id())
            .collect();
        let mut used: Vec<Symbol> = vec![];
        body.walk_exprs(&mut |e| {
            if let Expr::Symbol(symbol) = e {
                if symbol.is_automatic()
                    && !declared.contains(&symbol.id())
                    && !used.contains(symbol)
                {
                    used.push(symbol.clone());
                }
            }
        });
        for item in self.info.items.iter_mut() {
            if item.sharing != Sharing::CaptureAddress {
                continue;
            }
            let widen = match &item.shared_expression {
                Some(object) => uses_outside(body, &item.symbol, object),
                None => true,
            };
            if widen {
                item.widen();
            }
        }
        let sharing = self.kind.implicit_sharing();
        for symbol in used {
            self.info.insert(DataItem::new(&symbol, sharing));
        }
    }
    /// Capture the variables that runtime extents of captured types refer
    /// to, so the outlined function can rebuild those types.
    pub fn vla_sizes(&mut self) {
        loop {
            let mut missing: Vec<Symbol> = vec![];
            for item in self.info.iter() {
                let mut sizes = item.symbol.typ().vla_sizes();
                if let Some(object) = &item.shared_expression {
                    sizes.extend(object.typ().vla_sizes());
                }
                for size in sizes {
                    size.walk(&mut |e| {
                        if let Expr::Symbol(symbol) = e {
                            if symbol.is_automatic()
                                && self.info.get(symbol).is_none()
                                && !missing.contains(symbol)
                            {
                                missing.push(symbol.clone());
                            }
                        }
                    });
                }
            }
            if missing.is_empty() {
                return;
            }
            self.default_sharing(&missing, Sharing::Capture);
        }
    }
    pub fn finish(mut self) -> OutlineInfo {
        self.info.finish();
        self.info
    }
}

/// Classify the variables of a `task` or `parallel` construct.
pub fn classify(
    kind: ConstructKind,
    clauses: &[Clause],
    body: &Stmt,
    diagnostics: &mut Diagnostics,
) -> OutlineInfo {
    let mut classifier = Classifier::new(kind, diagnostics);
    classifier.sharing_clauses(clauses);
    classifier.dependencies(clauses);
    classifier.implicit(body);
    classifier.vla_sizes();
    classifier.finish()
}
