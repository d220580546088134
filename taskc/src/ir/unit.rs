use crate::diagnostic::Diagnostics;
use crate::ir::spaces;
use crate::ir::ExprRef;
use crate::ir::Scope;
use crate::ir::Stmt;
use crate::ir::StructDef;
use crate::ir::Symbol;
use crate::ir::SymbolTable;
use crate::ir::TaskFunction;
use crate::ir::Type;
use crate::shared::Shared;
use crate::shared::SharedExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub symbol: Symbol,
    pub ret: Type,
    pub params: Vec<Symbol>,
    pub is_static: bool,
    /// Set when the declaration is annotated with `#pragma omp task`.
    pub task: Option<Arc<TaskFunction>>,
}

impl Display for FunctionDecl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(task) = &self.task {
            writeln!(f, "{task}")?;
        }
        if self.is_static {
            write!(f, "static ")?;
        }
        let params = if self.params.is_empty() {
            "void".to_string()
        } else {
            self.params
                .iter()
                .map(|param| param.typ().declare(param.name()))
                .collect::<Vec<String>>()
                .join(", ")
        };
        let header = format!("{}({params})", self.symbol.name());
        write!(f, "{}", self.ret.declare(&header))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub decl: FunctionDecl,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalVar {
    pub symbol: Symbol,
    pub is_static: bool,
    pub init: Option<ExprRef>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    /// A preprocessor line other than `#pragma omp`, kept verbatim.
    Directive(String),
    Typedef { name: String, typ: Type },
    Struct(Arc<StructDef>),
    Global(GlobalVar),
    Prototype(FunctionDecl),
    Function(FunctionDef),
}

impl Item {
    pub fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        match self {
            Item::Directive(line) => write!(f, "{line}"),
            Item::Typedef { name, typ } => write!(f, "typedef {};", typ.declare(name)),
            Item::Struct(def) => {
                writeln!(f, "struct {} {{", def.tag)?;
                for field in &def.fields {
                    writeln!(f, "{}{};", spaces(indent + 1), field.typ.declare(&field.name))?;
                }
                write!(f, "}};")
            }
            Item::Global(global) => {
                if global.is_static {
                    write!(f, "static ")?;
                }
                write!(f, "{}", global.symbol.typ().declare(global.symbol.name()))?;
                if let Some(init) = &global.init {
                    write!(f, " = {init}")?;
                }
                write!(f, ";")
            }
            Item::Prototype(decl) => write!(f, "{decl};"),
            Item::Function(def) => {
                writeln!(f, "{} {{", def.decl)?;
                for stmt in &def.body {
                    write!(f, "{}", spaces(indent + 1))?;
                    stmt.display(f, indent + 1)?;
                    writeln!(f)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Display for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.display(f, 0)
    }
}

/// Per-unit counters for generating unique names.
///
/// Each name prefix counts independently, starting at zero.
#[derive(Debug, Default)]
pub struct Counters {
    counters: BTreeMap<String, usize>,
}

impl Counters {
    pub fn next(&mut self, prefix: &str) -> usize {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let value = *counter;
        *counter += 1;
        value
    }
}

/// One source file and the state that lowering threads through it.
#[derive(Debug)]
pub struct TranslationUnit {
    pub items: Vec<Item>,
    pub symbols: SymbolTable,
    /// File-scope names: functions, globals and generated declarations.
    pub global: Shared<Scope>,
    pub diagnostics: Diagnostics,
    pub counters: Counters,
}

impl TranslationUnit {
    pub fn new() -> Self {
        Self {
            items: vec![],
            symbols: SymbolTable::new(),
            global: Arc::new(RwLock::new(Scope::new())),
            diagnostics: Diagnostics::default(),
            counters: Counters::default(),
        }
    }
    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.global.rd().lookup(name).cloned()
    }
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(def) => Some(def),
            _ => None,
        })
    }
}

impl Default for TranslationUnit {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TranslationUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut previous: Option<&Item> = None;
        for item in &self.items {
            if let Some(previous) = previous {
                // Separate functions and structures from their neighbours.
                let block = |item: &Item| matches!(item, Item::Function(_) | Item::Struct(_));
                if block(item) || block(previous) {
                    writeln!(f)?;
                }
            }
            item.display(f, 0)?;
            writeln!(f)?;
            previous = Some(item);
        }
        Ok(())
    }
}
