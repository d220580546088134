use crate::ir::Type;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    /// A variable declared inside a function body.
    Local,
    Parameter,
    /// A variable declared at file scope.
    Global,
    Function,
    /// A symbol introduced by lowering (argument copies, runtime handles).
    Synthetic,
}

#[derive(Debug)]
struct SymbolData {
    id: SymbolId,
    name: String,
    typ: Type,
    kind: SymbolKind,
}

/// A named entity of the program.
///
/// Symbols are compared by identity: two variables called `x` in different
/// scopes are different symbols.
#[derive(Clone, Debug)]
pub struct Symbol {
    data: Arc<SymbolData>,
}

impl Symbol {
    pub fn id(&self) -> SymbolId {
        self.data.id
    }
    pub fn name(&self) -> &str {
        &self.data.name
    }
    pub fn typ(&self) -> &Type {
        &self.data.typ
    }
    pub fn kind(&self) -> SymbolKind {
        self.data.kind
    }
    /// Whether the symbol lives in a function's stack frame.
    pub fn is_automatic(&self) -> bool {
        matches!(
            self.kind(),
            SymbolKind::Local | SymbolKind::Parameter | SymbolKind::Synthetic
        )
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Hands out symbols with unique ids for one translation unit.
#[derive(Debug, Default)]
pub struct SymbolTable {
    next: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn new_symbol(&mut self, name: &str, typ: Type, kind: SymbolKind) -> Symbol {
        let id = SymbolId(self.next);
        self.next += 1;
        let data = SymbolData {
            id,
            name: name.to_string(),
            typ,
            kind,
        };
        Symbol {
            data: Arc::new(data),
        }
    }
}

/// Name resolution for one scope level.
#[derive(Debug, Default)]
pub struct Scope {
    symbols: BTreeMap<String, Symbol>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }
    /// Insert the symbol and return the symbol it shadows, if any.
    pub fn insert(&mut self, symbol: Symbol) -> Option<Symbol> {
        self.symbols.insert(symbol.name().to_string(), symbol)
    }
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Primitive;

    #[test]
    fn test_identity() {
        let mut table = SymbolTable::new();
        let int = Type::Primitive(Primitive::Int);
        let a = table.new_symbol("x", int.clone(), SymbolKind::Local);
        let b = table.new_symbol("x", int, SymbolKind::Local);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(a.name(), b.name());

        let mut scope = Scope::new();
        assert!(scope.insert(a.clone()).is_none());
        assert_eq!(scope.insert(b.clone()), Some(a));
        assert_eq!(scope.lookup("x"), Some(&b));
    }
}
