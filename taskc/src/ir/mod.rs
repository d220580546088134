//! Intermediate representation of the C subset that lowering works on.
//!
//! Expressions are immutable trees shared through [ExprRef]; statements and
//! top-level items are owned values that lowering replaces wholesale.

pub mod build;
mod construct;
mod expr;
mod rewrite;
mod stmt;
mod symbol;
mod typ;
mod unit;

pub use construct::Clause;
pub use construct::ClauseKind;
pub use construct::Construct;
pub use construct::DeferredCall;
pub use construct::Directionality;
pub use construct::Directive;
pub use construct::TaskFunction;
pub use expr::Argument;
pub use expr::BinaryOp;
pub use expr::Expr;
pub use expr::ExprRef;
pub use expr::UnaryOp;
pub use rewrite::Substitution;
pub use stmt::Stmt;
pub use stmt::VarDecl;
pub use symbol::Scope;
pub use symbol::Symbol;
pub use symbol::SymbolId;
pub use symbol::SymbolKind;
pub use symbol::SymbolTable;
pub use typ::ArraySize;
pub use typ::Field;
pub use typ::Primitive;
pub use typ::StructDef;
pub use typ::Type;
pub use unit::Counters;
pub use unit::FunctionDecl;
pub use unit::FunctionDef;
pub use unit::GlobalVar;
pub use unit::Item;
pub use unit::TranslationUnit;

/// Indentation used when printing nested code.
pub fn spaces(indent: i32) -> String {
    "  ".repeat(indent.max(0) as usize)
}
