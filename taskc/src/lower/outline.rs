//! The body of an outlined function: re-bind every captured variable from
//! the capture block, then run a copy of the construct body.

use crate::ir::build;
use crate::ir::ExprRef;
use crate::ir::Stmt;
use crate::ir::Substitution;
use crate::ir::Symbol;
use crate::ir::SymbolKind;
use crate::ir::SymbolTable;
use crate::ir::Type;
use crate::lower::layout::CaptureLayout;
use crate::lower::outline_info::DataItem;
use crate::lower::outline_info::OutlineInfo;
use crate::lower::outline_info::Sharing;
use std::collections::HashSet;

struct Prologue<'a> {
    layout: &'a CaptureLayout,
    args: ExprRef,
    stmts: Vec<Stmt>,
    subst: Substitution,
}

impl Prologue<'_> {
    fn field(&self, item: &DataItem) -> Option<ExprRef> {
        let field = self.layout.field(&item.symbol)?;
        Some(build::arrow(self.args.clone(), &field.name))
    }
    fn local(&self, symbols: &mut SymbolTable, item: &DataItem, typ: Type) -> Symbol {
        symbols.new_symbol(item.symbol.name(), typ, SymbolKind::Synthetic)
    }
    /// Variables whose types have no runtime extents.
    fn fixed(&mut self, symbols: &mut SymbolTable, item: &DataItem) {
        let typ = item.symbol.typ().clone();
        match item.sharing {
            Sharing::Private => {
                let local = self.local(symbols, item, typ);
                self.stmts.push(build::decl(&local, None));
                self.subst.map_symbol(&item.symbol, build::sym(&local));
            }
            Sharing::Capture => {
                let Some(field) = self.field(item) else {
                    return;
                };
                let local = self.local(symbols, item, typ.clone());
                if typ.is_array() {
                    self.stmts.push(build::decl(&local, None));
                    let size = build::sizeof_expr(build::sym(&local));
                    self.stmts.push(build::memcpy(
                        build::addr_of(build::sym(&local)),
                        build::addr_of(field),
                        size,
                    ));
                } else {
                    self.stmts.push(build::decl(&local, Some(field)));
                }
                self.subst.map_symbol(&item.symbol, build::sym(&local));
            }
            Sharing::Shared => {
                let Some(field) = self.field(item) else {
                    return;
                };
                let local = self.local(symbols, item, typ.pointer());
                self.stmts.push(build::decl(&local, Some(field)));
                self.subst
                    .map_symbol(&item.symbol, build::deref(build::sym(&local)));
            }
            Sharing::CaptureAddress => {
                let (Some(field), Some(object)) = (self.field(item), &item.shared_expression)
                else {
                    return;
                };
                let local = self.local(symbols, item, object.typ().pointer());
                self.stmts.push(build::decl(&local, Some(field)));
                self.subst
                    .map_expr(object.clone(), build::deref(build::sym(&local)));
            }
        }
    }
    /// Variable-length arrays, typed with the extents that were re-bound
    /// by [Prologue::fixed].
    fn variable(&mut self, symbols: &mut SymbolTable, item: &DataItem) {
        if item.sharing == Sharing::Private {
            let typ = self.subst.apply_type(item.symbol.typ());
            let local = self.local(symbols, item, typ);
            self.stmts.push(build::decl(&local, None));
            self.subst.map_symbol(&item.symbol, build::sym(&local));
            return;
        }
        let Some(field) = self.field(item) else {
            return;
        };
        let object = match (&item.sharing, &item.shared_expression) {
            (Sharing::CaptureAddress, Some(object)) => object.typ(),
            _ => item.symbol.typ().clone(),
        };
        let pointer = self.subst.apply_type(&object).pointer();
        let local = self.local(symbols, item, pointer.clone());
        self.stmts
            .push(build::decl(&local, Some(build::cast(pointer, field))));
        let value = build::deref(build::sym(&local));
        match (&item.sharing, &item.shared_expression) {
            (Sharing::CaptureAddress, Some(object)) => self.subst.map_expr(object.clone(), value),
            _ => self.subst.map_symbol(&item.symbol, value),
        }
    }
}

fn has_runtime_extent(item: &DataItem) -> bool {
    match (&item.sharing, &item.shared_expression) {
        (Sharing::CaptureAddress, Some(object)) => object.typ().is_vla(),
        _ => item.is_vla(),
    }
}

/// Statements of an outlined function that reads its captured variables
/// through `args`, a pointer to the capture block.
pub fn outline_body(
    info: &OutlineInfo,
    layout: &CaptureLayout,
    args: &ExprRef,
    body: &Stmt,
    symbols: &mut SymbolTable,
) -> Vec<Stmt> {
    let mut prologue = Prologue {
        layout,
        args: args.clone(),
        stmts: vec![],
        subst: Substitution::new(),
    };
    for item in info.iter().filter(|item| !has_runtime_extent(item)) {
        prologue.fixed(symbols, item);
    }
    for item in info.iter().filter(|item| has_runtime_extent(item)) {
        prologue.variable(symbols, item);
    }
    let mut stmts = prologue.stmts;
    let taken: HashSet<String> = stmts
        .iter()
        .flat_map(|stmt| stmt.declared_symbols())
        .map(|symbol| symbol.name().to_string())
        .collect();
    match prologue.subst.apply_stmt(body) {
        Stmt::Compound(inner) => {
            let collides = inner.iter().any(|stmt| match stmt {
                Stmt::Decl(decl) => taken.contains(decl.symbol.name()),
                _ => false,
            });
            if collides {
                stmts.push(Stmt::Compound(inner));
            } else {
                stmts.extend(inner);
            }
        }
        stmt => stmts.push(stmt),
    }
    stmts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostics;
    use crate::frontend::Parser;
    use crate::ir::Construct;
    use crate::ir::Directive;
    use crate::lower::layout::synthesize;
    use crate::lower::layout::FieldOrder;
    use crate::lower::outline_info::classify;
    use crate::lower::outline_info::ConstructKind;

    fn outline(src: &str) -> Vec<String> {
        let mut unit = Parser::parse(src).unwrap();
        let directive: Directive = unit
            .functions()
            .last()
            .unwrap()
            .body
            .iter()
            .find_map(|stmt| match stmt {
                Stmt::Construct(construct) => match construct.as_ref() {
                    Construct::Task(directive) => Some(directive.clone()),
                    _ => None,
                },
                _ => None,
            })
            .unwrap();
        let mut diagnostics = Diagnostics::default();
        let info = classify(
            ConstructKind::Task,
            &directive.clauses,
            &directive.body,
            &mut diagnostics,
        );
        let layout = synthesize(&info, FieldOrder::Insertion, "args");
        let args = unit
            .symbols
            .new_symbol("args", layout.typ().pointer(), SymbolKind::Synthetic);
        let stmts = outline_body(
            &info,
            &layout,
            &build::sym(&args),
            &directive.body,
            &mut unit.symbols,
        );
        stmts.iter().map(|stmt| stmt.to_string()).collect()
    }

    #[test]
    fn test_rebinding() {
        let src = indoc::indoc! {"
        void f(int n) {
          int s;
          double d[4];
          float a[100];
          int t;
          #pragma omp task shared(s) firstprivate(d) depend(out: a[2:n]) private(t)
          {
            t = n;
            s = s + t;
            a[2] = d[0];
          }
        }
        "};
        assert_eq!(
            outline(src),
            vec![
                "int *s = args->s;",
                "double d[4];",
                "__builtin_memcpy(&d, &args->d, sizeof(d));",
                "int t;",
                "float *a = args->a;",
                "int n = args->n;",
                "t = n;",
                "*s = *s + t;",
                "*a = d[0];",
            ]
        );
    }

    #[test]
    fn test_variable_length() {
        let src = indoc::indoc! {"
        void f(int n) {
          float v[n];
          float w[n];
          #pragma omp task shared(w)
          v[0] = w[1];
        }
        "};
        assert_eq!(
            outline(src),
            vec![
                "int n = args->n;",
                "float (*w)[n] = (float (*)[n]) args->w;",
                "float (*v)[n] = (float (*)[n]) args->v;",
                "(*v)[0] = (*w)[1];",
            ]
        );
    }

    #[test]
    fn test_nested_block() {
        let src = indoc::indoc! {"
        void f(int n) {
          #pragma omp task
          {
            int x = n;
            int n = 2;
            x = x + n;
          }
        }
        "};
        let lines = outline(src);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "int n = args->n;");
        assert!(lines[1].starts_with("{\n  int x = n;\n  int n = 2;"));
    }
}
