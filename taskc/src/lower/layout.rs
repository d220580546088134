//! Synthesis of the capture structure and the code that fills it.
//!
//! Variable-length arrays that are captured by value are stored after the
//! fixed-size part of the structure. Their fields hold a pointer into that
//! trailing storage, and the allocation size grows by each array's size
//! rounded up to [OVERALLOCATION_ALIGN] bytes.

use crate::ir::build;
use crate::ir::ExprRef;
use crate::ir::Field;
use crate::ir::Item;
use crate::ir::Primitive;
use crate::ir::Stmt;
use crate::ir::StructDef;
use crate::ir::Symbol;
use crate::ir::Type;
use crate::lower::outline_info::DataItem;
use crate::lower::outline_info::OutlineInfo;
use crate::lower::outline_info::Sharing;
use crate::lower::Locals;
use std::sync::Arc;

pub const OVERALLOCATION_ALIGN: u64 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldOrder {
    /// Captured fixed-size, captured variable-length, shared fixed-size,
    /// shared variable-length.
    Grouped,
    /// The order in which the items were classified.
    Insertion,
}

fn group(item: &DataItem) -> u8 {
    match (item.sharing, item.is_vla()) {
        (Sharing::Capture, false) => 0,
        (Sharing::Capture, true) => 1,
        (Sharing::CaptureAddress, _) | (Sharing::Shared, false) => 2,
        (Sharing::Shared, true) => 3,
        (Sharing::Private, _) => 4,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutField {
    pub name: String,
    pub typ: Type,
    pub item: DataItem,
}

impl LayoutField {
    pub fn is_overallocated(&self) -> bool {
        self.item.is_overallocated()
    }
}

/// Where a capture block lives at the call site.
pub struct Instance {
    symbol: Symbol,
    by_pointer: bool,
}

impl Instance {
    /// A block reached through a pointer variable, such as `ol_args`.
    pub fn pointer(symbol: &Symbol) -> Self {
        Self {
            symbol: symbol.clone(),
            by_pointer: true,
        }
    }
    /// A structure variable on the stack.
    pub fn value(symbol: &Symbol) -> Self {
        Self {
            symbol: symbol.clone(),
            by_pointer: false,
        }
    }
    pub fn field(&self, name: &str) -> ExprRef {
        let base = build::sym(&self.symbol);
        if self.by_pointer {
            build::arrow(base, name)
        } else {
            build::member(base, name)
        }
    }
    pub fn address(&self) -> ExprRef {
        let base = build::sym(&self.symbol);
        if self.by_pointer {
            base
        } else {
            build::addr_of(base)
        }
    }
}

/// The capture structure of one construct.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureLayout {
    def: Arc<StructDef>,
    fields: Vec<LayoutField>,
}

/// Build the capture structure `struct <tag>` for the non-private items.
pub fn synthesize(info: &OutlineInfo, order: FieldOrder, tag: &str) -> CaptureLayout {
    let mut items: Vec<&DataItem> = info
        .iter()
        .filter(|item| item.field_type.is_some())
        .collect();
    if order == FieldOrder::Grouped {
        items.sort_by_key(|item| group(item));
    }
    let fields: Vec<LayoutField> = items
        .into_iter()
        .filter_map(|item| {
            let typ = item.field_type.clone()?;
            Some(LayoutField {
                name: item.field_name.clone(),
                typ,
                item: item.clone(),
            })
        })
        .collect();
    let def = StructDef::new(
        tag,
        fields
            .iter()
            .map(|field| Field {
                name: field.name.clone(),
                typ: field.typ.clone(),
            })
            .collect(),
    );
    CaptureLayout {
        def: Arc::new(def),
        fields,
    }
}

impl CaptureLayout {
    pub fn typ(&self) -> Type {
        Type::Struct(self.def.clone())
    }
    pub fn item(&self) -> Item {
        Item::Struct(self.def.clone())
    }
    pub fn tag(&self) -> &str {
        &self.def.tag
    }
    pub fn fields(&self) -> &[LayoutField] {
        &self.fields
    }
    pub fn field(&self, symbol: &Symbol) -> Option<&LayoutField> {
        self.fields.iter().find(|field| field.item.symbol == *symbol)
    }
    pub fn is_overallocated(&self) -> bool {
        self.fields.iter().any(|field| field.is_overallocated())
    }
    /// Size of the fixed-size part when it is known at compile time.
    pub fn fixed_size(&self) -> Option<u64> {
        self.def.layout().map(|(_, size)| size)
    }
    /// `sizeof(struct T)` plus the rounded-up size of every overallocated
    /// array.
    pub fn size(&self) -> ExprRef {
        let mut size = build::sizeof_type(self.typ());
        for field in self.fields.iter().filter(|field| field.is_overallocated()) {
            let bytes = build::sizeof_expr(build::sym(&field.item.symbol));
            size = build::add(size, build::round_up(bytes, OVERALLOCATION_ALIGN));
        }
        size
    }
    pub fn alignment(&self) -> ExprRef {
        build::alignof_type(self.typ())
    }
    /// Statements that copy the current values into `instance`.
    ///
    /// Each instance walks its own cursor through the trailing storage.
    pub fn fill(&self, locals: &mut Locals, instance: &Instance) -> Vec<Stmt> {
        let mut stmts = vec![];
        let char_ptr = Type::Primitive(Primitive::Char).pointer();
        let cursor = if self.is_overallocated() {
            let name = format!("{}_cursor", instance.symbol.name());
            let cursor = locals.local(&name, char_ptr.clone());
            let start = build::add(instance.address(), build::int(1));
            stmts.push(build::decl(&cursor, Some(build::cast(char_ptr.clone(), start))));
            Some(build::sym(&cursor))
        } else {
            None
        };
        for field in &self.fields {
            let target = instance.field(&field.name);
            let value = build::sym(&field.item.symbol);
            match field.item.sharing {
                Sharing::Capture => match &cursor {
                    Some(cursor) if field.is_overallocated() => {
                        let aligned =
                            build::align_up(cursor.clone(), OVERALLOCATION_ALIGN, char_ptr.clone());
                        stmts.push(build::assign(cursor.clone(), aligned));
                        stmts.push(build::assign(target.clone(), cursor.clone()));
                        let size = build::sizeof_expr(value.clone());
                        stmts.push(build::memcpy(target, build::addr_of(value), size.clone()));
                        stmts.push(build::add_assign(cursor.clone(), size));
                    }
                    _ if field.typ.is_array() => {
                        let size = build::sizeof_expr(value.clone());
                        stmts.push(build::memcpy(
                            build::addr_of(target),
                            build::addr_of(value),
                            size,
                        ));
                    }
                    _ => stmts.push(build::assign(target, value)),
                },
                Sharing::Shared => stmts.push(build::assign(target, build::addr_of(value))),
                Sharing::CaptureAddress => {
                    let object = field.item.shared_expression.clone().unwrap_or(value);
                    stmts.push(build::assign(target, build::addr_of(object)));
                }
                Sharing::Private => {}
            }
        }
        stmts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostics;
    use crate::frontend::Parser;
    use crate::ir::Construct;
    use crate::ir::SymbolKind;
    use crate::ir::SymbolTable;
    use crate::ir::TranslationUnit;
    use crate::lower::outline_info::classify;
    use crate::lower::outline_info::ConstructKind;
    use std::collections::HashSet;

    fn align_up(value: u64, align: u64) -> u64 {
        value.div_ceil(align) * align
    }

    /// Byte offsets of overallocated data, as the fill code computes them.
    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Overallocation {
        offsets: Vec<u64>,
        total: u64,
    }

    /// Offsets of arrays with the given runtime sizes placed after `fixed`
    /// bytes, and the size that is allocated for them.
    fn overallocate(fixed: u64, sizes: &[u64]) -> Overallocation {
        let mut offsets = vec![];
        let mut cursor = fixed;
        for size in sizes {
            let offset = align_up(cursor, OVERALLOCATION_ALIGN);
            offsets.push(offset);
            cursor = offset + size;
        }
        let total = fixed
            + sizes
                .iter()
                .map(|size| align_up(*size, OVERALLOCATION_ALIGN))
                .sum::<u64>();
        Overallocation { offsets, total }
    }

    fn fill(layout: &CaptureLayout, symbols: &mut SymbolTable, instance: &Instance) -> Vec<Stmt> {
        let reserved = HashSet::new();
        layout.fill(&mut Locals::new(symbols, &reserved), instance)
    }

    fn info(src: &str) -> (TranslationUnit, OutlineInfo) {
        let unit = Parser::parse(src).unwrap();
        let function = unit.functions().last().unwrap();
        let directive = function
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
        (unit, info)
    }

    const SRC: &str = indoc::indoc! {"
    void f(int n) {
      float v[n];
      int s;
      double d[4];
      #pragma omp task shared(s) firstprivate(v, d) depend(out: s)
      v[0] = s + d[0];
    }
    "};

    #[test]
    fn test_field_order() {
        let (_, info) = info(SRC);
        let grouped = synthesize(&info, FieldOrder::Grouped, "args");
        let names: Vec<&str> = grouped.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["d", "n", "v", "s"]);
        let again = synthesize(&info, FieldOrder::Grouped, "args");
        assert_eq!(grouped, again);
        let insertion = synthesize(&info, FieldOrder::Insertion, "args");
        let names: Vec<&str> = insertion.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["s", "v", "d", "n"]);
        assert_eq!(
            grouped.item().to_string(),
            "struct args {\n  double d[4];\n  int n;\n  void *v;\n  int *s;\n};"
        );
    }

    #[test]
    fn test_size_and_fill() {
        let (mut unit, info) = info(SRC);
        let layout = synthesize(&info, FieldOrder::Grouped, "args");
        assert!(layout.is_overallocated());
        assert_eq!(
            layout.size().to_string(),
            "sizeof(struct args) + (sizeof(v) + 7 & ~7)"
        );
        let typ = layout.typ().pointer();
        let args = unit.symbols.new_symbol("ol_args", typ, SymbolKind::Synthetic);
        let stmts = fill(&layout, &mut unit.symbols, &Instance::pointer(&args));
        let lines: Vec<String> = stmts.iter().map(|stmt| stmt.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "char *ol_args_cursor = (char *) (ol_args + 1);",
                "__builtin_memcpy(&ol_args->d, &d, sizeof(d));",
                "ol_args->n = n;",
                "ol_args_cursor = (char *) ((uintptr_t) ol_args_cursor + 7 & ~7);",
                "ol_args->v = ol_args_cursor;",
                "__builtin_memcpy(ol_args->v, &v, sizeof(v));",
                "ol_args_cursor += sizeof(v);",
                "ol_args->s = &s;",
            ]
        );
        let imm = unit
            .symbols
            .new_symbol("imm_args", layout.typ(), SymbolKind::Synthetic);
        let stmts = fill(&layout, &mut unit.symbols, &Instance::value(&imm));
        assert_eq!(
            stmts[0].to_string(),
            "char *imm_args_cursor = (char *) (&imm_args + 1);"
        );
        assert_eq!(stmts[2].to_string(), "imm_args.n = n;");
    }

    #[test]
    fn test_overallocation() {
        let sizes = [5, 12, 8, 1];
        let fixed = 24;
        let result = overallocate(fixed, &sizes);
        assert_eq!(result.offsets, vec![24, 32, 48, 56]);
        assert_eq!(result.total, 24 + 8 + 16 + 8 + 8);
        for (i, offset) in result.offsets.iter().enumerate() {
            assert_eq!(offset % OVERALLOCATION_ALIGN, 0);
            let end = offset + sizes[i];
            let next = result.offsets.get(i + 1).copied().unwrap_or(result.total);
            assert!(end <= next);
        }
        // Both instances compute the same offsets independently.
        assert_eq!(overallocate(fixed, &sizes), result);
        assert_eq!(overallocate(16, &[]).total, 16);
    }
}
