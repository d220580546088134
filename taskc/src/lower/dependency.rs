//! Dependency descriptors for region expressions such as `a[i][0:n]`.
//!
//! A region is described per array axis, from the outermost axis inwards.
//! The innermost axis is measured in bytes; every outer axis records its
//! stride in bytes as `size` and its lower bound and length as counts. A
//! section on a pointer adds an outer axis of unknown extent.

use crate::config::Runtime;
use crate::ir::build;
use crate::ir::ArraySize;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::Stmt;
use crate::ir::Type;
use crate::ir::Directionality;
use crate::lower::outline_info::contains_section;
use crate::lower::outline_info::Dependency;
use crate::lower::outline_info::OutlineInfo;
use crate::lower::strategy::DependencyFlags;
use crate::lower::strategy::DescriptorShape;
use crate::lower::strategy::SerializationStrategy;
use crate::lower::Locals;
use anyhow::Result;

#[derive(Clone, Debug, PartialEq)]
pub struct Dimension {
    pub size: ExprRef,
    pub lower_bound: ExprRef,
    pub accessed_length: ExprRef,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DependencyDescriptor {
    pub base_address: ExprRef,
    pub element_size: ExprRef,
    /// Outermost first.
    pub dimensions: Vec<Dimension>,
    pub flags: DependencyFlags,
    /// Byte offset of the region from `base_address`.
    pub offset: ExprRef,
    /// Number of bytes covered by the region.
    pub size: ExprRef,
}

enum Accessor {
    Index(ExprRef),
    Section {
        lower: Option<ExprRef>,
        length: Option<ExprRef>,
    },
}

/// One subscript or section and the expression it applies to.
struct Access {
    base: ExprRef,
    accessor: Accessor,
}

impl Access {
    fn is_section(&self) -> bool {
        matches!(self.accessor, Accessor::Section { .. })
    }
}

/// Split `a[i][0:n]` into `a` and its accessors, outermost axis first.
fn accessors(expr: &ExprRef) -> (ExprRef, Vec<Access>) {
    let mut accesses = vec![];
    let mut current = expr.clone();
    loop {
        let next = match current.as_ref() {
            Expr::Subscript { base, index } => {
                accesses.push(Access {
                    base: base.clone(),
                    accessor: Accessor::Index(index.clone()),
                });
                base.clone()
            }
            Expr::Section {
                base,
                lower,
                length,
            } => {
                accesses.push(Access {
                    base: base.clone(),
                    accessor: Accessor::Section {
                        lower: lower.clone(),
                        length: length.clone(),
                    },
                });
                base.clone()
            }
            _ => break,
        };
        current = next;
    }
    accesses.reverse();
    (current, accesses)
}

/// Re-root a sectioned access chain at the last prefix that is a pointer,
/// so that `pp[i][0:n]` is described from the row `pp[i]`.
fn reroot(
    root: ExprRef,
    mut accesses: Vec<Access>,
    expr: &ExprRef,
) -> Result<(ExprRef, Vec<Access>)> {
    let last_pointer = accesses
        .iter()
        .rposition(|access| matches!(access.base.typ(), Type::Pointer(_)));
    match last_pointer {
        Some(0) | None => Ok((root, accesses)),
        Some(k) => {
            if accesses[..k].iter().any(Access::is_section) {
                anyhow::bail!("Unsupported dependency shape `{expr}`");
            }
            let rest = accesses.split_off(k);
            Ok((rest[0].base.clone(), rest))
        }
    }
}

fn extent(size: &ArraySize) -> Option<ExprRef> {
    match size {
        ArraySize::Fixed(n) => Some(build::int(*n as i64)),
        ArraySize::Variable(expr) => Some(expr.clone()),
        ArraySize::Unknown => None,
    }
}

/// The extents of every array level and the element type below them.
fn axes(typ: &Type) -> (Vec<Option<ExprRef>>, Type) {
    let mut extents = vec![];
    let mut current = typ;
    while let Type::Array { element, size } = current {
        extents.push(extent(size));
        current = element;
    }
    (extents, current.clone())
}

fn element_size(element: &Type, expr: &ExprRef) -> Result<ExprRef> {
    if matches!(element, Type::Void | Type::Function { .. }) {
        anyhow::bail!("The element size of dependency `{expr}` is unknown");
    }
    let size = match element.size_of() {
        Some(size) => build::int(size as i64),
        None => build::sizeof_type(element.clone()),
    };
    Ok(size)
}

fn product(factors: &[ExprRef]) -> Option<ExprRef> {
    let mut factors = factors.iter();
    let first = factors.next()?.clone();
    Some(factors.fold(first, |acc, factor| build::mul(acc, factor.clone())))
}

/// Build the descriptor of one region expression.
///
/// Fails when the region cannot be described: an extent that a stride needs
/// is unknown, the expression has more subscripts than its object has
/// axes, or the element type has no size.
pub fn build_descriptor(expr: &ExprRef, flags: DependencyFlags) -> Result<DependencyDescriptor> {
    let (root, accesses) = accessors(expr);
    let has_section = accesses.iter().any(Access::is_section);
    let (base_address, extents, element, accesses) = if has_section {
        let (root, accesses) = reroot(root, accesses, expr)?;
        let typ = root.typ();
        match &typ {
            Type::Pointer(pointee) => {
                let (mut extents, element) = axes(pointee);
                extents.insert(0, None);
                (root.clone(), extents, element, accesses)
            }
            _ => {
                let (extents, element) = axes(&typ);
                (build::addr_of(root.clone()), extents, element, accesses)
            }
        }
    } else {
        if contains_section(expr) {
            anyhow::bail!("Unsupported dependency shape `{expr}`");
        }
        let (extents, element) = axes(&expr.typ());
        (build::addr_of(expr.clone()), extents, element, vec![])
    };
    if accesses.len() > extents.len() {
        anyhow::bail!(
            "Dependency `{expr}` has {} subscripts but its object has {} dimensions",
            accesses.len(),
            extents.len()
        );
    }
    let z = element_size(&element, expr)?;
    if extents.is_empty() {
        let dimension = Dimension {
            size: z.clone(),
            lower_bound: build::int(0),
            accessed_length: z.clone(),
        };
        return Ok(DependencyDescriptor {
            base_address,
            element_size: z.clone(),
            dimensions: vec![dimension],
            flags,
            offset: build::int(0),
            size: z,
        });
    }

    let mut ranges: Vec<(ExprRef, ExprRef)> = vec![];
    for (i, extent) in extents.iter().enumerate() {
        let access = match accesses.get(i).map(|access| &access.accessor) {
            Some(Accessor::Index(index)) => (index.clone(), build::int(1)),
            Some(Accessor::Section { lower, length }) => {
                let lower = lower.clone().unwrap_or_else(|| build::int(0));
                let length = match (length, extent) {
                    (Some(length), _) => length.clone(),
                    (None, Some(extent)) => build::sub(extent.clone(), lower.clone()),
                    (None, None) => {
                        anyhow::bail!("The length of dependency `{expr}` is unknown")
                    }
                };
                (lower, length)
            }
            None => match extent {
                Some(extent) => (build::int(0), extent.clone()),
                None => anyhow::bail!("The extent of dependency `{expr}` is unknown"),
            },
        };
        ranges.push(access);
    }

    let d = extents.len();
    let mut strides = vec![];
    for i in 0..d {
        let mut inner = vec![];
        for extent in &extents[i + 1..] {
            match extent {
                Some(extent) => inner.push(extent.clone()),
                None => anyhow::bail!("Dependency `{expr}` needs an array extent that is unknown"),
            }
        }
        let stride = match product(&inner) {
            Some(product) => build::mul(product, z.clone()),
            None => z.clone(),
        };
        strides.push(stride);
    }

    let mut dimensions = vec![];
    for (i, (lower, length)) in ranges.iter().enumerate() {
        let dimension = if i == d - 1 {
            let bytes = build::mul(length.clone(), z.clone());
            Dimension {
                size: bytes.clone(),
                lower_bound: lower.clone(),
                accessed_length: bytes,
            }
        } else {
            Dimension {
                size: strides[i].clone(),
                lower_bound: lower.clone(),
                accessed_length: length.clone(),
            }
        };
        dimensions.push(dimension);
    }

    let mut offset = build::int(0);
    for ((lower, _), stride) in ranges.iter().zip(&strides) {
        if lower.constant() == Some(0) {
            continue;
        }
        offset = build::add(offset, build::mul(lower.clone(), stride.clone()));
    }
    let lengths: Vec<ExprRef> = ranges.iter().map(|(_, length)| length.clone()).collect();
    let size = match product(&lengths) {
        Some(count) => build::mul(count, z.clone()),
        None => z.clone(),
    };
    Ok(DependencyDescriptor {
        base_address,
        element_size: z,
        dimensions,
        flags,
        offset,
        size,
    })
}

/// Position of a dependency in the `kmp_depend_info_t` array: inputs, then
/// outputs, then everything that both reads and writes.
fn kmp_rank(directionality: Directionality) -> u8 {
    if directionality == Directionality::IN {
        0
    } else if directionality == Directionality::OUT {
        1
    } else {
        2
    }
}

/// Descriptors for every dependency of `info`, by item and clause order.
///
/// The KMP runtime receives its inputs first, then its outputs, then its
/// inout dependencies, each group in clause order.
pub fn descriptors(
    info: &OutlineInfo,
    strategy: &SerializationStrategy,
) -> Result<Vec<DependencyDescriptor>> {
    let mut dependencies: Vec<&Dependency> = info.dependencies().map(|(_, dep)| dep).collect();
    if strategy.runtime == Runtime::Kmp {
        dependencies.sort_by_key(|dependency| kmp_rank(dependency.directionality));
    }
    let mut descriptors = vec![];
    for dependency in dependencies {
        let flags = strategy.flags(dependency.directionality);
        let descriptor = build_descriptor(&dependency.expr, flags)
            .map_err(|e| anyhow::anyhow!("{}: {e}", dependency.loc))?;
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

/// The declarations that describe the dependencies to the runtime.
pub struct SerializedDependencies {
    pub stmts: Vec<Stmt>,
    /// The descriptor array, if one is declared.
    pub array: Option<ExprRef>,
    pub count: usize,
}

impl SerializedDependencies {
    pub fn count(&self) -> ExprRef {
        build::int(self.count as i64)
    }
}

fn bit(value: bool) -> ExprRef {
    build::int(value as i64)
}

pub fn serialize(
    strategy: &SerializationStrategy,
    descriptors: &[DependencyDescriptor],
    locals: &mut Locals,
) -> SerializedDependencies {
    match (strategy.runtime, strategy.shape) {
        (Runtime::Kmp, _) => kmp_dependencies(strategy, descriptors, locals),
        (Runtime::Nanos, DescriptorShape::Dimensions) => {
            nanos_regions(strategy, descriptors, locals)
        }
        (Runtime::Nanos, DescriptorShape::Flat) => nanos_flat(strategy, descriptors, locals),
    }
}

/// `nanos_data_access_t` entries with region arrays, contiguous axis first.
fn nanos_regions(
    strategy: &SerializationStrategy,
    descriptors: &[DependencyDescriptor],
    locals: &mut Locals,
) -> SerializedDependencies {
    let mut stmts = vec![];
    let mut accesses = vec![];
    for (i, descriptor) in descriptors.iter().enumerate() {
        let count = descriptor.dimensions.len();
        let typ = Type::named("nanos_region_dimension_t").array(ArraySize::Fixed(count as u64));
        let name = format!("dimensions_{i}");
        let dimensions = locals.local(&name, typ);
        let rows = descriptor
            .dimensions
            .iter()
            .rev()
            .map(|dimension| {
                build::init(vec![
                    dimension.size.clone(),
                    dimension.lower_bound.clone(),
                    dimension.accessed_length.clone(),
                ])
            })
            .collect();
        stmts.push(build::decl(&dimensions, Some(build::init(rows))));
        let flags = descriptor.flags;
        accesses.push(build::init(vec![
            build::cast(Type::Void.pointer(), descriptor.base_address.clone()),
            build::init(vec![
                bit(flags.input),
                bit(flags.output),
                build::int(0),
                bit(flags.concurrent),
                build::int(0),
            ]),
            build::int(count as i64),
            build::sym(&dimensions),
            build::int(0),
        ]));
    }
    let capacity = descriptors.len().max(1) as u64;
    let typ = strategy.abi().dependency.array(ArraySize::Fixed(capacity));
    let array = locals.local("dependences", typ);
    let init = if accesses.is_empty() {
        None
    } else {
        Some(build::init(accesses))
    };
    stmts.push(build::decl(&array, init));
    SerializedDependencies {
        stmts,
        array: Some(build::sym(&array)),
        count: descriptors.len(),
    }
}

/// `nanos_dependence_t` entries with a byte offset and size.
fn nanos_flat(
    strategy: &SerializationStrategy,
    descriptors: &[DependencyDescriptor],
    locals: &mut Locals,
) -> SerializedDependencies {
    let capacity = descriptors.len().max(1) as u64;
    let typ = strategy.abi().dependency.array(ArraySize::Fixed(capacity));
    let array = locals.local("dependences", typ);
    let mut stmts = vec![build::decl(&array, None)];
    for (i, descriptor) in descriptors.iter().enumerate() {
        let entry = build::subscript(build::sym(&array), build::int(i as i64));
        let field = |name: &str| build::member(entry.clone(), name);
        let flag = |name: &str| build::member(field("flags"), name);
        let flags = descriptor.flags;
        let address = build::cast(Type::Void.pointer(), descriptor.base_address.clone());
        stmts.push(build::assign(field("address"), address));
        stmts.push(build::assign(field("offset"), descriptor.offset.clone()));
        stmts.push(build::assign(field("size"), descriptor.size.clone()));
        stmts.push(build::assign(flag("input"), bit(flags.input)));
        stmts.push(build::assign(flag("output"), bit(flags.output)));
        stmts.push(build::assign(flag("can_rename"), build::int(0)));
        stmts.push(build::assign(flag("concurrent"), bit(flags.concurrent)));
    }
    SerializedDependencies {
        stmts,
        array: Some(build::sym(&array)),
        count: descriptors.len(),
    }
}

/// `kmp_depend_info_t` entries; no array is declared without dependencies.
fn kmp_dependencies(
    strategy: &SerializationStrategy,
    descriptors: &[DependencyDescriptor],
    locals: &mut Locals,
) -> SerializedDependencies {
    if descriptors.is_empty() {
        return SerializedDependencies {
            stmts: vec![],
            array: None,
            count: 0,
        };
    }
    let typ = strategy
        .abi()
        .dependency
        .array(ArraySize::Fixed(descriptors.len() as u64));
    let array = locals.local("_deps", typ);
    let mut stmts = vec![build::decl(&array, None)];
    let intptr = Type::named("kmp_intptr_t");
    for (i, descriptor) in descriptors.iter().enumerate() {
        let entry = build::subscript(build::sym(&array), build::int(i as i64));
        let field = |name: &str| build::member(entry.clone(), name);
        let flag = |name: &str| build::member(field("flags"), name);
        let address = if descriptor.offset.constant() == Some(0) {
            descriptor.base_address.clone()
        } else {
            let bytes = build::cast(
                Type::named("kmp_uint8").pointer(),
                descriptor.base_address.clone(),
            );
            build::add(bytes, descriptor.offset.clone())
        };
        let flags = descriptor.flags;
        stmts.push(build::assign(field("base_addr"), build::cast(intptr.clone(), address)));
        stmts.push(build::assign(field("len"), descriptor.size.clone()));
        stmts.push(build::assign(flag("in"), bit(flags.input)));
        stmts.push(build::assign(flag("out"), bit(flags.output)));
    }
    SerializedDependencies {
        stmts,
        array: Some(build::sym(&array)),
        count: descriptors.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeInterface;
    use crate::frontend::Parser;
    use crate::ir::ClauseKind;
    use crate::ir::Construct;
    use crate::ir::SymbolTable;
    use std::collections::HashSet;

    fn region(decls: &str, region: &str) -> ExprRef {
        let src = format!(
            "void f(int n, int m, int *p) {{\n{decls}\n#pragma omp task depend(inout: {region})\nn = n;\n}}"
        );
        let unit = Parser::parse(&src).unwrap();
        let function = unit.functions().next().unwrap();
        for stmt in &function.body {
            if let Stmt::Construct(construct) = stmt {
                if let Construct::Task(directive) = construct.as_ref() {
                    if let ClauseKind::Depend { exprs, .. } = &directive.clauses[0].kind {
                        return exprs[0].clone();
                    }
                }
            }
        }
        panic!("expected a dependency");
    }

    fn serialize_reserving(
        strategy: &SerializationStrategy,
        descriptors: &[DependencyDescriptor],
        reserved: &[&str],
    ) -> SerializedDependencies {
        let reserved: HashSet<String> = reserved.iter().map(|name| name.to_string()).collect();
        let mut symbols = SymbolTable::new();
        serialize(strategy, descriptors, &mut Locals::new(&mut symbols, &reserved))
    }

    fn serialize_all(
        strategy: &SerializationStrategy,
        descriptors: &[DependencyDescriptor],
    ) -> SerializedDependencies {
        serialize_reserving(strategy, descriptors, &[])
    }

    fn inout() -> DependencyFlags {
        DependencyFlags::new(Directionality::INOUT)
    }

    fn dimensions(descriptor: &DependencyDescriptor) -> Vec<String> {
        descriptor
            .dimensions
            .iter()
            .map(|d| format!("{}, {}, {}", d.size, d.lower_bound, d.accessed_length))
            .collect()
    }

    fn lines(stmts: &[Stmt]) -> Vec<String> {
        stmts.iter().map(|stmt| stmt.to_string()).collect()
    }

    #[test]
    fn test_scenario() {
        let expr = region("float a[100];", "a[0:n]");
        let flags = DependencyFlags::new(Directionality::OUT);
        let descriptor = build_descriptor(&expr, flags).unwrap();
        assert_eq!(dimensions(&descriptor), vec!["n * 4, 0, n * 4"]);
        assert_eq!(descriptor.base_address.to_string(), "&a");
        assert_eq!(descriptor.element_size.to_string(), "4");

        let strategy = SerializationStrategy::nanos(&RuntimeInterface::default());
        let descriptor = build_descriptor(&expr, strategy.flags(Directionality::OUT)).unwrap();
        let serialized = serialize_all(&strategy, &[descriptor]);
        assert_eq!(
            lines(&serialized.stmts),
            vec![
                "nanos_region_dimension_t dimensions_0[1] = {{n * 4, 0, n * 4}};",
                "nanos_data_access_t dependences[1] = {{(void *) &a, {0, 1, 0, 0, 0}, 1, dimensions_0, 0}};",
            ]
        );
        assert_eq!(serialized.count, 1);
    }

    #[test]
    fn test_dimension_flattening() {
        let scalar = build_descriptor(&region("int x;", "x"), inout()).unwrap();
        assert_eq!(dimensions(&scalar), vec!["4, 0, 4"]);
        assert_eq!(scalar.base_address.to_string(), "&x");

        let one = build_descriptor(&region("double d1[10];", "d1[2:5]"), inout()).unwrap();
        assert_eq!(dimensions(&one), vec!["40, 2, 40"]);
        assert_eq!(one.offset.to_string(), "16");

        let two = build_descriptor(&region("int m2[4][8];", "m2[1:2][0:n]"), inout()).unwrap();
        assert_eq!(dimensions(&two), vec!["32, 1, 2", "n * 4, 0, n * 4"]);
        assert_eq!(two.offset.to_string(), "32");
        assert_eq!(two.size.to_string(), "2 * n * 4");

        let three =
            build_descriptor(&region("short c[2][3][5];", "c[0:2][1:1][0:5]"), inout()).unwrap();
        assert_eq!(
            dimensions(&three),
            vec!["30, 0, 2", "10, 1, 1", "10, 0, 10"]
        );
        assert_eq!(three.offset.to_string(), "10");
        assert_eq!(three.size.to_string(), "20");
    }

    #[test]
    fn test_symbolic_extents() {
        let vla = build_descriptor(&region("float v[n][m];", "v[1:2][:]"), inout()).unwrap();
        assert_eq!(dimensions(&vla), vec!["m * 4, 1, 2", "m * 4, 0, m * 4"]);
        assert_eq!(vla.base_address.to_string(), "&v");

        let pointer = build_descriptor(&region("", "p[0:n]"), inout()).unwrap();
        assert_eq!(dimensions(&pointer), vec!["n * 4, 0, n * 4"]);
        assert_eq!(pointer.base_address.to_string(), "p");

        let row = build_descriptor(&region("int m2[4][8];", "m2[3]"), inout()).unwrap();
        assert_eq!(dimensions(&row), vec!["32, 0, 32"]);
        assert_eq!(row.base_address.to_string(), "&m2[3]");
    }

    #[test]
    fn test_unsupported_shapes() {
        let void = region("void *q;", "q[0:n]");
        assert!(build_descriptor(&void, inout()).is_err());
        let deep = region("int m2[4][8];", "m2[0:1][0:2][0:3]");
        let err = build_descriptor(&deep, inout()).unwrap_err().to_string();
        assert!(err.contains("3 subscripts"));
        let open = region("", "p[1:]");
        let err = build_descriptor(&open, inout()).unwrap_err().to_string();
        assert!(err.contains("length"));
    }

    #[test]
    fn test_kmp_serialization() {
        let strategy = SerializationStrategy::kmp();
        let expr = region("int m2[4][8];", "m2[1:2][0:n]");
        let descriptor = build_descriptor(&expr, strategy.flags(Directionality::OUT)).unwrap();
        let serialized = serialize_all(&strategy, &[descriptor]);
        assert_eq!(
            lines(&serialized.stmts),
            vec![
                "kmp_depend_info_t _deps[1];",
                "_deps[0].base_addr = (kmp_intptr_t) ((kmp_uint8 *) &m2 + 32);",
                "_deps[0].len = 2 * n * 4;",
                "_deps[0].flags.in = 1;",
                "_deps[0].flags.out = 1;",
            ]
        );
        let empty = serialize_all(&strategy, &[]);
        assert!(empty.stmts.is_empty());
        assert!(empty.array.is_none());
    }

    #[test]
    fn test_zero_dependencies() {
        let current = SerializationStrategy::nanos(&RuntimeInterface::default());
        let serialized = serialize_all(&current, &[]);
        assert_eq!(
            lines(&serialized.stmts),
            vec!["nanos_data_access_t dependences[1];"]
        );
        assert_eq!(serialized.count().to_string(), "0");

        let mut interface = RuntimeInterface::default();
        interface.set("deps_api", 1000);
        let legacy = SerializationStrategy::nanos(&interface);
        let serialized = serialize_all(&legacy, &[]);
        assert_eq!(
            lines(&serialized.stmts),
            vec!["nanos_dependence_t dependences[1];"]
        );
    }

    #[test]
    fn test_legacy_flags() {
        let mut interface = RuntimeInterface::default();
        interface.set("deps_api", 1000);
        let legacy = SerializationStrategy::nanos(&interface);
        let expr = region("float a[100];", "a[0:n]");
        let descriptor = build_descriptor(&expr, legacy.flags(Directionality::OUT)).unwrap();
        let serialized = serialize_all(&legacy, &[descriptor]);
        assert_eq!(
            lines(&serialized.stmts),
            vec![
                "nanos_dependence_t dependences[1];",
                "dependences[0].address = (void *) &a;",
                "dependences[0].offset = 0;",
                "dependences[0].size = n * 4;",
                "dependences[0].flags.input = 1;",
                "dependences[0].flags.output = 1;",
                "dependences[0].flags.can_rename = 0;",
                "dependences[0].flags.concurrent = 0;",
            ]
        );
    }

    #[test]
    fn test_pointer_rows() {
        let row = build_descriptor(&region("float **pp;", "pp[n][0:m]"), inout()).unwrap();
        assert_eq!(dimensions(&row), vec!["m * 4, 0, m * 4"]);
        assert_eq!(row.base_address.to_string(), "pp[n]");
        assert_eq!(row.offset.to_string(), "0");

        let rows = build_descriptor(&region("float *rows[4];", "rows[1][2:m]"), inout()).unwrap();
        assert_eq!(dimensions(&rows), vec!["m * 4, 2, m * 4"]);
        assert_eq!(rows.base_address.to_string(), "rows[1]");
        assert_eq!(rows.offset.to_string(), "8");

        // Rows of a pointer array are not contiguous.
        let strided = region("float **pp;", "pp[0:2][0:m]");
        assert!(build_descriptor(&strided, inout()).is_err());
    }

    #[test]
    fn test_reserved_names() {
        let expr = region("int dependences[4];", "dependences[0:n]");
        let current = SerializationStrategy::nanos(&RuntimeInterface::default());
        let descriptor = build_descriptor(&expr, current.flags(Directionality::OUT)).unwrap();
        let reserved = ["dependences", "dimensions_0"];
        let serialized = serialize_reserving(&current, &[descriptor.clone()], &reserved);
        assert_eq!(
            lines(&serialized.stmts),
            vec![
                "nanos_region_dimension_t dimensions_0_1[1] = {{n * 4, 0, n * 4}};",
                "nanos_data_access_t dependences_1[1] = {{(void *) &dependences, {0, 1, 0, 0, 0}, 1, dimensions_0_1, 0}};",
            ]
        );

        let kmp = SerializationStrategy::kmp();
        let serialized = serialize_reserving(&kmp, &[descriptor], &["_deps"]);
        assert_eq!(lines(&serialized.stmts)[0], "kmp_depend_info_t _deps_1[1];");
        assert_eq!(
            lines(&serialized.stmts)[1],
            "_deps_1[0].base_addr = (kmp_intptr_t) &dependences;"
        );
    }
}
