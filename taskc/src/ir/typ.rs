use crate::ir::ExprRef;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

/// Sizes follow the LP64 data model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    LongDouble,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Bool => "_Bool",
            Primitive::Char => "char",
            Primitive::SignedChar => "signed char",
            Primitive::UnsignedChar => "unsigned char",
            Primitive::Short => "short",
            Primitive::UnsignedShort => "unsigned short",
            Primitive::Int => "int",
            Primitive::UnsignedInt => "unsigned int",
            Primitive::Long => "long",
            Primitive::UnsignedLong => "unsigned long",
            Primitive::LongLong => "long long",
            Primitive::UnsignedLongLong => "unsigned long long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::LongDouble => "long double",
        }
    }
    pub fn size(&self) -> u64 {
        match self {
            Primitive::Bool | Primitive::Char | Primitive::SignedChar | Primitive::UnsignedChar => 1,
            Primitive::Short | Primitive::UnsignedShort => 2,
            Primitive::Int | Primitive::UnsignedInt | Primitive::Float => 4,
            Primitive::Long
            | Primitive::UnsignedLong
            | Primitive::LongLong
            | Primitive::UnsignedLongLong
            | Primitive::Double => 8,
            Primitive::LongDouble => 16,
        }
    }
    pub fn is_integral(&self) -> bool {
        !matches!(
            self,
            Primitive::Float | Primitive::Double | Primitive::LongDouble
        )
    }
}

/// Sizes of the typedef names that lowering and common headers use.
fn named_size(name: &str) -> Option<u64> {
    let size = match name {
        "int8_t" | "uint8_t" | "kmp_uint8" => 1,
        "int16_t" | "uint16_t" => 2,
        "int32_t" | "uint32_t" | "kmp_int32" => 4,
        "int64_t" | "uint64_t" | "size_t" | "ssize_t" | "ptrdiff_t" | "intptr_t"
        | "uintptr_t" | "kmp_intptr_t" => 8,
        _ => return None,
    };
    Some(size)
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArraySize {
    Fixed(u64),
    /// A runtime extent, which makes the array a variable-length array.
    Variable(ExprRef),
    /// `[]`, for example in `extern int a[];`.
    Unknown,
}

impl Display for ArraySize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ArraySize::Fixed(n) => write!(f, "{n}"),
            ArraySize::Variable(expr) => write!(f, "{expr}"),
            ArraySize::Unknown => Ok(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub typ: Type,
}

#[derive(Debug, PartialEq)]
pub struct StructDef {
    pub tag: String,
    pub fields: Vec<Field>,
}

impl StructDef {
    pub fn new(tag: &str, fields: Vec<Field>) -> Self {
        Self {
            tag: tag.to_string(),
            fields,
        }
    }
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }
    /// Field offsets and the total (padded) size, when every field has a
    /// statically known size.
    pub fn layout(&self) -> Option<(Vec<u64>, u64)> {
        let mut offsets = vec![];
        let mut offset = 0;
        let mut max_align = 1;
        for field in &self.fields {
            let size = field.typ.size_of()?;
            let align = field.typ.align_of()?;
            max_align = max_align.max(align);
            offset = align_to(offset, align);
            offsets.push(offset);
            offset += size;
        }
        Some((offsets, align_to(offset, max_align)))
    }
}

fn align_to(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    Void,
    Primitive(Primitive),
    /// A typedef name such as `size_t` or `kmp_task_t`.
    Named(String),
    Struct(Arc<StructDef>),
    Pointer(Box<Type>),
    Array {
        element: Box<Type>,
        size: ArraySize,
    },
    Function {
        ret: Box<Type>,
        params: Vec<Type>,
    },
}

impl Type {
    pub fn named(name: &str) -> Type {
        Type::Named(name.to_string())
    }
    pub fn pointer(self) -> Type {
        Type::Pointer(Box::new(self))
    }
    pub fn array(self, size: ArraySize) -> Type {
        Type::Array {
            element: Box::new(self),
            size,
        }
    }
    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array { .. })
    }
    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }
    pub fn is_integral(&self) -> bool {
        match self {
            Type::Primitive(p) => p.is_integral(),
            Type::Named(name) => named_size(name).is_some(),
            _ => false,
        }
    }
    /// Whether the type is a variable-length array.
    ///
    /// Pointers are followed, so a pointer to a variable-length array counts
    /// as well. An array is variable-length when any of its extents is a
    /// runtime expression.
    pub fn is_vla(&self) -> bool {
        match self {
            Type::Pointer(pointee) => pointee.is_vla(),
            Type::Array { element, size } => {
                matches!(size, ArraySize::Variable(_)) || element.is_vla()
            }
            _ => false,
        }
    }
    /// Number of nested array levels.
    pub fn array_depth(&self) -> usize {
        match self {
            Type::Array { element, .. } => 1 + element.array_depth(),
            _ => 0,
        }
    }
    pub fn array_element(&self) -> Option<&Type> {
        match self {
            Type::Array { element, .. } => Some(element),
            _ => None,
        }
    }
    pub fn array_size(&self) -> Option<&ArraySize> {
        match self {
            Type::Array { size, .. } => Some(size),
            _ => None,
        }
    }
    pub fn points_to(&self) -> Option<&Type> {
        match self {
            Type::Pointer(pointee) => Some(pointee),
            _ => None,
        }
    }
    /// The type that remains after stripping all array levels.
    pub fn innermost_element(&self) -> &Type {
        match self {
            Type::Array { element, .. } => element.innermost_element(),
            _ => self,
        }
    }
    /// Arrays decay to pointers to their first element.
    pub fn decay(&self) -> Type {
        match self {
            Type::Array { element, .. } => element.as_ref().clone().pointer(),
            Type::Function { .. } => self.clone().pointer(),
            _ => self.clone(),
        }
    }
    /// The runtime extents of the type, walking arrays and pointers.
    pub fn vla_sizes(&self) -> Vec<ExprRef> {
        match self {
            Type::Pointer(pointee) => pointee.vla_sizes(),
            Type::Array { element, size } => {
                let mut sizes = match size {
                    ArraySize::Variable(expr) => vec![expr.clone()],
                    _ => vec![],
                };
                sizes.extend(element.vla_sizes());
                sizes
            }
            _ => vec![],
        }
    }
    /// The size in bytes when it is known at compile time.
    pub fn size_of(&self) -> Option<u64> {
        match self {
            Type::Void | Type::Function { .. } => None,
            Type::Primitive(p) => Some(p.size()),
            Type::Named(name) => named_size(name),
            Type::Struct(def) => def.layout().map(|(_, size)| size),
            Type::Pointer(_) => Some(8),
            Type::Array { element, size } => match size {
                ArraySize::Fixed(n) => element.size_of().map(|size| size * n),
                _ => None,
            },
        }
    }
    pub fn align_of(&self) -> Option<u64> {
        match self {
            Type::Void | Type::Function { .. } => None,
            Type::Primitive(p) => Some(p.size()),
            Type::Named(name) => named_size(name),
            Type::Struct(def) => {
                let mut align = 1;
                for field in &def.fields {
                    align = align.max(field.typ.align_of()?);
                }
                Some(align)
            }
            Type::Pointer(_) => Some(8),
            Type::Array { element, .. } => element.align_of(),
        }
    }
    fn base_name(&self) -> String {
        match self {
            Type::Void => "void".to_string(),
            Type::Primitive(p) => p.name().to_string(),
            Type::Named(name) => name.clone(),
            Type::Struct(def) => format!("struct {}", def.tag),
            _ => unreachable!("not a base type"),
        }
    }
    /// Render a C declaration of `name` with this type.
    ///
    /// An empty name renders an abstract declarator, as used in casts and
    /// `sizeof`.
    pub fn declare(&self, name: &str) -> String {
        let mut decl = name.to_string();
        let mut typ = self;
        loop {
            match typ {
                Type::Pointer(pointee) => {
                    decl = format!("*{decl}");
                    typ = pointee;
                }
                Type::Array { element, size } => {
                    if decl.starts_with('*') {
                        decl = format!("({decl})");
                    }
                    decl = format!("{decl}[{size}]");
                    typ = element;
                }
                Type::Function { ret, params } => {
                    if decl.starts_with('*') {
                        decl = format!("({decl})");
                    }
                    let params = if params.is_empty() {
                        "void".to_string()
                    } else {
                        params
                            .iter()
                            .map(|param| param.to_string())
                            .collect::<Vec<String>>()
                            .join(", ")
                    };
                    decl = format!("{decl}({params})");
                    typ = ret;
                }
                base => {
                    let base = base.base_name();
                    return if decl.is_empty() {
                        base
                    } else {
                        format!("{base} {decl}")
                    };
                }
            }
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.declare(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Expr;

    fn int() -> Type {
        Type::Primitive(Primitive::Int)
    }

    #[test]
    fn test_declare() {
        assert_eq!(int().declare("x"), "int x");
        assert_eq!(int().pointer().declare("p"), "int *p");
        assert_eq!(int().pointer().to_string(), "int *");
        let matrix = int()
            .array(ArraySize::Fixed(3))
            .array(ArraySize::Fixed(2));
        assert_eq!(matrix.declare("m"), "int m[2][3]");
        let row = int().array(ArraySize::Fixed(3)).pointer();
        assert_eq!(row.declare("r"), "int (*r)[3]");
        assert_eq!(row.to_string(), "int (*)[3]");
        let n = Arc::new(Expr::Name("n".to_string()));
        let vla = Type::Primitive(Primitive::Float).array(ArraySize::Variable(n));
        assert_eq!(vla.declare("a"), "float a[n]");
        let routine = Type::Function {
            ret: Box::new(Type::named("kmp_int32")),
            params: vec![Type::named("kmp_int32"), Type::named("void").pointer()],
        };
        assert_eq!(routine.pointer().declare("f"), "kmp_int32 (*f)(kmp_int32, void *)");
    }

    #[test]
    fn test_vla() {
        let n = Arc::new(Expr::Name("n".to_string()));
        let fixed = int().array(ArraySize::Fixed(10));
        assert!(!fixed.is_vla());
        assert!(!int().is_vla());
        let inner = int().array(ArraySize::Variable(n.clone()));
        assert!(inner.is_vla());
        let outer_fixed = inner.clone().array(ArraySize::Fixed(10));
        assert!(outer_fixed.is_vla());
        assert!(inner.clone().pointer().is_vla());
        assert_eq!(outer_fixed.vla_sizes(), vec![n]);
        assert_eq!(outer_fixed.array_depth(), 2);
        assert_eq!(outer_fixed.size_of(), None);
    }

    #[test]
    fn test_sizes() {
        let float = Type::Primitive(Primitive::Float);
        assert_eq!(float.clone().array(ArraySize::Fixed(100)).size_of(), Some(400));
        let def = StructDef::new(
            "s",
            vec![
                Field {
                    name: "c".to_string(),
                    typ: Type::Primitive(Primitive::Char),
                },
                Field {
                    name: "d".to_string(),
                    typ: Type::Primitive(Primitive::Double),
                },
                Field {
                    name: "f".to_string(),
                    typ: float,
                },
            ],
        );
        assert_eq!(def.layout(), Some((vec![0, 8, 16], 24)));
        assert_eq!(Type::Struct(Arc::new(def)).align_of(), Some(8));
    }
}
