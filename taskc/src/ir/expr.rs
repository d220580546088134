use crate::ir::ArraySize;
use crate::ir::Primitive;
use crate::ir::Symbol;
use crate::ir::SymbolKind;
use crate::ir::Type;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

/// Expressions are immutable and shared; rewriting produces new nodes.
pub type ExprRef = Arc<Expr>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    AddrOf,
    Deref,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::AddrOf => "&",
            UnaryOp::Deref => "*",
            UnaryOp::PreInc | UnaryOp::PostInc => "++",
            UnaryOp::PreDec | UnaryOp::PostDec => "--",
        }
    }
    fn is_postfix(&self) -> bool {
        matches!(self, UnaryOp::PostInc | UnaryOp::PostDec)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
    pub fn from_symbol(symbol: &str) -> Option<BinaryOp> {
        let op = match symbol {
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "&" => BinaryOp::BitAnd,
            "^" => BinaryOp::BitXor,
            "|" => BinaryOp::BitOr,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            _ => return None,
        };
        Some(op)
    }
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 13,
            BinaryOp::Add | BinaryOp::Sub => 12,
            BinaryOp::Shl | BinaryOp::Shr => 11,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 10,
            BinaryOp::Eq | BinaryOp::Ne => 9,
            BinaryOp::BitAnd => 8,
            BinaryOp::BitXor => 7,
            BinaryOp::BitOr => 6,
            BinaryOp::And => 5,
            BinaryOp::Or => 4,
        }
    }
    fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
    fn fold(&self, lhs: i64, rhs: i64) -> Option<i64> {
        let value = match self {
            BinaryOp::Mul => lhs.checked_mul(rhs)?,
            BinaryOp::Div => lhs.checked_div(rhs)?,
            BinaryOp::Rem => lhs.checked_rem(rhs)?,
            BinaryOp::Add => lhs.checked_add(rhs)?,
            BinaryOp::Sub => lhs.checked_sub(rhs)?,
            BinaryOp::Shl => lhs.checked_shl(u32::try_from(rhs).ok()?)?,
            BinaryOp::Shr => lhs.checked_shr(u32::try_from(rhs).ok()?)?,
            BinaryOp::Lt => (lhs < rhs) as i64,
            BinaryOp::Le => (lhs <= rhs) as i64,
            BinaryOp::Gt => (lhs > rhs) as i64,
            BinaryOp::Ge => (lhs >= rhs) as i64,
            BinaryOp::Eq => (lhs == rhs) as i64,
            BinaryOp::Ne => (lhs != rhs) as i64,
            BinaryOp::BitAnd => lhs & rhs,
            BinaryOp::BitXor => lhs ^ rhs,
            BinaryOp::BitOr => lhs | rhs,
            BinaryOp::And => (lhs != 0 && rhs != 0) as i64,
            BinaryOp::Or => (lhs != 0 || rhs != 0) as i64,
        };
        Some(value)
    }
}

/// A call argument, optionally passed by parameter name (`.n = 10`).
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub keyword: Option<String>,
    pub value: ExprRef,
}

impl Argument {
    pub fn positional(value: ExprRef) -> Self {
        Self {
            keyword: None,
            value,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Int(i64),
    /// A floating literal, kept as written.
    Float(String),
    /// A string literal including its quotes.
    Str(String),
    /// A character literal including its quotes.
    Char(String),
    Symbol(Symbol),
    /// An identifier that is not declared in the translation unit, such as
    /// runtime entry points and constants.
    Name(String),
    Unary {
        op: UnaryOp,
        operand: ExprRef,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    /// `lhs = rhs`, or a compound assignment such as `lhs += rhs`.
    Assign {
        op: Option<BinaryOp>,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    Conditional {
        cond: ExprRef,
        then: ExprRef,
        otherwise: ExprRef,
    },
    Subscript {
        base: ExprRef,
        index: ExprRef,
    },
    /// An array section `base[lower:length]`; both bounds may be omitted.
    Section {
        base: ExprRef,
        lower: Option<ExprRef>,
        length: Option<ExprRef>,
    },
    Member {
        base: ExprRef,
        field: String,
        arrow: bool,
    },
    Call {
        callee: ExprRef,
        args: Vec<Argument>,
    },
    Cast {
        typ: Type,
        operand: ExprRef,
    },
    SizeofType(Type),
    SizeofExpr(ExprRef),
    AlignofType(Type),
    /// A brace initializer list.
    Init(Vec<ExprRef>),
}

impl Expr {
    /// Binding strength, used to decide where parentheses are needed.
    pub fn precedence(&self) -> u8 {
        match self {
            Expr::Int(v) if *v < 0 => 14,
            Expr::Int(_)
            | Expr::Float(_)
            | Expr::Str(_)
            | Expr::Char(_)
            | Expr::Symbol(_)
            | Expr::Name(_)
            | Expr::Init(_) => 16,
            Expr::Unary { op, .. } if op.is_postfix() => 15,
            Expr::Subscript { .. }
            | Expr::Section { .. }
            | Expr::Member { .. }
            | Expr::Call { .. } => 15,
            Expr::Unary { .. }
            | Expr::Cast { .. }
            | Expr::SizeofType(_)
            | Expr::SizeofExpr(_)
            | Expr::AlignofType(_) => 14,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Conditional { .. } => 3,
            Expr::Assign { .. } => 2,
        }
    }
    pub fn typ(&self) -> Type {
        let int = Type::Primitive(Primitive::Int);
        match self {
            Expr::Int(v) => {
                if i32::try_from(*v).is_ok() {
                    int
                } else {
                    Type::Primitive(Primitive::Long)
                }
            }
            Expr::Float(lexeme) => {
                if lexeme.ends_with('f') || lexeme.ends_with('F') {
                    Type::Primitive(Primitive::Float)
                } else {
                    Type::Primitive(Primitive::Double)
                }
            }
            Expr::Str(_) => Type::Primitive(Primitive::Char).pointer(),
            Expr::Char(_) | Expr::Name(_) => int,
            Expr::Symbol(symbol) => symbol.typ().clone(),
            Expr::Unary { op, operand } => match op {
                UnaryOp::AddrOf => operand.typ().pointer(),
                UnaryOp::Deref => match operand.typ() {
                    Type::Pointer(pointee) => *pointee,
                    Type::Array { element, .. } => *element,
                    _ => int,
                },
                UnaryOp::Not => int,
                _ => operand.typ(),
            },
            Expr::Binary { op, lhs, rhs } => {
                if op.is_comparison() {
                    return int;
                }
                let lhs = lhs.typ().decay();
                let rhs = rhs.typ().decay();
                if lhs.is_pointer() && rhs.is_pointer() {
                    return Type::named("ptrdiff_t");
                }
                if lhs.is_pointer() {
                    return lhs;
                }
                if rhs.is_pointer() {
                    return rhs;
                }
                // Usual arithmetic conversions, simplified.
                let prefer_rhs = match (&lhs, &rhs) {
                    (Type::Primitive(l), Type::Primitive(r)) => {
                        if l.is_integral() != r.is_integral() {
                            l.is_integral()
                        } else {
                            r.size() > l.size()
                        }
                    }
                    _ => false,
                };
                if prefer_rhs {
                    rhs
                } else {
                    lhs
                }
            }
            Expr::Assign { lhs, .. } => lhs.typ(),
            Expr::Conditional { then, .. } => then.typ(),
            Expr::Subscript { base, .. } => match base.typ() {
                Type::Pointer(pointee) => *pointee,
                Type::Array { element, .. } => *element,
                _ => int,
            },
            Expr::Section { base, length, .. } => {
                let (element, full) = match base.typ() {
                    Type::Pointer(pointee) => (*pointee, ArraySize::Unknown),
                    Type::Array { element, size } => (*element, size),
                    _ => (int, ArraySize::Unknown),
                };
                let size = match length {
                    Some(length) => match length.constant() {
                        Some(n) if n >= 0 => ArraySize::Fixed(n as u64),
                        _ => ArraySize::Variable(length.clone()),
                    },
                    None => full,
                };
                element.array(size)
            }
            Expr::Member { base, field, arrow } => {
                let typ = match (*arrow, base.typ()) {
                    (true, Type::Pointer(pointee)) => *pointee,
                    (_, typ) => typ,
                };
                match typ {
                    Type::Struct(def) => match def.field(field) {
                        Some(field) => field.typ.clone(),
                        None => int,
                    },
                    _ => int,
                }
            }
            Expr::Call { callee, .. } => match callee.typ() {
                Type::Function { ret, .. } => *ret,
                Type::Pointer(pointee) => match *pointee {
                    Type::Function { ret, .. } => *ret,
                    _ => int,
                },
                _ => int,
            },
            Expr::Cast { typ, .. } => typ.clone(),
            Expr::SizeofType(_) | Expr::SizeofExpr(_) | Expr::AlignofType(_) => {
                Type::named("size_t")
            }
            Expr::Init(_) => Type::Void,
        }
    }
    /// Whether the expression designates an object in memory.
    pub fn is_lvalue(&self) -> bool {
        match self {
            Expr::Symbol(symbol) => symbol.kind() != SymbolKind::Function,
            Expr::Unary { op, .. } => *op == UnaryOp::Deref,
            Expr::Subscript { .. } | Expr::Section { .. } => true,
            Expr::Member { base, arrow, .. } => *arrow || base.is_lvalue(),
            _ => false,
        }
    }
    /// The compile-time integer value, if any.
    pub fn constant(&self) -> Option<i64> {
        match self {
            Expr::Int(v) => Some(*v),
            Expr::Unary { op, operand } => {
                let value = operand.constant()?;
                match op {
                    UnaryOp::Neg => value.checked_neg(),
                    UnaryOp::Plus => Some(value),
                    UnaryOp::Not => Some((value == 0) as i64),
                    UnaryOp::BitNot => Some(!value),
                    _ => None,
                }
            }
            Expr::Binary { op, lhs, rhs } => op.fold(lhs.constant()?, rhs.constant()?),
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if cond.constant()? != 0 {
                    then.constant()
                } else {
                    otherwise.constant()
                }
            }
            Expr::Cast { typ, operand } if typ.is_integral() => operand.constant(),
            Expr::SizeofType(typ) => typ.size_of().and_then(|size| i64::try_from(size).ok()),
            Expr::SizeofExpr(expr) => expr
                .typ()
                .size_of()
                .and_then(|size| i64::try_from(size).ok()),
            Expr::AlignofType(typ) => typ.align_of().and_then(|align| i64::try_from(align).ok()),
            _ => None,
        }
    }
    pub fn is_constant(&self) -> bool {
        self.constant().is_some()
    }
    /// The variable that the accessed object belongs to.
    ///
    /// For `a[i].x`, `p->y` and `*(p + 1)` these are `a`, `p` and `p`.
    pub fn base_symbol(&self) -> Option<Symbol> {
        match self {
            Expr::Symbol(symbol) => Some(symbol.clone()),
            Expr::Subscript { base, .. } | Expr::Section { base, .. } | Expr::Member { base, .. } => {
                base.base_symbol()
            }
            Expr::Unary {
                op: UnaryOp::Deref,
                operand,
            } => operand.base_symbol(),
            Expr::Binary {
                op: BinaryOp::Add | BinaryOp::Sub,
                lhs,
                ..
            } => {
                let typ = lhs.typ();
                if typ.is_pointer() || typ.is_array() {
                    lhs.base_symbol()
                } else {
                    None
                }
            }
            _ => None,
        }
    }
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Expr::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }
    /// Direct subexpressions, in evaluation order.
    pub fn children(&self) -> Vec<&ExprRef> {
        match self {
            Expr::Int(_)
            | Expr::Float(_)
            | Expr::Str(_)
            | Expr::Char(_)
            | Expr::Symbol(_)
            | Expr::Name(_)
            | Expr::SizeofType(_)
            | Expr::AlignofType(_) => vec![],
            Expr::Unary { operand, .. } | Expr::Cast { operand, .. } => vec![operand],
            Expr::SizeofExpr(expr) => vec![expr],
            Expr::Binary { lhs, rhs, .. } | Expr::Assign { lhs, rhs, .. } => vec![lhs, rhs],
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            Expr::Subscript { base, index } => vec![base, index],
            Expr::Section {
                base,
                lower,
                length,
            } => {
                let mut children = vec![base];
                children.extend(lower.iter());
                children.extend(length.iter());
                children
            }
            Expr::Member { base, .. } => vec![base],
            Expr::Call { callee, args } => {
                let mut children = vec![callee];
                children.extend(args.iter().map(|arg| &arg.value));
                children
            }
            Expr::Init(items) => items.iter().collect(),
        }
    }
    /// Visit this expression and every expression nested in it, including
    /// the runtime extents of types written in casts and `sizeof`.
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self {
            Expr::Cast { typ, .. } | Expr::SizeofType(typ) | Expr::AlignofType(typ) => {
                for size in typ.vla_sizes() {
                    size.walk(visit);
                }
            }
            _ => (),
        }
        for child in self.children() {
            child.walk(visit);
        }
    }
}

fn write_operand(f: &mut Formatter<'_>, expr: &Expr, min: u8) -> std::fmt::Result {
    if expr.precedence() < min {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{v}"),
            Expr::Float(lexeme) | Expr::Str(lexeme) | Expr::Char(lexeme) | Expr::Name(lexeme) => {
                write!(f, "{lexeme}")
            }
            Expr::Symbol(symbol) => write!(f, "{symbol}"),
            Expr::Unary { op, operand } => {
                if op.is_postfix() {
                    write_operand(f, operand, 15)?;
                    return write!(f, "{}", op.symbol());
                }
                let operand = if operand.precedence() < 14 {
                    format!("({operand})")
                } else {
                    operand.to_string()
                };
                // Avoid gluing `-` and `-1` into `--1`.
                let glued = op.symbol().chars().last() == operand.chars().next();
                let space = if glued { " " } else { "" };
                write!(f, "{}{space}{operand}", op.symbol())
            }
            Expr::Binary { op, lhs, rhs } => {
                let precedence = op.precedence();
                write_operand(f, lhs, precedence)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs, precedence + 1)
            }
            Expr::Assign { op, lhs, rhs } => {
                write_operand(f, lhs, 14)?;
                match op {
                    Some(op) => write!(f, " {}= ", op.symbol())?,
                    None => write!(f, " = ")?,
                }
                write_operand(f, rhs, 2)
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                write_operand(f, cond, 4)?;
                write!(f, " ? ")?;
                write_operand(f, then, 2)?;
                write!(f, " : ")?;
                write_operand(f, otherwise, 3)
            }
            Expr::Subscript { base, index } => {
                write_operand(f, base, 15)?;
                write!(f, "[{index}]")
            }
            Expr::Section {
                base,
                lower,
                length,
            } => {
                write_operand(f, base, 15)?;
                write!(f, "[")?;
                if let Some(lower) = lower {
                    write!(f, "{lower}")?;
                }
                write!(f, ":")?;
                if let Some(length) = length {
                    write!(f, "{length}")?;
                }
                write!(f, "]")
            }
            Expr::Member { base, field, arrow } => {
                write_operand(f, base, 15)?;
                let access = if *arrow { "->" } else { "." };
                write!(f, "{access}{field}")
            }
            Expr::Call { callee, args } => {
                write_operand(f, callee, 15)?;
                write!(f, "(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if let Some(keyword) = &arg.keyword {
                        write!(f, ".{keyword} = ")?;
                    }
                    write_operand(f, &arg.value, 2)?;
                }
                write!(f, ")")
            }
            Expr::Cast { typ, operand } => {
                write!(f, "({typ}) ")?;
                write_operand(f, operand, 14)
            }
            Expr::SizeofType(typ) => write!(f, "sizeof({typ})"),
            Expr::SizeofExpr(expr) => write!(f, "sizeof({expr})"),
            Expr::AlignofType(typ) => write!(f, "__alignof__({typ})"),
            Expr::Init(items) => {
                write!(f, "{{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_operand(f, item, 2)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SymbolTable;

    fn name(name: &str) -> ExprRef {
        Arc::new(Expr::Name(name.to_string()))
    }

    fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Arc::new(Expr::Binary { op, lhs, rhs })
    }

    #[test]
    fn test_parentheses() {
        let sum = binary(BinaryOp::Add, name("a"), name("b"));
        let product = binary(BinaryOp::Mul, sum.clone(), name("c"));
        assert_eq!(product.to_string(), "(a + b) * c");
        let nested = binary(BinaryOp::Sub, name("a"), sum);
        assert_eq!(nested.to_string(), "a - (a + b)");
        let negated = Expr::Unary {
            op: UnaryOp::Neg,
            operand: Arc::new(Expr::Int(-1)),
        };
        assert_eq!(negated.to_string(), "- -1");
        let deref = Arc::new(Expr::Unary {
            op: UnaryOp::Deref,
            operand: name("p"),
        });
        let subscript = Expr::Subscript {
            base: deref,
            index: Arc::new(Expr::Int(0)),
        };
        assert_eq!(subscript.to_string(), "(*p)[0]");
        let cast = Expr::Cast {
            typ: Type::Primitive(Primitive::Char).pointer(),
            operand: binary(BinaryOp::Add, name("p"), Arc::new(Expr::Int(1))),
        };
        assert_eq!(cast.to_string(), "(char *) (p + 1)");
    }

    #[test]
    fn test_constant() {
        let expr = binary(
            BinaryOp::Mul,
            Arc::new(Expr::SizeofType(Type::Primitive(Primitive::Double))),
            binary(BinaryOp::Add, Arc::new(Expr::Int(2)), Arc::new(Expr::Int(3))),
        );
        assert_eq!(expr.constant(), Some(40));
        assert!(!binary(BinaryOp::Add, name("n"), Arc::new(Expr::Int(1))).is_constant());
        let division = binary(BinaryOp::Div, Arc::new(Expr::Int(1)), Arc::new(Expr::Int(0)));
        assert_eq!(division.constant(), None);
    }

    #[test]
    fn test_section() {
        let mut table = SymbolTable::new();
        let float = Type::Primitive(Primitive::Float);
        let array = float.clone().array(ArraySize::Fixed(100));
        let a = table.new_symbol("a", array, SymbolKind::Local);
        let section = Expr::Section {
            base: Arc::new(Expr::Symbol(a.clone())),
            lower: Some(Arc::new(Expr::Int(0))),
            length: Some(name("n")),
        };
        assert_eq!(section.to_string(), "a[0:n]");
        assert!(section.is_lvalue());
        assert_eq!(section.base_symbol(), Some(a));
        assert_eq!(section.typ(), float.array(ArraySize::Variable(name("n"))));
    }
}
