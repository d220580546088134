//! Shorthands for building IR in lowering code.
//!
//! Arithmetic helpers fold constant operands so that generated sizes stay
//! readable (`n * 4` instead of `n * sizeof(float)` when the size is known).

use crate::ir::Argument;
use crate::ir::BinaryOp;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::Stmt;
use crate::ir::Symbol;
use crate::ir::Type;
use crate::ir::UnaryOp;
use crate::ir::VarDecl;
use std::sync::Arc;

pub fn int(value: i64) -> ExprRef {
    Arc::new(Expr::Int(value))
}

pub fn name(name: &str) -> ExprRef {
    Arc::new(Expr::Name(name.to_string()))
}

pub fn sym(symbol: &Symbol) -> ExprRef {
    Arc::new(Expr::Symbol(symbol.clone()))
}

pub fn call(callee: &str, args: Vec<ExprRef>) -> ExprRef {
    call_expr(name(callee), args)
}

pub fn call_expr(callee: ExprRef, args: Vec<ExprRef>) -> ExprRef {
    Arc::new(Expr::Call {
        callee,
        args: args.into_iter().map(Argument::positional).collect(),
    })
}

fn unary(op: UnaryOp, operand: ExprRef) -> ExprRef {
    Arc::new(Expr::Unary { op, operand })
}

/// `&e`, simplified to `p` for `&*p`.
pub fn addr_of(expr: ExprRef) -> ExprRef {
    if let Expr::Unary {
        op: UnaryOp::Deref,
        operand,
    } = expr.as_ref()
    {
        return operand.clone();
    }
    unary(UnaryOp::AddrOf, expr)
}

pub fn deref(expr: ExprRef) -> ExprRef {
    unary(UnaryOp::Deref, expr)
}

pub fn not(expr: ExprRef) -> ExprRef {
    unary(UnaryOp::Not, expr)
}

pub fn member(base: ExprRef, field: &str) -> ExprRef {
    Arc::new(Expr::Member {
        base,
        field: field.to_string(),
        arrow: false,
    })
}

pub fn arrow(base: ExprRef, field: &str) -> ExprRef {
    Arc::new(Expr::Member {
        base,
        field: field.to_string(),
        arrow: true,
    })
}

pub fn subscript(base: ExprRef, index: ExprRef) -> ExprRef {
    Arc::new(Expr::Subscript { base, index })
}

pub fn cast(typ: Type, operand: ExprRef) -> ExprRef {
    Arc::new(Expr::Cast { typ, operand })
}

pub fn sizeof_type(typ: Type) -> ExprRef {
    Arc::new(Expr::SizeofType(typ))
}

pub fn sizeof_expr(expr: ExprRef) -> ExprRef {
    Arc::new(Expr::SizeofExpr(expr))
}

pub fn alignof_type(typ: Type) -> ExprRef {
    Arc::new(Expr::AlignofType(typ))
}

pub fn init(items: Vec<ExprRef>) -> ExprRef {
    Arc::new(Expr::Init(items))
}

pub fn conditional(cond: ExprRef, then: ExprRef, otherwise: ExprRef) -> ExprRef {
    Arc::new(Expr::Conditional {
        cond,
        then,
        otherwise,
    })
}

pub fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Expr::Binary { op, lhs, rhs })
}

fn fold(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    let expr = binary(op, lhs, rhs);
    match expr.constant() {
        // Keep `sizeof` of named types symbolic; only fold plain literals.
        Some(value)
            if expr
                .children()
                .into_iter()
                .all(|child| matches!(**child, Expr::Int(_))) =>
        {
            int(value)
        }
        _ => expr,
    }
}

pub fn add(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if lhs.constant() == Some(0) {
        return rhs;
    }
    if rhs.constant() == Some(0) {
        return lhs;
    }
    fold(BinaryOp::Add, lhs, rhs)
}

pub fn sub(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if rhs.constant() == Some(0) {
        return lhs;
    }
    fold(BinaryOp::Sub, lhs, rhs)
}

pub fn mul(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    if lhs.constant() == Some(1) {
        return rhs;
    }
    if rhs.constant() == Some(1) {
        return lhs;
    }
    fold(BinaryOp::Mul, lhs, rhs)
}

/// Round `value` up to a multiple of `align`, which must be a power of two.
///
/// Renders as `(T) ((uintptr_t) value + (align - 1) & ~(align - 1))`.
pub fn align_up(value: ExprRef, align: u64, typ: Type) -> ExprRef {
    let mask = (align as i64) - 1;
    let widened = cast(Type::named("uintptr_t"), value);
    let bumped = binary(BinaryOp::Add, widened, int(mask));
    let masked = binary(
        BinaryOp::BitAnd,
        bumped,
        unary(UnaryOp::BitNot, int(mask)),
    );
    cast(typ, masked)
}

/// `value + (align - 1) & ~(align - 1)`, for sizes rather than addresses.
pub fn round_up(value: ExprRef, align: u64) -> ExprRef {
    let mask = (align as i64) - 1;
    let bumped = binary(BinaryOp::Add, value, int(mask));
    binary(
        BinaryOp::BitAnd,
        bumped,
        unary(UnaryOp::BitNot, int(mask)),
    )
}

pub fn assign_expr(lhs: ExprRef, rhs: ExprRef) -> ExprRef {
    Arc::new(Expr::Assign { op: None, lhs, rhs })
}

pub fn assign(lhs: ExprRef, rhs: ExprRef) -> Stmt {
    Stmt::Expr(assign_expr(lhs, rhs))
}

/// `lhs += rhs;`
pub fn add_assign(lhs: ExprRef, rhs: ExprRef) -> Stmt {
    Stmt::Expr(Arc::new(Expr::Assign {
        op: Some(BinaryOp::Add),
        lhs,
        rhs,
    }))
}

pub fn expr_stmt(expr: ExprRef) -> Stmt {
    Stmt::Expr(expr)
}

pub fn decl(symbol: &Symbol, init: Option<ExprRef>) -> Stmt {
    Stmt::Decl(VarDecl::new(symbol, init))
}

pub fn if_then(cond: ExprRef, then: Vec<Stmt>) -> Stmt {
    Stmt::If {
        cond,
        then: Box::new(Stmt::Compound(then)),
        otherwise: None,
    }
}

pub fn if_else(cond: ExprRef, then: Vec<Stmt>, otherwise: Vec<Stmt>) -> Stmt {
    Stmt::If {
        cond,
        then: Box::new(Stmt::Compound(then)),
        otherwise: Some(Box::new(Stmt::Compound(otherwise))),
    }
}

/// `__builtin_memcpy(dst, src, size);`
pub fn memcpy(dst: ExprRef, src: ExprRef, size: ExprRef) -> Stmt {
    expr_stmt(call("__builtin_memcpy", vec![dst, src, size]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Primitive;

    #[test]
    fn test_folding() {
        assert_eq!(mul(int(3), int(4)).to_string(), "12");
        assert_eq!(mul(name("n"), int(4)).to_string(), "n * 4");
        assert_eq!(mul(int(1), name("n")).to_string(), "n");
        assert_eq!(add(int(0), name("n")).to_string(), "n");
        assert_eq!(sub(name("n"), int(0)).to_string(), "n");
        let float = Type::Primitive(Primitive::Float);
        assert_eq!(mul(int(2), sizeof_type(float)).to_string(), "2 * sizeof(float)");
    }

    #[test]
    fn test_align_up() {
        let char_ptr = Type::Primitive(Primitive::Char).pointer();
        let expr = align_up(name("cursor"), 8, char_ptr);
        assert_eq!(
            expr.to_string(),
            "(char *) ((uintptr_t) cursor + 7 & ~7)"
        );
    }

    #[test]
    fn test_addr_of_deref() {
        assert_eq!(addr_of(deref(name("p"))).to_string(), "p");
        assert_eq!(addr_of(name("x")).to_string(), "&x");
    }
}
