//! Emission for the explicit task object ABI (`__kmpc_*` entry points).

use crate::frontend::Location;
use crate::ir::build;
use crate::ir::BinaryOp;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::GlobalVar;
use crate::ir::Item;
use crate::ir::Stmt;
use crate::ir::Symbol;
use crate::ir::SymbolKind;
use crate::ir::Type;
use crate::lower::dependency::descriptors;
use crate::lower::dependency::serialize;
use crate::lower::layout::synthesize;
use crate::lower::layout::Instance;
use crate::lower::outline::outline_body;
use crate::lower::ConstructParts;
use crate::lower::LoweringContext;
use anyhow::Result;
use std::sync::Arc;

/// `ident_t` flag for locations created by the compiler.
const KMP_IDENT_KMPC: i64 = 2;
const TASK_FINAL: i64 = 2;
const TASK_TIED: i64 = 1;

fn kmp_int32() -> Type {
    Type::named("kmp_int32")
}

fn runtime_call(callee: &str, args: Vec<ExprRef>) -> Stmt {
    build::expr_stmt(build::call(callee, args))
}

/// `static ident_t _loc<name> = {0, 2, 0, 0, ";unknown;<fn>;<line>;<column>;;"};`
fn ident(cx: &mut LoweringContext, name: &str, loc: Location) -> Symbol {
    let psource = format!(
        "\";unknown;{};{};{};;\"",
        cx.function(),
        loc.line() + 1,
        loc.column() + 1
    );
    let symbol = cx.declare(
        &format!("_loc{name}"),
        Type::named("ident_t"),
        SymbolKind::Global,
    );
    let init = build::init(vec![
        build::int(0),
        build::int(KMP_IDENT_KMPC),
        build::int(0),
        build::int(0),
        Arc::new(Expr::Str(psource)),
    ]);
    cx.emit(Item::Global(GlobalVar {
        symbol: symbol.clone(),
        is_static: true,
        init: Some(init),
    }));
    symbol
}

/// `(final ? 2 : 0) | tied`
fn task_flags(parts: &ConstructParts) -> ExprRef {
    let tied = if parts.is_untied() { 0 } else { TASK_TIED };
    match parts.final_condition() {
        Some(cond) => {
            let is_final = build::conditional(cond, build::int(TASK_FINAL), build::int(0));
            if tied == 0 {
                is_final
            } else {
                build::binary(BinaryOp::BitOr, is_final, build::int(tied))
            }
        }
        None => build::int(tied),
    }
}

pub fn task(cx: &mut LoweringContext, parts: ConstructParts) -> Result<Stmt> {
    let strategy = *cx.strategy();
    let abi = strategy.abi();
    let descriptors = descriptors(&parts.info, &strategy)?;
    let prefix = format!("_task_{}", cx.function());
    let name = cx.unique_name(&prefix);
    let layout = synthesize(&parts.info, strategy.field_order, &format!("_args{name}"));
    cx.emit(layout.item());
    let ident = ident(cx, &name, parts.loc);
    let task_ptr = abi.task.clone().pointer();
    let args_ptr = layout.typ().pointer();

    let global_tid = parts.local(cx.symbols(), "_global_tid", kmp_int32());
    let task = parts.local(cx.symbols(), "_task", task_ptr.clone());
    let args = parts.local(cx.symbols(), "_args", args_ptr.clone());
    let shareds = build::arrow(build::sym(&task), "shareds");
    let mut body = vec![build::decl(
        &args,
        Some(build::cast(args_ptr.clone(), shareds)),
    )];
    body.extend(outline_body(
        &parts.info,
        &layout,
        &build::sym(&args),
        &parts.body,
        cx.symbols(),
    ));
    body.push(Stmt::Return(Some(build::int(0))));
    let outline = cx.define_outline(&name, kmp_int32(), vec![global_tid, task], body);

    let loc = build::addr_of(build::sym(&ident));
    let gtid = parts.local(cx.symbols(), "_gtid", kmp_int32());
    let ret = parts.local(cx.symbols(), "_ret", task_ptr);
    let block = parts.local(cx.symbols(), "_args", args_ptr.clone());
    let mut stmts = vec![build::decl(
        &gtid,
        Some(build::call("__kmpc_global_thread_num", vec![loc.clone()])),
    )];
    let alloc = build::call(
        "__kmpc_omp_task_alloc",
        vec![
            loc.clone(),
            build::sym(&gtid),
            task_flags(&parts),
            build::sizeof_type(abi.task.clone()),
            layout.size(),
            build::cast(abi.routine.clone(), build::addr_of(build::sym(&outline))),
        ],
    );
    stmts.push(build::decl(&ret, Some(alloc)));
    if let Some(priority) = parts.priority() {
        let data2 = build::arrow(build::sym(&ret), "data2");
        stmts.push(build::assign(build::member(data2, "priority"), priority));
    }
    let shareds = build::arrow(build::sym(&ret), "shareds");
    stmts.push(build::decl(&block, Some(build::cast(args_ptr, shareds))));
    stmts.extend(layout.fill(&mut parts.locals(cx.symbols()), &Instance::pointer(&block)));

    let dependences = serialize(&strategy, &descriptors, &mut parts.locals(cx.symbols()));
    let count = dependences.count();
    stmts.extend(dependences.stmts);
    let submit = match &dependences.array {
        Some(array) => runtime_call(
            "__kmpc_omp_task_with_deps",
            vec![
                loc.clone(),
                build::sym(&gtid),
                build::sym(&ret),
                count.clone(),
                array.clone(),
                build::int(0),
                build::int(0),
            ],
        ),
        None => runtime_call(
            "__kmpc_omp_task",
            vec![loc.clone(), build::sym(&gtid), build::sym(&ret)],
        ),
    };
    match parts.if_condition() {
        Some(cond) => {
            let mut immediate = vec![];
            if let Some(array) = &dependences.array {
                immediate.push(runtime_call(
                    "__kmpc_omp_wait_deps",
                    vec![
                        loc.clone(),
                        build::sym(&gtid),
                        count,
                        array.clone(),
                        build::int(0),
                        build::int(0),
                    ],
                ));
            }
            let handles = || vec![loc.clone(), build::sym(&gtid), build::sym(&ret)];
            immediate.push(runtime_call("__kmpc_omp_task_begin_if0", handles()));
            immediate.push(build::expr_stmt(build::call_expr(
                build::sym(&outline),
                vec![build::sym(&gtid), build::sym(&ret)],
            )));
            immediate.push(runtime_call("__kmpc_omp_task_complete_if0", handles()));
            stmts.push(build::if_else(cond, vec![submit], immediate));
        }
        None => stmts.push(submit),
    }
    Ok(Stmt::Compound(stmts))
}

pub fn parallel(cx: &mut LoweringContext, parts: ConstructParts) -> Result<Stmt> {
    let strategy = *cx.strategy();
    let prefix = format!("_parallel_{}", cx.function());
    let name = cx.unique_name(&prefix);
    let layout = synthesize(&parts.info, strategy.field_order, &format!("_args{name}"));
    cx.emit(layout.item());
    let ident = ident(cx, &name, parts.loc);
    let args_ptr = layout.typ().pointer();

    let global_tid = parts.local(cx.symbols(), "_global_tid", kmp_int32().pointer());
    let bound_tid = parts.local(cx.symbols(), "_bound_tid", kmp_int32().pointer());
    let args = parts.local(cx.symbols(), "_args", args_ptr.clone());
    let body = outline_body(
        &parts.info,
        &layout,
        &build::sym(&args),
        &parts.body,
        cx.symbols(),
    );
    let outline = cx.define_outline(
        &name,
        Type::Void,
        vec![global_tid, bound_tid, args],
        body,
    );

    let loc = build::addr_of(build::sym(&ident));
    let mut stmts = vec![];
    let instance = if layout.is_overallocated() {
        let block = parts.local(cx.symbols(), "_args", args_ptr.clone());
        let storage = build::call("__builtin_alloca", vec![layout.size()]);
        stmts.push(build::decl(&block, Some(build::cast(args_ptr, storage))));
        Instance::pointer(&block)
    } else {
        let block = parts.local(cx.symbols(), "_args", layout.typ());
        stmts.push(build::decl(&block, None));
        Instance::value(&block)
    };
    stmts.extend(layout.fill(&mut parts.locals(cx.symbols()), &instance));
    let gtid = parts.local(cx.symbols(), "_gtid", kmp_int32());
    stmts.push(build::decl(
        &gtid,
        Some(build::call("__kmpc_global_thread_num", vec![loc.clone()])),
    ));

    let mut fork = vec![];
    if let Some(num_threads) = parts.num_threads() {
        fork.push(runtime_call(
            "__kmpc_push_num_threads",
            vec![loc.clone(), build::sym(&gtid), num_threads],
        ));
    }
    fork.push(runtime_call(
        "__kmpc_fork_call",
        vec![
            loc.clone(),
            build::int(1),
            build::cast(Type::named("kmpc_micro"), build::sym(&outline)),
            instance.address(),
        ],
    ));
    match parts.if_condition() {
        Some(cond) => {
            let btid = parts.local(cx.symbols(), "_btid", kmp_int32());
            let serialized = vec![
                build::decl(&btid, Some(build::int(0))),
                runtime_call(
                    "__kmpc_serialized_parallel",
                    vec![loc.clone(), build::sym(&gtid)],
                ),
                build::expr_stmt(build::call_expr(
                    build::sym(&outline),
                    vec![
                        build::addr_of(build::sym(&gtid)),
                        build::addr_of(build::sym(&btid)),
                        instance.address(),
                    ],
                )),
                runtime_call(
                    "__kmpc_end_serialized_parallel",
                    vec![loc, build::sym(&gtid)],
                ),
            ];
            stmts.push(build::if_else(cond, fork, serialized));
        }
        None => stmts.extend(fork),
    }
    Ok(Stmt::Compound(stmts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LowerOptions;
    use crate::frontend::Parser;
    use crate::lower::LowerOmpToKmp;
    use crate::lower::Pass;

    fn lower(src: &str) -> String {
        let mut unit = Parser::parse(src).unwrap();
        LowerOmpToKmp::convert(&mut unit, &LowerOptions::default()).unwrap();
        unit.to_string()
    }

    #[test]
    fn test_ident() {
        let src = indoc::indoc! {"
        void f(int n) {
          #pragma omp task final(n > 4) untied
          n = 1;
        }
        "};
        let actual = lower(src);
        assert!(actual.contains(
            "static ident_t _loc_task_f_0 = {0, 2, 0, 0, \";unknown;f;2;3;;\"};"
        ));
        assert!(actual.contains("__kmpc_omp_task_alloc(&_loc_task_f_0, _gtid, n > 4 ? 2 : 0, "));
    }

    #[test]
    fn test_task_flags() {
        let src = indoc::indoc! {"
        void f(int n) {
          #pragma omp task final(n) priority(3)
          n = 1;
        }
        "};
        let actual = lower(src);
        assert!(actual.contains("(n ? 2 : 0) | 1"));
        assert!(actual.contains("_ret->data2.priority = 3;"));
        assert!(actual.contains("__kmpc_omp_task(&_loc_task_f_0, _gtid, _ret);"));
    }
}
