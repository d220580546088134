//! Emission for the work-descriptor ABI (`nanos_*` entry points).
//!
//! Every runtime call stores its result in `err`, which is checked
//! right away.

use crate::ir::build;
use crate::ir::ArraySize;
use crate::ir::BinaryOp;
use crate::ir::ExprRef;
use crate::ir::Primitive;
use crate::ir::Stmt;
use crate::ir::Symbol;
use crate::ir::Type;
use crate::ir::UnaryOp;
use crate::lower::dependency::descriptors;
use crate::lower::dependency::serialize;
use crate::lower::dependency::SerializedDependencies;
use crate::lower::layout::synthesize;
use crate::lower::layout::CaptureLayout;
use crate::lower::layout::Instance;
use crate::lower::outline::outline_body;
use crate::lower::ConstructParts;
use crate::lower::LoweringContext;
use anyhow::Result;
use std::sync::Arc;

/// `if (err != NANOS_OK) nanos_handle_error(err);`
fn check(err: &Symbol) -> Stmt {
    let failed = build::binary(BinaryOp::Ne, build::sym(err), build::name("NANOS_OK"));
    Stmt::If {
        cond: failed,
        then: Box::new(build::expr_stmt(build::call(
            "nanos_handle_error",
            vec![build::sym(err)],
        ))),
        otherwise: None,
    }
}

/// `err = callee(args);` and its check.
fn checked(err: &Symbol, callee: &str, args: Vec<ExprRef>) -> Vec<Stmt> {
    vec![
        build::assign(build::sym(err), build::call(callee, args)),
        check(err),
    ]
}

fn null(typ: Type) -> ExprRef {
    build::cast(typ, build::int(0))
}

/// Names and values that every work descriptor of one construct shares.
struct WorkDescriptor {
    layout: CaptureLayout,
    devices: Symbol,
    props: Symbol,
    err: Symbol,
}

impl WorkDescriptor {
    /// The SMP device descriptor, the properties and the error code.
    fn new(
        cx: &mut LoweringContext,
        parts: &ConstructParts,
        layout: CaptureLayout,
        outline: &Symbol,
        stmts: &mut Vec<Stmt>,
    ) -> Self {
        let routine = cx.strategy().abi().routine;
        let name = outline.name().to_string();
        let smp_args = parts.local(
            cx.symbols(),
            &format!("{name}_smp_args"),
            Type::named("nanos_smp_args_t"),
        );
        let devices = parts.local(
            cx.symbols(),
            &format!("{name}_devices"),
            Type::named("nanos_device_t").array(ArraySize::Fixed(1)),
        );
        stmts.push(Stmt::Comment("SMP device descriptor".to_string()));
        stmts.push(build::decl(
            &smp_args,
            Some(build::init(vec![build::cast(routine, build::sym(outline))])),
        ));
        let device = build::init(vec![
            build::name("nanos_smp_factory"),
            build::name("nanos_smp_dd_size"),
            build::addr_of(build::sym(&smp_args)),
        ]);
        stmts.push(build::decl(&devices, Some(build::init(vec![device]))));

        let props = parts.local(cx.symbols(), "props", Type::named("nanos_wd_props_t"));
        stmts.push(build::decl(&props, None));
        stmts.push(build::expr_stmt(build::call(
            "__builtin_memset",
            vec![
                build::addr_of(build::sym(&props)),
                build::int(0),
                build::sizeof_expr(build::sym(&props)),
            ],
        )));
        let field = |name: &str| build::member(build::sym(&props), name);
        if !parts.is_untied() {
            stmts.push(build::assign(field("tied"), build::int(1)));
        }
        if let Some(priority) = parts.priority() {
            stmts.push(build::assign(field("priority"), priority));
        }
        if let Some(cond) = parts.final_condition() {
            let is_final = build::conditional(cond, build::int(1), build::int(0));
            stmts.push(build::assign(
                build::member(field("flags"), "is_final"),
                is_final,
            ));
        }
        let err = parts.local(cx.symbols(), "err", Type::named("nanos_err_t"));
        Self {
            layout,
            devices,
            props,
            err,
        }
    }
    fn props(&self) -> ExprRef {
        build::sym(&self.props)
    }
    /// `err = nanos_create_wd(&wd, ...)` into the capture block `ol_args`.
    fn create(&self, wd: &Symbol, ol_args: &Symbol) -> Vec<Stmt> {
        let void_ptr_ptr = Type::Void.pointer().pointer();
        let copies = Type::named("nanos_copy_data_t").pointer().pointer();
        checked(
            &self.err,
            "nanos_create_wd",
            vec![
                build::addr_of(build::sym(wd)),
                build::int(1),
                build::sym(&self.devices),
                self.layout.size(),
                self.layout.alignment(),
                build::cast(void_ptr_ptr, build::addr_of(build::sym(ol_args))),
                build::call("nanos_current_wd", vec![]),
                build::addr_of(self.props()),
                build::int(0),
                null(copies),
            ],
        )
    }
    fn submit(&self, wd: &Symbol, dependences: &SerializedDependencies) -> Vec<Stmt> {
        checked(
            &self.err,
            "nanos_submit",
            vec![
                build::sym(wd),
                dependences.count(),
                array(dependences),
                null(Type::named("nanos_team_t")),
            ],
        )
    }
    /// Fill a second capture block and run the work descriptor right away.
    fn run_immediately(
        &self,
        cx: &mut LoweringContext,
        parts: &ConstructParts,
        dependences: &SerializedDependencies,
        wait: bool,
    ) -> Vec<Stmt> {
        let mut stmts = vec![];
        let instance = if self.layout.is_overallocated() {
            let typ = self.layout.typ().pointer();
            let imm_args = parts.local(cx.symbols(), "imm_args", typ.clone());
            let storage = build::call("__builtin_alloca", vec![self.layout.size()]);
            stmts.push(build::decl(&imm_args, Some(build::cast(typ, storage))));
            Instance::pointer(&imm_args)
        } else {
            let imm_args = parts.local(cx.symbols(), "imm_args", self.layout.typ());
            stmts.push(build::decl(&imm_args, None));
            Instance::value(&imm_args)
        };
        stmts.extend(self.layout.fill(&mut parts.locals(cx.symbols()), &instance));
        if wait && dependences.count > 0 {
            stmts.extend(checked(
                &self.err,
                "nanos_wait_on",
                vec![dependences.count(), array(dependences)],
            ));
        }
        stmts.extend(checked(
            &self.err,
            "nanos_create_wd_and_run",
            vec![
                build::int(1),
                build::sym(&self.devices),
                self.layout.size(),
                self.layout.alignment(),
                instance.address(),
                dependences.count(),
                array(dependences),
                build::addr_of(self.props()),
                build::int(0),
                null(Type::named("nanos_copy_data_t").pointer()),
                null(Type::named("nanos_translate_args_t")),
            ],
        ));
        stmts
    }
}

fn array(dependences: &SerializedDependencies) -> ExprRef {
    dependences.array.clone().unwrap_or_else(|| build::int(0))
}

/// The outlined function `static void ol_<fn>_<n>(struct nanos_args_<k>_t *args)`.
fn outline(
    cx: &mut LoweringContext,
    parts: &ConstructParts,
    layout: &CaptureLayout,
    team: bool,
) -> Symbol {
    let prefix = format!("ol_{}", cx.function());
    let name = cx.unique_name(&prefix);
    let args = parts.local(cx.symbols(), "args", layout.typ().pointer());
    let prologue = outline_body(
        &parts.info,
        layout,
        &build::sym(&args),
        &parts.body,
        cx.symbols(),
    );
    let body = if team {
        let err = parts.local(cx.symbols(), "err", Type::named("nanos_err_t"));
        let current = build::call("nanos_current_wd", vec![]);
        let mut body = vec![
            build::decl(
                &err,
                Some(build::call("nanos_omp_set_implicit", vec![current])),
            ),
            check(&err),
        ];
        body.extend(checked(&err, "nanos_enter_team", vec![]));
        body.extend(prologue);
        body.extend(checked(&err, "nanos_omp_barrier", vec![]));
        body.extend(checked(&err, "nanos_leave_team", vec![]));
        body
    } else {
        prologue
    };
    cx.define_outline(&name, Type::Void, vec![args], body)
}

fn capture_layout(cx: &mut LoweringContext, parts: &ConstructParts) -> CaptureLayout {
    let order = cx.strategy().field_order;
    let tag = cx.fresh("nanos_args", "_t");
    let layout = synthesize(&parts.info, order, &tag);
    cx.emit(layout.item());
    layout
}

pub fn task(cx: &mut LoweringContext, parts: ConstructParts) -> Result<Stmt> {
    let strategy = *cx.strategy();
    let abi = strategy.abi();
    let descriptors = descriptors(&parts.info, &strategy)?;
    let layout = capture_layout(cx, &parts);
    let outline = outline(cx, &parts, &layout, false);

    let mut stmts = vec![];
    let args_ptr = layout.typ().pointer();
    let ol_args = parts.local(cx.symbols(), "ol_args", args_ptr.clone());
    stmts.push(build::decl(&ol_args, Some(null(args_ptr))));
    let wd = parts.local(cx.symbols(), "wd", abi.task.clone());
    stmts.push(build::decl(&wd, Some(null(abi.task.clone()))));
    let descriptor = WorkDescriptor::new(cx, &parts, layout, &outline, &mut stmts);
    stmts.push(build::decl(&descriptor.err, None));
    let dependences = serialize(&strategy, &descriptors, &mut parts.locals(cx.symbols()));
    stmts.extend(dependences.stmts.iter().cloned());

    let create = descriptor.create(&wd, &ol_args);
    let cond = parts.if_condition();
    match &cond {
        Some(cond) => stmts.push(build::if_then(cond.clone(), create)),
        None => stmts.extend(create),
    }
    let mut deferred = descriptor
        .layout
        .fill(&mut parts.locals(cx.symbols()), &Instance::pointer(&ol_args));
    deferred.extend(descriptor.submit(&wd, &dependences));
    let immediate = descriptor.run_immediately(cx, &parts, &dependences, cond.is_some());
    let created = build::binary(BinaryOp::Ne, build::sym(&wd), null(abi.task));
    stmts.push(build::if_else(created, deferred, immediate));
    Ok(Stmt::Compound(stmts))
}

pub fn parallel(cx: &mut LoweringContext, parts: ConstructParts) -> Result<Stmt> {
    let strategy = *cx.strategy();
    let abi = strategy.abi();
    let layout = capture_layout(cx, &parts);
    let outline = outline(cx, &parts, &layout, true);

    let mut stmts = vec![];
    let unsigned = Type::Primitive(Primitive::UnsignedInt);
    let num_threads = parts.local(cx.symbols(), "nanos_num_threads", unsigned.clone());
    let requested = parts
        .num_threads()
        .unwrap_or_else(|| build::call("nanos_omp_get_max_threads", vec![]));
    let requested = match parts.if_condition() {
        Some(cond) => build::conditional(cond, requested, build::int(1)),
        None => requested,
    };
    stmts.push(build::decl(&num_threads, Some(requested)));
    let team_type = Type::named("nanos_team_t");
    let team = parts.local(cx.symbols(), "nanos_team", team_type.clone());
    stmts.push(build::decl(&team, Some(null(team_type))));
    let threads_type = Type::named("nanos_thread_t")
        .array(ArraySize::Variable(build::sym(&num_threads)));
    let threads = parts.local(cx.symbols(), "nanos_team_threads", threads_type);
    stmts.push(build::decl(&threads, None));

    let descriptor = WorkDescriptor::new(cx, &parts, layout, &outline, &mut stmts);
    let create_team = build::call(
        "nanos_create_team",
        vec![
            build::addr_of(build::sym(&team)),
            null(Type::named("nanos_sched_t")),
            build::addr_of(build::sym(&num_threads)),
            null(Type::named("nanos_constraint_t").pointer()),
            build::int(1),
            build::sym(&threads),
        ],
    );
    stmts.push(build::decl(&descriptor.err, Some(create_team)));
    stmts.push(check(&descriptor.err));
    let dependences = serialize(&strategy, &[], &mut parts.locals(cx.symbols()));
    stmts.extend(dependences.stmts.iter().cloned());

    let tie_to = build::member(descriptor.props(), "tie_to");
    let i = parts.local(cx.symbols(), "nanos_i", unsigned);
    let args_ptr = descriptor.layout.typ().pointer();
    let ol_args = parts.local(cx.symbols(), "ol_args", args_ptr.clone());
    let wd = parts.local(cx.symbols(), "wd", abi.task.clone());
    let mut spawn = vec![
        build::decl(&ol_args, Some(null(args_ptr))),
        build::decl(&wd, Some(null(abi.task))),
        build::assign(
            tie_to.clone(),
            build::subscript(build::sym(&threads), build::sym(&i)),
        ),
    ];
    spawn.extend(descriptor.create(&wd, &ol_args));
    spawn.extend(
        descriptor
            .layout
            .fill(&mut parts.locals(cx.symbols()), &Instance::pointer(&ol_args)),
    );
    spawn.extend(descriptor.submit(&wd, &dependences));
    stmts.push(Stmt::For {
        init: Some(Box::new(build::decl(&i, Some(build::int(1))))),
        cond: Some(build::binary(
            BinaryOp::Lt,
            build::sym(&i),
            build::sym(&num_threads),
        )),
        step: Some(Arc::new(crate::ir::Expr::Unary {
            op: UnaryOp::PostInc,
            operand: build::sym(&i),
        })),
        body: Box::new(Stmt::Compound(spawn)),
    });

    stmts.push(build::assign(
        tie_to,
        build::subscript(build::sym(&threads), build::int(0)),
    ));
    stmts.extend(descriptor.run_immediately(cx, &parts, &dependences, false));
    stmts.extend(checked(
        &descriptor.err,
        "nanos_end_team",
        vec![build::sym(&team)],
    ));
    Ok(Stmt::Compound(stmts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LowerOptions;
    use crate::frontend::Parser;
    use crate::lower::LowerOmpToNanos;
    use crate::lower::Pass;

    fn lower(src: &str) -> String {
        let mut unit = Parser::parse(src).unwrap();
        LowerOmpToNanos::convert(&mut unit, &LowerOptions::default()).unwrap();
        unit.to_string()
    }

    #[test]
    fn test_error_checks() {
        let src = indoc::indoc! {"
        void f(int n) {
          #pragma omp task
          n = 1;
        }
        "};
        let actual = lower(src);
        let calls = actual.matches("err = nanos_").count();
        let checks = actual.matches("if (err != NANOS_OK)").count();
        assert_eq!(calls, 3);
        assert_eq!(checks, 3);
        assert!(actual.contains("struct nanos_args_0_t {"));
        assert!(actual.contains("static void ol_f_0(struct nanos_args_0_t *args) {"));
    }

    #[test]
    fn test_local_names_avoid_captures() {
        let src = indoc::indoc! {"
        void f(int err) {
          #pragma omp task
          err = 1;
        }
        "};
        let actual = lower(src);
        assert!(actual.contains("nanos_err_t err_1;"));
        assert!(actual.contains("ol_args->err = err;"));
    }
}
