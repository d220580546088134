//! Calls to task functions become tasks whose captured variables are copies
//! of the call arguments.

use crate::diagnostic::Diagnostics;
use crate::ir::build;
use crate::ir::Clause;
use crate::ir::ClauseKind;
use crate::ir::Counters;
use crate::ir::DeferredCall;
use crate::ir::Expr;
use crate::ir::ExprRef;
use crate::ir::Stmt;
use crate::ir::Substitution;
use crate::ir::SymbolKind;
use crate::ir::SymbolTable;
use crate::lower::outline_info::ConstructKind;
use crate::lower::outline_info::Classifier;
use crate::lower::outline_info::DataItem;
use crate::lower::outline_info::Dependency;
use crate::lower::outline_info::OutlineInfo;
use crate::lower::outline_info::Sharing;
use anyhow::Result;
use std::collections::HashSet;

/// A deferred call expressed as a task over fresh argument variables.
pub struct RewrittenCall {
    /// `T mcc_arg_<k> = <argument>;` for every parameter.
    pub arguments: Vec<Stmt>,
    pub info: OutlineInfo,
    /// The clauses that remain after data sharing, over the argument
    /// variables.
    pub clauses: Vec<Clause>,
    /// The call of the task function with the argument variables.
    pub body: Stmt,
}

/// Classify the parameters of the task function from its clauses.
///
/// Parameters that no clause names are captured by value.
pub fn parameters_info(call: &DeferredCall, diagnostics: &mut Diagnostics) -> OutlineInfo {
    let task = &call.task;
    let mut classifier = Classifier::new(ConstructKind::Task, diagnostics);
    classifier.sharing_clauses(&task.clauses);
    classifier.default_sharing(&task.params, Sharing::Capture);
    classifier.dependencies(&task.clauses);
    classifier.finish()
}

/// Match the call arguments to the parameters, by position or by name.
fn match_arguments(call: &DeferredCall, diagnostics: &mut Diagnostics) -> Option<Vec<ExprRef>> {
    let params = &call.task.params;
    let name = call.task.function.name();
    let mut values: Vec<Option<ExprRef>> = vec![None; params.len()];
    let mut position = 0;
    for arg in &call.args {
        let index = match &arg.keyword {
            Some(keyword) => match params.iter().position(|param| param.name() == keyword) {
                Some(index) => index,
                None => {
                    let msg = format!("`{name}` has no parameter named `{keyword}`");
                    diagnostics.warning(call.loc, &msg);
                    return None;
                }
            },
            None => {
                position += 1;
                position - 1
            }
        };
        match values.get_mut(index) {
            Some(slot) if slot.is_none() => *slot = Some(arg.value.clone()),
            _ => {
                let msg = format!(
                    "call to `{name}` does not match its {} parameters",
                    params.len()
                );
                diagnostics.warning(call.loc, &msg);
                return None;
            }
        }
    }
    let values: Option<Vec<ExprRef>> = values.into_iter().collect();
    if values.is_none() {
        let msg = format!(
            "call to `{name}` passes {} arguments but it has {} parameters",
            call.args.len(),
            params.len()
        );
        diagnostics.warning(call.loc, &msg);
    }
    values
}

fn rewrite_clause(clause: &Clause, subst: &Substitution) -> Option<Clause> {
    let kind = match &clause.kind {
        ClauseKind::If(expr) => ClauseKind::If(subst.apply(expr)),
        ClauseKind::Final(expr) => ClauseKind::Final(subst.apply(expr)),
        ClauseKind::Priority(expr) => ClauseKind::Priority(subst.apply(expr)),
        ClauseKind::Untied => ClauseKind::Untied,
        _ => return None,
    };
    Some(Clause {
        kind,
        loc: clause.loc,
    })
}

/// Rewrite a deferred call onto fresh argument variables.
///
/// Returns `None`, after a warning, when the arguments do not match the
/// parameters; the call then stays a plain call.
pub fn rewrite_call(
    call: &DeferredCall,
    symbols: &mut SymbolTable,
    counters: &mut Counters,
    diagnostics: &mut Diagnostics,
) -> Result<Option<RewrittenCall>> {
    let Some(values) = match_arguments(call, diagnostics) else {
        return Ok(None);
    };
    let parameters = parameters_info(call, diagnostics);
    let mut used: HashSet<String> = HashSet::new();
    for value in &values {
        value.walk(&mut |e| {
            if let Expr::Symbol(symbol) = e {
                used.insert(symbol.name().to_string());
            }
        });
    }
    let mut subst = Substitution::new();
    let mut arguments = vec![];
    let mut fresh = vec![];
    for (param, value) in call.task.params.iter().zip(values) {
        let name = loop {
            let name = format!("mcc_arg_{}", counters.next("mcc_arg"));
            if !used.contains(&name) {
                break name;
            }
        };
        let typ = subst.apply_type(param.typ());
        let symbol = symbols.new_symbol(&name, typ, SymbolKind::Synthetic);
        arguments.push(build::decl(&symbol, Some(value)));
        subst.map_symbol(param, build::sym(&symbol));
        fresh.push(symbol);
    }

    let mut info = OutlineInfo::new();
    for (param, symbol) in call.task.params.iter().zip(&fresh) {
        let Some(item) = parameters.get(param) else {
            anyhow::bail!(
                "{}: parameter `{param}` of `{}` is not classified",
                call.loc,
                call.task.function
            );
        };
        let mut copy = DataItem::new(symbol, item.sharing);
        copy.field_name = item.field_name.clone();
        copy.shared_expression = item.shared_expression.as_ref().map(|e| subst.apply(e));
        for dependency in &item.dependencies {
            copy.add_dependency(Dependency {
                directionality: dependency.directionality,
                expr: subst.apply(&dependency.expr),
                loc: dependency.loc,
            });
        }
        info.insert(copy);
    }
    for item in parameters.iter() {
        if info.get(&item.symbol).is_none() && !call.task.params.contains(&item.symbol) {
            info.insert(item.clone());
        }
    }
    info.finish();

    let clauses = call
        .task
        .clauses
        .iter()
        .filter_map(|clause| rewrite_clause(clause, &subst))
        .collect();
    let args = fresh.iter().map(build::sym).collect();
    let body = build::expr_stmt(build::call_expr(build::sym(&call.task.function), args));
    Ok(Some(RewrittenCall {
        arguments,
        info,
        clauses,
        body,
    }))
}
