// SPDX-License-Identifier: AGPL-3.0

//! Semantic analysis.
//!
//! The analyzer walks the syntax tree with a stack of name bindings, resolves
//! every identifier to a field, constant, variable, function or operator, and
//! emits the DAG. SQL lowers through its own path into the same operators.
//! Lowering of each syntactic category lives in `methods/`.

pub mod builtins;
pub mod diagnostic;
pub mod errors;
pub mod methods;
pub mod scope;

use crate::zedc::{
    ast,
    compiler::source::{Head, Source},
    dag::{self, has_source},
    eval,
    parser::location::Loc,
    zed::Context,
};
use errors::{CompileError, ErrorList};
use scope::{OpDef, Scope};
use std::rc::Rc;
use tokio_util::sync::CancellationToken;

pub struct Analyzer<'a> {
    pub(crate) zctx: &'a Context,
    pub(crate) source: &'a dyn Source,
    pub(crate) head: Option<&'a Head>,
    pub(crate) cancel: CancellationToken,
    pub(crate) scope: Scope,
    /// Operators currently being expanded, outermost first.
    pub(crate) op_stack: Vec<Rc<OpDef>>,
    /// Common table expressions visible to SQL table references.
    pub(crate) ctes: Vec<(String, ast::Op)>,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        zctx: &'a Context,
        source: &'a dyn Source,
        head: Option<&'a Head>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            zctx,
            source,
            head,
            cancel,
            scope: Scope::new(),
            op_stack: Vec::new(),
            ctes: Vec::new(),
        }
    }

    /// Lowers a whole program. Each top-level operator reports at most one
    /// error and analysis continues with its next sibling.
    pub fn analyze(&mut self, seq: &ast::Seq) -> Result<dag::Seq, ErrorList> {
        let mut errors = ErrorList::new();
        let out = self.sem_top(seq, &mut errors);
        errors.into_result(out)
    }

    fn sem_top(&mut self, seq: &ast::Seq, errors: &mut ErrorList) -> dag::Seq {
        let mut out = Vec::new();
        for op in seq {
            if self.cancel.is_cancelled() {
                errors.push(CompileError::Interrupted);
                break;
            }
            tracing::debug!(loc = ?op.loc(), "analyzing top-level operator");
            if let ast::Op::Scope { decls, body, loc } = op {
                self.scope.enter();
                match self.sem_decls(decls) {
                    Ok((consts, funcs)) => {
                        let body = self.sem_top(body, errors);
                        out.push(dag::Op::Scope {
                            consts,
                            funcs,
                            body,
                        });
                    }
                    Err(e) => errors.push(e.or_at(*loc)),
                }
                self.scope.exit();
                continue;
            }
            match self.sem_op(op) {
                Ok(ops) => out.extend(ops),
                Err(e) => errors.push(e.or_at(op.loc())),
            }
        }
        out
    }

    pub(crate) fn check_cancel(&self) -> Result<(), CompileError> {
        if self.cancel.is_cancelled() {
            return Err(CompileError::Interrupted);
        }
        Ok(())
    }

    /// Evaluates a count argument that must fold to a positive integer.
    pub(crate) fn positive_int(
        &mut self,
        e: &ast::Expr,
        what: &str,
        loc: Loc,
    ) -> Result<u64, CompileError> {
        let expr = self.sem_expr(e)?;
        let val = eval::eval(self.zctx, &expr)
            .map_err(|err| CompileError::eval(format!("{what}: {err}"), e.loc()))?;
        match val.as_int() {
            Some(n) if n >= 1 => Ok(n as u64),
            _ => Err(CompileError::eval(
                format!("{what} count must be a positive integer"),
                loc,
            )),
        }
    }
}

/// Lowers `seq` to the DAG without adding a source.
pub fn analyze(
    zctx: &Context,
    seq: &ast::Seq,
    source: &dyn Source,
    head: Option<&Head>,
    cancel: &CancellationToken,
) -> Result<dag::Seq, ErrorList> {
    Analyzer::new(zctx, source, head, cancel.clone()).analyze(seq)
}

/// Lowers `seq` and prepends the default scan when it reads from nothing.
pub fn analyze_add_source(
    zctx: &Context,
    seq: &ast::Seq,
    source: &dyn Source,
    head: Option<&Head>,
    cancel: &CancellationToken,
) -> Result<dag::Seq, ErrorList> {
    let mut out = analyze(zctx, seq, source, head, cancel)?;
    add_default_source(zctx, &mut out, source, head, cancel)?;
    Ok(out)
}

/// Prepends a scan of the head when there is one, or the runtime-bound
/// default scan when there is not.
pub fn add_default_source(
    zctx: &Context,
    seq: &mut dag::Seq,
    source: &dyn Source,
    head: Option<&Head>,
    cancel: &CancellationToken,
) -> Result<(), CompileError> {
    if has_source(seq) {
        return Ok(());
    }
    let Some(head) = head else {
        seq.insert(0, dag::Op::DefaultScan { filter: None });
        return Ok(());
    };
    source.pool_id(cancel, &head.pool)?;
    let mut a = Analyzer::new(zctx, source, Some(head), cancel.clone());
    let spec = ast::PoolSpec {
        pool: Some(ast::PoolName::Text {
            name: "HEAD".to_string(),
        }),
        commit: None,
        meta: None,
    };
    let mut scans = a.sem_pool(&spec)?;
    tracing::debug!(pool = %head.pool, branch = %head.branch, "scanning from head");
    match scans.len() {
        1 => seq.insert(0, scans.remove(0)),
        _ => return Err(CompileError::internal("head resolved to more than one scan")),
    }
    Ok(())
}

/// Lowers a delete query: a pool scan followed by a single `where`. The scan
/// becomes a `DeleteScan` and the predicate stays as the trailing filter.
pub fn analyze_delete(
    zctx: &Context,
    seq: &ast::Seq,
    source: &dyn Source,
    head: Option<&Head>,
    cancel: &CancellationToken,
) -> Result<dag::Seq, ErrorList> {
    if !source.is_lake() {
        return Err(CompileError::catalog("delete requires a lake").into());
    }
    let out = analyze_add_source(zctx, seq, source, head, cancel)?;
    let mut ops = out.into_iter();
    let (Some(scan), Some(filter), None) = (ops.next(), ops.next(), ops.next()) else {
        return Err(delete_shape_error().into());
    };
    let (dag::Op::PoolScan { id, commit, .. }, dag::Op::Filter { expr }) = (scan, filter) else {
        return Err(delete_shape_error().into());
    };
    Ok(vec![
        dag::Op::DeleteScan {
            id,
            commit,
            where_: None,
            key_pruner: None,
        },
        dag::Op::Filter { expr },
    ])
}

fn delete_shape_error() -> CompileError {
    CompileError::Unsupported {
        msg: "delete query must be a pool scan followed by a single where".to_string(),
        loc: None,
    }
}

#[cfg(test)]
mod analyzer_tests;
