//! SQL lowering.
//!
//! A `SELECT` becomes a scan of its `FROM` followed by ordinary pipeline
//! operators: `WHERE` filters, grouping summarizes, `HAVING` filters the
//! summary and the selection list cuts the result into shape.

use crate::zedc::{
    analyzer::{Analyzer, errors::CompileError, methods::op_lowering::file_scan},
    ast::{self, Nulls},
    dag::{self, Order, Path},
    parser::location::Loc,
};

impl Analyzer<'_> {
    pub(crate) fn sem_sql_op(&mut self, op: &ast::Op) -> Result<dag::Seq, CompileError> {
        match op {
            ast::Op::Select(sel) => self.sem_select(sel),
            ast::Op::SqlPipe { ops, .. } => self.sem_seq(ops),
            ast::Op::Limit { op, count, loc } => {
                let mut seq = self.sem_sql_op(op)?;
                let count = self.positive_int(count, "limit", *loc)?;
                seq.push(dag::Op::Head { count });
                Ok(seq)
            }
            ast::Op::OrderBy { op, exprs, loc } => {
                let mut seq = self.sem_sql_op(op)?;
                seq.push(self.sem_order_by(exprs, *loc)?);
                Ok(seq)
            }
            ast::Op::With { ctes, body, .. } => {
                let mark = self.ctes.len();
                self.ctes
                    .extend(ctes.iter().map(|c| (c.name.clone(), c.body.clone())));
                let out = self.sem_sql_op(body);
                self.ctes.truncate(mark);
                out
            }
            ast::Op::Union {
                distinct,
                left,
                right,
                ..
            } => {
                let paths = vec![self.sem_sql_op(left)?, self.sem_sql_op(right)?];
                let mut seq = vec![dag::Op::Fork {
                    paths,
                    merge_by: None,
                    merge_reverse: false,
                }];
                if *distinct {
                    seq.push(dag::Op::sort_by(vec![dag::Expr::this()], Order::Asc));
                    seq.push(dag::Op::Uniq { cflag: false });
                }
                Ok(seq)
            }
            ast::Op::Table { name, loc } => self.sem_table(name, *loc),
            ast::Op::Alias { op, .. } => self.sem_sql_op(op),
            ast::Op::SqlJoin {
                style,
                left,
                right,
                cond,
                loc,
            } => self.sem_sql_join(style, left, right, cond, *loc),
            ast::Op::CrossJoin { loc, .. } => {
                Err(CompileError::unsupported("CROSS JOIN is not supported", *loc))
            }
            ast::Op::Ordinality { loc, .. } => Err(CompileError::unsupported(
                "WITH ORDINALITY is not supported",
                *loc,
            )),
            other => self.sem_op(other),
        }
    }

    /// A table name: a common table expression, then a pool inside a lake,
    /// then a file.
    fn sem_table(&mut self, name: &str, loc: Loc) -> Result<dag::Seq, CompileError> {
        if let Some(idx) = self.ctes.iter().rposition(|(n, _)| n == name) {
            let body = self.ctes[idx].1.clone();
            // A CTE sees only the ones declared before it.
            let later = self.ctes.split_off(idx);
            let out = self.sem_sql_op(&body);
            self.ctes.extend(later);
            return out;
        }
        if self.source.is_lake() {
            let spec = ast::PoolSpec {
                pool: Some(ast::PoolName::Text {
                    name: name.to_string(),
                }),
                commit: None,
                meta: None,
            };
            return self.sem_pool(&spec).map_err(|e| e.or_at(loc));
        }
        Ok(vec![file_scan(name, &ast::SourceArgs::default(), None)])
    }

    fn sem_order_by(&mut self, exprs: &[ast::SortExpr], loc: Loc) -> Result<dag::Op, CompileError> {
        let mut nulls: Option<Nulls> = None;
        for e in exprs {
            match (nulls, e.nulls) {
                (Some(a), Some(b)) if a != b => {
                    return Err(CompileError::unsupported(
                        "ORDER BY with differing NULLS FIRST/LAST clauses is not supported",
                        loc,
                    ));
                }
                (None, Some(b)) => nulls = Some(b),
                _ => {}
            }
        }
        let args = exprs
            .iter()
            .map(|e| {
                Ok(dag::SortExpr {
                    key: self.sem_expr(&e.expr)?,
                    order: e.order.unwrap_or(Order::Asc),
                })
            })
            .collect::<Result<_, CompileError>>()?;
        Ok(dag::Op::Sort {
            args,
            nulls_first: nulls == Some(Nulls::First),
            reverse: false,
        })
    }

    fn sem_select(&mut self, sel: &ast::Select) -> Result<dag::Seq, CompileError> {
        if sel.distinct {
            return Err(CompileError::unsupported(
                "SELECT DISTINCT is not supported",
                sel.loc,
            ));
        }
        let Some(from) = &sel.from else {
            return Err(CompileError::unsupported(
                "SELECT without a FROM clause is not supported",
                sel.loc,
            ));
        };
        let mut seq = self.sem_sql_op(from)?;
        if let Some(w) = &sel.where_ {
            seq.push(dag::Op::filter(self.sem_expr(w)?));
        }
        let is_star = |a: &ast::Assignment| a.lhs.is_none() && matches!(a.rhs, ast::Expr::This { .. });
        if sel.selection.iter().any(is_star) {
            if sel.selection.len() > 1 {
                return Err(CompileError::unsupported(
                    "SELECT * cannot be combined with other selections",
                    sel.loc,
                ));
            }
            if !sel.group_by.is_empty() || sel.having.is_some() || sel.value {
                return Err(CompileError::unsupported(
                    "SELECT * cannot be used with GROUP BY, HAVING or VALUE",
                    sel.loc,
                ));
            }
            return Ok(seq);
        }
        if sel.value {
            if !sel.group_by.is_empty() || sel.having.is_some() {
                return Err(CompileError::unsupported(
                    "SELECT VALUE cannot be used with GROUP BY",
                    sel.loc,
                ));
            }
            let exprs = sel
                .selection
                .iter()
                .map(|a| self.sem_expr(&a.rhs))
                .collect::<Result<_, _>>()?;
            seq.push(dag::Op::Yield { exprs });
            return Ok(seq);
        }
        let mut selection = self.sem_assignments(&sel.selection)?;
        for (a, src) in selection.iter_mut().zip(&sel.selection) {
            if src.lhs.is_none() && is_count_star(&a.rhs) {
                a.lhs = dag::Expr::path(["count_star"]);
            }
        }
        if sel.group_by.is_empty() {
            if let Some(h) = &sel.having {
                return Err(CompileError::shape("HAVING clause used without GROUP BY", h.loc()));
            }
            let naggs = selection.iter().filter(|a| is_agg(&a.rhs)).count();
            if naggs == 0 {
                seq.push(dag::Op::Cut {
                    args: selection,
                    quiet: false,
                });
            } else if naggs == selection.len() {
                seq.push(dag::Op::summarize(Vec::new(), selection));
            } else {
                return Err(CompileError::shape(
                    "cannot mix aggregations and non-aggregations without a GROUP BY",
                    sel.loc,
                ));
            }
            return Ok(seq);
        }
        seq.extend(self.sem_group_by(sel, selection)?);
        Ok(seq)
    }

    fn sem_group_by(
        &mut self,
        sel: &ast::Select,
        selection: Vec<dag::Assignment>,
    ) -> Result<dag::Seq, CompileError> {
        let mut keys: Vec<dag::Assignment> = Vec::new();
        for g in &sel.group_by {
            let ge = self.sem_expr(g)?;
            keys.push(group_key(&ge, &selection).map_err(|msg| CompileError::shape(msg, g.loc()))?);
        }
        let mut aggs = Vec::new();
        for a in &selection {
            if is_agg(&a.rhs) {
                aggs.push(a.clone());
            } else if !keys.iter().any(|k| k.lhs == a.lhs) {
                return Err(CompileError::shape(
                    format!(
                        "'{}': selected expression is missing from GROUP BY clause (and is not an aggregation)",
                        display_path(&a.lhs)
                    ),
                    sel.loc,
                ));
            }
        }
        let having = match &sel.having {
            Some(h) => {
                let e = self.sem_expr(h)?;
                Some(rewrite_aggs(e, &mut aggs))
            }
            None => None,
        };
        let cut = selection
            .iter()
            .map(|a| dag::Assignment {
                lhs: a.lhs.clone(),
                rhs: a.lhs.clone(),
            })
            .collect();
        let mut seq = vec![dag::Op::summarize(keys, aggs)];
        if let Some(h) = having {
            seq.push(dag::Op::filter(h));
        }
        seq.push(dag::Op::Cut {
            args: cut,
            quiet: false,
        });
        Ok(seq)
    }

    /// `left JOIN right AS alias ON l = r`. The right side is nested under
    /// its alias and both sides are sorted on their keys for a merge join.
    fn sem_sql_join(
        &mut self,
        style: &str,
        left: &ast::Op,
        right: &ast::Op,
        cond: &ast::Expr,
        loc: Loc,
    ) -> Result<dag::Seq, CompileError> {
        let ast::Op::Alias {
            op: right_op,
            name: alias,
            ..
        } = right
        else {
            return Err(CompileError::unsupported(
                "JOIN currently requires alias, e.g., JOIN <type> <alias> (will be fixed soon)",
                loc,
            ));
        };
        let bad_cond = || {
            CompileError::unsupported(
                "JOIN condition must be an equality between two field references",
                cond.loc(),
            )
        };
        let ast::Expr::Binary { op, lhs, rhs, .. } = cond else {
            return Err(bad_cond());
        };
        if op != "==" {
            return Err(bad_cond());
        }
        let (Some(mut lpath), Some(mut rpath)) = (
            self.sem_expr(lhs)?.as_path().cloned(),
            self.sem_expr(rhs)?.as_path().cloned(),
        ) else {
            return Err(bad_cond());
        };
        if lpath.first() == Some(alias) {
            std::mem::swap(&mut lpath, &mut rpath);
        }
        if rpath.first() != Some(alias) {
            return Err(CompileError::unsupported(
                format!("JOIN condition must reference alias {alias:?}"),
                cond.loc(),
            ));
        }
        if let ast::Op::Alias { name: lname, .. } = left {
            if lpath.len() > 1 && lpath.first() == Some(lname) {
                lpath.remove(0);
            }
        }
        let lkey = dag::Expr::This { path: lpath };
        let rkey = dag::Expr::This { path: rpath };
        let alias_path = dag::Expr::path([alias.as_str()]);

        let mut lseq = self.sem_sql_op(left)?;
        lseq.push(dag::Op::sort_by(vec![lkey.clone()], Order::Asc));
        let mut rseq = self.sem_sql_op(right_op)?;
        rseq.push(dag::Op::Cut {
            args: vec![dag::Assignment {
                lhs: alias_path.clone(),
                rhs: dag::Expr::this(),
            }],
            quiet: false,
        });
        rseq.push(dag::Op::sort_by(vec![rkey.clone()], Order::Asc));
        Ok(vec![
            dag::Op::Fork {
                paths: vec![lseq, rseq],
                merge_by: None,
                merge_reverse: false,
            },
            dag::Op::Join {
                style: style.to_string(),
                left_key: lkey,
                right_key: rkey,
                args: vec![dag::Assignment {
                    lhs: alias_path.clone(),
                    rhs: alias_path,
                }],
            },
        ])
    }
}

fn is_agg(e: &dag::Expr) -> bool {
    matches!(e, dag::Expr::Agg { .. })
}

fn display_path(e: &dag::Expr) -> String {
    match e.as_path() {
        Some(p) => p.join("."),
        None => "?".to_string(),
    }
}

/// Matches a GROUP BY expression to the selection: by expression, or by the
/// name the selection gives it.
fn group_key(ge: &dag::Expr, selection: &[dag::Assignment]) -> Result<dag::Assignment, String> {
    if let Some(a) = selection.iter().find(|a| !is_agg(&a.rhs) && &a.rhs == ge) {
        return Ok(a.clone());
    }
    let Some(path) = ge.as_path() else {
        return Err("bad GROUP BY key".to_string());
    };
    if let Some(a) = selection.iter().find(|a| a.lhs.as_path() == Some(path)) {
        if is_agg(&a.rhs) {
            return Err("bad GROUP BY key".to_string());
        }
        return Ok(a.clone());
    }
    let name = path.join(".");
    let within = |p: &Path| p.len() < path.len() && path.starts_with(p);
    if selection
        .iter()
        .any(|a| a.rhs.as_path().is_some_and(within))
    {
        return Err(format!(
            "'{name}': GROUP BY key cannot be a sub-field of the selected value"
        ));
    }
    Err(format!("'{name}': GROUP BY key not in selection"))
}

/// Replaces aggregations in a HAVING predicate with references to the
/// summary's output, adding hidden aggregations for any the selection lacks.
/// `count(*)`, which reaches the analyzer as a `count` without an argument.
fn is_count_star(e: &dag::Expr) -> bool {
    matches!(e, dag::Expr::Agg { name, expr: None, where_: None } if name == "count")
}

fn rewrite_aggs(e: dag::Expr, aggs: &mut Vec<dag::Assignment>) -> dag::Expr {
    let boxed = |e: Box<dag::Expr>, aggs: &mut Vec<dag::Assignment>| Box::new(rewrite_aggs(*e, aggs));
    match e {
        agg @ dag::Expr::Agg { .. } => {
            if let Some(a) = aggs.iter().find(|a| a.rhs == agg) {
                return a.lhs.clone();
            }
            let lhs = dag::Expr::path([format!("$having{}", aggs.len())]);
            aggs.push(dag::Assignment {
                lhs: lhs.clone(),
                rhs: agg,
            });
            lhs
        }
        dag::Expr::BinaryExpr { op, lhs, rhs } => dag::Expr::BinaryExpr {
            op,
            lhs: boxed(lhs, aggs),
            rhs: boxed(rhs, aggs),
        },
        dag::Expr::UnaryExpr { op, operand } => dag::Expr::UnaryExpr {
            op,
            operand: boxed(operand, aggs),
        },
        dag::Expr::Conditional { cond, then, else_ } => dag::Expr::Conditional {
            cond: boxed(cond, aggs),
            then: boxed(then, aggs),
            else_: boxed(else_, aggs),
        },
        dag::Expr::Call { name, args } => dag::Expr::Call {
            name,
            args: args.into_iter().map(|a| rewrite_aggs(a, aggs)).collect(),
        },
        other => other,
    }
}
