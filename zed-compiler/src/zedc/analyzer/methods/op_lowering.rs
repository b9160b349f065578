//! Pipeline operators and data sources.

use crate::zedc::{
    analyzer::{
        Analyzer,
        errors::CompileError,
        methods::expr_lowering::{is_bool, reglob},
        scope::Entry,
    },
    ast,
    dag::{self, COMMIT_METAS, LAKE_METAS, Order, POOL_METAS, SortKey},
    parser::location::Loc,
    zson::{self, formatter},
};
use std::collections::HashSet;

impl Analyzer<'_> {
    /// Lowers a nested sequence. Scopes inside it keep their declarations.
    pub(crate) fn sem_seq(&mut self, seq: &ast::Seq) -> Result<dag::Seq, CompileError> {
        let mut out = Vec::with_capacity(seq.len());
        for op in seq {
            self.check_cancel()?;
            out.extend(self.sem_op(op)?);
        }
        Ok(out)
    }

    /// Lowers one operator to the operators it expands into.
    pub(crate) fn sem_op(&mut self, op: &ast::Op) -> Result<dag::Seq, CompileError> {
        let out = match op {
            ast::Op::From { elems, loc } => return self.sem_from(elems, *loc),
            ast::Op::Scope { decls, body, .. } => {
                self.scope.enter();
                let out = self.sem_scope(decls, body);
                self.scope.exit();
                out?
            }
            ast::Op::Parallel { paths, .. } => dag::Op::Fork {
                paths: paths
                    .iter()
                    .map(|p| self.sem_seq(p))
                    .collect::<Result<_, _>>()?,
                merge_by: None,
                merge_reverse: false,
            },
            ast::Op::Sequential { body, .. } => return self.sem_seq(body),
            ast::Op::Switch { expr, cases, .. } => self.sem_switch(expr.as_ref(), cases)?,
            ast::Op::Search { expr, .. } | ast::Op::Where { expr, .. } => {
                dag::Op::filter(self.sem_expr(expr)?)
            }
            ast::Op::Cut { args, .. } => dag::Op::Cut {
                args: self.sem_assignments(args)?,
                quiet: false,
            },
            ast::Op::Pick { args, .. } => dag::Op::Pick {
                args: self.sem_assignments(args)?,
            },
            ast::Op::Drop { args, loc } => {
                if args.is_empty() {
                    return Err(CompileError::shape("drop: no fields given", *loc));
                }
                dag::Op::Drop {
                    args: args
                        .iter()
                        .map(|a| self.sem_field(a))
                        .collect::<Result<_, _>>()?,
                }
            }
            ast::Op::Put { args, .. } => dag::Op::Put {
                args: self.sem_assignments(args)?,
            },
            ast::Op::Rename { args, .. } => dag::Op::Rename {
                args: args
                    .iter()
                    .map(|a| self.sem_rename(a))
                    .collect::<Result<_, _>>()?,
            },
            ast::Op::Sort {
                args,
                reverse,
                nulls_first,
                ..
            } => {
                let order = if *reverse { Order::Desc } else { Order::Asc };
                dag::Op::Sort {
                    args: self
                        .sem_exprs(args)?
                        .into_iter()
                        .map(|key| dag::SortExpr { key, order })
                        .collect(),
                    nulls_first: *nulls_first,
                    reverse: *reverse,
                }
            }
            ast::Op::Top {
                limit,
                args,
                flush,
                loc,
            } => {
                let limit = match limit {
                    Some(e) => Some(self.positive_int(e, "top", *loc)?),
                    None => None,
                };
                if args.is_empty() {
                    return Err(CompileError::shape("top: no arguments given", *loc));
                }
                dag::Op::Top {
                    limit,
                    args: self.sem_exprs(args)?,
                    flush: *flush,
                }
            }
            ast::Op::Head { count, loc } => dag::Op::Head {
                count: self.count_or_one(count.as_ref(), "head", *loc)?,
            },
            ast::Op::Tail { count, loc } => dag::Op::Tail {
                count: self.count_or_one(count.as_ref(), "tail", *loc)?,
            },
            ast::Op::Uniq { cflag, .. } => dag::Op::Uniq { cflag: *cflag },
            ast::Op::Fuse { .. } => dag::Op::Fuse,
            ast::Op::Shape { .. } => dag::Op::Shape,
            ast::Op::Pass { .. } => dag::Op::Pass,
            ast::Op::Sample { expr, .. } => return self.sem_sample(expr.as_ref()),
            ast::Op::Join {
                style,
                right,
                left_key,
                right_key,
                args,
                ..
            } => {
                let join = dag::Op::Join {
                    style: style.clone(),
                    left_key: self.sem_expr(left_key)?,
                    right_key: self.sem_expr(right_key)?,
                    args: self.sem_assignments(args)?,
                };
                let Some(right) = right else {
                    return Ok(vec![join]);
                };
                let fork = dag::Op::Fork {
                    paths: vec![vec![dag::Op::Pass], self.sem_seq(right)?],
                    merge_by: None,
                    merge_reverse: false,
                };
                return Ok(vec![fork, join]);
            }
            ast::Op::Summarize {
                every,
                keys,
                aggs,
                limit,
                loc,
            } => return self.sem_summarize(every.as_ref(), keys, aggs, *limit, *loc),
            ast::Op::Explode { args, ty, as_, loc } => {
                let Some(ty) = ty else {
                    return Err(CompileError::type_error("explode: type must be given", *loc));
                };
                let ty = zson::Analyzer::new(self.zctx)
                    .convert_type(ty)
                    .map_err(|e| CompileError::type_error(e.to_string(), *loc))?;
                let as_ = match as_ {
                    Some(e) => self.sem_field(e)?,
                    None => dag::Expr::path(["value"]),
                };
                dag::Op::Explode {
                    args: self.sem_exprs(args)?,
                    ty: formatter::format_type(&ty),
                    as_,
                }
            }
            ast::Op::Merge { expr, .. } => dag::Op::Merge {
                expr: self.sem_expr(expr)?,
                order: Order::Asc,
            },
            ast::Op::Over {
                exprs,
                locals,
                body,
                loc,
            } => {
                let exprs = self.sem_exprs(exprs)?;
                match body {
                    None if !locals.is_empty() => {
                        return Err(CompileError::shape(
                            "over operator: cannot have a with clause without a lateral query",
                            *loc,
                        ));
                    }
                    None => dag::Op::Over {
                        defs: Vec::new(),
                        exprs,
                        body: None,
                    },
                    Some(body) => {
                        self.scope.enter();
                        let out = self.sem_over_body(locals, body);
                        self.scope.exit();
                        let (defs, body) = out?;
                        dag::Op::Over {
                            defs,
                            exprs,
                            body: Some(body),
                        }
                    }
                }
            }
            ast::Op::Yield { exprs, .. } => dag::Op::Yield {
                exprs: self.sem_exprs(exprs)?,
            },
            ast::Op::Load {
                pool,
                branch,
                author,
                message,
                meta,
                loc,
            } => {
                let id = self
                    .source
                    .pool_id(&self.cancel, pool)
                    .map_err(|e| e.context("load").or_at(*loc))?;
                dag::Op::Load {
                    pool: id,
                    branch: branch.clone(),
                    author: author.clone(),
                    message: message.clone(),
                    meta: meta.clone(),
                }
            }
            ast::Op::OpAssignment { assignments, loc } => {
                return self.sem_op_assignment(assignments, *loc);
            }
            ast::Op::OpExpr { expr, loc } => return self.sem_op_expr(expr, *loc),
            ast::Op::Select(_)
            | ast::Op::SqlPipe { .. }
            | ast::Op::Limit { .. }
            | ast::Op::OrderBy { .. }
            | ast::Op::With { .. }
            | ast::Op::SqlJoin { .. }
            | ast::Op::CrossJoin { .. }
            | ast::Op::Union { .. }
            | ast::Op::Alias { .. }
            | ast::Op::Ordinality { .. }
            | ast::Op::Table { .. } => return self.sem_sql_op(op),
        };
        Ok(vec![out])
    }

    fn sem_scope(&mut self, decls: &[ast::Decl], body: &ast::Seq) -> Result<dag::Op, CompileError> {
        let (consts, funcs) = self.sem_decls(decls)?;
        Ok(dag::Op::Scope {
            consts,
            funcs,
            body: self.sem_seq(body)?,
        })
    }

    fn count_or_one(&mut self, e: Option<&ast::Expr>, what: &str, loc: Loc) -> Result<u64, CompileError> {
        match e {
            Some(e) => self.positive_int(e, what, loc),
            None => Ok(1),
        }
    }

    /// Without a switch expression each case is a predicate and `default`
    /// matches everything.
    fn sem_switch(
        &mut self,
        expr: Option<&ast::Expr>,
        cases: &[ast::Case],
    ) -> Result<dag::Op, CompileError> {
        let expr = match expr {
            Some(e) => Some(self.sem_expr(e)?),
            None => None,
        };
        let mut out = Vec::with_capacity(cases.len());
        for c in cases {
            let case_expr = match (&c.expr, &expr) {
                (Some(e), _) => Some(self.sem_expr(e)?),
                (None, Some(_)) => None,
                (None, None) => Some(dag::Expr::literal("true")),
            };
            out.push(dag::Case {
                expr: case_expr,
                path: self.sem_seq(&c.path)?,
            });
        }
        Ok(dag::Op::Switch { expr, cases: out })
    }

    /// `rename new := old`. Both sides must be fields under the same parent.
    fn sem_rename(&mut self, a: &ast::Assignment) -> Result<dag::Assignment, CompileError> {
        let explicit = || CompileError::shape("'rename' requires explicit field references", a.loc);
        let Some(lhs) = &a.lhs else {
            return Err(explicit());
        };
        let (Ok(dst), Ok(src)) = (self.sem_field(lhs), self.sem_field(&a.rhs)) else {
            return Err(explicit());
        };
        let (Some(dpath), Some(spath)) = (dst.as_path(), src.as_path()) else {
            return Err(explicit());
        };
        let (d, s) = (dpath.join("."), spath.join("."));
        if dpath.len() != spath.len() {
            return Err(CompileError::shape(format!("cannot rename {s} to {d}"), a.loc));
        }
        let parent = dpath.len() - 1;
        if let Some((x, y)) = spath[..parent]
            .iter()
            .zip(&dpath[..parent])
            .find(|(x, y)| x != y)
        {
            return Err(CompileError::shape(
                format!("cannot rename {s} to {d} (differ in {x} vs {y})"),
                a.loc,
            ));
        }
        Ok(dag::Assignment { lhs: dst, rhs: src })
    }

    /// `sample e` keeps one value of each type `e` takes.
    fn sem_sample(&mut self, expr: Option<&ast::Expr>) -> Result<dag::Seq, CompileError> {
        let e = match expr {
            Some(e) => self.sem_field(e)?,
            None => dag::Expr::this(),
        };
        let summarize = dag::Op::summarize(
            vec![dag::Assignment {
                lhs: dag::Expr::path(["typeof"]),
                rhs: dag::Expr::call("typeof", vec![e.clone()]),
            }],
            vec![dag::Assignment {
                lhs: dag::Expr::path(["sample"]),
                rhs: dag::Expr::Agg {
                    name: "any".to_string(),
                    expr: Some(Box::new(e)),
                    where_: None,
                },
            }],
        );
        Ok(vec![
            summarize,
            dag::Op::Yield {
                exprs: vec![dag::Expr::path(["sample"])],
            },
        ])
    }

    fn sem_summarize(
        &mut self,
        every: Option<&ast::Expr>,
        keys: &[ast::Assignment],
        aggs: &[ast::Assignment],
        limit: Option<u64>,
        loc: Loc,
    ) -> Result<dag::Seq, CompileError> {
        let mut dkeys = self.sem_assignments(keys)?;
        if let Some(every) = every {
            let d = self.sem_expr(every)?;
            dkeys.insert(
                0,
                dag::Assignment {
                    lhs: dag::Expr::path(["ts"]),
                    rhs: dag::Expr::call("trunc", vec![dag::Expr::path(["ts"]), d]),
                },
            );
        }
        let daggs = self.sem_assignments(aggs)?;
        for (a, src) in daggs.iter().zip(aggs) {
            if !matches!(a.rhs, dag::Expr::Agg { .. }) {
                return Err(CompileError::type_error(
                    "summarize: expression is not an aggregation",
                    src.rhs.loc(),
                ));
            }
        }
        let mut seen = HashSet::new();
        for a in dkeys.iter().chain(&daggs) {
            if let Some(path) = a.lhs.as_path() {
                if !seen.insert(path.clone()) {
                    return Err(CompileError::shape(
                        format!("summarize: duplicate field {}", path.join(".")),
                        loc,
                    ));
                }
            }
        }
        let singleton = dkeys.is_empty() && daggs.len() == 1 && aggs[0].lhs.is_none();
        let name = daggs.first().and_then(|a| a.lhs.as_path().cloned());
        let mut op = dag::Op::summarize(dkeys, daggs);
        if let dag::Op::Summarize { limit: l, .. } = &mut op {
            *l = limit;
        }
        match name {
            Some(path) if singleton => Ok(vec![
                op,
                dag::Op::Yield {
                    exprs: vec![dag::Expr::This { path }],
                },
            ]),
            _ => Ok(vec![op]),
        }
    }

    fn sem_op_assignment(
        &mut self,
        assignments: &[ast::Assignment],
        loc: Loc,
    ) -> Result<dag::Seq, CompileError> {
        let args = self.sem_assignments(assignments)?;
        let naggs = args
            .iter()
            .filter(|a| matches!(a.rhs, dag::Expr::Agg { .. }))
            .count();
        if naggs == 0 {
            return Ok(vec![dag::Op::Put { args }]);
        }
        if naggs != args.len() {
            return Err(CompileError::shape(
                "mix of aggregations and non-aggregations in assignment list",
                loc,
            ));
        }
        Ok(vec![dag::Op::summarize(Vec::new(), args)])
    }

    /// A bare expression: a user operator call, an aggregation, a filter, or
    /// a projection.
    fn sem_op_expr(&mut self, expr: &ast::Expr, loc: Loc) -> Result<dag::Seq, CompileError> {
        let invoked = match expr {
            ast::Expr::Call {
                name,
                args,
                where_: None,
                ..
            } => Some((name, args.as_slice())),
            ast::Expr::Id { name, .. } => Some((name, &[][..])),
            _ => None,
        };
        if let Some((name, args)) = invoked {
            if let Some(Entry::Op(def)) = self.scope.lookup(name) {
                return self.expand_op(def, args, loc);
            }
        }
        let e = self.sem_expr(expr)?;
        if let dag::Expr::Agg { name, .. } = &e {
            let path = vec![name.clone()];
            return Ok(vec![
                dag::Op::summarize(
                    Vec::new(),
                    vec![dag::Assignment {
                        lhs: dag::Expr::This { path: path.clone() },
                        rhs: e,
                    }],
                ),
                dag::Op::Yield {
                    exprs: vec![dag::Expr::This { path }],
                },
            ]);
        }
        if is_bool(&e) {
            return Ok(vec![dag::Op::filter(e)]);
        }
        Ok(vec![dag::Op::Yield { exprs: vec![e] }])
    }

    fn sem_from(&mut self, elems: &[ast::FromElem], loc: Loc) -> Result<dag::Seq, CompileError> {
        if let [elem] = elems {
            let mut scans = self.sem_source(elem)?;
            if scans.len() > 1 {
                if elem.body.is_some() {
                    return Err(pattern_body_error(loc));
                }
                let paths = scans.into_iter().map(|s| vec![s]).collect();
                return Ok(vec![dag::Op::Fork {
                    paths,
                    merge_by: None,
                    merge_reverse: false,
                }]);
            }
            if let Some(body) = &elem.body {
                scans.extend(self.sem_seq(body)?);
            }
            return Ok(scans);
        }
        let mut paths = Vec::with_capacity(elems.len());
        for elem in elems {
            let scans = self.sem_source(elem)?;
            if scans.len() > 1 && elem.body.is_some() {
                return Err(pattern_body_error(elem.loc));
            }
            let body = match &elem.body {
                Some(body) => self.sem_seq(body)?,
                None => Vec::new(),
            };
            for scan in scans {
                let mut path = vec![scan];
                path.extend(body.iter().cloned());
                paths.push(path);
            }
        }
        Ok(vec![dag::Op::Fork {
            paths,
            merge_by: None,
            merge_reverse: false,
        }])
    }

    fn sem_source(&mut self, elem: &ast::FromElem) -> Result<Vec<dag::Op>, CompileError> {
        let args = &elem.args;
        let sort_key = args
            .order
            .as_ref()
            .map(|(key, order)| SortKey::new(key.split('.').map(str::to_string).collect(), *order));
        match &elem.source {
            ast::Source::File { path, .. } => Ok(vec![file_scan(path, args, sort_key)]),
            ast::Source::Http { url, .. } => Ok(vec![dag::Op::HttpScan {
                url: url.clone(),
                format: args.format.clone(),
                method: args.method.clone(),
                headers: match &args.headers {
                    Some(h) => Some(self.sem_expr(h)?),
                    None => None,
                },
                body: args.body.clone(),
                sort_key,
            }]),
            ast::Source::Name { spec, loc } => {
                if self.source.is_lake() {
                    return self.sem_pool(spec).map_err(|e| e.or_at(*loc));
                }
                match spec {
                    ast::PoolSpec {
                        pool: Some(ast::PoolName::Text { name }),
                        commit: None,
                        meta: None,
                    } => Ok(vec![file_scan(name, args, sort_key)]),
                    _ => Err(CompileError::catalog_at(
                        "from pool cannot be used without a lake",
                        *loc,
                    )),
                }
            }
            ast::Source::Pool { spec, loc } => {
                if !self.source.is_lake() {
                    return Err(CompileError::catalog_at(
                        "from pool cannot be used without a lake",
                        *loc,
                    ));
                }
                self.sem_pool(spec).map_err(|e| e.or_at(*loc))
            }
        }
    }

    /// Resolves a pool reference against the catalog. A glob or regexp
    /// matches any number of pools and yields a scan for each.
    pub(crate) fn sem_pool(&mut self, spec: &ast::PoolSpec) -> Result<Vec<dag::Op>, CompileError> {
        let commit = spec.commit.as_deref();
        let meta = spec.meta.as_deref();
        match &spec.pool {
            None => match meta {
                Some(m) if LAKE_METAS.contains(&m) => Ok(vec![dag::Op::LakeMetaScan {
                    meta: m.to_string(),
                }]),
                _ => Err(CompileError::catalog(format!(
                    "unknown lake metadata type {:?} in from operator",
                    meta.unwrap_or_default()
                ))),
            },
            Some(ast::PoolName::Text { name }) if name == "HEAD" => {
                let Some(head) = self.head else {
                    return Err(CompileError::catalog("cannot scan from unknown HEAD"));
                };
                let commit = commit.unwrap_or(&head.branch);
                Ok(vec![self.sem_pool_name(&head.pool, Some(commit), meta)?])
            }
            Some(ast::PoolName::Text { name }) => Ok(vec![self.sem_pool_name(name, commit, meta)?]),
            Some(ast::PoolName::Glob { pattern }) => {
                self.sem_pool_pattern(&reglob(pattern), pattern, "glob", commit, meta)
            }
            Some(ast::PoolName::Regexp { pattern }) => {
                self.sem_pool_pattern(pattern, pattern, "regexp", commit, meta)
            }
        }
    }

    fn sem_pool_pattern(
        &mut self,
        re: &str,
        pattern: &str,
        desc: &str,
        commit: Option<&str>,
        meta: Option<&str>,
    ) -> Result<Vec<dag::Op>, CompileError> {
        let re = regex::Regex::new(re)
            .map_err(|e| CompileError::catalog(format!("invalid pool {desc} {pattern:?}: {e}")))?;
        let names: Vec<String> = self
            .source
            .pool_names(&self.cancel)?
            .into_iter()
            .filter(|n| re.is_match(n))
            .collect();
        if names.is_empty() {
            return Err(CompileError::catalog(format!(
                "{pattern}: pool matching {desc} not found"
            )));
        }
        tracing::debug!(pattern, matched = names.len(), "expanded pool pattern");
        names
            .iter()
            .map(|n| self.sem_pool_name(n, commit, meta))
            .collect()
    }

    fn sem_pool_name(
        &mut self,
        name: &str,
        commit: Option<&str>,
        meta: Option<&str>,
    ) -> Result<dag::Op, CompileError> {
        let id = self.source.pool_id(&self.cancel, name)?;
        if let (None, Some(m)) = (commit, meta) {
            if POOL_METAS.contains(&m) {
                return Ok(dag::Op::PoolMetaScan {
                    id,
                    meta: m.to_string(),
                });
            }
        }
        let commit = self
            .source
            .commit_object(&self.cancel, id, commit.unwrap_or("main"))?;
        match meta {
            Some(m) if COMMIT_METAS.contains(&m) => Ok(dag::Op::CommitMetaScan {
                pool: id,
                commit,
                meta: m.to_string(),
                tap: false,
                key_pruner: None,
            }),
            Some(m) => Err(CompileError::catalog(format!(
                "unknown metadata type {m:?} in from operator"
            ))),
            None => Ok(dag::Op::PoolScan {
                id,
                commit,
                filter: None,
                key_pruner: None,
                fields: None,
            }),
        }
    }
}

fn pattern_body_error(loc: Loc) -> CompileError {
    CompileError::unsupported("=> not allowed after pool pattern in 'from' operator", loc)
}

pub(crate) fn file_scan(path: &str, args: &ast::SourceArgs, sort_key: Option<SortKey>) -> dag::Op {
    dag::Op::FileScan {
        path: path.to_string(),
        format: args.format.clone(),
        sort_key,
        filter: None,
        fields: None,
    }
}
