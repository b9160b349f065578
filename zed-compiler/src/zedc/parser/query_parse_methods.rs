use crate::zedc::{
    ast::{Assignment, Case, Decl, Def, Expr, Op, Seq},
    parser::{
        ParserError, Rule, ZedParser,
        location::HasLoc,
        utils::{PairTools, PairsTools, regexp_body, unquote},
    },
    zson,
};
use pest::iterators::Pair;

impl ZedParser {
    pub(super) fn parse_query_pair(&self, pair: Pair<Rule>) -> Result<Seq, ParserError> {
        let loc = pair.loc();
        let mut decls = Vec::new();
        let mut body = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::seq => body = self.parse_seq(p)?,
                Rule::EOI => {}
                _ => decls.push(self.parse_decl(p)?),
            }
        }
        if decls.is_empty() {
            return Ok(body);
        }
        Ok(vec![Op::Scope { decls, body, loc }])
    }

    pub(super) fn parse_seq(&self, pair: Pair<Rule>) -> Result<Seq, ParserError> {
        pair.into_inner().map(|p| self.parse_op(p)).collect()
    }

    pub(super) fn parse_decl(&self, pair: Pair<Rule>) -> Result<Decl, ParserError> {
        let loc = pair.loc();
        let rule = pair.as_rule();
        let mut inner = pair.into_inner();
        match rule {
            Rule::const_decl => {
                let name = inner.try_next()?.as_str().to_string();
                let expr = self.parse_expr(inner.try_next()?)?;
                Ok(Decl::Const { name, expr, loc })
            }
            Rule::func_decl => {
                let name = inner.try_next()?.as_str().to_string();
                let params = match inner.next_if(Rule::params) {
                    Some(p) => self.parse_params(p),
                    None => Vec::new(),
                };
                let expr = self.parse_expr(inner.try_next()?)?;
                Ok(Decl::Func {
                    name,
                    params,
                    expr,
                    loc,
                })
            }
            Rule::op_decl => {
                let name = inner.try_next()?.as_str().to_string();
                let params = match inner.next_if(Rule::params) {
                    Some(p) => self.parse_params(p),
                    None => Vec::new(),
                };
                let mut decls = Vec::new();
                let mut body = Vec::new();
                for p in inner {
                    match p.as_rule() {
                        Rule::seq => body = self.parse_seq(p)?,
                        _ => decls.push(self.parse_decl(p)?),
                    }
                }
                if !decls.is_empty() {
                    body = vec![Op::Scope { decls, body, loc }];
                }
                Ok(Decl::Op {
                    name,
                    params,
                    body,
                    loc,
                })
            }
            Rule::type_decl => {
                let name_pair = inner.try_next()?;
                let name = unquote(&name_pair)?;
                let ty = self.parse_zed_type(inner.try_next()?)?;
                Ok(Decl::Type { name, ty, loc })
            }
            other => Err(ParserError::at(
                format!("Unexpected rule in parse_decl: {other:?}"),
                loc,
            )),
        }
    }

    fn parse_params(&self, pair: Pair<Rule>) -> Vec<String> {
        pair.into_inner().map(|p| p.as_str().to_string()).collect()
    }

    pub(super) fn parse_zed_type(
        &self,
        pair: Pair<Rule>,
    ) -> Result<crate::zedc::ast::zed::Type, ParserError> {
        zson::parse_type_str(pair.as_str()).map_err(|e| ParserError::at(e.to_string(), pair.loc()))
    }

    pub(super) fn parse_op(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        match pair.as_rule() {
            Rule::scope_op => {
                let mut decls = Vec::new();
                let mut body = Vec::new();
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::seq => body = self.parse_seq(p)?,
                        _ => decls.push(self.parse_decl(p)?),
                    }
                }
                Ok(Op::Scope { decls, body, loc })
            }
            Rule::sequential_op => Ok(Op::Sequential {
                body: self.parse_seq(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::fork_op => Ok(Op::Parallel {
                paths: pair
                    .into_inner()
                    .map(|p| self.parse_seq(p))
                    .collect::<Result<_, _>>()?,
                loc,
            }),
            Rule::switch_op => self.parse_switch(pair),
            Rule::from_op | Rule::file_op | Rule::get_op | Rule::pool_op => {
                self.parse_from(pair)
            }
            Rule::load_op => self.parse_load(pair),
            Rule::search_op => Ok(Op::Search {
                expr: self.parse_search_expr(pair.try_inner_next()?, true)?,
                loc,
            }),
            Rule::where_op => Ok(Op::Where {
                expr: self.parse_expr(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::sort_op => {
                let mut reverse = false;
                let mut nulls_first = false;
                let mut args = Vec::new();
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::sort_reverse => reverse = true,
                        Rule::sort_nulls => {
                            nulls_first = p.try_inner_next()?.as_str().eq_ignore_ascii_case("first")
                        }
                        Rule::expr_list => args = self.parse_expr_list(p)?,
                        _ => {}
                    }
                }
                Ok(Op::Sort {
                    args,
                    reverse,
                    nulls_first,
                    loc,
                })
            }
            Rule::top_op => {
                let mut limit = None;
                let mut flush = false;
                let mut args = Vec::new();
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::top_limit => limit = Some(Expr::primitive("int64", p.as_str(), p.loc())),
                        Rule::top_flush => flush = true,
                        Rule::expr_list => args = self.parse_expr_list(p)?,
                        _ => {}
                    }
                }
                Ok(Op::Top {
                    limit,
                    args,
                    flush,
                    loc,
                })
            }
            Rule::cut_op => Ok(Op::Cut {
                args: self.parse_assignments(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::pick_op => Ok(Op::Pick {
                args: self.parse_assignments(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::put_op => Ok(Op::Put {
                args: self.parse_assignments(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::rename_op => Ok(Op::Rename {
                args: self.parse_assignments(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::drop_op => Ok(Op::Drop {
                args: match pair.into_inner().next() {
                    Some(p) => self.parse_expr_list(p)?,
                    None => Vec::new(),
                },
                loc,
            }),
            Rule::head_op => Ok(Op::Head {
                count: self.parse_opt_expr(pair)?,
                loc,
            }),
            Rule::tail_op => Ok(Op::Tail {
                count: self.parse_opt_expr(pair)?,
                loc,
            }),
            Rule::sample_op => Ok(Op::Sample {
                expr: self.parse_opt_expr(pair)?,
                loc,
            }),
            Rule::uniq_op => Ok(Op::Uniq {
                cflag: pair.into_inner().next().is_some(),
                loc,
            }),
            Rule::fuse_op => Ok(Op::Fuse { loc }),
            Rule::shape_op => Ok(Op::Shape { loc }),
            Rule::pass_op => Ok(Op::Pass { loc }),
            Rule::join_op => self.parse_join(pair),
            Rule::summarize_op | Rule::implicit_agg => self.parse_summarize(pair),
            Rule::explode_op => {
                let mut inner = pair.into_inner();
                let args = self.parse_expr_list(inner.try_next()?)?;
                let mut ty = None;
                let mut as_ = None;
                for p in inner {
                    match p.as_rule() {
                        Rule::explode_by => ty = Some(self.parse_zed_type(p.try_inner_next()?)?),
                        Rule::explode_as => as_ = Some(self.parse_postfix(p.try_inner_next()?)?),
                        _ => {}
                    }
                }
                Ok(Op::Explode { args, ty, as_, loc })
            }
            Rule::merge_op => Ok(Op::Merge {
                expr: self.parse_expr(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::over_op => {
                let mut inner = pair.into_inner();
                let exprs = self.parse_expr_list(inner.try_next()?)?;
                let mut locals = Vec::new();
                let mut body = None;
                for p in inner {
                    match p.as_rule() {
                        Rule::over_locals => locals = self.parse_locals(p)?,
                        Rule::over_body => body = Some(self.parse_seq(p.try_inner_next()?)?),
                        _ => {}
                    }
                }
                Ok(Op::Over {
                    exprs,
                    locals,
                    body,
                    loc,
                })
            }
            Rule::yield_op => Ok(Op::Yield {
                exprs: self.parse_expr_list(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::sql_op => self.parse_sql_op(pair),
            Rule::op_assignment => {
                let assignments = pair
                    .into_inner()
                    .map(|p| {
                        let loc = p.loc();
                        let mut inner = p.into_inner();
                        let lhs = self.parse_postfix(inner.try_next()?)?;
                        let rhs = self.parse_expr(inner.try_next()?)?;
                        Ok(Assignment {
                            lhs: Some(lhs),
                            rhs,
                            loc,
                        })
                    })
                    .collect::<Result<_, ParserError>>()?;
                Ok(Op::OpAssignment { assignments, loc })
            }
            Rule::match_all => Ok(Op::Search {
                expr: Expr::primitive("bool", "true", loc),
                loc,
            }),
            Rule::regexp => Ok(Op::Search {
                expr: Expr::Regexp {
                    pattern: regexp_body(pair.as_str()),
                    loc,
                },
                loc,
            }),
            Rule::op_expr => {
                let expr = self.parse_search_expr(pair.try_inner_next()?, false)?;
                if is_search(&expr) {
                    Ok(Op::Search { expr, loc })
                } else {
                    Ok(Op::OpExpr { expr, loc })
                }
            }
            other => Err(ParserError::at(
                format!("Unexpected rule in parse_op: {other:?}"),
                loc,
            )),
        }
    }

    fn parse_opt_expr(&self, pair: Pair<Rule>) -> Result<Option<Expr>, ParserError> {
        pair.into_inner()
            .next()
            .map(|p| self.parse_expr(p))
            .transpose()
    }

    fn parse_switch(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        let mut expr = None;
        let mut cases = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::expr => expr = Some(self.parse_expr(p)?),
                Rule::switch_case => {
                    let case_loc = p.loc();
                    let mut case_expr = None;
                    let mut path = Vec::new();
                    for c in p.into_inner() {
                        match c.as_rule() {
                            Rule::expr => case_expr = Some(self.parse_expr(c)?),
                            Rule::seq => path = self.parse_seq(c)?,
                            _ => {}
                        }
                    }
                    cases.push(Case {
                        expr: case_expr,
                        path,
                        loc: case_loc,
                    });
                }
                _ => {}
            }
        }
        Ok(Op::Switch { expr, cases, loc })
    }

    fn parse_join(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        let mut style = "inner".to_string();
        let mut right = None;
        let mut keys = Vec::new();
        let mut args = Vec::new();
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::join_style => style = p.as_str().to_lowercase(),
                Rule::join_right => right = Some(self.parse_seq(p.try_inner_next()?)?),
                Rule::join_key => keys.push(self.parse_postfix(p.try_inner_next()?)?),
                Rule::assignments => args = self.parse_assignments(p)?,
                _ => {}
            }
        }
        let mut keys = keys.into_iter();
        let left_key = keys
            .next()
            .ok_or_else(|| ParserError::at("join requires a key", loc))?;
        let right_key = keys.next().unwrap_or_else(|| left_key.clone());
        Ok(Op::Join {
            style,
            right,
            left_key,
            right_key,
            args,
            loc,
        })
    }

    fn parse_summarize(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        let mut every = None;
        let mut keys = Vec::new();
        let mut aggs = Vec::new();
        let mut limit = None;
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::every => {
                    let d = p.try_inner_next()?;
                    every = Some(Expr::primitive("duration", d.as_str(), d.loc()));
                }
                Rule::aggs => {
                    aggs = p
                        .into_inner()
                        .map(|a| self.parse_assignment(a))
                        .collect::<Result<_, _>>()?
                }
                Rule::by_clause => {
                    keys = p
                        .into_inner()
                        .map(|a| self.parse_assignment(a))
                        .collect::<Result<_, _>>()?
                }
                Rule::agg_limit => {
                    let n = p.try_inner_next()?;
                    limit = Some(n.as_str().parse::<u64>().map_err(|_| {
                        ParserError::at("summarize limit must be an integer", n.loc())
                    })?);
                }
                _ => {}
            }
        }
        Ok(Op::Summarize {
            every,
            keys,
            aggs,
            limit,
            loc,
        })
    }

    pub(super) fn parse_locals(&self, pair: Pair<Rule>) -> Result<Vec<Def>, ParserError> {
        pair.into_inner()
            .map(|p| {
                let loc = p.loc();
                let mut inner = p.into_inner();
                let id = inner.try_next()?;
                let name = id.as_str().to_string();
                let expr = match inner.next() {
                    Some(e) => self.parse_expr(e)?,
                    None => Expr::id(name.clone(), id.loc()),
                };
                Ok(Def { name, expr, loc })
            })
            .collect()
    }

    pub(super) fn parse_assignments(&self, pair: Pair<Rule>) -> Result<Vec<Assignment>, ParserError> {
        pair.into_inner().map(|p| self.parse_assignment(p)).collect()
    }

    pub(super) fn parse_assignment(&self, pair: Pair<Rule>) -> Result<Assignment, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let first = inner.try_next()?;
        match inner.next() {
            Some(rhs) => Ok(Assignment {
                lhs: Some(self.parse_postfix(first)?),
                rhs: self.parse_expr(rhs)?,
                loc,
            }),
            None => Ok(Assignment {
                lhs: None,
                rhs: self.parse_expr(first)?,
                loc,
            }),
        }
    }

    pub(super) fn parse_expr_list(&self, pair: Pair<Rule>) -> Result<Vec<Expr>, ParserError> {
        pair.into_inner().map(|p| self.parse_expr(p)).collect()
    }
}

/// True when the expression uses search-only syntax and so must run as a search.
fn is_search(e: &Expr) -> bool {
    match e {
        Expr::Regexp { .. } | Expr::Glob { .. } | Expr::Term { .. } => true,
        Expr::Binary { op, lhs, rhs, .. } if op == "and" || op == "or" => {
            is_search(lhs) || is_search(rhs)
        }
        Expr::Unary { op, operand, .. } if op == "!" => is_search(operand),
        _ => false,
    }
}
