use crate::zedc::{
    ast::{Assignment, Cte, Expr, Nulls, Op, Order, Select, SortExpr},
    parser::{
        ParserError, Rule, ZedParser,
        location::HasLoc,
        utils::{PairTools, PairsTools, unquote},
    },
};
use pest::iterators::Pair;

impl ZedParser {
    pub(super) fn parse_sql_op(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let inner = pair.try_inner_next()?;
        match inner.as_rule() {
            Rule::sql_with => {
                let loc = inner.loc();
                let mut ctes = Vec::new();
                let mut body = None;
                for p in inner.into_inner() {
                    match p.as_rule() {
                        Rule::cte => {
                            let loc = p.loc();
                            let mut parts = p.into_inner();
                            let name = parts.try_next()?.as_str().to_string();
                            let body = self.parse_sql_query(parts.try_next()?)?;
                            ctes.push(Cte { name, body, loc });
                        }
                        _ => body = Some(self.parse_sql_query(p)?),
                    }
                }
                let body = body.ok_or_else(|| ParserError::at("WITH requires a query", loc))?;
                Ok(Op::With {
                    ctes,
                    body: Box::new(body),
                    loc,
                })
            }
            _ => self.parse_sql_query(inner),
        }
    }

    fn parse_sql_query(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let mut op = self.parse_sql_union(inner.try_next()?)?;
        for p in inner {
            match p.as_rule() {
                Rule::order_by => {
                    let exprs = p
                        .into_inner()
                        .map(|s| self.parse_sort_item(s))
                        .collect::<Result<_, _>>()?;
                    op = Op::OrderBy {
                        op: Box::new(op),
                        exprs,
                        loc,
                    };
                }
                Rule::sql_limit => {
                    op = Op::Limit {
                        op: Box::new(op),
                        count: self.parse_expr(p.try_inner_next()?)?,
                        loc,
                    };
                }
                _ => {}
            }
        }
        Ok(op)
    }

    fn parse_sql_union(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let mut op = self.parse_select(inner.try_next()?)?;
        while let Some(union) = inner.next() {
            let distinct = union.into_inner().next().is_none();
            let right = self.parse_select(inner.try_next()?)?;
            op = Op::Union {
                distinct,
                left: Box::new(op),
                right: Box::new(right),
                loc,
            };
        }
        Ok(op)
    }

    fn parse_select(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let mut select = Select {
            distinct: false,
            value: false,
            selection: Vec::new(),
            from: None,
            where_: None,
            group_by: Vec::new(),
            having: None,
            loc: pair.loc(),
        };
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::select_mod => match p.as_str().to_lowercase().as_str() {
                    "distinct" => select.distinct = true,
                    _ => select.value = true,
                },
                Rule::selection => {
                    select.selection = p
                        .into_inner()
                        .map(|s| self.parse_selection_item(s))
                        .collect::<Result<_, _>>()?
                }
                Rule::from_clause => select.from = Some(self.parse_sql_from(p)?),
                Rule::where_clause => select.where_ = Some(self.parse_expr(p.try_inner_next()?)?),
                Rule::group_by => {
                    select.group_by = p
                        .into_inner()
                        .map(|e| self.parse_expr(e))
                        .collect::<Result<_, _>>()?
                }
                Rule::having => select.having = Some(self.parse_expr(p.try_inner_next()?)?),
                _ => {}
            }
        }
        Ok(Op::Select(Box::new(select)))
    }

    fn parse_selection_item(&self, pair: Pair<Rule>) -> Result<Assignment, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let first = inner.try_next()?;
        if first.as_rule() == Rule::select_star {
            return Ok(Assignment {
                lhs: None,
                rhs: Expr::This { loc: first.loc() },
                loc,
            });
        }
        let rhs = self.parse_expr(first)?;
        let lhs = match inner.next() {
            Some(alias) => Some(Expr::id(unquote(&alias)?, alias.loc())),
            None => None,
        };
        Ok(Assignment { lhs, rhs, loc })
    }

    fn parse_sql_from(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let mut inner = pair.into_inner();
        let mut op = self.parse_table_ref(inner.try_next()?)?;
        for join in inner {
            let loc = join.loc();
            let join = join.try_inner_next()?;
            op = match join.as_rule() {
                Rule::cross_join => Op::CrossJoin {
                    left: Box::new(op),
                    right: Box::new(self.parse_table_ref(join.try_inner_next()?)?),
                    loc,
                },
                _ => {
                    let mut parts = join.into_inner();
                    let style = match parts.next_if(Rule::join_style) {
                        Some(s) => s.as_str().to_lowercase(),
                        None => "inner".to_string(),
                    };
                    let right = self.parse_table_ref(parts.try_next()?)?;
                    let cond = self.parse_expr(parts.try_next()?)?;
                    Op::SqlJoin {
                        style,
                        left: Box::new(op),
                        right: Box::new(right),
                        cond,
                        loc,
                    }
                }
            };
        }
        Ok(op)
    }

    fn parse_table_ref(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let base = inner.try_next()?;
        let base_loc = base.loc();
        let mut op = match base.as_rule() {
            Rule::table_subquery => self.parse_sql_query(base.try_inner_next()?)?,
            Rule::table_pipe => Op::SqlPipe {
                ops: self.parse_seq(base.try_inner_next()?)?,
                loc: base_loc,
            },
            _ => Op::Table {
                name: unquote(&base.try_inner_next()?)?,
                loc: base_loc,
            },
        };
        for p in inner {
            match p.as_rule() {
                Rule::ordinality => {
                    op = Op::Ordinality {
                        op: Box::new(op),
                        loc,
                    }
                }
                Rule::table_alias => {
                    op = Op::Alias {
                        op: Box::new(op),
                        name: p.try_inner_next()?.as_str().to_string(),
                        loc,
                    }
                }
                _ => {}
            }
        }
        Ok(op)
    }

    fn parse_sort_item(&self, pair: Pair<Rule>) -> Result<SortExpr, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let expr = self.parse_expr(inner.try_next()?)?;
        let mut order = None;
        let mut nulls = None;
        for p in inner {
            match p.as_rule() {
                Rule::sort_dir => {
                    order = Some(if p.as_str().eq_ignore_ascii_case("desc") {
                        Order::Desc
                    } else {
                        Order::Asc
                    })
                }
                Rule::sql_nulls => {
                    nulls = Some(if p.try_inner_next()?.as_str().eq_ignore_ascii_case("first") {
                        Nulls::First
                    } else {
                        Nulls::Last
                    })
                }
                _ => {}
            }
        }
        Ok(SortExpr {
            expr,
            order,
            nulls,
            loc,
        })
    }
}
