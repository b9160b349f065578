use crate::zedc::{
    ast::{EntryExpr, Expr, FStringElem, RecordElem, VectorElem, zed},
    parser::{
        ParserError, Rule, ZedParser,
        location::{HasLoc, Loc},
        utils::{PairTools, PairsTools, regexp_body, unquote},
    },
    zed::Primitive,
    zson::{lexer::Lexer, parser::classify},
};
use pest::iterators::Pair;

impl ZedParser {
    pub(super) fn parse_expr(&self, pair: Pair<Rule>) -> Result<Expr, ParserError> {
        match pair.as_rule() {
            Rule::expr => {
                let loc = pair.loc();
                let mut inner = pair.into_inner();
                let cond = self.parse_expr(inner.try_next()?)?;
                match inner.next() {
                    None => Ok(cond),
                    Some(then) => Ok(Expr::Conditional {
                        cond: Box::new(cond),
                        then: Box::new(self.parse_expr(then)?),
                        else_: Box::new(self.parse_expr(inner.try_next()?)?),
                        loc,
                    }),
                }
            }
            Rule::or_expr => self.fold_logical(pair, "or"),
            Rule::and_expr => self.fold_logical(pair, "and"),
            Rule::not_expr => {
                let loc = pair.loc();
                let mut inner = pair.into_inner();
                let first = inner.try_next()?;
                match first.as_rule() {
                    Rule::not_op => Ok(Expr::Unary {
                        op: "!".to_string(),
                        operand: Box::new(self.parse_expr(inner.try_next()?)?),
                        loc,
                    }),
                    _ => self.parse_expr(first),
                }
            }
            Rule::comparison => {
                let mut inner = pair.into_inner();
                let lhs = self.parse_expr(inner.try_next()?)?;
                match inner.next() {
                    None => Ok(lhs),
                    Some(op) => {
                        let rhs = self.parse_expr(inner.try_next()?)?;
                        Ok(Expr::binary(&comparator(op.as_str()), lhs, rhs))
                    }
                }
            }
            Rule::additive | Rule::multiplicative => {
                let mut inner = pair.into_inner();
                let mut lhs = self.parse_expr(inner.try_next()?)?;
                while let Some(op) = inner.next() {
                    let rhs = self.parse_expr(inner.try_next()?)?;
                    lhs = Expr::binary(op.as_str(), lhs, rhs);
                }
                Ok(lhs)
            }
            Rule::unary => {
                let loc = pair.loc();
                let mut inner = pair.into_inner();
                let first = inner.try_next()?;
                match first.as_rule() {
                    Rule::neg_op => Ok(negate(self.parse_expr(inner.try_next()?)?, loc)),
                    _ => self.parse_expr(first),
                }
            }
            Rule::postfix => self.parse_postfix(pair),
            _ => self.parse_primary(pair),
        }
    }

    fn fold_logical(&self, pair: Pair<Rule>, op: &str) -> Result<Expr, ParserError> {
        let mut inner = pair.into_inner();
        let mut lhs = self.parse_expr(inner.try_next()?)?;
        for p in inner {
            lhs = Expr::binary(op, lhs, self.parse_expr(p)?);
        }
        Ok(lhs)
    }

    pub(super) fn parse_postfix(&self, pair: Pair<Rule>) -> Result<Expr, ParserError> {
        if pair.as_rule() != Rule::postfix {
            return self.parse_expr(pair);
        }
        let mut inner = pair.into_inner();
        let mut expr = self.parse_primary(inner.try_next()?)?;
        for access in inner {
            let loc = expr.loc().to(access.loc());
            match access.as_rule() {
                Rule::dot_access => {
                    let field = access.try_inner_next()?;
                    expr = Expr::Dot {
                        lhs: Box::new(expr),
                        rhs: unquote(&field)?,
                        loc,
                    };
                }
                Rule::index_access => {
                    let index = access.try_inner_next()?;
                    expr = match index.as_rule() {
                        Rule::slice => {
                            let mut from = None;
                            let mut to = None;
                            for bound in index.into_inner() {
                                let rule = bound.as_rule();
                                let e = Some(Box::new(self.parse_expr(bound.try_inner_next()?)?));
                                match rule {
                                    Rule::slice_from => from = e,
                                    _ => to = e,
                                }
                            }
                            Expr::Slice {
                                expr: Box::new(expr),
                                from,
                                to,
                                loc,
                            }
                        }
                        _ => Expr::Index {
                            expr: Box::new(expr),
                            index: Box::new(self.parse_expr(index)?),
                            loc,
                        },
                    };
                }
                other => {
                    return Err(ParserError::at(
                        format!("Unexpected rule in parse_postfix: {other:?}"),
                        loc,
                    ));
                }
            }
        }
        Ok(expr)
    }

    fn parse_primary(&self, pair: Pair<Rule>) -> Result<Expr, ParserError> {
        let loc = pair.loc();
        match pair.as_rule() {
            Rule::paren_expr => self.parse_expr(pair.try_inner_next()?),
            Rule::identifier => Ok(Expr::id(pair.as_str(), loc)),
            Rule::this_expr => Ok(Expr::This { loc }),
            Rule::call => self.parse_call(pair),
            Rule::record_expr => {
                let elems = pair
                    .into_inner()
                    .map(|p| {
                        let loc = p.loc();
                        match p.as_rule() {
                            Rule::spread => Ok(RecordElem::Spread {
                                expr: self.parse_expr(p.try_inner_next()?)?,
                                loc,
                            }),
                            Rule::record_ident => Ok(RecordElem::Identifier {
                                name: p.as_str().to_string(),
                                loc,
                            }),
                            _ => {
                                let mut inner = p.into_inner();
                                let name = unquote(&inner.try_next()?)?;
                                let value = self.parse_expr(inner.try_next()?)?;
                                Ok(RecordElem::Field { name, value, loc })
                            }
                        }
                    })
                    .collect::<Result<_, ParserError>>()?;
                Ok(Expr::Record { elems, loc })
            }
            Rule::array_expr => Ok(Expr::Array {
                elems: self.parse_vector_elems(pair)?,
                loc,
            }),
            Rule::set_expr => Ok(Expr::Set {
                elems: self.parse_vector_elems(pair)?,
                loc,
            }),
            Rule::map_expr => {
                let entries = pair
                    .into_inner()
                    .map(|p| {
                        let mut inner = p.into_inner();
                        Ok(EntryExpr {
                            key: self.parse_expr(inner.try_next()?)?,
                            value: self.parse_expr(inner.try_next()?)?,
                        })
                    })
                    .collect::<Result<_, ParserError>>()?;
                Ok(Expr::Map { entries, loc })
            }
            Rule::type_value => Ok(Expr::TypeValue {
                value: self.parse_zed_type(pair.try_inner_next()?)?,
                loc,
            }),
            Rule::over_expr => {
                let mut inner = pair.into_inner();
                let exprs = self.parse_expr_list(inner.try_next()?)?;
                let locals = match inner.next_if(Rule::over_locals) {
                    Some(p) => self.parse_locals(p)?,
                    None => Vec::new(),
                };
                let body = self.parse_seq(inner.try_next()?)?;
                Ok(Expr::Over {
                    exprs,
                    locals,
                    body,
                    loc,
                })
            }
            Rule::case_expr => {
                let mut whens = Vec::new();
                let mut else_ = None;
                for p in pair.into_inner() {
                    match p.as_rule() {
                        Rule::case_when => {
                            let mut inner = p.into_inner();
                            let cond = self.parse_expr(inner.try_next()?)?;
                            let then = self.parse_expr(inner.try_next()?)?;
                            whens.push((cond, then));
                        }
                        _ => else_ = Some(self.parse_expr(p.try_inner_next()?)?),
                    }
                }
                // CASE lowers to a chain of conditionals ending in ELSE or null.
                let mut out = else_.unwrap_or_else(|| Expr::primitive("null", "", loc));
                for (cond, then) in whens.into_iter().rev() {
                    out = Expr::Conditional {
                        cond: Box::new(cond),
                        then: Box::new(then),
                        else_: Box::new(out),
                        loc,
                    };
                }
                Ok(out)
            }
            Rule::fstring => {
                let elems = pair
                    .into_inner()
                    .map(|p| match p.as_rule() {
                        Rule::fstring_expr => Ok(FStringElem::Expr {
                            expr: self.parse_expr(p.try_inner_next()?)?,
                        }),
                        _ => Ok(FStringElem::Text {
                            text: unescape_fstring(&p)?,
                        }),
                    })
                    .collect::<Result<_, ParserError>>()?;
                Ok(Expr::FString { elems, loc })
            }
            Rule::time_lit => Ok(Expr::primitive("time", pair.as_str(), loc)),
            Rule::duration_lit => Ok(Expr::primitive("duration", pair.as_str(), loc)),
            Rule::net_lit => Ok(Expr::primitive("net", pair.as_str(), loc)),
            Rule::ip_lit => {
                let text = pair.as_str();
                if text.parse::<std::net::IpAddr>().is_err() {
                    return Err(ParserError::at(format!("invalid IP address {text:?}"), loc));
                }
                Ok(Expr::primitive("ip", text, loc))
            }
            Rule::bytes_lit => Ok(Expr::primitive("bytes", pair.as_str(), loc)),
            Rule::float_lit => Ok(Expr::primitive("float64", pair.as_str(), loc)),
            Rule::int_lit => {
                let ty = classify(pair.as_str()).unwrap_or(Primitive::Int64);
                Ok(Expr::primitive(ty.name(), pair.as_str(), loc))
            }
            Rule::bool_lit => Ok(Expr::primitive("bool", pair.as_str(), loc)),
            Rule::regexp => Ok(Expr::Regexp {
                pattern: regexp_body(pair.as_str()),
                loc,
            }),
            Rule::null_lit => Ok(Expr::primitive("null", "", loc)),
            Rule::string_lit => Ok(Expr::string(unquote(&pair)?, loc)),
            other => Err(ParserError::at(
                format!("Unexpected rule in parse_primary: {other:?}"),
                loc,
            )),
        }
    }

    fn parse_vector_elems(&self, pair: Pair<Rule>) -> Result<Vec<VectorElem>, ParserError> {
        pair.into_inner()
            .map(|p| match p.as_rule() {
                Rule::spread => Ok(VectorElem::Spread {
                    loc: p.loc(),
                    expr: self.parse_expr(p.try_inner_next()?)?,
                }),
                _ => Ok(VectorElem::Value {
                    expr: self.parse_expr(p)?,
                }),
            })
            .collect()
    }

    /// Parses a call. `cast(e, <T>)` and calls named after a primitive type
    /// become casts; `count(*)` drops its star.
    fn parse_call(&self, pair: Pair<Rule>) -> Result<Expr, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let name = inner.try_next()?.as_str().to_string();
        let mut args = Vec::new();
        if let Some(p) = inner.next_if(Rule::call_args) {
            for a in p.into_inner() {
                if a.as_rule() != Rule::star_arg {
                    args.push(self.parse_expr(a)?);
                }
            }
        }
        let where_ = match inner.next() {
            Some(w) => Some(Box::new(self.parse_expr(w.try_inner_next()?)?)),
            None => None,
        };
        if where_.is_none() {
            if name == "cast" && args.len() == 2 {
                if let Some(Expr::TypeValue { value, .. }) = args.get(1) {
                    let ty = value.clone();
                    let expr = args.swap_remove(0);
                    return Ok(Expr::Cast {
                        expr: Box::new(expr),
                        ty,
                        loc,
                    });
                }
            }
            if args.len() == 1 && name != "error" && Primitive::from_name(&name).is_some() {
                let expr = args.swap_remove(0);
                return Ok(Expr::Cast {
                    expr: Box::new(expr),
                    ty: zed::Type::primitive(name),
                    loc,
                });
            }
        }
        Ok(Expr::Call {
            name,
            args,
            where_,
            loc,
        })
    }

    /// Parses a search expression. With `terms` set, bare identifiers and
    /// literals become search terms matched against every field.
    pub(super) fn parse_search_expr(&self, pair: Pair<Rule>, terms: bool) -> Result<Expr, ParserError> {
        let loc = pair.loc();
        match pair.as_rule() {
            Rule::search_expr => {
                let mut inner = pair.into_inner();
                let mut lhs = self.parse_search_expr(inner.try_next()?, terms)?;
                for p in inner {
                    lhs = Expr::binary("or", lhs, self.parse_search_expr(p, terms)?);
                }
                Ok(lhs)
            }
            Rule::search_and => {
                let mut inner = pair.into_inner();
                let mut lhs = self.parse_search_expr(inner.try_next()?, terms)?;
                for p in inner {
                    lhs = Expr::binary("and", lhs, self.parse_search_expr(p, terms)?);
                }
                Ok(lhs)
            }
            Rule::search_factor => {
                let mut inner = pair.into_inner();
                let first = inner.try_next()?;
                match first.as_rule() {
                    Rule::not_op => Ok(Expr::Unary {
                        op: "!".to_string(),
                        operand: Box::new(self.parse_search_expr(inner.try_next()?, terms)?),
                        loc,
                    }),
                    _ => self.parse_search_expr(first, terms),
                }
            }
            Rule::match_star => Ok(Expr::primitive("bool", "true", loc)),
            Rule::regexp => Ok(Expr::Regexp {
                pattern: regexp_body(pair.as_str()),
                loc,
            }),
            Rule::glob => Ok(Expr::Glob {
                pattern: pair.as_str().to_string(),
                loc,
            }),
            Rule::comparison => {
                // The pair also spans whitespace skipped while looking for an operator.
                let text = pair.as_str().trim_end().to_string();
                let e = self.parse_expr(pair)?;
                match &e {
                    Expr::Id { .. } if terms => Ok(Expr::Term {
                        text,
                        value: Box::new(Expr::string(e_name(&e), loc)),
                        loc,
                    }),
                    Expr::Primitive { ty, .. } if terms && ty != "bool" => Ok(Expr::Term {
                        text,
                        value: Box::new(e),
                        loc,
                    }),
                    _ => Ok(e),
                }
            }
            other => Err(ParserError::at(
                format!("Unexpected rule in parse_search_expr: {other:?}"),
                loc,
            )),
        }
    }
}

fn e_name(e: &Expr) -> String {
    match e {
        Expr::Id { name, .. } => name.clone(),
        _ => String::new(),
    }
}

/// Canonical spelling of a comparison operator.
fn comparator(op: &str) -> String {
    match op {
        "=" => "==".to_string(),
        other => other.to_lowercase(),
    }
}

/// Folds a leading minus into numeric and duration literals.
fn negate(e: Expr, loc: Loc) -> Expr {
    match e {
        Expr::Primitive { ty, text, .. }
            if matches!(ty.as_str(), "int64" | "uint64" | "float64" | "duration")
                && !text.starts_with('-') =>
        {
            let text = format!("-{text}");
            let ty = match ty.as_str() {
                "duration" => ty,
                _ => classify(&text).map(|p| p.name().to_string()).unwrap_or(ty),
            };
            Expr::Primitive { ty, text, loc }
        }
        e => Expr::Unary {
            op: "-".to_string(),
            operand: Box::new(e),
            loc,
        },
    }
}

fn unescape_fstring(pair: &Pair<Rule>) -> Result<String, ParserError> {
    let quoted = format!("\"{}\"", pair.as_str().replace("\\{", "{"));
    Lexer::new(quoted.as_bytes())
        .scan_string()
        .map_err(|e| ParserError::at(e.to_string(), pair.loc()))
}
