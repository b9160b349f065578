use crate::zedc::{
    ast::{FromElem, Op, Order, PoolName, PoolSpec, Source, SourceArgs},
    parser::{
        ParserError, Rule, ZedParser,
        location::HasLoc,
        utils::{PairTools, PairsTools, regexp_body, unquote},
    },
};
use pest::iterators::Pair;

impl ZedParser {
    /// Parses `from`, `file`, `get` and `pool` into a single `From` operator.
    pub(super) fn parse_from(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        let rule = pair.as_rule();
        let elems = match rule {
            Rule::from_op => pair
                .into_inner()
                .map(|p| self.parse_from_elem(p))
                .collect::<Result<_, _>>()?,
            Rule::file_op | Rule::get_op | Rule::pool_op => {
                let mut inner = pair.into_inner();
                let target = inner.try_next()?;
                let args = self.parse_source_args(inner.try_next()?)?;
                let src_loc = target.loc();
                let source = match (rule, target.as_rule()) {
                    (Rule::pool_op, _) => Source::Pool {
                        spec: self.parse_pool_spec(target)?,
                        loc: src_loc,
                    },
                    (Rule::file_op, _) => Source::File {
                        path: self.parse_path(target)?,
                        loc: src_loc,
                    },
                    (_, Rule::url) => Source::Http {
                        url: target.as_str().to_string(),
                        loc: src_loc,
                    },
                    _ => Source::Http {
                        url: self.parse_path(target)?,
                        loc: src_loc,
                    },
                };
                vec![FromElem {
                    source,
                    args,
                    body: None,
                    loc,
                }]
            }
            other => {
                return Err(ParserError::at(
                    format!("Unexpected rule in parse_from: {other:?}"),
                    loc,
                ));
            }
        };
        Ok(Op::From { elems, loc })
    }

    fn parse_from_elem(&self, pair: Pair<Rule>) -> Result<FromElem, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let target = inner.try_next()?;
        let src_loc = target.loc();
        let source = match target.as_rule() {
            Rule::url => Source::Http {
                url: target.as_str().to_string(),
                loc: src_loc,
            },
            _ => Source::Name {
                spec: self.parse_pool_spec(target)?,
                loc: src_loc,
            },
        };
        let args = self.parse_source_args(inner.try_next()?)?;
        let body = inner.next().map(|p| self.parse_seq(p)).transpose()?;
        Ok(FromElem {
            source,
            args,
            body,
            loc,
        })
    }

    fn parse_path(&self, pair: Pair<Rule>) -> Result<String, ParserError> {
        unquote(&pair.try_inner_next()?)
    }

    pub(super) fn parse_pool_spec(&self, pair: Pair<Rule>) -> Result<PoolSpec, ParserError> {
        let mut spec = PoolSpec {
            pool: None,
            commit: None,
            meta: None,
        };
        for p in pair.into_inner() {
            match p.as_rule() {
                Rule::pool_name => {
                    let name = p.try_inner_next()?;
                    spec.pool = Some(match name.as_rule() {
                        Rule::regexp => PoolName::Regexp {
                            pattern: regexp_body(name.as_str()),
                        },
                        Rule::quoted_string => PoolName::Text {
                            name: unquote(&name)?,
                        },
                        _ if name.as_str().contains(['*', '?']) => PoolName::Glob {
                            pattern: name.as_str().to_string(),
                        },
                        _ => PoolName::Text {
                            name: name.as_str().to_string(),
                        },
                    });
                }
                Rule::commit_ref => spec.commit = Some(p.try_inner_next()?.as_str().to_string()),
                Rule::meta_ref => spec.meta = Some(p.try_inner_next()?.as_str().to_string()),
                _ => {}
            }
        }
        Ok(spec)
    }

    fn parse_source_args(&self, pair: Pair<Rule>) -> Result<SourceArgs, ParserError> {
        let mut args = SourceArgs::default();
        for p in pair.into_inner() {
            let rule = p.as_rule();
            let loc = p.loc();
            let mut inner = p.into_inner();
            match rule {
                Rule::format_arg => args.format = Some(inner.try_next()?.as_str().to_string()),
                Rule::order_arg => {
                    let field = inner.try_next()?.as_str().to_string();
                    let order = match inner.next() {
                        Some(d) if d.as_str().eq_ignore_ascii_case("desc") => Order::Desc,
                        _ => Order::Asc,
                    };
                    args.order = Some((field, order));
                }
                Rule::method_arg => args.method = Some(inner.try_next()?.as_str().to_string()),
                Rule::headers_arg => args.headers = Some(self.parse_expr(inner.try_next()?)?),
                Rule::body_arg => args.body = Some(unquote(&inner.try_next()?)?),
                other => {
                    return Err(ParserError::at(
                        format!("Unexpected rule in parse_source_args: {other:?}"),
                        loc,
                    ));
                }
            }
        }
        Ok(args)
    }

    pub(super) fn parse_load(&self, pair: Pair<Rule>) -> Result<Op, ParserError> {
        let loc = pair.loc();
        let mut inner = pair.into_inner();
        let pool = inner.try_next()?.as_str().to_string();
        let branch = match inner.next_if(Rule::commit_ref) {
            Some(c) => Some(c.try_inner_next()?.as_str().to_string()),
            None => None,
        };
        let (mut author, mut message, mut meta) = (None, None, None);
        for p in inner {
            let rule = p.as_rule();
            let text = unquote(&p.try_inner_next()?)?;
            match rule {
                Rule::load_author => author = Some(text),
                Rule::load_message => message = Some(text),
                Rule::load_meta => meta = Some(text),
                _ => {}
            }
        }
        Ok(Op::Load {
            pool,
            branch,
            author,
            message,
            meta,
            loc,
        })
    }
}
