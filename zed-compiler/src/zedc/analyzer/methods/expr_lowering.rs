//! Expressions: identifier resolution, literals, calls and assignments.

use crate::zedc::{
    analyzer::{Analyzer, builtins, errors::CompileError, scope::Entry},
    ast::{self, FStringElem},
    dag::{self, Path},
    parser::location::Loc,
    zed::{Primitive, Type},
    zson::{self, Value, builder, formatter},
};
use std::collections::HashSet;

impl Analyzer<'_> {
    pub(crate) fn sem_expr(&mut self, e: &ast::Expr) -> Result<dag::Expr, CompileError> {
        match e {
            ast::Expr::Id { name, loc } => self.sem_id(name, *loc),
            ast::Expr::This { .. } => Ok(dag::Expr::this()),
            ast::Expr::Primitive { ty, text, loc } => sem_literal(ty, text, *loc),
            ast::Expr::TypeValue { value, loc } => self.sem_type_value(value, *loc),
            ast::Expr::Unary { op, operand, .. } => Ok(dag::Expr::UnaryExpr {
                op: op.clone(),
                operand: Box::new(self.sem_expr(operand)?),
            }),
            ast::Expr::Binary { op, lhs, rhs, loc } => self.sem_binary(op, lhs, rhs, *loc),
            ast::Expr::Dot { lhs, rhs, .. } => Ok(match self.sem_expr(lhs)? {
                dag::Expr::This { mut path } => {
                    path.push(rhs.clone());
                    dag::Expr::This { path }
                }
                lhs => dag::Expr::Dot {
                    lhs: Box::new(lhs),
                    rhs: rhs.clone(),
                },
            }),
            ast::Expr::Index { expr, index, .. } => {
                let container = self.sem_expr(expr)?;
                if let (dag::Expr::This { path }, ast::Expr::Primitive { ty, text, .. }) =
                    (&container, index.as_ref())
                {
                    if ty == "string" {
                        let mut path = path.clone();
                        path.push(text.clone());
                        return Ok(dag::Expr::This { path });
                    }
                }
                Ok(dag::Expr::IndexExpr {
                    expr: Box::new(container),
                    index: Box::new(self.sem_expr(index)?),
                })
            }
            ast::Expr::Slice { expr, from, to, .. } => Ok(dag::Expr::SliceExpr {
                expr: Box::new(self.sem_expr(expr)?),
                from: self.sem_opt(from.as_deref())?.map(Box::new),
                to: self.sem_opt(to.as_deref())?.map(Box::new),
            }),
            ast::Expr::Conditional {
                cond, then, else_, ..
            } => Ok(dag::Expr::Conditional {
                cond: Box::new(self.sem_expr(cond)?),
                then: Box::new(self.sem_expr(then)?),
                else_: Box::new(self.sem_expr(else_)?),
            }),
            ast::Expr::Call {
                name,
                args,
                where_,
                loc,
            } => self.sem_call(name, args, where_.as_deref(), *loc),
            ast::Expr::Cast { expr, ty, loc } => {
                let e = self.sem_expr(expr)?;
                let ty = self.sem_type_value(ty, *loc)?;
                Ok(dag::Expr::call("cast", vec![e, ty]))
            }
            ast::Expr::Record { elems, loc } => self.sem_record(elems, *loc),
            ast::Expr::Array { elems, .. } => Ok(dag::Expr::ArrayExpr {
                elems: self.sem_vector(elems)?,
            }),
            ast::Expr::Set { elems, .. } => Ok(dag::Expr::SetExpr {
                elems: self.sem_vector(elems)?,
            }),
            ast::Expr::Map { entries, .. } => {
                let entries = entries
                    .iter()
                    .map(|e| {
                        Ok(dag::Entry {
                            key: self.sem_expr(&e.key)?,
                            value: self.sem_expr(&e.value)?,
                        })
                    })
                    .collect::<Result<_, CompileError>>()?;
                Ok(dag::Expr::MapExpr { entries })
            }
            ast::Expr::Regexp { pattern, loc } => {
                check_regexp(pattern, *loc)?;
                Ok(dag::Expr::RegexpSearch {
                    pattern: pattern.clone(),
                    expr: Box::new(dag::Expr::this()),
                })
            }
            ast::Expr::Glob { pattern, .. } => Ok(dag::Expr::RegexpSearch {
                pattern: reglob(pattern),
                expr: Box::new(dag::Expr::this()),
            }),
            ast::Expr::Term { text, value, loc } => {
                let value = match self.sem_expr(value)? {
                    dag::Expr::Literal { value } => value,
                    _ => {
                        return Err(CompileError::type_error(
                            format!("search term {text:?} is not a literal"),
                            *loc,
                        ));
                    }
                };
                Ok(dag::Expr::Search {
                    text: text.clone(),
                    value,
                    expr: Box::new(dag::Expr::this()),
                })
            }
            ast::Expr::FString { elems, .. } => self.sem_fstring(elems),
            ast::Expr::Over {
                exprs,
                locals,
                body,
                ..
            } => {
                let exprs = self.sem_exprs(exprs)?;
                self.scope.enter();
                let out = self.sem_over_body(locals, body);
                self.scope.exit();
                let (defs, body) = out?;
                Ok(dag::Expr::OverExpr { defs, exprs, body })
            }
        }
    }

    pub(crate) fn sem_exprs(&mut self, exprs: &[ast::Expr]) -> Result<Vec<dag::Expr>, CompileError> {
        exprs.iter().map(|e| self.sem_expr(e)).collect()
    }

    fn sem_opt(&mut self, e: Option<&ast::Expr>) -> Result<Option<dag::Expr>, CompileError> {
        e.map(|e| self.sem_expr(e)).transpose()
    }

    /// Locals and body of a lateral query, analyzed in a fresh frame.
    pub(crate) fn sem_over_body(
        &mut self,
        locals: &[ast::Def],
        body: &ast::Seq,
    ) -> Result<(Vec<dag::Def>, dag::Seq), CompileError> {
        let defs = self.sem_vars(locals)?;
        let body = self.sem_seq(body)?;
        Ok((defs, body))
    }

    fn sem_id(&mut self, name: &str, loc: Loc) -> Result<dag::Expr, CompileError> {
        match self.scope.lookup(name) {
            Some(Entry::Const(e) | Entry::Var(e)) => Ok(e),
            Some(Entry::Func(_)) => Err(CompileError::name(
                format!("function {name:?} referenced but not called"),
                loc,
            )),
            Some(Entry::Op(_)) => Err(CompileError::name(
                format!("operator {name:?} used as an expression"),
                loc,
            )),
            None if name == "this" => Ok(dag::Expr::this()),
            None => Ok(dag::Expr::path([name])),
        }
    }

    /// A type value. A bare name that is not yet defined is resolved at run
    /// time through `typename`.
    pub(crate) fn sem_type_value(
        &mut self,
        ty: &ast::zed::Type,
        loc: Loc,
    ) -> Result<dag::Expr, CompileError> {
        match (zson::Analyzer::new(self.zctx).convert_type(ty), ty) {
            (Ok(t), _) => Ok(type_literal(&t)),
            (Err(_), ast::zed::Type::Name { name }) => Ok(dag::Expr::call(
                "typename",
                vec![dag::Expr::literal(formatter::quote_string(name))],
            )),
            (Err(e), _) => Err(CompileError::type_error(e.to_string(), loc)),
        }
    }

    fn sem_binary(
        &mut self,
        op: &str,
        lhs: &ast::Expr,
        rhs: &ast::Expr,
        loc: Loc,
    ) -> Result<dag::Expr, CompileError> {
        if op == "~" {
            let ast::Expr::Regexp { pattern, loc: rloc } = rhs else {
                return Err(CompileError::type_error(
                    "right-hand side of ~ expression must be a regular expression",
                    loc,
                ));
            };
            check_regexp(pattern, *rloc)?;
            return Ok(dag::Expr::RegexpMatch {
                pattern: pattern.clone(),
                expr: Box::new(self.sem_expr(lhs)?),
            });
        }
        Ok(dag::Expr::binary(op, self.sem_expr(lhs)?, self.sem_expr(rhs)?))
    }

    fn sem_record(&mut self, elems: &[ast::RecordElem], loc: Loc) -> Result<dag::Expr, CompileError> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(elems.len());
        for elem in elems {
            let (name, value) = match elem {
                ast::RecordElem::Spread { expr, .. } => {
                    out.push(dag::RecordElem::Spread {
                        expr: self.sem_expr(expr)?,
                    });
                    continue;
                }
                ast::RecordElem::Field { name, value, .. } => (name.clone(), self.sem_expr(value)?),
                ast::RecordElem::Identifier { name, loc } => {
                    let mut parts = name.split('.');
                    let first = parts.next().unwrap_or_default();
                    let mut e = ast::Expr::id(first, *loc);
                    let mut last = first;
                    for part in parts {
                        e = ast::Expr::Dot {
                            lhs: Box::new(e),
                            rhs: part.to_string(),
                            loc: *loc,
                        };
                        last = part;
                    }
                    (last.to_string(), self.sem_expr(&e)?)
                }
            };
            if !seen.insert(name.clone()) {
                return Err(CompileError::name(
                    format!("record expression: duplicate field: {name:?}"),
                    loc,
                ));
            }
            out.push(dag::RecordElem::Field { name, value });
        }
        Ok(dag::Expr::RecordExpr { elems: out })
    }

    fn sem_vector(&mut self, elems: &[ast::VectorElem]) -> Result<Vec<dag::VectorElem>, CompileError> {
        elems
            .iter()
            .map(|e| match e {
                ast::VectorElem::Value { expr } => Ok(dag::VectorElem::VectorValue {
                    expr: self.sem_expr(expr)?,
                }),
                ast::VectorElem::Spread { expr, .. } => Ok(dag::VectorElem::Spread {
                    expr: self.sem_expr(expr)?,
                }),
            })
            .collect()
    }

    /// Concatenates the pieces of an f-string, casting each embedded
    /// expression to string.
    fn sem_fstring(&mut self, elems: &[FStringElem]) -> Result<dag::Expr, CompileError> {
        let mut out: Option<dag::Expr> = None;
        for elem in elems {
            let e = match elem {
                FStringElem::Text { text } => dag::Expr::literal(formatter::quote_string(text)),
                FStringElem::Expr { expr } => dag::Expr::call(
                    "cast",
                    vec![
                        self.sem_expr(expr)?,
                        type_literal(&Type::primitive(Primitive::String)),
                    ],
                ),
            };
            out = Some(match out {
                Some(acc) => dag::Expr::binary("+", acc, e),
                None => e,
            });
        }
        Ok(out.unwrap_or_else(|| dag::Expr::literal("\"\"")))
    }

    pub(crate) fn sem_call(
        &mut self,
        name: &str,
        args: &[ast::Expr],
        where_: Option<&ast::Expr>,
        loc: Loc,
    ) -> Result<dag::Expr, CompileError> {
        match self.scope.lookup(name) {
            Some(Entry::Func(n)) => {
                if where_.is_some() {
                    return Err(non_agg_where(loc));
                }
                if args.len() != n {
                    return Err(CompileError::name(
                        format!("{name}: call expects {n} argument(s)"),
                        loc,
                    ));
                }
                return Ok(dag::Expr::call(name, self.sem_exprs(args)?));
            }
            Some(Entry::Op(_)) => {
                return Err(CompileError::name(
                    format!("operator {name:?} called as a function"),
                    loc,
                ));
            }
            _ => {}
        }
        let multi_arg_fn = matches!(name, "min" | "max") && args.len() > 1;
        if builtins::is_aggregator(name) && !multi_arg_fn {
            if args.len() > 1 {
                return Err(CompileError::name(
                    format!("aggregator '{name}' called with too many arguments"),
                    loc,
                ));
            }
            if args.is_empty() && name != "count" {
                return Err(CompileError::name(
                    format!("aggregator '{name}' requires argument"),
                    loc,
                ));
            }
            let expr = self.sem_opt(args.first())?.map(Box::new);
            let where_ = self.sem_opt(where_)?.map(Box::new);
            return Ok(dag::Expr::Agg {
                name: name.to_string(),
                expr,
                where_,
            });
        }
        if where_.is_some() {
            return Err(non_agg_where(loc));
        }
        if name != "error" && args.len() == 1 {
            if let Some(p) = Primitive::from_name(name) {
                let e = self.sem_expr(&args[0])?;
                return Ok(dag::Expr::call(
                    "cast",
                    vec![e, type_literal(&Type::primitive(p))],
                ));
            }
        }
        if name == "map" {
            return self.sem_map_call(args, loc);
        }
        let Some(arity) = builtins::function(name) else {
            return Err(CompileError::name(format!("{name}: no such function"), loc));
        };
        arity.check(args.len()).map_err(|why| {
            CompileError::name(
                format!("function {name} called with wrong number of arguments: {why}"),
                loc,
            )
        })?;
        let mut exprs = self.sem_exprs(args)?;
        if builtins::is_shaper(name) && exprs.len() == 1 {
            exprs.insert(0, dag::Expr::this());
        }
        Ok(dag::Expr::call(name, exprs))
    }

    /// `map(e, f)` applies the function named `f` to each element of `e`.
    fn sem_map_call(&mut self, args: &[ast::Expr], loc: Loc) -> Result<dag::Expr, CompileError> {
        let [expr, func] = args else {
            return Err(CompileError::name(
                "function map called with wrong number of arguments",
                loc,
            ));
        };
        let ast::Expr::Id { name, loc: floc } = func else {
            return Err(CompileError::name(
                "second argument must be the identifier of a function",
                func.loc(),
            ));
        };
        let expr = self.sem_expr(expr)?;
        let inner = self.sem_call(name, &[ast::Expr::This { loc: *floc }], None, *floc)?;
        Ok(dag::Expr::MapCall {
            expr: Box::new(expr),
            inner: Box::new(inner),
        })
    }

    /// Lowers `lhs := rhs`, inferring the field name when `lhs` is absent.
    pub(crate) fn sem_assignment(&mut self, a: &ast::Assignment) -> Result<dag::Assignment, CompileError> {
        let rhs = self.sem_expr(&a.rhs)?;
        let lhs = match &a.lhs {
            Some(lhs) => match self.sem_expr(lhs)? {
                dag::Expr::This { path } if path.is_empty() => {
                    return Err(CompileError::shape("cannot assign to 'this'", lhs.loc()));
                }
                e @ dag::Expr::This { .. } => e,
                _ => {
                    return Err(CompileError::shape(
                        "illegal left-hand side of assignment",
                        lhs.loc(),
                    ));
                }
            },
            None => dag::Expr::This {
                path: derive_lhs_path(&rhs).map_err(|msg| CompileError::shape(msg, a.loc))?,
            },
        };
        Ok(dag::Assignment { lhs, rhs })
    }

    pub(crate) fn sem_assignments(
        &mut self,
        args: &[ast::Assignment],
    ) -> Result<Vec<dag::Assignment>, CompileError> {
        args.iter().map(|a| self.sem_assignment(a)).collect()
    }

    /// An expression that must name a field below `this`.
    pub(crate) fn sem_field(&mut self, e: &ast::Expr) -> Result<dag::Expr, CompileError> {
        match self.sem_expr(e)? {
            dag::Expr::This { path } if path.is_empty() => Err(CompileError::shape(
                "cannot use 'this' as a field reference",
                e.loc(),
            )),
            f @ dag::Expr::This { .. } => Ok(f),
            _ => Err(CompileError::shape("invalid expression used as a field", e.loc())),
        }
    }
}

fn non_agg_where(loc: Loc) -> CompileError {
    CompileError::name("'where' clause on non-aggregation function", loc)
}

fn check_regexp(pattern: &str, loc: Loc) -> Result<(), CompileError> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| CompileError::parse(format!("invalid regular expression: {e}"), loc))
}

/// Canonical ZSON for a primitive literal as the parser classified it.
fn sem_literal(ty: &str, text: &str, loc: Loc) -> Result<dag::Expr, CompileError> {
    let Some(p) = Primitive::from_name(ty) else {
        return Err(CompileError::type_error(
            format!("unknown primitive type {ty:?}"),
            loc,
        ));
    };
    match p {
        Primitive::Null => return Ok(dag::Expr::literal("null")),
        Primitive::String => return Ok(dag::Expr::literal(formatter::quote_string(text))),
        _ => {}
    }
    builder::parse_primitive(p, text).map_err(|e| CompileError::type_error(e.to_string(), loc))?;
    Ok(dag::Expr::literal(formatter::format_value(&Value::Primitive {
        ty: Type::primitive(p),
        text: text.to_string(),
    })))
}

pub(crate) fn type_literal(t: &Type) -> dag::Expr {
    dag::Expr::literal(format!("<{}>", formatter::format_type(t)))
}

/// The field an assignment without a left-hand side writes to.
pub(crate) fn derive_lhs_path(rhs: &dag::Expr) -> Result<Path, &'static str> {
    match rhs {
        dag::Expr::Agg { name, .. } => Ok(vec![name.clone()]),
        dag::Expr::Call { name, args } if name == "quiet" => match args.first() {
            Some(dag::Expr::This { path }) if !path.is_empty() => Ok(path.clone()),
            _ => Ok(vec![name.clone()]),
        },
        dag::Expr::Call { name, .. } => Ok(vec![name.clone()]),
        dag::Expr::This { path } if !path.is_empty() => Ok(path.clone()),
        dag::Expr::Var { name, .. } => Ok(vec![name.clone()]),
        _ => Err("cannot infer field from expression"),
    }
}

/// True when `e` evaluates to a bool whenever it evaluates at all, so a bare
/// expression operator filters rather than yields.
pub(crate) fn is_bool(e: &dag::Expr) -> bool {
    match e {
        dag::Expr::Literal { value } => value == "true" || value == "false",
        dag::Expr::UnaryExpr { operand, .. } => is_bool(operand),
        dag::Expr::BinaryExpr { op, .. } => matches!(
            op.as_str(),
            "and" | "or" | "in" | "==" | "!=" | "<" | "<=" | ">" | ">="
        ),
        dag::Expr::Conditional { then, else_, .. } => is_bool(then) && is_bool(else_),
        dag::Expr::Call { name, args } if name == "cast" => {
            matches!(args.get(1), Some(dag::Expr::Literal { value }) if value == "<bool>")
        }
        dag::Expr::Call { name, .. } => builtins::has_bool_result(name),
        dag::Expr::Search { .. } | dag::Expr::RegexpMatch { .. } | dag::Expr::RegexpSearch { .. } => {
            true
        }
        _ => false,
    }
}

/// Translates a glob into an anchored regular expression.
pub(crate) fn reglob(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    out.push('^');
    let mut lit = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut lit))),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::{
        compiler::source::NoLake,
        parser::ZedParser,
        zed::Context,
    };
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    fn expr(src: &str) -> Result<dag::Expr, CompileError> {
        let zctx = Context::new();
        let e = ZedParser::parse_expression(src).unwrap();
        Analyzer::new(&zctx, &NoLake, None, CancellationToken::new()).sem_expr(&e)
    }

    #[test]
    fn paths_collapse_onto_this() {
        assert_eq!(expr("a.b[\"c\"]").unwrap(), dag::Expr::path(["a", "b", "c"]));
        assert_eq!(expr("this").unwrap(), dag::Expr::this());
    }

    #[test]
    fn literals_are_canonical() {
        assert_eq!(expr("\"hi\"").unwrap(), dag::Expr::literal("\"hi\""));
        assert_eq!(expr("null").unwrap(), dag::Expr::literal("null"));
        assert_eq!(expr("1h").unwrap(), dag::Expr::literal("1h"));
        assert_eq!(expr("<int64>").unwrap(), dag::Expr::literal("<int64>"));
    }

    #[test]
    fn casts_lower_to_calls() {
        assert_eq!(
            expr("int64(x)").unwrap(),
            dag::Expr::call("cast", vec![dag::Expr::path(["x"]), dag::Expr::literal("<int64>")])
        );
    }

    #[test]
    fn regexp_match_needs_a_regexp() {
        assert!(matches!(
            expr("a ~ /fo+/").unwrap(),
            dag::Expr::RegexpMatch { ref pattern, .. } if pattern == "fo+"
        ));
        assert_eq!(
            expr("a ~ b").unwrap_err().to_string(),
            "right-hand side of ~ expression must be a regular expression"
        );
    }

    #[test]
    fn call_checks() {
        assert_eq!(expr("nope(1)").unwrap_err().to_string(), "nope: no such function");
        assert_eq!(
            expr("len(1, 2)").unwrap_err().to_string(),
            "function len called with wrong number of arguments: too many arguments"
        );
        assert_eq!(
            expr("sum()").unwrap_err().to_string(),
            "aggregator 'sum' requires argument"
        );
        assert_eq!(
            expr("len(x) where y > 1").unwrap_err().to_string(),
            "'where' clause on non-aggregation function"
        );
        assert!(matches!(expr("max(a, b)").unwrap(), dag::Expr::Call { .. }));
        assert!(matches!(expr("max(a)").unwrap(), dag::Expr::Agg { .. }));
    }

    #[test]
    fn shapers_default_to_this() {
        let e = expr("fill(<{a:int64}>)").unwrap();
        let dag::Expr::Call { args, .. } = e else {
            panic!("expected call");
        };
        assert_eq!(args[0], dag::Expr::this());
    }

    #[test]
    fn duplicate_record_fields() {
        assert_eq!(
            expr("{a:1, a:2}").unwrap_err().to_string(),
            "record expression: duplicate field: \"a\""
        );
        let e = expr("{x, z:1}").unwrap();
        assert!(matches!(e, dag::Expr::RecordExpr { ref elems } if matches!(&elems[0], dag::RecordElem::Field { name, .. } if name == "x")));
    }

    #[test]
    fn fstrings_concatenate() {
        let e = expr("f\"a{x}\"").unwrap();
        assert!(matches!(e, dag::Expr::BinaryExpr { ref op, .. } if op == "+"));
        assert_eq!(expr("f\"\"").unwrap(), dag::Expr::literal("\"\""));
    }

    #[test]
    fn lhs_inference() {
        assert_eq!(
            derive_lhs_path(&dag::Expr::Agg {
                name: "count".into(),
                expr: None,
                where_: None
            }),
            Ok(vec!["count".to_string()])
        );
        assert_eq!(
            derive_lhs_path(&dag::Expr::literal("1")),
            Err("cannot infer field from expression")
        );
    }

    #[test]
    fn bool_detection() {
        assert!(is_bool(&expr("x > 1").unwrap()));
        assert!(is_bool(&expr("has(x)").unwrap()));
        assert!(!is_bool(&expr("x + 1").unwrap()));
        assert!(is_bool(&expr("bool(x)").unwrap()));
    }

    #[test]
    fn globs() {
        assert_eq!(reglob("a*.b?"), "^a.*\\.b.$");
    }
}
