//! Compile-time evaluation of constant expressions.
//!
//! Used for operator arguments that must be known when the plan is built
//! (`head`, `tail`, `top`, SQL `LIMIT`) and to fold `const` declarations.

use crate::zedc::{
    dag::{Expr, RecordElem, VectorElem},
    zed::{
        Context, Primitive, Type,
        types::{is_float, is_signed, is_unsigned},
    },
    zson::{self, Analyzer, Value, builder, formatter},
};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// The expression depends on input data.
    #[error("{0}")]
    NotConstant(String),
    #[error("{0}")]
    Failed(String),
}

/// A constant produced by [`eval`].
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    String(String),
    Duration(i64),
    Time(i64),
    /// Any other value, kept as canonical ZSON.
    Other(String),
}

impl Const {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Const::Int(i) => Some(*i),
            Const::Uint(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Const::String(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical ZSON text of the constant.
    pub fn to_zson(&self) -> String {
        let prim = |p: Primitive, text: String| {
            formatter::format_value(&Value::Primitive {
                ty: Type::primitive(p),
                text,
            })
        };
        match self {
            Const::Null => "null".to_string(),
            Const::Bool(b) => b.to_string(),
            Const::Int(i) => prim(Primitive::Int64, i.to_string()),
            Const::Uint(u) => prim(Primitive::Uint64, u.to_string()),
            Const::Float(f) => prim(Primitive::Float64, format_float(*f)),
            Const::String(s) => formatter::quote_string(s),
            Const::Duration(ns) => builder::format_duration(*ns),
            Const::Time(ns) => builder::format_time(*ns),
            Const::Other(text) => text.clone(),
        }
    }

    pub fn to_expr(&self) -> Expr {
        Expr::literal(self.to_zson())
    }
}

impl std::fmt::Display for Const {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_zson())
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        format!("{f:?}")
    }
}

fn failed(msg: impl Into<String>) -> EvalError {
    EvalError::Failed(msg.into())
}

/// Evaluates `e`, which must not reference input data.
pub fn eval(zctx: &Context, e: &Expr) -> Result<Const, EvalError> {
    match e {
        Expr::Literal { value } => literal(zctx, value),
        Expr::UnaryExpr { op, operand } => unary(op, eval(zctx, operand)?),
        Expr::BinaryExpr { op, lhs, rhs } => match op.as_str() {
            "and" | "or" => {
                let l = truth(&eval(zctx, lhs)?)?;
                if (op == "and" && !l) || (op == "or" && l) {
                    return Ok(Const::Bool(l));
                }
                Ok(Const::Bool(truth(&eval(zctx, rhs)?)?))
            }
            _ => binary(op, eval(zctx, lhs)?, eval(zctx, rhs)?),
        },
        Expr::Conditional { cond, then, else_ } => {
            if truth(&eval(zctx, cond)?)? {
                eval(zctx, then)
            } else {
                eval(zctx, else_)
            }
        }
        Expr::Call { name, args } if name == "cast" && args.len() == 2 => {
            let v = eval(zctx, &args[0])?;
            match &args[1] {
                Expr::Literal { value } => cast(v, value),
                _ => Err(EvalError::NotConstant("cast to a non-constant type".into())),
            }
        }
        Expr::This { .. } => Err(EvalError::NotConstant(
            "cannot refer to 'this' or its fields in a constant expression".into(),
        )),
        Expr::Var { name, .. } => Err(EvalError::NotConstant(format!(
            "cannot refer to variable {name} in a constant expression"
        ))),
        Expr::Agg { name, .. } => Err(EvalError::NotConstant(format!(
            "aggregator {name} is not a constant expression"
        ))),
        _ => Err(EvalError::NotConstant("expression is not constant".into())),
    }
}

fn literal(zctx: &Context, text: &str) -> Result<Const, EvalError> {
    let ast = zson::parse_value_str(text).map_err(|e| failed(e.to_string()))?;
    let v = Analyzer::new(zctx)
        .convert_value(&ast)
        .map_err(|e| failed(e.to_string()))?;
    let Value::Primitive { ty, text: body } = &v else {
        return Ok(match v {
            Value::Null { .. } => Const::Null,
            _ => Const::Other(text.to_string()),
        });
    };
    let bad = |e: zson::ZsonError| failed(e.to_string());
    let c = match ty.as_primitive() {
        Some(Primitive::Bool) => Const::Bool(body == "true"),
        Some(Primitive::String) => Const::String(body.clone()),
        Some(Primitive::Duration) => Const::Duration(builder::parse_duration(body).map_err(bad)?),
        Some(Primitive::Time) => Const::Time(builder::parse_time(body).map_err(bad)?),
        Some(p) if is_signed(p.id()) => {
            Const::Int(body.parse().map_err(|_| failed("bad integer"))?)
        }
        Some(p) if is_unsigned(p.id()) => {
            Const::Uint(body.parse().map_err(|_| failed("bad integer"))?)
        }
        Some(p) if is_float(p.id()) => Const::Float(
            body.trim_start_matches('+')
                .replace("Inf", "inf")
                .parse()
                .map_err(|_| failed("bad float"))?,
        ),
        _ => Const::Other(text.to_string()),
    };
    Ok(c)
}

fn truth(c: &Const) -> Result<bool, EvalError> {
    match c {
        Const::Bool(b) => Ok(*b),
        other => Err(failed(format!("not a boolean: {other}"))),
    }
}

fn unary(op: &str, v: Const) -> Result<Const, EvalError> {
    match (op, v) {
        ("!", Const::Bool(b)) => Ok(Const::Bool(!b)),
        ("-", Const::Int(i)) => i.checked_neg().map(Const::Int).ok_or_else(|| failed("integer overflow")),
        ("-", Const::Uint(u)) => i64::try_from(u)
            .map(|i| Const::Int(-i))
            .map_err(|_| failed("integer overflow")),
        ("-", Const::Float(f)) => Ok(Const::Float(-f)),
        ("-", Const::Duration(d)) => d
            .checked_neg()
            .map(Const::Duration)
            .ok_or_else(|| failed("duration overflow")),
        ("-" | "+" | "!", Const::Null) => Ok(Const::Null),
        (op, v) => Err(failed(format!("type mismatch: {op} applied to {v}"))),
    }
}

/// Promotes mixed integer and float operands to a common representation.
enum Num {
    I(i64, i64),
    U(u64, u64),
    F(f64, f64),
}

fn numbers(l: &Const, r: &Const) -> Option<Num> {
    Some(match (l, r) {
        (Const::Int(a), Const::Int(b)) => Num::I(*a, *b),
        (Const::Uint(a), Const::Uint(b)) => Num::U(*a, *b),
        (Const::Int(a), Const::Uint(b)) => Num::I(*a, i64::try_from(*b).ok()?),
        (Const::Uint(a), Const::Int(b)) => Num::I(i64::try_from(*a).ok()?, *b),
        (Const::Float(a), b) => Num::F(*a, as_float(b)?),
        (a, Const::Float(b)) => Num::F(as_float(a)?, *b),
        _ => return None,
    })
}

fn as_float(c: &Const) -> Option<f64> {
    match c {
        Const::Int(i) => Some(*i as f64),
        Const::Uint(u) => Some(*u as f64),
        Const::Float(f) => Some(*f),
        _ => None,
    }
}

fn binary(op: &str, l: Const, r: Const) -> Result<Const, EvalError> {
    if matches!(op, "==" | "!=" | "<" | "<=" | ">" | ">=") {
        return compare(op, &l, &r);
    }
    if matches!(l, Const::Null) || matches!(r, Const::Null) {
        return Ok(Const::Null);
    }
    let overflow = || failed("integer overflow");
    let divzero = || failed("divide by zero");
    match (&l, &r) {
        (Const::String(a), Const::String(b)) if op == "+" => {
            return Ok(Const::String(format!("{a}{b}")));
        }
        (Const::Duration(a), Const::Duration(b)) => {
            let d = match op {
                "+" => a.checked_add(*b),
                "-" => a.checked_sub(*b),
                _ => None,
            };
            return d.map(Const::Duration).ok_or_else(|| mismatch(op, &l, &r));
        }
        (Const::Duration(d), Const::Int(n)) | (Const::Int(n), Const::Duration(d)) if op == "*" => {
            return d.checked_mul(*n).map(Const::Duration).ok_or_else(overflow);
        }
        (Const::Duration(d), Const::Int(n)) if op == "/" => {
            return d.checked_div(*n).map(Const::Duration).ok_or_else(divzero);
        }
        (Const::Time(t), Const::Duration(d)) => {
            let t = match op {
                "+" => t.checked_add(*d),
                "-" => t.checked_sub(*d),
                _ => return Err(mismatch(op, &l, &r)),
            };
            return t.map(Const::Time).ok_or_else(overflow);
        }
        (Const::Time(a), Const::Time(b)) if op == "-" => {
            return a.checked_sub(*b).map(Const::Duration).ok_or_else(overflow);
        }
        _ => {}
    }
    let Some(num) = numbers(&l, &r) else {
        return Err(mismatch(op, &l, &r));
    };
    match num {
        Num::I(a, b) => {
            let v = match op {
                "+" => a.checked_add(b).ok_or_else(overflow)?,
                "-" => a.checked_sub(b).ok_or_else(overflow)?,
                "*" => a.checked_mul(b).ok_or_else(overflow)?,
                "/" => a.checked_div(b).ok_or_else(divzero)?,
                "%" => a.checked_rem(b).ok_or_else(divzero)?,
                _ => return Err(mismatch(op, &l, &r)),
            };
            Ok(Const::Int(v))
        }
        Num::U(a, b) => {
            let v = match op {
                "+" => a.checked_add(b).ok_or_else(overflow)?,
                "-" => a.checked_sub(b).ok_or_else(overflow)?,
                "*" => a.checked_mul(b).ok_or_else(overflow)?,
                "/" => a.checked_div(b).ok_or_else(divzero)?,
                "%" => a.checked_rem(b).ok_or_else(divzero)?,
                _ => return Err(mismatch(op, &l, &r)),
            };
            Ok(Const::Uint(v))
        }
        Num::F(a, b) => {
            let v = match op {
                "+" => a + b,
                "-" => a - b,
                "*" => a * b,
                "/" => a / b,
                "%" => a % b,
                _ => return Err(mismatch(op, &l, &r)),
            };
            Ok(Const::Float(v))
        }
    }
}

fn mismatch(op: &str, l: &Const, r: &Const) -> EvalError {
    failed(format!("type mismatch: {l} {op} {r}"))
}

fn compare(op: &str, l: &Const, r: &Const) -> Result<Const, EvalError> {
    let ord = match (l, r) {
        (Const::Null, _) | (_, Const::Null) => return Ok(Const::Bool(op == "!=" && l != r)),
        (Const::Bool(a), Const::Bool(b)) => a.partial_cmp(b),
        (Const::String(a), Const::String(b)) => a.partial_cmp(b),
        (Const::Duration(a), Const::Duration(b)) | (Const::Time(a), Const::Time(b)) => {
            a.partial_cmp(b)
        }
        (Const::Other(a), Const::Other(b)) => match op {
            "==" => return Ok(Const::Bool(a == b)),
            "!=" => return Ok(Const::Bool(a != b)),
            _ => return Err(mismatch(op, l, r)),
        },
        _ => match numbers(l, r) {
            Some(Num::I(a, b)) => a.partial_cmp(&b),
            Some(Num::U(a, b)) => a.partial_cmp(&b),
            Some(Num::F(a, b)) => a.partial_cmp(&b),
            None => return Ok(Const::Bool(op == "!=")),
        },
    };
    let Some(ord) = ord else {
        return Ok(Const::Bool(op == "!="));
    };
    let b = match op {
        "==" => ord == Ordering::Equal,
        "!=" => ord != Ordering::Equal,
        "<" => ord == Ordering::Less,
        "<=" => ord != Ordering::Greater,
        ">" => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    };
    Ok(Const::Bool(b))
}

fn cast(v: Const, ty: &str) -> Result<Const, EvalError> {
    let name = ty
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .ok_or_else(|| failed(format!("cast target {ty} is not a type")))?;
    let Some(p) = Primitive::from_name(name) else {
        return Err(EvalError::NotConstant(format!("cast to {name}")));
    };
    let err = || failed(format!("cannot cast {v} to type {name}"));
    let out = match (p, &v) {
        (_, Const::Null) => Const::Null,
        (Primitive::String, Const::String(_)) => v.clone(),
        (Primitive::String, other) => Const::String(other.to_zson().trim_matches('"').to_string()),
        (Primitive::Bool, Const::Bool(_)) => v.clone(),
        (Primitive::Bool, Const::String(s)) => Const::Bool(s.parse().map_err(|_| err())?),
        (Primitive::Duration, Const::String(s)) => {
            Const::Duration(builder::parse_duration(s).map_err(|_| err())?)
        }
        (Primitive::Duration, Const::Duration(_)) => v.clone(),
        (Primitive::Duration, c) => Const::Duration(c.as_int().ok_or_else(err)?),
        (Primitive::Time, Const::String(s)) => Const::Time(builder::parse_time(s).map_err(|_| err())?),
        (Primitive::Time, Const::Time(_)) => v.clone(),
        (Primitive::Time, c) => Const::Time(c.as_int().ok_or_else(err)?),
        (p, c) if is_float(p.id()) => match c {
            Const::String(s) => Const::Float(s.parse().map_err(|_| err())?),
            c => Const::Float(as_float(c).ok_or_else(err)?),
        },
        (p, c) if is_signed(p.id()) => Const::Int(match c {
            Const::Float(f) => *f as i64,
            Const::String(s) => s.parse().map_err(|_| err())?,
            Const::Bool(b) => i64::from(*b),
            Const::Duration(n) | Const::Time(n) => *n,
            c => c.as_int().ok_or_else(err)?,
        }),
        (p, c) if is_unsigned(p.id()) => Const::Uint(match c {
            Const::Float(f) if *f >= 0.0 => *f as u64,
            Const::Int(i) => u64::try_from(*i).map_err(|_| err())?,
            Const::Uint(u) => *u,
            Const::String(s) => s.parse().map_err(|_| err())?,
            _ => return Err(err()),
        }),
        _ => return Err(EvalError::NotConstant(format!("cast to {name}"))),
    };
    Ok(out)
}

/// True when `e` reads neither input data nor variables.
pub fn is_constant(e: &Expr) -> bool {
    match e {
        Expr::Literal { .. } => true,
        Expr::This { .. } | Expr::Var { .. } | Expr::Agg { .. } | Expr::OverExpr { .. } => false,
        Expr::Search { .. } | Expr::RegexpSearch { .. } => false,
        Expr::ArrayExpr { elems } | Expr::SetExpr { elems } => elems.iter().all(|e| match e {
            VectorElem::VectorValue { expr } | VectorElem::Spread { expr } => is_constant(expr),
        }),
        Expr::BinaryExpr { lhs, rhs, .. } => is_constant(lhs) && is_constant(rhs),
        Expr::Call { args, .. } => args.iter().all(is_constant),
        Expr::Conditional { cond, then, else_ } => {
            is_constant(cond) && is_constant(then) && is_constant(else_)
        }
        Expr::Dot { lhs, .. } => is_constant(lhs),
        Expr::IndexExpr { expr, index } => is_constant(expr) && is_constant(index),
        Expr::MapCall { expr, .. } => is_constant(expr),
        Expr::MapExpr { entries } => entries
            .iter()
            .all(|e| is_constant(&e.key) && is_constant(&e.value)),
        Expr::RecordExpr { elems } => elems.iter().all(|e| match e {
            RecordElem::Field { value, .. } => is_constant(value),
            RecordElem::Spread { expr } => is_constant(expr),
        }),
        Expr::RegexpMatch { expr, .. } => is_constant(expr),
        Expr::SliceExpr { expr, from, to } => {
            is_constant(expr)
                && from.as_deref().is_none_or(is_constant)
                && to.as_deref().is_none_or(is_constant)
        }
        Expr::UnaryExpr { operand, .. } => is_constant(operand),
    }
}

/// Replaces constant subexpressions the evaluator understands with literals.
pub fn fold(zctx: &Context, e: Expr) -> Expr {
    if !matches!(e, Expr::Literal { .. }) && is_constant(&e) {
        if let Ok(c) = eval(zctx, &e) {
            if !matches!(c, Const::Other(_)) {
                return c.to_expr();
            }
        }
    }
    e
}

/// The helpers above take the literal text through the ZSON analyzer, which
/// reports unknown type names with this prefix.
pub fn is_dynamic_type_error(e: &EvalError) -> bool {
    matches!(e, EvalError::Failed(msg) if msg.starts_with("no such type name"))
}
