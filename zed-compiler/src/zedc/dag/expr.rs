use crate::zedc::dag::Seq;
use serde::{Deserialize, Serialize};

/// A field path relative to `this`. The empty path is `this` itself.
pub type Path = Vec<String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    /// An aggregator application inside a `Summarize`.
    Agg {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expr: Option<Box<Expr>>,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        where_: Option<Box<Expr>>,
    },
    ArrayExpr {
        elems: Vec<VectorElem>,
    },
    BinaryExpr {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        #[serde(rename = "else")]
        else_: Box<Expr>,
    },
    /// Field access on a computed value. Accesses rooted at `this` fold into [`Expr::This`].
    Dot {
        lhs: Box<Expr>,
        rhs: String,
    },
    IndexExpr {
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    /// A constant in canonical ZSON.
    Literal {
        value: String,
    },
    /// `map(e, f)`: applies `inner` to each element of `expr`.
    MapCall {
        expr: Box<Expr>,
        inner: Box<Expr>,
    },
    MapExpr {
        entries: Vec<Entry>,
    },
    OverExpr {
        defs: Vec<Def>,
        exprs: Vec<Expr>,
        body: Seq,
    },
    RecordExpr {
        elems: Vec<RecordElem>,
    },
    /// `e ~ /re/`.
    RegexpMatch {
        pattern: String,
        expr: Box<Expr>,
    },
    /// A regexp or glob searched for in every string of `expr`.
    RegexpSearch {
        pattern: String,
        expr: Box<Expr>,
    },
    /// A search term: `text` as written, `value` its ZSON form.
    Search {
        text: String,
        value: String,
        expr: Box<Expr>,
    },
    SetExpr {
        elems: Vec<VectorElem>,
    },
    SliceExpr {
        expr: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Box<Expr>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Box<Expr>>,
    },
    This {
        path: Path,
    },
    UnaryExpr {
        op: String,
        operand: Box<Expr>,
    },
    /// A lateral variable or function parameter.
    Var {
        name: String,
        slot: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RecordElem {
    Field { name: String, value: Expr },
    Spread { expr: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VectorElem {
    VectorValue { expr: Expr },
    Spread { expr: Expr },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub lhs: Expr,
    pub rhs: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Def {
    pub name: String,
    pub expr: Expr,
}

/// A user function. Calls reference it by name from within its `Scope`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Func {
    pub name: String,
    pub params: Vec<String>,
    pub expr: Expr,
}

impl Expr {
    pub fn this() -> Self {
        Expr::This { path: Vec::new() }
    }

    pub fn path<S: Into<String>>(path: impl IntoIterator<Item = S>) -> Self {
        Expr::This {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn binary(op: &str, lhs: Expr, rhs: Expr) -> Self {
        Expr::BinaryExpr {
            op: op.to_string(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.to_string(),
            args,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Expr::This { path } => Some(path),
            _ => None,
        }
    }

    /// True for a bare `this`.
    pub fn is_this(&self) -> bool {
        matches!(self, Expr::This { path } if path.is_empty())
    }

    /// The name of a single-component field reference.
    pub fn top_level_field(&self) -> Option<&str> {
        match self {
            Expr::This { path } if path.len() == 1 => Some(&path[0]),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Expr::Literal { value } if value == "true")
    }

    /// Visits every field path the expression reads. Returns false when the
    /// expression may read fields that cannot be named statically, such as a
    /// search over all of `this`.
    pub fn walk_fields(&self, f: &mut impl FnMut(&Path)) -> bool {
        match self {
            Expr::This { path } => {
                if path.is_empty() {
                    return false;
                }
                f(path);
                true
            }
            Expr::Literal { .. } | Expr::Var { .. } => true,
            Expr::Agg { expr, where_, .. } => {
                expr.as_deref().is_none_or(|e| e.walk_fields(f))
                    && where_.as_deref().is_none_or(|e| e.walk_fields(f))
            }
            Expr::ArrayExpr { elems } | Expr::SetExpr { elems } => elems.iter().all(|e| match e {
                VectorElem::VectorValue { expr } | VectorElem::Spread { expr } => {
                    expr.walk_fields(f)
                }
            }),
            Expr::BinaryExpr { lhs, rhs, .. } => lhs.walk_fields(f) && rhs.walk_fields(f),
            Expr::Call { args, .. } => args.iter().all(|a| a.walk_fields(f)),
            Expr::Conditional { cond, then, else_ } => {
                cond.walk_fields(f) && then.walk_fields(f) && else_.walk_fields(f)
            }
            Expr::Dot { lhs, .. } => lhs.walk_fields(f),
            Expr::IndexExpr { expr, index } => expr.walk_fields(f) && index.walk_fields(f),
            Expr::MapCall { expr, .. } => expr.walk_fields(f),
            Expr::MapExpr { entries } => entries
                .iter()
                .all(|e| e.key.walk_fields(f) && e.value.walk_fields(f)),
            Expr::OverExpr { defs, exprs, .. } => {
                defs.iter().all(|d| d.expr.walk_fields(f)) && exprs.iter().all(|e| e.walk_fields(f))
            }
            Expr::RecordExpr { elems } => elems.iter().all(|e| match e {
                RecordElem::Field { value, .. } => value.walk_fields(f),
                RecordElem::Spread { expr } => expr.walk_fields(f),
            }),
            Expr::RegexpMatch { expr, .. }
            | Expr::RegexpSearch { expr, .. }
            | Expr::Search { expr, .. } => expr.walk_fields(f),
            Expr::SliceExpr { expr, from, to } => {
                expr.walk_fields(f)
                    && from.as_deref().is_none_or(|e| e.walk_fields(f))
                    && to.as_deref().is_none_or(|e| e.walk_fields(f))
            }
            Expr::UnaryExpr { operand, .. } => operand.walk_fields(f),
        }
    }
}

/// Conjunction of `exprs`, or `None` when empty.
pub fn and_all(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    exprs
        .into_iter()
        .reduce(|acc, e| Expr::binary("and", acc, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_kind_tag() {
        let e = Expr::binary(">", Expr::path(["x"]), Expr::literal("1"));
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "BinaryExpr");
        assert_eq!(json["lhs"]["kind"], "This");
        assert_eq!(json["lhs"]["path"][0], "x");
        let back: Expr = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn walks_fields() {
        let e = Expr::binary(
            "and",
            Expr::binary(">", Expr::path(["x"]), Expr::literal("1")),
            Expr::call("len", vec![Expr::path(["a", "b"])]),
        );
        let mut seen = Vec::new();
        assert!(e.walk_fields(&mut |p| seen.push(p.join("."))));
        assert_eq!(seen, vec!["x", "a.b"]);

        let search = Expr::Search {
            text: "foo".into(),
            value: "\"foo\"".into(),
            expr: Box::new(Expr::this()),
        };
        assert!(!search.walk_fields(&mut |_| {}));
    }

    #[test]
    fn conjunction() {
        assert_eq!(and_all(Vec::new()), None);
        let e = and_all([Expr::literal("true"), Expr::literal("false")]).unwrap();
        assert!(matches!(e, Expr::BinaryExpr { ref op, .. } if op == "and"));
    }
}
