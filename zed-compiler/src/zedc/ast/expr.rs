use crate::zedc::{
    ast::{Seq, zed},
    parser::location::Loc,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    #[serde(rename = "ID")]
    Id { name: String, loc: Loc },
    This { loc: Loc },
    /// A literal primitive. `ty` names the primitive type implied by the text.
    Primitive { ty: String, text: String, loc: Loc },
    TypeValue { value: zed::Type, loc: Loc },
    #[serde(rename = "UnaryExpr")]
    Unary {
        op: String,
        operand: Box<Expr>,
        loc: Loc,
    },
    #[serde(rename = "BinaryExpr")]
    Binary {
        op: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        loc: Loc,
    },
    Dot {
        lhs: Box<Expr>,
        rhs: String,
        loc: Loc,
    },
    #[serde(rename = "IndexExpr")]
    Index {
        expr: Box<Expr>,
        index: Box<Expr>,
        loc: Loc,
    },
    #[serde(rename = "SliceExpr")]
    Slice {
        expr: Box<Expr>,
        from: Option<Box<Expr>>,
        to: Option<Box<Expr>>,
        loc: Loc,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        #[serde(rename = "else")]
        else_: Box<Expr>,
        loc: Loc,
    },
    /// A function or aggregator call. `where_` filters aggregator input.
    Call {
        name: String,
        args: Vec<Expr>,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        where_: Option<Box<Expr>>,
        loc: Loc,
    },
    Cast {
        expr: Box<Expr>,
        ty: zed::Type,
        loc: Loc,
    },
    #[serde(rename = "RecordExpr")]
    Record { elems: Vec<RecordElem>, loc: Loc },
    #[serde(rename = "ArrayExpr")]
    Array { elems: Vec<VectorElem>, loc: Loc },
    #[serde(rename = "SetExpr")]
    Set { elems: Vec<VectorElem>, loc: Loc },
    #[serde(rename = "MapExpr")]
    Map { entries: Vec<EntryExpr>, loc: Loc },
    /// `/re/` in search position.
    Regexp { pattern: String, loc: Loc },
    /// A glob pattern in search position.
    Glob { pattern: String, loc: Loc },
    /// A bare search term matched against every value of the record.
    Term {
        text: String,
        value: Box<Expr>,
        loc: Loc,
    },
    FString { elems: Vec<FStringElem>, loc: Loc },
    #[serde(rename = "OverExpr")]
    Over {
        exprs: Vec<Expr>,
        locals: Vec<Def>,
        body: Seq,
        loc: Loc,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RecordElem {
    Field { name: String, value: Expr, loc: Loc },
    /// A bare identifier or path whose last component names the field.
    Identifier { name: String, loc: Loc },
    Spread { expr: Expr, loc: Loc },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum VectorElem {
    #[serde(rename = "VectorValue")]
    Value { expr: Expr },
    Spread { expr: Expr, loc: Loc },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryExpr {
    pub key: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FStringElem {
    #[serde(rename = "FStringText")]
    Text { text: String },
    #[serde(rename = "FStringExpr")]
    Expr { expr: Expr },
}

/// `lhs := rhs`. Without a left-hand side the name is inferred from `rhs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub lhs: Option<Expr>,
    pub rhs: Expr,
    pub loc: Loc,
}

/// A name bound to an expression, as in `over ... with x=e`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Def {
    pub name: String,
    pub expr: Expr,
    pub loc: Loc,
}

impl Expr {
    pub fn loc(&self) -> Loc {
        match self {
            Expr::Id { loc, .. }
            | Expr::This { loc }
            | Expr::Primitive { loc, .. }
            | Expr::TypeValue { loc, .. }
            | Expr::Unary { loc, .. }
            | Expr::Binary { loc, .. }
            | Expr::Dot { loc, .. }
            | Expr::Index { loc, .. }
            | Expr::Slice { loc, .. }
            | Expr::Conditional { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Cast { loc, .. }
            | Expr::Record { loc, .. }
            | Expr::Array { loc, .. }
            | Expr::Set { loc, .. }
            | Expr::Map { loc, .. }
            | Expr::Regexp { loc, .. }
            | Expr::Glob { loc, .. }
            | Expr::Term { loc, .. }
            | Expr::FString { loc, .. }
            | Expr::Over { loc, .. } => *loc,
        }
    }

    pub fn primitive(ty: &str, text: impl Into<String>, loc: Loc) -> Self {
        Expr::Primitive {
            ty: ty.to_string(),
            text: text.into(),
            loc,
        }
    }

    pub fn string(text: impl Into<String>, loc: Loc) -> Self {
        Self::primitive("string", text, loc)
    }

    pub fn id(name: impl Into<String>, loc: Loc) -> Self {
        Expr::Id {
            name: name.into(),
            loc,
        }
    }

    pub fn binary(op: &str, lhs: Expr, rhs: Expr) -> Self {
        let loc = lhs.loc().to(rhs.loc());
        Expr::Binary {
            op: op.to_string(),
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
            loc,
        }
    }

    pub fn call(name: &str, args: Vec<Expr>, loc: Loc) -> Self {
        Expr::Call {
            name: name.to_string(),
            args,
            where_: None,
            loc,
        }
    }

    /// Flattens `a.b.c` (rooted at an identifier or `this`) into a path.
    pub fn as_path(&self) -> Option<Vec<String>> {
        match self {
            Expr::This { .. } => Some(Vec::new()),
            Expr::Id { name, .. } => Some(vec![name.clone()]),
            Expr::Dot { lhs, rhs, .. } => {
                let mut path = lhs.as_path()?;
                path.push(rhs.clone());
                Some(path)
            }
            Expr::Index { expr, index, .. } => match index.as_ref() {
                Expr::Primitive { ty, text, .. } if ty == "string" => {
                    let mut path = expr.as_path()?;
                    path.push(text.clone());
                    Some(path)
                }
                _ => None,
            },
            _ => None,
        }
    }
}
