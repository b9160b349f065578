// SPDX-License-Identifier: AGPL-3.0

//! Syntax tree produced by the parser.
//!
//! Every node carries the byte span it was parsed from. Nodes serialize with a
//! `kind` discriminator so the tree can be dumped and reloaded as JSON.

pub mod expr;
pub mod zed;

use crate::zedc::parser::location::Loc;
use serde::{Deserialize, Serialize};

pub use expr::{
    Assignment, Def, EntryExpr, Expr, FStringElem, RecordElem, VectorElem,
};

pub type Seq = Vec<Op>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Op {
    /// `from src [=> seq]` or the parallel form `from ( src => seq ... )`.
    From {
        elems: Vec<FromElem>,
        loc: Loc,
    },
    /// A parenthesized sequence with leading declarations.
    Scope {
        decls: Vec<Decl>,
        body: Seq,
        loc: Loc,
    },
    /// `fork ( => seq ... )`.
    Parallel {
        paths: Vec<Seq>,
        loc: Loc,
    },
    /// A parenthesized sequence used as a single operator.
    Sequential {
        body: Seq,
        loc: Loc,
    },
    Switch {
        expr: Option<Expr>,
        cases: Vec<Case>,
        loc: Loc,
    },
    /// `search`, a bare `*`, or a bare search predicate.
    Search {
        expr: Expr,
        loc: Loc,
    },
    /// `where` and `filter`.
    Where {
        expr: Expr,
        loc: Loc,
    },
    Cut {
        args: Vec<Assignment>,
        loc: Loc,
    },
    Pick {
        args: Vec<Assignment>,
        loc: Loc,
    },
    Drop {
        args: Vec<Expr>,
        loc: Loc,
    },
    Put {
        args: Vec<Assignment>,
        loc: Loc,
    },
    Rename {
        args: Vec<Assignment>,
        loc: Loc,
    },
    Sort {
        args: Vec<Expr>,
        reverse: bool,
        nulls_first: bool,
        loc: Loc,
    },
    Top {
        limit: Option<Expr>,
        args: Vec<Expr>,
        flush: bool,
        loc: Loc,
    },
    Head {
        count: Option<Expr>,
        loc: Loc,
    },
    Tail {
        count: Option<Expr>,
        loc: Loc,
    },
    Uniq {
        cflag: bool,
        loc: Loc,
    },
    Fuse {
        loc: Loc,
    },
    Shape {
        loc: Loc,
    },
    Pass {
        loc: Loc,
    },
    Sample {
        expr: Option<Expr>,
        loc: Loc,
    },
    /// `[style] join [( right )] on l=r [assignments]`.
    Join {
        style: String,
        right: Option<Seq>,
        left_key: Expr,
        right_key: Expr,
        args: Vec<Assignment>,
        loc: Loc,
    },
    Summarize {
        every: Option<Expr>,
        keys: Vec<Assignment>,
        aggs: Vec<Assignment>,
        limit: Option<u64>,
        loc: Loc,
    },
    Explode {
        args: Vec<Expr>,
        ty: Option<zed::Type>,
        as_: Option<Expr>,
        loc: Loc,
    },
    Merge {
        expr: Expr,
        loc: Loc,
    },
    Over {
        exprs: Vec<Expr>,
        locals: Vec<Def>,
        body: Option<Seq>,
        loc: Loc,
    },
    Yield {
        exprs: Vec<Expr>,
        loc: Loc,
    },
    Load {
        pool: String,
        branch: Option<String>,
        author: Option<String>,
        message: Option<String>,
        meta: Option<String>,
        loc: Loc,
    },
    /// A bare list of `lhs := rhs` assignments.
    OpAssignment {
        assignments: Vec<Assignment>,
        loc: Loc,
    },
    /// A bare expression: a filter, a projection, or a user operator call.
    OpExpr {
        expr: Expr,
        loc: Loc,
    },

    // SQL
    Select(Box<Select>),
    /// A parenthesized pipeline used as a SQL table.
    #[serde(rename = "SQLPipe")]
    SqlPipe {
        ops: Seq,
        loc: Loc,
    },
    Limit {
        op: Box<Op>,
        count: Expr,
        loc: Loc,
    },
    OrderBy {
        op: Box<Op>,
        exprs: Vec<SortExpr>,
        loc: Loc,
    },
    With {
        ctes: Vec<Cte>,
        body: Box<Op>,
        loc: Loc,
    },
    #[serde(rename = "SQLJoin")]
    SqlJoin {
        style: String,
        left: Box<Op>,
        right: Box<Op>,
        cond: Expr,
        loc: Loc,
    },
    CrossJoin {
        left: Box<Op>,
        right: Box<Op>,
        loc: Loc,
    },
    Union {
        distinct: bool,
        left: Box<Op>,
        right: Box<Op>,
        loc: Loc,
    },
    /// A table with an alias, `T AS t`.
    Alias {
        op: Box<Op>,
        name: String,
        loc: Loc,
    },
    Ordinality {
        op: Box<Op>,
        loc: Loc,
    },
    Table {
        name: String,
        loc: Loc,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub distinct: bool,
    pub value: bool,
    pub selection: Vec<Assignment>,
    pub from: Option<Op>,
    #[serde(rename = "where")]
    pub where_: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub loc: Loc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nulls {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortExpr {
    pub expr: Expr,
    pub order: Option<Order>,
    pub nulls: Option<Nulls>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cte {
    pub name: String,
    pub body: Op,
    pub loc: Loc,
}

/// `case expr => seq`. A `None` expression is the `default` case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub expr: Option<Expr>,
    pub path: Seq,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Decl {
    #[serde(rename = "ConstDecl")]
    Const { name: String, expr: Expr, loc: Loc },
    #[serde(rename = "FuncDecl")]
    Func {
        name: String,
        params: Vec<String>,
        expr: Expr,
        loc: Loc,
    },
    #[serde(rename = "OpDecl")]
    Op {
        name: String,
        params: Vec<String>,
        body: Seq,
        loc: Loc,
    },
    #[serde(rename = "TypeDecl")]
    Type { name: String, ty: zed::Type, loc: Loc },
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Const { name, .. }
            | Decl::Func { name, .. }
            | Decl::Op { name, .. }
            | Decl::Type { name, .. } => name,
        }
    }

    pub fn loc(&self) -> Loc {
        match self {
            Decl::Const { loc, .. }
            | Decl::Func { loc, .. }
            | Decl::Op { loc, .. }
            | Decl::Type { loc, .. } => *loc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromElem {
    pub source: Source,
    pub args: SourceArgs,
    /// The `=> seq` attached to this source in a parallel `from`.
    pub body: Option<Seq>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Source {
    /// `from name`: a pool inside a lake, a file outside one.
    #[serde(rename = "From")]
    Name { spec: PoolSpec, loc: Loc },
    Pool { spec: PoolSpec, loc: Loc },
    File { path: String, loc: Loc },
    #[serde(rename = "HTTP")]
    Http { url: String, loc: Loc },
}

impl Source {
    pub fn loc(&self) -> Loc {
        match self {
            Source::Name { loc, .. }
            | Source::Pool { loc, .. }
            | Source::File { loc, .. }
            | Source::Http { loc, .. } => *loc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PoolName {
    #[serde(rename = "PoolNameText")]
    Text { name: String },
    Glob { pattern: String },
    Regexp { pattern: String },
}

/// `pool[@commit][:meta]`. A missing pool with a meta names lake metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub pool: Option<PoolName>,
    pub commit: Option<String>,
    pub meta: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceArgs {
    pub format: Option<String>,
    /// `order field[:asc|:desc]`.
    pub order: Option<(String, Order)>,
    pub method: Option<String>,
    pub headers: Option<Expr>,
    pub body: Option<String>,
}

impl Op {
    pub fn loc(&self) -> Loc {
        match self {
            Op::Select(s) => s.loc,
            Op::From { loc, .. }
            | Op::Scope { loc, .. }
            | Op::Parallel { loc, .. }
            | Op::Sequential { loc, .. }
            | Op::Switch { loc, .. }
            | Op::Search { loc, .. }
            | Op::Where { loc, .. }
            | Op::Cut { loc, .. }
            | Op::Pick { loc, .. }
            | Op::Drop { loc, .. }
            | Op::Put { loc, .. }
            | Op::Rename { loc, .. }
            | Op::Sort { loc, .. }
            | Op::Top { loc, .. }
            | Op::Head { loc, .. }
            | Op::Tail { loc, .. }
            | Op::Uniq { loc, .. }
            | Op::Fuse { loc }
            | Op::Shape { loc }
            | Op::Pass { loc }
            | Op::Sample { loc, .. }
            | Op::Join { loc, .. }
            | Op::Summarize { loc, .. }
            | Op::Explode { loc, .. }
            | Op::Merge { loc, .. }
            | Op::Over { loc, .. }
            | Op::Yield { loc, .. }
            | Op::Load { loc, .. }
            | Op::OpAssignment { loc, .. }
            | Op::OpExpr { loc, .. }
            | Op::SqlPipe { loc, .. }
            | Op::Limit { loc, .. }
            | Op::OrderBy { loc, .. }
            | Op::With { loc, .. }
            | Op::SqlJoin { loc, .. }
            | Op::CrossJoin { loc, .. }
            | Op::Union { loc, .. }
            | Op::Alias { loc, .. }
            | Op::Ordinality { loc, .. }
            | Op::Table { loc, .. } => *loc,
        }
    }

    /// True for the SQL operators, which lower through their own path.
    pub fn is_sql(&self) -> bool {
        matches!(
            self,
            Op::Select(_)
                | Op::Limit { .. }
                | Op::OrderBy { .. }
                | Op::With { .. }
                | Op::Union { .. }
        )
    }
}

/// Number of inputs the sequence consumes: two for a leading two-input join.
pub fn fan_in(seq: &[Op]) -> usize {
    match seq.first() {
        Some(Op::Join { right: None, .. }) => 2,
        Some(Op::Sequential { body, .. }) => fan_in(body),
        _ => 1,
    }
}
