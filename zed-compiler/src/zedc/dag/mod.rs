// SPDX-License-Identifier: AGPL-3.0

//! The physical plan handed to the runtime.
//!
//! Unlike the syntax tree the DAG carries no source locations and no sugar:
//! identifiers are resolved, SQL is lowered to pipeline operators, and every
//! data source is a concrete scan. Nodes serialize with a `kind` tag.

pub mod expr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::zedc::ast::Order;
pub use expr::{Assignment, Def, Entry, Expr, Func, Path, RecordElem, VectorElem};

pub type Seq = Vec<Op>;

/// Metadata names accepted by `from :meta`.
pub const LAKE_METAS: &[&str] = &["branches", "index_rules", "pools"];
/// Metadata names accepted by `from pool:meta`.
pub const POOL_METAS: &[&str] = &["branches"];
/// Metadata names accepted by `from pool@commit:meta`.
pub const COMMIT_METAS: &[&str] = &["indexes", "log", "objects", "partitions", "rawlog", "vectors"];

/// The order of a data source: its key paths and direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub keys: Vec<Path>,
    pub order: Order,
}

impl SortKey {
    pub fn new(key: Path, order: Order) -> Self {
        Self {
            keys: vec![key],
            order,
        }
    }

    pub fn primary(&self) -> Option<&Path> {
        self.keys.first()
    }

    pub fn is_reversed(&self) -> bool {
        self.order == Order::Desc
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortExpr {
    pub key: Expr,
    pub order: Order,
}

/// A `switch` branch. `expr` is `None` only for the default branch of a
/// switch on an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Expr>,
    pub path: Seq,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Op {
    // Scans
    /// Reads whatever readers the caller binds at run time.
    DefaultScan {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Expr>,
    },
    FileScan {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort_key: Option<SortKey>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<Path>>,
    },
    #[serde(rename = "HTTPScan")]
    HttpScan {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sort_key: Option<SortKey>,
    },
    PoolScan {
        id: Uuid,
        commit: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filter: Option<Expr>,
        /// Evaluated against an object's `{min,max}` key range; true means skip.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_pruner: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Vec<Path>>,
    },
    PoolMetaScan {
        id: Uuid,
        meta: String,
    },
    CommitMetaScan {
        pool: Uuid,
        commit: Uuid,
        meta: String,
        tap: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_pruner: Option<Expr>,
    },
    LakeMetaScan {
        meta: String,
    },
    /// Scans the objects a `delete` would rewrite.
    DeleteScan {
        id: Uuid,
        commit: Uuid,
        #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
        where_: Option<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_pruner: Option<Expr>,
    },

    // Structure
    Scope {
        consts: Vec<Def>,
        funcs: Vec<Func>,
        body: Seq,
    },
    /// Copies its input to every path. Paths that begin with a scan instead
    /// divide the scanned data between them. With `merge_by` set the outputs
    /// are merged in that key's order.
    Fork {
        paths: Vec<Seq>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        merge_by: Option<Path>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        merge_reverse: bool,
    },
    Switch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expr: Option<Expr>,
        cases: Vec<Case>,
    },

    // Operators
    Cut {
        args: Vec<Assignment>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        quiet: bool,
    },
    Drop {
        args: Vec<Expr>,
    },
    Explode {
        args: Vec<Expr>,
        #[serde(rename = "type")]
        ty: String,
        #[serde(rename = "as")]
        as_: Expr,
    },
    Filter {
        expr: Expr,
    },
    Fuse,
    Head {
        count: u64,
    },
    Join {
        style: String,
        left_key: Expr,
        right_key: Expr,
        args: Vec<Assignment>,
    },
    Load {
        pool: Uuid,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        author: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<String>,
    },
    Merge {
        expr: Expr,
        order: Order,
    },
    Over {
        defs: Vec<Def>,
        exprs: Vec<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<Seq>,
    },
    Pass,
    Pick {
        args: Vec<Assignment>,
    },
    Put {
        args: Vec<Assignment>,
    },
    Rename {
        args: Vec<Assignment>,
    },
    Shape,
    Sort {
        args: Vec<SortExpr>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        nulls_first: bool,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        reverse: bool,
    },
    Summarize {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
        keys: Vec<Assignment>,
        aggs: Vec<Assignment>,
        /// 1 or -1 when the input is sorted by the first key, 0 otherwise.
        #[serde(default, skip_serializing_if = "is_zero")]
        input_sort_dir: i32,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        partials_in: bool,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        partials_out: bool,
    },
    Tail {
        count: u64,
    },
    Top {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        flush: bool,
    },
    Uniq {
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        cflag: bool,
    },
    Yield {
        exprs: Vec<Expr>,
    },
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl Op {
    pub fn filter(expr: Expr) -> Self {
        Op::Filter { expr }
    }

    pub fn summarize(keys: Vec<Assignment>, aggs: Vec<Assignment>) -> Self {
        Op::Summarize {
            limit: None,
            keys,
            aggs,
            input_sort_dir: 0,
            partials_in: false,
            partials_out: false,
        }
    }

    pub fn sort_by(keys: Vec<Expr>, order: Order) -> Self {
        Op::Sort {
            args: keys
                .into_iter()
                .map(|key| SortExpr { key, order })
                .collect(),
            nulls_first: false,
            reverse: false,
        }
    }

    pub fn is_scan(&self) -> bool {
        matches!(
            self,
            Op::DefaultScan { .. }
                | Op::FileScan { .. }
                | Op::HttpScan { .. }
                | Op::PoolScan { .. }
                | Op::PoolMetaScan { .. }
                | Op::CommitMetaScan { .. }
                | Op::LakeMetaScan { .. }
                | Op::DeleteScan { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Op::DefaultScan { .. } => "DefaultScan",
            Op::FileScan { .. } => "FileScan",
            Op::HttpScan { .. } => "HTTPScan",
            Op::PoolScan { .. } => "PoolScan",
            Op::PoolMetaScan { .. } => "PoolMetaScan",
            Op::CommitMetaScan { .. } => "CommitMetaScan",
            Op::LakeMetaScan { .. } => "LakeMetaScan",
            Op::DeleteScan { .. } => "DeleteScan",
            Op::Scope { .. } => "Scope",
            Op::Fork { .. } => "Fork",
            Op::Switch { .. } => "Switch",
            Op::Cut { .. } => "Cut",
            Op::Drop { .. } => "Drop",
            Op::Explode { .. } => "Explode",
            Op::Filter { .. } => "Filter",
            Op::Fuse => "Fuse",
            Op::Head { .. } => "Head",
            Op::Join { .. } => "Join",
            Op::Load { .. } => "Load",
            Op::Merge { .. } => "Merge",
            Op::Over { .. } => "Over",
            Op::Pass => "Pass",
            Op::Pick { .. } => "Pick",
            Op::Put { .. } => "Put",
            Op::Rename { .. } => "Rename",
            Op::Shape => "Shape",
            Op::Sort { .. } => "Sort",
            Op::Summarize { .. } => "Summarize",
            Op::Tail { .. } => "Tail",
            Op::Top { .. } => "Top",
            Op::Uniq { .. } => "Uniq",
            Op::Yield { .. } => "Yield",
        }
    }
}

/// True when the sequence begins with a scan, looking through a leading
/// `Scope` and into the first path of a leading `Fork`.
pub fn has_source(seq: &[Op]) -> bool {
    match seq.first() {
        Some(op) if op.is_scan() => true,
        Some(Op::Fork { paths, .. }) => paths.first().is_some_and(|p| has_source(p)),
        Some(Op::Scope { body, .. }) => has_source(body),
        _ => false,
    }
}

/// Applies `f` to every sequence in the tree, innermost first, and then to
/// `seq` itself.
pub fn walk(seq: &mut Seq, f: &mut impl FnMut(&mut Seq)) {
    for op in seq.iter_mut() {
        match op {
            Op::Scope { body, .. } => walk(body, f),
            Op::Fork { paths, .. } => paths.iter_mut().for_each(|p| walk(p, f)),
            Op::Switch { cases, .. } => cases.iter_mut().for_each(|c| walk(&mut c.path, f)),
            Op::Over { body: Some(body), .. } => walk(body, f),
            _ => {}
        }
    }
    f(seq)
}
