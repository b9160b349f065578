// SPDX-License-Identifier: AGPL-3.0

//! DAG rewrites applied after semantic analysis.
//!
//! The passes are structural: a leading filter moves into the scan, the
//! scan's order flows downstream to mark sorted aggregations, the scan is
//! projected to the columns the query reads, and a sequential chain can be
//! split into concurrent paths.

pub mod demand;
pub mod parallelize;
pub mod sort;

use crate::zedc::{
    analyzer::errors::CompileError,
    compiler::source::Source,
    dag::{Expr, Op, Path, Seq, SortKey, expr::and_all, has_source},
};
use tokio_util::sync::CancellationToken;

pub struct Optimizer<'a> {
    source: &'a dyn Source,
    cancel: CancellationToken,
    /// Order assumed for runtime-bound input, which no catalog describes.
    default_sort: Option<SortKey>,
}

impl<'a> Optimizer<'a> {
    pub fn new(source: &'a dyn Source, cancel: &CancellationToken) -> Self {
        Self {
            source,
            cancel: cancel.clone(),
            default_sort: None,
        }
    }

    pub fn with_default_sort(mut self, key: Option<SortKey>) -> Self {
        self.default_sort = key;
        self
    }

    /// The order a scan produces.
    pub fn sort_key_of(&self, scan: &Op) -> Option<SortKey> {
        match scan {
            Op::DefaultScan { .. } => self.default_sort.clone(),
            _ => self.source.sort_key(&self.cancel, scan),
        }
    }

    pub fn optimize(&self, mut seq: Seq) -> Result<Seq, CompileError> {
        self.check_cancel()?;
        self.optimize_entry(&mut seq)?;
        Ok(seq)
    }

    fn optimize_entry(&self, seq: &mut Seq) -> Result<(), CompileError> {
        match seq.first_mut() {
            Some(Op::Scope { body, .. }) => return self.optimize_entry(body),
            Some(Op::Fork { paths, .. }) => {
                for path in paths.iter_mut().filter(|p| has_source(p)) {
                    self.optimize_entry(path)?;
                }
                return Ok(());
            }
            Some(op) if op.is_scan() => {}
            _ => return Ok(()),
        }
        push_down(seq);
        let sort = self.sort_key_of(&seq[0]);
        let Some((scan, chain)) = seq.split_first_mut() else {
            return Ok(());
        };
        if let Some((key, primary)) = sort.as_ref().and_then(|k| Some((k, k.primary()?))) {
            let sorted = sort::set_input_sort_dir(chain, primary, key.order);
            tracing::debug!(scan = scan.kind(), key = %primary.join("."), sorted, "propagated scan order");
        }
        let fields = demand::demand(chain)
            .map(|cols| cols.into_iter().map(|c| vec![c]).collect::<Vec<Path>>());
        match scan {
            Op::PoolScan {
                filter,
                key_pruner,
                fields: projection,
                ..
            } => {
                *key_pruner = filter
                    .as_ref()
                    .zip(sort.as_ref().and_then(SortKey::primary))
                    .and_then(|(f, key)| new_key_pruner(f, key));
                *projection = fields;
            }
            Op::FileScan {
                fields: projection, ..
            } => *projection = fields,
            _ => {}
        }
        tracing::trace!(scan = scan.kind(), "optimized scan");
        Ok(())
    }

    /// Rewrites an analyzed delete, a `DeleteScan` followed by its predicate,
    /// into `replicas` paths that each read the matching objects and keep
    /// the records the predicate does not select.
    pub fn optimize_deleter(&self, seq: Seq, replicas: usize) -> Result<Seq, CompileError> {
        self.check_cancel()?;
        let [scan @ Op::DeleteScan { id, commit, .. }, Op::Filter { expr }] = seq.as_slice() else {
            return Err(CompileError::internal("bad deleter structure"));
        };
        if replicas == 0 {
            return Err(CompileError::internal("deleter needs at least one replica"));
        }
        let sort = self.source.sort_key(&self.cancel, scan);
        let primary = sort.as_ref().and_then(SortKey::primary);
        let deleter = Op::DeleteScan {
            id: *id,
            commit: *commit,
            where_: Some(expr.clone()),
            key_pruner: primary.and_then(|key| new_key_pruner(expr, key)),
        };
        let keep = Op::filter(Expr::UnaryExpr {
            op: "!".to_string(),
            operand: Box::new(expr.clone()),
        });
        let path = vec![deleter, keep];
        if replicas == 1 {
            return Ok(path);
        }
        tracing::debug!(replicas, "splitting deleter");
        let fork = Op::Fork {
            paths: vec![path; replicas],
            merge_by: primary.cloned(),
            merge_reverse: sort.as_ref().is_some_and(SortKey::is_reversed),
        };
        let mut out = vec![fork];
        if primary.is_some() {
            out.push(Op::Pass);
        }
        Ok(out)
    }

    /// Splits the query into `n` concurrent paths in the order its scan
    /// produces.
    pub fn parallelize(&self, seq: Seq, n: usize) -> Result<Seq, CompileError> {
        self.check_cancel()?;
        let sort = seq
            .first()
            .filter(|op| op.is_scan())
            .and_then(|scan| self.sort_key_of(scan))
            .or_else(|| self.default_sort.clone());
        parallelize::parallelize(seq, n, sort.as_ref())
    }

    fn check_cancel(&self) -> Result<(), CompileError> {
        if self.cancel.is_cancelled() {
            return Err(CompileError::Interrupted);
        }
        Ok(())
    }
}

/// Removes the filter at the head of `seq`, leaving a `Pass` in its place,
/// and returns its predicate.
pub fn lift_filter(seq: &mut [Op]) -> Option<Expr> {
    match seq.first_mut() {
        Some(op @ Op::Filter { .. }) => match std::mem::replace(op, Op::Pass) {
            Op::Filter { expr } => Some(expr),
            _ => None,
        },
        _ => None,
    }
}

/// Moves a filter that directly follows the scan into the scan itself.
fn push_down(seq: &mut Seq) {
    let Some((scan, chain)) = seq.split_first_mut() else {
        return;
    };
    let filter = match scan {
        Op::DefaultScan { filter }
        | Op::FileScan { filter, .. }
        | Op::PoolScan { filter, .. } => filter,
        _ => return,
    };
    let Some(pred) = lift_filter(chain) else {
        return;
    };
    if pred.is_true() {
        return;
    }
    tracing::trace!("pushed filter into scan");
    *filter = and_all(filter.take().into_iter().chain([pred]));
}

/// Builds a predicate over an object's `{min,max}` key range that is true
/// when no record of the object can satisfy `filter`. Only comparisons of
/// `key` against literals contribute; anything else yields `None`.
pub fn new_key_pruner(filter: &Expr, key: &Path) -> Option<Expr> {
    let Expr::BinaryExpr { op, lhs, rhs } = filter else {
        return None;
    };
    match op.as_str() {
        "and" => {
            // Either side ruling the object out is enough.
            match (new_key_pruner(lhs, key), new_key_pruner(rhs, key)) {
                (Some(l), Some(r)) => Some(Expr::binary("or", l, r)),
                (l, r) => l.or(r),
            }
        }
        "or" => {
            let l = new_key_pruner(lhs, key)?;
            let r = new_key_pruner(rhs, key)?;
            Some(Expr::binary("and", l, r))
        }
        "==" | "<" | "<=" | ">" | ">=" => {
            let (cmp, lit) = if lhs.as_path() == Some(key) && is_literal(rhs) {
                (op.as_str(), rhs.as_ref().clone())
            } else if rhs.as_path() == Some(key) && is_literal(lhs) {
                (flip(op), lhs.as_ref().clone())
            } else {
                return None;
            };
            Some(range_excludes(cmp, lit))
        }
        _ => None,
    }
}

fn is_literal(e: &Expr) -> bool {
    matches!(e, Expr::Literal { .. })
}

/// `a op b` rewritten as `b op' a`.
fn flip(op: &str) -> &str {
    match op {
        "<" => ">",
        "<=" => ">=",
        ">" => "<",
        ">=" => "<=",
        other => other,
    }
}

/// True over `{min,max}` when `key cmp lit` holds for no key in the range.
fn range_excludes(cmp: &str, lit: Expr) -> Expr {
    let min = || Expr::path(["min"]);
    let max = || Expr::path(["max"]);
    match cmp {
        "==" => Expr::binary(
            "or",
            Expr::binary(">", min(), lit.clone()),
            Expr::binary("<", max(), lit),
        ),
        "<" => Expr::binary(">=", min(), lit),
        "<=" => Expr::binary(">", min(), lit),
        ">" => Expr::binary("<=", max(), lit),
        _ => Expr::binary("<", max(), lit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::{
        compiler::source::{MemoryLake, NoLake, PoolEntry},
        dag::{Assignment, Order},
    };
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn lake(order: Order) -> (MemoryLake, Uuid) {
        let id = Uuid::new_v4();
        let mut lake = MemoryLake::new();
        lake.add_pool(PoolEntry {
            name: "logs".into(),
            id,
            sort_key: SortKey::new(vec!["ts".into()], order),
            branches: BTreeMap::from([("main".to_string(), Uuid::nil())]),
        })
        .unwrap();
        (lake, id)
    }

    fn pool_scan(id: Uuid) -> Op {
        Op::PoolScan {
            id,
            commit: Uuid::nil(),
            filter: None,
            key_pruner: None,
            fields: None,
        }
    }

    fn gt(field: &str, v: &str) -> Expr {
        Expr::binary(">", Expr::path([field]), Expr::literal(v))
    }

    #[test]
    fn filters_move_into_the_scan() {
        let (lake, id) = lake(Order::Asc);
        let cancel = CancellationToken::new();
        let seq = vec![
            pool_scan(id),
            Op::filter(gt("ts", "10")),
            Op::Cut {
                args: vec![Assignment {
                    lhs: Expr::path(["x"]),
                    rhs: Expr::path(["x"]),
                }],
                quiet: false,
            },
        ];
        let out = Optimizer::new(&lake, &cancel).optimize(seq).unwrap();
        assert_eq!(out[1], Op::Pass);
        let Op::PoolScan {
            filter,
            key_pruner,
            fields,
            ..
        } = &out[0]
        else {
            panic!("expected pool scan");
        };
        assert_eq!(filter.as_ref(), Some(&gt("ts", "10")));
        assert_eq!(
            key_pruner.as_ref(),
            Some(&Expr::binary("<=", Expr::path(["max"]), Expr::literal("10")))
        );
        assert_eq!(fields.as_ref(), Some(&vec![vec!["x".to_string()]]));
    }

    #[test]
    fn match_all_filters_are_dropped() {
        let cancel = CancellationToken::new();
        let seq = vec![
            Op::DefaultScan { filter: None },
            Op::filter(Expr::literal("true")),
            Op::Uniq { cflag: false },
        ];
        let out = Optimizer::new(&NoLake, &cancel).optimize(seq).unwrap();
        assert_eq!(
            out,
            vec![
                Op::DefaultScan { filter: None },
                Op::Pass,
                Op::Uniq { cflag: false }
            ]
        );
    }

    #[test]
    fn scan_order_reaches_summarize() {
        let (lake, id) = lake(Order::Desc);
        let cancel = CancellationToken::new();
        let every = Assignment {
            lhs: Expr::path(["ts"]),
            rhs: Expr::call("trunc", vec![Expr::path(["ts"]), Expr::literal("1h")]),
        };
        let seq = vec![pool_scan(id), Op::summarize(vec![every], vec![])];
        let out = Optimizer::new(&lake, &cancel).optimize(seq).unwrap();
        assert!(matches!(out[1], Op::Summarize { input_sort_dir: -1, .. }));
    }

    #[test]
    fn lift_filter_leaves_a_pass() {
        let mut seq = vec![Op::filter(gt("x", "1")), Op::Head { count: 1 }];
        assert_eq!(lift_filter(&mut seq), Some(gt("x", "1")));
        assert_eq!(seq, vec![Op::Pass, Op::Head { count: 1 }]);
        assert_eq!(lift_filter(&mut seq), None);
    }

    #[test]
    fn pruners_follow_boolean_structure() {
        let ts: Path = vec!["ts".into()];
        let eq = Expr::binary("==", Expr::literal("5"), Expr::path(["ts"]));
        assert_eq!(
            new_key_pruner(&eq, &ts),
            Some(Expr::binary(
                "or",
                Expr::binary(">", Expr::path(["min"]), Expr::literal("5")),
                Expr::binary("<", Expr::path(["max"]), Expr::literal("5")),
            ))
        );
        let flipped = Expr::binary("<", Expr::literal("5"), Expr::path(["ts"]));
        assert_eq!(
            new_key_pruner(&flipped, &ts),
            Some(Expr::binary("<=", Expr::path(["max"]), Expr::literal("5")))
        );
        let mixed = Expr::binary("and", gt("x", "1"), gt("ts", "2"));
        assert_eq!(
            new_key_pruner(&mixed, &ts),
            Some(Expr::binary("<=", Expr::path(["max"]), Expr::literal("2")))
        );
        let either = Expr::binary("or", gt("x", "1"), gt("ts", "2"));
        assert_eq!(new_key_pruner(&either, &ts), None);
    }

    #[test]
    fn deleter_keeps_unmatched_records() {
        let (lake, id) = lake(Order::Asc);
        let cancel = CancellationToken::new();
        let seq = vec![
            Op::DeleteScan {
                id,
                commit: Uuid::nil(),
                where_: None,
                key_pruner: None,
            },
            Op::filter(gt("ts", "3")),
        ];
        let opt = Optimizer::new(&lake, &cancel);
        let single = opt.optimize_deleter(seq.clone(), 1).unwrap();
        assert_eq!(
            single[1],
            Op::filter(Expr::UnaryExpr {
                op: "!".into(),
                operand: Box::new(gt("ts", "3")),
            })
        );
        assert!(matches!(&single[0], Op::DeleteScan { where_: Some(_), key_pruner: Some(_), .. }));

        let split = opt.optimize_deleter(seq, 3).unwrap();
        assert!(matches!(&split[0], Op::Fork { paths, merge_by: Some(_), .. } if paths.len() == 3));
        assert_eq!(split[1], Op::Pass);
        assert!(opt.optimize_deleter(vec![Op::Pass], 2).is_err());
    }

    #[test]
    fn parallelize_uses_the_default_order_for_runtime_input() {
        let cancel = CancellationToken::new();
        let opt = Optimizer::new(&NoLake, &cancel)
            .with_default_sort(Some(SortKey::new(vec!["ts".into()], Order::Asc)));
        let seq = vec![Op::DefaultScan { filter: None }, Op::Uniq { cflag: false }];
        let out = opt.parallelize(seq, 2).unwrap();
        assert!(matches!(&out[0], Op::Fork { paths, .. } if paths.len() == 2));
        assert_eq!(out[1], Op::Uniq { cflag: false });
    }

    #[test]
    fn cancelled_optimizations_stop() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Optimizer::new(&NoLake, &cancel).optimize(vec![Op::Pass]).unwrap_err();
        assert_eq!(err, CompileError::Interrupted);
    }
}
