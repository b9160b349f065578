//! Splits a sequential chain into N concurrent paths.
//!
//! The chain is scanned front to back and cut at the first operator that
//! needs to see all of its input in one place. Everything before the cut is
//! copied into each path of a `Fork`; the paths merge on the order the tail
//! relies on, and the tail runs once after the merge.

use crate::zedc::{
    analyzer::errors::CompileError,
    dag::{Assignment, Expr, Op, Path, Seq, SortKey},
    optimizer::sort::{is_key_of, sort_key_of_sort},
};

/// Largest parallelism accepted.
pub const MAX_PARALLELISM: usize = 50;

/// The order established at a merge point.
#[derive(Debug, Clone, PartialEq)]
struct Merge {
    key: Option<Path>,
    reverse: bool,
}

impl Merge {
    fn on(key: &Path, reverse: bool) -> Self {
        Self {
            key: Some(key.clone()),
            reverse,
        }
    }

    fn unordered(reverse: bool) -> Self {
        Self { key: None, reverse }
    }
}

/// Where to cut the chain and how to rejoin it.
struct Split {
    branch: Seq,
    tail: Seq,
    merge: Merge,
}

/// Rewrites `seq` into `n` concurrent paths when that preserves its meaning
/// given input ordered by `sort`. A leading scan is copied into each path,
/// which then read disjoint parts of its data. `n == 1` returns `seq`
/// unchanged.
pub fn parallelize(seq: Seq, n: usize, sort: Option<&SortKey>) -> Result<Seq, CompileError> {
    match n {
        0 => {
            return Err(CompileError::internal(format!(
                "bad parallelization factor: {n}"
            )));
        }
        1 => return Ok(seq),
        n if n > MAX_PARALLELISM => {
            return Err(CompileError::internal(format!(
                "parallelization factor too big: {n}"
            )));
        }
        _ => {}
    }
    let leading_scan = seq.first().is_some_and(Op::is_scan);
    if let Some(op) = seq.first().filter(|op| leading_scan && !is_splittable(op)) {
        tracing::debug!(scan = op.kind(), "scan cannot be divided; not parallelizing");
        return Ok(seq);
    }
    let (scan, chain) = if leading_scan {
        let mut ops = seq.into_iter();
        (ops.next(), ops.collect::<Seq>())
    } else {
        (None, seq)
    };
    let quiet = matches!(scan, Some(Op::PoolScan { .. }));
    let Some(mut split) = plan(&chain, sort) else {
        return Ok(reassemble(scan, chain));
    };
    if let Some(scan) = scan {
        split.branch.insert(0, scan);
    }
    if split.branch.is_empty() {
        return Ok(split.tail);
    }
    if quiet {
        quiet_cuts(&mut split.branch);
    }
    tracing::debug!(
        n,
        branch = split.branch.len(),
        tail = split.tail.len(),
        merge_by = ?split.merge.key,
        "parallelized chain"
    );
    Ok(build(split, n))
}

/// Whether [`parallelize`] would change `seq`.
pub fn is_parallelizable(seq: &Seq, sort: Option<&SortKey>) -> bool {
    parallelize(seq.clone(), 2, sort).is_ok_and(|out| &out != seq)
}

fn reassemble(scan: Option<Op>, chain: Seq) -> Seq {
    scan.into_iter().chain(chain).collect()
}

/// Scans whose data the runtime can divide between paths.
fn is_splittable(op: &Op) -> bool {
    matches!(op, Op::PoolScan { .. } | Op::DefaultScan { .. })
}

/// Cuts inside a divided pool scan must not warn about missing fields once
/// per path.
fn quiet_cuts(ops: &mut Seq) {
    for op in ops.iter_mut() {
        if let Op::Cut { quiet, .. } = op {
            *quiet = true;
        }
    }
}

fn build(split: Split, n: usize) -> Seq {
    let Split {
        branch,
        mut tail,
        merge,
    } = split;
    if tail.is_empty() && merge.key.is_some() {
        // A fork at the end of a query feeds the output directly; the pass
        // gives the merge a place to happen.
        tail.push(Op::Pass);
    }
    let fork = Op::Fork {
        paths: vec![branch; n],
        merge_by: merge.key,
        merge_reverse: merge.reverse,
    };
    std::iter::once(fork).chain(tail).collect()
}

/// Finds the cut point. `None` means the chain stays as it is.
fn plan(chain: &[Op], sort: Option<&SortKey>) -> Option<Split> {
    let field = sort.and_then(SortKey::primary);
    let reverse = sort.is_some_and(SortKey::is_reversed);
    // An operator may scramble the input order when a sort or summarize
    // downstream reorders the data before anything depends on that order.
    let order_sensitive_after = |i: usize| {
        !matches!(
            chain[i + 1..].iter().find(|op| reorders(op) || depends_on_order(op)),
            Some(op) if reorders(op)
        )
    };
    let split_before = |i: usize, merge: Merge| {
        Some(Split {
            branch: chain[..i].to_vec(),
            tail: chain[i..].to_vec(),
            merge,
        })
    };
    let sorted_by = |f: &Path| Merge::on(f, reverse);

    for (i, op) in chain.iter().enumerate() {
        match op {
            Op::Filter { .. } | Op::Pass => continue,
            Op::Cut { args, .. } | Op::Pick { args } => {
                let Some(f) = field.filter(|_| order_sensitive_after(i)) else {
                    continue;
                };
                if !preserves(args, f) {
                    return split_before(i, sorted_by(f));
                }
            }
            Op::Drop { args } => {
                let Some(f) = field.filter(|_| order_sensitive_after(i)) else {
                    continue;
                };
                if args.iter().any(|e| e.as_path() == Some(f)) {
                    return split_before(i, sorted_by(f));
                }
            }
            Op::Put { args } | Op::Rename { args } => {
                let Some(f) = field.filter(|_| order_sensitive_after(i)) else {
                    continue;
                };
                if args.iter().any(|a| a.lhs.as_path() == Some(f)) {
                    return split_before(i, sorted_by(f));
                }
            }
            Op::Yield { .. } | Op::Explode { .. } | Op::Shape | Op::Over { body: None, .. } => {
                // Stateless, but the output no longer carries the input key.
                if let Some(f) = field.filter(|_| order_sensitive_after(i)) {
                    return split_before(i, sorted_by(f));
                }
            }
            Op::Summarize { keys, .. } => return Some(split_summarize(chain, i, keys, reverse)),
            Op::Sort {
                args,
                reverse: sort_reverse,
                ..
            } => {
                if args.len() == 1 {
                    let key = sort_key_of_sort(op)?;
                    let merge_key = key.primary()?;
                    return Some(Split {
                        branch: chain[..=i].to_vec(),
                        tail: chain[i + 1..].to_vec(),
                        merge: Merge::on(merge_key, key.is_reversed()),
                    });
                }
                return split_before(i, Merge::unordered(*sort_reverse));
            }
            Op::Top { .. } => return split_before(i, Merge { key: field.cloned(), reverse }),
            Op::Head { .. } | Op::Tail { .. } => {
                let f = field?;
                // One per path and one more after the merge.
                return Some(Split {
                    branch: chain[..=i].to_vec(),
                    tail: chain[i..].to_vec(),
                    merge: sorted_by(f),
                });
            }
            Op::Uniq { .. } | Op::Fuse => return split_before(i, sorted_by(field?)),
            _ => {
                tracing::debug!(op = op.kind(), "not parallelizing past operator");
                return None;
            }
        }
    }
    // No operator forced a merge. An ordered input can run the whole chain
    // in every path and merge at the end.
    let f = field?;
    Some(Split {
        branch: chain.to_vec(),
        tail: Vec::new(),
        merge: sorted_by(f),
    })
}

fn reorders(op: &Op) -> bool {
    matches!(op, Op::Sort { .. } | Op::Summarize { .. })
}

/// Operators whose output changes when their input is reordered.
fn depends_on_order(op: &Op) -> bool {
    matches!(
        op,
        Op::Uniq { .. } | Op::Head { .. } | Op::Tail { .. } | Op::Fuse
    )
}

/// True when a projection carries `key` through unchanged.
fn preserves(args: &[Assignment], key: &Path) -> bool {
    let mut found = false;
    for a in args {
        let lhs = a.lhs.as_path();
        let rhs = a.rhs.as_path();
        if lhs == Some(key) && rhs != Some(key) {
            return false;
        }
        if lhs == Some(key) && rhs == Some(key) {
            found = true;
        }
    }
    found
}

/// Runs the summarize in every path emitting partial results, then composes
/// them once after the merge.
fn split_summarize(chain: &[Op], i: usize, keys: &[Assignment], reverse: bool) -> Split {
    let mut branch = chain[..=i].to_vec();
    if let Some(Op::Summarize { partials_out, .. }) = branch.last_mut() {
        *partials_out = true;
    }
    let mut composer = chain[i].clone();
    if let Op::Summarize {
        keys, partials_in, ..
    } = &mut composer
    {
        *partials_in = true;
        // The paths computed the key expressions; the composer groups on
        // the fields they produced.
        for k in keys.iter_mut() {
            k.rhs = k.lhs.clone();
        }
    }
    let ts: Path = vec!["ts".to_string()];
    let merge = if keys.first().is_some_and(|k| is_every_key(k, &ts)) {
        Merge::on(&ts, reverse)
    } else {
        Merge::unordered(reverse)
    };
    let mut tail = vec![composer];
    tail.extend_from_slice(&chain[i + 1..]);
    Split {
        branch,
        tail,
        merge,
    }
}

/// The `ts := trunc(ts, d)` key an `every d` summarize carries.
fn is_every_key(a: &Assignment, ts: &Path) -> bool {
    matches!(&a.rhs, Expr::Call { name, .. } if name == "trunc") && is_key_of(a, ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::dag::{Order, SortExpr};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn ts() -> SortKey {
        SortKey::new(vec!["ts".into()], Order::Asc)
    }

    fn assign(lhs: &str, rhs: Expr) -> Assignment {
        Assignment {
            lhs: Expr::path([lhs]),
            rhs,
        }
    }

    fn count_by(key: Assignment) -> Op {
        Op::summarize(
            vec![key],
            vec![assign(
                "count",
                Expr::Agg {
                    name: "count".into(),
                    expr: None,
                    where_: None,
                },
            )],
        )
    }

    fn fork(paths: Vec<Seq>, merge_by: Option<&str>) -> Op {
        Op::Fork {
            paths,
            merge_by: merge_by.map(|f| vec![f.to_string()]),
            merge_reverse: false,
        }
    }

    #[test]
    fn uniq_merges_on_the_input_order() {
        let seq = vec![Op::Pass, Op::Uniq { cflag: false }];
        let out = parallelize(seq, 2, Some(&ts())).unwrap();
        assert_eq!(
            out,
            vec![
                fork(vec![vec![Op::Pass], vec![Op::Pass]], Some("ts")),
                Op::Uniq { cflag: false }
            ]
        );
    }

    #[test]
    fn single_key_sort_runs_in_every_path() {
        let sort = Op::sort_by(vec![Expr::path(["x"])], Order::Asc);
        let seq = vec![Op::Pass, sort.clone(), Op::Uniq { cflag: false }];
        let out = parallelize(seq, 2, Some(&ts())).unwrap();
        let path = vec![Op::Pass, sort];
        assert_eq!(
            out,
            vec![
                fork(vec![path.clone(), path], Some("x")),
                Op::Uniq { cflag: false }
            ]
        );
    }

    #[test]
    fn sort_without_keys_runs_after_an_unordered_merge() {
        let sort = Op::Sort {
            args: vec![],
            nulls_first: false,
            reverse: false,
        };
        let seq = vec![Op::Pass, sort.clone(), Op::Uniq { cflag: false }];
        let out = parallelize(seq, 2, Some(&ts())).unwrap();
        assert_eq!(
            out,
            vec![
                fork(vec![vec![Op::Pass], vec![Op::Pass]], None),
                sort,
                Op::Uniq { cflag: false }
            ]
        );
    }

    #[test]
    fn summarize_splits_into_partials() {
        let seq = vec![Op::Pass, count_by(assign("y", Expr::path(["y"])))];
        let out = parallelize(seq, 2, Some(&ts())).unwrap();
        let Op::Fork {
            paths, merge_by, ..
        } = &out[0]
        else {
            panic!("expected fork, got {:?}", out[0]);
        };
        assert_eq!(paths.len(), 2);
        assert_eq!(*merge_by, None);
        for path in paths {
            assert!(matches!(
                path.last(),
                Some(Op::Summarize {
                    partials_out: true,
                    partials_in: false,
                    ..
                })
            ));
        }
        assert!(matches!(
            out[1],
            Op::Summarize {
                partials_in: true,
                partials_out: false,
                ..
            }
        ));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn every_merges_on_ts_without_an_input_order() {
        let key = assign(
            "ts",
            Expr::call("trunc", vec![Expr::path(["ts"]), Expr::literal("1h")]),
        );
        let seq = vec![Op::Pass, count_by(key)];
        let out = parallelize(seq, 2, None).unwrap();
        assert!(matches!(&out[0], Op::Fork { merge_by: Some(p), .. } if p == &vec!["ts".to_string()]));
        let Op::Summarize { keys, .. } = &out[1] else {
            panic!("expected composer");
        };
        assert_eq!(keys[0].rhs, Expr::path(["ts"]));
    }

    #[test]
    fn head_runs_before_and_after_the_merge() {
        let seq = vec![
            Op::Put {
                args: vec![assign("a", Expr::literal("1"))],
            },
            Op::Tail { count: 1 },
        ];
        let out = parallelize(seq.clone(), 2, Some(&ts())).unwrap();
        assert_eq!(
            out,
            vec![
                fork(vec![seq.clone(), seq], Some("ts")),
                Op::Tail { count: 1 }
            ]
        );
        assert_eq!(
            parallelize(vec![Op::Head { count: 1 }], 2, None).unwrap(),
            vec![Op::Head { count: 1 }]
        );
    }

    #[test]
    fn writes_to_the_order_key_cut_the_chain() {
        let put = Op::Put {
            args: vec![assign("ts", Expr::path(["foo"]))],
        };
        let rename = Op::Rename {
            args: vec![assign("foo", Expr::path(["boo"]))],
        };
        let seq = vec![Op::Pass, put.clone(), rename.clone()];
        let out = parallelize(seq, 2, Some(&ts())).unwrap();
        assert_eq!(
            out,
            vec![
                fork(vec![vec![Op::Pass], vec![Op::Pass]], Some("ts")),
                put,
                rename
            ]
        );
    }

    #[test]
    fn a_full_chain_gets_a_trailing_pass() {
        let cut = Op::Cut {
            args: vec![
                assign("ts", Expr::path(["ts"])),
                assign("y", Expr::path(["y"])),
            ],
            quiet: false,
        };
        let seq = vec![Op::Pass, cut];
        let out = parallelize(seq.clone(), 2, Some(&ts())).unwrap();
        assert_eq!(out, vec![fork(vec![seq.clone(), seq], Some("ts")), Op::Pass]);
    }

    #[test]
    fn unknown_order_blocks_order_dependent_ops() {
        let seq = vec![Op::Pass, Op::Uniq { cflag: false }];
        assert!(!is_parallelizable(&seq, None));
        assert!(is_parallelizable(&seq, Some(&ts())));
        let join = vec![Op::Join {
            style: "inner".into(),
            left_key: Expr::path(["a"]),
            right_key: Expr::path(["a"]),
            args: vec![],
        }];
        assert!(!is_parallelizable(&join, Some(&ts())));
    }

    #[test]
    fn parallelism_bounds() {
        let seq = vec![Op::Pass, Op::Uniq { cflag: false }];
        assert_eq!(parallelize(seq.clone(), 1, Some(&ts())).unwrap(), seq);
        assert!(parallelize(seq.clone(), 0, None).is_err());
        assert!(parallelize(seq, MAX_PARALLELISM + 1, None).is_err());
    }

    #[test]
    fn pool_scans_lead_every_path() {
        let scan = Op::PoolScan {
            id: Uuid::nil(),
            commit: Uuid::nil(),
            filter: None,
            key_pruner: None,
            fields: None,
        };
        let cut = Op::Cut {
            args: vec![assign("ts", Expr::path(["ts"]))],
            quiet: false,
        };
        let out = parallelize(
            vec![scan.clone(), cut, Op::Uniq { cflag: false }],
            3,
            Some(&ts()),
        )
        .unwrap();
        let quiet = Op::Cut {
            args: vec![assign("ts", Expr::path(["ts"]))],
            quiet: true,
        };
        let path = vec![scan, quiet];
        assert_eq!(
            out,
            vec![
                fork(vec![path.clone(), path.clone(), path], Some("ts")),
                Op::Uniq { cflag: false }
            ]
        );
    }

    #[test]
    fn file_scans_are_not_divided() {
        let seq = vec![
            Op::FileScan {
                path: "x.zson".into(),
                format: None,
                sort_key: None,
                filter: None,
                fields: None,
            },
            Op::Uniq { cflag: false },
        ];
        assert_eq!(parallelize(seq.clone(), 2, Some(&ts())).unwrap(), seq);
    }

    #[test]
    fn descending_sort_merges_in_reverse() {
        let sort = Op::Sort {
            args: vec![SortExpr {
                key: Expr::path(["x"]),
                order: Order::Desc,
            }],
            nulls_first: false,
            reverse: false,
        };
        let out = parallelize(vec![sort], 2, None).unwrap();
        assert!(matches!(out[0], Op::Fork { merge_reverse: true, .. }));
        assert_eq!(out[1], Op::Pass);
    }
}
