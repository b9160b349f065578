//! Sort order analysis.
//!
//! Two flavors live here. [`set_input_sort_dir`] walks a chain under a known
//! input order and tells each `Summarize` whether its input arrives sorted by
//! its first key. [`propagate`] maps the order entering one operator to the
//! order leaving it, which the parallelizer and `describe` build on.

use crate::zedc::{
    analyzer::builtins::is_order_preserving,
    dag::{Assignment, Expr, Op, Order, Path, SortKey},
};
use std::collections::BTreeSet;

/// Sets `input_sort_dir` on every `Summarize` of `ops` whose input is sorted
/// by `key` and returns whether the output of the whole chain is still
/// sorted by `key`. The walk stops at the first operator that loses the order.
pub fn set_input_sort_dir(ops: &mut [Op], key: &Path, order: Order) -> bool {
    for op in ops.iter_mut() {
        if !set_op_sort_dir(op, key, order) {
            return false;
        }
    }
    true
}

fn set_op_sort_dir(op: &mut Op, key: &Path, order: Order) -> bool {
    match op {
        Op::Cut { args, .. } | Op::Pick { args } => args.iter().any(|a| keeps(a, key)),
        Op::Drop { args } => !args.iter().any(|e| e.as_path() == Some(key)),
        Op::Put { args } => !args.iter().any(|a| a.lhs.as_path() == Some(key)),
        Op::Summarize {
            keys,
            input_sort_dir,
            ..
        } => {
            if keys.first().is_some_and(|k| is_key_of(k, key)) {
                *input_sort_dir = direction(order);
                true
            } else {
                false
            }
        }
        Op::Filter { .. }
        | Op::Head { .. }
        | Op::Pass
        | Op::Uniq { .. }
        | Op::Tail { .. }
        | Op::Fuse => true,
        _ => false,
    }
}

/// `input_sort_dir` for a summarize whose input is in `order`.
pub fn direction(order: Order) -> i32 {
    match order {
        Order::Asc => 1,
        Order::Desc => -1,
    }
}

/// True when the assignment copies `key` to itself.
fn keeps(a: &Assignment, key: &Path) -> bool {
    a.lhs.as_path() == Some(key) && a.rhs.as_path() == Some(key)
}

/// True when a group-by key writes `key` from `key` itself or from an
/// order-preserving function of it, such as the `trunc(ts, 1h)` of `every`.
pub fn is_key_of(a: &Assignment, key: &Path) -> bool {
    if a.lhs.as_path() != Some(key) {
        return false;
    }
    if a.rhs.as_path() == Some(key) {
        return true;
    }
    match &a.rhs {
        Expr::Call { name, args } => {
            is_order_preserving(name) && args.first().and_then(Expr::as_path) == Some(key)
        }
        _ => false,
    }
}

/// True when some key of the summarize preserves the primary key of `sort`.
pub fn is_key_of_summarize(keys: &[Assignment], sort: &SortKey) -> bool {
    sort.primary()
        .is_some_and(|key| keys.iter().any(|k| is_key_of(k, key)))
}

/// The key a sort operator orders its output by, when it has exactly one
/// field key.
pub fn sort_key_of_sort(op: &Op) -> Option<SortKey> {
    let Op::Sort { args, reverse, .. } = op else {
        return None;
    };
    let [arg] = args.as_slice() else {
        return None;
    };
    let path = arg.key.as_path()?;
    let order = match (arg.order, *reverse) {
        (o, false) => o,
        (Order::Asc, true) => Order::Desc,
        (Order::Desc, true) => Order::Asc,
    };
    Some(SortKey::new(path.clone(), order))
}

/// The order leaving `op` given the order entering it.
pub fn propagate(op: &Op, input: Option<&SortKey>) -> Option<SortKey> {
    if let Op::Sort { .. } = op {
        return sort_key_of_sort(op);
    }
    let input = input?;
    let key = input.primary()?;
    match op {
        Op::Filter { .. }
        | Op::Head { .. }
        | Op::Pass
        | Op::Uniq { .. }
        | Op::Tail { .. }
        | Op::Fuse => Some(input.clone()),
        Op::Cut { args, .. } | Op::Pick { args } => propagate_cut(args, input),
        Op::Drop { args } => {
            if args.iter().any(|e| e.as_path() == Some(key)) {
                None
            } else {
                Some(input.clone())
            }
        }
        Op::Rename { args } => {
            let mut out = input.clone();
            for a in args {
                if a.rhs.as_path() == Some(key) {
                    out = SortKey::new(a.lhs.as_path()?.clone(), input.order);
                }
            }
            Some(out)
        }
        Op::Summarize { keys, .. } => {
            is_key_of_summarize(keys, input).then(|| input.clone())
        }
        Op::Put { args } => {
            if args.iter().any(|a| a.lhs.as_path() == Some(key)) {
                None
            } else {
                Some(input.clone())
            }
        }
        _ => None,
    }
}

/// Tracks which output fields carry the input order through a projection.
/// More than one survivor, or an assignment whose data flow can't be named,
/// loses the order.
fn propagate_cut(args: &[Assignment], input: &SortKey) -> Option<SortKey> {
    let key = input.primary()?;
    let mut ordered: BTreeSet<Path> = BTreeSet::from([key.clone()]);
    for a in args {
        let lhs = a.lhs.as_path()?;
        match a.rhs.as_path() {
            Some(rhs) if !rhs.is_empty() => {
                if ordered.contains(rhs) {
                    ordered.insert(lhs.clone());
                } else {
                    ordered.remove(lhs);
                }
            }
            _ => {
                let mut depends_on_order = false;
                let known = a
                    .rhs
                    .walk_fields(&mut |p| depends_on_order |= ordered.contains(p));
                if !known || depends_on_order {
                    return None;
                }
                ordered.remove(lhs);
            }
        }
    }
    // A projection drops every field it does not name.
    ordered.retain(|p| args.iter().any(|a| a.lhs.as_path() == Some(p)));
    match ordered.len() {
        1 => ordered
            .into_iter()
            .next()
            .map(|p| SortKey::new(p, input.order)),
        _ => None,
    }
}

/// Runs [`propagate`] over a chain.
pub fn propagate_seq(ops: &[Op], input: Option<SortKey>) -> Option<SortKey> {
    ops.iter()
        .fold(input, |key, op| propagate(op, key.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::dag::SortExpr;
    use pretty_assertions::assert_eq;

    fn ts() -> Path {
        vec!["ts".to_string()]
    }

    fn assign(lhs: &str, rhs: Expr) -> Assignment {
        Assignment {
            lhs: Expr::path([lhs]),
            rhs,
        }
    }

    fn every_key() -> Assignment {
        assign(
            "ts",
            Expr::call("trunc", vec![Expr::path(["ts"]), Expr::literal("1h")]),
        )
    }

    #[test]
    fn every_marks_summarize_input_sorted() {
        let mut ops = vec![
            Op::filter(Expr::literal("true")),
            Op::summarize(
                vec![every_key()],
                vec![assign(
                    "count",
                    Expr::Agg {
                        name: "count".into(),
                        expr: None,
                        where_: None,
                    },
                )],
            ),
        ];
        assert!(set_input_sort_dir(&mut ops, &ts(), Order::Asc));
        assert!(matches!(ops[1], Op::Summarize { input_sort_dir: 1, .. }));
    }

    #[test]
    fn descending_input_sets_negative_direction() {
        let mut ops = vec![Op::summarize(vec![assign("ts", Expr::path(["ts"]))], vec![])];
        assert!(set_input_sort_dir(&mut ops, &ts(), Order::Desc));
        assert!(matches!(ops[0], Op::Summarize { input_sort_dir: -1, .. }));
    }

    #[test]
    fn writes_to_the_key_lose_order() {
        let mut ops = vec![
            Op::Put {
                args: vec![assign("ts", Expr::path(["x"]))],
            },
            Op::summarize(vec![assign("ts", Expr::path(["ts"]))], vec![]),
        ];
        assert!(!set_input_sort_dir(&mut ops, &ts(), Order::Asc));
        assert!(matches!(ops[1], Op::Summarize { input_sort_dir: 0, .. }));

        let mut dropped = vec![Op::Drop {
            args: vec![Expr::path(["ts"])],
        }];
        assert!(!set_input_sort_dir(&mut dropped, &ts(), Order::Asc));

        let mut cut = vec![Op::Cut {
            args: vec![assign("x", Expr::path(["x"]))],
            quiet: false,
        }];
        assert!(!set_input_sort_dir(&mut cut, &ts(), Order::Asc));
    }

    #[test]
    fn prefix_of_a_sorted_chain_is_sorted() {
        let chain = vec![
            Op::filter(Expr::literal("true")),
            Op::Head { count: 5 },
            Op::Uniq { cflag: false },
            Op::Sort {
                args: vec![],
                nulls_first: false,
                reverse: false,
            },
        ];
        for n in 0..chain.len() {
            let mut prefix = chain[..n].to_vec();
            assert!(set_input_sort_dir(&mut prefix, &ts(), Order::Asc));
        }
        assert!(!set_input_sort_dir(&mut chain.clone(), &ts(), Order::Asc));
    }

    #[test]
    fn sort_sets_a_new_order() {
        let sort = Op::Sort {
            args: vec![SortExpr {
                key: Expr::path(["x"]),
                order: Order::Asc,
            }],
            nulls_first: false,
            reverse: true,
        };
        assert_eq!(
            propagate(&sort, None),
            Some(SortKey::new(vec!["x".into()], Order::Desc))
        );
        let by_two = Op::sort_by(vec![Expr::path(["x"]), Expr::path(["y"])], Order::Asc);
        assert_eq!(sort_key_of_sort(&by_two), None);
    }

    #[test]
    fn renames_carry_the_order() {
        let input = SortKey::new(ts(), Order::Asc);
        let rename = Op::Rename {
            args: vec![assign("time", Expr::path(["ts"]))],
        };
        assert_eq!(
            propagate(&rename, Some(&input)),
            Some(SortKey::new(vec!["time".into()], Order::Asc))
        );
    }

    #[test]
    fn cuts_track_the_ordered_field() {
        let input = SortKey::new(ts(), Order::Asc);
        let kept = vec![assign("ts", Expr::path(["ts"])), assign("foo", Expr::path(["x"]))];
        assert_eq!(propagate_cut(&kept, &input), Some(input.clone()));

        let aliased = vec![assign("t", Expr::path(["ts"]))];
        assert_eq!(
            propagate_cut(&aliased, &input),
            Some(SortKey::new(vec!["t".into()], Order::Asc))
        );

        let both = vec![assign("ts", Expr::path(["ts"])), assign("t", Expr::path(["ts"]))];
        assert_eq!(propagate_cut(&both, &input), None);

        let computed = vec![
            assign("ts", Expr::path(["ts"])),
            assign("n", Expr::call("len", vec![Expr::path(["ts"])])),
        ];
        assert_eq!(propagate_cut(&computed, &input), None);
    }

    #[test]
    fn chains_fold_left_to_right() {
        let ops = vec![
            Op::Pass,
            Op::sort_by(vec![Expr::path(["x"])], Order::Asc),
            Op::Uniq { cflag: false },
        ];
        assert_eq!(
            propagate_seq(&ops, Some(SortKey::new(ts(), Order::Asc))),
            Some(SortKey::new(vec!["x".into()], Order::Asc))
        );
        assert_eq!(propagate_seq(&[Op::Shape], Some(SortKey::new(ts(), Order::Asc))), None);
    }
}
