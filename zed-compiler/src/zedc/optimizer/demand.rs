//! Column demand: which top-level fields a scan must read so the rest of
//! the query sees the same values.
//!
//! The walk runs downstream from the scan until it reaches a boundary, an
//! operator whose output is fully determined by a known set of input fields
//! (`cut`, `pick`, `summarize`, `yield`, `explode`). Operators before the
//! boundary add the fields they read. Reaching the end of the chain, or any
//! operator that may read fields it cannot name, demands every column.

use crate::zedc::dag::{Expr, Op, Path};
use std::collections::BTreeSet;

/// Top-level field names, or `None` for every field.
pub type Demand = Option<BTreeSet<String>>;

enum Step {
    /// Keep walking.
    Next,
    /// A boundary: the demand so far is complete.
    Done,
    /// Every column is needed.
    All,
}

#[derive(Default)]
struct Columns(BTreeSet<String>);

impl Columns {
    /// Adds the fields `e` reads; false when they cannot all be named.
    fn add(&mut self, e: &Expr) -> bool {
        let set = &mut self.0;
        e.walk_fields(&mut |p: &Path| {
            if let Some(top) = p.first() {
                set.insert(top.clone());
            }
        })
    }

    fn add_all<'e>(&mut self, exprs: impl IntoIterator<Item = &'e Expr>) -> bool {
        exprs.into_iter().all(|e| self.add(e))
    }
}

/// Computes the demand of the chain that follows a scan.
pub fn demand(ops: &[Op]) -> Demand {
    let mut cols = Columns::default();
    for op in ops {
        match step(op, &mut cols) {
            Step::Next => continue,
            Step::Done => return Some(cols.0),
            Step::All => return None,
        }
    }
    None
}

fn step(op: &Op, cols: &mut Columns) -> Step {
    let named = |ok: bool, then: Step| if ok { then } else { Step::All };
    match op {
        Op::Cut { args, .. } | Op::Pick { args } => {
            named(cols.add_all(args.iter().map(|a| &a.rhs)), Step::Done)
        }
        Op::Summarize { keys, aggs, .. } => named(
            cols.add_all(keys.iter().chain(aggs).map(|a| &a.rhs)),
            Step::Done,
        ),
        Op::Yield { exprs } => named(cols.add_all(exprs), Step::Done),
        Op::Explode { args, .. } => named(cols.add_all(args), Step::Done),
        Op::Filter { expr } => named(cols.add(expr), Step::Next),
        Op::Put { args } | Op::Rename { args } => {
            named(cols.add_all(args.iter().map(|a| &a.rhs)), Step::Next)
        }
        Op::Sort { args, .. } if !args.is_empty() => {
            named(cols.add_all(args.iter().map(|s| &s.key)), Step::Next)
        }
        Op::Top { args, .. } if !args.is_empty() => named(cols.add_all(args), Step::Next),
        Op::Head { .. } | Op::Tail { .. } | Op::Pass | Op::Drop { .. } => Step::Next,
        _ => Step::All,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zedc::dag::{Assignment, Order};

    fn set(names: &[&str]) -> Demand {
        Some(names.iter().map(|s| s.to_string()).collect())
    }

    fn assign(lhs: &str, rhs: Expr) -> Assignment {
        Assignment {
            lhs: Expr::path([lhs]),
            rhs,
        }
    }

    #[test]
    fn put_filter_cut() {
        let ops = vec![
            Op::Put {
                args: vec![assign("x", Expr::path(["y"]))],
            },
            Op::filter(Expr::binary(">", Expr::path(["x"]), Expr::literal("1"))),
            Op::Cut {
                args: vec![assign("x", Expr::path(["x"]))],
                quiet: false,
            },
        ];
        assert_eq!(demand(&ops), set(&["x", "y"]));
    }

    #[test]
    fn nested_paths_demand_their_top_level_field() {
        let ops = vec![Op::Cut {
            args: vec![assign("b", Expr::path(["a", "b"]))],
            quiet: false,
        }];
        assert_eq!(demand(&ops), set(&["a"]));
    }

    #[test]
    fn no_boundary_reads_everything() {
        assert_eq!(demand(&[Op::Head { count: 1 }]), None);
        assert_eq!(demand(&[]), None);
        assert_eq!(demand(&[Op::Uniq { cflag: false }]), None);
    }

    #[test]
    fn search_over_this_reads_everything() {
        let search = Expr::Search {
            text: "foo".into(),
            value: "\"foo\"".into(),
            expr: Box::new(Expr::this()),
        };
        let ops = vec![
            Op::filter(search),
            Op::Cut {
                args: vec![assign("x", Expr::path(["x"]))],
                quiet: false,
            },
        ];
        assert_eq!(demand(&ops), None);
    }

    #[test]
    fn aggregations_are_boundaries() {
        let ops = vec![
            Op::sort_by(vec![Expr::path(["ts"])], Order::Asc),
            Op::summarize(
                vec![assign("y", Expr::path(["y"]))],
                vec![assign(
                    "s",
                    Expr::Agg {
                        name: "sum".into(),
                        expr: Some(Box::new(Expr::path(["v"]))),
                        where_: Some(Box::new(Expr::binary(
                            "==",
                            Expr::path(["k"]),
                            Expr::literal("1"),
                        ))),
                    },
                )],
            ),
            Op::Shape,
        ];
        assert_eq!(demand(&ops), set(&["k", "ts", "v", "y"]));
    }

    #[test]
    fn count_reads_no_columns() {
        let ops = vec![Op::summarize(
            vec![],
            vec![assign(
                "count",
                Expr::Agg {
                    name: "count".into(),
                    expr: None,
                    where_: None,
                },
            )],
        )];
        assert_eq!(demand(&ops), Some(BTreeSet::new()));
    }
}
