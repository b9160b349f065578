use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use zed_compiler::zedc::{
    analyzer::{analyze, analyze_add_source, errors::CompileError},
    compiler::{
        job::{Job, compile},
        source::NoLake,
    },
    dag::{Assignment, Expr, Op, Order, Path, Seq, SortKey},
    optimizer::{Optimizer, demand::demand},
    parser::ZedParser,
    printer::format_dag,
    zed::Context,
};

fn path(p: &str) -> Path {
    p.split('.').map(str::to_string).collect()
}

fn ts() -> SortKey {
    SortKey::new(path("ts"), Order::Asc)
}

/// Analyzes `query` with the runtime-bound input, optimizes it and splits it
/// `n` ways assuming the input is ordered by `ts`.
fn parallel(query: &str, n: usize) -> Seq {
    let zctx = Context::new();
    let cancel = CancellationToken::new();
    let seq = ZedParser::parse_query(query).unwrap();
    let entry = analyze_add_source(&zctx, &seq, &NoLake, None, &cancel).unwrap();
    let opt = Optimizer::new(&NoLake, &cancel).with_default_sort(Some(ts()));
    let entry = opt.optimize(entry).unwrap();
    opt.parallelize(entry, n).unwrap()
}

fn reader() -> Op {
    Op::DefaultScan { filter: None }
}

fn split(seq: &Seq) -> (&Vec<Seq>, Option<&Path>, &[Op]) {
    match seq.as_slice() {
        [
            Op::Fork {
                paths, merge_by, ..
            },
            rest @ ..,
        ] => (paths, merge_by.as_ref(), rest),
        other => panic!("expected a fork, got {other:?}"),
    }
}

fn count_by(keys: Vec<Assignment>) -> Op {
    Op::summarize(
        keys,
        vec![Assignment {
            lhs: Expr::path(["count"]),
            rhs: Expr::Agg {
                name: "count".into(),
                expr: None,
                where_: None,
            },
        }],
    )
}

fn key(name: &str) -> Assignment {
    Assignment {
        lhs: Expr::path([name]),
        rhs: Expr::path([name]),
    }
}

#[test]
fn uniq_runs_after_a_merge_on_ts() {
    let out = parallel("* | uniq", 2);
    let (paths, merge_by, rest) = split(&out);
    assert_eq!(paths, &vec![vec![reader(), Op::Pass]; 2]);
    assert_eq!(merge_by, Some(&path("ts")));
    assert_eq!(rest, &[Op::Uniq { cflag: false }]);
}

#[test]
fn a_sort_runs_in_every_path_and_sets_the_merge_key() {
    let out = parallel("* | sort x | uniq", 2);
    let (paths, merge_by, rest) = split(&out);
    let sort = Op::sort_by(vec![Expr::path(["x"])], Order::Asc);
    assert_eq!(paths, &vec![vec![reader(), Op::Pass, sort]; 2]);
    assert_eq!(merge_by, Some(&path("x")));
    assert_eq!(rest, &[Op::Uniq { cflag: false }]);
}

#[test]
fn key_dropping_ops_stay_after_the_merge_when_an_order_dependent_op_follows() {
    for query in ["* | cut y | uniq | sort x", "* | yield {a:1} | uniq | sort x"] {
        let out = parallel(query, 2);
        let (paths, merge_by, rest) = split(&out);
        assert_eq!(paths, &vec![vec![reader(), Op::Pass]; 2], "{query}");
        assert_eq!(merge_by, Some(&path("ts")), "{query}");
        let kinds: Vec<&str> = rest.iter().map(Op::kind).collect();
        assert_eq!(kinds[1..], ["Uniq", "Sort"], "{query}");
    }

    // A sort ahead of the order-dependent op frees the cut to run in every path.
    let out = parallel("* | cut y | sort x | uniq", 2);
    let (paths, merge_by, rest) = split(&out);
    assert_eq!(paths[0].len(), 4);
    assert_eq!(merge_by, Some(&path("x")));
    assert_eq!(rest, &[Op::Uniq { cflag: false }]);
}

#[test]
fn summarize_splits_into_partials() {
    let out = parallel("* | count() by y", 2);
    let (paths, merge_by, rest) = split(&out);
    let mut partial = count_by(vec![key("y")]);
    if let Op::Summarize { partials_out, .. } = &mut partial {
        *partials_out = true;
    }
    let mut combine = count_by(vec![key("y")]);
    if let Op::Summarize { partials_in, .. } = &mut combine {
        *partials_in = true;
    }
    assert_eq!(paths, &vec![vec![reader(), Op::Pass, partial]; 2]);
    assert_eq!(merge_by, None);
    assert_eq!(rest, &[combine]);
}

#[test]
fn every_puts_the_time_key_first_and_merges_on_ts() {
    let out = parallel("* | every 1h count() by y", 2);
    let (paths, merge_by, rest) = split(&out);
    assert_eq!(paths.len(), 2);
    assert_eq!(merge_by, Some(&path("ts")));
    let Some(Op::Summarize {
        keys, partials_out, ..
    }) = paths[0].last()
    else {
        panic!("expected a summarize ending each path, got {:?}", paths[0]);
    };
    assert!(partials_out);
    assert_eq!(
        keys[0],
        Assignment {
            lhs: Expr::path(["ts"]),
            rhs: Expr::call("trunc", vec![Expr::path(["ts"]), Expr::literal("1h")]),
        }
    );
    assert_eq!(keys[1], key("y"));

    // The composer groups on the fields the paths produced.
    let Some(Op::Summarize {
        keys, partials_in, ..
    }) = rest.first()
    else {
        panic!("expected a summarize after the merge, got {rest:?}");
    };
    assert!(partials_in);
    assert_eq!(keys[..], [key("ts"), key("y")]);
}

#[test]
fn demand_reaches_back_through_put() {
    let zctx = Context::new();
    let cancel = CancellationToken::new();
    let seq = ZedParser::parse_query("put x=y | filter x > 1 | cut x").unwrap();
    let chain = analyze(&zctx, &seq, &NoLake, None, &cancel).unwrap();
    let cols = demand(&chain).expect("demand should be known");
    assert_eq!(
        cols.into_iter().collect::<Vec<_>>(),
        vec!["x".to_string(), "y".to_string()]
    );

    let file = ZedParser::parse_query("file a.json | put x=y | filter x > 1 | cut x").unwrap();
    let entry = analyze(&zctx, &file, &NoLake, None, &cancel).unwrap();
    let entry = Optimizer::new(&NoLake, &cancel).optimize(entry).unwrap();
    let Op::FileScan { fields, filter, .. } = &entry[0] else {
        panic!("expected a file scan, got {entry:?}");
    };
    assert_eq!(fields, &Some(vec![path("x"), path("y")]));
    assert_eq!(filter, &None);
}

#[test]
fn sql_group_by_with_having_lowers_to_a_pipeline() {
    let out = compile(
        &Context::new(),
        "SELECT a, count(*) FROM T GROUP BY a HAVING count(*) > 3",
        &NoLake,
        None,
        1,
        &CancellationToken::new(),
    )
    .unwrap();
    let kinds: Vec<&str> = out.iter().map(Op::kind).collect();
    assert_eq!(kinds, vec!["FileScan", "Summarize", "Filter", "Cut"]);
    assert_eq!(
        out[2],
        Op::filter(Expr::binary(">", Expr::path(["count_star"]), Expr::literal("3")))
    );
    let Op::Summarize { keys, aggs, .. } = &out[1] else {
        panic!("expected a summarize, got {out:?}");
    };
    assert_eq!(keys, &vec![key("a")]);
    assert_eq!(aggs[0].lhs, Expr::path(["count_star"]));
    let Op::Cut { args, .. } = &out[3] else {
        panic!("expected a cut, got {out:?}");
    };
    assert_eq!(args, &vec![key("a"), key("count_star")]);

    let err = compile(
        &Context::new(),
        "SELECT a, count(*) FROM T",
        &NoLake,
        None,
        1,
        &CancellationToken::new(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("without a GROUP BY"), "{err}");
}

#[test]
fn negative_head_is_an_eval_error() {
    let err = compile(
        &Context::new(),
        "head -1",
        &NoLake,
        None,
        1,
        &CancellationToken::new(),
    )
    .unwrap_err();
    let first = err.first().expect("one error");
    assert!(matches!(first, CompileError::Eval { .. }), "{first:?}");
    assert_eq!(first.to_string(), "head count must be a positive integer");
    assert!(first.loc().is_some());
}

#[test]
fn cancelled_compiles_are_interrupted() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = compile(&Context::new(), "pass | uniq", &NoLake, None, 1, &cancel).unwrap_err();
    assert!(err.iter().any(|e| matches!(e, CompileError::Interrupted)));
}

#[test]
fn job_output_prints_as_a_pipeline() {
    let zctx = Context::new();
    let cancel = CancellationToken::new();
    let seq = ZedParser::parse_query("* | uniq").unwrap();
    let mut job = Job::new(&zctx, &seq, &NoLake, None, &cancel)
        .unwrap()
        .with_default_sort(Some(ts()));
    job.optimize().unwrap();
    job.parallelize(2).unwrap();
    assert_eq!(
        format_dag(job.entry()),
        "fork (\n  => reader\n  | pass\n  => reader\n  | pass\n) merge ts:asc\n| uniq"
    );
}
