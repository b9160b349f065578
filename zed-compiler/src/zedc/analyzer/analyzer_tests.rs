use super::*;
use crate::zedc::{
    compiler::source::{MemoryLake, NoLake, PoolEntry},
    dag::{Assignment, Expr, Op, SortKey},
    parser::ZedParser,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use uuid::Uuid;

fn parse(q: &str) -> ast::Seq {
    match ZedParser::parse_query(q) {
        Ok(seq) => seq,
        Err(e) => panic!("{q:?}: {e}"),
    }
}

fn sem(q: &str) -> Result<dag::Seq, ErrorList> {
    let zctx = Context::new();
    analyze(&zctx, &parse(q), &NoLake, None, &CancellationToken::new())
}

fn first_error(q: &str) -> CompileError {
    match sem(q) {
        Ok(seq) => panic!("{q:?} analyzed to {seq:?}"),
        Err(errs) => errs.first().cloned().unwrap(),
    }
}

fn assign(lhs: &str, rhs: Expr) -> Assignment {
    Assignment {
        lhs: Expr::path([lhs]),
        rhs,
    }
}

fn count() -> Expr {
    Expr::Agg {
        name: "count".into(),
        expr: None,
        where_: None,
    }
}

struct Lake {
    lake: MemoryLake,
    logs: Uuid,
    main: Uuid,
}

fn lake() -> Lake {
    let mut lake = MemoryLake::new();
    let (logs, main) = (Uuid::new_v4(), Uuid::new_v4());
    for (name, id) in [("logs", logs), ("b1", Uuid::new_v4()), ("b2", Uuid::new_v4())] {
        lake.add_pool(PoolEntry {
            name: name.into(),
            id,
            sort_key: SortKey::new(vec!["ts".into()], dag::Order::Desc),
            branches: BTreeMap::from([("main".to_string(), main)]),
        })
        .unwrap();
    }
    Lake { lake, logs, main }
}

#[test]
fn put_filter_cut() {
    assert_eq!(
        sem("put x=y | filter x > 1 | cut x").unwrap(),
        vec![
            Op::Put {
                args: vec![assign("x", Expr::path(["y"]))]
            },
            Op::filter(Expr::binary(">", Expr::path(["x"]), Expr::literal("1"))),
            Op::Cut {
                args: vec![assign("x", Expr::path(["x"]))],
                quiet: false
            },
        ]
    );
}

#[test]
fn match_all_is_a_true_filter() {
    assert_eq!(
        sem("* | uniq").unwrap(),
        vec![Op::filter(Expr::literal("true")), Op::Uniq { cflag: false }]
    );
}

#[test]
fn head_count_must_be_positive() {
    let err = first_error("head -1");
    assert!(matches!(err, CompileError::Eval { .. }));
    assert_eq!(err.to_string(), "head count must be a positive integer");
    assert_eq!(sem("head").unwrap(), vec![Op::Head { count: 1 }]);
    assert_eq!(sem("tail 2+3").unwrap(), vec![Op::Tail { count: 5 }]);
}

#[test]
fn each_top_level_operator_reports_its_own_error() {
    let errs = sem("head -1 | pass | tail 0").unwrap_err();
    assert_eq!(errs.len(), 2);
    assert!(errs.iter().all(|e| e.loc().is_some()));
}

#[test]
fn every_adds_a_time_bucket_key() {
    let seq = sem("every 1h count() by y").unwrap();
    let Op::Summarize { keys, aggs, .. } = &seq[0] else {
        panic!("{seq:?}");
    };
    assert_eq!(
        keys,
        &vec![
            assign(
                "ts",
                Expr::call("trunc", vec![Expr::path(["ts"]), Expr::literal("1h")])
            ),
            assign("y", Expr::path(["y"])),
        ]
    );
    assert_eq!(aggs, &vec![assign("count", count())]);
}

#[test]
fn bare_aggregation_yields_its_value() {
    assert_eq!(
        sem("count()").unwrap(),
        vec![
            Op::summarize(Vec::new(), vec![assign("count", count())]),
            Op::Yield {
                exprs: vec![Expr::path(["count"])]
            },
        ]
    );
}

#[test]
fn assignment_lists_must_not_mix() {
    assert!(matches!(&sem("c:=count()").unwrap()[0], Op::Summarize { .. }));
    assert!(matches!(&sem("x:=1").unwrap()[0], Op::Put { .. }));
    assert_eq!(
        first_error("x:=1, c:=count()").to_string(),
        "mix of aggregations and non-aggregations in assignment list"
    );
}

#[test]
fn bare_expressions_filter_or_yield() {
    assert!(matches!(&sem("x > 1").unwrap()[0], Op::Filter { .. }));
    assert!(matches!(&sem("has(x)").unwrap()[0], Op::Filter { .. }));
    assert!(matches!(&sem("len(x)").unwrap()[0], Op::Yield { .. }));
}

#[test]
fn rename_shapes() {
    assert_eq!(
        sem("rename c := a").unwrap(),
        vec![Op::Rename {
            args: vec![assign("c", Expr::path(["a"]))]
        }]
    );
    assert_eq!(
        first_error("rename c := a.b").to_string(),
        "cannot rename a.b to c"
    );
    assert_eq!(
        first_error("rename x.c := y.b").to_string(),
        "cannot rename y.b to x.c (differ in y vs x)"
    );
    assert_eq!(
        first_error("rename c := 1").to_string(),
        "'rename' requires explicit field references"
    );
}

#[test]
fn sort_direction() {
    let seq = sem("sort -r x").unwrap();
    let Op::Sort { args, reverse, .. } = &seq[0] else {
        panic!("{seq:?}");
    };
    assert!(*reverse);
    assert_eq!(args[0].order, dag::Order::Desc);
}

#[test]
fn switch_without_expression_defaults_to_true() {
    let seq = sem("switch ( case x > 1 => pass default => head 1 )").unwrap();
    let Op::Switch { expr: None, cases } = &seq[0] else {
        panic!("{seq:?}");
    };
    assert_eq!(cases[1].expr, Some(Expr::literal("true")));
    let seq = sem("switch x ( case 1 => pass default => pass )").unwrap();
    let Op::Switch { expr: Some(_), cases } = &seq[0] else {
        panic!("{seq:?}");
    };
    assert_eq!(cases[1].expr, None);
}

#[test]
fn join_with_right_input_forks() {
    let seq = sem("left join (file b.json) on a=b c:=d").unwrap();
    assert_eq!(seq.len(), 2);
    let Op::Fork { paths, .. } = &seq[0] else {
        panic!("{seq:?}");
    };
    assert_eq!(paths[0], vec![Op::Pass]);
    assert!(matches!(&paths[1][0], Op::FileScan { path, .. } if path == "b.json"));
    assert!(matches!(&seq[1], Op::Join { style, .. } if style == "left"));
}

#[test]
fn over_with_locals_needs_a_body() {
    assert!(matches!(
        &sem("over a with x=b => ( yield x )").unwrap()[0],
        Op::Over { defs, body: Some(_), .. } if defs.len() == 1
    ));
}

#[test]
fn sql_group_by_with_having() {
    let seq = sem("SELECT a, count(*) FROM T GROUP BY a HAVING count(*) > 3").unwrap();
    assert_eq!(
        seq,
        vec![
            Op::FileScan {
                path: "T".into(),
                format: None,
                sort_key: None,
                filter: None,
                fields: None,
            },
            Op::summarize(
                vec![assign("a", Expr::path(["a"]))],
                vec![assign("count_star", count())]
            ),
            Op::filter(Expr::binary(
                ">",
                Expr::path(["count_star"]),
                Expr::literal("3")
            )),
            Op::Cut {
                args: vec![
                    assign("a", Expr::path(["a"])),
                    assign("count_star", Expr::path(["count_star"]))
                ],
                quiet: false
            },
        ]
    );
}

#[test]
fn sql_mixing_without_group_by() {
    assert_eq!(
        first_error("SELECT a, count(*) FROM T").to_string(),
        "cannot mix aggregations and non-aggregations without a GROUP BY"
    );
    assert_eq!(
        first_error("SELECT a FROM T HAVING a > 1").to_string(),
        "HAVING clause used without GROUP BY"
    );
    assert_eq!(
        first_error("SELECT a, b FROM T GROUP BY a").to_string(),
        "'b': selected expression is missing from GROUP BY clause (and is not an aggregation)"
    );
}

#[test]
fn sql_clauses_lower_to_pipeline_operators() {
    let seq = sem("select x as y from t1 as a join t2 b on a.k = b.k where x > 1 order by y desc nulls first limit 5")
        .unwrap();
    let kinds: Vec<_> = seq.iter().map(Op::kind).collect();
    assert_eq!(kinds, vec!["Fork", "Join", "Filter", "Cut", "Sort", "Head"]);
    let Op::Join {
        left_key,
        right_key,
        args,
        ..
    } = &seq[1]
    else {
        unreachable!()
    };
    assert_eq!(left_key, &Expr::path(["k"]));
    assert_eq!(right_key, &Expr::path(["b", "k"]));
    assert_eq!(args, &vec![assign("b", Expr::path(["b"]))]);
    assert!(matches!(&seq[4], Op::Sort { nulls_first: true, .. }));
    assert_eq!(seq[5], Op::Head { count: 5 });
}

#[test]
fn sql_ctes_and_unions() {
    let seq = sem("with c as (select a from t) select a from c union all select b from d").unwrap();
    let Op::Fork { paths, .. } = &seq[0] else {
        panic!("{seq:?}");
    };
    assert!(matches!(&paths[0][0], Op::FileScan { path, .. } if path == "t"));
    assert!(matches!(&paths[1][0], Op::FileScan { path, .. } if path == "d"));
    assert_eq!(seq.len(), 1);
    assert_eq!(
        first_error("select distinct a from t").to_string(),
        "SELECT DISTINCT is not supported"
    );
}

#[test]
fn pools_resolve_inside_a_lake() {
    let Lake { lake, logs, main } = lake();
    let zctx = Context::new();
    let cancel = CancellationToken::new();
    let seq = analyze(&zctx, &parse("from logs | head 1"), &lake, None, &cancel).unwrap();
    assert_eq!(
        seq[0],
        Op::PoolScan {
            id: logs,
            commit: main,
            filter: None,
            key_pruner: None,
            fields: None,
        }
    );
    let seq = analyze(&zctx, &parse("from logs:branches"), &lake, None, &cancel).unwrap();
    assert!(matches!(&seq[0], Op::PoolMetaScan { meta, .. } if meta == "branches"));
    let seq = analyze(&zctx, &parse("from logs@main:objects"), &lake, None, &cancel).unwrap();
    assert!(matches!(&seq[0], Op::CommitMetaScan { tap: false, .. }));
    let seq = analyze(&zctx, &parse("from :pools"), &lake, None, &cancel).unwrap();
    assert_eq!(seq[0], Op::LakeMetaScan { meta: "pools".into() });
    let seq = analyze(&zctx, &parse("from b*"), &lake, None, &cancel).unwrap();
    assert!(matches!(&seq[0], Op::Fork { paths, .. } if paths.len() == 2));

    let errs = analyze(&zctx, &parse("from nope"), &lake, None, &cancel).unwrap_err();
    assert_eq!(errs.first().unwrap().to_string(), "nope: pool not found");
    let errs = analyze(&zctx, &parse("from logs@main:bogus"), &lake, None, &cancel).unwrap_err();
    assert_eq!(
        errs.first().unwrap().to_string(),
        "unknown metadata type \"bogus\" in from operator"
    );
    let errs = analyze(&zctx, &parse("from ( logs => pass b* => pass )"), &lake, None, &cancel)
        .unwrap_err();
    assert_eq!(
        errs.first().unwrap().to_string(),
        "=> not allowed after pool pattern in 'from' operator"
    );
}

#[test]
fn names_are_files_outside_a_lake() {
    let seq = sem("from data.json").unwrap();
    assert!(matches!(&seq[0], Op::FileScan { path, .. } if path == "data.json"));
    assert_eq!(
        first_error("pool logs").to_string(),
        "from pool cannot be used without a lake"
    );
}

#[test]
fn default_source_is_added_once() {
    let zctx = Context::new();
    let cancel = CancellationToken::new();
    let seq = analyze_add_source(&zctx, &parse("count()"), &NoLake, None, &cancel).unwrap();
    assert_eq!(seq[0], Op::DefaultScan { filter: None });
    let seq = analyze_add_source(&zctx, &parse("file a.json | pass"), &NoLake, None, &cancel).unwrap();
    assert!(matches!(&seq[0], Op::FileScan { .. }));
    assert_eq!(seq.len(), 2);

    let Lake { lake, logs, main } = lake();
    let head = Head::new("logs", "main");
    let seq = analyze_add_source(&zctx, &parse("pass"), &lake, Some(&head), &cancel).unwrap();
    assert!(matches!(&seq[0], Op::PoolScan { id, commit, .. } if *id == logs && *commit == main));
}

#[test]
fn delete_queries() {
    let Lake { lake, logs, .. } = lake();
    let zctx = Context::new();
    let cancel = CancellationToken::new();
    let head = Head::new("logs", "main");
    let seq = analyze_delete(&zctx, &parse("where x > 1"), &lake, Some(&head), &cancel).unwrap();
    assert!(matches!(&seq[0], Op::DeleteScan { id, where_: None, .. } if *id == logs));
    assert!(matches!(&seq[1], Op::Filter { .. }));

    let errs = analyze_delete(&zctx, &parse("head 1"), &lake, Some(&head), &cancel).unwrap_err();
    assert_eq!(
        errs.first().unwrap().to_string(),
        "delete query must be a pool scan followed by a single where"
    );
    assert!(analyze_delete(&zctx, &parse("where x > 1"), &NoLake, None, &cancel).is_err());
}

#[test]
fn cancelled_analysis_is_interrupted() {
    let zctx = Context::new();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let errs = analyze(&zctx, &parse("pass"), &NoLake, None, &cancel).unwrap_err();
    assert_eq!(errs.first(), Some(&CompileError::Interrupted));
}

#[test]
fn sample_groups_by_type() {
    let seq = sem("sample a").unwrap();
    assert_eq!(seq.len(), 2);
    let Op::Summarize { keys, aggs, .. } = &seq[0] else {
        panic!("{seq:?}");
    };
    assert_eq!(keys[0].lhs, Expr::path(["typeof"]));
    assert!(matches!(&aggs[0].rhs, Expr::Agg { name, .. } if name == "any"));
}

#[test]
fn reanalyzing_the_printed_query_gives_the_same_dag() {
    for q in [
        "const n = 3 head n | put x := y + 1",
        "where x > 1 | sort -r y | every 1h count() by z",
        "fork ( => count() => sum(x) by y ) | uniq",
        "switch x ( case 1 => head 1 default => drop y )",
    ] {
        let printed = crate::zedc::printer::format_query(&parse(q));
        assert_eq!(sem(&printed).unwrap(), sem(q).unwrap(), "{printed}");
    }
}

#[test]
fn search_terms_lower_to_their_bare_text() {
    let seq = sem("search foo and x > 1").unwrap();
    let Op::Filter {
        expr: Expr::BinaryExpr { op, lhs, .. },
    } = &seq[0]
    else {
        panic!("{seq:?}");
    };
    assert_eq!(op, "and");
    assert!(
        matches!(lhs.as_ref(), Expr::Search { text, .. } if text == "foo"),
        "{lhs:?}"
    );
}
