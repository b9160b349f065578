use super::*;
use crate::zedc::ast::{Assignment, Decl, Expr, FromElem, Op, PoolName, Source, zed};

fn parse(q: &str) -> Seq {
    match ZedParser::parse_query(q) {
        Ok(seq) => seq,
        Err(e) => panic!("{q:?}: {e}"),
    }
}

fn prim(e: &Expr) -> (&str, &str) {
    match e {
        Expr::Primitive { ty, text, .. } => (ty.as_str(), text.as_str()),
        other => panic!("expected primitive, got {other:?}"),
    }
}

fn id(e: &Expr) -> &str {
    match e {
        Expr::Id { name, .. } => name,
        other => panic!("expected identifier, got {other:?}"),
    }
}

#[test]
fn pipeline_of_simple_ops() {
    let seq = parse("head 1 | tail 2 | uniq -c | fuse | pass");
    assert_eq!(seq.len(), 5);
    match &seq[0] {
        Op::Head { count: Some(c), .. } => assert_eq!(prim(c), ("int64", "1")),
        other => panic!("{other:?}"),
    }
    assert!(matches!(seq[2], Op::Uniq { cflag: true, .. }));
    assert!(matches!(seq[3], Op::Fuse { .. }));
    assert!(matches!(seq[4], Op::Pass { .. }));
}

#[test]
fn negative_literal_is_folded() {
    let seq = parse("head -1");
    match &seq[0] {
        Op::Head { count: Some(c), .. } => assert_eq!(prim(c), ("int64", "-1")),
        other => panic!("{other:?}"),
    }
}

#[test]
fn match_all_and_uniq() {
    let seq = parse("* | uniq");
    match &seq[0] {
        Op::Search { expr, .. } => assert_eq!(prim(expr), ("bool", "true")),
        other => panic!("{other:?}"),
    }
    assert!(matches!(seq[1], Op::Uniq { cflag: false, .. }));
}

#[test]
fn sort_flags() {
    let seq = parse("sort -r -nulls first x, y");
    match &seq[0] {
        Op::Sort {
            args,
            reverse,
            nulls_first,
            ..
        } => {
            assert_eq!(args.len(), 2);
            assert!(*reverse);
            assert!(*nulls_first);
        }
        other => panic!("{other:?}"),
    }
    assert!(matches!(&parse("sort")[0], Op::Sort { args, .. } if args.is_empty()));
}

#[test]
fn implicit_aggregation() {
    let seq = parse("count() by y");
    match &seq[0] {
        Op::Summarize {
            every, keys, aggs, ..
        } => {
            assert!(every.is_none());
            assert_eq!(id(&keys[0].rhs), "y");
            assert!(matches!(&aggs[0].rhs, Expr::Call { name, args, .. } if name == "count" && args.is_empty()));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn every_clause() {
    let seq = parse("every 1h count() by y");
    match &seq[0] {
        Op::Summarize { every: Some(d), .. } => assert_eq!(prim(d), ("duration", "1h")),
        other => panic!("{other:?}"),
    }
}

#[test]
fn summarize_with_named_aggs_and_limit() {
    let seq = parse("summarize c:=count(), s:=sum(x) where x > 1 by k with -limit 10");
    match &seq[0] {
        Op::Summarize {
            keys, aggs, limit, ..
        } => {
            assert_eq!(keys.len(), 1);
            assert_eq!(aggs.len(), 2);
            assert_eq!(id(aggs[0].lhs.as_ref().unwrap()), "c");
            assert!(matches!(&aggs[1].rhs, Expr::Call { where_: Some(_), .. }));
            assert_eq!(*limit, Some(10));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn put_filter_cut() {
    let seq = parse("put x=y | filter x > 1 | cut x");
    match &seq[0] {
        Op::Put { args, .. } => {
            let Assignment { lhs, rhs, .. } = &args[0];
            assert_eq!(id(lhs.as_ref().unwrap()), "x");
            assert_eq!(id(rhs), "y");
        }
        other => panic!("{other:?}"),
    }
    assert!(matches!(&seq[1], Op::Where { expr: Expr::Binary { op, .. }, .. } if op == ">"));
    assert!(matches!(&seq[2], Op::Cut { args, .. } if args.len() == 1 && args[0].lhs.is_none()));
}

#[test]
fn bare_assignment_and_expression() {
    let seq = parse("x:=1, y:=2 | x > 1 | f(x)");
    assert!(matches!(&seq[0], Op::OpAssignment { assignments, .. } if assignments.len() == 2));
    assert!(matches!(&seq[1], Op::OpExpr { expr: Expr::Binary { .. }, .. }));
    assert!(matches!(&seq[2], Op::OpExpr { expr: Expr::Call { .. }, .. }));
}

#[test]
fn search_terms() {
    let seq = parse("search foo and x > 1");
    match &seq[0] {
        Op::Search {
            expr: Expr::Binary { op, lhs, rhs, .. },
            ..
        } => {
            assert_eq!(op, "and");
            assert!(matches!(lhs.as_ref(), Expr::Term { text, .. } if text == "foo"));
            assert!(matches!(rhs.as_ref(), Expr::Binary { .. }));
        }
        other => panic!("{other:?}"),
    }
    assert!(matches!(&parse("/a.*b/")[0], Op::Search { expr: Expr::Regexp { pattern, .. }, .. } if pattern == "a.*b"));
}

#[test]
fn declarations_open_a_scope() {
    let seq = parse("const x = 1 fn inc(a): (a + 1) type port = uint16 head x");
    match &seq[0] {
        Op::Scope { decls, body, .. } => {
            assert_eq!(decls.len(), 3);
            assert!(matches!(&decls[0], Decl::Const { name, .. } if name == "x"));
            assert!(matches!(&decls[1], Decl::Func { params, .. } if params == &["a".to_string()]));
            assert!(matches!(&decls[2], Decl::Type { ty: zed::Type::Primitive { name }, .. } if name == "uint16"));
            assert!(matches!(body[0], Op::Head { .. }));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn user_operator_declaration() {
    let seq = parse("op first(n): ( head n ) first(1)");
    match &seq[0] {
        Op::Scope { decls, body, .. } => {
            assert!(matches!(&decls[0], Decl::Op { name, body, .. } if name == "first" && body.len() == 1));
            assert!(matches!(&body[0], Op::OpExpr { expr: Expr::Call { name, .. }, .. } if name == "first"));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn fork_and_switch() {
    let seq = parse("fork ( => head 1 => tail 1 ) | switch x ( case 1 => head 1 default => pass )");
    assert!(matches!(&seq[0], Op::Parallel { paths, .. } if paths.len() == 2));
    match &seq[1] {
        Op::Switch {
            expr: Some(e),
            cases,
            ..
        } => {
            assert_eq!(id(e), "x");
            assert_eq!(cases.len(), 2);
            assert!(cases[0].expr.is_some());
            assert!(cases[1].expr.is_none());
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn from_sources() {
    let seq = parse("from logs@main:objects");
    match &seq[0] {
        Op::From { elems, .. } => match &elems[0].source {
            Source::Name { spec, .. } => {
                assert!(matches!(&spec.pool, Some(PoolName::Text { name }) if name == "logs"));
                assert_eq!(spec.commit.as_deref(), Some("main"));
                assert_eq!(spec.meta.as_deref(), Some("objects"));
            }
            other => panic!("{other:?}"),
        },
        other => panic!("{other:?}"),
    }

    let seq = parse("from ( a => head 1 b* => tail 1 )");
    match &seq[0] {
        Op::From { elems, .. } => {
            assert_eq!(elems.len(), 2);
            let FromElem { source, body, .. } = &elems[1];
            assert!(matches!(source, Source::Name { spec, .. } if matches!(&spec.pool, Some(PoolName::Glob { .. }))));
            assert!(body.is_some());
        }
        other => panic!("{other:?}"),
    }

    let seq = parse("file data.json format json order ts:desc");
    match &seq[0] {
        Op::From { elems, .. } => {
            assert!(matches!(&elems[0].source, Source::File { path, .. } if path == "data.json"));
            assert_eq!(elems[0].args.format.as_deref(), Some("json"));
            assert!(elems[0].args.order.is_some());
        }
        other => panic!("{other:?}"),
    }

    let seq = parse("get https://example.com/x.json");
    assert!(matches!(&seq[0], Op::From { elems, .. } if matches!(&elems[0].source, Source::Http { .. })));
}

#[test]
fn join_forms() {
    let seq = parse("left join (from b) on a=b c:=d");
    match &seq[0] {
        Op::Join {
            style,
            right,
            left_key,
            right_key,
            args,
            ..
        } => {
            assert_eq!(style, "left");
            assert!(right.is_some());
            assert_eq!(id(left_key), "a");
            assert_eq!(id(right_key), "b");
            assert_eq!(args.len(), 1);
        }
        other => panic!("{other:?}"),
    }
    assert!(matches!(&parse("join on k")[0], Op::Join { right: None, style, .. } if style == "inner"));
}

#[test]
fn explode_over_yield_load() {
    assert!(matches!(
        &parse("explode a by int64 as v")[0],
        Op::Explode { ty: Some(_), as_: Some(_), .. }
    ));
    assert!(matches!(
        &parse("over a with x=b => ( yield x )")[0],
        Op::Over { locals, body: Some(_), .. } if locals.len() == 1
    ));
    assert!(matches!(&parse("yield {a:1, ...r}, [1,2]")[0], Op::Yield { exprs, .. } if exprs.len() == 2));
    assert!(matches!(
        &parse(r#"load logs@dev author "me" message "msg""#)[0],
        Op::Load { branch: Some(b), author: Some(_), message: Some(_), meta: None, .. } if b == "dev"
    ));
}

#[test]
fn sql_select() {
    let seq = parse("SELECT a, count(*) FROM T GROUP BY a HAVING count(*) > 3");
    match &seq[0] {
        Op::Select(s) => {
            assert_eq!(s.selection.len(), 2);
            assert!(matches!(&s.from, Some(Op::Table { name, .. }) if name == "T"));
            assert_eq!(s.group_by.len(), 1);
            assert!(s.having.is_some());
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn sql_clauses() {
    let seq = parse("select x as y from t1 as a join t2 b on a.k = b.k where x > 1 order by y desc nulls first limit 5");
    match &seq[0] {
        Op::Limit { op, .. } => match op.as_ref() {
            Op::OrderBy { op, exprs, .. } => {
                assert_eq!(exprs.len(), 1);
                match op.as_ref() {
                    Op::Select(s) => {
                        assert!(matches!(&s.selection[0].lhs, Some(Expr::Id { name, .. }) if name == "y"));
                        assert!(matches!(&s.from, Some(Op::SqlJoin { .. })));
                        assert!(s.where_.is_some());
                    }
                    other => panic!("{other:?}"),
                }
            }
            other => panic!("{other:?}"),
        },
        other => panic!("{other:?}"),
    }
    assert!(matches!(
        &parse("with c as (select a from t) select a from c union all select b from d")[0],
        Op::With { ctes, body, .. } if ctes.len() == 1 && matches!(body.as_ref(), Op::Union { distinct: false, .. })
    ));
}

#[test]
fn expression_precedence() {
    let e = ZedParser::parse_expression("1 + 2 * 3").unwrap();
    match e {
        Expr::Binary { op, rhs, .. } => {
            assert_eq!(op, "+");
            assert!(matches!(rhs.as_ref(), Expr::Binary { op, .. } if op == "*"));
        }
        other => panic!("{other:?}"),
    }
    let e = ZedParser::parse_expression("a or b and not c").unwrap();
    assert!(matches!(e, Expr::Binary { ref op, .. } if op == "or"));
    let e = ZedParser::parse_expression(r#"x == 1 ? "a" : "b""#).unwrap();
    assert!(matches!(e, Expr::Conditional { .. }));
}

#[test]
fn postfix_and_literals() {
    let e = ZedParser::parse_expression("a.b[1][2:]").unwrap();
    assert!(matches!(e, Expr::Slice { from: Some(_), to: None, .. }));
    let cases = [
        ("2021-01-01T00:00:00Z", "time"),
        ("1h30m", "duration"),
        ("10.0.0.0/8", "net"),
        ("10.0.0.1", "ip"),
        ("::1", "ip"),
        ("0xff", "bytes"),
        ("1.5", "float64"),
        ("42", "int64"),
        ("true", "bool"),
        (r#""hi""#, "string"),
    ];
    for (text, ty) in cases {
        let e = ZedParser::parse_expression(text).unwrap();
        assert_eq!(prim(&e).0, ty, "{text}");
    }
}

#[test]
fn casts() {
    assert!(matches!(
        ZedParser::parse_expression("int64(x)").unwrap(),
        Expr::Cast { ty: zed::Type::Primitive { ref name }, .. } if name == "int64"
    ));
    assert!(matches!(
        ZedParser::parse_expression("cast(x, <{a:string}>)").unwrap(),
        Expr::Cast { ty: zed::Type::Record { .. }, .. }
    ));
}

#[test]
fn containers_and_fstrings() {
    assert!(matches!(
        ZedParser::parse_expression("|[1,2]|").unwrap(),
        Expr::Set { ref elems, .. } if elems.len() == 2
    ));
    assert!(matches!(
        ZedParser::parse_expression(r#"|{"a":1}|"#).unwrap(),
        Expr::Map { ref entries, .. } if entries.len() == 1
    ));
    assert!(matches!(
        ZedParser::parse_expression(r#"f"x={x}!""#).unwrap(),
        Expr::FString { ref elems, .. } if elems.len() == 3
    ));
}

#[test]
fn case_expression_lowers_to_conditional() {
    let e = ZedParser::parse_expression("CASE WHEN a THEN 1 WHEN b THEN 2 ELSE 3 END").unwrap();
    match e {
        Expr::Conditional { else_, .. } => {
            assert!(matches!(else_.as_ref(), Expr::Conditional { .. }));
        }
        other => panic!("{other:?}"),
    }
}

#[test]
fn syntax_error_has_location() {
    let err = ZedParser::parse_query("head 1 | (").unwrap_err();
    let loc = err.loc().unwrap();
    assert!(loc.first >= 6, "{loc:?}");
    assert!(ZedParser::parse_query("sort -r |").is_err());
}
