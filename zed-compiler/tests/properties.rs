use proptest::prelude::*;
use tokio_util::sync::CancellationToken;
use zed_compiler::zedc::{
    analyzer::analyze_add_source,
    compiler::source::NoLake,
    dag::{Op, Order, Seq, SortKey},
    optimizer::{
        Optimizer,
        parallelize::{is_parallelizable, parallelize},
        sort::set_input_sort_dir,
    },
    parser::ZedParser,
    printer::format_query,
    zed::Context,
};

const FIELDS: &[&str] = &["a", "b", "ts", "x", "y"];

fn field() -> impl Strategy<Value = &'static str> {
    prop::sample::select(FIELDS)
}

/// One pipeline operator in surface syntax.
fn op() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("pass".to_string()),
        Just("uniq".to_string()),
        Just("uniq -c".to_string()),
        Just("fuse".to_string()),
        (1u32..20).prop_map(|n| format!("head {n}")),
        (1u32..20).prop_map(|n| format!("tail {n}")),
        field().prop_map(|f| format!("sort {f}")),
        field().prop_map(|f| format!("sort -r {f}")),
        (field(), 0i32..100).prop_map(|(f, n)| format!("where {f} > {n}")),
        (field(), field()).prop_map(|(a, b)| format!("put {a}:={b}+1")),
        (field(), field()).prop_map(|(a, b)| format!("cut {a},{b}")),
        field().prop_map(|f| format!("drop {f}")),
        (field(), field()).prop_map(|(a, b)| format!("rename {a}:={b}")),
        field().prop_map(|f| format!("count() by {f}")),
        field().prop_map(|f| format!("sum({f})")),
        (field(), field()).prop_map(|(a, b)| format!("max({a}) by {b}")),
        field().prop_map(|f| format!("every 1h count() by {f}")),
        field().prop_map(|f| format!("yield {f}")),
        Just("*".to_string()),
    ]
}

fn query() -> impl Strategy<Value = String> {
    prop::collection::vec(op(), 1..6).prop_map(|ops| ops.join(" | "))
}

/// The optimized DAG of `query`, or `None` when analysis rejects it (for
/// example a rename onto its own field).
fn compiled(query: &str) -> Option<Seq> {
    let zctx = Context::new();
    let cancel = CancellationToken::new();
    let seq = ZedParser::parse_query(query).ok()?;
    let entry = analyze_add_source(&zctx, &seq, &NoLake, None, &cancel).ok()?;
    Optimizer::new(&NoLake, &cancel).optimize(entry).ok()
}

fn ts() -> SortKey {
    SortKey::new(vec!["ts".into()], Order::Asc)
}

proptest! {
    #[test]
    fn canonical_text_is_a_fixpoint(q in query()) {
        let parsed = ZedParser::parse_query(&q);
        prop_assume!(parsed.is_ok());
        let first = format_query(&parsed.unwrap());
        let reparsed = ZedParser::parse_query(&first)
            .unwrap_or_else(|e| panic!("{first:?} did not parse: {e}"));
        prop_assert_eq!(format_query(&reparsed), first);
    }

    #[test]
    fn one_way_parallelism_is_the_identity(q in query()) {
        let Some(seq) = compiled(&q) else {
            return Err(TestCaseError::reject("not analyzable"));
        };
        prop_assert_eq!(parallelize(seq.clone(), 1, Some(&ts())).unwrap(), seq);
    }

    #[test]
    fn parallelizable_agrees_with_parallelize(q in query(), n in 2usize..8) {
        let Some(seq) = compiled(&q) else {
            return Err(TestCaseError::reject("not analyzable"));
        };
        let out = parallelize(seq.clone(), n, Some(&ts())).unwrap();
        prop_assert_eq!(is_parallelizable(&seq, Some(&ts())), out != seq);
    }

    #[test]
    fn sort_dir_is_monotone(q in query()) {
        let Some(seq) = compiled(&q) else {
            return Err(TestCaseError::reject("not analyzable"));
        };
        let chain: Seq = seq.into_iter().skip(1).collect();
        let key = vec!["ts".to_string()];
        let mut was_sorted = true;
        for end in 0..=chain.len() {
            let mut prefix = chain[..end].to_vec();
            let sorted = set_input_sort_dir(&mut prefix, &key, Order::Asc);
            prop_assert!(was_sorted || !sorted, "order regained after {:?}", &chain[..end]);
            was_sorted = sorted;
        }
    }

    #[test]
    fn every_path_of_a_split_begins_with_the_reader(q in query(), n in 2usize..5) {
        let Some(seq) = compiled(&q) else {
            return Err(TestCaseError::reject("not analyzable"));
        };
        let out = parallelize(seq, n, Some(&ts())).unwrap();
        if let Some(Op::Fork { paths, .. }) = out.first() {
            prop_assert_eq!(paths.len(), n);
            for p in paths {
                let reads_input = matches!(p.first(), Some(Op::DefaultScan { .. }));
                prop_assert!(reads_input, "path {:?} does not begin with the reader", p);
            }
        }
    }
}
