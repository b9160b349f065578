//! Raw parse-tree dump, the output of `zc compile --pigeon`.

use crate::zedc::parser::{ParserError, Rule, ZedParser};
use pest::{Parser as PestParser, iterators::Pair};
use serde_json::{Value, json};

/// Parses `input` and returns the untransformed pest pair tree as JSON.
pub fn parse_tree(input: &str) -> Result<Value, ParserError> {
    let pairs = ZedParser::parse(Rule::query, input)?;
    Ok(Value::Array(pairs.map(pair_to_json).collect()))
}

fn pair_to_json(pair: Pair<Rule>) -> Value {
    let span = pair.as_span();
    let rule = format!("{:?}", pair.as_rule());
    let children: Vec<Value> = pair.clone().into_inner().map(pair_to_json).collect();
    if children.is_empty() {
        json!({
            "rule": rule,
            "start": span.start(),
            "end": span.end(),
            "text": span.as_str(),
        })
    } else {
        json!({
            "rule": rule,
            "start": span.start(),
            "end": span.end(),
            "children": children,
        })
    }
}
