//! Names the analyzer resolves without a declaration.

/// Aggregator names. A call to one of these with at most one argument is an
/// aggregation.
pub const AGGREGATORS: &[&str] = &[
    "and", "any", "avg", "collect", "collect_map", "count", "dcount", "fuse", "max", "min", "or",
    "sum", "union",
];

/// Functions that take a type to conform a value to. Given one argument they
/// apply to `this`.
pub const SHAPERS: &[&str] = &["cast", "crop", "fill", "order", "shape"];

/// Calls whose result is always a bool, so a bare call filters.
pub const BOOL_RESULT: &[&str] = &["cidr_match", "has", "has_error", "is", "is_error", "missing"];

/// Functions that keep their input's order when applied to a sort key.
pub const ORDER_PRESERVING: &[&str] = &["ceil", "floor", "round", "trunc"];

/// Accepted argument counts. `max` is `None` for variadic functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Self { min: n, max: Some(n) }
    }

    const fn between(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    /// `Err` carries the message for a call with `n` arguments.
    pub fn check(&self, n: usize) -> Result<(), &'static str> {
        if n < self.min {
            Err("too few arguments")
        } else if self.max.is_some_and(|max| n > max) {
            Err("too many arguments")
        } else {
            Ok(())
        }
    }
}

pub fn is_aggregator(name: &str) -> bool {
    AGGREGATORS.contains(&name)
}

pub fn is_shaper(name: &str) -> bool {
    SHAPERS.contains(&name)
}

pub fn has_bool_result(name: &str) -> bool {
    BOOL_RESULT.contains(&name)
}

pub fn is_order_preserving(name: &str) -> bool {
    ORDER_PRESERVING.contains(&name)
}

/// The arity of built-in function `name`.
pub fn function(name: &str) -> Option<Arity> {
    let arity = match name {
        "now" => Arity::exactly(0),
        "ksuid" | "nest_dotted" => Arity::between(0, 1),
        "join" | "typename" | "network_of" | "is" => Arity::between(1, 2),
        "max" | "min" | "has" | "missing" => Arity::at_least(1),
        "pow" | "split" | "bucket" | "cidr_match" | "trunc" => Arity::exactly(2),
        "replace" => Arity::exactly(3),
        "cast" | "crop" | "fill" | "order" | "shape" => Arity::between(1, 2),
        "len" | "abs" | "every" | "ceil" | "flatten" | "floor" | "log" | "round" | "sqrt"
        | "rune_len" | "lower" | "upper" | "trim" | "typeof" | "typeunder" | "nameof"
        | "fields" | "has_error" | "is_error" | "error" | "kind" | "base64" | "hex"
        | "parse_uri" | "parse_zson" | "quiet" | "under" | "unflatten" => Arity::exactly(1),
        _ => return None,
    };
    Some(arity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arities() {
        assert_eq!(function("now").unwrap().check(1), Err("too many arguments"));
        assert_eq!(function("replace").unwrap().check(2), Err("too few arguments"));
        assert!(function("has").unwrap().check(7).is_ok());
        assert!(function("nope").is_none());
    }

    #[test]
    fn classification() {
        assert!(is_aggregator("count"));
        assert!(!is_aggregator("len"));
        assert!(has_bool_result("is_error"));
        assert!(is_shaper("crop"));
        assert!(is_order_preserving("trunc"));
    }
}
