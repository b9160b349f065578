use crate::zedc::{
    parser::{ParserError, Rule, location::HasLoc},
    zson::lexer::Lexer,
};
use pest::iterators::{Pair, Pairs};

pub trait PairTools<'a> {
    /// Equivalent to into_inner().next()
    #[track_caller]
    fn try_inner_next(self) -> Result<Pair<'a, Rule>, ParserError>;
}

pub trait PairsTools<'a> {
    /// Equivalent to next()
    fn try_next(&mut self) -> Result<Pair<'a, Rule>, ParserError>;

    /// Equivalent to next().into_inner()
    fn try_next_inner(&mut self) -> Result<Pairs<'a, Rule>, ParserError>;

    /// Consumes the next pair only if it was produced by `rule`.
    fn next_if(&mut self, rule: Rule) -> Option<Pair<'a, Rule>>;
}

impl<'a> PairTools<'a> for Pair<'a, Rule> {
    #[track_caller]
    fn try_inner_next(self) -> Result<Pair<'a, Rule>, ParserError> {
        let err_msg = format!("Expected inner next got {self:?}");
        self.into_inner()
            .next()
            .ok_or_else(|| ParserError::from(err_msg))
    }
}

impl<'a> PairTools<'a> for Result<Pair<'a, Rule>, ParserError> {
    #[track_caller]
    fn try_inner_next(self) -> Result<Pair<'a, Rule>, ParserError> {
        match self {
            Ok(pair) => pair
                .into_inner()
                .next()
                .ok_or_else(|| ParserError::from("Expected inner next")),
            Err(e) => Err(e),
        }
    }
}

impl<'a> PairsTools<'a> for Pairs<'a, Rule> {
    fn try_next(&mut self) -> Result<Pair<'a, Rule>, ParserError> {
        self.next()
            .ok_or_else(|| ParserError::from("Expected next"))
    }

    fn try_next_inner(&mut self) -> Result<Pairs<'a, Rule>, ParserError> {
        match self.next() {
            Some(pair) => Ok(pair.into_inner()),
            None => Err(ParserError::from("Expected next inner")),
        }
    }

    fn next_if(&mut self, rule: Rule) -> Option<Pair<'a, Rule>> {
        match self.peek() {
            Some(p) if p.as_rule() == rule => self.next(),
            _ => None,
        }
    }
}

/// Unquotes a double-quoted, single-quoted, or backtick string token.
pub(super) fn unquote(pair: &Pair<Rule>) -> Result<String, ParserError> {
    let text = pair.as_str();
    let err = |e: crate::zedc::zson::ZsonError| ParserError::at(e.to_string(), pair.loc());
    match text.as_bytes().first() {
        Some(b'"') => Lexer::new(text.as_bytes()).scan_string().map_err(err),
        Some(b'`') => Lexer::new(text.as_bytes()).scan_backtick().map_err(err),
        Some(b'\'') => unquote_single(&text[1..text.len().saturating_sub(1).max(1)])
            .ok_or_else(|| ParserError::at("illegal escape in string", pair.loc())),
        _ => Ok(text.to_string()),
    }
}

fn unquote_single(body: &str) -> Option<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(match chars.next()? {
                'n' => '\n',
                't' => '\t',
                'r' => '\r',
                other @ ('\\' | '\'' | '"' | '/') => other,
                _ => return None,
            }),
            '\'' => {
                // '' inside a single-quoted string
                chars.next();
                out.push('\'');
            }
            c => out.push(c),
        }
    }
    Some(out)
}

/// Strips the delimiting slashes of a `/regexp/` token.
pub(super) fn regexp_body(text: &str) -> String {
    text.strip_prefix('/')
        .and_then(|t| t.strip_suffix('/'))
        .unwrap_or(text)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_quoted_escapes() {
        assert_eq!(unquote_single("it''s"), Some("it's".to_string()));
        assert_eq!(unquote_single(r"a\tb"), Some("a\tb".to_string()));
        assert_eq!(unquote_single(r"a\qb"), None);
    }

    #[test]
    fn regexp_slashes() {
        assert_eq!(regexp_body("/a.*b/"), "a.*b");
        assert_eq!(regexp_body("abc"), "abc");
    }
}
