use crate::zedc::parser::{Rule, location::Loc};
use std::fmt::{Display, Formatter};

#[derive(Clone)]
pub enum ParserError {
    /// The grammar rejected the input at a byte offset.
    ParseError { msg: String, loc: Loc },
    LexError(String),
}

impl ParserError {
    pub fn at(msg: impl Into<String>, loc: Loc) -> Self {
        ParserError::ParseError {
            msg: msg.into(),
            loc,
        }
    }

    pub fn loc(&self) -> Option<Loc> {
        match self {
            ParserError::ParseError { loc, .. } => Some(*loc),
            ParserError::LexError(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParserError::ParseError { msg, .. } => msg,
            ParserError::LexError(msg) => msg,
        }
    }
}

impl Display for ParserError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ParserError::ParseError { msg, .. } => write!(f, "Parse error: {msg}"),
            ParserError::LexError(e) => write!(f, "Lex error: {e}"),
        }
    }
}

impl From<pest::error::Error<Rule>> for ParserError {
    fn from(e: pest::error::Error<Rule>) -> Self {
        let (first, last) = match e.location {
            pest::error::InputLocation::Pos(p) => (p, p),
            pest::error::InputLocation::Span((a, b)) => (a, b),
        };
        let msg = match &e.variant {
            pest::error::ErrorVariant::CustomError { message } => message.clone(),
            pest::error::ErrorVariant::ParsingError { .. } => "error parsing Zed".to_string(),
        };
        ParserError::ParseError {
            msg,
            loc: Loc::new(first, last),
        }
    }
}

impl From<String> for ParserError {
    fn from(e: String) -> Self {
        ParserError::LexError(e)
    }
}

impl From<&'static str> for ParserError {
    fn from(e: &'static str) -> Self {
        ParserError::LexError(e.to_string())
    }
}

impl std::fmt::Debug for ParserError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}
