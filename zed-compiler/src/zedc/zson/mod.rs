// SPDX-License-Identifier: AGPL-3.0

//! ZSON: the textual form of Zed values.
//!
//! The lexer and parser turn text into the syntactic [`Value`](crate::zedc::ast::zed::Value)
//! tree, the analyzer resolves it against a type [`Context`](crate::zedc::zed::Context),
//! and the builder encodes the result.

pub mod analyzer;
pub mod builder;
pub mod formatter;
pub mod lexer;
pub mod parser;

use crate::zedc::zed::ContextError;
use thiserror::Error;

pub use analyzer::{Analyzer, Value};
pub use parser::{Parser, parse_type_str, parse_value_str};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZsonError {
    #[error("zson scanner buffer size exceeded")]
    BufferOverflow,
    #[error("unexpected end of input")]
    Eof,
    #[error("zson read error: {0}")]
    Io(String),
    /// Malformed text: bad escapes, unbalanced brackets, unknown tokens.
    #[error("{0}")]
    Syntax(String),
    /// Well-formed text whose types do not line up.
    #[error("{0}")]
    Type(String),
    /// Primitive text that does not parse as its resolved type.
    #[error("{0}")]
    Value(String),
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl From<std::io::Error> for ZsonError {
    fn from(e: std::io::Error) -> Self {
        ZsonError::Io(e.to_string())
    }
}

impl ZsonError {
    pub fn is_lexical(&self) -> bool {
        matches!(
            self,
            ZsonError::BufferOverflow | ZsonError::Eof | ZsonError::Io(_) | ZsonError::Syntax(_)
        )
    }
}
