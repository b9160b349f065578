// SPDX-License-Identifier: AGPL-3.0

//! Parser for Zed queries.
//!
//! The grammar lives in `grammar.pest`; the `*_parse_methods.rs` files walk the
//! pest pairs and build the [`ast`](crate::zedc::ast) tree. Locations on every
//! node are byte offsets into the text handed to the parser, which for
//! multi-file programs is the concatenated text of a [`SourceSet`].

pub mod errors;
pub mod expression_parse_methods;
pub mod location;
pub mod query_parse_methods;
pub mod source_parse_methods;
pub mod source_set;
pub mod sql_parse_methods;
pub mod tree;
pub mod utils;

use crate::zedc::{
    ast::{Expr, Seq},
    parser::{source_set::SourceSet, utils::PairsTools},
};
use pest::Parser as PestParser;
use pest_derive::Parser;

pub use errors::ParserError;

#[derive(Parser)]
#[grammar = "zedc/parser/grammar.pest"]
pub struct ZedParser {}

impl ZedParser {
    /// Parses a pipeline, with optional leading declarations, from `input`.
    pub fn parse_query(input: &str) -> Result<Seq, ParserError> {
        tracing::debug!(bytes = input.len(), "parsing query");
        let mut pairs = ZedParser::parse(Rule::query, input)?;
        let parser = ZedParser {};
        let seq = parser.parse_query_pair(pairs.try_next()?)?;
        tracing::trace!(ops = seq.len(), "parsed query");
        Ok(seq)
    }

    /// Parses the concatenated text of a source set.
    pub fn parse_source(set: &SourceSet) -> Result<Seq, ParserError> {
        Self::parse_query(&set.text)
    }

    /// Parses a single expression.
    pub fn parse_expression(input: &str) -> Result<Expr, ParserError> {
        let mut pairs = ZedParser::parse(Rule::expr_only, input)?;
        let parser = ZedParser {};
        let mut inner = pairs.try_next()?.into_inner();
        parser.parse_expr(inner.try_next()?)
    }
}

#[cfg(test)]
mod parser_tests;
