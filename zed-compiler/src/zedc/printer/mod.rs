// SPDX-License-Identifier: AGPL-3.0

//! Canonical text for syntax trees and DAGs.
//!
//! The AST printer emits text the parser reads back into the same tree, so
//! `format_query(parse(format_query(parse(q))))` is a fixpoint. The DAG
//! printer is for people: it shows resolved paths, scans and the optimizer's
//! annotations in a pipeline-like layout.

pub mod ast_printer;
pub mod dag_printer;

use crate::zedc::{ast, dag};

pub use ast_printer::AstPrinter;
pub use dag_printer::DagPrinter;

/// Canonical Zed text for a parsed query.
pub fn format_query(seq: &ast::Seq) -> String {
    let mut p = AstPrinter::default();
    p.query(seq);
    p.finish()
}

pub fn format_ast_expr(e: &ast::Expr) -> String {
    let mut p = AstPrinter::default();
    p.expr(e, 0);
    p.finish()
}

/// Readable text for a compiled DAG.
pub fn format_dag(seq: &dag::Seq) -> String {
    let mut p = DagPrinter::default();
    p.seq(seq);
    p.finish()
}

pub fn format_dag_expr(e: &dag::Expr) -> String {
    let mut p = DagPrinter::default();
    p.expr(e, 0);
    p.finish()
}

/// Output buffer with block indentation.
#[derive(Debug, Default)]
pub(crate) struct Writer {
    out: String,
    indent: usize,
}

impl Writer {
    pub(crate) fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    pub(crate) fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
    }

    pub(crate) fn open(&mut self) {
        self.indent += 1;
    }

    pub(crate) fn close(&mut self) {
        self.indent = self.indent.saturating_sub(1);
    }

    pub(crate) fn finish(self) -> String {
        self.out
    }
}

/// Binding strength of a binary operator, loosest first.
pub(crate) fn precedence(op: &str) -> u8 {
    match op {
        "or" => PREC_OR,
        "and" => PREC_AND,
        "==" | "!=" | "<" | "<=" | ">" | ">=" | "in" | "like" | "~" => PREC_CMP,
        "+" | "-" => PREC_ADD,
        "*" | "/" | "%" => PREC_MUL,
        _ => PREC_CMP,
    }
}

pub(crate) const PREC_COND: u8 = 0;
pub(crate) const PREC_OR: u8 = 1;
pub(crate) const PREC_AND: u8 = 2;
pub(crate) const PREC_NOT: u8 = 3;
pub(crate) const PREC_CMP: u8 = 4;
pub(crate) const PREC_ADD: u8 = 5;
pub(crate) const PREC_MUL: u8 = 6;
pub(crate) const PREC_NEG: u8 = 7;
pub(crate) const PREC_POSTFIX: u8 = 8;
pub(crate) const PREC_PRIMARY: u8 = 9;

/// Operand precedences required on each side of a binary operator.
/// Comparisons don't chain, the rest associate to the left.
pub(crate) fn operand_precedence(op: &str) -> (u8, u8) {
    let p = precedence(op);
    if p == PREC_CMP { (p + 1, p + 1) } else { (p, p + 1) }
}

const KEYWORDS: &[&str] = &["and", "or", "not", "in", "like", "by", "with", "as", "where"];

/// True when `name` can be written bare where the grammar wants an identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$');
    starts
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(name))
        && !matches!(name, "true" | "false" | "null" | "this")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_exclude_keywords() {
        assert!(is_identifier("x"));
        assert!(is_identifier("$_a1"));
        assert!(!is_identifier("1a"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier("AND"));
        assert!(!is_identifier("this"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn comparisons_do_not_chain() {
        assert_eq!(operand_precedence("=="), (PREC_CMP + 1, PREC_CMP + 1));
        assert_eq!(operand_precedence("-"), (PREC_ADD, PREC_ADD + 1));
    }
}
