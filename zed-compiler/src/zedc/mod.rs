// SPDX-License-Identifier: AGPL-3.0

//! Zed query compiler: parser, semantic analyzer, optimizer and parallelizer.

pub mod analyzer;
pub mod ast;
pub mod compiler;
pub mod dag;
pub mod describe;
pub mod eval;
pub mod optimizer;
pub mod parser;
pub mod printer;
pub mod zed;
pub mod zson;
