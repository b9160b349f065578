//! The compilation API: text in, a finished DAG out.
//!
//! A [`Job`] owns the DAG between passes. Callers parse with [`load`] and
//! [`parse`], build a job from the syntax tree, then run whichever of
//! [`Job::optimize`], [`Job::parallelize`] or [`Job::optimize_deleter`] they
//! need before taking the entry with [`Job::into_entry`].

use crate::zedc::{
    analyzer::{
        add_default_source, analyze,
        errors::{CompileError, ErrorList},
    },
    ast,
    compiler::source::{Head, Source},
    dag::{self, Op, SortKey, has_source},
    describe::{Info, describe_entry},
    optimizer::Optimizer,
    parser::{ZedParser, source_set::SourceSet},
    zed::Context,
};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Reads every include file, in order, followed by the query text.
/// An empty query adds nothing when there are includes.
pub fn load<P: AsRef<Path>>(query: &str, includes: &[P]) -> Result<SourceSet, CompileError> {
    let mut set = SourceSet::default();
    for path in includes {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::Io(format!("{}: {e}", path.display())))?;
        set.push(path.display().to_string(), &text);
    }
    if !query.trim().is_empty() || includes.is_empty() {
        set.push(String::new(), query);
    }
    Ok(set)
}

/// Parses the concatenated text of `set`. Error locations index into it.
pub fn parse(set: &SourceSet) -> Result<ast::Seq, ErrorList> {
    let seq = ZedParser::parse_source(set).map_err(CompileError::from)?;
    if seq.is_empty() {
        return Err(CompileError::Parse {
            msg: "empty query".to_string(),
            loc: None,
        }
        .into());
    }
    Ok(seq)
}

pub struct Job<'a> {
    source: &'a dyn Source,
    cancel: CancellationToken,
    optimizer: Optimizer<'a>,
    entry: dag::Seq,
    /// The query named no source of its own.
    inferred: bool,
    readers: usize,
}

impl<'a> Job<'a> {
    /// Analyzes `seq` and gives it a source when it has none.
    pub fn new(
        zctx: &Context,
        seq: &ast::Seq,
        source: &'a dyn Source,
        head: Option<&Head>,
        cancel: &CancellationToken,
    ) -> Result<Self, ErrorList> {
        if seq.is_empty() {
            return Err(CompileError::internal("AST seq cannot be empty").into());
        }
        let mut entry = analyze(zctx, seq, source, head, cancel)?;
        let inferred = !has_source(&entry);
        add_default_source(zctx, &mut entry, source, head, cancel)?;
        let readers = match entry.first() {
            Some(Op::DefaultScan { .. }) => ast::fan_in(seq),
            _ => 0,
        };
        tracing::debug!(ops = entry.len(), inferred, readers, "created job");
        Ok(Self {
            source,
            cancel: cancel.clone(),
            optimizer: Optimizer::new(source, cancel),
            entry,
            inferred,
            readers,
        })
    }

    /// Order assumed for records from the runtime-bound readers.
    pub fn with_default_sort(mut self, key: Option<SortKey>) -> Self {
        self.optimizer = self.optimizer.with_default_sort(key);
        self
    }

    pub fn entry(&self) -> &dag::Seq {
        &self.entry
    }

    pub fn into_entry(self) -> dag::Seq {
        self.entry
    }

    /// The scan the runtime binds its readers to, if the query has one.
    pub fn default_scan(&self) -> Option<&Op> {
        self.entry
            .first()
            .filter(|op| matches!(op, Op::DefaultScan { .. }))
    }

    /// How many readers the runtime must supply: none when the query names
    /// its own source, two for a leading two-input join, one otherwise.
    pub fn readers(&self) -> usize {
        self.readers
    }

    pub fn optimize(&mut self) -> Result<(), CompileError> {
        self.entry = self.optimizer.optimize(std::mem::take(&mut self.entry))?;
        Ok(())
    }

    pub fn optimize_deleter(&mut self, replicas: usize) -> Result<(), CompileError> {
        self.entry = self
            .optimizer
            .optimize_deleter(std::mem::take(&mut self.entry), replicas)?;
        Ok(())
    }

    pub fn parallelize(&mut self, n: usize) -> Result<(), CompileError> {
        self.entry = self
            .optimizer
            .parallelize(std::mem::take(&mut self.entry), n)?;
        Ok(())
    }

    pub fn describe(&self) -> Result<Info, CompileError> {
        describe_entry(
            &self.entry,
            self.inferred,
            self.source,
            &self.optimizer,
            &self.cancel,
        )
    }
}

/// Parses, analyzes and optimizes `query`, parallelizing when `n > 1`.
pub fn compile(
    zctx: &Context,
    query: &str,
    source: &dyn Source,
    head: Option<&Head>,
    n: usize,
    cancel: &CancellationToken,
) -> Result<dag::Seq, ErrorList> {
    let set = SourceSet::from_query(query);
    let seq = parse(&set)?;
    let mut job = Job::new(zctx, &seq, source, head, cancel)?;
    job.optimize()?;
    if n > 1 {
        job.parallelize(n)?;
    }
    Ok(job.into_entry())
}
