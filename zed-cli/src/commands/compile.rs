use crate::{
    config::ZcConfig,
    errors::{CliError, compile_error},
    output::StageWriter,
};
use clap::Args;
use eyre::{Result, eyre};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use zed_compiler::zedc::{
    analyzer::errors::{CompileError, ErrorList},
    ast,
    compiler::job::{self, Job},
    dag,
    parser::tree::parse_tree,
    printer::{format_dag, format_query},
    zed::Context,
};

/// Flags of `zc compile`.
#[derive(Debug, Clone, Default, Args)]
pub struct CompileArgs {
    /// Query text; several words are joined with spaces
    pub query: Vec<String>,

    /// Source file read before the query (may be repeated)
    #[arg(short = 'I', value_name = "FILE")]
    pub includes: Vec<PathBuf>,

    /// Print the raw parse tree
    #[arg(long)]
    pub pigeon: bool,

    /// Print the syntax tree
    #[arg(long)]
    pub proc: bool,

    /// Print the analyzed DAG
    #[arg(short = 's')]
    pub semantic: bool,

    /// Print the optimized DAG
    #[arg(short = 'O')]
    pub optimize: bool,

    /// Print the DAG parallelized N ways (zc.toml's parallelism when N is omitted)
    #[arg(short = 'P', value_name = "N", num_args = 0..=1)]
    pub parallel: Option<Option<usize>>,

    /// Print canonical query text instead of JSON
    #[arg(short = 'C')]
    pub canon: bool,

    /// Print a summary of the query's sources and outputs
    #[arg(short = 'D')]
    pub describe: bool,

    /// Require the query to be a SQL statement
    #[arg(long)]
    pub sql: bool,
}

const DEFAULT_PARALLELISM: usize = 2;

/// The stages one invocation prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Stages {
    pigeon: bool,
    proc: bool,
    semantic: bool,
    describe: bool,
    optimize: bool,
    parallel: Option<usize>,
}

impl Stages {
    fn new(args: &CompileArgs, config: &ZcConfig) -> Self {
        let parallel = match args.parallel {
            None => None,
            Some(Some(n)) => Some(n),
            Some(None) => Some(config.compile.parallelism.unwrap_or(DEFAULT_PARALLELISM)),
        }
        .filter(|n| *n > 0);
        let mut stages = Stages {
            pigeon: args.pigeon,
            proc: args.proc,
            semantic: args.semantic,
            describe: args.describe,
            optimize: args.optimize,
            parallel,
        };
        if stages.count() == 0 {
            if args.canon {
                stages.proc = true;
            } else {
                stages.pigeon = true;
            }
        }
        stages
    }

    fn count(&self) -> usize {
        [
            self.pigeon,
            self.proc,
            self.semantic,
            self.describe,
            self.optimize,
            self.parallel.is_some(),
        ]
        .into_iter()
        .filter(|s| *s)
        .count()
    }

    fn needs_job(&self) -> bool {
        self.semantic || self.describe || self.optimize || self.parallel.is_some()
    }
}

pub fn run(args: &CompileArgs, config: &ZcConfig, out: &mut impl Write) -> Result<()> {
    let query = args.query.join(" ");
    let mut includes = config.compile.includes.clone();
    includes.extend(args.includes.iter().cloned());
    if query.trim().is_empty() && includes.is_empty() {
        let error = CliError::new("no query given")
            .with_hint("pass query text or an include file with -I");
        return Err(eyre!("{}", error.render()));
    }

    let stages = Stages::new(args, config);
    tracing::debug!(?stages, includes = includes.len(), "compiling");
    let set = job::load(&query, &includes).map_err(|e| {
        eyre!(
            "{}",
            CliError::new("failed to read query source")
                .with_caused_by(e.to_string())
                .render()
        )
    })?;
    let fail = |errors: ErrorList| eyre!("{}", compile_error(&errors, &set).render());

    let mut w = StageWriter::new(out, stages.count());
    if stages.pigeon {
        let tree = parse_tree(&set.text).map_err(|e| fail(CompileError::from(e).into()))?;
        w.json("pigeon", &tree)?;
    }
    let seq = job::parse(&set).map_err(fail)?;
    if args.sql && !is_sql(&seq) {
        let error = CliError::new("query is not a SQL statement")
            .with_hint("drop --sql to compile a pipeline query");
        return Err(eyre!("{}", error.render()));
    }
    if stages.proc {
        if args.canon {
            w.text("proc", &format_query(&seq))?;
        } else {
            w.json("proc", &seq)?;
        }
    }
    if !stages.needs_job() {
        return Ok(());
    }

    let zctx = Context::new();
    let catalog = config.catalog();
    let head = config.head();
    let cancel = CancellationToken::new();
    let mut job = Job::new(&zctx, &seq, catalog.as_source(), head.as_ref(), &cancel)
        .map_err(fail)?
        .with_default_sort(config.default_sort());
    if stages.semantic {
        write_dag(&mut w, args.canon, "semantic", job.entry())?;
    }
    if stages.describe {
        let info = job.describe().map_err(|e| fail(e.into()))?;
        w.json("describe", &info)?;
    }
    let mut optimized = false;
    if stages.optimize {
        job.optimize().map_err(|e| fail(e.into()))?;
        optimized = true;
        write_dag(&mut w, args.canon, "optimized", job.entry())?;
    }
    if let Some(n) = stages.parallel {
        if !optimized {
            job.optimize().map_err(|e| fail(e.into()))?;
        }
        let before = job.entry().clone();
        job.parallelize(n).map_err(|e| fail(e.into()))?;
        if n > 1 && &before == job.entry() {
            let warning = CliError::warning("query was not parallelized")
                .with_hint("only pool scans and stdin can be divided between paths");
            eprint!("{}", warning.render());
        }
        write_dag(&mut w, args.canon, "parallelized", job.entry())?;
    }
    Ok(())
}

fn write_dag<W: Write>(
    w: &mut StageWriter<'_, W>,
    canon: bool,
    title: &str,
    entry: &dag::Seq,
) -> Result<()> {
    if canon {
        w.text(title, &format_dag(entry))
    } else {
        w.json(title, entry)
    }
}

/// True when the query, looking through leading declarations, is a SQL statement.
fn is_sql(seq: &ast::Seq) -> bool {
    match seq.first() {
        Some(ast::Op::Scope { body, .. }) => is_sql(body),
        Some(op) => op.is_sql(),
        None => false,
    }
}
