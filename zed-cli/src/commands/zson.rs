use crate::errors::CliError;
use eyre::{Result, eyre};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use zed_compiler::zedc::{
    zed::Context,
    zson::{
        Analyzer, Parser, ZsonError,
        formatter::{Formatter, format_type},
    },
};

/// Parses every ZSON value in `file` (stdin when absent) and prints each in
/// canonical form followed by its type.
pub fn run(file: Option<&Path>, out: &mut impl Write) -> Result<()> {
    match file {
        Some(path) => {
            let f = File::open(path).map_err(|e| {
                eyre!(
                    "{}",
                    CliError::from(e)
                        .with_file_path(path.display().to_string())
                        .render()
                )
            })?;
            inspect(f, out)
        }
        None => inspect(io::stdin().lock(), out),
    }
}

pub fn inspect<R: Read>(reader: R, out: &mut impl Write) -> Result<()> {
    let zctx = Context::new();
    let mut parser = Parser::new(reader);
    let mut analyzer = Analyzer::new(&zctx);
    let mut formatter = Formatter::default();
    let mut count = 0usize;
    while let Some(parsed) = parser.parse_value().map_err(|e| zson_error(e, count))? {
        let value = analyzer
            .convert_value(&parsed)
            .map_err(|e| zson_error(e, count))?;
        writeln!(
            out,
            "{} : {}",
            formatter.format(&value),
            format_type(value.ty())
        )?;
        count += 1;
    }
    tracing::debug!(values = count, "inspected zson");
    Ok(())
}

fn zson_error(e: ZsonError, index: usize) -> eyre::Report {
    let error = CliError::new(e.to_string()).with_context(format!("while reading value {}", index + 1));
    eyre!("{}", error.render())
}
