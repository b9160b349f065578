// Library interface for zed-cli to enable testing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;
pub mod config;
pub mod errors;
pub mod logging;
pub mod output;

#[derive(Parser)]
#[command(name = "zc")]
#[command(version, about = "Inspect how Zed queries compile")]
pub struct Cli {
    /// Log compiler passes to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to ./zc.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a query's parse tree, syntax tree or DAG at each compiler stage
    Compile(commands::compile::CompileArgs),

    /// Print ZSON values in canonical form with their types
    Zson {
        /// File to read (defaults to stdin)
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests;
