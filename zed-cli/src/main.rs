use clap::Parser;
use eyre::{Result, eyre};
use std::io;
use zed_cli::{Cli, Commands, commands, config::ZcConfig, logging};

fn main() -> Result<()> {
    // Initialize error reporting
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cwd = std::env::current_dir()?;
    let config = ZcConfig::discover(cli.config.as_deref(), &cwd)
        .map_err(|e| eyre!("{}", e.to_cli_error().render()))?;

    let mut stdout = io::stdout().lock();
    match cli.command {
        Commands::Compile(args) => commands::compile::run(&args, &config, &mut stdout),
        Commands::Zson { file } => commands::zson::run(file.as_deref(), &mut stdout),
    }
}
