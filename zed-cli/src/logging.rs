use tracing_subscriber::EnvFilter;

/// Installs a stderr subscriber filtered by `RUST_LOG`, falling back to
/// `warn`, or `debug` for the compiler crates when `verbose` is set.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("zed_compiler=debug,zed_cli=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
