use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli;

use algodoc::core::Engine;
use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so generated code on stdout stays clean
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    debug!("Starting algodoc v{}", env!("CARGO_PKG_VERSION"));

    // Create the core engine with configuration
    let engine = Engine::new(cli.config.as_deref())?;

    // Execute the requested command
    cli.execute(engine)
}
