//! trellis - module resolution CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use trellis_cli::{Cli, Commands, cmd, engine};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let engine = engine(cli.settings.as_deref(), cli.cache.as_deref())?;

    match cli.command {
        Commands::Resolve {
            coordinate,
            resolver,
            transitive,
            date,
            changing,
        } => cmd::resolve::resolve(&engine, &coordinate, resolver, transitive, date, changing),
        Commands::Download {
            coordinate,
            resolver,
            confs,
        } => cmd::download::download(&engine, &coordinate, resolver, &confs),
        Commands::Publish {
            coordinate,
            resolver,
            artifacts,
            overwrite,
        } => cmd::publish::publish(&engine, &coordinate, &resolver, &artifacts, overwrite),
        Commands::List {
            organisation,
            module,
            resolver,
        } => cmd::list::list(&engine, &organisation, module.as_deref(), resolver.as_deref()),
    }
}
